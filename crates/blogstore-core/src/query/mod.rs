//! Backend-agnostic query descriptions.
//!
//! Queries are plain data built with chained methods; the infrastructure
//! crate translates them into SQL. Anything that can produce a partial shape
//! (column whitelists, eager-loaded relations, computed columns) comes back
//! as a [`Record`].

mod post;
mod relations;
mod user;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

pub use post::{PostFilter, PostQuery, PostScope};
pub use relations::{RelationNode, RelationPath, relation_tree};
pub use user::{UserFilter, UserOrder, UserQuery};

/// A row rendered as a JSON object.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Comparison operator used by count filters and `HAVING` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
        }
    }

    pub fn matches(self, left: i64, right: i64) -> bool {
        match self {
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Comparison::Eq),
            "!=" | "<>" => Ok(Comparison::Ne),
            ">" => Ok(Comparison::Gt),
            ">=" => Ok(Comparison::Ge),
            "<" => Ok(Comparison::Lt),
            "<=" => Ok(Comparison::Le),
            other => Err(DomainError::Validation(format!(
                "unknown comparison operator `{other}`"
            ))),
        }
    }
}

/// Timestamp predicates over `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFilter {
    /// Inclusive timestamp range.
    Between(DateTime<Utc>, DateTime<Utc>),
    /// Inclusive calendar-date range, whole days in UTC.
    DateRange(NaiveDate, NaiveDate),
    Year(i32),
    Month(u32),
    Day(u32),
}

impl DateFilter {
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            DateFilter::Between(from, to) if from > to => Err(DomainError::Validation(
                "date range start is after its end".into(),
            )),
            DateFilter::DateRange(from, to) if from > to => Err(DomainError::Validation(
                "date range start is after its end".into(),
            )),
            DateFilter::Month(month) if !(1..=12).contains(month) => Err(
                DomainError::Validation(format!("month {month} is out of range")),
            ),
            DateFilter::Day(day) if !(1..=31).contains(day) => Err(DomainError::Validation(
                format!("day {day} is out of range"),
            )),
            _ => Ok(()),
        }
    }
}

/// `<relation>_count` annotation, optionally filtering rows on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountClause {
    pub relation: String,
    pub filter: Option<(Comparison, i64)>,
}

impl CountClause {
    pub fn alias(&self) -> String {
        format!("{}_count", self.relation)
    }
}

/// One page of results plus the totals needed to render pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Self {
        let last_page = total.div_ceil(per_page.max(1)).max(1);
        Self {
            data,
            total,
            per_page,
            current_page,
            last_page,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
        }
    }
}

/// Check paging arguments and return the zero-based offset of `page`.
pub fn page_offset(per_page: u64, page: u64) -> Result<u64, DomainError> {
    if per_page == 0 {
        return Err(DomainError::Validation("per_page must be at least 1".into()));
    }
    if page == 0 {
        return Err(DomainError::Validation("page numbers start at 1".into()));
    }
    Ok((page - 1) * per_page)
}

/// Result row of a grouped `SUM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTotal {
    pub key: i64,
    pub total: i64,
}

/// Outcome of a bulk mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    pub rows: u64,
    pub batches: u64,
}

/// A literal value used by bulk updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// Per-field operation evaluated by the store during a bulk update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum FieldOp {
    Set(Scalar),
    Add(i64),
    Subtract(i64),
    Multiply(i64),
    Divide(i64),
}

/// Changes for one row of a bulk update, identified by its key field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowPatch {
    pub key: Scalar,
    pub changes: Vec<(String, FieldOp)>,
}

impl RowPatch {
    pub fn new(key: impl Into<Scalar>) -> Self {
        Self {
            key: key.into(),
            changes: Vec::new(),
        }
    }

    pub fn op(mut self, field: impl Into<String>, op: FieldOp) -> Self {
        self.changes.push((field.into(), op));
        self
    }
}

/// Apply a builder step only when a value is present.
///
/// Keeps optional filters declarative:
/// `PostQuery::new().when(category, |q, id| q.where_category(id))`.
pub trait Conditional: Sized {
    fn when<V>(self, value: Option<V>, apply: impl FnOnce(Self, V) -> Self) -> Self {
        match value {
            Some(value) => apply(self, value),
            None => self,
        }
    }

    fn when_true(self, condition: bool, apply: impl FnOnce(Self) -> Self) -> Self {
        if condition { apply(self) } else { self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_math() {
        let page: Page<u8> = Page::new(vec![1, 2, 3, 4, 5], 25, 10, 3);
        assert_eq!(page.last_page, 3);
        assert!(!page.has_more_pages());

        let empty: Page<u8> = Page::new(vec![], 0, 10, 1);
        assert_eq!(empty.last_page, 1);
    }

    #[test]
    fn test_page_offset_rejects_zero() {
        assert_eq!(page_offset(10, 3).unwrap(), 20);
        assert!(page_offset(0, 1).is_err());
        assert!(page_offset(10, 0).is_err());
    }

    #[test]
    fn test_comparison_parsing() {
        assert_eq!(">=".parse::<Comparison>().unwrap(), Comparison::Ge);
        assert_eq!("<>".parse::<Comparison>().unwrap(), Comparison::Ne);
        assert!("~".parse::<Comparison>().is_err());
        assert!(Comparison::Ge.matches(3, 3));
        assert!(!Comparison::Lt.matches(3, 3));
    }

    #[test]
    fn test_date_filter_validation() {
        assert!(DateFilter::Month(13).validate().is_err());
        assert!(DateFilter::Day(0).validate().is_err());
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(DateFilter::DateRange(start, end).validate().is_err());
        assert!(DateFilter::Month(2).validate().is_ok());
    }

    #[test]
    fn test_field_op_serialization() {
        let op = FieldOp::Multiply(2);
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            serde_json::json!({"op": "multiply", "value": 2})
        );
    }
}
