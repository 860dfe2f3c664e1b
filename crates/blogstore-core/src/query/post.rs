use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Comparison, Conditional, CountClause, DateFilter, Direction};

/// Named, reusable post predicates.
///
/// Any scope can also be attached to a repository as a global default filter
/// and bypassed per query by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostScope {
    /// Created within the current UTC calendar month.
    CurrentMonth,
    /// Has at least one tag.
    WithTags,
    Popular { min_likes: i64 },
}

impl PostScope {
    pub fn name(&self) -> &'static str {
        match self {
            PostScope::CurrentMonth => "current_month",
            PostScope::WithTags => "with_tags",
            PostScope::Popular { .. } => "popular",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    Ids(Vec<i64>),
    User(i64),
    Category(i64),
    TitleLike(String),
    LikesAtLeast(i64),
    Created(DateFilter),
}

/// Description of a post listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostQuery {
    pub filters: Vec<PostFilter>,
    pub scopes: Vec<PostScope>,
    pub bypassed_scopes: Vec<String>,
    pub relations: Vec<String>,
    pub counts: Vec<CountClause>,
    pub columns: Option<Vec<String>>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Conditional for PostQuery {}

impl PostQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts that have tags, projected to `id` and `title` with their tags'
    /// `id` and `tag`.
    pub fn tagged_summary() -> Self {
        Self::new()
            .select(&["id", "title"])
            .with("tags:id,tag")
            .scope(PostScope::WithTags)
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Eager-load a relation path such as `user:id,name` or `user.billing`.
    pub fn with(mut self, path: &str) -> Self {
        self.relations.push(path.to_string());
        self
    }

    pub fn with_count(mut self, relation: &str) -> Self {
        self.counts.push(CountClause {
            relation: relation.to_string(),
            filter: None,
        });
        self
    }

    /// Count a relation and keep only rows whose count satisfies `op threshold`.
    pub fn with_count_where(mut self, relation: &str, op: Comparison, threshold: i64) -> Self {
        self.counts.push(CountClause {
            relation: relation.to_string(),
            filter: Some((op, threshold)),
        });
        self
    }

    pub fn scope(mut self, scope: PostScope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn without_global_scope(mut self, name: &str) -> Self {
        self.bypassed_scopes.push(name.to_string());
        self
    }

    pub fn where_ids(mut self, ids: &[i64]) -> Self {
        self.filters.push(PostFilter::Ids(ids.to_vec()));
        self
    }

    pub fn where_user(mut self, user_id: i64) -> Self {
        self.filters.push(PostFilter::User(user_id));
        self
    }

    pub fn where_category(mut self, category_id: i64) -> Self {
        self.filters.push(PostFilter::Category(category_id));
        self
    }

    pub fn where_title_like(mut self, needle: &str) -> Self {
        self.filters.push(PostFilter::TitleLike(needle.to_string()));
        self
    }

    pub fn where_likes_at_least(mut self, likes: i64) -> Self {
        self.filters.push(PostFilter::LikesAtLeast(likes));
        self
    }

    pub fn where_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.filters
            .push(PostFilter::Created(DateFilter::Between(from, to)));
        self
    }

    pub fn where_date_range(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.filters
            .push(PostFilter::Created(DateFilter::DateRange(from, to)));
        self
    }

    pub fn where_year(mut self, year: i32) -> Self {
        self.filters.push(PostFilter::Created(DateFilter::Year(year)));
        self
    }

    pub fn where_month(mut self, month: u32) -> Self {
        self.filters.push(PostFilter::Created(DateFilter::Month(month)));
        self
    }

    pub fn where_day(mut self, day: u32) -> Self {
        self.filters.push(PostFilter::Created(DateFilter::Day(day)));
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order.push((column.to_string(), direction));
        self
    }

    pub fn latest(self) -> Self {
        self.order_by("created_at", Direction::Desc)
    }

    pub fn oldest(self) -> Self {
        self.order_by("created_at", Direction::Asc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_when_applies_only_present_values() {
        let category: Option<i64> = Some(4);
        let author: Option<i64> = None;

        let query = PostQuery::new()
            .when(category, |q, id| q.where_category(id))
            .when(author, |q, id| q.where_user(id))
            .when_true(false, |q| q.latest());

        assert_eq!(query.filters, vec![PostFilter::Category(4)]);
        assert!(query.order.is_empty());
    }

    #[test]
    fn test_tagged_summary_shape() {
        let query = PostQuery::tagged_summary();
        assert_eq!(query.columns, Some(vec!["id".into(), "title".into()]));
        assert_eq!(query.relations, vec!["tags:id,tag".to_string()]);
        assert_eq!(query.scopes, vec![PostScope::WithTags]);
    }
}
