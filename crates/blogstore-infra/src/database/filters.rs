//! SQL fragments shared by the query translators.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use sea_orm::sea_query::{Expr, LikeExpr, SimpleExpr};
use sea_orm::{ColumnTrait, Condition, DbBackend, IdenStatic};

use blogstore_core::error::RepoError;
use blogstore_core::query::{Comparison, DateFilter};

/// `expr <op> value`.
pub(crate) fn compare(expr: SimpleExpr, op: Comparison, value: i64) -> SimpleExpr {
    let expr = Expr::expr(expr);
    match op {
        Comparison::Eq => expr.eq(value),
        Comparison::Ne => expr.ne(value),
        Comparison::Gt => expr.gt(value),
        Comparison::Ge => expr.gte(value),
        Comparison::Lt => expr.lt(value),
        Comparison::Le => expr.lte(value),
    }
}

#[derive(Debug, Clone, Copy)]
enum DatePart {
    Year,
    Month,
    Day,
}

/// Integer date component of a timestamp column, in the backend's dialect.
fn date_part<C: ColumnTrait>(backend: DbBackend, column: C, part: DatePart) -> SimpleExpr {
    let table = column.entity_name().to_string();
    let name = column.as_str();
    let sql = match backend {
        DbBackend::Sqlite => {
            let format = match part {
                DatePart::Year => "%Y",
                DatePart::Month => "%m",
                DatePart::Day => "%d",
            };
            format!("CAST(strftime('{format}', \"{table}\".\"{name}\") AS INTEGER)")
        }
        DbBackend::Postgres => {
            let field = match part {
                DatePart::Year => "YEAR",
                DatePart::Month => "MONTH",
                DatePart::Day => "DAY",
            };
            format!("CAST(EXTRACT({field} FROM \"{table}\".\"{name}\") AS INTEGER)")
        }
        DbBackend::MySql => {
            let function = match part {
                DatePart::Year => "YEAR",
                DatePart::Month => "MONTH",
                DatePart::Day => "DAY",
            };
            format!("{function}(`{table}`.`{name}`)")
        }
    };
    Expr::cust(sql)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Half-open `[start, end)` bounds of the calendar month containing `now`.
pub(crate) fn month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let first = now.date_naive().with_day(1).unwrap_or(now.date_naive());
    let next = first
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(NaiveDate::MAX);
    (start_of_day(first), start_of_day(next))
}

/// Condition for a date filter on a timestamp column.
pub(crate) fn date_condition<C: ColumnTrait>(
    backend: DbBackend,
    column: C,
    filter: &DateFilter,
) -> Result<Condition, RepoError> {
    filter.validate()?;
    let condition = match filter {
        DateFilter::Between(from, to) => Condition::all()
            .add(column.gte(*from))
            .add(column.lte(*to)),
        DateFilter::DateRange(from, to) => {
            let end = to
                .checked_add_days(Days::new(1))
                .ok_or_else(|| RepoError::Validation(format!("date {to} is out of range")))?;
            Condition::all()
                .add(column.gte(start_of_day(*from)))
                .add(column.lt(start_of_day(end)))
        }
        DateFilter::Year(year) => {
            Condition::all().add(Expr::expr(date_part(backend, column, DatePart::Year)).eq(*year))
        }
        DateFilter::Month(month) => Condition::all()
            .add(Expr::expr(date_part(backend, column, DatePart::Month)).eq(*month as i32)),
        DateFilter::Day(day) => Condition::all()
            .add(Expr::expr(date_part(backend, column, DatePart::Day)).eq(*day as i32)),
    };
    Ok(condition)
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards escaped.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// `column LIKE '%needle%'`.
pub(crate) fn contains<C: ColumnTrait>(column: C, needle: &str) -> SimpleExpr {
    Expr::col(column.as_column_ref()).like(LikeExpr::new(contains_pattern(needle)).escape('\\'))
}
