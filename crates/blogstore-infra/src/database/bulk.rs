//! Batched post writes.
//!
//! Both entry points validate every row before the first statement runs and
//! execute all batches inside a single transaction.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::{CaseStatement, Expr, SimpleExpr};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Value};

use blogstore_core::domain::{NewPost, derive_slug};
use blogstore_core::error::RepoError;
use blogstore_core::query::{BulkReport, FieldOp, RowPatch, Scalar};

use super::entity::post::{self, Entity as PostEntity};
use super::errors::{map_db_err, transactional};
use super::sql_base::MIN_BULK_BATCH;

fn batch_len(batch_size: u64) -> usize {
    batch_size.max(MIN_BULK_BATCH) as usize
}

/// Insert `posts` in batches of at least [`MIN_BULK_BATCH`] rows.
pub(crate) async fn insert_posts(
    db: &DatabaseConnection,
    posts: Vec<NewPost>,
    batch_size: u64,
) -> Result<BulkReport, RepoError> {
    if posts.is_empty() {
        return Ok(BulkReport { rows: 0, batches: 0 });
    }

    let now = Utc::now();
    let mut slugs = HashSet::with_capacity(posts.len());
    let mut models = Vec::with_capacity(posts.len());
    for (row, post) in posts.into_iter().enumerate() {
        let slug = post
            .validate()
            .map_err(|e| RepoError::Validation(format!("row {row}: {e}")))?;
        if !slugs.insert(slug.clone()) {
            return Err(RepoError::Validation(format!(
                "row {row}: slug `{slug}` appears more than once"
            )));
        }
        models.push(post::new_active_model(post, slug, now));
    }

    let size = batch_len(batch_size);
    tracing::debug!(rows = models.len(), batch = size, "Bulk inserting posts");

    transactional(db, "bulk_insert", move |txn| {
        Box::pin(async move {
            let mut report = BulkReport { rows: 0, batches: 0 };
            let mut pending = models;
            while !pending.is_empty() {
                let rest = pending.split_off(size.min(pending.len()));
                let batch = std::mem::replace(&mut pending, rest);
                let rows = batch.len() as u64;

                PostEntity::insert_many(batch)
                    .exec_without_returning(txn)
                    .await
                    .map_err(map_db_err)?;

                report.rows += rows;
                report.batches += 1;
                tracing::debug!(batch = report.batches, rows, "Inserted post batch");
            }
            Ok(report)
        })
    })
    .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Id,
    Slug,
}

impl Key {
    fn parse(field: &str) -> Result<Self, RepoError> {
        match field {
            "id" => Ok(Key::Id),
            "slug" => Ok(Key::Slug),
            other => Err(RepoError::Validation(format!(
                "bulk updates are keyed by `id` or `slug`, not `{other}`"
            ))),
        }
    }

    fn column(self) -> post::Column {
        match self {
            Key::Id => post::Column::Id,
            Key::Slug => post::Column::Slug,
        }
    }

    fn value(self, key: &Scalar) -> Result<Value, RepoError> {
        match (self, key) {
            (Key::Id, Scalar::Int(id)) => Ok((*id).into()),
            (Key::Slug, Scalar::Text(slug)) => Ok(slug.clone().into()),
            (key, value) => Err(RepoError::Validation(format!(
                "key {value:?} does not match key field {key:?}"
            ))),
        }
    }
}

/// Columns a bulk update may touch, and whether they are integers.
fn target(field: &str) -> Result<(post::Column, bool), RepoError> {
    match field {
        "title" => Ok((post::Column::Title, false)),
        "content" => Ok((post::Column::Content, false)),
        "likes" => Ok((post::Column::Likes, true)),
        "dislikes" => Ok((post::Column::Dislikes, true)),
        "user_id" => Ok((post::Column::UserId, true)),
        "category_id" => Ok((post::Column::CategoryId, true)),
        other => Err(RepoError::Validation(format!(
            "`{other}` cannot be bulk updated"
        ))),
    }
}

fn is_counter(column: post::Column) -> bool {
    matches!(column, post::Column::Likes | post::Column::Dislikes)
}

/// SQL for one field of one row, evaluated against the row's current value.
fn field_expr(
    field: &str,
    column: post::Column,
    numeric: bool,
    op: &FieldOp,
) -> Result<SimpleExpr, RepoError> {
    let arithmetic = |expr: SimpleExpr| -> Result<SimpleExpr, RepoError> {
        if !numeric {
            return Err(RepoError::Validation(format!(
                "arithmetic on non-numeric field `{field}`"
            )));
        }
        if is_counter(column) {
            Ok(Expr::case(Expr::expr(expr.clone()).lt(0), Expr::val(0))
                .finally(expr)
                .into())
        } else {
            Ok(expr)
        }
    };

    match op {
        FieldOp::Set(Scalar::Int(value)) if numeric => {
            if is_counter(column) && *value < 0 {
                return Err(RepoError::Validation(format!("`{field}` cannot be negative")));
            }
            Ok(Expr::val(*value).into())
        }
        FieldOp::Set(Scalar::Text(value)) if !numeric => Ok(Expr::val(value.clone()).into()),
        FieldOp::Set(value) => Err(RepoError::Validation(format!(
            "value {value:?} has the wrong type for `{field}`"
        ))),
        FieldOp::Add(n) => arithmetic(Expr::col(column).add(*n)),
        FieldOp::Subtract(n) => arithmetic(Expr::col(column).sub(*n)),
        FieldOp::Multiply(n) => arithmetic(Expr::col(column).mul(*n)),
        FieldOp::Divide(0) => Err(RepoError::Validation(format!(
            "division by zero on `{field}`"
        ))),
        FieldOp::Divide(n) => arithmetic(Expr::col(column).div(*n)),
    }
}

/// Per-column `WHEN key = k THEN expr` arms for one batch.
type Arms = BTreeMap<String, (post::Column, Vec<(Value, SimpleExpr)>)>;

fn collect_arms(key: Key, patches: &[RowPatch]) -> Result<(Vec<Value>, Arms), RepoError> {
    let mut keys = Vec::with_capacity(patches.len());
    let mut arms: Arms = BTreeMap::new();

    for patch in patches {
        let key_value = key.value(&patch.key)?;
        let mut touched = HashSet::new();

        for (field, op) in &patch.changes {
            if !touched.insert(field.as_str()) {
                return Err(RepoError::Validation(format!(
                    "`{field}` is changed twice for key {:?}",
                    patch.key
                )));
            }
            let (column, numeric) = target(field)?;
            let expr = field_expr(field, column, numeric, op)?;

            if let (post::Column::Title, FieldOp::Set(Scalar::Text(title))) = (column, op) {
                let slug = derive_slug(title)?;
                arms.entry("slug".to_string())
                    .or_insert_with(|| (post::Column::Slug, Vec::new()))
                    .1
                    .push((key_value.clone(), Expr::val(slug).into()));
            }

            let name = sea_orm::IdenStatic::as_str(&column).to_string();
            arms.entry(name)
                .or_insert_with(|| (column, Vec::new()))
                .1
                .push((key_value.clone(), expr));
        }
        keys.push(key_value);
    }
    Ok((keys, arms))
}

/// Column arms in `SET` order. MySQL evaluates assignments left to right
/// against the updated row, so the key column is assigned last.
fn assignments(key: Key, arms: Arms) -> Vec<(post::Column, Vec<(Value, SimpleExpr)>)> {
    let key_name = sea_orm::IdenStatic::as_str(&key.column()).to_string();
    let (mut ordered, key_arms): (Vec<_>, Vec<_>) =
        arms.into_iter().partition(|(name, _)| *name != key_name);
    ordered.extend(key_arms);
    ordered.into_iter().map(|(_, arm)| arm).collect()
}

fn case_expr(key: Key, column: post::Column, arms: Vec<(Value, SimpleExpr)>) -> SimpleExpr {
    let mut case = CaseStatement::new();
    for (value, then) in arms {
        case = case.case(Expr::col(key.column()).eq(value), then);
    }
    case.finally(Expr::col(column)).into()
}

fn validate_patches(key: Key, patches: &[RowPatch]) -> Result<(), RepoError> {
    let mut seen = HashSet::with_capacity(patches.len());
    for patch in patches {
        key.value(&patch.key)?;
        if patch.changes.is_empty() {
            return Err(RepoError::Validation(format!(
                "no changes listed for key {:?}",
                patch.key
            )));
        }
        if !seen.insert(&patch.key) {
            return Err(RepoError::Validation(format!(
                "key {:?} appears more than once",
                patch.key
            )));
        }
    }
    Ok(())
}

/// Apply per-row field operations in batched `CASE` updates.
pub(crate) async fn update_posts(
    db: &DatabaseConnection,
    patches: Vec<RowPatch>,
    key_field: &str,
    batch_size: u64,
) -> Result<BulkReport, RepoError> {
    let key = Key::parse(key_field)?;
    if patches.is_empty() {
        return Ok(BulkReport { rows: 0, batches: 0 });
    }
    validate_patches(key, &patches)?;

    let size = batch_len(batch_size);
    let mut statements = Vec::new();
    for batch in patches.chunks(size) {
        statements.push(collect_arms(key, batch)?);
    }
    tracing::debug!(
        rows = patches.len(),
        batches = statements.len(),
        key = key_field,
        "Bulk updating posts"
    );

    transactional(db, "bulk_update", move |txn| {
        Box::pin(async move {
            let mut report = BulkReport { rows: 0, batches: 0 };
            let now = Utc::now();
            for (keys, arms) in statements {
                let mut update = PostEntity::update_many();
                for (column, column_arms) in assignments(key, arms) {
                    update = update.col_expr(column, case_expr(key, column, column_arms));
                }
                let result = update
                    .col_expr(post::Column::UpdatedAt, Expr::value(now))
                    .filter(key.column().is_in(keys))
                    .exec(txn)
                    .await
                    .map_err(map_db_err)?;

                report.rows += result.rows_affected;
                report.batches += 1;
            }
            Ok(report)
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, QueryTrait};

    use super::*;

    fn patch_sql(patches: &[RowPatch], key: Key) -> String {
        let (keys, arms) = collect_arms(key, patches).unwrap();
        let mut update = PostEntity::update_many();
        for (column, column_arms) in assignments(key, arms) {
            update = update.col_expr(column, case_expr(key, column, column_arms));
        }
        update
            .filter(key.column().is_in(keys))
            .build(DbBackend::Sqlite)
            .to_string()
    }

    #[test]
    fn test_case_update_shape() {
        let patches = vec![
            RowPatch::new(1).op("likes", FieldOp::Add(5)),
            RowPatch::new(2).op("likes", FieldOp::Subtract(3)),
        ];
        let sql = patch_sql(&patches, Key::Id);
        assert!(sql.contains("CASE WHEN"));
        assert!(sql.contains("ELSE \"likes\" END"));
        assert!(sql.contains("\"id\" IN (1, 2)"));
    }

    #[test]
    fn test_setting_title_also_sets_slug() {
        let patches = vec![RowPatch::new(7).op("title", FieldOp::Set("Hello World".into()))];
        let sql = patch_sql(&patches, Key::Id);
        assert!(sql.contains("'hello-world'"));
        assert!(sql.contains("\"slug\" = "));
    }

    #[test]
    fn test_slug_key_is_assigned_last() {
        let patches = vec![
            RowPatch::new("draft")
                .op("title", FieldOp::Set("Published".into()))
                .op("likes", FieldOp::Add(1)),
        ];
        let order = |key: Key| -> Vec<String> {
            let (_, arms) = collect_arms(key, &patches).unwrap();
            assignments(key, arms)
                .iter()
                .map(|(column, _)| sea_orm::IdenStatic::as_str(column).to_string())
                .collect()
        };

        assert_eq!(order(Key::Slug), vec!["likes", "title", "slug"]);

        let patches = vec![
            RowPatch::new(3)
                .op("title", FieldOp::Set("Published".into()))
                .op("likes", FieldOp::Add(1)),
        ];
        let (_, arms) = collect_arms(Key::Id, &patches).unwrap();
        let by_id: Vec<String> = assignments(Key::Id, arms)
            .iter()
            .map(|(column, _)| sea_orm::IdenStatic::as_str(column).to_string())
            .collect();
        assert_eq!(by_id, vec!["likes", "slug", "title"]);
    }

    #[test]
    fn test_arithmetic_rules() {
        let (title, numeric) = target("title").unwrap();
        assert!(field_expr("title", title, numeric, &FieldOp::Add(1)).is_err());

        let (likes, numeric) = target("likes").unwrap();
        assert!(field_expr("likes", likes, numeric, &FieldOp::Divide(0)).is_err());
        assert!(field_expr("likes", likes, numeric, &FieldOp::Divide(2)).is_ok());
        assert!(target("slug").is_err());
    }

    #[test]
    fn test_patch_validation() {
        let duplicate = vec![
            RowPatch::new(1).op("likes", FieldOp::Add(1)),
            RowPatch::new(1).op("likes", FieldOp::Add(2)),
        ];
        assert!(validate_patches(Key::Id, &duplicate).is_err());

        let wrong_key = vec![RowPatch::new("some-slug").op("likes", FieldOp::Add(1))];
        assert!(validate_patches(Key::Id, &wrong_key).is_err());
        assert!(validate_patches(Key::Slug, &wrong_key).is_ok());

        assert!(Key::parse("title").is_err());
    }

    #[test]
    fn test_batch_floor() {
        assert_eq!(batch_len(10), 100);
        assert_eq!(batch_len(250), 250);
    }
}
