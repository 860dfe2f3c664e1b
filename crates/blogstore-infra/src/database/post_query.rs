//! Translation of `PostQuery` into SQL.

use sea_orm::sea_query::{Alias, Expr, Func, Query, SimpleExpr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Select,
};

use blogstore_core::error::{DomainError, RepoError};
use blogstore_core::query::{
    Comparison, Direction, GroupTotal, Page, PostFilter, PostQuery, Record, page_offset,
};

use super::entity::{post, post_tag};
use super::errors::map_db_err;
use super::filters::{compare, contains, date_condition};
use super::projected::ProjectedSelect;
use super::records::resolve_column;
use super::scopes::{GlobalScopes, post_scope_condition};

pub(crate) fn direction(direction: Direction) -> Order {
    match direction {
        Direction::Asc => Order::Asc,
        Direction::Desc => Order::Desc,
    }
}

/// Correlated `COUNT` of a post relation.
fn count_expr(relation: &str) -> Result<SimpleExpr, RepoError> {
    match relation {
        "tags" => {
            let subquery = Query::select()
                .expr(Expr::col((post_tag::Entity, post_tag::Column::TagId)).count())
                .from(post_tag::Entity)
                .and_where(
                    Expr::col((post_tag::Entity, post_tag::Column::PostId))
                        .equals((post::Entity, post::Column::Id)),
                )
                .to_owned();
            Ok(SimpleExpr::SubQuery(
                None,
                Box::new(subquery.into_sub_query_statement()),
            ))
        }
        other => Err(DomainError::UnknownRelation {
            entity: "Post",
            relation: other.to_string(),
        }
        .into()),
    }
}

/// Filters, named scopes and the repository's global scopes.
fn restrict(
    mut select: Select<post::Entity>,
    query: &PostQuery,
    scopes: &GlobalScopes,
    backend: DbBackend,
) -> Result<Select<post::Entity>, RepoError> {
    for filter in &query.filters {
        select = match filter {
            PostFilter::Ids(ids) => select.filter(post::Column::Id.is_in(ids.iter().copied())),
            PostFilter::User(user_id) => select.filter(post::Column::UserId.eq(*user_id)),
            PostFilter::Category(category_id) => {
                select.filter(post::Column::CategoryId.eq(*category_id))
            }
            PostFilter::TitleLike(needle) => select.filter(contains(post::Column::Title, needle)),
            PostFilter::LikesAtLeast(likes) => select.filter(post::Column::Likes.gte(*likes)),
            PostFilter::Created(date) => {
                select.filter(date_condition(backend, post::Column::CreatedAt, date)?)
            }
        };
    }
    for scope in &query.scopes {
        select = select.filter(post_scope_condition(scope));
    }
    Ok(scopes.apply(select, &query.bypassed_scopes))
}

fn build(
    query: &PostQuery,
    scopes: &GlobalScopes,
    backend: DbBackend,
) -> Result<ProjectedSelect<post::Entity>, RepoError> {
    let mut projected =
        ProjectedSelect::<post::Entity>::new(query.columns.as_deref(), &query.relations)?
            .scope_posts(scopes.condition(&query.bypassed_scopes));

    for count in &query.counts {
        let expr = count_expr(&count.relation)?;
        if let Some((op, threshold)) = count.filter {
            projected = projected.filter(compare(expr.clone(), op, threshold));
        }
        projected = projected.count_column(count.alias(), expr);
    }

    projected.try_map_select(|select| restrict(select, query, scopes, backend))
}

fn order(query: &PostQuery) -> Result<Vec<(SimpleExpr, Order)>, RepoError> {
    query
        .order
        .iter()
        .map(|(column, dir)| {
            let column = resolve_column::<post::Entity>(column)?;
            let expr: SimpleExpr = Expr::col((post::Entity, column)).into();
            Ok((expr, direction(*dir)))
        })
        .collect()
}

pub(crate) async fn get<C: ConnectionTrait>(
    db: &C,
    query: &PostQuery,
    scopes: &GlobalScopes,
) -> Result<Vec<Record>, RepoError> {
    let projected = build(query, scopes, db.get_database_backend())?;
    projected
        .fetch(db, order(query)?, query.limit, query.offset)
        .await
}

pub(crate) async fn count<C: ConnectionTrait>(
    db: &C,
    query: &PostQuery,
    scopes: &GlobalScopes,
) -> Result<u64, RepoError> {
    build(query, scopes, db.get_database_backend())?
        .count(db)
        .await
}

pub(crate) async fn paginate<C: ConnectionTrait>(
    db: &C,
    query: &PostQuery,
    scopes: &GlobalScopes,
    per_page: u64,
    page: u64,
) -> Result<Page<Record>, RepoError> {
    let offset = page_offset(per_page, page)?;
    let backend = db.get_database_backend();

    let total = build(query, scopes, backend)?.count(db).await?;
    let data = build(query, scopes, backend)?
        .fetch(db, order(query)?, Some(per_page), Some(offset))
        .await?;

    Ok(Page::new(data, total, per_page, page))
}

fn integer_column(name: &str) -> Result<post::Column, RepoError> {
    let column = resolve_column::<post::Entity>(name)?;
    match column {
        post::Column::Id
        | post::Column::UserId
        | post::Column::CategoryId
        | post::Column::Likes
        | post::Column::Dislikes => Ok(column),
        _ => Err(RepoError::Validation(format!(
            "`{name}` is not an integer column of Post"
        ))),
    }
}

/// `SELECT group_by, SUM(field) ... GROUP BY group_by [HAVING SUM(field) op n]`.
pub(crate) async fn sum_grouped<C: ConnectionTrait>(
    db: &C,
    query: &PostQuery,
    scopes: &GlobalScopes,
    group_by: &str,
    field: &str,
    having: Option<(Comparison, i64)>,
) -> Result<Vec<GroupTotal>, RepoError> {
    let backend = db.get_database_backend();
    let group = integer_column(group_by)?;
    let field = integer_column(field)?;

    let integer_type = match backend {
        DbBackend::MySql => "SIGNED",
        DbBackend::Postgres | DbBackend::Sqlite => "BIGINT",
    };
    let total: SimpleExpr = Func::cast_as(
        Func::sum(Expr::col((post::Entity, field))),
        Alias::new(integer_type),
    )
    .into();
    let key: SimpleExpr = Expr::col((post::Entity, group)).into();

    let mut select = post::Entity::find()
        .select_only()
        .column_as(key, "group_key")
        .column_as(total.clone(), "total")
        .group_by(group);
    select = restrict(select, query, scopes, backend)?;
    if let Some((op, threshold)) = having {
        select = select.having(compare(total, op, threshold));
    }
    select = select.order_by_asc(group);

    let rows = db
        .query_all(select.build(backend))
        .await
        .map_err(map_db_err)?;

    rows.iter()
        .map(|row| {
            Ok(GroupTotal {
                key: row.try_get("", "group_key").map_err(map_db_err)?,
                total: row.try_get("", "total").map_err(map_db_err)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use blogstore_core::query::PostScope;

    use super::*;

    fn sql(query: &PostQuery, scopes: &GlobalScopes) -> String {
        let projected = build(query, scopes, DbBackend::Sqlite).unwrap();
        projected.statement(DbBackend::Sqlite)
    }

    #[test]
    fn test_count_clause_becomes_correlated_subquery() {
        let query = PostQuery::new().with_count_where("tags", Comparison::Ge, 2);
        let sql = sql(&query, &GlobalScopes::default());
        assert!(sql.contains("AS \"tags_count\""));
        assert!(sql.contains("WHERE \"post_tag\".\"post_id\" = \"posts\".\"id\""));
        assert!(sql.contains(">= 2"));
    }

    #[test]
    fn test_unknown_count_relation_is_rejected() {
        let query = PostQuery::new().with_count("comments");
        let err = build(&query, &GlobalScopes::default(), DbBackend::Sqlite).unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[test]
    fn test_query_bypass_skips_global_scope() {
        let mut scopes = GlobalScopes::default();
        scopes.push(PostScope::Popular { min_likes: 3 }.into());

        let scoped = sql(&PostQuery::new(), &scopes);
        assert!(scoped.contains("\"likes\" >= 3"));

        let bypassed = sql(&PostQuery::new().without_global_scope("popular"), &scopes);
        assert!(!bypassed.contains("\"likes\" >= 3"));
    }

    #[test]
    fn test_sum_rejects_text_columns() {
        assert!(integer_column("likes").is_ok());
        assert!(integer_column("title").is_err());
        assert!(integer_column("nope").is_err());
    }
}
