//! Translation of `UserQuery` into SQL.

use sea_orm::sea_query::{Expr, Query, SelectStatement, SimpleExpr};
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, DbBackend, Order, QueryFilter, Select};

use blogstore_core::error::{DomainError, RepoError};
use blogstore_core::query::{Page, Record, UserFilter, UserOrder, UserQuery, page_offset};

use super::entity::{post, user};
use super::filters::{compare, contains, date_condition};
use super::post_query::direction;
use super::projected::ProjectedSelect;
use super::records::resolve_column;
use super::scopes::GlobalScopes;

/// Alias of the correlated latest-post title.
pub const LATEST_POST_TITLE: &str = "latest_post_title";

fn subquery(statement: SelectStatement) -> SimpleExpr {
    SimpleExpr::SubQuery(None, Box::new(statement.into_sub_query_statement()))
}

/// Posts written by the outer user that pass the global post scopes.
fn own_posts(scope: Option<&Condition>) -> SelectStatement {
    let condition = Condition::all()
        .add(
            Expr::col((post::Entity, post::Column::UserId))
                .equals((user::Entity, user::Column::Id)),
        )
        .add_option(scope.cloned());
    Query::select()
        .from(post::Entity)
        .cond_where(condition)
        .to_owned()
}

fn count_expr(relation: &str, scope: Option<&Condition>) -> Result<SimpleExpr, RepoError> {
    match relation {
        "posts" => Ok(subquery(
            own_posts(scope)
                .expr(Expr::col((post::Entity, post::Column::Id)).count())
                .to_owned(),
        )),
        other => Err(DomainError::UnknownRelation {
            entity: "User",
            relation: other.to_string(),
        }
        .into()),
    }
}

fn latest_post_created(scope: Option<&Condition>) -> SimpleExpr {
    subquery(
        own_posts(scope)
            .expr(Expr::col((post::Entity, post::Column::CreatedAt)).max())
            .to_owned(),
    )
}

fn latest_post_title(scope: Option<&Condition>) -> SimpleExpr {
    subquery(
        own_posts(scope)
            .column((post::Entity, post::Column::Title))
            .order_by((post::Entity, post::Column::CreatedAt), Order::Desc)
            .order_by((post::Entity, post::Column::Id), Order::Desc)
            .limit(1)
            .to_owned(),
    )
}

fn restrict(
    mut select: Select<user::Entity>,
    query: &UserQuery,
    scopes: &GlobalScopes,
    backend: DbBackend,
) -> Result<Select<user::Entity>, RepoError> {
    for filter in &query.filters {
        select = match filter {
            UserFilter::Ids(ids) => select.filter(user::Column::Id.is_in(ids.iter().copied())),
            UserFilter::Banned(banned) => select.filter(user::Column::Banned.eq(*banned)),
            UserFilter::AgeBetween(min, max) => {
                if min > max {
                    return Err(RepoError::Validation(format!(
                        "age range {min}..={max} is empty"
                    )));
                }
                select.filter(user::Column::Age.between(*min, *max))
            }
            UserFilter::NameLike(needle) => select.filter(contains(user::Column::Name, needle)),
            UserFilter::Created(date) => {
                select.filter(date_condition(backend, user::Column::CreatedAt, date)?)
            }
        };
    }
    Ok(scopes.apply(select, &query.bypassed_scopes))
}

/// Repository scopes for users and for the posts they own.
#[derive(Clone, Copy)]
pub(crate) struct UserScopes<'a> {
    pub(crate) users: &'a GlobalScopes,
    pub(crate) posts: &'a GlobalScopes,
}

fn build(
    query: &UserQuery,
    scopes: UserScopes<'_>,
    backend: DbBackend,
) -> Result<ProjectedSelect<user::Entity>, RepoError> {
    let posts = scopes.posts.condition(&query.bypassed_scopes);
    let mut projected =
        ProjectedSelect::<user::Entity>::new(query.columns.as_deref(), &query.relations)?
            .scope_posts(posts.clone());

    for count in &query.counts {
        let expr = count_expr(&count.relation, posts.as_ref())?;
        if let Some((op, threshold)) = count.filter {
            projected = projected.filter(compare(expr.clone(), op, threshold));
        }
        projected = projected.count_column(count.alias(), expr);
    }
    if query.latest_post_title {
        projected =
            projected.text_column(LATEST_POST_TITLE, latest_post_title(posts.as_ref()));
    }

    projected.try_map_select(|select| restrict(select, query, scopes.users, backend))
}

fn order(
    query: &UserQuery,
    scopes: UserScopes<'_>,
) -> Result<Vec<(SimpleExpr, Order)>, RepoError> {
    let posts = scopes.posts.condition(&query.bypassed_scopes);
    query
        .order
        .iter()
        .map(|order| match order {
            UserOrder::Column(column, dir) => {
                let column = resolve_column::<user::Entity>(column)?;
                let expr: SimpleExpr = Expr::col((user::Entity, column)).into();
                Ok((expr, direction(*dir)))
            }
            UserOrder::LatestPost(dir) => {
                Ok((latest_post_created(posts.as_ref()), direction(*dir)))
            }
        })
        .collect()
}

pub(crate) async fn get<C: ConnectionTrait>(
    db: &C,
    query: &UserQuery,
    scopes: UserScopes<'_>,
) -> Result<Vec<Record>, RepoError> {
    build(query, scopes, db.get_database_backend())?
        .fetch(db, order(query, scopes)?, query.limit, query.offset)
        .await
}

pub(crate) async fn count<C: ConnectionTrait>(
    db: &C,
    query: &UserQuery,
    scopes: UserScopes<'_>,
) -> Result<u64, RepoError> {
    build(query, scopes, db.get_database_backend())?
        .count(db)
        .await
}

pub(crate) async fn paginate<C: ConnectionTrait>(
    db: &C,
    query: &UserQuery,
    scopes: UserScopes<'_>,
    per_page: u64,
    page: u64,
) -> Result<Page<Record>, RepoError> {
    let offset = page_offset(per_page, page)?;
    let backend = db.get_database_backend();

    let total = build(query, scopes, backend)?.count(db).await?;
    let data = build(query, scopes, backend)?
        .fetch(db, order(query, scopes)?, Some(per_page), Some(offset))
        .await?;

    Ok(Page::new(data, total, per_page, page))
}
