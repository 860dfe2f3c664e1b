//! SQL post repository.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryResult, Set,
};
use serde_json::{Value, json};

use blogstore_core::domain::{Counter, NewPost, Post, PostChanges};
use blogstore_core::error::RepoError;
use blogstore_core::ports::PostRepository;
use blogstore_core::query::{BulkReport, Comparison, GroupTotal, Page, PostQuery, Record, RowPatch};

use super::bulk;
use super::catalog_repo::first_or_create_tag;
use super::eager::Kind;
use super::entity::post::{self, Entity as PostEntity};
use super::entity::post_tag;
use super::errors::{map_db_err, transactional};
use super::post_query;
use super::sql_base::{SqlBaseRepository, StoredEntity};

/// SQL post repository.
pub type SqlPostRepository = SqlBaseRepository<PostEntity>;

#[async_trait]
impl StoredEntity for PostEntity {
    type Domain = Post;

    const LABEL: &'static str = "Post";
    const KIND: Kind = Kind::Post;

    fn id_column() -> post::Column {
        post::Column::Id
    }

    fn model_id(model: &post::Model) -> i64 {
        model.id
    }

    fn read_column(row: &QueryResult, column: post::Column) -> Result<Value, DbErr> {
        let name = sea_orm::IdenStatic::as_str(&column);
        Ok(match column {
            post::Column::Id
            | post::Column::UserId
            | post::Column::CategoryId
            | post::Column::Likes
            | post::Column::Dislikes => json!(row.try_get::<i64>("", name)?),
            post::Column::Title | post::Column::Slug | post::Column::Content => {
                json!(row.try_get::<String>("", name)?)
            }
            post::Column::CreatedAt | post::Column::UpdatedAt => {
                json!(row.try_get::<chrono::DateTime<Utc>>("", name)?)
            }
        })
    }

    async fn before_delete(txn: &DatabaseTransaction, id: i64) -> Result<(), RepoError> {
        let detached = post_tag::Entity::delete_many()
            .filter(post_tag::Column::PostId.eq(id))
            .exec(txn)
            .await
            .map_err(map_db_err)?;
        tracing::debug!(post_id = id, tags = detached.rows_affected, "Detached tags");
        Ok(())
    }
}

pub(crate) fn counter_column(counter: Counter) -> post::Column {
    match counter {
        Counter::Likes => post::Column::Likes,
        Counter::Dislikes => post::Column::Dislikes,
    }
}

async fn insert_post<C: ConnectionTrait>(
    db: &C,
    post: NewPost,
    slug: String,
) -> Result<Post, RepoError> {
    let model = post::new_active_model(post, slug, Utc::now())
        .insert(db)
        .await
        .map_err(map_db_err)?;
    Ok(model.into())
}

async fn find_by_title<C: ConnectionTrait>(db: &C, title: &str) -> Result<Option<Post>, RepoError> {
    let result = PostEntity::find()
        .filter(post::Column::Title.eq(title))
        .one(db)
        .await
        .map_err(map_db_err)?;
    Ok(result.map(Into::into))
}

async fn attach<C: ConnectionTrait>(db: &C, post_id: i64, tag_id: i64) -> Result<(), RepoError> {
    post_tag::Entity::insert(post_tag::ActiveModel {
        post_id: Set(post_id),
        tag_id: Set(tag_id),
    })
    .on_conflict(
        OnConflict::columns([post_tag::Column::PostId, post_tag::Column::TagId])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(db)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

impl SqlPostRepository {
    /// Row lookup that ignores global scopes, for use after writes.
    async fn reload(&self, id: i64) -> Result<Post, RepoError> {
        PostEntity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .map(Into::into)
            .ok_or_else(|| RepoError::not_found("Post", id))
    }
}

#[async_trait]
impl PostRepository for SqlPostRepository {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, RepoError> {
        tracing::debug!(slug, "Finding post by slug");

        let result = self
            .scoped(PostEntity::find())
            .filter(post::Column::Slug.eq(slug))
            .one(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(result.map(Into::into))
    }

    async fn create(&self, post: NewPost) -> Result<Post, RepoError> {
        let slug = post.validate()?;
        tracing::debug!(slug = %slug, user_id = post.user_id, "Creating post");
        insert_post(&self.db, post, slug).await
    }

    async fn create_with_tags(&self, post: NewPost, tags: &[&str]) -> Result<Post, RepoError> {
        let slug = post.validate()?;
        let mut labels: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            let label = tag.trim().to_string();
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        tracing::debug!(slug = %slug, tags = labels.len(), "Creating post with tags");

        transactional(&self.db, "create_with_tags", move |txn| {
            Box::pin(async move {
                let created = insert_post(txn, post, slug).await?;
                for label in &labels {
                    let tag = first_or_create_tag(txn, label).await?;
                    attach(txn, created.id, tag.id).await?;
                }
                Ok(created)
            })
        })
        .await
    }

    async fn first_or_create(&self, post: NewPost) -> Result<Post, RepoError> {
        let slug = post.validate()?;
        if let Some(found) = find_by_title(&self.db, &post.title).await? {
            return Ok(found);
        }

        let title = post.title.clone();
        let inserted = PostEntity::insert(post::new_active_model(post, slug.clone(), Utc::now()))
            .on_conflict(OnConflict::column(post::Column::Slug).do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await
            .map_err(map_db_err)?;
        if inserted == 0 {
            tracing::warn!(slug = %slug, "Post insert lost a race, reading the existing row");
        }

        find_by_title(&self.db, &title).await?.ok_or_else(|| {
            RepoError::Conflict(format!(
                "slug `{slug}` already belongs to a post with another title"
            ))
        })
    }

    async fn update_or_create(&self, post: NewPost) -> Result<Post, RepoError> {
        let slug = post.validate()?;
        tracing::debug!(slug = %slug, "Upserting post");

        PostEntity::insert(post::new_active_model(post, slug.clone(), Utc::now()))
            .on_conflict(
                OnConflict::column(post::Column::Slug)
                    .update_columns([
                        post::Column::Title,
                        post::Column::Content,
                        post::Column::UserId,
                        post::Column::CategoryId,
                        post::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(map_db_err)?;

        PostEntity::find()
            .filter(post::Column::Slug.eq(slug.as_str()))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .map(Into::into)
            .ok_or_else(|| RepoError::not_found("Post", slug))
    }

    async fn update(&self, id: i64, changes: PostChanges) -> Result<Post, RepoError> {
        let slug = changes.validate()?;
        if changes.is_empty() {
            return self.reload(id).await;
        }
        tracing::debug!(post_id = id, retitled = slug.is_some(), "Updating post");

        let mut model = post::ActiveModel {
            id: ActiveValue::Unchanged(id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(title) = changes.title {
            model.title = Set(title);
        }
        if let Some(slug) = slug {
            model.slug = Set(slug);
        }
        if let Some(content) = changes.content {
            model.content = Set(content);
        }
        if let Some(category_id) = changes.category_id {
            model.category_id = Set(category_id);
        }
        if let Some(user_id) = changes.user_id {
            model.user_id = Set(user_id);
        }

        match model.update(&self.db).await {
            Ok(model) => Ok(model.into()),
            Err(DbErr::RecordNotUpdated) => Err(RepoError::not_found("Post", id)),
            Err(e) => Err(map_db_err(e)),
        }
    }

    async fn increment(
        &self,
        id: i64,
        counter: Counter,
        amount: i64,
        extra: PostChanges,
    ) -> Result<Post, RepoError> {
        let slug = extra.validate()?;
        let column = counter_column(counter);
        tracing::debug!(post_id = id, counter = counter.column(), amount, "Adjusting counter");

        let mut update = PostEntity::update_many()
            .col_expr(column, Expr::col(column).add(amount))
            .col_expr(post::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(title) = extra.title {
            update = update.col_expr(post::Column::Title, Expr::value(title));
        }
        if let Some(slug) = slug {
            update = update.col_expr(post::Column::Slug, Expr::value(slug));
        }
        if let Some(content) = extra.content {
            update = update.col_expr(post::Column::Content, Expr::value(content));
        }
        if let Some(category_id) = extra.category_id {
            update = update.col_expr(post::Column::CategoryId, Expr::value(category_id));
        }
        if let Some(user_id) = extra.user_id {
            update = update.col_expr(post::Column::UserId, Expr::value(user_id));
        }

        let result = update
            .filter(post::Column::Id.eq(id))
            .filter(Expr::expr(Expr::col(column).add(amount)).gte(0))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            let current = self.reload(id).await?;
            let value = match counter {
                Counter::Likes => current.likes,
                Counter::Dislikes => current.dislikes,
            };
            return Err(RepoError::Validation(format!(
                "{} cannot drop below zero (currently {value}, change {amount})",
                counter.column()
            )));
        }

        self.reload(id).await
    }

    async fn attach_tag(&self, post_id: i64, tag_id: i64) -> Result<(), RepoError> {
        tracing::debug!(post_id, tag_id, "Attaching tag");
        attach(&self.db, post_id, tag_id).await
    }

    async fn detach_tags(&self, post_id: i64, tag_ids: Option<&[i64]>) -> Result<u64, RepoError> {
        let mut delete = post_tag::Entity::delete_many().filter(post_tag::Column::PostId.eq(post_id));
        if let Some(tag_ids) = tag_ids {
            if tag_ids.is_empty() {
                return Ok(0);
            }
            delete = delete.filter(post_tag::Column::TagId.is_in(tag_ids.iter().copied()));
        }

        let result = delete.exec(&self.db).await.map_err(map_db_err)?;
        tracing::debug!(post_id, removed = result.rows_affected, "Detached tags");
        Ok(result.rows_affected)
    }

    async fn get(&self, query: &PostQuery) -> Result<Vec<Record>, RepoError> {
        post_query::get(&self.db, query, &self.scopes).await
    }

    async fn first(&self, query: &PostQuery) -> Result<Option<Record>, RepoError> {
        let query = query.clone().limit(1);
        Ok(post_query::get(&self.db, &query, &self.scopes)
            .await?
            .into_iter()
            .next())
    }

    async fn count(&self, query: &PostQuery) -> Result<u64, RepoError> {
        post_query::count(&self.db, query, &self.scopes).await
    }

    async fn paginate_query(
        &self,
        query: &PostQuery,
        per_page: u64,
        page: u64,
    ) -> Result<Page<Record>, RepoError> {
        post_query::paginate(&self.db, query, &self.scopes, per_page, page).await
    }

    async fn load(&self, post: &Post, relations: &[&str]) -> Result<Record, RepoError> {
        self.load_record(post, relations).await
    }

    async fn sum_grouped(
        &self,
        query: &PostQuery,
        group_by: &str,
        field: &str,
        having: Option<(Comparison, i64)>,
    ) -> Result<Vec<GroupTotal>, RepoError> {
        post_query::sum_grouped(&self.db, query, &self.scopes, group_by, field, having).await
    }

    async fn bulk_insert(&self, posts: Vec<NewPost>) -> Result<BulkReport, RepoError> {
        bulk::insert_posts(&self.db, posts, self.batch_size).await
    }

    async fn bulk_update(
        &self,
        patches: Vec<RowPatch>,
        key_field: &str,
    ) -> Result<BulkReport, RepoError> {
        bulk::update_posts(&self.db, patches, key_field, self.batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_columns() {
        assert_eq!(
            sea_orm::IdenStatic::as_str(&counter_column(Counter::Likes)),
            Counter::Likes.column()
        );
        assert_eq!(
            sea_orm::IdenStatic::as_str(&counter_column(Counter::Dislikes)),
            Counter::Dislikes.column()
        );
    }
}
