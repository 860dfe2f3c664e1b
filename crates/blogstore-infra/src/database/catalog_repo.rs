//! SQL category and tag repositories.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryResult, Set,
};
use serde_json::{Value, json};

use blogstore_core::domain::{Category, Tag, validate_category_name, validate_tag_label};
use blogstore_core::error::RepoError;
use blogstore_core::ports::{CategoryRepository, TagRepository};
use blogstore_core::query::Record;

use super::eager::Kind;
use super::entity::category::{self, Entity as CategoryEntity};
use super::entity::tag::{self, Entity as TagEntity};
use super::entity::{post, post_tag};
use super::errors::map_db_err;
use super::sql_base::{SqlBaseRepository, StoredEntity};

/// SQL category repository.
pub type SqlCategoryRepository = SqlBaseRepository<CategoryEntity>;

/// SQL tag repository.
pub type SqlTagRepository = SqlBaseRepository<TagEntity>;

#[async_trait]
impl StoredEntity for CategoryEntity {
    type Domain = Category;

    const LABEL: &'static str = "Category";
    const KIND: Kind = Kind::Category;

    fn id_column() -> category::Column {
        category::Column::Id
    }

    fn model_id(model: &category::Model) -> i64 {
        model.id
    }

    fn read_column(row: &QueryResult, column: category::Column) -> Result<Value, DbErr> {
        let name = sea_orm::IdenStatic::as_str(&column);
        Ok(match column {
            category::Column::Id => json!(row.try_get::<i64>("", name)?),
            category::Column::Name => json!(row.try_get::<String>("", name)?),
            category::Column::CreatedAt | category::Column::UpdatedAt => {
                json!(row.try_get::<chrono::DateTime<Utc>>("", name)?)
            }
        })
    }

    /// A category still referenced by posts cannot be removed.
    async fn before_delete(txn: &DatabaseTransaction, id: i64) -> Result<(), RepoError> {
        let posts = post::Entity::find()
            .filter(post::Column::CategoryId.eq(id))
            .count(txn)
            .await
            .map_err(map_db_err)?;
        if posts > 0 {
            return Err(RepoError::Conflict(format!(
                "category {id} still has {posts} post(s)"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoredEntity for TagEntity {
    type Domain = Tag;

    const LABEL: &'static str = "Tag";
    const KIND: Kind = Kind::Tag;

    fn id_column() -> tag::Column {
        tag::Column::Id
    }

    fn model_id(model: &tag::Model) -> i64 {
        model.id
    }

    fn read_column(row: &QueryResult, column: tag::Column) -> Result<Value, DbErr> {
        let name = sea_orm::IdenStatic::as_str(&column);
        Ok(match column {
            tag::Column::Id => json!(row.try_get::<i64>("", name)?),
            tag::Column::Tag => json!(row.try_get::<String>("", name)?),
            tag::Column::CreatedAt | tag::Column::UpdatedAt => {
                json!(row.try_get::<chrono::DateTime<Utc>>("", name)?)
            }
        })
    }

    async fn before_delete(txn: &DatabaseTransaction, id: i64) -> Result<(), RepoError> {
        post_tag::Entity::delete_many()
            .filter(post_tag::Column::TagId.eq(id))
            .exec(txn)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }
}

async fn find_tag<C: ConnectionTrait>(db: &C, label: &str) -> Result<Option<Tag>, RepoError> {
    let result = TagEntity::find()
        .filter(tag::Column::Tag.eq(label))
        .one(db)
        .await
        .map_err(map_db_err)?;
    Ok(result.map(Into::into))
}

/// Fetch the tag with this label, inserting it when missing. Runs on any
/// connection so it can take part in a caller's transaction.
pub(crate) async fn first_or_create_tag<C: ConnectionTrait>(
    db: &C,
    label: &str,
) -> Result<Tag, RepoError> {
    let label = validate_tag_label(label)?;
    if let Some(found) = find_tag(db, &label).await? {
        return Ok(found);
    }

    let now = Utc::now();
    TagEntity::insert(tag::ActiveModel {
        tag: Set(label.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    })
    .on_conflict(OnConflict::column(tag::Column::Tag).do_nothing().to_owned())
    .exec_without_returning(db)
    .await
    .map_err(map_db_err)?;

    find_tag(db, &label)
        .await?
        .ok_or_else(|| RepoError::Conflict(format!("tag `{label}` could not be stored")))
}

async fn find_category<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Option<Category>, RepoError> {
    let result = CategoryEntity::find()
        .filter(category::Column::Name.eq(name))
        .one(db)
        .await
        .map_err(map_db_err)?;
    Ok(result.map(Into::into))
}

fn new_category(name: String) -> category::ActiveModel {
    let now = Utc::now();
    category::ActiveModel {
        name: Set(name),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
}

#[async_trait]
impl CategoryRepository for SqlCategoryRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepoError> {
        tracing::debug!(name, "Finding category by name");
        find_category(&self.db, name.trim()).await
    }

    async fn create(&self, name: &str) -> Result<Category, RepoError> {
        let name = validate_category_name(name)?;
        tracing::debug!(name = %name, "Creating category");

        let model = new_category(name)
            .insert(&self.db)
            .await
            .map_err(map_db_err)?;
        Ok(model.into())
    }

    async fn first_or_create(&self, name: &str) -> Result<Category, RepoError> {
        let name = validate_category_name(name)?;
        if let Some(found) = find_category(&self.db, &name).await? {
            return Ok(found);
        }

        CategoryEntity::insert(new_category(name.clone()))
            .on_conflict(
                OnConflict::column(category::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(map_db_err)?;

        find_category(&self.db, &name)
            .await?
            .ok_or_else(|| RepoError::Conflict(format!("category `{name}` could not be stored")))
    }

    async fn rename(&self, id: i64, name: &str) -> Result<Category, RepoError> {
        let name = validate_category_name(name)?;
        tracing::debug!(category_id = id, name = %name, "Renaming category");

        let model = category::ActiveModel {
            id: ActiveValue::Unchanged(id),
            name: Set(name),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        match model.update(&self.db).await {
            Ok(model) => Ok(model.into()),
            Err(DbErr::RecordNotUpdated) => Err(RepoError::not_found("Category", id)),
            Err(e) => Err(map_db_err(e)),
        }
    }

    async fn load(&self, category: &Category, relations: &[&str]) -> Result<Record, RepoError> {
        self.load_record(category, relations).await
    }
}

#[async_trait]
impl TagRepository for SqlTagRepository {
    async fn find_by_label(&self, label: &str) -> Result<Option<Tag>, RepoError> {
        tracing::debug!(label, "Finding tag by label");
        find_tag(&self.db, label.trim()).await
    }

    async fn create(&self, label: &str) -> Result<Tag, RepoError> {
        let label = validate_tag_label(label)?;
        let now = Utc::now();
        let model = tag::ActiveModel {
            tag: Set(label),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(map_db_err)?;
        Ok(model.into())
    }

    async fn first_or_create(&self, label: &str) -> Result<Tag, RepoError> {
        first_or_create_tag(&self.db, label).await
    }

    async fn load(&self, tag: &Tag, relations: &[&str]) -> Result<Record, RepoError> {
        self.load_record(tag, relations).await
    }
}
