//! SQL user repository.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{OnConflict, Query};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryResult, Set,
};
use serde_json::{Value, json};

use blogstore_core::domain::{Billing, NewUser, User, UserChanges, mask_email, normalize_card_number};
use blogstore_core::error::RepoError;
use blogstore_core::ports::UserRepository;
use blogstore_core::query::{Page, Record, UserQuery};

use super::billing_repo::new_billing;
use super::eager::Kind;
use super::entity::user::{self, Entity as UserEntity};
use super::entity::{billing, post, post_tag};
use super::errors::{map_db_err, transactional};
use super::sql_base::{SqlBaseRepository, StoredEntity};
use super::user_query::{self, UserScopes};

/// SQL user repository.
pub type SqlUserRepository = SqlBaseRepository<UserEntity>;

impl SqlUserRepository {
    fn user_scopes(&self) -> UserScopes<'_> {
        UserScopes {
            users: &self.scopes,
            posts: self.post_scopes(),
        }
    }
}

#[async_trait]
impl StoredEntity for UserEntity {
    type Domain = User;

    const LABEL: &'static str = "User";
    const KIND: Kind = Kind::User;
    const HIDDEN: &'static [&'static str] = &["password_hash"];

    fn id_column() -> user::Column {
        user::Column::Id
    }

    fn model_id(model: &user::Model) -> i64 {
        model.id
    }

    fn read_column(row: &QueryResult, column: user::Column) -> Result<Value, DbErr> {
        let name = sea_orm::IdenStatic::as_str(&column);
        Ok(match column {
            user::Column::Id => json!(row.try_get::<i64>("", name)?),
            user::Column::Name | user::Column::Email | user::Column::PasswordHash => {
                json!(row.try_get::<String>("", name)?)
            }
            user::Column::Age => json!(row.try_get::<i32>("", name)?),
            user::Column::Banned => json!(row.try_get::<bool>("", name)?),
            user::Column::CreatedAt | user::Column::UpdatedAt => {
                json!(row.try_get::<chrono::DateTime<Utc>>("", name)?)
            }
        })
    }

    /// Billing, tag memberships of the user's posts, then the posts.
    async fn before_delete(txn: &DatabaseTransaction, id: i64) -> Result<(), RepoError> {
        billing::Entity::delete_many()
            .filter(billing::Column::UserId.eq(id))
            .exec(txn)
            .await
            .map_err(map_db_err)?;

        post_tag::Entity::delete_many()
            .filter(
                post_tag::Column::PostId.in_subquery(
                    Query::select()
                        .column(post::Column::Id)
                        .from(post::Entity)
                        .and_where(post::Column::UserId.eq(id))
                        .to_owned(),
                ),
            )
            .exec(txn)
            .await
            .map_err(map_db_err)?;

        let posts = post::Entity::delete_many()
            .filter(post::Column::UserId.eq(id))
            .exec(txn)
            .await
            .map_err(map_db_err)?;
        tracing::debug!(user_id = id, posts = posts.rows_affected, "Removed user posts");
        Ok(())
    }
}

async fn find_by_email_on<C: ConnectionTrait>(
    db: &C,
    email: &str,
) -> Result<Option<User>, RepoError> {
    let result = UserEntity::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await
        .map_err(map_db_err)?;
    Ok(result.map(Into::into))
}

#[async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        tracing::debug!(email = %mask_email(email), "Finding user by email");

        let result = self
            .scoped(UserEntity::find())
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(result.map(Into::into))
    }

    async fn create(&self, user: NewUser) -> Result<User, RepoError> {
        tracing::debug!(email = %mask_email(&user.email), "Creating user");

        let model = user::new_active_model(&user, Utc::now())
            .insert(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(model.into())
    }

    async fn create_with_billing(
        &self,
        user: NewUser,
        credit_card_number: &str,
    ) -> Result<(User, Billing), RepoError> {
        let card = normalize_card_number(credit_card_number)?;
        tracing::debug!(email = %mask_email(&user.email), "Creating user with billing");

        transactional(&self.db, "create_with_billing", move |txn| {
            Box::pin(async move {
                let user: User = user::new_active_model(&user, Utc::now())
                    .insert(txn)
                    .await
                    .map_err(map_db_err)?
                    .into();
                let billing: Billing = new_billing(user.id, card)
                    .insert(txn)
                    .await
                    .map_err(map_db_err)?
                    .into();
                Ok((user, billing))
            })
        })
        .await
    }

    async fn first_or_create(&self, user: NewUser) -> Result<User, RepoError> {
        if let Some(found) = find_by_email_on(&self.db, &user.email).await? {
            return Ok(found);
        }

        let inserted = UserEntity::insert(user::new_active_model(&user, Utc::now()))
            .on_conflict(OnConflict::column(user::Column::Email).do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await
            .map_err(map_db_err)?;
        if inserted == 0 {
            tracing::debug!(email = %mask_email(&user.email), "Lost insert race, reading winner");
        }

        find_by_email_on(&self.db, &user.email)
            .await?
            .ok_or_else(|| RepoError::Conflict(format!("user `{}` could not be stored", mask_email(&user.email))))
    }

    async fn update_or_create(&self, user: NewUser) -> Result<User, RepoError> {
        tracing::debug!(email = %mask_email(&user.email), "Upserting user");

        UserEntity::insert(user::new_active_model(&user, Utc::now()))
            .on_conflict(
                OnConflict::column(user::Column::Email)
                    .update_columns([
                        user::Column::Name,
                        user::Column::PasswordHash,
                        user::Column::Age,
                        user::Column::Banned,
                        user::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(map_db_err)?;

        find_by_email_on(&self.db, &user.email)
            .await?
            .ok_or_else(|| RepoError::not_found("User", mask_email(&user.email)))
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, RepoError> {
        changes.validate()?;
        tracing::debug!(user_id = id, "Updating user");

        if changes.is_empty() {
            return UserEntity::find_by_id(id)
                .one(&self.db)
                .await
                .map_err(map_db_err)?
                .map(Into::into)
                .ok_or_else(|| RepoError::not_found("User", id));
        }

        let mut model = user::ActiveModel {
            id: ActiveValue::Unchanged(id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(name) = changes.name.clone() {
            model.name = Set(name);
        }
        if let Some(age) = changes.age {
            model.age = Set(age);
        }
        if let Some(banned) = changes.banned {
            model.banned = Set(banned);
        }
        if let Some(hash) = changes.password_hash() {
            model.password_hash = Set(hash.to_string());
        }

        match model.update(&self.db).await {
            Ok(model) => Ok(model.into()),
            Err(DbErr::RecordNotUpdated) => Err(RepoError::not_found("User", id)),
            Err(e) => Err(map_db_err(e)),
        }
    }

    async fn get(&self, query: &UserQuery) -> Result<Vec<Record>, RepoError> {
        user_query::get(&self.db, query, self.user_scopes()).await
    }

    async fn count(&self, query: &UserQuery) -> Result<u64, RepoError> {
        user_query::count(&self.db, query, self.user_scopes()).await
    }

    async fn paginate_query(
        &self,
        query: &UserQuery,
        per_page: u64,
        page: u64,
    ) -> Result<Page<Record>, RepoError> {
        user_query::paginate(&self.db, query, self.user_scopes(), per_page, page).await
    }

    async fn load(&self, user: &User, relations: &[&str]) -> Result<Record, RepoError> {
        self.load_record(user, relations).await
    }
}
