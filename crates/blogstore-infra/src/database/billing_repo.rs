//! SQL billing repository.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryResult, Set,
};
use serde_json::{Value, json};

use blogstore_core::domain::{Billing, normalize_card_number};
use blogstore_core::error::RepoError;
use blogstore_core::ports::BillingRepository;

use super::eager::Kind;
use super::entity::billing::{self, Entity as BillingEntity};
use super::errors::map_db_err;
use super::sql_base::{SqlBaseRepository, StoredEntity};

/// SQL billing repository.
pub type SqlBillingRepository = SqlBaseRepository<BillingEntity>;

#[async_trait]
impl StoredEntity for BillingEntity {
    type Domain = Billing;

    const LABEL: &'static str = "Billing";
    const KIND: Kind = Kind::Billing;

    fn id_column() -> billing::Column {
        billing::Column::Id
    }

    fn model_id(model: &billing::Model) -> i64 {
        model.id
    }

    fn read_column(row: &QueryResult, column: billing::Column) -> Result<Value, DbErr> {
        let name = sea_orm::IdenStatic::as_str(&column);
        Ok(match column {
            billing::Column::Id | billing::Column::UserId => json!(row.try_get::<i64>("", name)?),
            billing::Column::CreditCardNumber => json!(row.try_get::<String>("", name)?),
            billing::Column::CreatedAt | billing::Column::UpdatedAt => {
                json!(row.try_get::<chrono::DateTime<Utc>>("", name)?)
            }
        })
    }
}

pub(crate) fn new_billing(user_id: i64, card: String) -> billing::ActiveModel {
    let now = Utc::now();
    billing::ActiveModel {
        user_id: Set(user_id),
        credit_card_number: Set(card),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
}

pub(crate) async fn find_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
) -> Result<Option<Billing>, RepoError> {
    let result = BillingEntity::find()
        .filter(billing::Column::UserId.eq(user_id))
        .one(db)
        .await
        .map_err(map_db_err)?;
    Ok(result.map(Into::into))
}

#[async_trait]
impl BillingRepository for SqlBillingRepository {
    async fn find_by_user(&self, user_id: i64) -> Result<Option<Billing>, RepoError> {
        tracing::debug!(user_id, "Finding billing by user");
        find_for_user(&self.db, user_id).await
    }

    async fn update_or_create(
        &self,
        user_id: i64,
        credit_card_number: &str,
    ) -> Result<Billing, RepoError> {
        let card = normalize_card_number(credit_card_number)?;
        tracing::debug!(user_id, "Upserting billing");

        BillingEntity::insert(new_billing(user_id, card))
            .on_conflict(
                OnConflict::column(billing::Column::UserId)
                    .update_columns([
                        billing::Column::CreditCardNumber,
                        billing::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(map_db_err)?;

        find_for_user(&self.db, user_id)
            .await?
            .ok_or_else(|| RepoError::not_found("Billing", user_id))
    }
}
