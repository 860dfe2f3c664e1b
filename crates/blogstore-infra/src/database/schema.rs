//! Schema bootstrap from the entity definitions.
//!
//! Tables are created in dependency order with `IF NOT EXISTS`; there is no
//! versioning, so changing a column means recreating the database.

use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Schema};

use blogstore_core::error::RepoError;

use super::entity::{billing, category, post, post_tag, tag, user};
use super::errors::map_db_err;

async fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<(), RepoError> {
    let backend = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(map_db_err)?;
    tracing::debug!(table = entity.table_name(), "Table ready");
    Ok(())
}

/// Create every table the repositories use.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), RepoError> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, category::Entity).await?;
    create_table(db, &schema, tag::Entity).await?;
    create_table(db, &schema, post::Entity).await?;
    create_table(db, &schema, billing::Entity).await?;
    create_table(db, &schema, post_tag::Entity).await?;

    tracing::info!("Database schema ready");
    Ok(())
}
