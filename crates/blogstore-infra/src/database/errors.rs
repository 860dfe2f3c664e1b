//! Translation of driver errors into repository errors, and the
//! transaction wrapper every multi-statement write goes through.

use std::future::Future;
use std::pin::Pin;

use sea_orm::{
    DatabaseConnection, DatabaseTransaction, DbErr, SqlErr, TransactionError, TransactionTrait,
};

use blogstore_core::error::RepoError;

/// Classify a SeaORM error.
pub(crate) fn map_db_err(err: DbErr) -> RepoError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => RepoError::Conflict(detail),
        Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
            RepoError::Validation(format!("referenced row does not exist: {detail}"))
        }
        _ => match err {
            DbErr::Conn(e) => RepoError::Connection(e.to_string()),
            DbErr::ConnectionAcquire(e) => RepoError::Connection(e.to_string()),
            other => RepoError::Query(other.to_string()),
        },
    }
}

/// Run `work` inside one transaction. Any error rolls the transaction back
/// and comes out as `RepoError::Transaction` naming `operation`.
pub(crate) async fn transactional<T, F>(
    db: &DatabaseConnection,
    operation: &'static str,
    work: F,
) -> Result<T, RepoError>
where
    T: Send,
    F: for<'c> FnOnce(
            &'c DatabaseTransaction,
        ) -> Pin<Box<dyn Future<Output = Result<T, RepoError>> + Send + 'c>>
        + Send,
{
    db.transaction::<F, T, RepoError>(work)
        .await
        .map_err(|err| match err {
            TransactionError::Connection(e) => map_db_err(e),
            TransactionError::Transaction(source) => {
                tracing::warn!(operation, error = %source, "Transaction rolled back");
                RepoError::Transaction {
                    operation,
                    source: Box::new(source),
                }
            }
        })
}
