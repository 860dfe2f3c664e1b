//! JSON records for projected rows.

use sea_orm::{ColumnTrait, IdenStatic, Iterable, QueryResult};
use serde::Serialize;

use blogstore_core::error::{DomainError, RepoError};
use blogstore_core::query::Record;

use super::errors::map_db_err;
use super::sql_base::StoredEntity;

/// Columns a caller may select: everything except hidden columns.
pub(crate) fn visible_columns<E: StoredEntity>() -> Vec<E::Column> {
    E::Column::iter()
        .filter(|column| !E::HIDDEN.contains(&column.as_str()))
        .collect()
}

pub(crate) fn resolve_column<E: StoredEntity>(name: &str) -> Result<E::Column, RepoError> {
    visible_columns::<E>()
        .into_iter()
        .find(|column| column.as_str() == name)
        .ok_or_else(|| {
            DomainError::UnknownColumn {
                entity: E::LABEL,
                column: name.to_string(),
            }
            .into()
        })
}

/// Resolve a projection, adding `required` columns that are missing.
/// `None` selects every visible column.
pub(crate) fn projection<E: StoredEntity>(
    requested: Option<&[String]>,
    required: &[&str],
) -> Result<Vec<E::Column>, RepoError> {
    let Some(requested) = requested else {
        return Ok(visible_columns::<E>());
    };

    let mut columns = Vec::with_capacity(requested.len() + required.len());
    for name in requested.iter().map(String::as_str).chain(required.iter().copied()) {
        let column = resolve_column::<E>(name)?;
        if !columns.iter().any(|c: &E::Column| c.as_str() == column.as_str()) {
            columns.push(column);
        }
    }
    Ok(columns)
}

pub(crate) fn read_record<E: StoredEntity>(
    row: &QueryResult,
    columns: &[E::Column],
) -> Result<Record, RepoError> {
    let mut record = Record::new();
    for column in columns {
        let value = E::read_column(row, *column).map_err(map_db_err)?;
        record.insert(column.as_str().to_string(), value);
    }
    Ok(record)
}

pub(crate) fn to_record<T: Serialize>(value: &T) -> Result<Record, RepoError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(record)) => Ok(record),
        Ok(other) => Err(RepoError::Internal(format!(
            "expected an object, serialized {other}"
        ))),
        Err(e) => Err(RepoError::Internal(e.to_string())),
    }
}

/// Integer value of `key` in a record, if present.
pub(crate) fn key_of(record: &Record, key: &str) -> Option<i64> {
    record.get(key).and_then(serde_json::Value::as_i64)
}
