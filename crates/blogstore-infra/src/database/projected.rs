//! A projected select: chosen columns, computed columns and an eager-load
//! plan, executed into JSON records.

use std::fmt;

use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    Condition, ConnectionTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Select, sea_query::IntoCondition,
};

use blogstore_core::error::RepoError;
use blogstore_core::query::Record;

use super::eager::EagerPlan;
use super::errors::map_db_err;
use super::records::{projection, read_record};
use super::sql_base::StoredEntity;

#[derive(Debug, Clone, Copy)]
enum Computed {
    Count,
    OptionalText,
}

pub(crate) struct ProjectedSelect<E: StoredEntity> {
    select: Select<E>,
    columns: Vec<E::Column>,
    computed: Vec<(String, Computed)>,
    plan: EagerPlan,
}

impl<E: StoredEntity> fmt::Debug for ProjectedSelect<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectedSelect")
            .field("entity", &E::LABEL)
            .field("columns", &self.columns.len())
            .field("computed", &self.computed)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl<E: StoredEntity> ProjectedSelect<E> {
    pub(crate) fn new<S: AsRef<str>>(
        requested: Option<&[String]>,
        relations: &[S],
    ) -> Result<Self, RepoError> {
        let plan = EagerPlan::new(E::KIND, relations)?;
        let columns = projection::<E>(requested, &plan.root_keys()?)?;

        let mut select = E::find().select_only();
        for column in &columns {
            select = select.column(*column);
        }

        Ok(Self {
            select,
            columns,
            computed: Vec::new(),
            plan,
        })
    }

    pub(crate) fn filter(mut self, condition: impl IntoCondition) -> Self {
        self.select = self.select.filter(condition);
        self
    }

    /// Restrict posts loaded through the eager plan.
    pub(crate) fn scope_posts(mut self, condition: Option<Condition>) -> Self {
        self.plan = self.plan.scope_posts(condition);
        self
    }

    pub(crate) fn try_map_select(
        mut self,
        f: impl FnOnce(Select<E>) -> Result<Select<E>, RepoError>,
    ) -> Result<Self, RepoError> {
        self.select = f(self.select)?;
        Ok(self)
    }

    #[cfg(test)]
    pub(crate) fn statement(&self, backend: sea_orm::DbBackend) -> String {
        self.select.clone().build(backend).to_string()
    }

    /// Add an integer column computed by `expr`, read back as `alias`.
    pub(crate) fn count_column(mut self, alias: String, expr: SimpleExpr) -> Self {
        self.select = self.select.column_as(expr, alias.as_str());
        self.computed.push((alias, Computed::Count));
        self
    }

    /// Add a nullable text column computed by `expr`, read back as `alias`.
    pub(crate) fn text_column(mut self, alias: &str, expr: SimpleExpr) -> Self {
        self.select = self.select.column_as(expr, alias);
        self.computed
            .push((alias.to_string(), Computed::OptionalText));
        self
    }

    pub(crate) async fn count<C: ConnectionTrait>(&self, db: &C) -> Result<u64, RepoError> {
        self.select.clone().count(db).await.map_err(map_db_err)
    }

    /// Run the query with `order` (plus a final id tie-breaker) and the
    /// given window, then eager-load the plan onto the records.
    pub(crate) async fn fetch<C: ConnectionTrait>(
        self,
        db: &C,
        order: Vec<(SimpleExpr, Order)>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Record>, RepoError> {
        let mut select = self.select;
        for (expr, direction) in order {
            select = select.order_by(expr, direction);
        }
        let tie_breaker: SimpleExpr = Expr::col((E::default(), E::id_column())).into();
        select = select.order_by(tie_breaker, Order::Asc);
        if let Some(limit) = limit {
            select = select.limit(limit);
        }
        if let Some(offset) = offset {
            select = select.offset(offset);
        }

        let rows = db
            .query_all(select.build(db.get_database_backend()))
            .await
            .map_err(map_db_err)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = read_record::<E>(row, &self.columns)?;
            for (alias, computed) in &self.computed {
                let value = match computed {
                    Computed::Count => row
                        .try_get::<i64>("", alias)
                        .map(serde_json::Value::from),
                    Computed::OptionalText => row
                        .try_get::<Option<String>>("", alias)
                        .map(serde_json::Value::from),
                }
                .map_err(map_db_err)?;
                record.insert(alias.clone(), value);
            }
            records.push(record);
        }

        self.plan.load(db, &mut records).await?;
        Ok(records)
    }
}
