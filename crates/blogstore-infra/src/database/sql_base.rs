use std::marker::PhantomData;
use std::ops::ControlFlow;

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QueryResult, QuerySelect, Select,
};
use serde::Serialize;

use blogstore_core::error::RepoError;
use blogstore_core::ports::BaseRepository;
use blogstore_core::query::{Page, Record, page_offset};

use super::eager::{EagerPlan, Kind};
use super::errors::{map_db_err, transactional};
use super::records::to_record;
use super::scopes::{GlobalScope, GlobalScopes};

/// Lowest batch size used by bulk writes.
pub const MIN_BULK_BATCH: u64 = 100;

/// What the generic SQL repository needs to know about a table.
#[async_trait]
pub trait StoredEntity: EntityTrait<Model: Sync> {
    type Domain: From<Self::Model> + Serialize + Send + Sync + 'static;

    /// Name used in errors and logs.
    const LABEL: &'static str;
    const KIND: Kind;
    /// Columns never selected into records.
    const HIDDEN: &'static [&'static str] = &[];

    fn id_column() -> Self::Column;

    fn model_id(model: &Self::Model) -> i64;

    /// Read one selected column as JSON.
    fn read_column(row: &QueryResult, column: Self::Column)
    -> Result<serde_json::Value, DbErr>;

    /// Association cleanup run in the delete transaction, before the row
    /// itself is removed.
    async fn before_delete(_txn: &DatabaseTransaction, _id: i64) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Generic SQL repository implementation.
pub struct SqlBaseRepository<E>
where
    E: EntityTrait,
{
    pub(crate) db: DatabaseConnection,
    pub(crate) scopes: GlobalScopes,
    /// Scopes for posts reached through relations and subqueries.
    pub(crate) post_scopes: GlobalScopes,
    pub(crate) batch_size: u64,
    _entity: PhantomData<E>,
}

impl<E> Clone for SqlBaseRepository<E>
where
    E: EntityTrait,
{
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            scopes: self.scopes.clone(),
            post_scopes: self.post_scopes.clone(),
            batch_size: self.batch_size,
            _entity: PhantomData,
        }
    }
}

impl<E> SqlBaseRepository<E>
where
    E: EntityTrait,
{
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            scopes: GlobalScopes::default(),
            post_scopes: GlobalScopes::default(),
            batch_size: MIN_BULK_BATCH,
            _entity: PhantomData,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(MIN_BULK_BATCH);
        self
    }

    /// Attach a scope applied to every read through this repository.
    pub fn with_global_scope(mut self, scope: impl Into<GlobalScope>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub(crate) fn with_scopes(mut self, scopes: GlobalScopes) -> Self {
        self.scopes = scopes;
        self
    }

    pub(crate) fn with_post_scopes(mut self, scopes: GlobalScopes) -> Self {
        self.post_scopes = scopes;
        self
    }

    /// A copy of this repository without the named scope, on its own rows
    /// and on related posts.
    pub fn without_global_scope(&self, name: &str) -> Self {
        let mut repo = self.clone();
        repo.scopes.remove(name);
        repo.post_scopes.remove(name);
        repo
    }

    pub fn global_scopes(&self) -> Vec<&str> {
        self.scopes.names()
    }

    pub(crate) fn scoped(&self, select: Select<E>) -> Select<E> {
        self.scopes.apply(select, &[])
    }
}

impl<E> SqlBaseRepository<E>
where
    E: StoredEntity,
{
    /// Scopes in force for posts: the repository's own when it stores posts.
    pub(crate) fn post_scopes(&self) -> &GlobalScopes {
        if E::KIND == Kind::Post {
            &self.scopes
        } else {
            &self.post_scopes
        }
    }

    /// Eager-load `relations` onto an already materialised entity.
    pub(crate) async fn load_record(
        &self,
        value: &E::Domain,
        relations: &[&str],
    ) -> Result<Record, RepoError> {
        let plan = EagerPlan::new(E::KIND, relations)?
            .scope_posts(self.post_scopes().condition(&[]));
        let mut records = vec![to_record(value)?];
        plan.load(&self.db, &mut records).await?;
        records
            .pop()
            .ok_or_else(|| RepoError::Internal("eager load dropped the record".into()))
    }
}

#[async_trait]
impl<E> BaseRepository<E::Domain, i64> for SqlBaseRepository<E>
where
    E: StoredEntity,
{
    fn entity_name(&self) -> &'static str {
        E::LABEL
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<E::Domain>, RepoError> {
        tracing::debug!(entity = E::LABEL, id, "Finding by id");

        let result = self
            .scoped(E::find())
            .filter(E::id_column().eq(id))
            .one(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(result.map(Into::into))
    }

    async fn find_many(&self, ids: &[i64]) -> Result<Vec<E::Domain>, RepoError> {
        tracing::debug!(entity = E::LABEL, count = ids.len(), "Finding many");
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let result = self
            .scoped(E::find())
            .filter(E::id_column().is_in(ids.iter().copied()))
            .order_by_asc(E::id_column())
            .all(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(result.into_iter().map(Into::into).collect())
    }

    async fn paginate(&self, per_page: u64, page: u64) -> Result<Page<E::Domain>, RepoError> {
        page_offset(per_page, page)?;
        tracing::debug!(entity = E::LABEL, per_page, page, "Paginating");

        let paginator = self
            .scoped(E::find())
            .order_by_asc(E::id_column())
            .paginate(&self.db, per_page);
        let total = paginator.num_items().await.map_err(map_db_err)?;
        let models = paginator.fetch_page(page - 1).await.map_err(map_db_err)?;

        Ok(Page::new(
            models.into_iter().map(Into::into).collect(),
            total,
            per_page,
            page,
        ))
    }

    async fn manual_page(&self, limit: u64, offset: u64) -> Result<Vec<E::Domain>, RepoError> {
        let result = self
            .scoped(E::find())
            .order_by_asc(E::id_column())
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(result.into_iter().map(Into::into).collect())
    }

    async fn chunk(
        &self,
        size: u64,
        visitor: &mut (dyn FnMut(Vec<E::Domain>) -> ControlFlow<()> + Send),
    ) -> Result<u64, RepoError> {
        if size == 0 {
            return Err(RepoError::Validation("chunk size must be at least 1".into()));
        }

        let mut last_seen: Option<i64> = None;
        let mut batches = 0;
        loop {
            let mut select = self
                .scoped(E::find())
                .order_by_asc(E::id_column())
                .limit(size);
            if let Some(last) = last_seen {
                select = select.filter(E::id_column().gt(last));
            }

            let models = select.all(&self.db).await.map_err(map_db_err)?;
            let Some(last) = models.last() else {
                break;
            };
            last_seen = Some(E::model_id(last));
            let full = models.len() as u64 == size;

            batches += 1;
            tracing::debug!(entity = E::LABEL, batch = batches, rows = models.len(), "Chunk");
            if visitor(models.into_iter().map(Into::into).collect()).is_break() || !full {
                break;
            }
        }

        Ok(batches)
    }

    async fn delete(&self, id: i64) -> Result<(), RepoError> {
        tracing::debug!(entity = E::LABEL, id, "Deleting");

        transactional(&self.db, "delete", move |txn| {
            Box::pin(async move {
                let exists = E::find()
                    .filter(E::id_column().eq(id))
                    .one(txn)
                    .await
                    .map_err(map_db_err)?;
                if exists.is_none() {
                    return Err(RepoError::not_found(E::LABEL, id));
                }

                E::before_delete(txn, id).await?;
                E::delete_many()
                    .filter(E::id_column().eq(id))
                    .exec(txn)
                    .await
                    .map_err(map_db_err)?;
                Ok(())
            })
        })
        .await
    }
}
