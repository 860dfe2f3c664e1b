use std::fmt::Display;
use std::ops::ControlFlow;

use async_trait::async_trait;

use crate::domain::{
    Billing, Category, Counter, NewPost, NewUser, Post, PostChanges, Tag, User, UserChanges,
};
use crate::error::RepoError;
use crate::query::{
    BulkReport, Comparison, GroupTotal, Page, PostQuery, Record, RowPatch, UserQuery,
};

/// Generic repository trait defining the operations every entity supports.
#[async_trait]
pub trait BaseRepository<T, ID>: Send + Sync
where
    T: Send + 'static,
    ID: Copy + Display + Send + Sync + 'static,
{
    /// Entity name used in error messages.
    fn entity_name(&self) -> &'static str;

    /// Find an entity by its unique ID.
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, RepoError>;

    /// Find an entity by ID or fail with `RepoError::NotFound`.
    async fn find_by_id_or_fail(&self, id: ID) -> Result<T, RepoError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::not_found(self.entity_name(), id))
    }

    /// Find every entity whose ID is listed; missing IDs are skipped.
    async fn find_many(&self, ids: &[ID]) -> Result<Vec<T>, RepoError>;

    /// One page (1-based) plus the total row count.
    async fn paginate(&self, per_page: u64, page: u64) -> Result<Page<T>, RepoError>;

    /// Plain limit/offset slice without a count query.
    async fn manual_page(&self, limit: u64, offset: u64) -> Result<Vec<T>, RepoError>;

    /// Visit every row in batches of `size`, in ID order. Returns the number
    /// of batches handed to `visitor`.
    async fn chunk(
        &self,
        size: u64,
        visitor: &mut (dyn FnMut(Vec<T>) -> ControlFlow<()> + Send),
    ) -> Result<u64, RepoError>;

    /// Delete an entity and its owned associations in one transaction.
    async fn delete(&self, id: ID) -> Result<(), RepoError>;
}

/// Post repository.
#[async_trait]
pub trait PostRepository: BaseRepository<Post, i64> {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, RepoError>;

    async fn create(&self, post: NewPost) -> Result<Post, RepoError>;

    /// Insert the post, first-or-create each tag and attach it, atomically.
    async fn create_with_tags(&self, post: NewPost, tags: &[&str]) -> Result<Post, RepoError>;

    /// Return the post with this title, inserting `post` if there is none.
    async fn first_or_create(&self, post: NewPost) -> Result<Post, RepoError>;

    /// Upsert keyed by the title's slug.
    async fn update_or_create(&self, post: NewPost) -> Result<Post, RepoError>;

    async fn update(&self, id: i64, changes: PostChanges) -> Result<Post, RepoError>;

    /// Add `amount` to a counter in the store, optionally applying `extra`
    /// in the same statement. Counters never drop below zero.
    async fn increment(
        &self,
        id: i64,
        counter: Counter,
        amount: i64,
        extra: PostChanges,
    ) -> Result<Post, RepoError>;

    async fn decrement(
        &self,
        id: i64,
        counter: Counter,
        amount: i64,
        extra: PostChanges,
    ) -> Result<Post, RepoError> {
        let delta = amount.checked_neg().ok_or_else(|| {
            RepoError::Validation(format!("cannot decrement {} by {amount}", counter.column()))
        })?;
        self.increment(id, counter, delta, extra).await
    }

    async fn attach_tag(&self, post_id: i64, tag_id: i64) -> Result<(), RepoError>;

    /// Remove the listed memberships, or all of them with `None`.
    async fn detach_tags(&self, post_id: i64, tag_ids: Option<&[i64]>) -> Result<u64, RepoError>;

    async fn get(&self, query: &PostQuery) -> Result<Vec<Record>, RepoError>;

    async fn first(&self, query: &PostQuery) -> Result<Option<Record>, RepoError>;

    async fn count(&self, query: &PostQuery) -> Result<u64, RepoError>;

    async fn paginate_query(
        &self,
        query: &PostQuery,
        per_page: u64,
        page: u64,
    ) -> Result<Page<Record>, RepoError>;

    /// Eager-load relations onto an already materialised post.
    async fn load(&self, post: &Post, relations: &[&str]) -> Result<Record, RepoError>;

    /// `SUM(field)` grouped by `group_by`, optionally filtered by `HAVING`.
    async fn sum_grouped(
        &self,
        query: &PostQuery,
        group_by: &str,
        field: &str,
        having: Option<(Comparison, i64)>,
    ) -> Result<Vec<GroupTotal>, RepoError>;

    async fn bulk_insert(&self, posts: Vec<NewPost>) -> Result<BulkReport, RepoError>;

    async fn bulk_update(
        &self,
        patches: Vec<RowPatch>,
        key_field: &str,
    ) -> Result<BulkReport, RepoError>;
}

/// User repository with domain-specific methods.
#[async_trait]
pub trait UserRepository: BaseRepository<User, i64> {
    /// Find a user by their email address.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;

    async fn create(&self, user: NewUser) -> Result<User, RepoError>;

    /// Insert the user and their billing details atomically.
    async fn create_with_billing(
        &self,
        user: NewUser,
        credit_card_number: &str,
    ) -> Result<(User, Billing), RepoError>;

    /// Return the user with this email, inserting `user` if there is none.
    async fn first_or_create(&self, user: NewUser) -> Result<User, RepoError>;

    /// Upsert keyed by email.
    async fn update_or_create(&self, user: NewUser) -> Result<User, RepoError>;

    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, RepoError>;

    async fn get(&self, query: &UserQuery) -> Result<Vec<Record>, RepoError>;

    async fn count(&self, query: &UserQuery) -> Result<u64, RepoError>;

    async fn paginate_query(
        &self,
        query: &UserQuery,
        per_page: u64,
        page: u64,
    ) -> Result<Page<Record>, RepoError>;

    async fn load(&self, user: &User, relations: &[&str]) -> Result<Record, RepoError>;
}

/// Category repository.
#[async_trait]
pub trait CategoryRepository: BaseRepository<Category, i64> {
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepoError>;

    async fn create(&self, name: &str) -> Result<Category, RepoError>;

    async fn first_or_create(&self, name: &str) -> Result<Category, RepoError>;

    async fn rename(&self, id: i64, name: &str) -> Result<Category, RepoError>;

    async fn load(&self, category: &Category, relations: &[&str]) -> Result<Record, RepoError>;
}

/// Tag repository.
#[async_trait]
pub trait TagRepository: BaseRepository<Tag, i64> {
    async fn find_by_label(&self, label: &str) -> Result<Option<Tag>, RepoError>;

    async fn create(&self, label: &str) -> Result<Tag, RepoError>;

    async fn first_or_create(&self, label: &str) -> Result<Tag, RepoError>;

    async fn load(&self, tag: &Tag, relations: &[&str]) -> Result<Record, RepoError>;
}

/// Billing repository; one row per user.
#[async_trait]
pub trait BillingRepository: BaseRepository<Billing, i64> {
    async fn find_by_user(&self, user_id: i64) -> Result<Option<Billing>, RepoError>;

    /// Upsert keyed by `user_id`.
    async fn update_or_create(
        &self,
        user_id: i64,
        credit_card_number: &str,
    ) -> Result<Billing, RepoError>;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    struct Names(Mutex<BTreeMap<i64, String>>);

    #[async_trait]
    impl BaseRepository<String, i64> for Names {
        fn entity_name(&self) -> &'static str {
            "Name"
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<String>, RepoError> {
            Ok(self.0.lock().unwrap().get(&id).cloned())
        }

        async fn find_many(&self, ids: &[i64]) -> Result<Vec<String>, RepoError> {
            let names = self.0.lock().unwrap();
            Ok(ids.iter().filter_map(|id| names.get(id).cloned()).collect())
        }

        async fn paginate(&self, per_page: u64, page: u64) -> Result<Page<String>, RepoError> {
            let names = self.0.lock().unwrap();
            let offset = crate::query::page_offset(per_page, page)?;
            let data = names
                .values()
                .skip(offset as usize)
                .take(per_page as usize)
                .cloned()
                .collect();
            Ok(Page::new(data, names.len() as u64, per_page, page))
        }

        async fn manual_page(&self, limit: u64, offset: u64) -> Result<Vec<String>, RepoError> {
            let names = self.0.lock().unwrap();
            Ok(names
                .values()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn chunk(
            &self,
            size: u64,
            visitor: &mut (dyn FnMut(Vec<String>) -> ControlFlow<()> + Send),
        ) -> Result<u64, RepoError> {
            let names: Vec<String> = self.0.lock().unwrap().values().cloned().collect();
            let mut batches = 0;
            for batch in names.chunks(size as usize) {
                batches += 1;
                if visitor(batch.to_vec()).is_break() {
                    break;
                }
            }
            Ok(batches)
        }

        async fn delete(&self, id: i64) -> Result<(), RepoError> {
            self.0
                .lock()
                .unwrap()
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| RepoError::not_found("Name", id))
        }
    }

    #[tokio::test]
    async fn test_find_by_id_or_fail_reports_entity_and_key() {
        let repo = Names(Mutex::new(BTreeMap::from([(1, "one".to_string())])));

        assert_eq!(repo.find_by_id_or_fail(1).await.unwrap(), "one");

        let err = repo.find_by_id_or_fail(2).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Name not found: 2");
    }
}
