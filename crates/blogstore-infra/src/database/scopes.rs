//! Named global scopes: predicates a repository adds to every read unless
//! a query bypasses them by name.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Query;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, Select};

use blogstore_core::query::PostScope;

use super::entity::{post, post_tag};
use super::filters::month_bounds;

type Predicate = Arc<dyn Fn() -> Condition + Send + Sync>;

/// A named predicate, evaluated each time a query is built.
#[derive(Clone)]
pub struct GlobalScope {
    name: String,
    predicate: Predicate,
}

impl GlobalScope {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn() -> Condition + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> Condition {
        (self.predicate)()
    }
}

impl fmt::Debug for GlobalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalScope")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl From<PostScope> for GlobalScope {
    fn from(scope: PostScope) -> Self {
        let name = scope.name();
        GlobalScope::new(name, move || post_scope_condition(&scope))
    }
}

/// Condition for a named post scope.
pub(crate) fn post_scope_condition(scope: &PostScope) -> Condition {
    match scope {
        PostScope::CurrentMonth => {
            let (start, end) = month_bounds(Utc::now());
            Condition::all()
                .add(post::Column::CreatedAt.gte(start))
                .add(post::Column::CreatedAt.lt(end))
        }
        PostScope::WithTags => Condition::all().add(
            post::Column::Id.in_subquery(
                Query::select()
                    .column(post_tag::Column::PostId)
                    .from(post_tag::Entity)
                    .to_owned(),
            ),
        ),
        PostScope::Popular { min_likes } => {
            Condition::all().add(post::Column::Likes.gte(*min_likes))
        }
    }
}

/// The global scopes attached to one repository.
#[derive(Clone, Debug, Default)]
pub struct GlobalScopes {
    scopes: Vec<GlobalScope>,
}

impl GlobalScopes {
    /// Attach a scope, replacing any scope with the same name.
    pub fn push(&mut self, scope: GlobalScope) {
        self.scopes.retain(|existing| existing.name != scope.name);
        self.scopes.push(scope);
    }

    pub fn remove(&mut self, name: &str) {
        self.scopes.retain(|scope| scope.name != name);
    }

    pub fn names(&self) -> Vec<&str> {
        self.scopes.iter().map(|scope| scope.name()).collect()
    }

    /// Conjunction of every scope not listed in `bypassed`, if any remain.
    pub fn condition(&self, bypassed: &[String]) -> Option<Condition> {
        let active: Vec<&GlobalScope> = self
            .scopes
            .iter()
            .filter(|scope| !bypassed.iter().any(|name| name == &scope.name))
            .collect();
        if active.is_empty() {
            return None;
        }
        Some(
            active
                .into_iter()
                .fold(Condition::all(), |all, scope| all.add(scope.condition())),
        )
    }

    pub fn apply<E: EntityTrait>(&self, select: Select<E>, bypassed: &[String]) -> Select<E> {
        match self.condition(bypassed) {
            Some(condition) => select.filter(condition),
            None => select,
        }
    }
}
