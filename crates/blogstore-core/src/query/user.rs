use super::{Comparison, Conditional, CountClause, DateFilter, Direction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFilter {
    Ids(Vec<i64>),
    Banned(bool),
    AgeBetween(i32, i32),
    NameLike(String),
    Created(DateFilter),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOrder {
    Column(String, Direction),
    /// By the `created_at` of the user's most recent post.
    LatestPost(Direction),
}

/// Description of a user listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    pub filters: Vec<UserFilter>,
    pub bypassed_scopes: Vec<String>,
    pub relations: Vec<String>,
    pub counts: Vec<CountClause>,
    pub columns: Option<Vec<String>>,
    pub order: Vec<UserOrder>,
    /// Adds `latest_post_title` from a correlated subquery.
    pub latest_post_title: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Conditional for UserQuery {}

impl UserQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with(mut self, path: &str) -> Self {
        self.relations.push(path.to_string());
        self
    }

    pub fn with_count(mut self, relation: &str) -> Self {
        self.counts.push(CountClause {
            relation: relation.to_string(),
            filter: None,
        });
        self
    }

    pub fn with_count_where(mut self, relation: &str, op: Comparison, threshold: i64) -> Self {
        self.counts.push(CountClause {
            relation: relation.to_string(),
            filter: Some((op, threshold)),
        });
        self
    }

    pub fn without_global_scope(mut self, name: &str) -> Self {
        self.bypassed_scopes.push(name.to_string());
        self
    }

    pub fn where_ids(mut self, ids: &[i64]) -> Self {
        self.filters.push(UserFilter::Ids(ids.to_vec()));
        self
    }

    pub fn where_banned(mut self, banned: bool) -> Self {
        self.filters.push(UserFilter::Banned(banned));
        self
    }

    pub fn where_age_between(mut self, min: i32, max: i32) -> Self {
        self.filters.push(UserFilter::AgeBetween(min, max));
        self
    }

    pub fn where_name_like(mut self, needle: &str) -> Self {
        self.filters.push(UserFilter::NameLike(needle.to_string()));
        self
    }

    pub fn where_created(mut self, filter: DateFilter) -> Self {
        self.filters.push(UserFilter::Created(filter));
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order
            .push(UserOrder::Column(column.to_string(), direction));
        self
    }

    pub fn order_by_latest_post(mut self, direction: Direction) -> Self {
        self.order.push(UserOrder::LatestPost(direction));
        self
    }

    pub fn select_latest_post_title(mut self) -> Self {
        self.latest_post_title = true;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}
