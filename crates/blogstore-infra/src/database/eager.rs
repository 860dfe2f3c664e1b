//! Eager loading of relation graphs.
//!
//! Each node of a relation tree costs one query: the keys of every parent
//! record are collected, the related rows are fetched with a single
//! `IN (...)` filter, nested nodes are loaded onto those rows, and the
//! results are stitched back onto their parents.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;

use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, JoinType, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, RelationDef, RelationTrait,
};
use serde_json::Value;

use blogstore_core::error::{DomainError, RepoError};
use blogstore_core::query::{Record, RelationNode, relation_tree};

use super::entity::{billing, category, post, post_tag, tag, user};
use super::errors::map_db_err;
use super::records::{key_of, projection, read_record, resolve_column};
use super::sql_base::StoredEntity;

/// Alias of the join-table key carried by many-to-many rows while stitching.
const PIVOT: &str = "__pivot";

/// The entities a relation can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    User,
    Billing,
    Category,
    Post,
    Tag,
}

impl Kind {
    pub fn label(self) -> &'static str {
        match self {
            Kind::User => "User",
            Kind::Billing => "Billing",
            Kind::Category => "Category",
            Kind::Post => "Post",
            Kind::Tag => "Tag",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Link {
    /// `parent.foreign_key = child.id`
    BelongsTo { foreign_key: &'static str },
    /// `child.foreign_key = parent.id`, at most one child.
    HasOne { foreign_key: &'static str },
    /// `child.foreign_key = parent.id`
    HasMany { foreign_key: &'static str },
    /// Through `post_tag`, whose `pivot` column holds the parent id.
    ManyToMany { pivot: post_tag::Column },
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    name: &'static str,
    target: Kind,
    link: Link,
    order_by: Option<&'static str>,
}

const POST_EDGES: &[Edge] = &[
    Edge {
        name: "user",
        target: Kind::User,
        link: Link::BelongsTo {
            foreign_key: "user_id",
        },
        order_by: None,
    },
    Edge {
        name: "category",
        target: Kind::Category,
        link: Link::BelongsTo {
            foreign_key: "category_id",
        },
        order_by: None,
    },
    Edge {
        name: "tags",
        target: Kind::Tag,
        link: Link::ManyToMany {
            pivot: post_tag::Column::PostId,
        },
        order_by: None,
    },
    Edge {
        name: "sorted_tags",
        target: Kind::Tag,
        link: Link::ManyToMany {
            pivot: post_tag::Column::PostId,
        },
        order_by: Some("tag"),
    },
];

const USER_EDGES: &[Edge] = &[
    Edge {
        name: "billing",
        target: Kind::Billing,
        link: Link::HasOne {
            foreign_key: "user_id",
        },
        order_by: None,
    },
    Edge {
        name: "posts",
        target: Kind::Post,
        link: Link::HasMany {
            foreign_key: "user_id",
        },
        order_by: None,
    },
];

const CATEGORY_EDGES: &[Edge] = &[Edge {
    name: "posts",
    target: Kind::Post,
    link: Link::HasMany {
        foreign_key: "category_id",
    },
    order_by: None,
}];

const TAG_EDGES: &[Edge] = &[Edge {
    name: "posts",
    target: Kind::Post,
    link: Link::ManyToMany {
        pivot: post_tag::Column::TagId,
    },
    order_by: None,
}];

const BILLING_EDGES: &[Edge] = &[Edge {
    name: "user",
    target: Kind::User,
    link: Link::BelongsTo {
        foreign_key: "user_id",
    },
    order_by: None,
}];

fn edges(kind: Kind) -> &'static [Edge] {
    match kind {
        Kind::User => USER_EDGES,
        Kind::Billing => BILLING_EDGES,
        Kind::Category => CATEGORY_EDGES,
        Kind::Post => POST_EDGES,
        Kind::Tag => TAG_EDGES,
    }
}

fn edge(kind: Kind, name: &str) -> Result<&'static Edge, RepoError> {
    edges(kind)
        .iter()
        .find(|edge| edge.name == name)
        .ok_or_else(|| {
            DomainError::UnknownRelation {
                entity: kind.label(),
                relation: name.to_string(),
            }
            .into()
        })
}

fn check_column(kind: Kind, name: &str) -> Result<(), RepoError> {
    match kind {
        Kind::User => resolve_column::<user::Entity>(name).map(drop),
        Kind::Billing => resolve_column::<billing::Entity>(name).map(drop),
        Kind::Category => resolve_column::<category::Entity>(name).map(drop),
        Kind::Post => resolve_column::<post::Entity>(name).map(drop),
        Kind::Tag => resolve_column::<tag::Entity>(name).map(drop),
    }
}

fn validate(kind: Kind, nodes: &[RelationNode]) -> Result<(), RepoError> {
    for node in nodes {
        let edge = edge(kind, &node.name)?;
        for column in node.columns.iter().flatten() {
            check_column(edge.target, column)?;
        }
        validate(edge.target, &node.children)?;
    }
    Ok(())
}

/// Columns a record of `kind` must carry so `nodes` can be stitched onto it.
fn required_keys(kind: Kind, nodes: &[RelationNode]) -> Result<Vec<&'static str>, RepoError> {
    let mut keys = Vec::new();
    for node in nodes {
        let key = match edge(kind, &node.name)?.link {
            Link::BelongsTo { foreign_key } => foreign_key,
            _ => "id",
        };
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    Ok(keys)
}

/// A validated relation tree for one root entity.
#[derive(Debug, Clone)]
pub(crate) struct EagerPlan {
    kind: Kind,
    nodes: Vec<RelationNode>,
    /// Global post scopes still in force, applied wherever posts are loaded.
    posts: Option<Condition>,
}

impl EagerPlan {
    pub(crate) fn new<S: AsRef<str>>(kind: Kind, relations: &[S]) -> Result<Self, RepoError> {
        let nodes = relation_tree(relations)?;
        validate(kind, &nodes)?;
        Ok(Self {
            kind,
            nodes,
            posts: None,
        })
    }

    pub(crate) fn scope_posts(mut self, condition: Option<Condition>) -> Self {
        self.posts = condition;
        self
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Columns the root query has to select for stitching.
    pub(crate) fn root_keys(&self) -> Result<Vec<&'static str>, RepoError> {
        required_keys(self.kind, &self.nodes)
    }

    pub(crate) async fn load<C: ConnectionTrait>(
        &self,
        db: &C,
        records: &mut [Record],
    ) -> Result<(), RepoError> {
        if self.nodes.is_empty() || records.is_empty() {
            return Ok(());
        }
        load_level(db, self.kind, records, &self.nodes, self.posts.as_ref()).await
    }
}

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RepoError>> + Send + 'a>>;

fn load_level<'a, C: ConnectionTrait>(
    db: &'a C,
    kind: Kind,
    records: &'a mut [Record],
    nodes: &'a [RelationNode],
    posts: Option<&'a Condition>,
) -> LoadFuture<'a> {
    Box::pin(async move {
        for node in nodes {
            let edge = edge(kind, &node.name)?;
            let parent_key = match edge.link {
                Link::BelongsTo { foreign_key } => foreign_key,
                _ => "id",
            };
            let keys: BTreeSet<i64> = records
                .iter()
                .filter_map(|record| key_of(record, parent_key))
                .collect();

            let mut children = if keys.is_empty() {
                Vec::new()
            } else {
                let mut required = vec!["id"];
                if let Link::HasOne { foreign_key } | Link::HasMany { foreign_key } = edge.link {
                    required.push(foreign_key);
                }
                required.extend(required_keys(edge.target, &node.children)?);
                let keys: Vec<i64> = keys.into_iter().collect();
                fetch(db, edge, node.columns.as_deref(), &required, keys, posts).await?
            };

            if !node.children.is_empty() && !children.is_empty() {
                load_level(db, edge.target, &mut children, &node.children, posts).await?;
            }
            tracing::debug!(
                entity = kind.label(),
                relation = edge.name,
                rows = children.len(),
                "Eager loaded relation"
            );
            stitch(edge, records, children);
        }
        Ok(())
    })
}

async fn fetch<C: ConnectionTrait>(
    db: &C,
    edge: &Edge,
    columns: Option<&[String]>,
    required: &[&str],
    keys: Vec<i64>,
    posts: Option<&Condition>,
) -> Result<Vec<Record>, RepoError> {
    match edge.target {
        Kind::User => fetch_rows::<user::Entity, C>(db, edge, columns, required, keys, None).await,
        Kind::Billing => {
            fetch_rows::<billing::Entity, C>(db, edge, columns, required, keys, None).await
        }
        Kind::Category => {
            fetch_rows::<category::Entity, C>(db, edge, columns, required, keys, None).await
        }
        Kind::Post => {
            fetch_rows::<post::Entity, C>(db, edge, columns, required, keys, posts).await
        }
        Kind::Tag => fetch_rows::<tag::Entity, C>(db, edge, columns, required, keys, None).await,
    }
}

/// Join from a many-to-many target to `post_tag`.
fn pivot_join(target: Kind) -> Result<RelationDef, RepoError> {
    match target {
        Kind::Tag => Ok(tag::Relation::PostTag.def()),
        Kind::Post => Ok(post::Relation::PostTag.def()),
        other => Err(RepoError::Internal(format!(
            "{} is not reachable through post_tag",
            other.label()
        ))),
    }
}

async fn fetch_rows<E, C>(
    db: &C,
    edge: &Edge,
    columns: Option<&[String]>,
    required: &[&str],
    keys: Vec<i64>,
    scope: Option<&Condition>,
) -> Result<Vec<Record>, RepoError>
where
    E: StoredEntity,
    C: ConnectionTrait,
{
    let columns = projection::<E>(columns, required)?;
    let mut select = E::find().select_only();
    for column in &columns {
        select = select.column(*column);
    }

    let pivot = match edge.link {
        Link::BelongsTo { .. } => {
            select = select.filter(E::id_column().is_in(keys));
            false
        }
        Link::HasOne { foreign_key } | Link::HasMany { foreign_key } => {
            let foreign_key = resolve_column::<E>(foreign_key)?;
            select = select.filter(foreign_key.is_in(keys));
            false
        }
        Link::ManyToMany { pivot } => {
            let parent: SimpleExpr = Expr::col((post_tag::Entity, pivot)).into();
            select = select
                .column_as(parent, PIVOT)
                .join(JoinType::InnerJoin, pivot_join(edge.target)?)
                .filter(Expr::col((post_tag::Entity, pivot)).is_in(keys));
            true
        }
    };
    if let Some(condition) = scope {
        select = select.filter(condition.clone());
    }

    if let Some(order_by) = edge.order_by {
        select = select.order_by_asc(resolve_column::<E>(order_by)?);
    }
    select = select.order_by_asc(E::id_column());

    let rows = db
        .query_all(select.build(db.get_database_backend()))
        .await
        .map_err(map_db_err)?;

    rows.iter()
        .map(|row| {
            let mut record = read_record::<E>(row, &columns)?;
            if pivot {
                let parent: i64 = row.try_get("", PIVOT).map_err(map_db_err)?;
                record.insert(PIVOT.to_string(), parent.into());
            }
            Ok(record)
        })
        .collect()
}

fn stitch(edge: &Edge, parents: &mut [Record], children: Vec<Record>) {
    match edge.link {
        Link::BelongsTo { foreign_key } => {
            let by_id: HashMap<i64, Record> = children
                .into_iter()
                .filter_map(|child| key_of(&child, "id").map(|id| (id, child)))
                .collect();
            for parent in parents.iter_mut() {
                let related = key_of(parent, foreign_key)
                    .and_then(|key| by_id.get(&key).cloned())
                    .map(Value::Object)
                    .unwrap_or(Value::Null);
                parent.insert(edge.name.to_string(), related);
            }
        }
        Link::HasOne { foreign_key } => {
            let mut by_owner: HashMap<i64, Record> = HashMap::new();
            for child in children {
                if let Some(owner) = key_of(&child, foreign_key) {
                    by_owner.entry(owner).or_insert(child);
                }
            }
            for parent in parents.iter_mut() {
                let related = key_of(parent, "id")
                    .and_then(|id| by_owner.get(&id).cloned())
                    .map(Value::Object)
                    .unwrap_or(Value::Null);
                parent.insert(edge.name.to_string(), related);
            }
        }
        Link::HasMany { foreign_key } => {
            let groups = group_by(children, foreign_key, false);
            attach_groups(edge, parents, groups);
        }
        Link::ManyToMany { .. } => {
            let groups = group_by(children, PIVOT, true);
            attach_groups(edge, parents, groups);
        }
    }
}

fn group_by(children: Vec<Record>, key: &str, strip_key: bool) -> HashMap<i64, Vec<Value>> {
    let mut groups: HashMap<i64, Vec<Value>> = HashMap::new();
    for mut child in children {
        let Some(owner) = key_of(&child, key) else {
            continue;
        };
        if strip_key {
            child.remove(key);
        }
        groups.entry(owner).or_default().push(Value::Object(child));
    }
    groups
}

fn attach_groups(edge: &Edge, parents: &mut [Record], groups: HashMap<i64, Vec<Value>>) {
    for parent in parents.iter_mut() {
        let related = key_of(parent, "id")
            .and_then(|id| groups.get(&id).cloned())
            .unwrap_or_default();
        parent.insert(edge.name.to_string(), Value::Array(related));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_relation_is_rejected() {
        let err = EagerPlan::new(Kind::Post, &["author"]).unwrap_err();
        assert!(matches!(err, RepoError::Validation(msg) if msg.contains("author")));
    }

    #[test]
    fn test_nested_relation_names_are_checked() {
        assert!(EagerPlan::new(Kind::Post, &["user.billing"]).is_ok());
        assert!(EagerPlan::new(Kind::Post, &["user.tags"]).is_err());
    }

    #[test]
    fn test_unknown_relation_column_is_rejected() {
        let err = EagerPlan::new(Kind::Post, &["user:id,password_hash"]).unwrap_err();
        assert!(matches!(err, RepoError::Validation(msg) if msg.contains("password_hash")));
    }

    #[test]
    fn test_root_keys_follow_relation_kinds() {
        let plan = EagerPlan::new(Kind::Post, &["user:id,name", "tags", "category"]).unwrap();
        assert_eq!(plan.root_keys().unwrap(), vec!["user_id", "id", "category_id"]);
    }

    #[test]
    fn test_many_to_many_stitching_groups_by_pivot() {
        let edge = edge(Kind::Post, "tags").unwrap();
        let mut parents = vec![
            serde_json::json!({"id": 1}).as_object().cloned().unwrap(),
            serde_json::json!({"id": 2}).as_object().cloned().unwrap(),
        ];
        let children = vec![
            serde_json::json!({"id": 10, "tag": "rust", PIVOT: 1})
                .as_object()
                .cloned()
                .unwrap(),
            serde_json::json!({"id": 10, "tag": "rust", PIVOT: 2})
                .as_object()
                .cloned()
                .unwrap(),
            serde_json::json!({"id": 11, "tag": "sql", PIVOT: 1})
                .as_object()
                .cloned()
                .unwrap(),
        ];

        stitch(edge, &mut parents, children);

        assert_eq!(parents[0]["tags"].as_array().unwrap().len(), 2);
        assert_eq!(
            parents[1]["tags"],
            serde_json::json!([{"id": 10, "tag": "rust"}])
        );
    }
}
