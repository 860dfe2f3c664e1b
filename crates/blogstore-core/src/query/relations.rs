//! Eager-load path parsing.
//!
//! Paths look like `user`, `user:id,name`, `user.billing` or
//! `posts.tags:id,tag`. A column list applies to the last segment.

use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationPath {
    pub segments: Vec<String>,
    pub columns: Option<Vec<String>>,
}

impl RelationPath {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let (path, columns) = match raw.split_once(':') {
            Some((path, columns)) => (path, Some(columns)),
            None => (raw, None),
        };

        let segments = path
            .split('.')
            .map(|segment| identifier(segment, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let columns = columns
            .map(|list| {
                list.split(',')
                    .map(|column| identifier(column, raw))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(Self { segments, columns })
    }
}

fn identifier(part: &str, raw: &str) -> Result<String, DomainError> {
    let part = part.trim();
    let valid = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(part.to_string())
    } else {
        Err(DomainError::Validation(format!(
            "malformed relation path `{raw}`"
        )))
    }
}

/// One level of an eager-load graph. `columns == None` loads every column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationNode {
    pub name: String,
    pub columns: Option<Vec<String>>,
    pub children: Vec<RelationNode>,
}

#[derive(Debug)]
enum Selection {
    /// Only reached as an intermediate segment.
    Implicit,
    All,
    Only(Vec<String>),
}

#[derive(Debug)]
struct Builder {
    name: String,
    selection: Selection,
    children: Vec<Builder>,
}

impl Builder {
    fn child(&mut self, name: &str) -> &mut Builder {
        child_of(&mut self.children, name)
    }

    fn select(&mut self, columns: &Option<Vec<String>>) {
        self.selection = match (std::mem::replace(&mut self.selection, Selection::All), columns) {
            (Selection::All, _) | (_, None) => Selection::All,
            (Selection::Implicit, Some(columns)) => Selection::Only(columns.clone()),
            (Selection::Only(mut existing), Some(columns)) => {
                for column in columns {
                    if !existing.contains(column) {
                        existing.push(column.clone());
                    }
                }
                Selection::Only(existing)
            }
        };
    }

    fn finish(self) -> RelationNode {
        RelationNode {
            name: self.name,
            columns: match self.selection {
                Selection::Only(columns) => Some(columns),
                Selection::Implicit | Selection::All => None,
            },
            children: self.children.into_iter().map(Builder::finish).collect(),
        }
    }
}

fn child_of<'a>(nodes: &'a mut Vec<Builder>, name: &str) -> &'a mut Builder {
    let position = match nodes.iter().position(|node| node.name == name) {
        Some(position) => position,
        None => {
            nodes.push(Builder {
                name: name.to_string(),
                selection: Selection::Implicit,
                children: Vec::new(),
            });
            nodes.len() - 1
        }
    };
    &mut nodes[position]
}

/// Parse and merge eager-load paths into a tree, one node per relation.
pub fn relation_tree<S: AsRef<str>>(paths: &[S]) -> Result<Vec<RelationNode>, DomainError> {
    let mut roots: Vec<Builder> = Vec::new();

    for raw in paths {
        let path = RelationPath::parse(raw.as_ref())?;
        let (last, parents) = path
            .segments
            .split_last()
            .ok_or_else(|| DomainError::Validation("empty relation path".into()))?;

        let node = match parents.split_first() {
            None => child_of(&mut roots, last),
            Some((first, rest)) => {
                let mut node = child_of(&mut roots, first);
                for segment in rest {
                    node = node.child(segment);
                }
                node.child(last)
            }
        };
        node.select(&path.columns);
    }

    Ok(roots.into_iter().map(Builder::finish).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_columns() {
        let path = RelationPath::parse("user:id,name").unwrap();
        assert_eq!(path.segments, vec!["user"]);
        assert_eq!(path.columns, Some(vec!["id".into(), "name".into()]));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(RelationPath::parse("").is_err());
        assert!(RelationPath::parse("user.").is_err());
        assert!(RelationPath::parse("user:").is_err());
        assert!(RelationPath::parse("User").is_err());
    }

    #[test]
    fn test_tree_merges_shared_prefixes() {
        let tree = relation_tree(&["user:id,name", "user.billing", "tags:id,tag"]).unwrap();
        assert_eq!(tree.len(), 2);

        let user = &tree[0];
        assert_eq!(user.name, "user");
        assert_eq!(user.columns, Some(vec!["id".into(), "name".into()]));
        assert_eq!(user.children.len(), 1);
        assert_eq!(user.children[0].name, "billing");
        assert_eq!(user.children[0].columns, None);

        assert_eq!(tree[1].columns, Some(vec!["id".into(), "tag".into()]));
    }

    #[test]
    fn test_intermediate_then_explicit_columns() {
        let tree = relation_tree(&["posts.tags", "posts:id,title"]).unwrap();
        assert_eq!(tree[0].columns, Some(vec!["id".into(), "title".into()]));
        assert_eq!(tree[0].children[0].name, "tags");
    }

    #[test]
    fn test_bare_path_selects_everything() {
        let tree = relation_tree(&["user:id", "user"]).unwrap();
        assert_eq!(tree[0].columns, None);
    }
}
