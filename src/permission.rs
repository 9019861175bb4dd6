//! Field-permission filter.
//!
//! Clauses on fields the caller may not read are removed from the filter
//! before compilation. Removal narrows what the filter accepts and is never
//! an error; row and column access is enforced elsewhere.
//!
//! Explicit `_and` / `_or` groups are all or nothing: a group that touches
//! any unreadable field is removed whole, so an `_or` is never broadened by
//! losing one branch. The keys of a plain object are removed one by one.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filter::{Clause, FieldNode, Filter};
use crate::relation::{Follow, classify};
use crate::schema::SchemaOverview;

const ALL_FIELDS: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Delete,
    Share,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub action: PermissionAction,
    pub collection: String,
    /// `["*"]` allows every field; `None` allows none.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

impl Permission {
    pub fn read(collection: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            action: PermissionAction::Read,
            collection: collection.into(),
            fields: Some(fields.iter().map(|f| f.to_string()).collect()),
        }
    }

    pub fn allows(&self, field: &str) -> bool {
        self.fields
            .as_ref()
            .is_some_and(|fields| fields.iter().any(|f| f == ALL_FIELDS || f == field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccess {
    pub field: String,
    pub allowed: bool,
}

/// Access decision for each of `fields` under `permission`. Without a
/// permission nothing is allowed.
pub fn filter_by_permission(fields: &[&str], permission: Option<&Permission>) -> Vec<FieldAccess> {
    fields
        .iter()
        .map(|field| FieldAccess {
            field: field.to_string(),
            allowed: permission.is_some_and(|p| p.allows(field)),
        })
        .collect()
}

/// Read access over a permission list. An empty list means unrestricted.
#[derive(Debug, Clone, Copy)]
pub struct FieldPermissions<'a> {
    permissions: &'a [Permission],
}

impl<'a> FieldPermissions<'a> {
    pub fn new(permissions: &'a [Permission]) -> Self {
        Self { permissions }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn read_permissions<'b>(
        &'b self,
        collection: &'b str,
    ) -> impl Iterator<Item = &'a Permission> + 'b {
        self.permissions
            .iter()
            .filter(move |p| p.action == PermissionAction::Read && p.collection == collection)
    }

    /// Union of every read permission on `collection`.
    pub fn can_read(&self, collection: &str, field: &str) -> bool {
        self.is_unrestricted() || self.read_permissions(collection).any(|p| p.allows(field))
    }

    /// Returns `filter` without the clauses the caller may not read, and the
    /// number of clauses removed.
    pub fn prune(
        &self,
        schema: &SchemaOverview,
        filter: &Filter,
        collection: &str,
    ) -> (Filter, usize) {
        if self.is_unrestricted() {
            return (filter.clone(), 0);
        }

        let mut elided = 0;
        let mut clauses = Vec::with_capacity(filter.clauses().len());

        for clause in filter.clauses() {
            match self.prune_clause(schema, clause, collection) {
                Some((clause, n)) => {
                    elided += n;
                    clauses.push(clause);
                }
                None => {
                    debug!(
                        collection,
                        clause = clause_name(clause),
                        "filter clause elided by permissions"
                    );
                    elided += 1;
                }
            }
        }

        (Filter::from_clauses(clauses), elided)
    }

    fn prune_clause(
        &self,
        schema: &SchemaOverview,
        clause: &Clause,
        collection: &str,
    ) -> Option<(Clause, usize)> {
        match clause {
            Clause::And(children) | Clause::Or(children) => children
                .iter()
                .all(|child| self.prune(schema, child, collection).1 == 0)
                .then(|| (clause.clone(), 0)),
            Clause::Field { key, node } => {
                let target = if key.is_follow() {
                    // malformed keys are left for the compiler to reject
                    let follow = match Follow::parse(&key.field) {
                        Ok(Some(follow)) => follow,
                        _ => return Some((clause.clone(), 0)),
                    };
                    if !self.can_read(&follow.collection, &follow.field) {
                        return None;
                    }
                    Some(follow.collection)
                } else {
                    if !self.can_read(collection, &key.field) {
                        return None;
                    }
                    classify(&schema.relations, collection, &key.field)
                        .ok()
                        .flatten()
                        .and_then(|info| {
                            info.kind
                                .target_collection(key.scope.as_deref(), &key.raw)
                                .ok()
                        })
                };

                let inner = match node {
                    FieldNode::Operators(_) => return Some((clause.clone(), 0)),
                    FieldNode::Nested(inner) | FieldNode::Quantified(_, inner) => inner,
                };

                let Some(target) = target else {
                    return Some((clause.clone(), 0));
                };

                let (pruned, elided) = self.prune(schema, inner, &target);
                if pruned.is_empty() && !inner.is_empty() {
                    return None;
                }
                let node = match node {
                    FieldNode::Quantified(quantifier, _) => {
                        FieldNode::Quantified(*quantifier, pruned)
                    }
                    _ => FieldNode::Nested(pruned),
                };
                Some((Clause::Field { key: key.clone(), node }, elided))
            }
        }
    }
}

fn clause_name(clause: &Clause) -> &str {
    match clause {
        Clause::And(_) => "_and",
        Clause::Or(_) => "_or",
        Clause::Field { key, .. } => &key.raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;
    use serde_json::json;

    fn schema() -> SchemaOverview {
        SchemaBuilder::new()
            .collection("article", |c| {
                c.field("id").id();
                c.field("title").string();
                c.field("text").text();
                c.field("author").m2o("users");
            })
            .collection("users", |c| {
                c.field("id").id();
                c.field("name").string();
                c.field("email").string();
            })
            .build()
    }

    fn filter(value: serde_json::Value) -> Filter {
        Filter::parse(&value).unwrap()
    }

    #[test]
    fn test_filter_by_permission() {
        let permission = Permission::read("article", &["id", "title"]);
        let access = filter_by_permission(&["id", "text"], Some(&permission));
        assert!(access[0].allowed);
        assert!(!access[1].allowed);

        assert!(filter_by_permission(&["id"], None).iter().all(|a| !a.allowed));

        let all = Permission::read("article", &["*"]);
        assert!(filter_by_permission(&["anything"], Some(&all))[0].allowed);
    }

    #[test]
    fn test_permission_deserialize() {
        let permission: Permission = serde_json::from_value(json!({
            "action": "read",
            "collection": "article",
            "fields": null
        }))
        .unwrap();
        assert_eq!(permission.action, PermissionAction::Read);
        assert!(!permission.allows("id"));
    }

    #[test]
    fn test_prune_leaf_matches_absent_clause() {
        let schema = schema();
        let permissions = [Permission::read("article", &["id", "title"])];
        let access = FieldPermissions::new(&permissions);

        let (pruned, elided) = access.prune(
            &schema,
            &filter(json!({ "title": { "_eq": "a" }, "text": { "_contains": "b" } })),
            "article",
        );
        assert_eq!(elided, 1);
        assert_eq!(pruned, filter(json!({ "title": { "_eq": "a" } })));
    }

    #[test]
    fn test_prune_groups_whole() {
        let schema = schema();
        let permissions = [Permission::read("article", &["id", "title"])];
        let access = FieldPermissions::new(&permissions);

        let (pruned, elided) = access.prune(
            &schema,
            &filter(json!({ "_or": [{ "title": "a" }, { "text": "b" }], "id": 1 })),
            "article",
        );
        assert_eq!(elided, 1);
        assert_eq!(pruned, filter(json!({ "id": 1 })));

        let (pruned, elided) = access.prune(
            &schema,
            &filter(json!({ "_or": [{ "title": "a" }, { "id": 2 }] })),
            "article",
        );
        assert_eq!(elided, 0);
        assert_eq!(pruned.clauses().len(), 1);
    }

    #[test]
    fn test_prune_nested_against_target() {
        let schema = schema();
        let permissions = [
            Permission::read("article", &["*"]),
            Permission::read("users", &["id", "name"]),
        ];
        let access = FieldPermissions::new(&permissions);

        let (pruned, elided) = access.prune(
            &schema,
            &filter(json!({ "author": { "name": "x", "email": "y" } })),
            "article",
        );
        assert_eq!(elided, 1);
        assert_eq!(pruned, filter(json!({ "author": { "name": "x" } })));

        let (pruned, elided) =
            access.prune(&schema, &filter(json!({ "author": { "email": "y" } })), "article");
        assert_eq!(elided, 1);
        assert!(pruned.is_empty());
    }

    #[test]
    fn test_unrestricted_and_missing_read() {
        let schema = schema();
        let f = filter(json!({ "text": "x" }));

        let (pruned, elided) = FieldPermissions::new(&[]).prune(&schema, &f, "article");
        assert_eq!((pruned, elided), (f.clone(), 0));

        let permissions = [Permission::read("users", &["*"])];
        let (pruned, _) = FieldPermissions::new(&permissions).prune(&schema, &f, "article");
        assert!(pruned.is_empty());
    }
}
