//! Relation classifier.
//!
//! Relation shape is decided here once, from schema metadata, and handed to
//! the compiler as a [`RelationKind`]. Nothing downstream inspects optional
//! relation fields to guess the shape again.

use crate::error::{Error, Result};
use crate::schema::{Relation, RelationMeta};

const MAX_FOLLOW_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// Foreign key on the current collection.
    M2O { related_collection: String },
    /// Polymorphic foreign key on the current collection; traversal needs a
    /// scope.
    A2O {
        allowed_collections: Vec<String>,
        collection_field: String,
    },
    /// `collection.field` points back at the current collection.
    O2M { collection: String, field: String },
    /// `collection.field` is a polymorphic key that may point at the current
    /// collection, discriminated by `collection.collection_field`.
    O2A {
        collection: String,
        field: String,
        collection_field: String,
    },
    /// O2M into `junction`, whose `junction_field` is an m2o to
    /// `related_collection`.
    M2M {
        junction: String,
        field: String,
        junction_field: String,
        related_collection: String,
    },
    /// O2M into `junction`, whose `junction_field` is an a2o over
    /// `allowed_collections`.
    M2A {
        junction: String,
        field: String,
        junction_field: String,
        allowed_collections: Vec<String>,
    },
}

impl RelationKind {
    pub fn name(&self) -> &'static str {
        match self {
            RelationKind::M2O { .. } => "m2o",
            RelationKind::A2O { .. } => "a2o",
            RelationKind::O2M { .. } => "o2m",
            RelationKind::O2A { .. } => "o2a",
            RelationKind::M2M { .. } => "m2m",
            RelationKind::M2A { .. } => "m2a",
        }
    }

    /// Relations where one parent row fans out to many rows.
    pub fn is_multi(&self) -> bool {
        !matches!(self, RelationKind::M2O { .. } | RelationKind::A2O { .. })
    }

    /// Collection a hop over this relation lands in. `scope` is the
    /// `:collection` suffix of the path segment, if any; only any-to-one
    /// hops take one, and it must be among the allowed collections.
    pub fn target_collection(&self, scope: Option<&str>, path: &str) -> Result<String> {
        let invalid_scope = |scope: &str| Error::InvalidPolymorphicScope {
            scope: scope.to_string(),
            path: path.to_string(),
        };

        let target = match self {
            RelationKind::A2O {
                allowed_collections,
                ..
            } => {
                let scope = scope.ok_or_else(|| Error::MissingPolymorphicScope {
                    path: path.to_string(),
                })?;
                if !allowed_collections.is_empty()
                    && !allowed_collections.iter().any(|c| c == scope)
                {
                    return Err(invalid_scope(scope));
                }
                return Ok(scope.to_string());
            }
            RelationKind::M2O { related_collection } => related_collection,
            RelationKind::O2M { collection, .. } | RelationKind::O2A { collection, .. } => {
                collection
            }
            RelationKind::M2M { junction, .. } | RelationKind::M2A { junction, .. } => junction,
        };

        match scope {
            Some(scope) => Err(invalid_scope(scope)),
            None => Ok(target.clone()),
        }
    }

    /// For one-to-many shapes, the many-side collection and its foreign key.
    pub fn many_side(&self) -> Option<(&str, &str)> {
        match self {
            RelationKind::O2M { collection, field }
            | RelationKind::O2A {
                collection, field, ..
            } => Some((collection, field)),
            RelationKind::M2M {
                junction, field, ..
            }
            | RelationKind::M2A {
                junction, field, ..
            } => Some((junction, field)),
            _ => None,
        }
    }
}

/// Classified relation plus the stored (or synthesized) relation it came
/// from.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationInfo {
    pub relation: Relation,
    pub kind: RelationKind,
}

/// Parsed `$FOLLOW(collection, field[, collection_field])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Follow {
    pub collection: String,
    pub field: String,
    pub collection_field: Option<String>,
}

impl Follow {
    /// Returns `None` when `key` is not a `$FOLLOW` key at all.
    pub fn parse(key: &str) -> Result<Option<Self>> {
        let Some(inner) = key.strip_prefix("$FOLLOW(") else {
            return Ok(None);
        };

        let invalid = || Error::InvalidFilterKey {
            key: key.to_string(),
            collection: String::new(),
        };

        if key.len() > MAX_FOLLOW_LEN {
            return Err(invalid());
        }

        let args: Vec<&str> = inner
            .strip_suffix(')')
            .ok_or_else(invalid)?
            .split(',')
            .map(str::trim)
            .collect();

        match args.as_slice() {
            [collection, field] if !collection.is_empty() && !field.is_empty() => Ok(Some(Self {
                collection: collection.to_string(),
                field: field.to_string(),
                collection_field: None,
            })),
            [collection, field, collection_field]
                if !collection.is_empty() && !field.is_empty() && !collection_field.is_empty() =>
            {
                Ok(Some(Self {
                    collection: collection.to_string(),
                    field: field.to_string(),
                    collection_field: Some(collection_field.to_string()),
                }))
            }
            _ => Err(invalid()),
        }
    }
}

/// Classifies `collection.field`. Returns `Ok(None)` when the field is not
/// relational.
pub fn classify(
    relations: &[Relation],
    collection: &str,
    field: &str,
) -> Result<Option<RelationInfo>> {
    if let Some(follow) = Follow::parse(field)? {
        return Ok(Some(follow_relation(follow, collection)));
    }

    if let Some(relation) = relations
        .iter()
        .find(|r| r.collection == collection && r.field == field)
    {
        let kind = match (&relation.related_collection, relation.one_collection_field()) {
            (Some(related), _) => RelationKind::M2O {
                related_collection: related.clone(),
            },
            (None, Some(collection_field)) if relation.one_allowed_collections().is_some() => {
                RelationKind::A2O {
                    allowed_collections: relation
                        .one_allowed_collections()
                        .unwrap_or_default()
                        .to_vec(),
                    collection_field: collection_field.to_string(),
                }
            }
            _ => return Ok(None),
        };
        return Ok(Some(RelationInfo {
            relation: relation.clone(),
            kind,
        }));
    }

    let reverse = relations.iter().find(|r| {
        r.related_collection.as_deref() == Some(collection) && r.one_field() == Some(field)
    });

    Ok(reverse.map(|relation| RelationInfo {
        relation: relation.clone(),
        kind: reverse_kind(relations, relation),
    }))
}

fn reverse_kind(relations: &[Relation], relation: &Relation) -> RelationKind {
    let companion = relation.junction_field().and_then(|junction_field| {
        relations
            .iter()
            .find(|r| r.collection == relation.collection && r.field == junction_field)
    });

    match companion {
        Some(companion) => match (
            &companion.related_collection,
            companion.one_allowed_collections(),
        ) {
            (Some(related), _) => RelationKind::M2M {
                junction: relation.collection.clone(),
                field: relation.field.clone(),
                junction_field: companion.field.clone(),
                related_collection: related.clone(),
            },
            (None, Some(allowed)) => RelationKind::M2A {
                junction: relation.collection.clone(),
                field: relation.field.clone(),
                junction_field: companion.field.clone(),
                allowed_collections: allowed.to_vec(),
            },
            (None, None) => o2m(relation),
        },
        None => o2m(relation),
    }
}

fn o2m(relation: &Relation) -> RelationKind {
    RelationKind::O2M {
        collection: relation.collection.clone(),
        field: relation.field.clone(),
    }
}

fn follow_relation(follow: Follow, current: &str) -> RelationInfo {
    match follow.collection_field {
        Some(collection_field) => RelationInfo {
            relation: Relation {
                collection: follow.collection.clone(),
                field: follow.field.clone(),
                related_collection: None,
                schema: None,
                meta: Some(RelationMeta {
                    many_collection: follow.collection.clone(),
                    many_field: follow.field.clone(),
                    one_collection_field: Some(collection_field.clone()),
                    one_allowed_collections: Some(vec![current.to_string()]),
                    ..Default::default()
                }),
            },
            kind: RelationKind::O2A {
                collection: follow.collection,
                field: follow.field,
                collection_field,
            },
        },
        None => RelationInfo {
            relation: Relation {
                collection: follow.collection.clone(),
                field: follow.field.clone(),
                related_collection: Some(current.to_string()),
                schema: None,
                meta: None,
            },
            kind: RelationKind::O2M {
                collection: follow.collection,
                field: follow.field,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    fn schema() -> crate::schema::SchemaOverview {
        SchemaBuilder::new()
            .collection("article", |c| {
                c.field("id").id();
                c.field("title").string();
                c.field("author").m2o("users");
                c.field("links").o2m("links_list", "article_id");
                c.field("tags").m2m("tags");
                c.field("blocks").m2a(&["text", "image"]);
                c.field("header").a2o(&["image", "video"]);
            })
            .build()
    }

    #[test]
    fn test_classify_kinds() {
        let schema = schema();
        let kind = |f: &str| {
            classify(&schema.relations, "article", f)
                .unwrap()
                .map(|info| info.kind.name())
        };

        assert_eq!(kind("author"), Some("m2o"));
        assert_eq!(kind("links"), Some("o2m"));
        assert_eq!(kind("tags"), Some("m2m"));
        assert_eq!(kind("blocks"), Some("m2a"));
        assert_eq!(kind("header"), Some("a2o"));
        assert_eq!(kind("title"), None);
    }

    #[test]
    fn test_m2m_junction_shape() {
        let schema = schema();
        let info = classify(&schema.relations, "article", "tags").unwrap().unwrap();
        assert_eq!(
            info.kind,
            RelationKind::M2M {
                junction: "article_tags".into(),
                field: "article_id".into(),
                junction_field: "tags_id".into(),
                related_collection: "tags".into(),
            }
        );
        assert_eq!(info.kind.target_collection(None, "tags").unwrap(), "article_tags");
    }

    #[test]
    fn test_follow_synthesizes_reverse() {
        let info = classify(&[], "users", "$FOLLOW(article, author)").unwrap().unwrap();
        assert_eq!(
            info.kind,
            RelationKind::O2M {
                collection: "article".into(),
                field: "author".into()
            }
        );
        assert_eq!(info.relation.related_collection.as_deref(), Some("users"));

        let info = classify(&[], "users", "$FOLLOW(comments,item,collection)")
            .unwrap()
            .unwrap();
        assert_eq!(info.kind.name(), "o2a");
    }

    #[test]
    fn test_follow_rejects_bad_keys() {
        assert!(Follow::parse("$FOLLOW(article)").is_err());
        assert!(Follow::parse("$FOLLOW(a,b").is_err());
        let long = format!("$FOLLOW({},b)", "a".repeat(600));
        assert!(matches!(
            Follow::parse(&long),
            Err(Error::InvalidFilterKey { .. })
        ));
        assert_eq!(Follow::parse("author").unwrap(), None);
    }

    #[test]
    fn test_a2o_requires_scope() {
        let schema = schema();
        let info = classify(&schema.relations, "article", "header").unwrap().unwrap();
        assert!(matches!(
            info.kind.target_collection(None, "header"),
            Err(Error::MissingPolymorphicScope { .. })
        ));
        assert_eq!(info.kind.target_collection(Some("image"), "header:image").unwrap(), "image");
        assert!(matches!(
            info.kind.target_collection(Some("tags"), "header:tags"),
            Err(Error::InvalidPolymorphicScope { scope, .. }) if scope == "tags"
        ));
    }

    #[test]
    fn test_scope_only_on_any_to_one() {
        let schema = schema();
        for field in ["author", "links", "tags", "blocks"] {
            let info = classify(&schema.relations, "article", field).unwrap().unwrap();
            let path = format!("{}:users", field);
            assert!(matches!(
                info.kind.target_collection(Some("users"), &path),
                Err(Error::InvalidPolymorphicScope { .. })
            ));
        }
    }
}
