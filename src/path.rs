//! Path resolver.
//!
//! Maps a relational path (`["author", "role", "name"]`) to the column it
//! ends on, using joins already recorded in the alias map. It never creates
//! joins; segments without a recorded alias fall back to the target
//! collection name.

use crate::alias::{AliasMap, path_key};
use crate::error::{Error, Result};
use crate::filter::{FieldFunction, FieldKey};
use crate::relation::classify;
use crate::schema::SchemaOverview;
use crate::sql::ColumnRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPath {
    pub column: ColumnRef,
    pub target_collection: String,
    /// Field name on `target_collection`, without any function wrapper.
    pub field: String,
    pub function: Option<FieldFunction>,
    /// Set when the path ended on a relation and the target primary key was
    /// appended.
    pub added_primary_key: bool,
}

/// Resolves `path` starting at `collection`. `parent_key` is the path key of
/// `collection` itself when it was reached through joins.
pub fn resolve_path(
    schema: &SchemaOverview,
    path: &[&str],
    collection: &str,
    aliases: &AliasMap,
    parent_key: Option<&str>,
) -> Result<ColumnPath> {
    let (segment, remaining) = path
        .split_first()
        .ok_or_else(|| Error::InvalidFilter("empty path".into()))?;

    let key = FieldKey::parse(segment)?;
    let info = classify(&schema.relations, collection, &key.field)?.ok_or_else(|| {
        Error::UnresolvedRelation {
            collection: collection.to_string(),
            field: key.field.clone(),
        }
    })?;

    let this_key = path_key(parent_key, &key.raw);
    let target = info.kind.target_collection(key.scope.as_deref(), &this_key)?;
    let table = aliases
        .get(&this_key)
        .map(|entry| entry.alias.clone())
        .unwrap_or_else(|| target.clone());

    match remaining {
        [] => {
            let pk = schema.primary_key(&target)?.to_string();
            Ok(ColumnPath {
                column: ColumnRef::new(table, pk.clone()),
                target_collection: target,
                field: pk,
                function: None,
                added_primary_key: true,
            })
        }
        [last] => {
            let last = FieldKey::parse(last)?;
            Ok(ColumnPath {
                column: ColumnRef::new(table, last.field.clone()),
                target_collection: target,
                field: last.field,
                function: last.function,
                added_primary_key: false,
            })
        }
        _ => resolve_path(schema, remaining, &target, aliases, Some(&this_key)),
    }
}
