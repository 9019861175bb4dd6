//! Sort compilation.
//!
//! Sort keys share the alias map with filtering, so `author.name` sorts on
//! the join a filter on `author` already created.

use crate::alias::AliasMap;
use crate::compiler::{Scope, add_join, reserve_tables};
use crate::error::{Error, Result};
use crate::filter::{FieldFunction, FieldKey, split_path};
use crate::path::resolve_path;
use crate::relation::classify;
use crate::schema::SchemaOverview;
use crate::sql::{ColumnRef, Expr, QueryBuilder};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortOutcome {
    pub has_joins: bool,
    pub has_multi_relational_sort: bool,
}

/// Replaces the query's ordering with `sort` (`"-likes"`, `"author.name"`,
/// `"year(date_created)"`). A leading `-` sorts descending.
pub fn apply_sort<S: AsRef<str>>(
    query: &mut QueryBuilder,
    schema: &SchemaOverview,
    sort: &[S],
    collection: &str,
    aliases: &mut AliasMap,
) -> Result<SortOutcome> {
    schema.collection(collection)?;
    reserve_tables(schema, query, aliases);

    let root = Scope::root(collection, query, aliases);
    let mut outcome = SortOutcome::default();
    let mut terms = Vec::with_capacity(sort.len());

    for key in sort {
        let key = key.as_ref();
        let (descending, path) = match key.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, key),
        };
        let segments = split_path(path);

        let first = FieldKey::parse(segments[0])?;
        let relation = classify(&schema.relations, collection, &first.field)?;
        let local = segments.len() == 1
            && relation
                .as_ref()
                .is_none_or(|info| !first.is_follow() && !info.kind.is_multi());

        let expr = if local {
            // ordering cannot discriminate on the polymorphic collection
            if let Some(scope) = &first.scope {
                return Err(Error::InvalidPolymorphicScope {
                    scope: scope.clone(),
                    path: path.to_string(),
                });
            }
            let column = ColumnRef::new(root.table.clone(), first.field.clone());
            function_expr(schema, collection, &first, column)?
        } else {
            // every segment but a plain last field is a hop
            let hops = if segments.len() == 1 {
                &segments[..]
            } else {
                &segments[..segments.len() - 1]
            };

            let mut scope = root.clone();
            for segment in hops {
                let hop = add_join(schema, query, aliases, &scope, &FieldKey::parse(segment)?)?;
                outcome.has_joins |= hop.created;
                outcome.has_multi_relational_sort |= hop.kind.is_multi();
                scope = hop.scope;
            }

            let path = resolve_path(schema, &segments, collection, aliases, None)?;
            let key = FieldKey {
                raw: path.field.clone(),
                field: path.field.clone(),
                scope: None,
                function: path.function,
            };
            function_expr(schema, &path.target_collection, &key, path.column)?
        };

        terms.push((expr, descending));
    }

    query.clear_order();
    for (expr, descending) in terms {
        query.order_by(expr, descending);
    }

    Ok(outcome)
}

fn function_expr(
    schema: &SchemaOverview,
    collection: &str,
    key: &FieldKey,
    column: ColumnRef,
) -> Result<Expr> {
    let Some(function) = key.function else {
        return Ok(Expr::Column(column));
    };

    let field_type = schema
        .field(collection, &key.field)
        .map(|f| f.field_type)
        .ok_or_else(|| Error::InvalidFilterKey {
            key: key.raw.clone(),
            collection: collection.to_string(),
        })?;
    if !FieldFunction::for_type(field_type).contains(&function) {
        return Err(Error::InvalidFilterKey {
            key: key.raw.clone(),
            collection: collection.to_string(),
        });
    }

    Ok(Expr::Function(function.for_column(field_type), column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::apply_filter;
    use crate::filter::Filter;
    use crate::schema::SchemaBuilder;
    use crate::sql::Dialect;
    use serde_json::json;

    fn schema() -> SchemaOverview {
        SchemaBuilder::new()
            .collection("article", |c| {
                c.field("id").id();
                c.field("likes").integer();
                c.field("date_created").date_time();
                c.field("author").m2o("users");
                c.field("links").o2m("links_list", "article_id");
                c.field("header").a2o(&["users"]);
            })
            .collection("users", |c| {
                c.field("id").id();
                c.field("name").string();
            })
            .build()
    }

    #[test]
    fn test_local_sort() {
        let schema = schema();
        let mut query = QueryBuilder::new("article");
        let mut aliases = AliasMap::new();
        let sort = ["-likes", "author"];
        let outcome = apply_sort(&mut query, &schema, &sort, "article", &mut aliases).unwrap();

        assert_eq!(outcome, SortOutcome::default());
        assert!(query.joins().is_empty());
        assert_eq!(
            query.to_statement(Dialect::Postgres).sql,
            "SELECT * FROM \"article\" ORDER BY \"article\".\"likes\" DESC, \"article\".\"author\" ASC"
        );
    }

    #[test]
    fn test_sort_reuses_filter_join() {
        let schema = schema();
        let mut query = QueryBuilder::new("article");
        let mut aliases = AliasMap::new();
        let filter = Filter::parse(&json!({ "author": { "name": { "_nnull": true } } })).unwrap();
        apply_filter(&mut query, &schema, &filter, "article", &mut aliases, &[], &[]).unwrap();

        let outcome =
            apply_sort(&mut query, &schema, &["author.name"], "article", &mut aliases).unwrap();
        assert!(!outcome.has_joins);
        assert_eq!(query.joins().len(), 1);

        let alias = &aliases.get("author").unwrap().alias;
        assert_eq!(
            query.orders()[0].expr,
            Expr::column(alias.clone(), "name")
        );
    }

    #[test]
    fn test_multi_relational_sort() {
        let schema = schema();
        let mut query = QueryBuilder::new("article");
        let mut aliases = AliasMap::new();
        let outcome = apply_sort(&mut query, &schema, &["links"], "article", &mut aliases).unwrap();
        assert!(outcome.has_joins);
        assert!(outcome.has_multi_relational_sort);
        let alias = &aliases.get("links").unwrap().alias;
        assert_eq!(query.orders()[0].expr, Expr::column(alias.clone(), "id"));
    }

    #[test]
    fn test_sort_replaces_previous_order_and_functions() {
        let schema = schema();
        let mut query = QueryBuilder::new("article");
        let mut aliases = AliasMap::new();
        apply_sort(&mut query, &schema, &["likes"], "article", &mut aliases).unwrap();
        apply_sort(&mut query, &schema, &["year(date_created)"], "article", &mut aliases).unwrap();

        assert_eq!(query.orders().len(), 1);
        assert!(matches!(
            query.orders()[0].expr,
            Expr::Function(FieldFunction::Year, _)
        ));
        assert!(matches!(
            apply_sort(&mut query, &schema, &["year(likes)"], "article", &mut aliases),
            Err(Error::InvalidFilterKey { .. })
        ));
    }

    #[test]
    fn test_scoped_sort_keys() {
        let schema = schema();
        let mut query = QueryBuilder::new("article");
        let mut aliases = AliasMap::new();

        for key in ["header:users", "author:users.name", "header:article.id"] {
            assert!(matches!(
                apply_sort(&mut query, &schema, &[key], "article", &mut aliases),
                Err(Error::InvalidPolymorphicScope { .. })
            ));
        }
        assert!(query.joins().is_empty());

        let sort = ["header:users.name"];
        let outcome = apply_sort(&mut query, &schema, &sort, "article", &mut aliases).unwrap();
        assert!(outcome.has_joins);
        let alias = &aliases.get("header:users").unwrap().alias;
        assert_eq!(query.orders()[0].expr, Expr::column(alias.clone(), "name"));
    }
}
