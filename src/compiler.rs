//! Filter compiler.
//!
//! Walks a parsed [`Filter`] depth first and records joins and conditions on
//! a [`QueryBuilder`]. Joins are keyed by path in the caller's [`AliasMap`]
//! so a path used twice is joined once, and sort compilation over the same
//! map reuses them.

use std::time::Instant;

use metrics::{counter, histogram};
use tracing::debug;

use crate::alias::{AliasEntry, AliasMap, path_key};
use crate::config::CompilerConfig;
use crate::error::{Error, Result};
use crate::filter::{Clause, FieldFunction, FieldKey, FieldNode, Filter, Quantifier};
use crate::operator::Operator;
use crate::path::resolve_path;
use crate::permission::{FieldPermissions, Permission};
use crate::relation::{RelationKind, classify};
use crate::schema::{FieldType, SchemaOverview};
use crate::sql::{
    ColumnRef, CompareOp, Condition, CountSubquery, Expr, Join, JoinOn, Logical, QueryBuilder,
    ToParam, WhereClause,
};

/// What compilation added to the query, so the caller can decide on
/// `DISTINCT` or grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub has_joins: bool,
    pub has_multi_relational_filter: bool,
}

/// Collection being filtered and the name its columns are qualified with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scope {
    pub collection: String,
    pub table: String,
    /// Path key of this scope in the alias map; `None` at the root.
    pub key: Option<String>,
}

impl Scope {
    pub fn root(collection: &str, query: &QueryBuilder, aliases: &AliasMap) -> Self {
        let table = match aliases.root_alias() {
            Some(alias) => alias.to_string(),
            None if query.table() == collection => query.table_ref().to_string(),
            None => collection.to_string(),
        };
        Self {
            collection: collection.to_string(),
            table,
            key: None,
        }
    }
}

/// One relational hop, joined or reused.
#[derive(Debug, Clone)]
pub(crate) struct Hop {
    pub scope: Scope,
    pub kind: RelationKind,
    pub created: bool,
}

struct Context<'q> {
    query: &'q mut QueryBuilder,
    aliases: &'q mut AliasMap,
    outcome: FilterOutcome,
}

impl Context<'_> {
    fn joined(&mut self, hop: &Hop) {
        self.outcome.has_joins = true;
        if hop.kind.is_multi() {
            self.outcome.has_multi_relational_filter = true;
        }
    }
}

pub struct FilterCompiler<'a> {
    schema: &'a SchemaOverview,
    permissions: &'a [Permission],
    cases: &'a [Filter],
    config: CompilerConfig,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(schema: &'a SchemaOverview) -> Self {
        Self {
            schema,
            permissions: &[],
            cases: &[],
            config: CompilerConfig::default(),
        }
    }

    pub fn with_permissions(mut self, permissions: &'a [Permission]) -> Self {
        self.permissions = permissions;
        self
    }

    /// `_or` lists of CASE/WHEN field selection; their joins are registered
    /// even when the `_or` itself emits no predicate.
    pub fn with_cases(mut self, cases: &'a [Filter]) -> Self {
        self.cases = cases;
        self
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compiles `filter` on `collection` into `query`. The alias map must
    /// belong to this query only.
    pub fn apply(
        &self,
        query: &mut QueryBuilder,
        filter: &Filter,
        collection: &str,
        aliases: &mut AliasMap,
    ) -> Result<FilterOutcome> {
        let start = Instant::now();
        self.schema.collection(collection)?;
        reserve_tables(self.schema, query, aliases);

        let (filter, elided) =
            FieldPermissions::new(self.permissions).prune(self.schema, filter, collection);
        if elided > 0 {
            counter!("krisis.filter.elided").increment(elided as u64);
        }

        let scope = Scope::root(collection, query, aliases);
        let mut cx = Context {
            query,
            aliases,
            outcome: FilterOutcome::default(),
        };

        let clause = self.compile(&mut cx, &filter, &scope)?;
        cx.query.extend_where(clause);

        histogram!("krisis.compile.duration_ms",
            "collection" => collection.to_string()
        )
        .record(start.elapsed().as_millis() as f64);

        Ok(cx.outcome)
    }

    fn compile(&self, cx: &mut Context<'_>, filter: &Filter, scope: &Scope) -> Result<WhereClause> {
        let mut clause = WhereClause::new();

        for item in filter.clauses() {
            match item {
                Clause::And(children) => {
                    let group = self.group(cx, children, scope, Logical::And)?;
                    clause.and_where(Condition::Group(group));
                }
                Clause::Or(children) => {
                    if children.iter().any(Filter::is_empty) {
                        // an empty member matches every row
                        if children.len() > 1 && children == self.cases {
                            for child in children.iter().filter(|c| !c.is_empty()) {
                                self.register_joins(cx, child, scope)?;
                            }
                        }
                        continue;
                    }
                    let group = self.group(cx, children, scope, Logical::Or)?;
                    clause.and_where(Condition::Group(group));
                }
                Clause::Field { key, node } => self.field(cx, &mut clause, key, node, scope)?,
            }
        }

        Ok(clause)
    }

    /// Each child compiles to its own AND group; the groups are joined with
    /// `logical` in their original order.
    fn group(
        &self,
        cx: &mut Context<'_>,
        children: &[Filter],
        scope: &Scope,
        logical: Logical,
    ) -> Result<WhereClause> {
        let mut group = WhereClause::new();
        for child in children {
            let inner = self.compile(cx, child, scope)?;
            group.push(logical, Condition::Group(inner));
        }
        Ok(group)
    }

    fn field(
        &self,
        cx: &mut Context<'_>,
        out: &mut WhereClause,
        key: &FieldKey,
        node: &FieldNode,
        scope: &Scope,
    ) -> Result<()> {
        match node {
            FieldNode::Operators(operators) => self.leaf(cx, out, key, operators, scope),
            FieldNode::Nested(inner) => {
                let hop = add_join(self.schema, cx.query, cx.aliases, scope, key)?;
                cx.joined(&hop);
                let nested = self.compile(cx, inner, &hop.scope)?;
                out.append(nested);
                Ok(())
            }
            FieldNode::Quantified(quantifier, inner) => {
                self.quantified(cx, out, key, *quantifier, inner, scope)
            }
        }
    }

    fn leaf(
        &self,
        cx: &mut Context<'_>,
        out: &mut WhereClause,
        key: &FieldKey,
        operators: &[(Operator, serde_json::Value)],
        scope: &Scope,
    ) -> Result<()> {
        let relation = classify(&self.schema.relations, &scope.collection, &key.field)?;

        // `header:image` compared directly: the key must also point at `image`
        if let Some(target) = key.scope.as_deref() {
            let path = path_key(scope.key.as_deref(), &key.raw);
            let kind = relation
                .as_ref()
                .map(|info| &info.kind)
                .filter(|kind| matches!(kind, RelationKind::A2O { .. }))
                .ok_or_else(|| Error::InvalidPolymorphicScope {
                    scope: target.to_string(),
                    path: path.clone(),
                })?;
            kind.target_collection(Some(target), &path)?;
            if let RelationKind::A2O {
                collection_field, ..
            } = kind
            {
                out.and_where(Condition::Compare {
                    expr: Expr::column(scope.table.clone(), collection_field.clone()),
                    op: CompareOp::Eq,
                    value: target.to_param(),
                    lower: false,
                });
            }
        }

        let (expr, field_type, concealed) = match (&relation, key.function) {
            (Some(info), Some(FieldFunction::Count)) if info.kind.is_multi() => {
                let expr = self.count(cx, key, &info.kind, scope)?;
                (expr, Some(FieldFunction::Count.output_type()), false)
            }
            (Some(info), None) if key.is_follow() || info.kind.is_multi() => {
                let hop = add_join(self.schema, cx.query, cx.aliases, scope, key)?;
                cx.joined(&hop);
                let path = resolve_path(
                    self.schema,
                    &[key.raw.as_str()],
                    &scope.collection,
                    cx.aliases,
                    scope.key.as_deref(),
                )?;
                let field_type = self
                    .schema
                    .field(&path.target_collection, &path.field)
                    .map(|f| f.field_type);
                (Expr::Column(path.column), field_type, false)
            }
            _ => self.local(key, scope)?,
        };

        for (operator, value) in operators {
            if let (true, Some(field_type)) = (self.config.validate_operators, field_type) {
                operator.validate(field_type, concealed)?;
            }
            out.and_where(operator.apply(expr.clone(), value, field_type)?);
        }

        Ok(())
    }

    /// Column on the scope's own table, optionally wrapped in a function.
    fn local(&self, key: &FieldKey, scope: &Scope) -> Result<(Expr, Option<FieldType>, bool)> {
        let invalid = || Error::InvalidFilterKey {
            key: key.raw.clone(),
            collection: scope.collection.clone(),
        };

        let field = self.schema.field(&scope.collection, &key.field);
        if field.is_none() && self.config.strict_fields {
            return Err(invalid());
        }

        let column = ColumnRef::new(scope.table.clone(), key.field.clone());
        match (key.function, field) {
            (Some(function), Some(field)) => {
                if !FieldFunction::for_type(field.field_type).contains(&function) {
                    return Err(invalid());
                }
                Ok((
                    Expr::Function(function.for_column(field.field_type), column),
                    Some(function.output_type()),
                    false,
                ))
            }
            (Some(function), None) => Ok((
                Expr::Function(function, column),
                Some(function.output_type()),
                false,
            )),
            (None, Some(field)) => Ok((
                Expr::Column(column),
                Some(field.field_type),
                field.is_concealed(),
            )),
            (None, None) => Ok((Expr::Column(column), None, false)),
        }
    }

    /// `count(<relation>)` as a correlated scalar subquery; no outer join.
    fn count(
        &self,
        cx: &mut Context<'_>,
        key: &FieldKey,
        kind: &RelationKind,
        scope: &Scope,
    ) -> Result<Expr> {
        let (table, foreign_key) = match kind {
            RelationKind::O2A { .. } => return Err(Error::InvalidFieldFunction(key.raw.clone())),
            kind => kind
                .many_side()
                .ok_or_else(|| Error::InvalidFieldFunction(key.raw.clone()))?,
        };
        let parent_pk = self.schema.primary_key(&scope.collection)?;

        Ok(Expr::Count(Box::new(CountSubquery {
            table: table.to_string(),
            alias: cx.aliases.generate_alias(),
            foreign_key: foreign_key.to_string(),
            parent: ColumnRef::new(scope.table.clone(), parent_pk),
        })))
    }

    /// `_some` / `_none` as `parent.pk [NOT] IN (SELECT fk FROM many WHERE
    /// fk IS NOT NULL AND ...)`.
    fn quantified(
        &self,
        cx: &mut Context<'_>,
        out: &mut WhereClause,
        key: &FieldKey,
        quantifier: Quantifier,
        inner: &Filter,
        scope: &Scope,
    ) -> Result<()> {
        let path = path_key(scope.key.as_deref(), &key.raw);
        let invalid = || Error::InvalidQuantifier {
            quantifier: quantifier.as_str().to_string(),
            path: path.clone(),
        };

        let info = classify(&self.schema.relations, &scope.collection, &key.field)?
            .ok_or_else(invalid)?;
        let (many, foreign_key) = info.kind.many_side().ok_or_else(invalid)?;
        self.schema.collection(many)?;

        let parent_pk = self.schema.primary_key(&scope.collection)?;
        let mut parent = Expr::column(scope.table.clone(), parent_pk);

        let mut subquery = QueryBuilder::new(many);
        subquery.select(ColumnRef::new(many, foreign_key), Some(foreign_key));
        subquery.and_where(Condition::Null {
            expr: Expr::column(many, foreign_key),
            negated: true,
        });

        if let RelationKind::O2A {
            collection_field, ..
        } = &info.kind
        {
            subquery.and_where(Condition::Compare {
                expr: Expr::column(many, collection_field.clone()),
                op: CompareOp::Eq,
                value: scope.collection.to_param(),
                lower: false,
            });
            parent = Expr::CastText(ColumnRef::new(scope.table.clone(), parent_pk));
        }

        let mut sub_aliases = cx.aliases.subquery();
        let clause = {
            let mut sub_cx = Context {
                query: &mut subquery,
                aliases: &mut sub_aliases,
                outcome: FilterOutcome::default(),
            };
            let sub_scope = Scope {
                collection: many.to_string(),
                table: many.to_string(),
                key: None,
            };
            self.compile(&mut sub_cx, inner, &sub_scope)?
        };
        subquery.and_where(Condition::Group(clause));
        cx.aliases.resume(sub_aliases);

        out.and_where(Condition::InSubquery {
            expr: parent,
            query: Box::new(subquery),
            negated: quantifier == Quantifier::None,
        });

        Ok(())
    }

    /// Registers the joins `filter` would need without emitting predicates.
    fn register_joins(&self, cx: &mut Context<'_>, filter: &Filter, scope: &Scope) -> Result<()> {
        for item in filter.clauses() {
            match item {
                Clause::And(children) | Clause::Or(children) => {
                    for child in children {
                        self.register_joins(cx, child, scope)?;
                    }
                }
                Clause::Field {
                    key,
                    node: FieldNode::Nested(inner),
                } => {
                    let hop = add_join(self.schema, cx.query, cx.aliases, scope, key)?;
                    cx.joined(&hop);
                    self.register_joins(cx, inner, &hop.scope)?;
                }
                Clause::Field { .. } => {}
            }
        }
        Ok(())
    }
}

/// Compiles `filter` with the default configuration. `cases` are the `_or`
/// lists of CASE/WHEN field selection; `permissions` narrows the filter to
/// readable fields (empty means unrestricted).
pub fn apply_filter(
    query: &mut QueryBuilder,
    schema: &SchemaOverview,
    filter: &Filter,
    collection: &str,
    aliases: &mut AliasMap,
    cases: &[Filter],
    permissions: &[Permission],
) -> Result<FilterOutcome> {
    FilterCompiler::new(schema)
        .with_cases(cases)
        .with_permissions(permissions)
        .apply(query, filter, collection, aliases)
}

/// Keeps generated aliases clear of the root table and of every collection
/// name, since subqueries and fallbacks refer to tables unaliased.
pub(crate) fn reserve_tables(
    schema: &SchemaOverview,
    query: &QueryBuilder,
    aliases: &mut AliasMap,
) {
    aliases.reserve(query.table_ref());
    for name in schema.collections.keys() {
        aliases.reserve(name);
    }
}

/// Joins the relation `key` from `scope`, or reuses the join already
/// registered for its path.
pub(crate) fn add_join(
    schema: &SchemaOverview,
    query: &mut QueryBuilder,
    aliases: &mut AliasMap,
    scope: &Scope,
    key: &FieldKey,
) -> Result<Hop> {
    let info = classify(&schema.relations, &scope.collection, &key.field)?.ok_or_else(|| {
        Error::UnresolvedRelation {
            collection: scope.collection.clone(),
            field: key.field.clone(),
        }
    })?;

    let this_key = path_key(scope.key.as_deref(), &key.raw);
    let target = info.kind.target_collection(key.scope.as_deref(), &this_key)?;
    let target_pk = schema.primary_key(&target)?.to_string();

    if let Some(entry) = aliases.get(&this_key) {
        debug!(path = %this_key, alias = %entry.alias, "reusing join");
        return Ok(Hop {
            scope: Scope {
                collection: target,
                table: entry.alias.clone(),
                key: Some(this_key),
            },
            kind: info.kind,
            created: false,
        });
    }

    let alias = aliases.generate_alias();
    let on = match &info.kind {
        RelationKind::M2O { .. } => vec![JoinOn::Columns(
            Expr::column(scope.table.clone(), info.relation.field.clone()),
            Expr::column(alias.clone(), target_pk),
        )],
        RelationKind::A2O {
            collection_field, ..
        } => vec![
            JoinOn::Value(
                ColumnRef::new(scope.table.clone(), collection_field.clone()),
                target.to_param(),
            ),
            JoinOn::Columns(
                Expr::column(scope.table.clone(), info.relation.field.clone()),
                Expr::CastText(ColumnRef::new(alias.clone(), target_pk)),
            ),
        ],
        RelationKind::O2M { field, .. }
        | RelationKind::M2M { field, .. }
        | RelationKind::M2A { field, .. } => {
            let parent_pk = schema.primary_key(&scope.collection)?;
            vec![JoinOn::Columns(
                Expr::column(scope.table.clone(), parent_pk),
                Expr::column(alias.clone(), field.clone()),
            )]
        }
        RelationKind::O2A {
            field,
            collection_field,
            ..
        } => {
            let parent_pk = schema.primary_key(&scope.collection)?;
            vec![
                JoinOn::Value(
                    ColumnRef::new(alias.clone(), collection_field.clone()),
                    scope.collection.to_param(),
                ),
                JoinOn::Columns(
                    Expr::column(alias.clone(), field.clone()),
                    Expr::CastText(ColumnRef::new(scope.table.clone(), parent_pk)),
                ),
            ]
        }
    };

    query.left_join(Join {
        table: target.clone(),
        alias: alias.clone(),
        on,
    });
    aliases.insert(
        this_key.clone(),
        AliasEntry {
            alias: alias.clone(),
            collection: target.clone(),
        },
    );
    counter!("krisis.joins.created").increment(1);
    debug!(
        path = %this_key,
        alias = %alias,
        collection = %target,
        relation = info.kind.name(),
        "join created"
    );

    Ok(Hop {
        scope: Scope {
            collection: target,
            table: alias,
            key: Some(this_key),
        },
        kind: info.kind,
        created: true,
    })
}
