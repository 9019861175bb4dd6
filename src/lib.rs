//! # Krisis
//!
//! *κρίσις — Ancient Greek for "judgement" or "selection".*
//!
//! Krisis compiles a JSON filter language into SQL: the `LEFT JOIN`s a
//! filter needs and a parameterized `WHERE` predicate, over a relational
//! schema that knows about many-to-one, one-to-many, many-to-many and
//! polymorphic ("any") relations.
//!
//! ## What's inside
//!
//! ### Filters
//! Filters are nested JSON objects. Keys are fields, operators start with
//! `_`, relations nest, and `_and` / `_or` group.
//!
//! ```rust,ignore
//! let filter = Filter::parse(&json!({
//!     "_and": [
//!         { "title": { "_contains": "x" } },
//!         { "likes": { "_gte": 2000 } }
//!     ],
//!     "author": { "role": { "name": { "_eq": "admin" } } },
//!     "links": { "_none": { "url": { "_null": true } } }
//! }))?;
//!
//! let mut query = QueryBuilder::new("article");
//! let mut aliases = AliasMap::new();
//! apply_filter(&mut query, &schema, &filter, "article", &mut aliases, &[], &[])?;
//!
//! let statement = query.to_statement(Dialect::Postgres);
//! ```
//!
//! ### Joins by path
//! Every relational path gets exactly one join per statement, keyed by
//! its path in the [`AliasMap`]. Sorting with [`apply_sort`] over the same
//! map reuses the joins the filter created.
//!
//! ### Quantifiers and aggregates
//! `_some` / `_none` compile to `IN` / `NOT IN` subqueries and
//! `count(relation)` to a correlated `COUNT(*)`, so existence tests never
//! fan rows out.
//!
//! ### Permissions
//! A read permission list narrows the filter before compilation: clauses
//! on unreadable fields are dropped, never reported as errors.
//!
//! ### Dialects
//! Postgres, CockroachDB, MySQL / MariaDB, SQLite, SQL Server and Oracle.
//! Values are always bound. With the `postgres`, `cockroach` or `sqlite`
//! feature a rendered [`Statement`] binds straight onto `sqlx`.
//!
//! ## Observability
//! Diagnostics go through `tracing`; compile latency, join and elision
//! counts through `metrics`. No subscriber or recorder is installed here.

pub mod alias;
pub mod compiler;
pub mod config;
pub mod error;
pub mod filter;
pub mod operator;
pub mod path;
pub mod permission;
pub mod relation;
pub mod schema;
pub mod sort;
pub mod sql;

pub use crate::alias::{AliasEntry, AliasMap};
pub use crate::compiler::{FilterCompiler, FilterOutcome, apply_filter};
pub use crate::config::CompilerConfig;
pub use crate::error::{Error, Result};
pub use crate::filter::{Clause, FieldFunction, FieldKey, FieldNode, Filter, Quantifier};
pub use crate::operator::Operator;
pub use crate::path::{ColumnPath, resolve_path};
pub use crate::permission::{FieldAccess, Permission, PermissionAction, filter_by_permission};
pub use crate::relation::{RelationKind, classify};
pub use crate::schema::{SchemaBuilder, SchemaOverview};
pub use crate::sort::{SortOutcome, apply_sort};
pub use crate::sql::{Dialect, Param, QueryBuilder, Statement};
