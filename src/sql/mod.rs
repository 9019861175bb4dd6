//! Statement builder the compiler emits into.
//!
//! The builder only records structure: joins, a condition tree and ordering.
//! Nothing is turned into SQL text until [`QueryBuilder::to_statement`] is
//! called with a [`Dialect`], and every value travels as a bound [`Param`].

#[cfg(any(feature = "postgres", feature = "cockroach", feature = "sqlite"))]
mod bind;
mod dialect;
mod geometry;
mod param;
mod render;

pub use dialect::{Dialect, SpatialOp};
pub use geometry::to_wkt;
pub use param::{Param, ToParam};
pub use render::Statement;

use crate::filter::FieldFunction;

/// `table.column`, where `table` is either a collection name or a join alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Function(FieldFunction, ColumnRef),
    /// Column cast to the dialect's polymorphic key type.
    CastText(ColumnRef),
    /// `(SELECT COUNT(*) FROM table AS alias WHERE alias.fk = parent)`
    Count(Box<CountSubquery>),
}

impl Expr {
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(table, column))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountSubquery {
    pub table: String,
    pub alias: String,
    pub foreign_key: String,
    pub parent: ColumnRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    And,
    Or,
}

impl Logical {
    pub fn as_str(&self) -> &'static str {
        match self {
            Logical::And => "AND",
            Logical::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        expr: Expr,
        op: CompareOp,
        value: Param,
        /// Wrap both sides in `LOWER()`.
        lower: bool,
    },
    Like {
        expr: Expr,
        pattern: String,
        negated: bool,
        lower: bool,
    },
    Null {
        expr: Expr,
        negated: bool,
    },
    /// `(expr IS NULL OR expr = '')`, or its negation.
    Empty {
        expr: Expr,
        negated: bool,
    },
    In {
        expr: Expr,
        values: Vec<Param>,
        negated: bool,
    },
    Between {
        expr: Expr,
        low: Param,
        high: Param,
        negated: bool,
    },
    InSubquery {
        expr: Expr,
        query: Box<QueryBuilder>,
        negated: bool,
    },
    Spatial {
        expr: Expr,
        op: SpatialOp,
        wkt: String,
        negated: bool,
    },
    Group(WhereClause),
}

/// Ordered list of conditions, each carrying the connective that joins it to
/// the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    conditions: Vec<(Condition, Logical)>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, logical: Logical, condition: Condition) {
        if let Condition::Group(group) = &condition {
            if group.is_empty() {
                return;
            }
        }
        self.conditions.push((condition, logical));
    }

    pub fn and_where(&mut self, condition: Condition) {
        self.push(Logical::And, condition);
    }

    pub fn or_where(&mut self, condition: Condition) {
        self.push(Logical::Or, condition);
    }

    /// Moves every condition of `other` onto the end of this clause, keeping
    /// each connective.
    pub fn append(&mut self, other: WhereClause) {
        for (condition, logical) in other.conditions {
            self.push(logical, condition);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> impl Iterator<Item = &(Condition, Logical)> {
        self.conditions.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOn {
    Columns(Expr, Expr),
    Value(ColumnRef, Param),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub on: Vec<JoinOn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    table: String,
    alias: Option<String>,
    select: Vec<(ColumnRef, Option<String>)>,
    joins: Vec<Join>,
    where_clause: WhereClause,
    order_by: Vec<OrderBy>,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            select: Vec::new(),
            joins: Vec::new(),
            where_clause: WhereClause::new(),
            order_by: Vec::new(),
        }
    }

    pub fn aliased(table: impl Into<String>, alias: impl Into<String>) -> Self {
        let mut query = Self::new(table);
        query.alias = Some(alias.into());
        query
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name columns of the root table are qualified with.
    pub fn table_ref(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn select(&mut self, column: ColumnRef, alias: Option<&str>) -> &mut Self {
        self.select.push((column, alias.map(str::to_string)));
        self
    }

    pub fn left_join(&mut self, join: Join) -> &mut Self {
        self.joins.push(join);
        self
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn push_where(&mut self, logical: Logical, condition: Condition) -> &mut Self {
        self.where_clause.push(logical, condition);
        self
    }

    pub fn and_where(&mut self, condition: Condition) -> &mut Self {
        self.push_where(Logical::And, condition)
    }

    /// Appends every condition of `clause` with its own connective.
    pub fn extend_where(&mut self, clause: WhereClause) -> &mut Self {
        self.where_clause.append(clause);
        self
    }

    pub fn where_clause(&self) -> &WhereClause {
        &self.where_clause
    }

    pub fn order_by(&mut self, expr: Expr, descending: bool) -> &mut Self {
        self.order_by.push(OrderBy { expr, descending });
        self
    }

    pub fn clear_order(&mut self) -> &mut Self {
        self.order_by.clear();
        self
    }

    pub fn orders(&self) -> &[OrderBy] {
        &self.order_by
    }
}
