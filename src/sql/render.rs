use super::{Condition, Dialect, Expr, Join, JoinOn, Param, QueryBuilder, WhereClause};

/// Rendered SQL text plus its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl QueryBuilder {
    pub fn to_statement(&self, dialect: Dialect) -> Statement {
        let mut renderer = Renderer::new(dialect);
        let sql = renderer.query(self);
        Statement {
            sql,
            params: renderer.params,
        }
    }

    /// Only the predicate, without the `WHERE` keyword. Join parameters are
    /// not included.
    pub fn where_statement(&self, dialect: Dialect) -> Statement {
        let mut renderer = Renderer::new(dialect);
        let sql = renderer.clause(self.where_clause());
        Statement {
            sql,
            params: renderer.params,
        }
    }
}

struct Renderer {
    dialect: Dialect,
    params: Vec<Param>,
}

impl Renderer {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, param: Param) -> String {
        let numeric = matches!(param, Param::Numeric(_));
        self.params.push(param);
        let param_idx = self.params.len();
        if numeric {
            self.dialect.numeric_placeholder(param_idx)
        } else {
            self.dialect.placeholder(param_idx)
        }
    }

    fn query(&mut self, query: &QueryBuilder) -> String {
        let select = if query.select.is_empty() {
            "*".to_string()
        } else {
            query
                .select
                .iter()
                .map(|(column, alias)| {
                    let column = self.column(&column.table, &column.column);
                    match alias {
                        Some(alias) => format!("{} AS {}", column, self.dialect.quote(alias)),
                        None => column,
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", select, self.dialect.quote(&query.table));
        if let Some(alias) = &query.alias {
            sql.push_str(&format!(" AS {}", self.dialect.quote(alias)));
        }

        for join in &query.joins {
            sql.push(' ');
            sql.push_str(&self.join(join));
        }

        if !query.where_clause.is_empty() {
            let predicate = self.clause(&query.where_clause);
            sql.push_str(&format!(" WHERE {}", predicate));
        }

        if !query.order_by.is_empty() {
            let terms: Vec<String> = query
                .order_by
                .iter()
                .map(|order| {
                    let direction = if order.descending { "DESC" } else { "ASC" };
                    format!("{} {}", self.expr(&order.expr), direction)
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
        }

        sql
    }

    fn join(&mut self, join: &Join) -> String {
        let on: Vec<String> = join
            .on
            .iter()
            .map(|on| match on {
                JoinOn::Columns(left, right) => {
                    format!("{} = {}", self.expr(left), self.expr(right))
                }
                JoinOn::Value(column, value) => {
                    let column = self.column(&column.table, &column.column);
                    format!("{} = {}", column, self.bind(value.clone()))
                }
            })
            .collect();

        format!(
            "LEFT JOIN {} AS {} ON {}",
            self.dialect.quote(&join.table),
            self.dialect.quote(&join.alias),
            on.join(" AND ")
        )
    }

    fn clause(&mut self, clause: &WhereClause) -> String {
        let conditions: Vec<(String, &str)> = clause
            .conditions()
            .map(|(condition, logical)| (self.condition(condition), logical.as_str()))
            .collect();

        let mut query = String::new();
        for (i, (cond, joiner)) in conditions.iter().enumerate() {
            // the first connective has nothing to join to
            if i > 0 {
                query.push(' ');
                query.push_str(joiner);
                query.push(' ');
            }
            query.push_str(cond);
        }
        query
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Compare {
                expr,
                op,
                value,
                lower,
            } => {
                let expr = self.expr(expr);
                let placeholder = self.bind(value.clone());
                if *lower {
                    format!("LOWER({}) {} LOWER({})", expr, op.as_str(), placeholder)
                } else {
                    format!("{} {} {}", expr, op.as_str(), placeholder)
                }
            }
            Condition::Like {
                expr,
                pattern,
                negated,
                lower,
            } => {
                let expr = self.expr(expr);
                let placeholder = self.bind(Param::String(pattern.clone()));
                let like = if *negated { "NOT LIKE" } else { "LIKE" };
                if *lower {
                    format!("LOWER({}) {} LOWER({})", expr, like, placeholder)
                } else {
                    format!("{} {} {}", expr, like, placeholder)
                }
            }
            Condition::Null { expr, negated } => {
                let expr = self.expr(expr);
                if *negated {
                    format!("{} IS NOT NULL", expr)
                } else {
                    format!("{} IS NULL", expr)
                }
            }
            Condition::Empty { expr, negated } => {
                let expr = self.expr(expr);
                let placeholder = self.bind(Param::String(String::new()));
                if *negated {
                    format!("({} IS NOT NULL AND {} <> {})", expr, expr, placeholder)
                } else {
                    format!("({} IS NULL OR {} = {})", expr, expr, placeholder)
                }
            }
            Condition::In {
                expr,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let expr = self.expr(expr);
                let placeholders: Vec<String> =
                    values.iter().map(|value| self.bind(value.clone())).collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", expr, keyword, placeholders.join(", "))
            }
            Condition::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let expr = self.expr(expr);
                let low = self.bind(low.clone());
                let high = self.bind(high.clone());
                let keyword = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                format!("{} {} {} AND {}", expr, keyword, low, high)
            }
            Condition::InSubquery {
                expr,
                query,
                negated,
            } => {
                let expr = self.expr(expr);
                let subquery = self.query(query);
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", expr, keyword, subquery)
            }
            Condition::Spatial {
                expr,
                op,
                wkt,
                negated,
            } => {
                let expr = self.expr(expr);
                let placeholder = self.bind(Param::String(wkt.clone()));
                let predicate = self.dialect.spatial(*op, &expr, &placeholder);
                if *negated {
                    format!("NOT ({})", predicate)
                } else {
                    predicate
                }
            }
            Condition::Group(group) => {
                let inner = self.clause(group);
                if group.len() > 1 {
                    format!("({})", inner)
                } else {
                    inner
                }
            }
        }
    }

    fn column(&self, table: &str, column: &str) -> String {
        format!("{}.{}", self.dialect.quote(table), self.dialect.quote(column))
    }

    fn expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Column(column) => self.column(&column.table, &column.column),
            Expr::Function(function, column) => {
                let column = self.column(&column.table, &column.column);
                self.dialect.field_function(*function, &column)
            }
            Expr::CastText(column) => {
                let column = self.column(&column.table, &column.column);
                self.dialect.cast_a2o(&column)
            }
            Expr::Count(count) => format!(
                "(SELECT COUNT(*) FROM {} AS {} WHERE {} = {})",
                self.dialect.quote(&count.table),
                self.dialect.quote(&count.alias),
                self.column(&count.alias, &count.foreign_key),
                self.column(&count.parent.table, &count.parent.column)
            ),
        }
    }
}
