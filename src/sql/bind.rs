use super::{Param, Statement};

#[cfg(any(feature = "postgres", feature = "cockroach"))]
use sqlx::{Postgres, postgres::PgArguments};
#[cfg(feature = "sqlite")]
use sqlx::{Sqlite, sqlite::SqliteArguments};

use sqlx::query::Query;

impl Statement {
    /// Binds the parameters onto a Postgres / CockroachDB query. Render the
    /// statement with [`Dialect::Postgres`](super::Dialect::Postgres) or
    /// [`Dialect::Cockroach`](super::Dialect::Cockroach) first.
    #[cfg(any(feature = "postgres", feature = "cockroach"))]
    pub fn bind_postgres(&self) -> Query<'_, Postgres, PgArguments> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = match param {
                Param::Null => query.bind(None::<String>),
                Param::String(s) | Param::Numeric(s) => query.bind(s.as_str()),
                Param::Int(i) => query.bind(*i),
                Param::Float(f) => query.bind(*f),
                Param::Bool(b) => query.bind(*b),
                Param::Date(d) => query.bind(*d),
                Param::DateTime(dt) => query.bind(*dt),
                Param::Time(t) => query.bind(*t),
                Param::Timestamp(t) => query.bind(*t),
            };
        }
        query
    }

    /// Binds the parameters onto a SQLite query rendered with
    /// [`Dialect::Sqlite`](super::Dialect::Sqlite).
    #[cfg(feature = "sqlite")]
    pub fn bind_sqlite(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = match param {
                Param::Null => query.bind(None::<String>),
                Param::String(s) | Param::Numeric(s) => query.bind(s.as_str()),
                Param::Int(i) => query.bind(*i),
                Param::Float(f) => query.bind(*f),
                Param::Bool(b) => query.bind(*b),
                Param::Date(d) => query.bind(*d),
                Param::DateTime(dt) => query.bind(*dt),
                Param::Time(t) => query.bind(*t),
                Param::Timestamp(t) => query.bind(*t),
            };
        }
        query
    }
}
