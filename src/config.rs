//! Compiler configuration

use serde::{Deserialize, Serialize};

use crate::alias::AliasMap;
use crate::error::{Error, Result};
use crate::sql::{Dialect, QueryBuilder, Statement};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Target database, used when rendering (default: postgres)
    #[serde(default)]
    pub dialect: Dialect,

    /// Seed of the join alias generator (default: 0)
    #[serde(default)]
    pub alias_seed: u64,

    /// Check every operator against the field type (default: true)
    #[serde(default = "default_true")]
    pub validate_operators: bool,

    /// Reject filters on fields missing from the schema (default: true)
    #[serde(default = "default_true")]
    pub strict_fields: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            alias_seed: 0,
            validate_operators: default_true(),
            strict_fields: default_true(),
        }
    }
}

impl CompilerConfig {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|err| Error::InvalidFilter(err.to_string()))
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }

    /// Fresh alias map seeded from this config, one per compiled query.
    pub fn alias_map(&self) -> AliasMap {
        AliasMap::with_seed(self.alias_seed)
    }

    pub fn render(&self, query: &QueryBuilder) -> Statement {
        query.to_statement(self.dialect)
    }
}
