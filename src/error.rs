use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while compiling a filter. All of them describe bad client
/// input; none are transient and none should be retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("\"{collection}.{field}\" is not a relational field")]
    UnresolvedRelation { collection: String, field: String },

    #[error(
        "You have to provide a collection scope when sorting or filtering on a many-to-any item (\"{path}\")"
    )]
    MissingPolymorphicScope { path: String },

    #[error("\"{scope}\" is not a collection \"{path}\" can point to")]
    InvalidPolymorphicScope { scope: String, path: String },

    #[error("\"{operator}\" expects exactly two values, got {got}")]
    InvalidOperatorArity { operator: String, got: usize },

    #[error("\"{operator}\" does not accept {shape} values")]
    InvalidOperatorValueShape { operator: String, shape: String },

    #[error("Unknown filter operator \"{0}\"")]
    UnknownOperator(String),

    #[error("Invalid filter key \"{key}\" on \"{collection}\"")]
    InvalidFilterKey { key: String, collection: String },

    #[error("\"{field_type}\" field type does not contain the \"{operator}\" filter operator")]
    OperatorNotAllowedForType { field_type: String, operator: String },

    #[error("\"{quantifier}\" can only be used with top level relational alias field (\"{path}\")")]
    InvalidQuantifier { quantifier: String, path: String },

    #[error("Invalid field function \"{0}\"")]
    InvalidFieldFunction(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

impl Error {
    /// HTTP status the request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::CollectionNotFound(_) => 404,
            _ => 400,
        }
    }

    pub(crate) fn shape(operator: &str, value: &serde_json::Value) -> Self {
        let shape = match value {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Error::InvalidOperatorValueShape {
            operator: operator.to_string(),
            shape: shape.to_string(),
        }
    }
}
