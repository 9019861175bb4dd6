use serde::{Deserialize, Serialize};

use crate::filter::FieldFunction;

/// Target database. Rendering is the only place the dialect matters; the
/// compiled condition tree is dialect-neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Cockroach,
    #[serde(alias = "mariadb")]
    MySql,
    Sqlite,
    Mssql,
    Oracle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialOp {
    Intersects,
    IntersectsBbox,
}

impl Dialect {
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Mssql => format!("[{}]", ident.replace(']', "]]")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the 1-based parameter position.
    pub fn placeholder(&self, param_idx: usize) -> String {
        match self {
            Dialect::Postgres | Dialect::Cockroach => format!("${}", param_idx),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
            Dialect::Mssql => format!("@P{}", param_idx),
            Dialect::Oracle => format!(":{}", param_idx),
        }
    }

    /// Placeholder for numeric text. Postgres will not compare a text
    /// parameter to a numeric column, so the value is cast there.
    pub fn numeric_placeholder(&self, param_idx: usize) -> String {
        let placeholder = self.placeholder(param_idx);
        match self {
            Dialect::Postgres | Dialect::Cockroach => format!("CAST({} AS numeric)", placeholder),
            _ => placeholder,
        }
    }

    /// Character type the polymorphic key column is compared as.
    pub fn a2o_cast_type(&self) -> &'static str {
        match self {
            Dialect::Postgres => "varchar",
            Dialect::Cockroach => "STRING",
            Dialect::MySql | Dialect::Sqlite => "CHAR(255)",
            Dialect::Mssql => "nvarchar(255)",
            Dialect::Oracle => "VARCHAR2(255)",
        }
    }

    pub fn cast_a2o(&self, column: &str) -> String {
        format!("CAST({} AS {})", column, self.a2o_cast_type())
    }

    pub fn field_function(&self, function: FieldFunction, column: &str) -> String {
        use FieldFunction::*;

        match self {
            Dialect::Postgres | Dialect::Cockroach => match function {
                Count => format!("json_array_length({}::json)", column),
                CountCsv => format!(
                    "array_length(regexp_split_to_array({}, ','), 1)",
                    column
                ),
                Weekday => format!("EXTRACT(DOW FROM {})", column),
                other => format!("EXTRACT({} FROM {})", other.unit().to_uppercase(), column),
            },
            Dialect::MySql => match function {
                Year => format!("YEAR({})", column),
                Month => format!("MONTH({})", column),
                Week => format!("WEEK({})", column),
                Day => format!("DAYOFMONTH({})", column),
                Weekday => format!("DAYOFWEEK({})", column),
                Hour => format!("HOUR({})", column),
                Minute => format!("MINUTE({})", column),
                Second => format!("SECOND({})", column),
                Count => format!("JSON_LENGTH({})", column),
                CountCsv => csv_count("CHAR_LENGTH", column),
            },
            Dialect::Sqlite => match function {
                Count => format!("json_array_length({})", column),
                CountCsv => csv_count("LENGTH", column),
                other => format!(
                    "CAST(strftime('{}', {}) AS INTEGER)",
                    strftime_format(other),
                    column
                ),
            },
            Dialect::Mssql => match function {
                Count => format!("(SELECT COUNT(*) FROM OPENJSON({}))", column),
                CountCsv => csv_count("LEN", column),
                other => format!("DATEPART({}, {})", other.unit(), column),
            },
            Dialect::Oracle => match function {
                Week => format!("TO_NUMBER(TO_CHAR({}, 'IW'))", column),
                Weekday => format!("TO_NUMBER(TO_CHAR({}, 'D'))", column),
                Count => format!("json_value({}, '$.size()')", column),
                CountCsv => csv_count("LENGTH", column),
                other => format!("EXTRACT({} FROM {})", other.unit().to_uppercase(), column),
            },
        }
    }

    /// Spatial predicate for `column` against the geometry bound at
    /// `placeholder` (WKT text).
    pub fn spatial(&self, op: SpatialOp, column: &str, placeholder: &str) -> String {
        match (self, op) {
            (Dialect::Postgres | Dialect::Cockroach, SpatialOp::Intersects) => {
                format!("ST_Intersects({}, ST_GeomFromText({}))", column, placeholder)
            }
            (Dialect::Postgres | Dialect::Cockroach, SpatialOp::IntersectsBbox) => {
                format!("{} && ST_GeomFromText({})", column, placeholder)
            }
            (Dialect::MySql, SpatialOp::Intersects) => {
                format!("ST_Intersects({}, ST_GeomFromText({}))", column, placeholder)
            }
            (Dialect::MySql, SpatialOp::IntersectsBbox) => {
                format!("MBRIntersects({}, ST_GeomFromText({}))", column, placeholder)
            }
            (Dialect::Sqlite, SpatialOp::Intersects) => {
                format!("ST_Intersects({}, ST_GeomFromText({}, 4326))", column, placeholder)
            }
            (Dialect::Sqlite, SpatialOp::IntersectsBbox) => {
                format!("MbrIntersects({}, ST_GeomFromText({}, 4326))", column, placeholder)
            }
            (Dialect::Mssql, SpatialOp::Intersects) => format!(
                "{}.STIntersects(geometry::STGeomFromText({}, 4326)) = 1",
                column, placeholder
            ),
            (Dialect::Mssql, SpatialOp::IntersectsBbox) => format!(
                "{}.STEnvelope().STIntersects(geometry::STGeomFromText({}, 4326).STEnvelope()) = 1",
                column, placeholder
            ),
            (Dialect::Oracle, SpatialOp::Intersects) => format!(
                "SDO_OVERLAPBDYINTERSECT({}, SDO_GEOMETRY({}, 4326)) = 'TRUE'",
                column, placeholder
            ),
            (Dialect::Oracle, SpatialOp::IntersectsBbox) => format!(
                "SDO_FILTER({}, SDO_GEOMETRY({}, 4326)) = 'TRUE'",
                column, placeholder
            ),
        }
    }
}

fn csv_count(length_fn: &str, column: &str) -> String {
    format!(
        "{len}({col}) - {len}(REPLACE({col}, ',', '')) + 1",
        len = length_fn,
        col = column
    )
}

fn strftime_format(function: FieldFunction) -> &'static str {
    match function {
        FieldFunction::Year => "%Y",
        FieldFunction::Month => "%m",
        FieldFunction::Week => "%W",
        FieldFunction::Day => "%d",
        FieldFunction::Weekday => "%w",
        FieldFunction::Hour => "%H",
        FieldFunction::Minute => "%M",
        FieldFunction::Second => "%S",
        FieldFunction::Count | FieldFunction::CountCsv => "",
    }
}
