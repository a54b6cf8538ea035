use serde::{Deserialize, Serialize};

/// Database family the generated SQL targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dialect {
    #[default]
    Generic,
    Postgres,
    MySql,
    Db2,
}

impl Dialect {
    pub fn quote_identifier(self, identifier: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", identifier.replace('`', "``")),
            _ => format!("\"{}\"", identifier.replace('"', "\"\"")),
        }
    }

    /// Whether `(a, b) in ((1, 2), (3, 4))` is accepted.
    pub fn supports_row_value_in(self) -> bool {
        matches!(self, Dialect::MySql)
    }

    /// Whether aggregate expressions in `HAVING` need an explicit numeric cast.
    pub fn requires_numeric_having_cast(self) -> bool {
        matches!(self, Dialect::Db2)
    }

    pub fn cast_numeric(self, expression: &str) -> String {
        match self {
            Dialect::Db2 => format!("FLOAT({expression})"),
            _ => format!("CAST({expression} AS DOUBLE PRECISION)"),
        }
    }

    /// Ascending order on `expression` with nulls after every other value.
    pub fn order_by_nulls_last(self, expression: &str) -> String {
        match self {
            Dialect::MySql => format!("ISNULL({expression}) ASC, {expression} ASC"),
            Dialect::Db2 => format!("{expression} ASC"),
            Dialect::Generic | Dialect::Postgres => format!("{expression} ASC NULLS LAST"),
        }
    }
}
