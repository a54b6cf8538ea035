use crate::value::Value;

pub type OlapResult<T> = Result<T, OlapError>;

#[derive(Debug, thiserror::Error)]
pub enum OlapError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("unknown level: {0}")]
    UnknownLevel(String),

    #[error("unknown member: {0}")]
    UnknownMember(String),

    #[error("unknown measure: {0}")]
    UnknownMeasure(String),

    #[error("hierarchy {0} has no members to default to")]
    EmptyHierarchy(String),

    #[error("duplicate table: {table}")]
    DuplicateTable { table: String },

    #[error("duplicate dimension: {dimension}")]
    DuplicateDimension { dimension: String },

    #[error("duplicate measure: {measure}")]
    DuplicateMeasure { measure: String },

    #[error("schema mismatch for {table}: expected {expected} values, got {actual}")]
    SchemaMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("non-unique key {value} in {table}.{column}")]
    NonUniqueKey {
        table: String,
        column: String,
        value: Value,
    },

    #[error("fact table {fact_table} references {value} in {column} with no row in {dimension_table}")]
    DanglingForeignKey {
        fact_table: String,
        column: String,
        dimension_table: String,
        value: Value,
    },

    #[error("aggregate table {table} cannot roll up measure {measure}")]
    NoRollup { table: String, measure: String },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("no signature of {function} accepts ({signature})")]
    SignatureMismatch { function: String, signature: String },

    #[error("tuple arity mismatch: list has arity {expected}, tuple has {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("query cancelled")]
    Cancelled,

    #[error("query timed out")]
    Timeout,

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("sql error: {0}")]
    Sql(String),

    #[error("formatting failed")]
    Format(#[from] std::fmt::Error),
}
