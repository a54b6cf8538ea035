//! SQL statement model, dialect rendering and execution.

mod dialect;
mod memory;
mod predicate;
mod query;

pub use dialect::Dialect;
pub use memory::MemoryExecutor;
pub use predicate::{AggExpr, Column, Predicate};
pub use query::SqlQuery;

use crate::error::OlapResult;
use crate::value::Value;

/// Runs a [`SqlQuery`] and returns its rows, one value per select column.
pub trait SqlExecutor: Send + Sync + std::fmt::Debug {
    fn execute(&self, query: &SqlQuery) -> OlapResult<Vec<Vec<Value>>>;
}
