//! Set evaluation core for a ROLAP engine.
//!
//! Set functions such as `NonEmpty` and `Except` are first offered to native gates that push
//! them down into one SQL query; when a gate declines, the same call is evaluated in memory
//! over the evaluation context. Both paths produce the same tuples in the same order.

mod cache;
mod calc;
mod cancel;
mod cell;
mod config;
mod context;
mod error;
mod expr;
mod functions;
mod interpret;
mod native;
mod schema;
mod session;
mod sql;
mod table;
mod tuple;
mod value;

pub use crate::cache::PlanCache;
pub use crate::calc::{Calc, Compiler, ResultStyle, ScalarCalc, SetCalc, SetValue};
pub use crate::cancel::{CancellationChecker, Execution};
pub use crate::cell::{CellReader, FactCellReader};
pub use crate::config::NativeSettings;
pub use crate::context::{ContextGuard, ContextSnapshot, Evaluator, Savepoint};
pub use crate::error::{OlapError, OlapResult};
pub use crate::expr::{Category, Expr};
pub use crate::functions::{iter_function_specs, lookup_function, resolve, FunctionSpec};
pub use crate::interpret::{count, except, filter_non_empty, set_to_str};
pub use crate::session::{Session, SessionBuilder};
pub use crate::table::Table;
pub use crate::tuple::{Tuple, TupleCursor, TupleIterable, TupleList};
pub use crate::value::{CellError, Value};

pub use crate::native::{
    is_prefer_interpreter, CacheKey, Constraint, CrossJoinArg, CrossJoinArgFactory,
    FilterIntent, NativeExcept, NativeNonEmpty, NativeRegistry, NativeSetEvaluator,
    NativeSetGate, PredicateGenerator, Refinement, RefinementKind, SqlFragment,
};
pub use crate::schema::{
    Access, AggregateColumn, AggregateTable, AggregateTableDef, Aggregator, CalcMember,
    DimensionDef, Formula, Hierarchy, HierarchyId, Level, LevelDef, LevelId, LevelType, Measure,
    MeasureId, Member, MemberId, MemberKind, Role, Schema, SchemaBuilder,
};
pub use crate::sql::{
    AggExpr, Column, Dialect, MemoryExecutor, Predicate, SqlExecutor, SqlQuery,
};
