//! Native set evaluation: recognizing set expressions that SQL can answer, compiling them into
//! a [`Constraint`] and running the resulting query.
//!
//! Every gate either returns a [`NativeSetEvaluator`] whose results equal the interpreted
//! evaluation of the same call, or `None` so the caller interprets.

mod constraint;
mod crossjoin_arg;
mod except;
mod filter;
mod non_empty;

pub use constraint::{CacheKey, Constraint, Refinement, RefinementKind};
pub use crossjoin_arg::{is_prefer_interpreter, CrossJoinArg, CrossJoinArgFactory};
pub use except::NativeExcept;
pub use filter::{FilterIntent, PredicateGenerator, SqlFragment};
pub use non_empty::NativeNonEmpty;

use crate::context::Evaluator;
use crate::error::OlapResult;
use crate::expr::Expr;
use crate::schema::{AggregateTable, CalcMember, HierarchyId, LevelId, MemberId, MemberKind, Schema};
use crate::sql::{Column, Dialect, Predicate, SqlQuery};
use crate::tuple::{Tuple, TupleList};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A native implementation of one set function.
pub trait NativeSetGate: Send + Sync + fmt::Debug {
    /// Return a native evaluator for `function(args)` in the evaluator's current context, or
    /// `None` when the call must be interpreted. The context is unchanged on return.
    fn create_evaluator(
        &self,
        ev: &mut Evaluator,
        function: &str,
        args: &[Expr],
    ) -> Option<NativeSetEvaluator>;
}

/// The native gates consulted by set functions, in order.
#[derive(Debug)]
pub struct NativeRegistry {
    gates: Vec<Box<dyn NativeSetGate>>,
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::new(vec![Box::new(NativeNonEmpty), Box::new(NativeExcept)])
    }
}

impl NativeRegistry {
    pub fn new(gates: Vec<Box<dyn NativeSetGate>>) -> Self {
        Self { gates }
    }

    pub fn native_set_evaluator(
        &self,
        ev: &mut Evaluator,
        function: &str,
        args: &[Expr],
    ) -> Option<NativeSetEvaluator> {
        self.gates
            .iter()
            .find_map(|gate| gate.create_evaluator(ev, function, args))
    }
}

/// A compiled native query. Nothing runs until [`NativeSetEvaluator::execute`].
#[derive(Clone, Debug)]
pub struct NativeSetEvaluator {
    args: Vec<CrossJoinArg>,
    constraint: Constraint,
}

impl NativeSetEvaluator {
    pub fn new(args: Vec<CrossJoinArg>, constraint: Constraint) -> Self {
        Self { args, constraint }
    }

    pub fn args(&self) -> &[CrossJoinArg] {
        &self.args
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Build the SQL statement, reading an aggregate table when one covers the query.
    pub fn build_query(&self, schema: &Schema, dialect: Dialect) -> OlapResult<SqlQuery> {
        let plain = self.query_for(schema, dialect, None)?;
        if !self.constraint.is_join_required() {
            return Ok(plain);
        }

        let hierarchies: Vec<HierarchyId> = schema
            .hierarchies()
            .iter()
            .filter(|h| h.binding().is_some_and(|b| plain.has_from(b.table())))
            .map(|h| h.id())
            .collect();
        let measures: Vec<_> = plain
            .having()
            .iter()
            .flat_map(Predicate::aggregates)
            .filter_map(|e| schema.member(e.measure).stored_measure())
            .collect();

        match schema
            .aggregate_tables()
            .iter()
            .find(|agg| agg.covers(&hierarchies, &measures))
        {
            Some(agg) => {
                log::debug!("native query reads aggregate table {}", agg.name());
                self.query_for(schema, dialect, Some(agg))
            }
            None => Ok(plain),
        }
    }

    fn query_for(
        &self,
        schema: &Schema,
        dialect: Dialect,
        aggregate: Option<&AggregateTable>,
    ) -> OlapResult<SqlQuery> {
        let mut query = SqlQuery::new(dialect);
        for arg in &self.args {
            arg.add_key_columns(&mut query, schema);
        }
        self.constraint.add_constraint(&mut query, schema, aggregate)?;
        Ok(query)
    }

    /// Run the query (or reuse a cached result) and return the visible tuples in the same
    /// order interpreted evaluation produces.
    pub fn execute(&self, ev: &Evaluator) -> OlapResult<TupleList> {
        let session = Arc::clone(ev.session());
        let schema = session.schema();
        let key = self.constraint.cache_key();

        let rows = match session.cache().get(&key) {
            Some(hit) => {
                log::trace!("native cache hit");
                hit
            }
            None => {
                let query = self.build_query(schema, session.settings().dialect)?;
                log::debug!("native sql: {}", query.to_sql());
                let rows = session.executor().execute(&query)?;
                let list = Arc::new(self.rows_to_tuples(ev, schema, rows)?);
                session.cache().insert(key, Arc::clone(&list));
                list
            }
        };

        let mut visible = rows.as_ref().clone();
        if ev.role().is_some() {
            visible.retain(|tuple| tuple.iter().all(|&m| ev.is_visible(m)));
        }
        Ok(visible)
    }

    fn rows_to_tuples(
        &self,
        ev: &Evaluator,
        schema: &Schema,
        rows: Vec<Vec<Value>>,
    ) -> OlapResult<TupleList> {
        let widths: Vec<(LevelId, usize)> = self
            .args
            .iter()
            .map(|a| (a.level(), schema.key_columns(a.level()).len()))
            .collect();

        let mut tuples: Vec<(Vec<usize>, Tuple)> = Vec::with_capacity(rows.len());
        'rows: for (i, row) in rows.iter().enumerate() {
            ev.check_cancel(i)?;
            let mut offset = 0;
            let mut tuple = Tuple::new();
            for &(level, width) in &widths {
                let Some(path) = row.get(offset..offset + width) else {
                    log::warn!("native row has {} columns, expected more", row.len());
                    continue 'rows;
                };
                offset += width;
                let member = if width == 0 {
                    schema.level(level).members().first().copied()
                } else {
                    schema.member_by_key_path(level, path)
                };
                let Some(member) = member else {
                    log::warn!("native row {path:?} matches no member");
                    continue 'rows;
                };
                tuple.push(member);
            }
            let ranks = self
                .args
                .iter()
                .zip(&tuple)
                .map(|(arg, &m)| arg.rank(schema, m))
                .collect();
            tuples.push((ranks, tuple));
        }
        tuples.sort_by(|(a, _), (b, _)| a.cmp(b));
        tuples.dedup_by(|(_, a), (_, b)| a == b);

        let mut list = TupleList::with_capacity(self.args.len(), tuples.len());
        for (_, tuple) in &tuples {
            list.push(tuple)?;
        }
        Ok(list)
    }
}

/// Qualified key columns of `level`, outermost level first.
pub(crate) fn key_columns(schema: &Schema, level: LevelId) -> Vec<Column> {
    let hierarchy = schema.hierarchy(schema.level(level).hierarchy());
    let Some(binding) = hierarchy.binding() else {
        return Vec::new();
    };
    schema
        .key_columns(level)
        .into_iter()
        .map(|c| Column::new(binding.table(), c))
        .collect()
}

/// Predicate matching rows that belong to any of `members`. Aggregate calculated members
/// expand to their components; an All member matches everything.
pub(crate) fn membership_predicate(schema: &Schema, members: &[MemberId]) -> Predicate {
    let mut by_level: Vec<(LevelId, Vec<Vec<Value>>)> = Vec::new();
    let mut slots: HashMap<LevelId, usize> = HashMap::new();
    // Stack in reverse so members are visited in list order.
    let mut pending: Vec<MemberId> = members.iter().rev().copied().collect();
    while let Some(m) = pending.pop() {
        let member = schema.member(m);
        match member.kind() {
            MemberKind::All => return Predicate::True,
            MemberKind::Calculated(CalcMember::Aggregate(parts)) => {
                pending.extend(parts.iter().rev())
            }
            MemberKind::Regular => {
                let slot = *slots.entry(member.level()).or_insert_with(|| {
                    by_level.push((member.level(), Vec::new()));
                    by_level.len() - 1
                });
                by_level[slot].1.push(member.key_path().to_vec());
            }
            _ => {}
        }
    }

    let parts: Vec<Predicate> = by_level
        .into_iter()
        .map(|(level, rows)| Predicate::In {
            columns: key_columns(schema, level),
            rows,
        })
        .collect();
    Predicate::or(parts)
}

/// A context is valid for native evaluation when the query slicer holds no calculated members.
pub(crate) fn is_valid_context(ev: &Evaluator) -> bool {
    let schema = ev.schema();
    !ev.slicer()
        .iter()
        .any(|&m| schema.member(m).is_calculated())
}

/// Whether a current context member is calculated in a way SQL cannot express.
pub(crate) fn contains_inexpressible_member(ev: &Evaluator) -> bool {
    let schema = ev.schema();
    ev.non_all_members()
        .iter()
        .any(|&m| schema.member(m).is_inexpressible())
}

/// Whether the context holds a non-All member on a hierarchy a restriction arg enumerates.
///
/// The restriction replaces that member in SQL, so an outer emptiness test cannot see it.
pub(crate) fn context_pins_restriction(ev: &Evaluator, restriction: &[CrossJoinArg]) -> bool {
    let schema = ev.schema();
    restriction.iter().any(|arg| {
        let current = ev.current_member(arg.hierarchy(schema));
        !schema.member(current).is_all()
    })
}

/// Whether a restriction arg lists a member the session's role hides.
pub(crate) fn restriction_hides_member(ev: &Evaluator, restriction: &[CrossJoinArg]) -> bool {
    restriction
        .iter()
        .filter_map(CrossJoinArg::members)
        .flatten()
        .any(|&m| !ev.is_visible(m))
}

/// Reset the hierarchies a native query enumerates, and pin the measure it tests.
pub(crate) fn override_context(
    ev: &mut Evaluator,
    hierarchies: &[HierarchyId],
    stored_measure: Option<MemberId>,
) {
    for &h in hierarchies {
        let neutral = {
            let hierarchy = ev.schema().hierarchy(h);
            hierarchy.all_member().unwrap_or(hierarchy.default_member())
        };
        ev.set_context(neutral);
    }
    if let Some(measure) = stored_measure {
        ev.set_context(measure);
    }
}

pub(crate) fn reset_to_defaults(ev: &mut Evaluator) {
    let defaults: Vec<MemberId> = ev
        .schema()
        .hierarchies()
        .iter()
        .map(|h| h.default_member())
        .collect();
    ev.set_context_tuple(&defaults);
}
