//! Cell evaluation: the value of the current measure at a full coordinate.

use crate::schema::{CalcMember, DimensionBinding, Formula, MeasureId, MemberId, MemberKind, Schema};
use crate::value::{CellError, Value};
use ordered_float::OrderedFloat;
use std::fmt;

/// Computes cell values. `coordinates` holds one member per hierarchy, indexed by hierarchy
/// id; the measures hierarchy slot names the measure to evaluate.
pub trait CellReader: Send + Sync + fmt::Debug {
    fn evaluate(&self, schema: &Schema, coordinates: &[MemberId]) -> Value;
}

/// Evaluates cells by scanning the fact table.
#[derive(Clone, Copy, Debug, Default)]
pub struct FactCellReader;

const MAX_FORMULA_DEPTH: usize = 32;

impl CellReader for FactCellReader {
    fn evaluate(&self, schema: &Schema, coordinates: &[MemberId]) -> Value {
        let Some(&measure) = coordinates.get(schema.measures_hierarchy().idx()) else {
            return Value::Null;
        };
        evaluate_measure(schema, coordinates, measure, 0)
    }
}

fn evaluate_measure(
    schema: &Schema,
    coordinates: &[MemberId],
    measure: MemberId,
    depth: usize,
) -> Value {
    if depth > MAX_FORMULA_DEPTH {
        return Value::Error(CellError::NotComputable);
    }
    match &schema.member(measure).kind {
        MemberKind::StoredMeasure(id) => aggregate_fact(schema, coordinates, *id),
        MemberKind::CalculatedMeasure(formula) => {
            evaluate_formula(schema, coordinates, formula, depth + 1)
        }
        _ => Value::Null,
    }
}

fn evaluate_formula(
    schema: &Schema,
    coordinates: &[MemberId],
    formula: &Formula,
    depth: usize,
) -> Value {
    let binary = |l: &Formula, r: &Formula, op: fn(f64, f64) -> Value| {
        let left = evaluate_formula(schema, coordinates, l, depth);
        let right = evaluate_formula(schema, coordinates, r, depth);
        if left.is_error() {
            return left;
        }
        if right.is_error() {
            return right;
        }
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => op(a, b),
            _ => Value::Null,
        }
    };
    match formula {
        Formula::Measure(name) => match schema.measure_by_name(name) {
            Some(member) => evaluate_measure(schema, coordinates, member, depth),
            None => Value::Error(CellError::Unresolved),
        },
        Formula::Number(n) => Value::Number(OrderedFloat(*n)),
        Formula::Add(l, r) => binary(l, r, |a, b| Value::from(a + b)),
        Formula::Subtract(l, r) => binary(l, r, |a, b| Value::from(a - b)),
        Formula::Multiply(l, r) => binary(l, r, |a, b| Value::from(a * b)),
        Formula::Divide(l, r) => binary(l, r, |a, b| {
            if b == 0.0 {
                Value::Error(CellError::DivZero)
            } else {
                Value::from(a / b)
            }
        }),
    }
}

struct Slice<'a> {
    fk_idx: usize,
    binding: &'a DimensionBinding,
    paths: Vec<&'a [Value]>,
}

fn aggregate_fact(schema: &Schema, coordinates: &[MemberId], measure: MeasureId) -> Value {
    let Some(fact) = schema.table(schema.fact_table()) else {
        return Value::Null;
    };

    let mut slices = Vec::new();
    for hierarchy in schema.hierarchies() {
        let Some(binding) = hierarchy.binding() else {
            continue;
        };
        let Some(&member) = coordinates.get(hierarchy.id().idx()) else {
            continue;
        };
        let paths: Vec<&[Value]> = match &schema.member(member).kind {
            MemberKind::All => continue,
            MemberKind::Regular => vec![schema.member(member).key_path()],
            MemberKind::Calculated(CalcMember::Aggregate(members)) => {
                if members.iter().any(|&m| schema.member(m).is_all()) {
                    continue;
                }
                members.iter().map(|&m| schema.member(m).key_path()).collect()
            }
            MemberKind::Calculated(CalcMember::Opaque) => {
                return Value::Error(CellError::NotComputable)
            }
            MemberKind::StoredMeasure(_) | MemberKind::CalculatedMeasure(_) => continue,
        };
        let Some(fk_idx) = fact.column_idx(binding.foreign_key()) else {
            return Value::Null;
        };
        slices.push(Slice {
            fk_idx,
            binding,
            paths,
        });
    }

    let measure = schema.measure(measure);
    let operand = measure.column().and_then(|c| fact.column_idx(c));
    let in_slice = |row: &[Value]| {
        slices.iter().all(|s| {
            s.binding
                .path_for_key(&row[s.fk_idx])
                .is_some_and(|path| s.paths.iter().any(|p| path.starts_with(p)))
        })
    };

    measure.aggregator().aggregate(
        fact.rows()
            .iter()
            .filter(|row| in_slice(row.as_slice()))
            .map(|row| operand.map(|c| &row[c])),
    )
}
