use super::member::{HierarchyId, MeasureId, MemberId};
use crate::value::Value;
use ordered_float::OrderedFloat;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Aggregator {
    Sum,
    Count,
    Min,
    Max,
    DistinctCount,
}

impl Aggregator {
    /// Aggregator used to combine partial results of this aggregator, e.g. when reading
    /// pre-summarized rows of an aggregate table.
    pub fn rollup(self) -> Option<Aggregator> {
        match self {
            Aggregator::Sum | Aggregator::Count => Some(Aggregator::Sum),
            Aggregator::Min => Some(Aggregator::Min),
            Aggregator::Max => Some(Aggregator::Max),
            Aggregator::DistinctCount => None,
        }
    }

    /// Wrap a SQL operand in this aggregator's function call.
    pub fn sql_expression(self, operand: &str) -> String {
        match self {
            Aggregator::Sum => format!("sum({operand})"),
            Aggregator::Count => format!("count({operand})"),
            Aggregator::Min => format!("min({operand})"),
            Aggregator::Max => format!("max({operand})"),
            Aggregator::DistinctCount => format!("count(distinct {operand})"),
        }
    }

    /// Aggregate the operand values of one group of rows.
    ///
    /// `None` operands stand for `count(*)` rows. An empty group aggregates to NULL for every
    /// aggregator, matching the absence of a SQL group.
    pub fn aggregate<'a>(self, operands: impl IntoIterator<Item = Option<&'a Value>>) -> Value {
        let mut rows = 0usize;
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut saw_number = false;
        let mut best: Option<&Value> = None;
        let mut distinct: HashSet<&Value> = HashSet::new();

        for operand in operands {
            rows += 1;
            let Some(value) = operand else {
                count += 1;
                continue;
            };
            if value.is_null() {
                continue;
            }
            count += 1;
            match self {
                Aggregator::Sum => {
                    if let Some(n) = value.as_f64() {
                        sum += n;
                        saw_number = true;
                    }
                }
                Aggregator::Min => {
                    if best.map_or(true, |b| value.cmp_nulls_last(b).is_lt()) {
                        best = Some(value);
                    }
                }
                Aggregator::Max => {
                    if best.map_or(true, |b| value.cmp_nulls_last(b).is_gt()) {
                        best = Some(value);
                    }
                }
                Aggregator::DistinctCount => {
                    distinct.insert(value);
                }
                Aggregator::Count => {}
            }
        }

        if rows == 0 {
            return Value::Null;
        }
        match self {
            Aggregator::Sum if saw_number => Value::Number(OrderedFloat(sum)),
            Aggregator::Sum => Value::Null,
            Aggregator::Count => Value::from(count as f64),
            Aggregator::DistinctCount => Value::from(distinct.len() as f64),
            Aggregator::Min | Aggregator::Max => best.cloned().unwrap_or(Value::Null),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Measure {
    pub(crate) id: MeasureId,
    pub(crate) name: String,
    pub(crate) member: MemberId,
    /// Fact column; `None` means `count(*)`.
    pub(crate) column: Option<String>,
    pub(crate) aggregator: Aggregator,
}

impl Measure {
    pub fn id(&self) -> MeasureId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self) -> MemberId {
        self.member
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn aggregator(&self) -> Aggregator {
        self.aggregator
    }
}

/// Column of an aggregate table holding a pre-summarized measure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateColumn {
    pub column: String,
    /// Aggregator that produced the stored values.
    pub aggregator: Aggregator,
}

/// A pre-summarized copy of the fact table that drops some dimensions.
///
/// The table keeps the foreign-key columns of the hierarchies it retains, under the same
/// names as the fact table, so dimension joins are identical.
#[derive(Clone, Debug)]
pub struct AggregateTable {
    pub(crate) name: String,
    pub(crate) hierarchies: Vec<HierarchyId>,
    pub(crate) measures: HashMap<MeasureId, AggregateColumn>,
}

impl AggregateTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hierarchies(&self) -> &[HierarchyId] {
        &self.hierarchies
    }

    pub fn measure_column(&self, measure: MeasureId) -> Option<&AggregateColumn> {
        self.measures.get(&measure)
    }

    /// Whether the table can answer a query touching `hierarchies` and aggregating `measures`.
    pub fn covers(&self, hierarchies: &[HierarchyId], measures: &[MeasureId]) -> bool {
        hierarchies.iter().all(|h| self.hierarchies.contains(h))
            && measures.iter().all(|m| {
                self.measures
                    .get(m)
                    .is_some_and(|col| col.aggregator.rollup().is_some())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_groups_aggregate_to_null() {
        for agg in [
            Aggregator::Sum,
            Aggregator::Count,
            Aggregator::Min,
            Aggregator::Max,
            Aggregator::DistinctCount,
        ] {
            assert_eq!(agg.aggregate(std::iter::empty()), Value::Null, "{agg:?}");
        }
    }

    #[test]
    fn sum_of_only_nulls_is_null_but_count_is_zero() {
        let nulls = [Value::Null, Value::Null];
        assert_eq!(Aggregator::Sum.aggregate(nulls.iter().map(Some)), Value::Null);
        assert_eq!(
            Aggregator::Count.aggregate(nulls.iter().map(Some)),
            Value::from(0)
        );
    }

    #[test]
    fn count_star_counts_rows() {
        assert_eq!(
            Aggregator::Count.aggregate([None, None, None]),
            Value::from(3)
        );
    }

    #[test]
    fn rollup_turns_counts_into_sums() {
        assert_eq!(Aggregator::Count.rollup(), Some(Aggregator::Sum));
        assert_eq!(Aggregator::DistinctCount.rollup(), None);
        assert_eq!(Aggregator::Sum.sql_expression("x"), "sum(x)");
        assert_eq!(
            Aggregator::DistinctCount.sql_expression("x"),
            "count(distinct x)"
        );
    }
}
