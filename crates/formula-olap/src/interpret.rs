//! In-memory set evaluation. These are the reference semantics the native gates must match.

use crate::calc::SetValue;
use crate::context::Evaluator;
use crate::error::OlapResult;
use crate::schema::MemberId;
use crate::tuple::{write_tuple, TupleList};
use ahash::AHashSet;

/// Keep the tuples of `list` that have data.
///
/// With no `members` a tuple has data when the cell at the tuple is neither null nor an
/// error. Otherwise each member is bound in turn and the tuple is kept when any of them
/// yields data.
pub fn filter_non_empty(
    ev: &mut Evaluator,
    list: TupleList,
    members: &[MemberId],
) -> OlapResult<TupleList> {
    if list.is_empty() {
        return Ok(list);
    }
    let mut kept = TupleList::with_capacity(list.arity(), list.len() / 2);
    let mut guard = ev.scoped();
    let mut cursor = list.cursor();
    let mut iteration = 0;
    while let Some(tuple) = cursor.forward() {
        guard.check_cancel(iteration)?;
        iteration += 1;
        guard.set_context_tuple(tuple);
        let has_data = if members.is_empty() {
            guard.evaluate_current().has_data()
        } else {
            members.iter().any(|&m| {
                guard.set_context(m);
                guard.evaluate_current().has_data()
            })
        };
        if has_data {
            kept.push(tuple)?;
        }
    }
    Ok(kept)
}

/// Number of tuples in `set`; with `count_empty == false`, of tuples that have data.
///
/// Counting runs with the non-empty flag cleared.
pub fn count(ev: &mut Evaluator, set: SetValue, count_empty: bool) -> OlapResult<usize> {
    let mut guard = ev.scoped();
    guard.set_non_empty(false);
    match (set, count_empty) {
        (SetValue::List(list), true) => Ok(list.len()),
        (SetValue::Iterable(lazy), true) => {
            let mut n = 0;
            for _ in lazy.iter() {
                guard.check_cancel(n)?;
                n += 1;
            }
            Ok(n)
        }
        (set, false) => Ok(filter_non_empty(&mut guard, set.into_list(), &[])?.len()),
    }
}

/// Tuples of `left` that do not occur in `right`, in `left`'s order.
///
/// Under a non-empty context the result is also filtered by the context measure.
pub fn except(ev: &mut Evaluator, left: TupleList, right: &TupleList) -> OlapResult<TupleList> {
    let excluded: AHashSet<&[MemberId]> = right.iter().collect();
    let mut out = TupleList::with_capacity(left.arity(), left.len());
    for (i, tuple) in left.iter().enumerate() {
        ev.check_cancel(i)?;
        if !excluded.contains(tuple) {
            out.push(tuple)?;
        }
    }
    if ev.is_non_empty() {
        return filter_non_empty(ev, out, &[]);
    }
    Ok(out)
}

/// `{a, b}` for one-member tuples, `{(a, b), (c, d)}` otherwise.
pub fn set_to_str(ev: &Evaluator, set: &SetValue) -> OlapResult<String> {
    let schema = ev.schema();
    let mut out = String::from("{");
    set.try_for_each(|i, tuple| {
        ev.check_cancel(i)?;
        if i > 0 {
            out.push_str(", ");
        }
        write_tuple(&mut out, schema, tuple)?;
        Ok(())
    })?;
    out.push('}');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Aggregator, DimensionDef, LevelType, SchemaBuilder};
    use crate::session::Session;
    use crate::table::Table;
    use crate::value::Value;
    use std::sync::Arc;

    fn session() -> Arc<Session> {
        let mut month = Table::new("month", vec!["month_id", "name"]);
        for (id, name) in [(1, "Jan"), (2, "Feb"), (3, "Mar")] {
            month.push_row(vec![id.into(), name.into()]).unwrap();
        }
        let mut fact = Table::new("fact", vec!["month_id", "sales", "cost"]);
        fact.push_row(vec![1.into(), 5.into(), Value::Null]).unwrap();
        fact.push_row(vec![3.into(), Value::Null, 2.into()]).unwrap();

        let mut builder = SchemaBuilder::new("Sales");
        builder.add_table(month).unwrap();
        builder.add_table(fact).unwrap();
        builder.fact_table("fact");
        builder
            .add_dimension(
                DimensionDef::new("Month", "month", "month_id", "month_id")
                    .level("Month", "name", LevelType::TimeMonths),
            )
            .unwrap();
        builder
            .add_measure("Sales", Some("sales"), Aggregator::Sum)
            .unwrap();
        builder
            .add_measure("Cost", Some("cost"), Aggregator::Sum)
            .unwrap();
        Session::new(Arc::new(builder.build().unwrap()))
    }

    fn months(ev: &Evaluator) -> TupleList {
        let level = ev.schema().level_by_name("Month", "Month").unwrap();
        TupleList::from_members(ev.schema().level_members(level, None))
    }

    #[test]
    fn empty_input_is_returned_as_is() {
        let session = session();
        let mut ev = session.evaluator();
        let out = filter_non_empty(&mut ev, TupleList::new(2), &[]).unwrap();
        assert_eq!(out.arity(), 2);
        assert!(out.is_empty());
    }

    #[test]
    fn filter_uses_context_measure_and_restores_context() {
        let session = session();
        let mut ev = session.evaluator();
        let before = ev.snapshot();
        let list = months(&ev);
        let kept = filter_non_empty(&mut ev, list, &[]).unwrap();
        assert_eq!(
            kept.display(ev.schema()).to_string(),
            "{[Month].[Jan]}"
        );
        assert_eq!(ev.snapshot(), before);
    }

    #[test]
    fn filter_keeps_tuple_when_any_measure_has_data() {
        let session = session();
        let mut ev = session.evaluator();
        let sales = ev.schema().measure_by_name("Sales").unwrap();
        let cost = ev.schema().measure_by_name("Cost").unwrap();
        let list = months(&ev);
        let kept = filter_non_empty(&mut ev, list, &[sales, cost]).unwrap();
        assert_eq!(
            kept.display(ev.schema()).to_string(),
            "{[Month].[Jan], [Month].[Mar]}"
        );
    }

    #[test]
    fn count_ignores_ambient_non_empty_flag() {
        let session = session();
        let mut ev = session.evaluator();
        ev.set_non_empty(true);
        let list = months(&ev);
        assert_eq!(count(&mut ev, SetValue::List(list.clone()), true).unwrap(), 3);
        assert_eq!(count(&mut ev, SetValue::List(list), false).unwrap(), 1);
        assert!(ev.is_non_empty());
    }

    #[test]
    fn except_under_non_empty_context_drops_empty_tuples() {
        let session = session();
        let mut ev = session.evaluator();
        let all = months(&ev);
        let feb = ev.schema().member_by_name("[Month].[Feb]").unwrap();
        let feb = TupleList::from_members(vec![feb]);

        let plain = except(&mut ev, all.clone(), &feb).unwrap();
        assert_eq!(plain.len(), 2);

        ev.set_non_empty(true);
        let non_empty = except(&mut ev, all, &feb).unwrap();
        assert_eq!(
            non_empty.display(ev.schema()).to_string(),
            "{[Month].[Jan]}"
        );
    }
}
