use super::{
    contains_inexpressible_member, context_pins_restriction, is_prefer_interpreter,
    is_valid_context, override_context, reset_to_defaults, restriction_hides_member, Constraint,
    CrossJoinArg, CrossJoinArgFactory, FilterIntent, NativeSetEvaluator, NativeSetGate,
    PredicateGenerator, Refinement,
};
use crate::context::Evaluator;
use crate::expr::Expr;
use crate::schema::HierarchyId;
use std::sync::Arc;

/// Native `NonEmpty(set [, filter])`: the cross join of the set's levels restricted with
/// `HAVING NOT((agg(measure) is null))`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeNonEmpty;

impl NativeSetGate for NativeNonEmpty {
    fn create_evaluator(
        &self,
        ev: &mut Evaluator,
        function: &str,
        args: &[Expr],
    ) -> Option<NativeSetEvaluator> {
        let settings = ev.settings().clone();
        if !settings.enable_native_non_empty {
            return None;
        }
        if !is_valid_context(ev) {
            return None;
        }
        if !function.eq_ignore_ascii_case("NonEmpty") {
            return None;
        }
        if args.is_empty() || args.len() > 2 {
            return None;
        }

        let schema = Arc::clone(ev.session().schema());
        let measure = ev.current_measure();
        let all_args = CrossJoinArgFactory::new(&schema, measure).check_cross_join_arg(&args[0])?;
        let cj_args = all_args.first().filter(|a| !a.is_empty())?;
        if is_prefer_interpreter(cj_args, &settings) {
            return None;
        }
        if settings.non_empty_excludes_all_level && schema.level(cj_args[0].level()).is_all() {
            return None;
        }

        // The constraint regenerates this fragment over every arg, restriction args included.
        let combined: Vec<CrossJoinArg> = all_args.concat();
        let fragment = PredicateGenerator::new(&schema, &combined, measure, settings.dialect)
            .generate_filter_condition(args.get(1), FilterIntent::NonEmpty)?;

        if contains_inexpressible_member(ev) {
            return None;
        }
        if let Some(restriction) = all_args.get(1) {
            if context_pins_restriction(ev, restriction)
                || restriction_hides_member(ev, restriction)
            {
                return None;
            }
        }
        if args.get(1).is_some_and(|filter| names_hidden_member(ev, filter)) {
            return None;
        }

        log::debug!("using native NonEmpty()");

        let mut hierarchies: Vec<HierarchyId> =
            combined.iter().map(|a| a.hierarchy(&schema)).collect();
        hierarchies.extend_from_slice(&fragment.hierarchies);

        let mut guard = ev.scoped();
        override_context(&mut guard, &hierarchies, fragment.stored_measure);
        if !guard.is_non_empty() && fragment.stored_measure.is_none() {
            reset_to_defaults(&mut guard);
        }
        let constraint = Constraint::new(
            &schema,
            combined,
            guard.snapshot(),
            Refinement::NonEmpty {
                filter: args.get(1).cloned(),
            },
        );
        Some(NativeSetEvaluator::new(cj_args.clone(), constraint))
    }
}

/// Whether `filter` lists a member the session's role hides; set evaluation drops those.
fn names_hidden_member(ev: &Evaluator, filter: &Expr) -> bool {
    match filter {
        Expr::Member(m) => !ev.is_visible(*m),
        Expr::Children(parent) => ev
            .schema()
            .children(*parent)
            .iter()
            .any(|&m| !ev.is_visible(m)),
        Expr::Set(items) => items.iter().any(|item| names_hidden_member(ev, item)),
        _ => false,
    }
}
