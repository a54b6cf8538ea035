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

/// Native `Except(set, members)`: the set's level with a NULL-safe `not in` on the excluded
/// keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeExcept;

impl NativeSetGate for NativeExcept {
    fn create_evaluator(
        &self,
        ev: &mut Evaluator,
        function: &str,
        args: &[Expr],
    ) -> Option<NativeSetEvaluator> {
        let settings = ev.settings().clone();
        if !settings.enable_native_except {
            return None;
        }
        if !is_valid_context(ev) {
            return None;
        }
        if !function.eq_ignore_ascii_case("Except") {
            return None;
        }
        if args.len() != 2 {
            return None;
        }

        let schema = Arc::clone(ev.session().schema());
        let measure = ev.current_measure();
        let all_args = CrossJoinArgFactory::new(&schema, measure).check_cross_join_arg(&args[0])?;
        let cj_args = all_args.first().filter(|a| a.len() == 1)?;
        if is_prefer_interpreter(cj_args, &settings) {
            return None;
        }
        // The All level has no key column to exclude on.
        if cj_args.iter().any(|a| schema.level(a.level()).is_all()) {
            return None;
        }

        // The constraint regenerates this fragment over every arg, restriction args included.
        let combined: Vec<CrossJoinArg> = all_args.concat();
        let fragment = PredicateGenerator::new(&schema, &combined, measure, settings.dialect)
            .generate_filter_condition(Some(&args[1]), FilterIntent::Exclude)?;

        if contains_inexpressible_member(ev) {
            return None;
        }
        if ev.is_non_empty() && schema.member(measure).stored_measure().is_none() {
            return None;
        }
        if let Some(restriction) = all_args.get(1) {
            if (ev.is_non_empty() && context_pins_restriction(ev, restriction))
                || restriction_hides_member(ev, restriction)
            {
                return None;
            }
        }

        log::debug!("using native Except()");

        // Under a non-empty context the context measure decides emptiness and must stay.
        let stored_measure = if ev.is_non_empty() {
            Some(measure)
        } else {
            fragment
                .stored_measure
                .or_else(|| cj_args.iter().find_map(CrossJoinArg::measure))
        };
        let hierarchies: Vec<HierarchyId> =
            combined.iter().map(|a| a.hierarchy(&schema)).collect();

        let mut guard = ev.scoped();
        override_context(&mut guard, &hierarchies, stored_measure);
        if !guard.is_non_empty() && stored_measure.is_none() {
            reset_to_defaults(&mut guard);
        }
        let constraint = Constraint::new(
            &schema,
            combined,
            guard.snapshot(),
            Refinement::Except {
                filter: args[1].clone(),
            },
        );
        Some(NativeSetEvaluator::new(cj_args.clone(), constraint))
    }
}
