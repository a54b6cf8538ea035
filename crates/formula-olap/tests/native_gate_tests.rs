mod common;

use formula_olap::{
    Constraint, CrossJoinArg, CrossJoinArgFactory, Dialect, Expr, MemoryExecutor, NativeExcept,
    NativeNonEmpty, NativeRegistry, NativeSetEvaluator, NativeSetGate, NativeSettings, OlapError,
    Refinement, Session,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

use common::{foodmart, level, level_members, measure, member, members, names};

#[test]
fn factory_recognizes_levels_lists_and_children() {
    let schema = foodmart();
    let unit_sales = measure(&schema, "Unit Sales");
    let factory = CrossJoinArgFactory::new(&schema, unit_sales);
    let state = level(&schema, "Store", "State");

    assert_eq!(
        factory.check_cross_join_arg(&Expr::LevelMembers(state)),
        Some(vec![vec![CrossJoinArg::Members {
            level: state,
            members: None,
        }]])
    );

    let usa = member(&schema, "[Store].[USA]");
    let children = factory.check_cross_join_arg(&Expr::Children(usa)).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0][0].level(), state);
    assert_eq!(children[0][0].members().map(<[_]>::len), Some(3));

    let nested = Expr::call(
        "NonEmpty",
        vec![level_members(&schema, "Store", "Country")],
    );
    let args = factory.check_cross_join_arg(&nested).unwrap();
    assert!(args[0][0].is_non_empty());
    assert_eq!(args[0][0].measure(), Some(unit_sales));
}

#[test]
fn factory_splits_output_and_restriction_args() {
    let schema = foodmart();
    let factory = CrossJoinArgFactory::new(&schema, measure(&schema, "Unit Sales"));
    let expr = Expr::call(
        "NonEmpty",
        vec![
            level_members(&schema, "Product", "Family"),
            members(&schema, &["[Store].[USA].[OR]", "[Store].[Mexico].[DF]"]),
        ],
    );
    let args = factory.check_cross_join_arg(&expr).unwrap();
    assert_eq!(args.len(), 2);
    assert_eq!(args[0][0].level(), level(&schema, "Product", "Family"));
    assert_eq!(args[1][0].level(), level(&schema, "Store", "State"));
}

#[test]
fn factory_rejects_shapes_sql_cannot_enumerate() {
    let schema = foodmart();
    let factory = CrossJoinArgFactory::new(&schema, measure(&schema, "Unit Sales"));
    let rejected = [
        // Mixed levels.
        members(&schema, &["[Store].[USA]", "[Store].[USA].[CA]"]),
        // Duplicates.
        members(&schema, &["[Store].[USA].[CA]", "[Store].[USA].[CA]"]),
        // Calculated member.
        members(&schema, &["[Store].[West Coast]"]),
        // Both sides on one hierarchy.
        Expr::call(
            "CrossJoin",
            vec![
                level_members(&schema, "Store", "Country"),
                level_members(&schema, "Store", "State"),
            ],
        ),
        Expr::call(
            "NonEmpty",
            vec![Expr::call(
                "NonEmpty",
                vec![level_members(&schema, "Store", "State")],
            )],
        ),
        Expr::call("Except", vec![level_members(&schema, "Store", "State")]),
    ];
    for expr in rejected {
        assert_eq!(
            factory.check_cross_join_arg(&expr),
            None,
            "{}",
            expr.to_mdx(&schema)
        );
    }
}

#[test]
fn short_enumerations_prefer_the_interpreter() {
    let schema = foodmart();
    let single = Expr::call("NonEmpty", vec![members(&schema, &["[Store].[USA].[CA]"])]);

    for (min_enumerated_members, expected_queries) in [(2, 0), (1, 1)] {
        let executor = Arc::new(MemoryExecutor::new(Arc::clone(&schema)));
        let session = Session::builder(Arc::clone(&schema))
            .settings(NativeSettings {
                min_enumerated_members,
                ..NativeSettings::default()
            })
            .executor(executor.clone())
            .build();
        let mut ev = session.evaluator();
        let list = ev.evaluate_set(&single).unwrap();
        assert_eq!(names(&schema, &list), vec!["[Store].[USA].[CA]"]);
        assert_eq!(executor.executed().len(), expected_queries);
    }
}

#[test]
fn gates_leave_the_context_unchanged() {
    let schema = foodmart();
    let session = Session::new(Arc::clone(&schema));
    let mut ev = session.evaluator();
    ev.set_context(member(&schema, "[Time].[1997].[Q2]"));
    ev.set_non_empty(true);
    let before = ev.snapshot();

    let non_empty = NativeNonEmpty.create_evaluator(
        &mut ev,
        "NonEmpty",
        &[level_members(&schema, "Store", "State")],
    );
    assert!(non_empty.is_some());
    assert_eq!(ev.snapshot(), before);

    let except = NativeExcept.create_evaluator(
        &mut ev,
        "except",
        &[
            level_members(&schema, "Store", "State"),
            members(&schema, &["[Store].[USA].[CA]"]),
        ],
    );
    assert!(except.is_some());
    assert_eq!(ev.snapshot(), before);

    // Wrong function name.
    assert!(NativeExcept
        .create_evaluator(&mut ev, "NonEmpty", &[level_members(&schema, "Store", "State")])
        .is_none());
}

#[test]
fn cache_keys_follow_args_context_and_refinement() {
    let schema = foodmart();
    let session = Session::new(Arc::clone(&schema));
    let mut ev = session.evaluator();
    let states = [level_members(&schema, "Store", "State")];
    let key = |ev: &mut formula_olap::Evaluator, gate: &dyn NativeSetGate, name: &str, args: &[Expr]| {
        gate.create_evaluator(ev, name, args)
            .unwrap()
            .constraint()
            .cache_key()
    };

    let first = key(&mut ev, &NativeNonEmpty, "NonEmpty", &states);
    assert_eq!(key(&mut ev, &NativeNonEmpty, "NonEmpty", &states), first);

    ev.set_context(member(&schema, "[Time].[1997].[Q3]"));
    let sliced = key(&mut ev, &NativeNonEmpty, "NonEmpty", &states);
    assert_ne!(sliced, first);

    let except = key(
        &mut ev,
        &NativeExcept,
        "Except",
        &[states[0].clone(), members(&schema, &["[Store].[USA].[CA]"])],
    );
    assert_ne!(except, sliced);
}

#[test]
fn registry_without_except_interprets_it() {
    let schema = foodmart();
    let executor = Arc::new(MemoryExecutor::new(Arc::clone(&schema)));
    let session = Session::builder(Arc::clone(&schema))
        .native(NativeRegistry::new(vec![Box::new(NativeNonEmpty)]))
        .executor(executor.clone())
        .build();
    let mut ev = session.evaluator();
    let list = ev
        .evaluate_set(&Expr::call(
            "Except",
            vec![
                level_members(&schema, "Store", "Country"),
                members(&schema, &["[Store].[USA]"]),
            ],
        ))
        .unwrap();
    assert_eq!(
        names(&schema, &list),
        vec!["[Store].[Canada]", "[Store].[Mexico]"]
    );
    assert!(executor.executed().is_empty());
}

#[test]
fn calculated_slicer_member_disables_native_evaluation() {
    let schema = foodmart();
    let executor = Arc::new(MemoryExecutor::new(Arc::clone(&schema)));
    let session = Session::builder(Arc::clone(&schema))
        .executor(executor.clone())
        .build();
    let mut ev = session.evaluator();
    ev.set_slicer(&[member(&schema, "[Store].[West Coast]")]);
    let list = ev
        .evaluate_set(&Expr::call(
            "NonEmpty",
            vec![level_members(&schema, "Product", "Family")],
        ))
        .unwrap();
    assert_eq!(
        names(&schema, &list),
        vec!["[Product].[Drink]", "[Product].[Food]"]
    );
    assert!(executor.executed().is_empty());
}

#[test]
fn filter_that_does_not_compile_fails_the_query() {
    let schema = foodmart();
    let session = Session::new(Arc::clone(&schema));
    let ev = session.evaluator();
    let states = CrossJoinArg::Members {
        level: level(&schema, "Store", "State"),
        members: None,
    };

    for refinement in [
        Refinement::Except {
            filter: members(&schema, &["[Store].[West Coast]"]),
        },
        Refinement::NonEmpty {
            filter: Some(Expr::call(
                "Except",
                vec![
                    level_members(&schema, "Time", "Month"),
                    members(&schema, &["[Time].[1997].[Q1].[1]"]),
                ],
            )),
        },
    ] {
        let constraint = Constraint::new(&schema, vec![states.clone()], ev.snapshot(), refinement);
        let native = NativeSetEvaluator::new(vec![states.clone()], constraint);
        assert!(matches!(
            native.build_query(&schema, Dialect::Generic),
            Err(OlapError::Sql(_))
        ));
    }
}
