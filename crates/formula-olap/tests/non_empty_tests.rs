mod common;

use formula_olap::{
    filter_non_empty, Expr, MemoryExecutor, NativeSettings, Role, Session, TupleList,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

use common::{
    foodmart, interpreted_session, level, level_members, member, members, names,
    native_session, set_measure,
};

#[test]
fn non_empty_states_skip_stores_without_sales() {
    let schema = foodmart();
    let expr = Expr::call("NonEmpty", vec![level_members(&schema, "Store", "State")]);
    let expected = vec![
        "[Store].[Canada].[#null]",
        "[Store].[Mexico].[DF]",
        "[Store].[USA].[CA]",
        "[Store].[USA].[OR]",
        "[Store].[USA].[WA]",
    ];

    for session in [native_session(&schema), interpreted_session(&schema)] {
        let mut ev = session.evaluator();
        let list = ev.evaluate_set(&expr).unwrap();
        assert_eq!(names(&schema, &list), expected);
    }
}

#[test]
fn native_non_empty_issues_one_query() {
    let schema = foodmart();
    let executor = Arc::new(MemoryExecutor::new(Arc::clone(&schema)));
    let session = Session::builder(Arc::clone(&schema))
        .executor(executor.clone())
        .build();
    let mut ev = session.evaluator();
    let expr = Expr::call("NonEmpty", vec![level_members(&schema, "Store", "Country")]);

    let list = ev.evaluate_set(&expr).unwrap();
    assert_eq!(
        names(&schema, &list),
        vec!["[Store].[Canada]", "[Store].[Mexico]", "[Store].[USA]"]
    );
    assert_eq!(executor.executed().len(), 1);

    // Second evaluation is served from the plan cache.
    ev.evaluate_set(&expr).unwrap();
    assert_eq!(executor.executed().len(), 1);
    assert_eq!(session.cache().hits(), 1);
}

#[test]
fn crossjoin_of_levels_keeps_outer_order() {
    let schema = foodmart();
    let expr = Expr::call(
        "NonEmpty",
        vec![Expr::call(
            "CrossJoin",
            vec![
                level_members(&schema, "Store", "Country"),
                level_members(&schema, "Product", "Family"),
            ],
        )],
    );
    let expected = vec![
        "[Store].[Canada] x [Product].[Drink]",
        "[Store].[Canada] x [Product].[Food]",
        "[Store].[Mexico] x [Product].[Drink]",
        "[Store].[Mexico] x [Product].[Food]",
        "[Store].[USA] x [Product].[Drink]",
        "[Store].[USA] x [Product].[Food]",
    ];
    for session in [native_session(&schema), interpreted_session(&schema)] {
        let mut ev = session.evaluator();
        assert_eq!(names(&schema, &ev.evaluate_set(&expr).unwrap()), expected);
    }
}

#[test]
fn enumerated_list_keeps_list_order() {
    let schema = foodmart();
    let expr = Expr::call(
        "NonEmpty",
        vec![members(
            &schema,
            &["[Store].[USA].[WA]", "[Store].[Mexico].[Jalisco]", "[Store].[USA].[CA]"],
        )],
    );
    for session in [native_session(&schema), interpreted_session(&schema)] {
        let mut ev = session.evaluator();
        assert_eq!(
            names(&schema, &ev.evaluate_set(&expr).unwrap()),
            vec!["[Store].[USA].[WA]", "[Store].[USA].[CA]"]
        );
    }
}

#[test]
fn slicer_member_restricts_native_rows() {
    let schema = foodmart();
    let expr = Expr::call("NonEmpty", vec![level_members(&schema, "Product", "Family")]);
    for session in [native_session(&schema), interpreted_session(&schema)] {
        let mut ev = session.evaluator();
        ev.set_context(member(&schema, "[Store].[Mexico]"));
        assert_eq!(
            names(&schema, &ev.evaluate_set(&expr).unwrap()),
            vec!["[Product].[Drink]", "[Product].[Food]"]
        );
        ev.set_context(member(&schema, "[Time].[1997].[Q2]"));
        assert_eq!(
            names(&schema, &ev.evaluate_set(&expr).unwrap()),
            vec!["[Product].[Food]"]
        );
    }
}

#[test]
fn measure_filter_replaces_context_measure() {
    let schema = foodmart();
    let months_1997: Vec<_> = schema
        .level_members(level(&schema, "Time", "Month"), None)
        .into_iter()
        .filter(|&m| schema.member(m).unique_name().starts_with("[Time].[1997]"))
        .collect();
    let expr = Expr::call(
        "NonEmpty",
        vec![
            Expr::members(months_1997.iter().copied()),
            Expr::Member(member(&schema, "[Measures].[Sales Count]")),
        ],
    );
    for session in [native_session(&schema), interpreted_session(&schema)] {
        let mut ev = session.evaluator();
        let list = ev.evaluate_set(&expr).unwrap();
        // Month 9 has a sale with no unit count: it counts, but has no unit sales.
        assert_eq!(list.len(), 10);
        assert!(!names(&schema, &list).contains(&"[Time].[1997].[Q1].[2]".to_string()));
        assert!(!names(&schema, &list).contains(&"[Time].[1997].[Q3].[7]".to_string()));
    }

    let unit_sales = Expr::call("NonEmpty", vec![Expr::members(months_1997.iter().copied())]);
    for session in [native_session(&schema), interpreted_session(&schema)] {
        let mut ev = session.evaluator();
        assert_eq!(ev.evaluate_set(&unit_sales).unwrap().len(), 9);
    }
}

#[test]
fn member_filter_keeps_tuples_with_data_under_any_member() {
    let schema = foodmart();
    let expr = Expr::call(
        "NonEmpty",
        vec![
            level_members(&schema, "Product", "Name"),
            members(&schema, &["[Store].[USA].[OR]", "[Store].[Mexico].[DF]"]),
        ],
    );
    for session in [native_session(&schema), interpreted_session(&schema)] {
        let mut ev = session.evaluator();
        assert_eq!(
            names(&schema, &ev.evaluate_set(&expr).unwrap()),
            vec![
                "[Product].[Drink].[Beer]",
                "[Product].[Drink].[Wine]",
                "[Product].[Food].[Bread]",
            ]
        );
    }
}

#[test]
fn calculated_measure_falls_back_to_interpreter() {
    let schema = foodmart();
    let executor = Arc::new(MemoryExecutor::new(Arc::clone(&schema)));
    let session = Session::builder(Arc::clone(&schema))
        .executor(executor.clone())
        .build();
    let mut ev = session.evaluator();
    set_measure(&mut ev, "Average Price");
    let expr = Expr::call("NonEmpty", vec![level_members(&schema, "Store", "Country")]);
    let list = ev.evaluate_set(&expr).unwrap();
    assert_eq!(list.len(), 3);
    assert!(executor.executed().is_empty());
}

#[test]
fn error_valued_measure_is_empty_everywhere() {
    let schema = foodmart();
    let mut ev = native_session(&schema).evaluator();
    set_measure(&mut ev, "Broken");
    let expr = Expr::call("NonEmpty", vec![level_members(&schema, "Store", "Country")]);
    assert!(ev.evaluate_set(&expr).unwrap().is_empty());
}

#[test]
fn opaque_member_in_context_declines_native() {
    let schema = foodmart();
    let executor = Arc::new(MemoryExecutor::new(Arc::clone(&schema)));
    let session = Session::builder(Arc::clone(&schema))
        .executor(executor.clone())
        .build();
    let mut ev = session.evaluator();
    ev.set_context(member(&schema, "[Store].[Forecast]"));
    let expr = Expr::call("NonEmpty", vec![level_members(&schema, "Product", "Family")]);
    assert!(ev.evaluate_set(&expr).unwrap().is_empty());
    assert!(executor.executed().is_empty());
}

#[test]
fn aggregate_member_in_context_expands_to_its_members() {
    let schema = foodmart();
    let expr = Expr::call("NonEmpty", vec![level_members(&schema, "Time", "Quarter")]);
    for session in [native_session(&schema), interpreted_session(&schema)] {
        let mut ev = session.evaluator();
        ev.set_context(member(&schema, "[Store].[West Coast]"));
        assert_eq!(
            names(&schema, &ev.evaluate_set(&expr).unwrap()),
            vec![
                "[Time].[1997].[Q1]",
                "[Time].[1997].[Q2]",
                "[Time].[1997].[Q3]",
                "[Time].[1997].[Q4]",
                "[Time].[1998].[Q1]",
            ]
        );
    }
}

#[test]
fn all_level_follows_policy() {
    let schema = foodmart();
    let all_level = schema.hierarchy(schema.hierarchy_by_name("Store").unwrap()).levels()[0];
    let expr = Expr::call("NonEmpty", vec![Expr::LevelMembers(all_level)]);

    let excluded = Arc::new(MemoryExecutor::new(Arc::clone(&schema)));
    let session = Session::builder(Arc::clone(&schema))
        .executor(excluded.clone())
        .build();
    let list = session.evaluator().evaluate_set(&expr).unwrap();
    assert_eq!(names(&schema, &list), vec!["[Store].[All Stores]"]);
    assert!(excluded.executed().is_empty());

    let included = Arc::new(MemoryExecutor::new(Arc::clone(&schema)));
    let session = Session::builder(Arc::clone(&schema))
        .settings(NativeSettings {
            non_empty_excludes_all_level: false,
            ..NativeSettings::default()
        })
        .executor(included.clone())
        .build();
    let list = session.evaluator().evaluate_set(&expr).unwrap();
    assert_eq!(names(&schema, &list), vec!["[Store].[All Stores]"]);
    assert_eq!(included.executed().len(), 1);
}

#[test]
fn role_hides_members_from_native_and_interpreted_results() {
    let schema = foodmart();
    let store = schema.hierarchy_by_name("Store").unwrap();
    let mut role = Role::new("usa-only");
    role.grant_members(store, [member(&schema, "[Store].[USA]")]);
    let expr = Expr::call("NonEmpty", vec![level_members(&schema, "Store", "State")]);

    for settings in [NativeSettings::default(), NativeSettings::interpreted()] {
        let session = Session::builder(Arc::clone(&schema))
            .role(role.clone())
            .settings(settings)
            .build();
        assert_eq!(
            names(&schema, &session.evaluator().evaluate_set(&expr).unwrap()),
            vec!["[Store].[USA].[CA]", "[Store].[USA].[OR]", "[Store].[USA].[WA]"]
        );
    }
}

#[test]
fn hidden_filter_members_are_ignored_on_both_paths() {
    let schema = foodmart();
    let store = schema.hierarchy_by_name("Store").unwrap();
    let mut role = Role::new("mexico-only");
    role.grant_members(store, [member(&schema, "[Store].[Mexico]")]);
    let expr = Expr::call(
        "NonEmpty",
        vec![
            level_members(&schema, "Product", "Name"),
            members(&schema, &["[Store].[USA].[OR]", "[Store].[Mexico].[DF]"]),
        ],
    );

    let executor = Arc::new(MemoryExecutor::new(Arc::clone(&schema)));
    for settings in [NativeSettings::default(), NativeSettings::interpreted()] {
        let session = Session::builder(Arc::clone(&schema))
            .role(role.clone())
            .settings(settings)
            .executor(executor.clone())
            .build();
        assert_eq!(
            names(&schema, &session.evaluator().evaluate_set(&expr).unwrap()),
            vec!["[Product].[Drink].[Wine]", "[Product].[Food].[Bread]"]
        );
    }
    assert!(executor.executed().is_empty());
}

#[test]
fn nested_member_filter_still_tests_the_context_member() {
    let schema = foodmart();
    let expr = Expr::call(
        "NonEmpty",
        vec![Expr::call(
            "NonEmpty",
            vec![
                level_members(&schema, "Product", "Name"),
                members(&schema, &["[Store].[USA].[OR]", "[Store].[Mexico].[DF]"]),
            ],
        )],
    );
    for session in [native_session(&schema), interpreted_session(&schema)] {
        let mut ev = session.evaluator();
        set_measure(&mut ev, "Unit Sales");
        assert_eq!(
            names(&schema, &ev.evaluate_set(&expr).unwrap()),
            vec![
                "[Product].[Drink].[Beer]",
                "[Product].[Drink].[Wine]",
                "[Product].[Food].[Bread]",
            ]
        );
        // WA sold Beer, and Bread only with no unit count.
        ev.set_context(member(&schema, "[Store].[USA].[WA]"));
        assert_eq!(
            names(&schema, &ev.evaluate_set(&expr).unwrap()),
            vec!["[Product].[Drink].[Beer]"]
        );
    }
}

#[test]
fn twelve_months_with_two_gaps_filter_to_ten() {
    let schema = foodmart();
    let session = native_session(&schema);
    let mut ev = session.evaluator();
    set_measure(&mut ev, "Sales Count");
    let months: Vec<_> = schema
        .level_members(level(&schema, "Time", "Month"), None)
        .into_iter()
        .filter(|&m| schema.member(m).unique_name().starts_with("[Time].[1997]"))
        .collect();
    assert_eq!(months.len(), 12);

    let before = ev.snapshot();
    let kept = filter_non_empty(&mut ev, TupleList::from_members(months.clone()), &[]).unwrap();
    assert_eq!(kept.len(), 10);
    let expected: Vec<_> = months
        .into_iter()
        .filter(|&m| {
            let name = schema.member(m).name();
            name != "2" && name != "7"
        })
        .collect();
    assert_eq!(kept.slice(0), expected);
    assert_eq!(ev.snapshot(), before);
}
