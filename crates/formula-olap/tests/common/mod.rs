#![allow(dead_code)]

use formula_olap::{
    AggregateTableDef, Aggregator, DimensionDef, Evaluator, Expr, Formula, LevelId, LevelType,
    MemberId, NativeSettings, Schema, SchemaBuilder, Session, Table, TupleList, Value,
};
use std::sync::Arc;

/// A small FoodMart-style sales cube.
///
/// * Time: 1997 months 1-12 plus 1998 month 1 and one 1998 row with no quarter or month.
///   1997 months 2 and 7 have no sales; month 9 has one sale with a NULL unit count.
/// * Store: USA (CA, OR, WA), Mexico (DF, Jalisco), Canada with a NULL state. Jalisco
///   never sells.
/// * Product: Drink (Beer, Wine), Food (Bread), Non-Consumable (Soap). Soap never sells.
pub fn foodmart() -> Arc<Schema> {
    build_foodmart(true)
}

/// [`foodmart`] without the `agg_time_store` aggregate table.
pub fn foodmart_without_aggregates() -> Arc<Schema> {
    build_foodmart(false)
}

fn build_foodmart(with_aggregate: bool) -> Arc<Schema> {
    let mut time = Table::new("time_by_day", vec!["time_id", "the_year", "quarter", "month_of_year"]);
    for month in 1..=12 {
        let quarter = format!("Q{}", (month - 1) / 3 + 1);
        time.push_row(vec![month.into(), 1997.into(), quarter.into(), month.into()])
            .unwrap();
    }
    time.push_row(vec![13.into(), 1998.into(), "Q1".into(), 1.into()])
        .unwrap();
    time.push_row(vec![14.into(), 1998.into(), Value::Null, Value::Null])
        .unwrap();

    let mut store = Table::new("store", vec!["store_id", "store_country", "store_state"]);
    for (id, country, state) in [
        (1, "USA", Some("CA")),
        (2, "USA", Some("OR")),
        (3, "USA", Some("WA")),
        (4, "Mexico", Some("DF")),
        (5, "Canada", None),
        (6, "Mexico", Some("Jalisco")),
    ] {
        store
            .push_row(vec![id.into(), country.into(), state.into()])
            .unwrap();
    }

    let mut product = Table::new("product", vec!["product_id", "product_family", "product_name"]);
    for (id, family, name) in [
        (1, "Drink", "Beer"),
        (2, "Drink", "Wine"),
        (3, "Food", "Bread"),
        (4, "Non-Consumable", "Soap"),
    ] {
        product
            .push_row(vec![id.into(), family.into(), name.into()])
            .unwrap();
    }

    let mut sales = Table::new(
        "sales_fact_1997",
        vec!["time_id", "store_id", "product_id", "unit_sales", "store_sales"],
    );
    let rows: [(i32, i32, i32, Option<i32>, f64); 13] = [
        (1, 1, 1, Some(10), 20.0),
        (1, 2, 3, Some(5), 7.5),
        (3, 1, 2, Some(3), 9.0),
        (4, 3, 1, Some(8), 16.0),
        (5, 4, 3, Some(2), 3.0),
        (6, 1, 1, Some(4), 8.0),
        (8, 2, 2, Some(6), 18.0),
        (9, 3, 3, None, 4.0),
        (10, 5, 1, Some(7), 14.0),
        (11, 4, 2, Some(1), 3.0),
        (12, 1, 3, Some(9), 13.5),
        (13, 2, 1, Some(2), 4.0),
        (14, 5, 3, Some(3), 4.5),
    ];
    for (time_id, store_id, product_id, units, amount) in rows {
        sales
            .push_row(vec![
                time_id.into(),
                store_id.into(),
                product_id.into(),
                units.into(),
                amount.into(),
            ])
            .unwrap();
    }

    let mut builder = SchemaBuilder::new("Sales");
    builder.add_table(time).unwrap();
    builder.add_table(store).unwrap();
    builder.add_table(product).unwrap();
    builder.add_table(sales).unwrap();
    builder.fact_table("sales_fact_1997");
    builder
        .add_dimension(
            DimensionDef::new("Time", "time_by_day", "time_id", "time_id")
                .level("Year", "the_year", LevelType::TimeYears)
                .level("Quarter", "quarter", LevelType::TimeQuarters)
                .level("Month", "month_of_year", LevelType::TimeMonths),
        )
        .unwrap();
    builder
        .add_dimension(
            DimensionDef::new("Store", "store", "store_id", "store_id")
                .level("Country", "store_country", LevelType::Regular)
                .level("State", "store_state", LevelType::Regular),
        )
        .unwrap();
    builder
        .add_dimension(
            DimensionDef::new("Product", "product", "product_id", "product_id")
                .level("Family", "product_family", LevelType::Regular)
                .level("Name", "product_name", LevelType::Regular),
        )
        .unwrap();
    builder
        .add_measure("Unit Sales", Some("unit_sales"), Aggregator::Sum)
        .unwrap();
    builder
        .add_measure("Store Sales", Some("store_sales"), Aggregator::Sum)
        .unwrap();
    builder
        .add_measure("Sales Count", None, Aggregator::Count)
        .unwrap();
    builder
        .add_calculated_measure(
            "Average Price",
            Formula::divide(
                Formula::measure("Store Sales"),
                Formula::measure("Unit Sales"),
            ),
        )
        .unwrap();
    builder
        .add_calculated_measure("Broken", Formula::measure("Warehouse Sales"))
        .unwrap();
    builder.add_aggregate_member(
        "Store",
        "West Coast",
        ["[Store].[USA].[CA]", "[Store].[USA].[OR]"],
    );
    builder.add_opaque_member("Store", "Forecast");
    if with_aggregate {
        builder.add_aggregate_table(AggregateTableDef::new(
            "agg_time_store",
            ["Time", "Store"],
            ["Unit Sales", "Sales Count"],
        ));
    }
    Arc::new(builder.build().unwrap())
}

pub fn native_session(schema: &Arc<Schema>) -> Arc<Session> {
    Session::new(Arc::clone(schema))
}

pub fn interpreted_session(schema: &Arc<Schema>) -> Arc<Session> {
    Session::builder(Arc::clone(schema))
        .settings(NativeSettings::interpreted())
        .build()
}

pub fn member(schema: &Schema, unique_name: &str) -> MemberId {
    schema.member_by_name(unique_name).unwrap()
}

pub fn level(schema: &Schema, hierarchy: &str, level: &str) -> LevelId {
    schema.level_by_name(hierarchy, level).unwrap()
}

pub fn measure(schema: &Schema, name: &str) -> MemberId {
    schema.measure_by_name(name).unwrap()
}

pub fn level_members(schema: &Schema, hierarchy: &str, name: &str) -> Expr {
    Expr::LevelMembers(level(schema, hierarchy, name))
}

pub fn members(schema: &Schema, unique_names: &[&str]) -> Expr {
    Expr::members(unique_names.iter().map(|n| member(schema, n)))
}

pub fn names(schema: &Schema, list: &TupleList) -> Vec<String> {
    list.iter()
        .map(|tuple| {
            tuple
                .iter()
                .map(|&m| schema.member(m).unique_name().to_string())
                .collect::<Vec<_>>()
                .join(" x ")
        })
        .collect()
}

pub fn set_measure(ev: &mut Evaluator, name: &str) {
    let m = measure(ev.schema(), name);
    ev.set_context(m);
}
