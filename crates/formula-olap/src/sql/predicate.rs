use super::Dialect;
use crate::schema::{Aggregator, MemberId};
use crate::value::Value;

/// A table-qualified column reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Column {
    pub table: String,
    pub name: String,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn render(&self, dialect: Dialect) -> String {
        format!(
            "{}.{}",
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier(&self.name)
        )
    }
}

/// An aggregate over the rows of one group, e.g. `sum("sales_fact"."unit_sales")`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggExpr {
    /// Measure the expression computes.
    pub measure: MemberId,
    pub aggregator: Aggregator,
    /// `None` aggregates `*`.
    pub column: Option<Column>,
    pub numeric_cast: bool,
}

impl AggExpr {
    pub fn render(&self, dialect: Dialect) -> String {
        let operand = self
            .column
            .as_ref()
            .map_or_else(|| "*".to_string(), |c| c.render(dialect));
        let expr = self.aggregator.sql_expression(&operand);
        if self.numeric_cast {
            dialect.cast_numeric(&expr)
        } else {
            expr
        }
    }
}

/// Boolean SQL expression tree with three-valued (NULL-aware) semantics.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Predicate {
    True,
    /// `column = value`; a NULL value compares with `is null`.
    Eq(Column, Value),
    IsNull(Column),
    ColumnsEq(Column, Column),
    /// Row membership: the columns equal one of the value rows, component-wise as in [`Predicate::Eq`].
    In {
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
    },
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// `NOT((agg is null))`: the group has a non-null aggregate. Only valid in `HAVING`.
    AggregateNotNull(AggExpr),
}

impl Predicate {
    pub fn and(mut parts: Vec<Predicate>) -> Predicate {
        parts.retain(|p| *p != Predicate::True);
        match parts.len() {
            0 => Predicate::True,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    pub fn or(mut parts: Vec<Predicate>) -> Predicate {
        match parts.len() {
            1 => parts.remove(0),
            _ => Predicate::Or(parts),
        }
    }

    pub fn negate(inner: Predicate) -> Predicate {
        Predicate::Not(Box::new(inner))
    }

    /// Rows whose key columns match none of `rows`, where a NULL key column counts as
    /// "not excluded".
    ///
    /// A bare `not (cols in rows)` is unknown, hence false, when a column is NULL, which
    /// would silently drop rows with null keys. Each exclusion therefore gets an
    /// `or col is null` escape for the columns it compares with `=`.
    pub fn not_in_null_safe(columns: &[Column], rows: &[Vec<Value>]) -> Predicate {
        let (plain, with_nulls): (Vec<&Vec<Value>>, Vec<&Vec<Value>>) =
            rows.iter().partition(|r| r.iter().all(|v| !v.is_null()));

        let mut conjuncts = Vec::new();
        if !plain.is_empty() {
            let membership = Predicate::In {
                columns: columns.to_vec(),
                rows: plain.into_iter().cloned().collect(),
            };
            let escapes = columns.iter().cloned().map(Predicate::IsNull).collect();
            conjuncts.push(Predicate::Or(vec![
                Predicate::negate(membership),
                Predicate::or(escapes),
            ]));
        }
        for row in with_nulls {
            let membership = Predicate::In {
                columns: columns.to_vec(),
                rows: vec![row.clone()],
            };
            let escapes: Vec<Predicate> = columns
                .iter()
                .zip(row)
                .filter(|(_, v)| !v.is_null())
                .map(|(c, _)| Predicate::IsNull(c.clone()))
                .collect();
            if escapes.is_empty() {
                conjuncts.push(Predicate::negate(membership));
            } else {
                conjuncts.push(Predicate::Or(vec![
                    Predicate::negate(membership),
                    Predicate::or(escapes),
                ]));
            }
        }
        Predicate::and(conjuncts)
    }

    /// Aggregate expressions referenced anywhere in the tree.
    pub fn aggregates(&self) -> Vec<&AggExpr> {
        let mut out = Vec::new();
        self.collect_aggregates(&mut out);
        out
    }

    fn collect_aggregates<'a>(&'a self, out: &mut Vec<&'a AggExpr>) {
        match self {
            Predicate::AggregateNotNull(e) => out.push(e),
            Predicate::Not(p) => p.collect_aggregates(out),
            Predicate::And(ps) | Predicate::Or(ps) => {
                for p in ps {
                    p.collect_aggregates(out);
                }
            }
            _ => {}
        }
    }

    pub fn render(&self, dialect: Dialect) -> String {
        match self {
            Predicate::True => "1 = 1".to_string(),
            Predicate::Eq(c, v) => render_eq(c, v, dialect),
            Predicate::IsNull(c) => format!("{} is null", c.render(dialect)),
            Predicate::ColumnsEq(a, b) => format!("{} = {}", a.render(dialect), b.render(dialect)),
            Predicate::In { columns, rows } => render_in(columns, rows, dialect),
            Predicate::Not(inner) => format!("not {}", inner.render_grouped(dialect)),
            Predicate::And(parts) => render_junction(parts, " and ", dialect),
            Predicate::Or(parts) => render_junction(parts, " or ", dialect),
            Predicate::AggregateNotNull(e) => format!("NOT(({} is null))", e.render(dialect)),
        }
    }

    /// Render wrapped in parentheses unless the rendering is already a parenthesized group.
    fn render_grouped(&self, dialect: Dialect) -> String {
        let grouped = match self {
            Predicate::And(_) | Predicate::Or(_) => true,
            Predicate::In { columns, rows } => {
                columns.len() > 1 && rows.len() > 1 && !uses_row_values(columns, rows, dialect)
            }
            _ => false,
        };
        let text = self.render(dialect);
        if grouped {
            text
        } else {
            format!("({text})")
        }
    }
}

fn render_eq(column: &Column, value: &Value, dialect: Dialect) -> String {
    if value.is_null() {
        format!("{} is null", column.render(dialect))
    } else {
        format!("{} = {}", column.render(dialect), value.to_sql_literal())
    }
}

fn render_junction(parts: &[Predicate], separator: &str, dialect: Dialect) -> String {
    if parts.is_empty() {
        return if separator == " and " { "1 = 1" } else { "1 = 0" }.to_string();
    }
    let body: Vec<String> = parts.iter().map(|p| p.render(dialect)).collect();
    format!("({})", body.join(separator))
}

fn uses_row_values(columns: &[Column], rows: &[Vec<Value>], dialect: Dialect) -> bool {
    columns.len() > 1
        && dialect.supports_row_value_in()
        && rows.iter().flatten().all(|v| !v.is_null())
}

fn render_in(columns: &[Column], rows: &[Vec<Value>], dialect: Dialect) -> String {
    if rows.is_empty() {
        return "1 = 0".to_string();
    }
    if let [column] = columns {
        let (nulls, values): (Vec<&Value>, Vec<&Value>) =
            rows.iter().filter_map(|r| r.first()).partition(|v| v.is_null());
        let col = column.render(dialect);
        let membership = match values.as_slice() {
            [] => None,
            [single] => Some(format!("{col} = {}", single.to_sql_literal())),
            many => {
                let list: Vec<String> = many.iter().map(|v| v.to_sql_literal()).collect();
                Some(format!("{col} in ({})", list.join(", ")))
            }
        };
        return match (membership, nulls.is_empty()) {
            (Some(m), true) => m,
            (Some(m), false) => format!("({m} or {col} is null)"),
            (None, _) => format!("{col} is null"),
        };
    }

    if uses_row_values(columns, rows, dialect) {
        let cols: Vec<String> = columns.iter().map(|c| c.render(dialect)).collect();
        let tuples: Vec<String> = rows
            .iter()
            .map(|r| {
                let vals: Vec<String> = r.iter().map(Value::to_sql_literal).collect();
                format!("({})", vals.join(", "))
            })
            .collect();
        return format!("({}) in ({})", cols.join(", "), tuples.join(", "));
    }

    let render_row = |row: &Vec<Value>| {
        let parts: Vec<String> = columns
            .iter()
            .zip(row)
            .map(|(c, v)| render_eq(c, v, dialect))
            .collect();
        parts.join(" and ")
    };
    match rows {
        [single] => render_row(single),
        many => {
            let parts: Vec<String> = many.iter().map(|r| format!("({})", render_row(r))).collect();
            format!("({})", parts.join(" or "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn time_columns() -> Vec<Column> {
        vec![
            Column::new("time_by_day", "the_year"),
            Column::new("time_by_day", "quarter"),
            Column::new("time_by_day", "month_of_year"),
        ]
    }

    fn jan_1997() -> Vec<Value> {
        vec![1997.into(), "Q1".into(), 1.into()]
    }

    #[test]
    fn null_safe_exclusion_uses_row_values_on_mysql() {
        let p = Predicate::not_in_null_safe(&time_columns(), &[jan_1997()]);
        assert_eq!(
            p.render(Dialect::MySql),
            "(not ((`time_by_day`.`the_year`, `time_by_day`.`quarter`, `time_by_day`.`month_of_year`) in ((1997, 'Q1', 1))) \
             or (`time_by_day`.`the_year` is null or `time_by_day`.`quarter` is null or `time_by_day`.`month_of_year` is null))"
        );
    }

    #[test]
    fn null_safe_exclusion_expands_on_postgres() {
        let p = Predicate::not_in_null_safe(&time_columns(), &[jan_1997()]);
        assert_eq!(
            p.render(Dialect::Postgres),
            "(not (\"time_by_day\".\"the_year\" = 1997 and \"time_by_day\".\"quarter\" = 'Q1' and \"time_by_day\".\"month_of_year\" = 1) \
             or (\"time_by_day\".\"the_year\" is null or \"time_by_day\".\"quarter\" is null or \"time_by_day\".\"month_of_year\" is null))"
        );
    }

    #[test]
    fn excluded_member_with_null_key_compares_with_is_null() {
        let columns = vec![Column::new("store", "country"), Column::new("store", "state")];
        let p = Predicate::not_in_null_safe(&columns, &[vec!["USA".into(), Value::Null]]);
        assert_eq!(
            p.render(Dialect::MySql),
            "(not (`store`.`country` = 'USA' and `store`.`state` is null) or `store`.`country` is null)"
        );
    }

    #[test]
    fn single_column_membership_renders_plain_in_list() {
        let p = Predicate::In {
            columns: vec![Column::new("store", "country")],
            rows: vec![vec!["USA".into()], vec!["Mexico".into()], vec![Value::Null]],
        };
        assert_eq!(
            p.render(Dialect::Generic),
            "(\"store\".\"country\" in ('USA', 'Mexico') or \"store\".\"country\" is null)"
        );
    }

    #[test]
    fn having_clause_wraps_aggregate_and_casts_on_db2() {
        let expr = AggExpr {
            measure: MemberId(0),
            aggregator: Aggregator::Sum,
            column: Some(Column::new("sales_fact_1997", "unit_sales")),
            numeric_cast: false,
        };
        let p = Predicate::AggregateNotNull(expr.clone());
        assert_eq!(
            p.render(Dialect::MySql),
            "NOT((sum(`sales_fact_1997`.`unit_sales`) is null))"
        );
        let cast = Predicate::AggregateNotNull(AggExpr {
            numeric_cast: true,
            ..expr
        });
        assert_eq!(
            cast.render(Dialect::Db2),
            "NOT((FLOAT(sum(\"sales_fact_1997\".\"unit_sales\")) is null))"
        );
    }
}
