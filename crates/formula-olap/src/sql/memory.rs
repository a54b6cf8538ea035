use super::{AggExpr, Column, Predicate, SqlExecutor, SqlQuery};
use crate::error::{OlapError, OlapResult};
use crate::schema::Schema;
use crate::table::Table;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Executes [`SqlQuery`] statements against the schema's in-memory tables.
///
/// Joins are evaluated as equi-joins where a `ColumnsEq` predicate links a new table to the
/// tables already bound, and as cross products otherwise. `WHERE` and `HAVING` use SQL
/// three-valued logic: a predicate that evaluates to unknown rejects the row.
#[derive(Debug)]
pub struct MemoryExecutor {
    schema: Arc<Schema>,
    log: Mutex<Vec<String>>,
}

impl MemoryExecutor {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            log: Mutex::new(Vec::new()),
        }
    }

    /// SQL text of every statement executed so far, oldest first.
    pub fn executed(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_log(&self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SqlExecutor for MemoryExecutor {
    fn execute(&self, query: &SqlQuery) -> OlapResult<Vec<Vec<Value>>> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_sql());

        let bound = Bindings::resolve(&self.schema, query)?;
        let rows = bound.join_and_filter(query)?;
        bound.group(query, rows)
    }
}

type Row = Vec<usize>;

struct Bindings<'a> {
    tables: Vec<&'a Table>,
    columns: HashMap<&'a Column, (usize, usize)>,
}

impl<'a> Bindings<'a> {
    fn resolve(schema: &'a Schema, query: &'a SqlQuery) -> OlapResult<Self> {
        let tables = query
            .from()
            .iter()
            .map(|t| {
                schema
                    .table(t)
                    .ok_or_else(|| OlapError::UnknownTable(t.clone()))
            })
            .collect::<OlapResult<Vec<_>>>()?;

        let mut bindings = Self {
            tables,
            columns: HashMap::new(),
        };

        let mut referenced: Vec<&'a Column> = Vec::new();
        referenced.extend(query.select());
        referenced.extend(query.group_by());
        referenced.extend(query.order_by());
        for p in query.where_clause().iter().chain(query.having()) {
            collect_columns(p, &mut referenced);
        }
        for column in referenced {
            let pos = query
                .from()
                .iter()
                .position(|t| *t == column.table)
                .ok_or_else(|| OlapError::Sql(format!("table {} is not in from", column.table)))?;
            let idx = bindings.tables[pos].require_column(&column.name)?;
            bindings.columns.insert(column, (pos, idx));
        }
        Ok(bindings)
    }

    fn value(&self, row: &Row, column: &Column) -> Value {
        self.columns
            .get(column)
            .and_then(|&(pos, idx)| self.tables[pos].value_by_idx(*row.get(pos)?, idx))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Find an equi-join predicate linking `next` to an already bound table.
    fn join_key(
        &self,
        query: &SqlQuery,
        bound: &[bool],
        next: usize,
    ) -> Option<(&'a Column, &'a Column)> {
        query.where_clause().iter().find_map(|p| {
            let Predicate::ColumnsEq(a, b) = p else {
                return None;
            };
            let (&(pa, _), &(pb, _)) = (self.columns.get(a)?, self.columns.get(b)?);
            let (a, b) = (self.columns.get_key_value(a)?.0, self.columns.get_key_value(b)?.0);
            if pa == next && bound[pb] {
                Some((*a, *b))
            } else if pb == next && bound[pa] {
                Some((*b, *a))
            } else {
                None
            }
        })
    }

    fn join_and_filter(&self, query: &SqlQuery) -> OlapResult<Vec<Row>> {
        let n = self.tables.len();
        if n == 0 {
            return Err(OlapError::Sql("query has no from clause".to_string()));
        }

        // Start from the table with the most join edges (the fact table when there is one).
        let degree = |pos: usize| {
            query
                .where_clause()
                .iter()
                .filter(|p| match p {
                    Predicate::ColumnsEq(a, b) => [a, b]
                        .iter()
                        .any(|c| self.columns.get(*c).is_some_and(|&(p, _)| p == pos)),
                    _ => false,
                })
                .count()
        };
        let start = (0..n).max_by_key(|&p| (degree(p), std::cmp::Reverse(p))).unwrap_or(0);

        let mut bound = vec![false; n];
        bound[start] = true;
        let mut rows: Vec<Row> = (0..self.tables[start].row_count())
            .map(|r| {
                let mut row = vec![usize::MAX; n];
                row[start] = r;
                row
            })
            .collect();

        while let Some(next) = (0..n)
            .filter(|&p| !bound[p])
            .min_by_key(|&p| (self.join_key(query, &bound, p).is_none(), p))
        {
            let table = self.tables[next];
            let mut joined = Vec::new();
            match self.join_key(query, &bound, next) {
                Some((inner, outer)) => {
                    let idx = table.require_column(&inner.name)?;
                    let mut index: HashMap<&Value, Vec<usize>> = HashMap::new();
                    for r in 0..table.row_count() {
                        if let Some(v) = table.value_by_idx(r, idx).filter(|v| !v.is_null()) {
                            index.entry(v).or_default().push(r);
                        }
                    }
                    for row in &rows {
                        let key = self.value(row, outer);
                        for &r in index.get(&key).into_iter().flatten() {
                            let mut out = row.clone();
                            out[next] = r;
                            joined.push(out);
                        }
                    }
                }
                None => {
                    for row in &rows {
                        for r in 0..table.row_count() {
                            let mut out = row.clone();
                            out[next] = r;
                            joined.push(out);
                        }
                    }
                }
            }
            rows = joined;
            bound[next] = true;
        }

        let no_aggregates = |_: &AggExpr| Value::Null;
        rows.retain(|row| {
            query.where_clause().iter().all(|p| {
                eval(p, &|c: &Column| self.value(row, c), &no_aggregates) == Some(true)
            })
        });
        Ok(rows)
    }

    fn group(&self, query: &SqlQuery, rows: Vec<Row>) -> OlapResult<Vec<Vec<Value>>> {
        let mut groups: Vec<(Vec<Value>, Vec<Row>)> = Vec::new();
        if query.group_by().is_empty() {
            if !rows.is_empty() {
                groups.push((Vec::new(), rows));
            }
        } else {
            let mut slots: HashMap<Vec<Value>, usize> = HashMap::new();
            for row in rows {
                let key: Vec<Value> = query.group_by().iter().map(|c| self.value(&row, c)).collect();
                let slot = *slots.entry(key.clone()).or_insert_with(|| {
                    groups.push((key, Vec::new()));
                    groups.len() - 1
                });
                groups[slot].1.push(row);
            }
        }

        groups.retain(|(_, members)| {
            let Some(first) = members.first() else {
                return false;
            };
            let column = |c: &Column| self.value(first, c);
            let aggregate = |e: &AggExpr| self.aggregate(members, e);
            query
                .having()
                .iter()
                .all(|p| eval(p, &column, &aggregate) == Some(true))
        });

        let mut out: Vec<(Vec<Value>, Vec<Value>)> = groups
            .iter()
            .filter_map(|(_, members)| {
                let first = members.first()?;
                let select = query.select().iter().map(|c| self.value(first, c)).collect();
                let order = query.order_by().iter().map(|c| self.value(first, c)).collect();
                Some((order, select))
            })
            .collect();
        out.sort_by(|(a, _), (b, _)| {
            a.iter()
                .zip(b)
                .map(|(x, y)| x.cmp_nulls_last(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(out.into_iter().map(|(_, select)| select).collect())
    }

    fn aggregate(&self, rows: &[Row], expr: &AggExpr) -> Value {
        match &expr.column {
            None => expr.aggregator.aggregate(rows.iter().map(|_| None)),
            Some(column) => {
                let values: Vec<Value> = rows.iter().map(|r| self.value(r, column)).collect();
                expr.aggregator.aggregate(values.iter().map(Some))
            }
        }
    }
}

fn collect_columns<'a>(p: &'a Predicate, out: &mut Vec<&'a Column>) {
    match p {
        Predicate::True => {}
        Predicate::Eq(c, _) | Predicate::IsNull(c) => out.push(c),
        Predicate::ColumnsEq(a, b) => {
            out.push(a);
            out.push(b);
        }
        Predicate::In { columns, .. } => out.extend(columns),
        Predicate::Not(inner) => collect_columns(inner, out),
        Predicate::And(ps) | Predicate::Or(ps) => {
            for p in ps {
                collect_columns(p, out);
            }
        }
        Predicate::AggregateNotNull(e) => out.extend(&e.column),
    }
}

fn eq3(left: &Value, right: &Value) -> Option<bool> {
    if left.is_null() || right.is_null() {
        None
    } else {
        Some(left == right)
    }
}

/// Component match used by `Eq` and `In`: a NULL literal means `is null`.
fn matches_literal(actual: &Value, literal: &Value) -> Option<bool> {
    if literal.is_null() {
        Some(actual.is_null())
    } else {
        eq3(actual, literal)
    }
}

fn and3(parts: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for part in parts {
        match part {
            Some(false) => return Some(false),
            None => unknown = true,
            Some(true) => {}
        }
    }
    if unknown {
        None
    } else {
        Some(true)
    }
}

fn or3(parts: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for part in parts {
        match part {
            Some(true) => return Some(true),
            None => unknown = true,
            Some(false) => {}
        }
    }
    if unknown {
        None
    } else {
        Some(false)
    }
}

/// Evaluate a predicate with SQL three-valued logic; `None` is unknown.
pub(crate) fn eval(
    p: &Predicate,
    column: &dyn Fn(&Column) -> Value,
    aggregate: &dyn Fn(&AggExpr) -> Value,
) -> Option<bool> {
    match p {
        Predicate::True => Some(true),
        Predicate::Eq(c, v) => matches_literal(&column(c), v),
        Predicate::IsNull(c) => Some(column(c).is_null()),
        Predicate::ColumnsEq(a, b) => eq3(&column(a), &column(b)),
        Predicate::In { columns, rows } => {
            let actual: Vec<Value> = columns.iter().map(column).collect();
            or3(rows.iter().map(|row| {
                and3(actual.iter().zip(row).map(|(a, l)| matches_literal(a, l)))
            }))
        }
        Predicate::Not(inner) => eval(inner, column, aggregate).map(|b| !b),
        Predicate::And(ps) => and3(ps.iter().map(|p| eval(p, column, aggregate))),
        Predicate::Or(ps) => or3(ps.iter().map(|p| eval(p, column, aggregate))),
        Predicate::AggregateNotNull(e) => Some(!aggregate(e).is_null()),
    }
}
