use super::{key_columns, membership_predicate, CrossJoinArg};
use crate::expr::Expr;
use crate::schema::{AggregateTable, HierarchyId, MemberId, Schema};
use crate::sql::{AggExpr, Column, Dialect, Predicate};
use crate::value::Value;

/// What a filter expression means to the query being built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterIntent {
    /// Drop rows whose key matches a member of the expression.
    Exclude,
    /// Keep rows whose measure, or context measure under the expression's members, has data.
    NonEmpty,
}

/// SQL produced for a filter expression.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqlFragment {
    pub where_clause: Option<Predicate>,
    pub having: Option<Predicate>,
    /// Stored measure the fragment aggregates, if any.
    pub stored_measure: Option<MemberId>,
    /// Hierarchies the fragment pins; the context must not constrain them again.
    pub hierarchies: Vec<HierarchyId>,
}

/// Translates filter expressions into `WHERE`/`HAVING` fragments for a set of cross-join args.
///
/// The generator is rebuilt once the aggregate table is known, so measure expressions
/// reference the table the query actually reads.
pub struct PredicateGenerator<'a> {
    schema: &'a Schema,
    args: &'a [CrossJoinArg],
    context_measure: MemberId,
    aggregate: Option<&'a AggregateTable>,
    dialect: Dialect,
}

impl<'a> PredicateGenerator<'a> {
    pub fn new(
        schema: &'a Schema,
        args: &'a [CrossJoinArg],
        context_measure: MemberId,
        dialect: Dialect,
    ) -> Self {
        Self {
            schema,
            args,
            context_measure,
            aggregate: None,
            dialect,
        }
    }

    pub fn with_aggregate(mut self, aggregate: Option<&'a AggregateTable>) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// SQL for `expr`, or `None` when the expression cannot be pushed to SQL.
    ///
    /// A missing expression is only meaningful for [`FilterIntent::NonEmpty`], where it
    /// tests the context measure.
    pub fn generate_filter_condition(
        &self,
        expr: Option<&Expr>,
        intent: FilterIntent,
    ) -> Option<SqlFragment> {
        match (intent, expr) {
            (FilterIntent::Exclude, Some(expr)) => self.exclusion(expr),
            (FilterIntent::Exclude, None) => None,
            (FilterIntent::NonEmpty, None) => Some(SqlFragment {
                having: Some(self.measure_not_null(self.context_measure)?),
                stored_measure: Some(self.context_measure),
                ..SqlFragment::default()
            }),
            (FilterIntent::NonEmpty, Some(expr)) => self.non_empty(expr),
        }
    }

    /// `NOT((agg(measure) is null))`, reading the aggregate table when one is in use.
    pub fn measure_not_null(&self, measure: MemberId) -> Option<Predicate> {
        let stored = self.schema.stored_measure_member(measure)?;
        let (aggregator, column) = match self.aggregate {
            Some(agg) => {
                let col = agg.measure_column(stored.id())?;
                (
                    col.aggregator.rollup()?,
                    Some(Column::new(agg.name(), col.column.as_str())),
                )
            }
            None => (
                stored.aggregator(),
                stored
                    .column()
                    .map(|c| Column::new(self.schema.fact_table(), c)),
            ),
        };
        Some(Predicate::AggregateNotNull(AggExpr {
            measure,
            aggregator,
            column,
            numeric_cast: self.dialect.requires_numeric_having_cast(),
        }))
    }

    /// Exclusion applies to the first arg; any further args only restrict rows.
    fn exclusion(&self, expr: &Expr) -> Option<SqlFragment> {
        let arg = self.args.first()?;
        let level = arg.level();
        if self.schema.level(level).is_all() {
            return None;
        }
        let members = self.members_of(expr)?;
        if members.is_empty() {
            return Some(SqlFragment::default());
        }
        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(members.len());
        for m in members {
            let member = self.schema.member(m);
            if !member.is_regular() || member.level() != level {
                return None;
            }
            rows.push(member.key_path().to_vec());
        }
        Some(SqlFragment {
            where_clause: Some(Predicate::not_in_null_safe(
                &key_columns(self.schema, level),
                &rows,
            )),
            ..SqlFragment::default()
        })
    }

    fn non_empty(&self, expr: &Expr) -> Option<SqlFragment> {
        let members = self.members_of(expr)?;
        let first = *members.first()?;

        if members
            .iter()
            .all(|&m| self.schema.member(m).stored_measure().is_some())
        {
            let having = members
                .iter()
                .map(|&m| self.measure_not_null(m))
                .collect::<Option<Vec<_>>>()?;
            return Some(SqlFragment {
                having: Some(Predicate::or(having)),
                stored_measure: Some(first),
                ..SqlFragment::default()
            });
        }

        let hierarchy = self.schema.member(first).hierarchy();
        let pinned_by_args = self
            .args
            .iter()
            .any(|a| a.hierarchy(self.schema) == hierarchy);
        let expressible = members.iter().all(|&m| {
            let member = self.schema.member(m);
            member.hierarchy() == hierarchy && !member.is_measure() && !member.is_inexpressible()
        });
        if pinned_by_args || !expressible {
            return None;
        }
        Some(SqlFragment {
            where_clause: Some(membership_predicate(self.schema, &members)),
            having: Some(self.measure_not_null(self.context_measure)?),
            stored_measure: Some(self.context_measure),
            hierarchies: vec![hierarchy],
        })
    }

    fn members_of(&self, expr: &Expr) -> Option<Vec<MemberId>> {
        match expr {
            Expr::Member(m) => Some(vec![*m]),
            Expr::Children(m) => Some(self.schema.children(*m).to_vec()),
            Expr::Set(items) => items
                .iter()
                .map(|e| match e {
                    Expr::Member(m) => Some(*m),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}
