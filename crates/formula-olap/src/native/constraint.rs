use super::filter::{FilterIntent, PredicateGenerator, SqlFragment};
use super::{membership_predicate, CrossJoinArg};
use crate::context::ContextSnapshot;
use crate::error::{OlapError, OlapResult};
use crate::expr::Expr;
use crate::schema::{AggregateTable, HierarchyId, MemberId, Schema};
use crate::sql::{Column, Predicate, SqlQuery};

/// How a native query narrows its cross join.
#[derive(Clone, Debug, PartialEq)]
pub enum Refinement {
    /// Remove the members of `filter` from the single cross-join arg.
    Except { filter: Expr },
    /// Keep rows with data: for the context measure when `filter` is `None`, otherwise for
    /// the measure or members `filter` names.
    NonEmpty { filter: Option<Expr> },
}

impl Refinement {
    fn kind(&self) -> RefinementKind {
        match self {
            Refinement::Except { .. } => RefinementKind::Except,
            Refinement::NonEmpty { .. } => RefinementKind::NonEmpty,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefinementKind {
    Except,
    NonEmpty,
}

/// Identity of a native result set. Equal keys produce identical SQL and identical rows.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: RefinementKind,
    args: Vec<CrossJoinArg>,
    context: Vec<MemberId>,
    filter: Option<String>,
    non_empty: bool,
}

/// SQL constraint for a native cross join: the args, a snapshot of the evaluation context and
/// the function-specific refinement.
#[derive(Clone, Debug)]
pub struct Constraint {
    args: Vec<CrossJoinArg>,
    context: ContextSnapshot,
    refinement: Refinement,
    filter_text: Option<String>,
    context_join: bool,
}

impl Constraint {
    pub fn new(
        schema: &Schema,
        args: Vec<CrossJoinArg>,
        context: ContextSnapshot,
        refinement: Refinement,
    ) -> Self {
        let filter_text = match &refinement {
            Refinement::Except { filter } => Some(filter.to_mdx(schema)),
            Refinement::NonEmpty { filter } => filter.as_ref().map(|f| f.to_mdx(schema)),
        };
        let skip: Vec<HierarchyId> = args.iter().map(|a| a.hierarchy(schema)).collect();
        let measure_is_stored = schema
            .member(context.measure(schema))
            .stored_measure()
            .is_some();
        let context_join =
            !context.constraining_members(schema, &skip).is_empty() || measure_is_stored;
        Self {
            args,
            context,
            refinement,
            filter_text,
            context_join,
        }
    }

    pub fn args(&self) -> &[CrossJoinArg] {
        &self.args
    }

    pub fn context(&self) -> &ContextSnapshot {
        &self.context
    }

    pub fn refinement(&self) -> &Refinement {
        &self.refinement
    }

    /// Whether the query must join the fact table.
    pub fn is_join_required(&self) -> bool {
        match self.refinement {
            Refinement::NonEmpty { .. } => true,
            Refinement::Except { .. } => {
                self.args.iter().any(CrossJoinArg::is_non_empty)
                    || (self.context.is_non_empty() && self.context_join)
            }
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            kind: self.refinement.kind(),
            args: self.args.clone(),
            context: self.context.members().to_vec(),
            filter: self.filter_text.clone(),
            non_empty: self.context.is_non_empty(),
        }
    }

    /// Add this constraint's tables and predicates to `query`.
    ///
    /// `aggregate` is the aggregate table chosen for the query, if any; measure expressions
    /// are regenerated against it. Fails when the filter does not compile against it.
    pub fn add_constraint(
        &self,
        query: &mut SqlQuery,
        schema: &Schema,
        aggregate: Option<&AggregateTable>,
    ) -> OlapResult<()> {
        let measure = self.context.measure(schema);
        let generator = PredicateGenerator::new(schema, &self.args, measure, query.dialect())
            .with_aggregate(aggregate);

        let (fragment, context_having) = match &self.refinement {
            Refinement::Except { filter } => (
                generator.generate_filter_condition(Some(filter), FilterIntent::Exclude),
                self.context.is_non_empty(),
            ),
            Refinement::NonEmpty { filter } => (
                generator.generate_filter_condition(filter.as_ref(), FilterIntent::NonEmpty),
                false,
            ),
        };
        let fragment: SqlFragment = fragment.ok_or_else(|| {
            OlapError::Sql(format!(
                "native filter {} does not compile against {}",
                self.filter_text.as_deref().unwrap_or("<context measure>"),
                aggregate.map_or(schema.fact_table(), AggregateTable::name)
            ))
        })?;

        for arg in &self.args {
            arg.add_constraint(query, schema, &generator);
        }
        if let Some(predicate) = &fragment.where_clause {
            query.add_where(predicate.clone());
        }
        if let Some(predicate) = &fragment.having {
            query.add_having(predicate.clone());
        }

        if self.is_join_required() || self.context.is_non_empty() {
            self.add_context_constraint(query, schema, aggregate, &fragment.hierarchies);
            if context_having {
                if let Some(having) = generator.measure_not_null(measure) {
                    query.add_having(having);
                }
            }
        }
        Ok(())
    }

    /// Join the fact (or aggregate) table and restrict it to the context's members.
    fn add_context_constraint(
        &self,
        query: &mut SqlQuery,
        schema: &Schema,
        aggregate: Option<&AggregateTable>,
        pinned: &[HierarchyId],
    ) {
        let fact = aggregate.map_or(schema.fact_table(), AggregateTable::name);
        query.add_from(fact);
        // A filter on another hierarchy references that dimension's columns.
        for &hierarchy in pinned {
            if let Some(binding) = schema.hierarchy(hierarchy).binding() {
                query.add_from(binding.table());
            }
        }

        let mut skip: Vec<HierarchyId> = self.args.iter().map(|a| a.hierarchy(schema)).collect();
        skip.extend_from_slice(pinned);
        for member in self.context.constraining_members(schema, &skip) {
            let hierarchy = schema.member(member).hierarchy();
            if let Some(binding) = schema.hierarchy(hierarchy).binding() {
                query.add_from(binding.table());
            }
            query.add_where(membership_predicate(schema, &[member]));
        }

        for hierarchy in schema.hierarchies() {
            let Some(binding) = hierarchy.binding() else {
                continue;
            };
            if query.has_from(binding.table()) {
                query.add_where(Predicate::ColumnsEq(
                    Column::new(fact, binding.foreign_key()),
                    Column::new(binding.table(), binding.primary_key()),
                ));
            }
        }
    }
}
