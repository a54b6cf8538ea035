use super::filter::PredicateGenerator;
use super::{key_columns, membership_predicate};
use crate::config::NativeSettings;
use crate::expr::Expr;
use crate::schema::{HierarchyId, LevelId, MemberId, Schema};
use crate::sql::SqlQuery;
use std::collections::HashSet;

/// One input of a native cross join: a level, optionally narrowed to an explicit member list.
///
/// Equality and hashing are structural, so args can be part of a cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CrossJoinArg {
    /// Members of `level`; all of them when `members` is `None`.
    Members {
        level: LevelId,
        members: Option<Vec<MemberId>>,
    },
    /// Like `Members`, restricted to members with data for `measure`.
    NonEmpty {
        level: LevelId,
        members: Option<Vec<MemberId>>,
        measure: Option<MemberId>,
    },
}

impl CrossJoinArg {
    pub fn level(&self) -> LevelId {
        match self {
            CrossJoinArg::Members { level, .. } | CrossJoinArg::NonEmpty { level, .. } => *level,
        }
    }

    pub fn members(&self) -> Option<&[MemberId]> {
        match self {
            CrossJoinArg::Members { members, .. } | CrossJoinArg::NonEmpty { members, .. } => {
                members.as_deref()
            }
        }
    }

    pub fn hierarchy(&self, schema: &Schema) -> HierarchyId {
        schema.level(self.level()).hierarchy()
    }

    pub fn is_non_empty(&self) -> bool {
        matches!(self, CrossJoinArg::NonEmpty { .. })
    }

    pub fn measure(&self) -> Option<MemberId> {
        match self {
            CrossJoinArg::NonEmpty { measure, .. } => *measure,
            CrossJoinArg::Members { .. } => None,
        }
    }

    /// Whether evaluating this arg in memory is expected to be cheaper than a SQL round trip.
    pub fn is_prefer_interpreter(&self, settings: &NativeSettings) -> bool {
        match self {
            CrossJoinArg::Members {
                members: Some(members),
                ..
            } => members.len() < settings.min_enumerated_members,
            _ => false,
        }
    }

    fn into_non_empty(self, measure: MemberId) -> Option<CrossJoinArg> {
        match self {
            CrossJoinArg::Members { level, members } => Some(CrossJoinArg::NonEmpty {
                level,
                members,
                measure: Some(measure),
            }),
            CrossJoinArg::NonEmpty { .. } => None,
        }
    }

    /// Select, group and order on the key columns of this arg's level.
    pub(crate) fn add_key_columns(&self, query: &mut SqlQuery, schema: &Schema) {
        for column in key_columns(schema, self.level()) {
            query.add_key_column(column);
        }
    }

    /// Add the arg's member restriction and, for non-empty args, its `HAVING` test.
    pub fn add_constraint(
        &self,
        query: &mut SqlQuery,
        schema: &Schema,
        generator: &PredicateGenerator<'_>,
    ) {
        let level = schema.level(self.level());
        if let Some(binding) = schema.hierarchy(level.hierarchy()).binding() {
            if !level.is_all() {
                query.add_from(binding.table());
            }
        }
        if let Some(members) = self.members() {
            query.add_where(membership_predicate(schema, members));
        }
        if let Some(having) = self.measure().and_then(|m| generator.measure_not_null(m)) {
            query.add_having(having);
        }
    }

    /// Sort rank of `member` within this arg: list position for enumerated args, level order
    /// otherwise.
    pub(crate) fn rank(&self, schema: &Schema, member: MemberId) -> usize {
        match self.members() {
            Some(members) => members
                .iter()
                .position(|&m| m == member)
                .unwrap_or(usize::MAX),
            None => schema.member(member).ordinal(),
        }
    }
}

/// True when every arg prefers the interpreter.
pub fn is_prefer_interpreter(args: &[CrossJoinArg], settings: &NativeSettings) -> bool {
    args.iter().all(|a| a.is_prefer_interpreter(settings))
}

/// Recognizes set expressions that native evaluation can express as cross-join args.
pub struct CrossJoinArgFactory<'a> {
    schema: &'a Schema,
    context_measure: MemberId,
}

impl<'a> CrossJoinArgFactory<'a> {
    pub fn new(schema: &'a Schema, context_measure: MemberId) -> Self {
        Self {
            schema,
            context_measure,
        }
    }

    /// Decompose `expr` into cross-join args.
    ///
    /// Returns `None` for unsupported shapes. Otherwise the first array holds the args that
    /// produce output columns; an optional second array holds args that only restrict rows.
    pub fn check_cross_join_arg(&self, expr: &Expr) -> Option<Vec<Vec<CrossJoinArg>>> {
        match expr {
            Expr::LevelMembers(level) => {
                let hierarchy = self.schema.level(*level).hierarchy();
                if self.schema.hierarchy(hierarchy).is_measures() {
                    return None;
                }
                Some(vec![vec![CrossJoinArg::Members {
                    level: *level,
                    members: None,
                }]])
            }
            Expr::Member(member) => Some(vec![vec![self.member_list(&[*member])?]]),
            Expr::Set(items) => {
                let members = member_ids(items)?;
                Some(vec![vec![self.member_list(&members)?]])
            }
            Expr::Children(member) => {
                Some(vec![vec![self.member_list(self.schema.children(*member))?]])
            }
            Expr::Call { name, args } if name.eq_ignore_ascii_case("CrossJoin") && args.len() == 2 => {
                let mut left = self.single(&args[0])?;
                let right = self.single(&args[1])?;
                let left_hierarchies: HashSet<HierarchyId> =
                    left.iter().map(|a| a.hierarchy(self.schema)).collect();
                if right
                    .iter()
                    .any(|a| left_hierarchies.contains(&a.hierarchy(self.schema)))
                {
                    return None;
                }
                left.extend(right);
                Some(vec![left])
            }
            Expr::Call { name, args }
                if name.eq_ignore_ascii_case("NonEmpty") && (1..=2).contains(&args.len()) =>
            {
                let inner = self.single(&args[0])?;
                let (measure, restriction) = match args.get(1) {
                    None => (self.stored_context_measure()?, None),
                    Some(filter) => self.non_empty_filter(filter)?,
                };
                if let Some(r) = &restriction {
                    let h = r.hierarchy(self.schema);
                    if inner.iter().any(|a| a.hierarchy(self.schema) == h) {
                        return None;
                    }
                }
                let wrapped = inner
                    .into_iter()
                    .map(|a| a.into_non_empty(measure))
                    .collect::<Option<Vec<_>>>()?;
                Some(match restriction {
                    Some(r) => vec![wrapped, vec![r]],
                    None => vec![wrapped],
                })
            }
            _ => None,
        }
    }

    fn single(&self, expr: &Expr) -> Option<Vec<CrossJoinArg>> {
        let mut all = self.check_cross_join_arg(expr)?;
        if all.len() != 1 {
            return None;
        }
        all.pop()
    }

    fn stored_context_measure(&self) -> Option<MemberId> {
        self.schema
            .member(self.context_measure)
            .stored_measure()
            .map(|_| self.context_measure)
    }

    /// Enumerated list of distinct regular members from one level.
    fn member_list(&self, members: &[MemberId]) -> Option<CrossJoinArg> {
        let first = *members.first()?;
        let level = self.schema.member(first).level();
        let mut seen = HashSet::new();
        for &m in members {
            let member = self.schema.member(m);
            if !member.is_regular() || member.level() != level || !seen.insert(m) {
                return None;
            }
        }
        Some(CrossJoinArg::Members {
            level,
            members: Some(members.to_vec()),
        })
    }

    /// Second argument of a nested NonEmpty: one stored measure, or members of another
    /// hierarchy that restrict rows under the context measure.
    fn non_empty_filter(&self, filter: &Expr) -> Option<(MemberId, Option<CrossJoinArg>)> {
        let members = match filter {
            Expr::Member(m) => vec![*m],
            Expr::Set(items) => member_ids(items)?,
            _ => return None,
        };
        match members.as_slice() {
            [m] if self.schema.member(*m).stored_measure().is_some() => Some((*m, None)),
            _ => {
                let restriction = self.member_list(&members)?;
                Some((self.stored_context_measure()?, Some(restriction)))
            }
        }
    }
}

fn member_ids(items: &[Expr]) -> Option<Vec<MemberId>> {
    items
        .iter()
        .map(|e| match e {
            Expr::Member(m) => Some(*m),
            _ => None,
        })
        .collect()
}
