//! Star-schema metadata: hierarchies, levels, members, measures and aggregate tables.
//!
//! A [`Schema`] is built once by [`SchemaBuilder`] and then shared read-only (`Arc<Schema>`)
//! between sessions. Members live in an arena and are addressed by [`MemberId`]; parent links
//! are ids, never owning pointers.

mod builder;
mod member;
mod security;
mod star;

pub use builder::{AggregateTableDef, DimensionDef, LevelDef, SchemaBuilder};
pub use member::{
    CalcMember, DimensionBinding, Formula, Hierarchy, HierarchyId, Level, LevelId, LevelType,
    MeasureId, Member, MemberId, MemberKind,
};
pub use security::{Access, Role};
pub use star::{AggregateColumn, AggregateTable, Aggregator, Measure};

use crate::error::{OlapError, OlapResult};
use crate::table::Table;
use crate::value::Value;
use std::collections::HashMap;

#[derive(Debug)]
pub struct Schema {
    pub(crate) cube: String,
    pub(crate) tables: HashMap<String, Table>,
    pub(crate) fact_table: String,
    pub(crate) hierarchies: Vec<Hierarchy>,
    pub(crate) levels: Vec<Level>,
    pub(crate) members: Vec<Member>,
    pub(crate) measures: Vec<Measure>,
    pub(crate) aggregate_tables: Vec<AggregateTable>,
    pub(crate) measures_hierarchy: HierarchyId,
    pub(crate) children: HashMap<MemberId, Vec<MemberId>>,
    pub(crate) by_unique_name: HashMap<String, MemberId>,
    pub(crate) by_key_path: HashMap<(LevelId, Vec<Value>), MemberId>,
}

impl Schema {
    pub fn cube(&self) -> &str {
        &self.cube
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn fact_table(&self) -> &str {
        &self.fact_table
    }

    pub fn hierarchies(&self) -> &[Hierarchy] {
        &self.hierarchies
    }

    pub fn hierarchy(&self, id: HierarchyId) -> &Hierarchy {
        &self.hierarchies[id.idx()]
    }

    pub fn level(&self, id: LevelId) -> &Level {
        &self.levels[id.idx()]
    }

    pub fn member(&self, id: MemberId) -> &Member {
        &self.members[id.idx()]
    }

    pub fn measure(&self, id: MeasureId) -> &Measure {
        &self.measures[id.idx()]
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn aggregate_tables(&self) -> &[AggregateTable] {
        &self.aggregate_tables
    }

    pub fn measures_hierarchy(&self) -> HierarchyId {
        self.measures_hierarchy
    }

    pub fn hierarchy_count(&self) -> usize {
        self.hierarchies.len()
    }

    pub fn hierarchy_by_name(&self, name: &str) -> OlapResult<HierarchyId> {
        self.hierarchies
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.id)
            .ok_or_else(|| OlapError::UnknownDimension(name.to_string()))
    }

    /// Look up a level by hierarchy and level name, e.g. `("Time", "Month")`.
    pub fn level_by_name(&self, hierarchy: &str, level: &str) -> OlapResult<LevelId> {
        let h = self.hierarchy_by_name(hierarchy)?;
        self.hierarchy(h)
            .levels
            .iter()
            .copied()
            .find(|&l| self.level(l).name.eq_ignore_ascii_case(level))
            .ok_or_else(|| OlapError::UnknownLevel(format!("[{hierarchy}].[{level}]")))
    }

    /// Look up a member by unique name, e.g. `[Time].[1997].[Q1].[1]`. Case-insensitive.
    pub fn member_by_name(&self, unique_name: &str) -> OlapResult<MemberId> {
        self.by_unique_name
            .get(&unique_name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| OlapError::UnknownMember(unique_name.to_string()))
    }

    pub fn measure_by_name(&self, name: &str) -> Option<MemberId> {
        self.by_unique_name
            .get(&format!("[measures].[{}]", name.to_ascii_lowercase()))
            .copied()
    }

    /// Member of `level` whose key path is `path`.
    pub fn member_by_key_path(&self, level: LevelId, path: &[Value]) -> Option<MemberId> {
        self.by_key_path.get(&(level, path.to_vec())).copied()
    }

    pub fn children(&self, member: MemberId) -> &[MemberId] {
        self.children.get(&member).map_or(&[], Vec::as_slice)
    }

    pub fn default_member(&self, hierarchy: HierarchyId) -> MemberId {
        self.hierarchy(hierarchy).default_member
    }

    pub fn ancestors_and_self(&self, member: MemberId) -> impl Iterator<Item = MemberId> + '_ {
        std::iter::successors(Some(member), move |&m| self.member(m).parent)
    }

    /// Key columns of `level`: the columns of every non-All level from the top of the
    /// hierarchy down to `level`, in key-path order.
    pub fn key_columns(&self, level: LevelId) -> Vec<&str> {
        let lvl = self.level(level);
        self.hierarchy(lvl.hierarchy)
            .levels
            .iter()
            .map(|&l| self.level(l))
            .take_while(|l| l.depth <= lvl.depth)
            .filter_map(|l| l.column.as_deref())
            .collect()
    }

    /// Members of `level` visible to `role`, in level order.
    pub fn level_members(&self, level: LevelId, role: Option<&Role>) -> Vec<MemberId> {
        let members = &self.level(level).members;
        match role {
            None => members.clone(),
            Some(role) => members
                .iter()
                .copied()
                .filter(|&m| role.is_visible(self, m))
                .collect(),
        }
    }

    pub fn stored_measure_member(&self, member: MemberId) -> Option<&Measure> {
        self.member(member).stored_measure().map(|id| self.measure(id))
    }
}
