use super::member::{
    CalcMember, DimensionBinding, Formula, Hierarchy, HierarchyId, Level, LevelId, LevelType,
    MeasureId, Member, MemberId, MemberKind,
};
use super::star::{AggregateColumn, AggregateTable, Aggregator, Measure};
use super::Schema;
use crate::error::{OlapError, OlapResult};
use crate::table::Table;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
pub struct LevelDef {
    pub name: String,
    pub column: String,
    pub level_type: LevelType,
}

/// A single-hierarchy dimension backed by one dimension table joined to the fact table.
#[derive(Clone, Debug)]
pub struct DimensionDef {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub foreign_key: String,
    pub has_all: bool,
    pub levels: Vec<LevelDef>,
}

impl DimensionDef {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        primary_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: primary_key.into(),
            foreign_key: foreign_key.into(),
            has_all: true,
            levels: Vec::new(),
        }
    }

    pub fn without_all(mut self) -> Self {
        self.has_all = false;
        self
    }

    pub fn level(
        mut self,
        name: impl Into<String>,
        column: impl Into<String>,
        level_type: LevelType,
    ) -> Self {
        self.levels.push(LevelDef {
            name: name.into(),
            column: column.into(),
            level_type,
        });
        self
    }
}

/// An aggregate table that keeps the listed hierarchies and pre-summarizes the listed measures.
#[derive(Clone, Debug)]
pub struct AggregateTableDef {
    pub name: String,
    pub hierarchies: Vec<String>,
    pub measures: Vec<String>,
}

impl AggregateTableDef {
    pub fn new(
        name: impl Into<String>,
        hierarchies: impl IntoIterator<Item = impl Into<String>>,
        measures: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            hierarchies: hierarchies.into_iter().map(Into::into).collect(),
            measures: measures.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug)]
enum CalcMemberDef {
    Aggregate(Vec<String>),
    Opaque,
}

#[derive(Debug)]
pub struct SchemaBuilder {
    cube: String,
    tables: HashMap<String, Table>,
    fact_table: Option<String>,
    dimensions: Vec<DimensionDef>,
    measures: Vec<(String, Option<String>, Aggregator)>,
    calculated_measures: Vec<(String, Formula)>,
    calculated_members: Vec<(String, String, CalcMemberDef)>,
    aggregate_tables: Vec<AggregateTableDef>,
}

impl SchemaBuilder {
    pub fn new(cube: impl Into<String>) -> Self {
        Self {
            cube: cube.into(),
            tables: HashMap::new(),
            fact_table: None,
            dimensions: Vec::new(),
            measures: Vec::new(),
            calculated_measures: Vec::new(),
            calculated_members: Vec::new(),
            aggregate_tables: Vec::new(),
        }
    }

    pub fn add_table(&mut self, table: Table) -> OlapResult<()> {
        let name = table.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(OlapError::DuplicateTable { table: name });
        }
        self.tables.insert(name, table);
        Ok(())
    }

    pub fn fact_table(&mut self, name: impl Into<String>) -> &mut Self {
        self.fact_table = Some(name.into());
        self
    }

    pub fn add_dimension(&mut self, dimension: DimensionDef) -> OlapResult<()> {
        if dimension.name.eq_ignore_ascii_case("Measures")
            || self
                .dimensions
                .iter()
                .any(|d| d.name.eq_ignore_ascii_case(&dimension.name))
        {
            return Err(OlapError::DuplicateDimension {
                dimension: dimension.name,
            });
        }
        self.dimensions.push(dimension);
        Ok(())
    }

    /// Add a stored measure. A `None` column aggregates `*` (row count).
    pub fn add_measure(
        &mut self,
        name: impl Into<String>,
        column: Option<&str>,
        aggregator: Aggregator,
    ) -> OlapResult<()> {
        let name = name.into();
        self.check_measure_name(&name)?;
        self.measures
            .push((name, column.map(str::to_string), aggregator));
        Ok(())
    }

    pub fn add_calculated_measure(
        &mut self,
        name: impl Into<String>,
        formula: Formula,
    ) -> OlapResult<()> {
        let name = name.into();
        self.check_measure_name(&name)?;
        self.calculated_measures.push((name, formula));
        Ok(())
    }

    /// Add a calculated member aggregating the members named by unique name.
    pub fn add_aggregate_member(
        &mut self,
        dimension: impl Into<String>,
        name: impl Into<String>,
        members: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.calculated_members.push((
            dimension.into(),
            name.into(),
            CalcMemberDef::Aggregate(members.into_iter().map(Into::into).collect()),
        ));
        self
    }

    /// Add a calculated member whose definition SQL cannot express.
    pub fn add_opaque_member(
        &mut self,
        dimension: impl Into<String>,
        name: impl Into<String>,
    ) -> &mut Self {
        self.calculated_members
            .push((dimension.into(), name.into(), CalcMemberDef::Opaque));
        self
    }

    pub fn add_aggregate_table(&mut self, def: AggregateTableDef) -> &mut Self {
        self.aggregate_tables.push(def);
        self
    }

    fn check_measure_name(&self, name: &str) -> OlapResult<()> {
        let taken = self
            .measures
            .iter()
            .map(|(n, _, _)| n)
            .chain(self.calculated_measures.iter().map(|(n, _)| n))
            .any(|n| n.eq_ignore_ascii_case(name));
        if taken {
            return Err(OlapError::DuplicateMeasure {
                measure: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn build(self) -> OlapResult<Schema> {
        let fact_name = self
            .fact_table
            .clone()
            .ok_or_else(|| OlapError::UnknownTable("<fact table>".to_string()))?;
        let fact = self
            .tables
            .get(&fact_name)
            .ok_or_else(|| OlapError::UnknownTable(fact_name.clone()))?;

        let mut out = SchemaParts::default();
        for dimension in &self.dimensions {
            out.add_dimension(&self.tables, fact, dimension)?;
        }

        let measures_hierarchy = HierarchyId::from_idx(out.hierarchies.len());
        out.add_measures(
            fact,
            measures_hierarchy,
            &self.measures,
            &self.calculated_measures,
        )?;

        for (dimension, name, def) in &self.calculated_members {
            out.add_calculated_member(dimension, name, def)?;
        }

        let mut tables = self.tables;
        let mut aggregate_tables = Vec::new();
        for def in &self.aggregate_tables {
            let fact = tables
                .get(&fact_name)
                .ok_or_else(|| OlapError::UnknownTable(fact_name.clone()))?;
            let (agg, table) = out.materialize_aggregate(fact, def)?;
            if tables.contains_key(table.name()) {
                return Err(OlapError::DuplicateTable {
                    table: table.name().to_string(),
                });
            }
            tables.insert(table.name().to_string(), table);
            aggregate_tables.push(agg);
        }

        let by_unique_name = out
            .members
            .iter()
            .map(|m| (m.unique_name.to_ascii_lowercase(), m.id))
            .collect();

        Ok(Schema {
            cube: self.cube,
            tables,
            fact_table: fact_name,
            hierarchies: out.hierarchies,
            levels: out.levels,
            members: out.members,
            measures: out.measures,
            aggregate_tables,
            measures_hierarchy,
            children: out.children,
            by_unique_name,
            by_key_path: out.by_key_path,
        })
    }
}

#[derive(Default)]
struct SchemaParts {
    hierarchies: Vec<Hierarchy>,
    levels: Vec<Level>,
    members: Vec<Member>,
    measures: Vec<Measure>,
    children: HashMap<MemberId, Vec<MemberId>>,
    by_key_path: HashMap<(LevelId, Vec<Value>), MemberId>,
}

fn cmp_key_paths(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.cmp_nulls_last(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

impl SchemaParts {
    fn push_member(&mut self, mut member: Member) -> MemberId {
        let id = MemberId::from_idx(self.members.len());
        member.id = id;
        self.members.push(member);
        id
    }

    fn push_level(&mut self, mut level: Level) -> LevelId {
        let id = LevelId::from_idx(self.levels.len());
        level.id = id;
        self.levels.push(level);
        id
    }

    fn add_dimension(
        &mut self,
        tables: &HashMap<String, Table>,
        fact: &Table,
        def: &DimensionDef,
    ) -> OlapResult<()> {
        let table = tables
            .get(&def.table)
            .ok_or_else(|| OlapError::UnknownTable(def.table.clone()))?;
        let pk_idx = table.require_column(&def.primary_key)?;
        let fk_idx = fact.require_column(&def.foreign_key)?;
        let level_idx = def
            .levels
            .iter()
            .map(|l| table.require_column(&l.column))
            .collect::<OlapResult<Vec<_>>>()?;

        let mut pk_index = HashMap::new();
        let mut row_paths = Vec::with_capacity(table.row_count());
        for (row_no, row) in table.rows().iter().enumerate() {
            let key = row[pk_idx].clone();
            if pk_index.insert(key.clone(), row_no).is_some() {
                return Err(OlapError::NonUniqueKey {
                    table: def.table.clone(),
                    column: def.primary_key.clone(),
                    value: key,
                });
            }
            row_paths.push(level_idx.iter().map(|&i| row[i].clone()).collect::<Vec<_>>());
        }

        for row in fact.rows() {
            let value = &row[fk_idx];
            if !pk_index.contains_key(value) {
                return Err(OlapError::DanglingForeignKey {
                    fact_table: fact.name().to_string(),
                    column: def.foreign_key.clone(),
                    dimension_table: def.table.clone(),
                    value: value.clone(),
                });
            }
        }

        let hierarchy = HierarchyId::from_idx(self.hierarchies.len());
        let mut level_ids = Vec::new();
        let mut all_member = None;

        if def.has_all {
            let level = self.push_level(Level {
                id: LevelId(0),
                name: "(All)".to_string(),
                hierarchy,
                depth: 0,
                level_type: LevelType::Regular,
                is_all: true,
                column: None,
                members: Vec::new(),
            });
            let member = self.push_member(Member {
                id: MemberId(0),
                name: format!("All {}s", def.name),
                unique_name: format!("[{}].[All {}s]", def.name, def.name),
                hierarchy,
                level,
                parent: None,
                key_path: Vec::new(),
                ordinal: 0,
                kind: MemberKind::All,
            });
            self.levels[level.idx()].members.push(member);
            level_ids.push(level);
            all_member = Some(member);
        }

        let mut parent_level: Option<LevelId> = None;
        for (k, level_def) in def.levels.iter().enumerate() {
            let level = self.push_level(Level {
                id: LevelId(0),
                name: level_def.name.clone(),
                hierarchy,
                depth: level_ids.len(),
                level_type: level_def.level_type,
                is_all: false,
                column: Some(level_def.column.clone()),
                members: Vec::new(),
            });
            level_ids.push(level);

            let mut prefixes: Vec<Vec<Value>> = row_paths
                .iter()
                .map(|p| p[..=k].to_vec())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            prefixes.sort_by(|a, b| cmp_key_paths(a, b));

            for (ordinal, path) in prefixes.into_iter().enumerate() {
                let parent = match parent_level {
                    Some(pl) => self.by_key_path.get(&(pl, path[..k].to_vec())).copied(),
                    None => all_member,
                };
                let name = path[k].to_string();
                let unique_name = match parent {
                    Some(p) if k > 0 => format!("{}.[{name}]", self.members[p.idx()].unique_name),
                    _ => format!("[{}].[{name}]", def.name),
                };
                let member = self.push_member(Member {
                    id: MemberId(0),
                    name,
                    unique_name,
                    hierarchy,
                    level,
                    parent,
                    key_path: path.clone(),
                    ordinal,
                    kind: MemberKind::Regular,
                });
                self.levels[level.idx()].members.push(member);
                self.by_key_path.insert((level, path), member);
                if let Some(p) = parent {
                    self.children.entry(p).or_default().push(member);
                }
            }
            parent_level = Some(level);
        }

        let default_member = all_member
            .or_else(|| {
                level_ids
                    .first()
                    .and_then(|&l| self.levels[l.idx()].members.first().copied())
            })
            .ok_or_else(|| OlapError::EmptyHierarchy(def.name.clone()))?;

        self.hierarchies.push(Hierarchy {
            id: hierarchy,
            name: def.name.clone(),
            levels: level_ids,
            all_member,
            default_member,
            binding: Some(DimensionBinding {
                table: def.table.clone(),
                primary_key: def.primary_key.clone(),
                foreign_key: def.foreign_key.clone(),
                pk_index,
                row_paths,
            }),
        });
        Ok(())
    }

    fn add_measures(
        &mut self,
        fact: &Table,
        hierarchy: HierarchyId,
        stored: &[(String, Option<String>, Aggregator)],
        calculated: &[(String, Formula)],
    ) -> OlapResult<()> {
        let level = self.push_level(Level {
            id: LevelId(0),
            name: "MeasuresLevel".to_string(),
            hierarchy,
            depth: 0,
            level_type: LevelType::Regular,
            is_all: false,
            column: None,
            members: Vec::new(),
        });

        for (ordinal, (name, column, aggregator)) in stored.iter().enumerate() {
            if let Some(column) = column {
                fact.require_column(column)?;
            }
            let measure_id = MeasureId::from_idx(self.measures.len());
            let member = self.push_member(Member {
                id: MemberId(0),
                name: name.clone(),
                unique_name: format!("[Measures].[{name}]"),
                hierarchy,
                level,
                parent: None,
                key_path: Vec::new(),
                ordinal,
                kind: MemberKind::StoredMeasure(measure_id),
            });
            self.levels[level.idx()].members.push(member);
            self.measures.push(Measure {
                id: measure_id,
                name: name.clone(),
                member,
                column: column.clone(),
                aggregator: *aggregator,
            });
        }

        for (name, formula) in calculated {
            self.push_member(Member {
                id: MemberId(0),
                name: name.clone(),
                unique_name: format!("[Measures].[{name}]"),
                hierarchy,
                level,
                parent: None,
                key_path: Vec::new(),
                ordinal: 0,
                kind: MemberKind::CalculatedMeasure(formula.clone()),
            });
        }

        let default_member = self.levels[level.idx()]
            .members
            .first()
            .copied()
            .or_else(|| {
                self.members
                    .iter()
                    .find(|m| m.hierarchy == hierarchy)
                    .map(|m| m.id)
            })
            .ok_or_else(|| OlapError::EmptyHierarchy("Measures".to_string()))?;
        self.hierarchies.push(Hierarchy {
            id: hierarchy,
            name: "Measures".to_string(),
            levels: vec![level],
            all_member: None,
            default_member,
            binding: None,
        });
        Ok(())
    }

    fn find_member(&self, unique_name: &str) -> OlapResult<MemberId> {
        self.members
            .iter()
            .find(|m| m.unique_name.eq_ignore_ascii_case(unique_name))
            .map(|m| m.id)
            .ok_or_else(|| OlapError::UnknownMember(unique_name.to_string()))
    }

    fn add_calculated_member(
        &mut self,
        dimension: &str,
        name: &str,
        def: &CalcMemberDef,
    ) -> OlapResult<()> {
        let hierarchy = self
            .hierarchies
            .iter()
            .find(|h| h.binding.is_some() && h.name.eq_ignore_ascii_case(dimension))
            .ok_or_else(|| OlapError::UnknownDimension(dimension.to_string()))?;
        let hierarchy_id = hierarchy.id;
        let all_member = hierarchy.all_member;
        let top_level = hierarchy
            .levels
            .iter()
            .copied()
            .find(|&l| !self.levels[l.idx()].is_all)
            .ok_or_else(|| OlapError::UnknownLevel(format!("[{dimension}]")))?;

        let (level, calc) = match def {
            CalcMemberDef::Aggregate(names) => {
                let members = names
                    .iter()
                    .map(|n| self.find_member(n))
                    .collect::<OlapResult<Vec<_>>>()?;
                if let Some(&m) = members
                    .iter()
                    .find(|&&m| self.members[m.idx()].hierarchy != hierarchy_id)
                {
                    return Err(OlapError::UnknownMember(
                        self.members[m.idx()].unique_name.clone(),
                    ));
                }
                let level = members
                    .first()
                    .map_or(top_level, |&m| self.members[m.idx()].level);
                (level, CalcMember::Aggregate(members))
            }
            CalcMemberDef::Opaque => (top_level, CalcMember::Opaque),
        };

        self.push_member(Member {
            id: MemberId(0),
            name: name.to_string(),
            unique_name: format!("[{dimension}].[{name}]"),
            hierarchy: hierarchy_id,
            level,
            parent: all_member,
            key_path: Vec::new(),
            ordinal: 0,
            kind: MemberKind::Calculated(calc),
        });
        Ok(())
    }

    fn materialize_aggregate(
        &self,
        fact: &Table,
        def: &AggregateTableDef,
    ) -> OlapResult<(AggregateTable, Table)> {
        let mut hierarchies = Vec::new();
        let mut fk_idx = Vec::new();
        let mut columns = Vec::new();
        for name in &def.hierarchies {
            let h = self
                .hierarchies
                .iter()
                .find(|h| h.binding.is_some() && h.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| OlapError::UnknownDimension(name.clone()))?;
            let Some(binding) = &h.binding else {
                continue;
            };
            hierarchies.push(h.id);
            fk_idx.push(fact.require_column(&binding.foreign_key)?);
            columns.push(binding.foreign_key.clone());
        }

        let mut measures = Vec::new();
        let mut agg_columns = HashMap::new();
        for name in &def.measures {
            let measure = self
                .measures
                .iter()
                .find(|m| m.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| OlapError::UnknownMeasure(name.clone()))?;
            if measure.aggregator.rollup().is_none() {
                return Err(OlapError::NoRollup {
                    table: def.name.clone(),
                    measure: measure.name.clone(),
                });
            }
            let column = measure.name.to_ascii_lowercase().replace(' ', "_");
            let operand = measure
                .column
                .as_deref()
                .map(|c| fact.require_column(c))
                .transpose()?;
            columns.push(column.clone());
            agg_columns.insert(
                measure.id,
                AggregateColumn {
                    column,
                    aggregator: measure.aggregator,
                },
            );
            measures.push((measure.aggregator, operand));
        }

        let mut groups: Vec<(Vec<Value>, Vec<usize>)> = Vec::new();
        let mut group_of: HashMap<Vec<Value>, usize> = HashMap::new();
        for (row_no, row) in fact.rows().iter().enumerate() {
            let key: Vec<Value> = fk_idx.iter().map(|&i| row[i].clone()).collect();
            let slot = *group_of.entry(key.clone()).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(row_no);
        }

        let mut table = Table::new(def.name.clone(), columns);
        for (key, rows) in groups {
            let mut out = key;
            for &(aggregator, operand) in &measures {
                let values = rows
                    .iter()
                    .map(|&r| operand.and_then(|c| fact.value_by_idx(r, c)));
                out.push(aggregator.aggregate(values));
            }
            table.push_row(out)?;
        }

        Ok((
            AggregateTable {
                name: def.name.clone(),
                hierarchies,
                measures: agg_columns,
            },
            table,
        ))
    }
}
