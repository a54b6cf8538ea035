use crate::value::Value;
use std::collections::HashMap;

macro_rules! schema_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn idx(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_idx(idx: usize) -> Self {
                Self(u32::try_from(idx).unwrap_or(u32::MAX))
            }
        }
    };
}

schema_id!(MemberId);
schema_id!(LevelId);
schema_id!(HierarchyId);
schema_id!(MeasureId);

/// Granularity tag carried by a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LevelType {
    Regular,
    TimeYears,
    TimeQuarters,
    TimeMonths,
    TimeWeeks,
    TimeDays,
}

impl LevelType {
    pub fn is_time(self) -> bool {
        !matches!(self, LevelType::Regular)
    }
}

#[derive(Clone, Debug)]
pub struct Level {
    pub(crate) id: LevelId,
    pub(crate) name: String,
    pub(crate) hierarchy: HierarchyId,
    /// Position in the hierarchy; the All level (when present) has depth 0.
    pub(crate) depth: usize,
    pub(crate) level_type: LevelType,
    pub(crate) is_all: bool,
    /// Key column in the dimension table. `None` for the All level and the measures level.
    pub(crate) column: Option<String>,
    /// Members in key-path order, nulls last. Calculated members are not listed.
    pub(crate) members: Vec<MemberId>,
}

impl Level {
    pub fn id(&self) -> LevelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hierarchy(&self) -> HierarchyId {
        self.hierarchy
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn level_type(&self) -> LevelType {
        self.level_type
    }

    pub fn is_all(&self) -> bool {
        self.is_all
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }
}

/// A calculated member on a dimension hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub enum CalcMember {
    /// Aggregates a list of regular members; expands into a SQL membership predicate.
    Aggregate(Vec<MemberId>),
    /// Defined by an expression the SQL layer cannot express.
    Opaque,
}

/// Definition of a calculated measure.
#[derive(Clone, Debug, PartialEq)]
pub enum Formula {
    /// Reference to another measure by name, resolved at evaluation time.
    Measure(String),
    Number(f64),
    Add(Box<Formula>, Box<Formula>),
    Subtract(Box<Formula>, Box<Formula>),
    Multiply(Box<Formula>, Box<Formula>),
    Divide(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn measure(name: impl Into<String>) -> Self {
        Formula::Measure(name.into())
    }

    pub fn divide(left: Formula, right: Formula) -> Self {
        Formula::Divide(Box::new(left), Box::new(right))
    }

    pub fn subtract(left: Formula, right: Formula) -> Self {
        Formula::Subtract(Box::new(left), Box::new(right))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MemberKind {
    All,
    Regular,
    StoredMeasure(MeasureId),
    CalculatedMeasure(Formula),
    Calculated(CalcMember),
}

#[derive(Clone, Debug)]
pub struct Member {
    pub(crate) id: MemberId,
    pub(crate) name: String,
    pub(crate) unique_name: String,
    pub(crate) hierarchy: HierarchyId,
    pub(crate) level: LevelId,
    /// Non-owning link to the parent member.
    pub(crate) parent: Option<MemberId>,
    /// Keys of this member and its ancestors below the All level, outermost first.
    pub(crate) key_path: Vec<Value>,
    /// Position within its level's member list.
    pub(crate) ordinal: usize,
    pub(crate) kind: MemberKind,
}

impl Member {
    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn hierarchy(&self) -> HierarchyId {
        self.hierarchy
    }

    pub fn level(&self) -> LevelId {
        self.level
    }

    pub fn parent(&self) -> Option<MemberId> {
        self.parent
    }

    pub fn key_path(&self) -> &[Value] {
        &self.key_path
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn kind(&self) -> &MemberKind {
        &self.kind
    }

    pub fn is_all(&self) -> bool {
        matches!(self.kind, MemberKind::All)
    }

    pub fn is_measure(&self) -> bool {
        matches!(
            self.kind,
            MemberKind::StoredMeasure(_) | MemberKind::CalculatedMeasure(_)
        )
    }

    pub fn is_calculated(&self) -> bool {
        matches!(
            self.kind,
            MemberKind::Calculated(_) | MemberKind::CalculatedMeasure(_)
        )
    }

    /// Whether the member is a regular member that SQL can address by key.
    pub fn is_regular(&self) -> bool {
        matches!(self.kind, MemberKind::Regular)
    }

    pub fn stored_measure(&self) -> Option<MeasureId> {
        match self.kind {
            MemberKind::StoredMeasure(id) => Some(id),
            _ => None,
        }
    }

    /// Calculated members that cannot be expanded into SQL.
    pub fn is_inexpressible(&self) -> bool {
        matches!(
            self.kind,
            MemberKind::Calculated(CalcMember::Opaque) | MemberKind::CalculatedMeasure(_)
        )
    }
}

/// Physical binding of a dimension hierarchy to its dimension table.
#[derive(Clone, Debug)]
pub struct DimensionBinding {
    pub(crate) table: String,
    pub(crate) primary_key: String,
    pub(crate) foreign_key: String,
    pub(crate) pk_index: HashMap<Value, usize>,
    /// Key path of every dimension row, indexed like the dimension table.
    pub(crate) row_paths: Vec<Vec<Value>>,
}

impl DimensionBinding {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub(crate) fn path_for_key(&self, key: &Value) -> Option<&[Value]> {
        let row = *self.pk_index.get(key)?;
        self.row_paths.get(row).map(Vec::as_slice)
    }
}

#[derive(Clone, Debug)]
pub struct Hierarchy {
    pub(crate) id: HierarchyId,
    pub(crate) name: String,
    pub(crate) levels: Vec<LevelId>,
    pub(crate) all_member: Option<MemberId>,
    pub(crate) default_member: MemberId,
    /// `None` for the measures hierarchy.
    pub(crate) binding: Option<DimensionBinding>,
}

impl Hierarchy {
    pub fn id(&self) -> HierarchyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[LevelId] {
        &self.levels
    }

    pub fn has_all(&self) -> bool {
        self.all_member.is_some()
    }

    pub fn all_member(&self) -> Option<MemberId> {
        self.all_member
    }

    pub fn default_member(&self) -> MemberId {
        self.default_member
    }

    pub fn binding(&self) -> Option<&DimensionBinding> {
        self.binding.as_ref()
    }

    pub fn is_measures(&self) -> bool {
        self.binding.is_none()
    }
}
