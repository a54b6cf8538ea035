use super::member::{HierarchyId, MemberId};
use super::Schema;
use std::collections::{HashMap, HashSet};

/// Access granted to a role on one hierarchy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    All,
    None,
    /// Only the listed members, their ancestors and their descendants are visible.
    Custom(HashSet<MemberId>),
}

/// A security role restricting which members a session can see.
///
/// Hierarchies without an explicit grant are fully visible.
#[derive(Clone, Debug, Default)]
pub struct Role {
    name: String,
    grants: HashMap<HierarchyId, Access>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grants: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grant(&mut self, hierarchy: HierarchyId, access: Access) -> &mut Self {
        self.grants.insert(hierarchy, access);
        self
    }

    pub fn grant_members(
        &mut self,
        hierarchy: HierarchyId,
        members: impl IntoIterator<Item = MemberId>,
    ) -> &mut Self {
        self.grant(hierarchy, Access::Custom(members.into_iter().collect()))
    }

    pub fn is_visible(&self, schema: &Schema, member: MemberId) -> bool {
        let m = schema.member(member);
        if m.is_measure() || m.is_calculated() {
            return true;
        }
        match self.grants.get(&m.hierarchy()) {
            None | Some(Access::All) => true,
            Some(Access::None) => false,
            Some(Access::Custom(granted)) => {
                schema.ancestors_and_self(member).any(|a| granted.contains(&a))
                    || granted
                        .iter()
                        .any(|&g| schema.ancestors_and_self(g).any(|a| a == member))
            }
        }
    }
}
