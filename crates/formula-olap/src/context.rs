//! The evaluation context: one current member per hierarchy, a non-empty flag and a
//! savepoint stack for restoring earlier states.

use crate::cancel::{CancellationChecker, Execution};
use crate::config::NativeSettings;
use crate::error::OlapResult;
use crate::schema::{HierarchyId, MemberId, Role, Schema};
use crate::session::Session;
use crate::value::Value;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Handle returned by [`Evaluator::savepoint`].
///
/// Restoring a savepoint also discards every savepoint taken after it; restoring a handle
/// that was already discarded is a programming error and panics.
#[must_use = "a savepoint does nothing unless restored"]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Savepoint {
    depth: usize,
    /// Unique per evaluator, so a handle cannot match a newer savepoint at the same depth.
    id: u64,
}

#[derive(Clone, Copy, Debug)]
enum Undo {
    Member {
        hierarchy: HierarchyId,
        previous: MemberId,
    },
    NonEmpty(bool),
}

/// Immutable copy of an evaluator's context, used to build SQL constraints.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextSnapshot {
    members: Vec<MemberId>,
    non_empty: bool,
}

impl ContextSnapshot {
    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn member(&self, hierarchy: HierarchyId) -> MemberId {
        self.members[hierarchy.idx()]
    }

    pub fn is_non_empty(&self) -> bool {
        self.non_empty
    }

    pub fn measure(&self, schema: &Schema) -> MemberId {
        self.member(schema.measures_hierarchy())
    }

    /// Members that restrict the fact rows: everything except All members and the measure,
    /// on hierarchies not listed in `skip`.
    pub fn constraining_members(&self, schema: &Schema, skip: &[HierarchyId]) -> Vec<MemberId> {
        self.members
            .iter()
            .copied()
            .filter(|&m| {
                let member = schema.member(m);
                !member.is_all() && !member.is_measure() && !skip.contains(&member.hierarchy())
            })
            .collect()
    }
}

/// Mutable evaluation state of one query.
#[derive(Debug)]
pub struct Evaluator {
    session: Arc<Session>,
    execution: Option<Arc<Execution>>,
    members: Vec<MemberId>,
    slicer: Vec<MemberId>,
    non_empty: bool,
    undo: Vec<Undo>,
    /// `(id, undo mark)` per live savepoint, oldest first.
    savepoints: Vec<(u64, usize)>,
    next_savepoint: u64,
}

impl Evaluator {
    pub fn new(session: Arc<Session>) -> Self {
        let schema = Arc::clone(session.schema());
        let members = schema
            .hierarchies()
            .iter()
            .map(|h| h.default_member())
            .collect();
        Self {
            session,
            execution: None,
            members,
            slicer: Vec::new(),
            non_empty: false,
            undo: Vec::new(),
            savepoints: Vec::new(),
            next_savepoint: 0,
        }
    }

    pub fn with_execution(mut self, execution: Arc<Execution>) -> Self {
        self.execution = Some(execution);
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn schema(&self) -> &Schema {
        self.session.schema()
    }

    pub fn settings(&self) -> &NativeSettings {
        self.session.settings()
    }

    pub fn role(&self) -> Option<&Role> {
        self.session.role()
    }

    pub fn execution(&self) -> Option<&Execution> {
        self.execution.as_deref()
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn current_member(&self, hierarchy: HierarchyId) -> MemberId {
        self.members[hierarchy.idx()]
    }

    pub fn current_measure(&self) -> MemberId {
        self.current_member(self.schema().measures_hierarchy())
    }

    pub fn is_non_empty(&self) -> bool {
        self.non_empty
    }

    pub fn slicer(&self) -> &[MemberId] {
        &self.slicer
    }

    /// Make `member` current on its hierarchy.
    pub fn set_context(&mut self, member: MemberId) {
        let hierarchy = self.schema().member(member).hierarchy();
        let slot = &mut self.members[hierarchy.idx()];
        if *slot == member {
            return;
        }
        let previous = std::mem::replace(slot, member);
        if !self.savepoints.is_empty() {
            self.undo.push(Undo::Member {
                hierarchy,
                previous,
            });
        }
    }

    /// Make every member of `tuple` current.
    pub fn set_context_tuple(&mut self, tuple: &[MemberId]) {
        for &member in tuple {
            self.set_context(member);
        }
    }

    pub fn set_non_empty(&mut self, non_empty: bool) {
        if self.non_empty == non_empty {
            return;
        }
        let previous = std::mem::replace(&mut self.non_empty, non_empty);
        if !self.savepoints.is_empty() {
            self.undo.push(Undo::NonEmpty(previous));
        }
    }

    /// Set the query slicer: its members become current and are remembered as slicer members.
    pub fn set_slicer(&mut self, members: &[MemberId]) {
        self.set_context_tuple(members);
        self.slicer = members.to_vec();
    }

    pub fn savepoint(&mut self) -> Savepoint {
        let id = self.next_savepoint;
        self.next_savepoint += 1;
        self.savepoints.push((id, self.undo.len()));
        Savepoint {
            depth: self.savepoints.len() - 1,
            id,
        }
    }

    /// Roll the context back to the state at `savepoint`.
    ///
    /// # Panics
    ///
    /// Panics if `savepoint` was already restored or discarded by restoring an older one.
    pub fn restore(&mut self, savepoint: Savepoint) {
        assert!(
            self.try_restore(savepoint),
            "stale savepoint {} restored with {} live savepoints",
            savepoint.id,
            self.savepoints.len()
        );
    }

    fn try_restore(&mut self, savepoint: Savepoint) -> bool {
        let mark = match self.savepoints.get(savepoint.depth) {
            Some(&(id, mark)) if id == savepoint.id => mark,
            _ => return false,
        };
        self.savepoints.truncate(savepoint.depth);
        while self.undo.len() > mark {
            match self.undo.pop() {
                Some(Undo::Member {
                    hierarchy,
                    previous,
                }) => self.members[hierarchy.idx()] = previous,
                Some(Undo::NonEmpty(previous)) => self.non_empty = previous,
                None => break,
            }
        }
        if self.savepoints.is_empty() {
            self.undo.clear();
        }
        true
    }

    /// Take a savepoint that is restored when the returned guard drops.
    pub fn scoped(&mut self) -> ContextGuard<'_> {
        let savepoint = self.savepoint();
        ContextGuard {
            evaluator: self,
            savepoint,
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            members: self.members.clone(),
            non_empty: self.non_empty,
        }
    }

    /// Current members that are neither All members nor measures.
    pub fn non_all_members(&self) -> Vec<MemberId> {
        let schema = self.schema();
        self.members
            .iter()
            .copied()
            .filter(|&m| !schema.member(m).is_all() && !schema.member(m).is_measure())
            .collect()
    }

    /// Value of the cell at the current context.
    pub fn evaluate_current(&self) -> Value {
        self.session.cells().evaluate(self.schema(), &self.members)
    }

    pub fn check_cancel(&self, iteration: usize) -> OlapResult<()> {
        CancellationChecker::check(
            iteration,
            self.execution(),
            self.settings().cancel_check_interval,
        )
    }

    pub fn is_visible(&self, member: MemberId) -> bool {
        self.role()
            .map_or(true, |role| role.is_visible(self.schema(), member))
    }
}

/// Scoped savepoint: derefs to the evaluator and restores it on drop, on every exit path.
pub struct ContextGuard<'a> {
    evaluator: &'a mut Evaluator,
    savepoint: Savepoint,
}

impl Deref for ContextGuard<'_> {
    type Target = Evaluator;

    fn deref(&self) -> &Evaluator {
        self.evaluator
    }
}

impl DerefMut for ContextGuard<'_> {
    fn deref_mut(&mut self) -> &mut Evaluator {
        self.evaluator
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if !self.evaluator.try_restore(self.savepoint) && !std::thread::panicking() {
            panic!("context guard savepoint {} was restored early", self.savepoint.id);
        }
    }
}
