//! Scheduling nodes.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;

use crate::core::error::{SchedError, SchedResult};
use crate::ir::InstId;

/// Handle of a node inside one [`super::SchedulingGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One instruction of the block being scheduled.
///
/// Predecessors are the nodes this one depends on: they must end up earlier
/// in program order. Because the block is scheduled bottom-up, a node can be
/// picked once all of its successors (the nodes depending on it) have been
/// picked.
pub struct SchedulingNode<'bump> {
    instruction: InstId,
    /// Index of the instruction in the block before scheduling.
    position: u32,
    is_scheduling_barrier: bool,

    /// Cycles until the result is available to users.
    latency: u32,
    /// Cycles spent by the instruction's own lowering before the result is
    /// produced, invisible to users.
    internal_latency: u32,
    /// Longest latency-weighted chain from this node to the end of the block.
    critical_path: u32,

    data_predecessors: BumpVec<'bump, NodeId>,
    other_predecessors: BumpVec<'bump, NodeId>,
    unscheduled_successors: u32,
}

impl<'bump> SchedulingNode<'bump> {
    const PREALLOCATED_PREDECESSORS: usize = 4;

    pub fn new(arena: &'bump Bump, instruction: InstId, position: u32, is_scheduling_barrier: bool) -> Self {
        Self {
            instruction,
            position,
            is_scheduling_barrier,
            latency: 0,
            internal_latency: 0,
            critical_path: 0,
            data_predecessors: BumpVec::with_capacity_in(Self::PREALLOCATED_PREDECESSORS, arena),
            other_predecessors: BumpVec::new_in(arena),
            unscheduled_successors: 0,
        }
    }

    pub fn instruction(&self) -> InstId {
        self.instruction
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn is_scheduling_barrier(&self) -> bool {
        self.is_scheduling_barrier
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    pub fn set_latency(&mut self, latency: u32) {
        self.latency = latency;
    }

    pub fn internal_latency(&self) -> u32 {
        self.internal_latency
    }

    pub fn set_internal_latency(&mut self, internal_latency: u32) {
        self.internal_latency = internal_latency;
    }

    pub fn critical_path(&self) -> u32 {
        self.critical_path
    }

    pub fn maybe_update_critical_path(&mut self, path: u32) {
        self.critical_path = self.critical_path.max(path);
    }

    pub fn data_predecessors(&self) -> &[NodeId] {
        &self.data_predecessors
    }

    pub fn other_predecessors(&self) -> &[NodeId] {
        &self.other_predecessors
    }

    pub fn has_data_dependency(&self, node: NodeId) -> bool {
        self.data_predecessors.contains(&node)
    }

    pub fn has_other_dependency(&self, node: NodeId) -> bool {
        self.other_predecessors.contains(&node)
    }

    /// Record a data predecessor. Returns false if it was already present.
    pub(super) fn add_data_predecessor(&mut self, predecessor: NodeId) -> bool {
        if self.has_data_dependency(predecessor) {
            return false;
        }
        self.data_predecessors.push(predecessor);
        true
    }

    /// Record a non-data predecessor. Returns false if the pair is already
    /// linked by either kind of edge.
    pub(super) fn add_other_predecessor(&mut self, predecessor: NodeId) -> bool {
        if self.has_other_dependency(predecessor) || self.has_data_dependency(predecessor) {
            return false;
        }
        self.other_predecessors.push(predecessor);
        true
    }

    pub fn unscheduled_successors(&self) -> u32 {
        self.unscheduled_successors
    }

    pub fn has_unscheduled_successors(&self) -> bool {
        self.unscheduled_successors != 0
    }

    pub(super) fn increment_unscheduled_successors(&mut self) {
        self.unscheduled_successors += 1;
    }

    /// Note that one successor has been scheduled.
    pub fn decrement_unscheduled_successors(&mut self, describe: impl FnOnce() -> String) -> SchedResult<()> {
        match self.unscheduled_successors.checked_sub(1) {
            Some(count) => {
                self.unscheduled_successors = count;
                Ok(())
            }
            None => Err(SchedError::SuccessorUnderflow { inst: describe() }),
        }
    }
}
