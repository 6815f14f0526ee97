// This module provides the arena-based scheduling session using the bumpalo crate. A
// SchedulingSession owns the Bump arena that backs every scheduling node, predecessor list and
// instruction-to-node map of the block currently being scheduled, so none of these need
// individual lifetimes or frees: the arena is reset wholesale once a block has been committed.
// The session also accumulates SchedulingStats (blocks visited and scheduled, nodes built,
// data and other dependency edges, instructions whose position changed) through interior
// mutability, so the scheduler can record progress while the arena is borrowed.

//! Arena-based scheduling session management.

use bumpalo::Bump;
use std::cell::RefCell;
use std::fmt;

/// Per-method scheduling session.
///
/// Everything allocated through [`SchedulingSession::arena`] lives until the
/// next [`SchedulingSession::end_block`].
pub struct SchedulingSession {
    /// Arena for the block being scheduled.
    arena: Bump,

    /// Statistics accumulated over the session.
    stats: RefCell<SchedulingStats>,

    /// Method being scheduled, for diagnostics.
    current_method: RefCell<Option<String>>,
}

impl Default for SchedulingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulingSession {
    pub fn new() -> Self {
        Self {
            arena: Bump::new(),
            stats: RefCell::new(SchedulingStats::default()),
            current_method: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &Bump {
        &self.arena
    }

    /// Release everything allocated for the current block.
    pub fn end_block(&mut self) {
        log::trace!(
            "releasing {} bytes of scheduling arena",
            self.arena.allocated_bytes()
        );
        self.arena.reset();
    }

    pub fn set_current_method(&self, name: &str) {
        *self.current_method.borrow_mut() = Some(name.to_string());
    }

    pub fn current_method(&self) -> Option<String> {
        self.current_method.borrow().clone()
    }

    /// Record that a block was considered for scheduling.
    pub fn record_block_visited(&self) {
        self.stats.borrow_mut().blocks_visited += 1;
    }

    /// Record a block that was scheduled and committed.
    pub fn record_block_scheduled(&self, nodes: usize, instructions_moved: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.blocks_scheduled += 1;
        stats.nodes += nodes;
        stats.instructions_moved += instructions_moved;
    }

    /// Record the dependency edges of a block's scheduling graph.
    pub fn record_edges(&self, data_edges: usize, other_edges: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.data_edges += data_edges;
        stats.other_edges += other_edges;
    }

    /// Get scheduling statistics.
    pub fn stats(&self) -> SchedulingStats {
        self.stats.borrow().clone()
    }
}

/// Scheduling statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulingStats {
    /// Blocks considered by the scheduler.
    pub blocks_visited: usize,

    /// Blocks that passed the eligibility checks and were re-ordered.
    pub blocks_scheduled: usize,

    /// Scheduling nodes created.
    pub nodes: usize,

    /// Data dependency edges.
    pub data_edges: usize,

    /// Barrier, side-effect, environment and cross-iteration edges.
    pub other_edges: usize,

    /// Instructions whose position in their block changed.
    pub instructions_moved: usize,
}

impl SchedulingStats {
    /// Accumulate another session's statistics.
    pub fn merge(&mut self, other: &SchedulingStats) {
        self.blocks_visited += other.blocks_visited;
        self.blocks_scheduled += other.blocks_scheduled;
        self.nodes += other.nodes;
        self.data_edges += other.data_edges;
        self.other_edges += other.other_edges;
        self.instructions_moved += other.instructions_moved;
    }
}

impl fmt::Display for SchedulingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Instruction Scheduling Statistics:")?;
        writeln!(f, "  Blocks visited: {}", self.blocks_visited)?;
        writeln!(f, "  Blocks scheduled: {}", self.blocks_scheduled)?;
        writeln!(f, "  Scheduling nodes: {}", self.nodes)?;
        writeln!(f, "  Data edges: {}", self.data_edges)?;
        writeln!(f, "  Other edges: {}", self.other_edges)?;
        writeln!(f, "  Instructions moved: {}", self.instructions_moved)?;
        Ok(())
    }
}
