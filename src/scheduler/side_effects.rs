//! Side-effect dependencies between instructions that have no def-use link.
//!
//! `instr1` is always the instruction that comes later in program order and
//! `instr2` the earlier one, but every check here is symmetric.

use crate::analysis::HeapLocationCollector;
use crate::ir::{Graph, InstId, Instruction};

/// Decides whether two instructions of a block may be reordered with respect
/// to their heap accesses and exceptions.
#[derive(Debug, Clone, Copy)]
pub struct SideEffectDependencyAnalysis<'a> {
    heap_location_collector: Option<&'a HeapLocationCollector>,
}

impl<'a> SideEffectDependencyAnalysis<'a> {
    pub fn new(heap_location_collector: Option<&'a HeapLocationCollector>) -> Self {
        Self {
            heap_location_collector,
        }
    }

    pub fn has_side_effect_dependency(&self, graph: &Graph, instr1: InstId, instr2: InstId) -> bool {
        if self.has_memory_dependency(graph, instr1, instr2) {
            return true;
        }

        // Even without a memory dependency, throwing instructions stay ordered
        // with respect to writes and to each other.
        has_exception_dependency(graph.inst(instr1), graph.inst(instr2))
    }

    pub fn has_memory_dependency(&self, graph: &Graph, instr1: InstId, instr2: InstId) -> bool {
        let (i1, i2) = (graph.inst(instr1), graph.inst(instr2));
        if !has_reordering_dependency(i1, i2) {
            return false;
        }

        let collector = match self.heap_location_collector {
            Some(collector) if collector.number_of_heap_locations() > 0 => collector,
            _ => return true,
        };

        let array_like = |inst: &Instruction| {
            inst.kind.is_array_access() || inst.kind.is_vec_memory_operation()
        };
        if (array_like(i1) && array_like(i2))
            || (i1.kind.is_field_access() && i2.kind.is_field_access())
        {
            return match (collector.location_of(instr1), collector.location_of(instr2)) {
                (Some(loc1), Some(loc2)) => collector.may_alias(loc1, loc2),
                _ => true,
            };
        }

        // Heap accesses of different kinds do not alias.
        if (array_like(i1) && i2.kind.is_field_access())
            || (i1.kind.is_field_access() && array_like(i2))
        {
            return false;
        }

        // Calls, allocations and everything else with unknown locations.
        true
    }
}

/// Read-after-write, write-after-read or write-after-write on the heap.
pub fn has_reordering_dependency(instr1: &Instruction, instr2: &Instruction) -> bool {
    let (effects1, effects2) = (instr1.side_effects, instr2.side_effects);
    effects1.may_depend_on(effects2)
        || effects2.may_depend_on(effects1)
        || (effects1.does_any_write() && effects2.does_any_write())
}

pub fn has_exception_dependency(instr1: &Instruction, instr2: &Instruction) -> bool {
    if instr2.can_throw() && instr1.side_effects.does_any_write() {
        return true;
    }
    if instr2.side_effects.does_any_write() && instr1.can_throw() {
        return true;
    }
    instr2.can_throw() && instr1.can_throw()
}
