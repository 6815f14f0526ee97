//! Per-architecture scheduling hooks.

use super::latency::LatencyVisitor;
use crate::arm64::Arm64Target;
use crate::core::error::{SchedError, SchedResult};
use crate::ir::{Graph, InstId, InstructionKind, InstructionSet};

/// What a backend tells the scheduler about its instructions.
pub trait SchedulingTarget {
    fn instruction_set(&self) -> InstructionSet;

    /// Whether `instruction` may be part of a scheduled block. A single
    /// unschedulable instruction keeps its whole block in place.
    fn is_schedulable(&self, graph: &Graph, instruction: InstId) -> bool {
        is_schedulable(graph, instruction)
    }

    /// Whether no instruction may move across `instruction`.
    fn is_scheduling_barrier(&self, graph: &Graph, instruction: InstId) -> bool {
        is_scheduling_barrier(graph, instruction)
    }

    /// A fresh latency visitor for one block.
    fn latency_visitor(&self) -> Box<dyn LatencyVisitor>;
}

/// Target for an instruction set.
pub fn target_for(isa: InstructionSet) -> SchedResult<Box<dyn SchedulingTarget>> {
    match isa {
        InstructionSet::Arm64 => Ok(Box::new(Arm64Target)),
        isa => Err(SchedError::UnsupportedInstructionSet { isa }),
    }
}

/// Instruction kinds every target can schedule.
///
/// Excluded: class loading, monitors, throws and volatile field accesses.
pub fn is_schedulable(graph: &Graph, instruction: InstId) -> bool {
    use InstructionKind::*;
    let inst = graph.inst(instruction);
    let kind = inst.kind;
    if kind == Throw {
        return false;
    }
    if kind.is_control_flow() || kind.is_constant() {
        return true;
    }
    if kind.is_unary_operation() || kind.is_binary_operation() {
        return true;
    }
    if kind.is_field_access() {
        let is_volatile = inst.field.map_or(false, |field| graph.field(field).is_volatile);
        return !is_volatile;
    }
    matches!(
        kind,
        ArrayGet
            | ArraySet
            | ArrayLength
            | BoundType
            | BoundsCheck
            | CheckCast
            | DivZeroCheck
            | InstanceOf
            | Invoke
            | LoadString
            | NewArray
            | NewInstance { .. }
            | NullCheck
            | Parameter(_)
            | Phi
            | Select
            | SuspendCheck
            | TypeConversion
    )
}

/// Control flow keeps its place at the end of the block, parameters keep
/// the calling convention intact and suspend checks stay where the loop
/// back edge expects them.
pub fn is_scheduling_barrier(graph: &Graph, instruction: InstId) -> bool {
    let kind = graph.inst(instruction).kind;
    kind.is_control_flow()
        || matches!(kind, InstructionKind::Parameter(_) | InstructionKind::SuspendCheck)
}
