// This module holds the ARM64 (AArch64) scheduling target, the reference architecture of the
// scheduler. On top of the kinds every target schedules, ARM64 also schedules the shared
// instruction forms produced by its instruction simplifier (negated-right bitwise operations,
// multiply-accumulate, intermediate addresses and data processing with a shifter operand) and
// every SIMD operation. SIMD operations whose values cross between the scalar and the vector
// register file (reduce, extract scalar, set scalars, replicate scalar) are scheduling barriers,
// which keeps vector loop prologues and epilogues in place. The latency model lives in the
// latency submodule.

//! ARM64 scheduling target.

pub mod latency;

pub use latency::Arm64LatencyVisitor;

use crate::ir::{Graph, InstId, InstructionKind, InstructionSet, VecOp};
use crate::scheduler::latency::LatencyVisitor;
use crate::scheduler::target::{self, SchedulingTarget};

#[derive(Debug, Default, Clone, Copy)]
pub struct Arm64Target;

impl SchedulingTarget for Arm64Target {
    fn instruction_set(&self) -> InstructionSet {
        InstructionSet::Arm64
    }

    fn is_schedulable(&self, graph: &Graph, instruction: InstId) -> bool {
        let kind = graph.inst(instruction).kind;
        match kind {
            InstructionKind::BitwiseNegatedRight
            | InstructionKind::MultiplyAccumulate
            | InstructionKind::IntermediateAddress
            | InstructionKind::IntermediateAddressIndex
            | InstructionKind::DataProcWithShifterOp => true,
            InstructionKind::Vec(_) => true,
            _ => target::is_schedulable(graph, instruction),
        }
    }

    fn is_scheduling_barrier(&self, graph: &Graph, instruction: InstId) -> bool {
        matches!(
            graph.inst(instruction).kind,
            InstructionKind::Vec(
                VecOp::Reduce | VecOp::ExtractScalar | VecOp::SetScalars | VecOp::ReplicateScalar
            )
        ) || target::is_scheduling_barrier(graph, instruction)
    }

    fn latency_visitor(&self) -> Box<dyn LatencyVisitor> {
        Box::new(Arm64LatencyVisitor::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm64_additions() {
        let graph = Graph::parse(
            r#"
method m(%a: ref, %x: i32, %y: i32) {
entry:
  %bic = bic.i32 %x, %y
  %madd = madd.i32 %x, %y, %x
  %addr = iaddr.i32 %a, %x
  %shift = shifterop.i32 %x, %y
  %v = vreplicate.i32 %x
  %w = vadd.i32 %v, %v
  %s = vreduce.i32 %w
  %cls = loadclass.ref
  returnvoid
}
"#,
        )
        .unwrap();
        let target = Arm64Target;
        let id = |name: &str| graph.inst_by_name(name).unwrap();

        for name in ["bic", "madd", "addr", "shift", "v", "w", "s"] {
            assert!(target.is_schedulable(&graph, id(name)), "{}", name);
        }
        assert!(!target.is_schedulable(&graph, id("cls")));

        assert!(target.is_scheduling_barrier(&graph, id("v")));
        assert!(target.is_scheduling_barrier(&graph, id("s")));
        assert!(!target.is_scheduling_barrier(&graph, id("w")));
        assert!(target.is_scheduling_barrier(&graph, id("a")));
        assert!(!target.is_scheduling_barrier(&graph, id("madd")));
    }
}
