//! Latency model interface.
//!
//! A latency visitor assigns every scheduled instruction two costs: the
//! latency seen by its users and the internal latency of its own lowering.
//! Targets implement [`LatencyVisitor::visit`] with one explicit case per
//! instruction kind they schedule; anything else is reported as
//! [`SchedError::UnhandledInstruction`] instead of getting a made-up cost.

use super::node::SchedulingNode;
use crate::core::error::{SchedError, SchedResult};
use crate::ir::{Graph, InstId, InstructionSet};

pub trait LatencyVisitor {
    fn instruction_set(&self) -> InstructionSet;

    /// Record the latencies of `instruction`. The internal latency has been
    /// reset to zero before the call.
    fn visit(&mut self, graph: &Graph, instruction: InstId) -> SchedResult<()>;

    fn last_visited_latency(&self) -> u32;

    fn last_visited_internal_latency(&self) -> u32;

    fn reset_internal_latency(&mut self);

    /// Visit the node's instruction and store the result on the node.
    fn calculate_latency(&mut self, graph: &Graph, node: &mut SchedulingNode<'_>) -> SchedResult<()> {
        self.reset_internal_latency();
        self.visit(graph, node.instruction())?;
        node.set_latency(self.last_visited_latency());
        node.set_internal_latency(self.last_visited_internal_latency());
        Ok(())
    }

    /// Error for an instruction kind this visitor has no case for.
    fn unhandled(&self, graph: &Graph, instruction: InstId) -> SchedError {
        SchedError::UnhandledInstruction {
            isa: self.instruction_set(),
            kind: graph.inst(instruction).debug_name(),
            inst: graph.describe(instruction),
        }
    }
}
