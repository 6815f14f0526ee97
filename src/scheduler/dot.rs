//! Graphviz output of a scheduling graph.
//!
//! Program order runs top to bottom: edges are written from predecessor to
//! dependent node with `dir=back`. Data edges carry the predecessor's latency,
//! other edges are blue. Initial candidates feed a synthetic
//! `end_of_scheduling` node so critical paths are easy to follow.

use std::io::{self, Write};

use super::graph::SchedulingGraph;
use super::node::NodeId;

impl SchedulingGraph<'_, '_> {
    pub fn dump_as_dot_graph(
        &self,
        description: &str,
        initial_candidates: &[NodeId],
        output: &mut impl Write,
    ) -> io::Result<()> {
        writeln!(output, "// {}", description)?;
        writeln!(output, "digraph G {{")?;

        // Reverse creation order is program order.
        let mut ids: Vec<NodeId> = self.node_ids().collect();
        ids.reverse();
        for id in ids {
            self.dump_as_dot_node(id, output)?;
        }

        for &candidate in initial_candidates {
            let node = self.node(candidate);
            writeln!(
                output,
                "{}:s -> end_of_scheduling:n [label=\"{}\",dir=back]",
                self.graph().type_id(node.instruction()),
                node.latency()
            )?;
        }
        writeln!(output, "}}")
    }

    fn dump_as_dot_node(&self, id: NodeId, output: &mut impl Write) -> io::Result<()> {
        let graph = self.graph();
        let node = self.node(id);
        let instruction = node.instruction();
        let instruction_id = graph.type_id(instruction);

        let inputs: Vec<String> = graph
            .inst(instruction)
            .inputs
            .iter()
            .map(|input| graph.type_id(*input))
            .collect();
        write!(
            output,
            "{}[shape=record, label=\"{} {} [{}]\\ninternal_latency: {}\\ncritical_path: {}",
            instruction_id,
            instruction_id,
            graph.inst(instruction).debug_name(),
            inputs.join(","),
            node.internal_latency(),
            node.critical_path()
        )?;
        if node.is_scheduling_barrier() {
            write!(output, "\\n(barrier)")?;
        }
        writeln!(output, "\"];")?;

        for &predecessor in node.data_predecessors() {
            let predecessor = self.node(predecessor);
            writeln!(
                output,
                "{}:s -> {}:n [label=\"{}\",dir=back]",
                graph.type_id(predecessor.instruction()),
                instruction_id,
                predecessor.latency()
            )?;
        }
        for &predecessor in node.other_predecessors() {
            writeln!(
                output,
                "{}:s -> {}:n [dir=back,color=blue]",
                graph.type_id(self.node(predecessor).instruction()),
                instruction_id
            )?;
        }
        Ok(())
    }
}
