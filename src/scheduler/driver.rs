// This module implements the list scheduling driver. For every eligible block (all instructions
// schedulable for the target, outside of try regions and, by default, inside a loop) it builds
// the SchedulingGraph in reverse program order, asks the target's latency visitor for the cost
// of each node, seeds the candidate list with the nodes that have no successors and then pops
// candidates through the configured NodeSelector until every node is placed. Popping walks the
// block from its end towards its start, so the instruction order is collected back to front,
// checked to be a permutation of the original block and only then written back. Every graph
// lives in the session arena, which is reset once the block is done.

//! Backward list scheduling of basic blocks.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use super::graph::SchedulingGraph;
use super::node::NodeId;
use super::selector::{CriticalPathSchedulingNodeSelector, NodeSelector, RandomSchedulingNodeSelector};
use super::target::{target_for, SchedulingTarget};
use crate::analysis::HeapLocationCollector;
use crate::core::error::{SchedError, SchedResult};
use crate::core::session::{SchedulingSession, SchedulingStats};
use crate::ir::{BlockId, Graph, InstId, InstructionSet};

/// Configuration of the scheduling pass.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Only schedule blocks that belong to a loop.
    pub only_optimize_loop_blocks: bool,
    /// Pick candidates at random instead of by critical path.
    pub schedule_randomly: bool,
    /// Seed for random scheduling; taken from the clock when absent.
    pub random_seed: Option<u64>,
    /// Append the dependency graph of every scheduled block to this file.
    pub dump_dot: Option<PathBuf>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            only_optimize_loop_blocks: true,
            schedule_randomly: false,
            random_seed: None,
            dump_dot: None,
        }
    }
}

/// List scheduler for one target and one selection strategy.
pub struct Scheduler<'s> {
    target: &'s dyn SchedulingTarget,
    selector: &'s mut dyn NodeSelector,
    only_optimize_loop_blocks: bool,
    dump_dot: Option<PathBuf>,
}

impl<'s> Scheduler<'s> {
    pub fn new(target: &'s dyn SchedulingTarget, selector: &'s mut dyn NodeSelector) -> Self {
        Self {
            target,
            selector,
            only_optimize_loop_blocks: true,
            dump_dot: None,
        }
    }

    pub fn set_only_optimize_loop_blocks(&mut self, only_loop_blocks: bool) {
        self.only_optimize_loop_blocks = only_loop_blocks;
    }

    pub fn set_dump_dot(&mut self, path: Option<PathBuf>) {
        self.dump_dot = path;
    }

    /// Schedule every eligible block of `graph` in reverse post order.
    pub fn schedule(&mut self, graph: &mut Graph, session: &mut SchedulingSession) -> SchedResult<()> {
        session.set_current_method(&graph.name);

        // Alias information only pays off when some block will be scheduled.
        let heap_location_collector = if !self.only_optimize_loop_blocks || graph.has_loops() {
            Some(HeapLocationCollector::build(graph))
        } else {
            None
        };

        for block in graph.reverse_post_order().to_vec() {
            session.record_block_visited();
            if self.is_schedulable_block(graph, block) {
                self.schedule_block(graph, block, heap_location_collector.as_ref(), session)?;
            }
        }
        Ok(())
    }

    /// Whether every instruction of `block` may be reordered.
    pub fn is_schedulable_block(&self, graph: &Graph, block: BlockId) -> bool {
        let bb = graph.block(block);
        if self.only_optimize_loop_blocks && !bb.is_in_loop() {
            return false;
        }
        if bb.in_try {
            // Exception edges leave from arbitrary points of the block.
            return false;
        }
        bb.instructions
            .iter()
            .all(|&inst| self.target.is_schedulable(graph, inst))
    }

    /// Schedule one block and commit the new order.
    pub fn schedule_block(
        &mut self,
        graph: &mut Graph,
        block: BlockId,
        heap_location_collector: Option<&HeapLocationCollector>,
        session: &mut SchedulingSession,
    ) -> SchedResult<()> {
        if graph.block(block).instructions.len() <= 1 {
            return Ok(());
        }

        let result = self.compute_block_order(graph, block, heap_location_collector, session);
        session.end_block();
        let order = result?;

        let bb = graph.block(block);
        let moved = bb
            .instructions
            .iter()
            .zip(&order)
            .filter(|(before, after)| before != after)
            .count();
        log::debug!(
            "scheduled block {} of {}: {} instructions, {} moved",
            bb.name,
            graph.name,
            order.len(),
            moved
        );
        session.record_block_scheduled(order.len(), moved);
        graph.block_mut(block).instructions = order;
        Ok(())
    }

    fn compute_block_order(
        &mut self,
        graph: &Graph,
        block: BlockId,
        heap_location_collector: Option<&HeapLocationCollector>,
        session: &SchedulingSession,
    ) -> SchedResult<Vec<InstId>> {
        let mut sched = SchedulingGraph::new(session.arena(), graph, block, heap_location_collector);
        let mut latency_visitor = self.target.latency_visitor();

        // Build the dependency graph backward.
        for &inst in graph.block(block).instructions.iter().rev() {
            let is_barrier = self.target.is_scheduling_barrier(graph, inst);
            let node = sched.add_node(inst, is_barrier)?;
            latency_visitor.calculate_latency(graph, sched.node_mut(node))?;
        }
        session.record_edges(sched.data_edges(), sched.other_edges());

        let mut candidates = Vec::new();
        for id in sched.node_ids() {
            let node = sched.node_mut(id);
            if !node.has_unscheduled_successors() {
                let latency = node.latency();
                node.maybe_update_critical_path(latency);
                candidates.push(id);
            }
        }

        if let Some(path) = &self.dump_dot {
            let description = format!("{} {}", graph.name, graph.block(block).name);
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let mut output = BufWriter::new(file);
            sched.dump_as_dot_graph(&description, &candidates, &mut output)?;
            output.flush()?;
        }

        self.selector.reset();
        let mut order = Vec::with_capacity(sched.size());
        while !candidates.is_empty() {
            let node = self.selector.pop_highest_priority_node(&mut candidates, &sched);
            log::trace!(
                "picked {} (critical path {})",
                sched.describe(node),
                sched.node(node).critical_path()
            );
            order.push(sched.node(node).instruction());
            schedule_node(&mut sched, node, &mut candidates)?;
        }
        order.reverse();

        let block_name = || graph.block(block).name.clone();
        let original = &graph.block(block).instructions;
        if order.len() != original.len() {
            return Err(SchedError::UnscheduledNodes {
                block: block_name(),
                count: original.len().saturating_sub(order.len()),
            });
        }
        let mut sorted_order = order.clone();
        sorted_order.sort_unstable();
        let mut sorted_original = original.clone();
        sorted_original.sort_unstable();
        if sorted_order != sorted_original {
            return Err(SchedError::NotAPermutation { block: block_name() });
        }
        Ok(order)
    }
}

/// Release the predecessors of a node that was just placed and update their
/// critical paths.
fn schedule_node(
    sched: &mut SchedulingGraph<'_, '_>,
    node: NodeId,
    candidates: &mut Vec<NodeId>,
) -> SchedResult<()> {
    let graph = sched.graph();
    let path_to_node = sched.node(node).critical_path();
    let internal_latency = sched.node(node).internal_latency();

    for i in 0..sched.node(node).data_predecessors().len() {
        let predecessor = sched.node(node).data_predecessors()[i];
        let instruction = sched.node(predecessor).instruction();
        let pred = sched.node_mut(predecessor);
        let path = pred.latency() + internal_latency + path_to_node;
        pred.maybe_update_critical_path(path);
        pred.decrement_unscheduled_successors(|| graph.describe(instruction))?;
        if !pred.has_unscheduled_successors() {
            let latency = pred.latency();
            pred.maybe_update_critical_path(latency);
            candidates.push(predecessor);
        }
    }

    for i in 0..sched.node(node).other_predecessors().len() {
        let predecessor = sched.node(node).other_predecessors()[i];
        let instruction = sched.node(predecessor).instruction();
        let pred = sched.node_mut(predecessor);
        pred.decrement_unscheduled_successors(|| graph.describe(instruction))?;
        if !pred.has_unscheduled_successors() {
            let latency = pred.latency();
            pred.maybe_update_critical_path(latency);
            candidates.push(predecessor);
        }
    }
    Ok(())
}

/// The instruction scheduling pass.
pub struct InstructionScheduling {
    instruction_set: InstructionSet,
    options: SchedulerOptions,
}

impl InstructionScheduling {
    pub fn new(instruction_set: InstructionSet, options: SchedulerOptions) -> SchedResult<Self> {
        target_for(instruction_set)?;
        Ok(Self {
            instruction_set,
            options,
        })
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Schedule `graph` in place and return what was done.
    pub fn run(&self, graph: &mut Graph) -> SchedResult<SchedulingStats> {
        let target = target_for(self.instruction_set)?;
        let mut critical_path_selector = CriticalPathSchedulingNodeSelector::new();
        let mut random_selector;
        let selector: &mut dyn NodeSelector = if self.options.schedule_randomly {
            random_selector = match self.options.random_seed {
                Some(seed) => RandomSchedulingNodeSelector::with_seed(seed),
                None => RandomSchedulingNodeSelector::new(),
            };
            &mut random_selector
        } else {
            &mut critical_path_selector
        };

        let mut session = SchedulingSession::new();
        let mut scheduler = Scheduler::new(target.as_ref(), selector);
        scheduler.set_only_optimize_loop_blocks(self.options.only_optimize_loop_blocks);
        scheduler.set_dump_dot(self.options.dump_dot.clone());
        scheduler.schedule(graph, &mut session)?;

        let stats = session.stats();
        log::debug!("{}: {}", graph.name, stats);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP: &str = r#"
method m(%a: ref, %n: i32) {
entry:
  %zero = const.i32 0
  %one = const.i32 1
  goto ^header
header:
  %i = phi.i32 [^entry, %zero], [^body, %next]
  %cond = ge.bool %i, %n
  if %cond, ^exit, ^body
body:
  %x = aget.i32 %a, %i
  %y = mul.i32 %x, %x
  %z = add.i32 %x, %one
  aset.i32 %a, %i, %y
  %next = add.i32 %i, %one
  goto ^header
exit:
  returnvoid
}
"#;

    #[test]
    fn test_block_eligibility() {
        let graph = Graph::parse(LOOP).unwrap();
        let target = target_for(InstructionSet::Arm64).unwrap();
        let mut selector = CriticalPathSchedulingNodeSelector::new();
        let mut scheduler = Scheduler::new(target.as_ref(), &mut selector);
        let block = |name: &str| graph.block_by_name(name).unwrap();

        assert!(!scheduler.is_schedulable_block(&graph, block("entry")));
        assert!(scheduler.is_schedulable_block(&graph, block("header")));
        assert!(scheduler.is_schedulable_block(&graph, block("body")));
        assert!(!scheduler.is_schedulable_block(&graph, block("exit")));

        scheduler.set_only_optimize_loop_blocks(false);
        assert!(scheduler.is_schedulable_block(&graph, block("entry")));
        assert!(scheduler.is_schedulable_block(&graph, block("exit")));
    }

    #[test]
    fn test_schedule_loop_body() {
        let mut graph = Graph::parse(LOOP).unwrap();
        let stats = InstructionScheduling::new(InstructionSet::Arm64, SchedulerOptions::default())
            .unwrap()
            .run(&mut graph)
            .unwrap();
        assert_eq!(stats.blocks_visited, 4);
        assert_eq!(stats.blocks_scheduled, 2);

        let body = graph.block(graph.block_by_name("body").unwrap());
        let names: Vec<&str> = body
            .instructions
            .iter()
            .map(|&inst| graph.inst(inst).debug_name())
            .collect();
        // The store moves up behind the multiply feeding it, the increment of
        // the induction variable stays after its last use.
        assert_eq!(
            names,
            ["ArrayGet", "Mul", "ArraySet", "Add", "Add", "Goto"]
        );
        let next = graph.inst_by_name("next").unwrap();
        assert_eq!(body.instructions[4], next);
        assert_eq!(stats.instructions_moved, 2);
    }
}
