// This module implements the SchedulingGraph, the dependency DAG of one basic block. Nodes are
// added in reverse program order and each one immediately receives its dependency edges
// against the nodes already present, which are exactly the instructions that follow it in the
// block. Edges come in two flavors: data edges (a user depends on the definition of its input)
// and "other" edges, which cover scheduling barriers, heap and exception side effects,
// environment uses and the cross-iteration heuristic on loop header phis. Every node and
// predecessor list lives in the per-block bumpalo arena, and the instruction-to-node lookup is
// a hashbrown map allocated in the same arena, so the whole graph is released by resetting it.

//! Dependency graph of one basic block.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use hashbrown::{DefaultHashBuilder, HashMap};

use super::node::{NodeId, SchedulingNode};
use super::side_effects::SideEffectDependencyAnalysis;
use crate::analysis::HeapLocationCollector;
use crate::core::error::{SchedError, SchedResult};
use crate::ir::{BlockId, Graph, InstId};

type ArenaMap<'bump, K, V> = HashMap<K, V, DefaultHashBuilder, &'bump Bump>;

/// Directed acyclic graph for scheduling one block.
pub struct SchedulingGraph<'a, 'bump> {
    graph: &'a Graph,
    block: BlockId,
    contains_scheduling_barrier: bool,
    nodes: BumpVec<'bump, SchedulingNode<'bump>>,
    nodes_map: ArenaMap<'bump, InstId, NodeId>,
    positions: ArenaMap<'bump, InstId, u32>,
    side_effect_dependency_analysis: SideEffectDependencyAnalysis<'a>,
    arena: &'bump Bump,
    data_edges: usize,
    other_edges: usize,
}

impl<'a, 'bump> SchedulingGraph<'a, 'bump> {
    pub fn new(
        arena: &'bump Bump,
        graph: &'a Graph,
        block: BlockId,
        heap_location_collector: Option<&'a HeapLocationCollector>,
    ) -> Self {
        let instructions = &graph.block(block).instructions;
        let mut positions = HashMap::with_capacity_in(instructions.len(), arena);
        for (position, inst) in instructions.iter().enumerate() {
            positions.insert(*inst, position as u32);
        }
        Self {
            graph,
            block,
            contains_scheduling_barrier: false,
            nodes: BumpVec::with_capacity_in(instructions.len(), arena),
            nodes_map: HashMap::with_capacity_in(instructions.len(), arena),
            positions,
            side_effect_dependency_analysis: SideEffectDependencyAnalysis::new(heap_location_collector),
            arena,
            data_edges: 0,
            other_edges: 0,
        }
    }

    /// Create the node for `instruction` and add its dependencies on the
    /// nodes already in the graph.
    pub fn add_node(&mut self, instruction: InstId, is_scheduling_barrier: bool) -> SchedResult<NodeId> {
        let position = match self.positions.get(&instruction) {
            Some(position) if self.graph.inst(instruction).block == self.block => *position,
            _ => return Err(self.outside_block(instruction)),
        };
        let node = NodeId(self.nodes.len() as u32);
        self.nodes.push(SchedulingNode::new(
            self.arena,
            instruction,
            position,
            is_scheduling_barrier,
        ));
        self.nodes_map.insert(instruction, node);
        self.contains_scheduling_barrier |= is_scheduling_barrier;
        self.add_dependencies(node, is_scheduling_barrier)?;
        Ok(node)
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_scheduling_barrier(&self) -> bool {
        self.contains_scheduling_barrier
    }

    pub fn get_node(&self, instruction: InstId) -> Option<NodeId> {
        self.nodes_map.get(&instruction).copied()
    }

    pub fn node(&self, id: NodeId) -> &SchedulingNode<'bump> {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SchedulingNode<'bump> {
        &mut self.nodes[id.index()]
    }

    /// Node handles in creation order, i.e. reverse program order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn data_edges(&self) -> usize {
        self.data_edges
    }

    pub fn other_edges(&self) -> usize {
        self.other_edges
    }

    /// Whether `instruction` directly uses the value of `other`.
    pub fn has_immediate_data_dependency(&self, instruction: InstId, other: InstId) -> bool {
        match (self.get_node(instruction), self.get_node(other)) {
            (Some(node), Some(other)) => self.node(node).has_data_dependency(other),
            _ => false,
        }
    }

    /// Whether `instruction` has a non-data edge to `other`.
    pub fn has_immediate_other_dependency(&self, instruction: InstId, other: InstId) -> bool {
        match (self.get_node(instruction), self.get_node(other)) {
            (Some(node), Some(other)) => self.node(node).has_other_dependency(other),
            _ => false,
        }
    }

    /// Describe a node's instruction for diagnostics.
    pub fn describe(&self, id: NodeId) -> String {
        self.graph.describe(self.node(id).instruction())
    }

    fn outside_block(&self, instruction: InstId) -> SchedError {
        SchedError::InstructionOutsideBlock {
            inst: self.graph.describe(instruction),
            actual: self.graph.block(self.graph.inst(instruction).block).name.clone(),
            expected: self.graph.block(self.block).name.clone(),
        }
    }

    fn add_data_dependency(&mut self, node: NodeId, dependency: NodeId) {
        if self.nodes[node.index()].add_data_predecessor(dependency) {
            self.nodes[dependency.index()].increment_unscheduled_successors();
            self.data_edges += 1;
        }
    }

    fn add_other_dependency(&mut self, node: NodeId, dependency: NodeId) {
        if self.nodes[node.index()].add_other_predecessor(dependency) {
            self.nodes[dependency.index()].increment_unscheduled_successors();
            self.other_edges += 1;
        }
    }

    /// Node of an instruction that follows the one being added.
    fn following_node(&self, other: InstId) -> SchedResult<NodeId> {
        self.get_node(other).ok_or_else(|| self.outside_block(other))
    }

    fn add_dependencies(&mut self, node: NodeId, is_scheduling_barrier: bool) -> SchedResult<()> {
        let graph = self.graph;
        let instruction = self.nodes[node.index()].instruction();
        let position = self.nodes[node.index()].position() as usize;
        let following = &graph.block(self.block).instructions[position + 1..];
        let inst = graph.inst(instruction);

        // Define-use dependencies.
        for &user in graph.uses(instruction) {
            if let Some(user_node) = self.get_node(user) {
                self.add_data_dependency(user_node, node);
            }
        }

        // A barrier depends on the instructions after it, and the
        // instructions before a barrier depend on it.
        if self.contains_scheduling_barrier {
            for &other in following {
                let other_node = self.following_node(other)?;
                let other_is_barrier = self.nodes[other_node.index()].is_scheduling_barrier();
                if is_scheduling_barrier || other_is_barrier {
                    self.add_other_dependency(other_node, node);
                }
                if other_is_barrier {
                    // That barrier already orders everything after it.
                    break;
                }
            }
        }

        // Side-effect dependencies.
        if !inst.side_effects.is_empty() {
            for &other in following {
                let other_node = self.following_node(other)?;
                if self.nodes[other_node.index()].is_scheduling_barrier() {
                    break;
                }
                if self
                    .side_effect_dependency_analysis
                    .has_side_effect_dependency(graph, other, instruction)
                {
                    self.add_other_dependency(other_node, node);
                }
            }
        }

        // Environment dependencies. Holders may live in other blocks.
        if !is_scheduling_barrier {
            for &holder in graph.env_uses(instruction) {
                if let Some(holder_node) = self.get_node(holder) {
                    self.add_other_dependency(holder_node, node);
                }
            }
        }

        self.add_cross_iteration_dependencies(node);
        Ok(())
    }

    /// A loop header phi input means the value comes from the previous
    /// iteration. The instruction defining the phi's next value is kept after
    /// this use so both can share a register, unless the definition has other
    /// users.
    fn add_cross_iteration_dependencies(&mut self, node: NodeId) {
        let graph = self.graph;
        let instruction = self.nodes[node.index()].instruction();
        for &input in &graph.inst(instruction).inputs {
            if !graph.is_loop_header_phi(input) {
                continue;
            }
            for &phi_input in &graph.inst(input).inputs {
                let Some(def_node) = self.get_node(phi_input) else {
                    continue;
                };
                if def_node != node && graph.uses(phi_input).len() == 1 {
                    self.add_other_dependency(def_node, node);
                }
            }
        }
    }
}
