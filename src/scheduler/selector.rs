//! Candidate selection strategies.
//!
//! The scheduling loop walks a block backward, so the node popped first ends
//! up last in the block. Both selectors remove exactly one node from the
//! candidate list per call and must never be called with an empty list.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

use super::graph::SchedulingGraph;
use super::node::NodeId;
use crate::ir::{Graph, InstId, InstructionKind};

pub trait NodeSelector {
    /// Forget per-block state before a new block is scheduled.
    fn reset(&mut self) {}

    fn pop_highest_priority_node(
        &mut self,
        candidates: &mut Vec<NodeId>,
        graph: &SchedulingGraph<'_, '_>,
    ) -> NodeId;
}

/// Uniformly random selection, for stress testing the dependency graph.
pub struct RandomSchedulingNodeSelector {
    rng: StdRng,
    seed: u64,
}

impl RandomSchedulingNodeSelector {
    /// Seeded from the clock. The seed is logged so a run can be replayed.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u64) -> Self {
        log::info!("random instruction scheduling seed: {}", seed);
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for RandomSchedulingNodeSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeSelector for RandomSchedulingNodeSelector {
    fn pop_highest_priority_node(
        &mut self,
        candidates: &mut Vec<NodeId>,
        _graph: &SchedulingGraph<'_, '_>,
    ) -> NodeId {
        debug_assert!(!candidates.is_empty());
        let select = self.rng.gen_range(0..candidates.len());
        candidates.swap_remove(select)
    }
}

/// Picks the candidate that should start earliest in program order.
///
/// Candidates are compared by, in order:
/// 1. critical path, lowest first, so that the longest chains are popped
///    last and therefore start first;
/// 2. the materialized condition feeding the previous pick, so that it is
///    emitted right before its consumer;
/// 3. latency, lowest first;
/// 4. distance to the previous pick in the original order;
/// 5. original position, latest first.
#[derive(Debug, Default)]
pub struct CriticalPathSchedulingNodeSelector {
    prev_select: Option<NodeId>,
}

impl CriticalPathSchedulingNodeSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Condition of the previous pick that is only used by it.
    fn materialized_condition(&self, graph: &SchedulingGraph<'_, '_>) -> Option<InstId> {
        let prev = graph.node(self.prev_select?).instruction();
        let ir = graph.graph();
        let inst = ir.inst(prev);
        let condition = match inst.kind {
            InstructionKind::If => inst.inputs.first().copied(),
            // Operands are false value, true value, condition.
            InstructionKind::Select => inst.inputs.get(2).copied(),
            _ => None,
        }?;
        is_materialized_condition(ir, condition).then_some(condition)
    }

    fn is_higher_priority(
        &self,
        graph: &SchedulingGraph<'_, '_>,
        check: NodeId,
        candidate: NodeId,
        condition: Option<InstId>,
    ) -> bool {
        let (c, n) = (graph.node(check), graph.node(candidate));
        if c.critical_path() != n.critical_path() {
            return c.critical_path() < n.critical_path();
        }
        if let Some(condition) = condition {
            if c.instruction() == condition {
                return true;
            }
            if n.instruction() == condition {
                return false;
            }
        }
        if c.latency() != n.latency() {
            return c.latency() < n.latency();
        }
        if let Some(prev) = self.prev_select {
            let prev_position = graph.node(prev).position();
            let (dc, dn) = (
                c.position().abs_diff(prev_position),
                n.position().abs_diff(prev_position),
            );
            if dc != dn {
                return dc < dn;
            }
        }
        c.position() > n.position()
    }
}

fn is_materialized_condition(graph: &Graph, condition: InstId) -> bool {
    matches!(graph.inst(condition).kind, InstructionKind::Condition(_))
        && graph.uses(condition).len() == 1
}

impl NodeSelector for CriticalPathSchedulingNodeSelector {
    fn reset(&mut self) {
        self.prev_select = None;
    }

    fn pop_highest_priority_node(
        &mut self,
        candidates: &mut Vec<NodeId>,
        graph: &SchedulingGraph<'_, '_>,
    ) -> NodeId {
        debug_assert!(!candidates.is_empty());
        let condition = self.materialized_condition(graph);
        let mut select = 0;
        for i in 1..candidates.len() {
            if self.is_higher_priority(graph, candidates[i], candidates[select], condition) {
                select = i;
            }
        }
        let node = candidates.swap_remove(select);
        self.prev_select = Some(node);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    fn build<'a, 'bump>(arena: &'bump Bump, graph: &'a Graph) -> SchedulingGraph<'a, 'bump> {
        let block = graph.block_by_name("entry").unwrap();
        let mut sched = SchedulingGraph::new(arena, graph, block, None);
        for &inst in graph.block(block).instructions.iter().rev() {
            let is_barrier = graph.inst(inst).kind.is_control_flow();
            sched.add_node(inst, is_barrier).unwrap();
        }
        sched
    }

    fn node(sched: &SchedulingGraph<'_, '_>, name: &str) -> NodeId {
        sched.get_node(sched.graph().inst_by_name(name).unwrap()).unwrap()
    }

    const INDEPENDENT: &str = r#"
method m(%x: i32) {
entry:
  %a = add.i32 %x, %x
  %b = mul.i32 %x, %x
  %c = sub.i32 %x, %x
  %d = and.i32 %x, %x
  returnvoid
}
"#;

    #[test]
    fn test_critical_path_order() {
        let graph = Graph::parse(INDEPENDENT).unwrap();
        let arena = Bump::new();
        let mut sched = build(&arena, &graph);
        let (a, b, c, d) = (node(&sched, "a"), node(&sched, "b"), node(&sched, "c"), node(&sched, "d"));
        sched.node_mut(a).maybe_update_critical_path(9);
        for (id, latency) in [(b, 2), (c, 1), (d, 2)] {
            sched.node_mut(id).set_latency(latency);
            sched.node_mut(id).maybe_update_critical_path(3);
        }

        let mut selector = CriticalPathSchedulingNodeSelector::new();
        let mut candidates = vec![a, b, c, d];
        // Lowest critical path, then lowest latency.
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), c);
        // `b` and `d` are both next to `c`; the later one wins.
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), d);
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), b);
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), a);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_locality_tie_break() {
        let graph = Graph::parse(INDEPENDENT).unwrap();
        let arena = Bump::new();
        let sched = build(&arena, &graph);
        let (a, b, d) = (node(&sched, "a"), node(&sched, "b"), node(&sched, "d"));

        let mut selector = CriticalPathSchedulingNodeSelector::new();
        let mut candidates = vec![d];
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), d);
        // Position 0 is further from `d` than position 1.
        let mut candidates = vec![a, b];
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), b);

        selector.reset();
        // Without a previous pick the later instruction wins.
        let mut candidates = vec![a, d];
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), d);
    }

    #[test]
    fn test_materialized_condition_is_preferred() {
        let graph = Graph::parse(
            r#"
method m(%x: i32, %y: i32) {
entry:
  %c = lt.bool %x, %y
  %s = add.i32 %x, %y
  %t = add.i32 %y, %y
  %r = select.i32 %s, %t, %c
  return %r
}
"#,
        )
        .unwrap();
        let arena = Bump::new();
        let sched = build(&arena, &graph);
        let (c, s, t, r) = (node(&sched, "c"), node(&sched, "s"), node(&sched, "t"), node(&sched, "r"));

        let mut selector = CriticalPathSchedulingNodeSelector::new();
        let mut candidates = vec![r];
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), r);
        // `t` is closer to the select, but the condition goes first.
        let mut candidates = vec![s, t, c];
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), c);
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), s);
        assert_eq!(selector.pop_highest_priority_node(&mut candidates, &sched), t);
    }

    #[test]
    fn test_random_selector_replays_with_seed() {
        let graph = Graph::parse(INDEPENDENT).unwrap();
        let arena = Bump::new();
        let sched = build(&arena, &graph);
        let all: Vec<NodeId> = sched.node_ids().collect();

        let drain = |selector: &mut RandomSchedulingNodeSelector| {
            let mut candidates = all.clone();
            let mut picks = Vec::new();
            while !candidates.is_empty() {
                picks.push(selector.pop_highest_priority_node(&mut candidates, &sched));
            }
            picks
        };
        let mut first = RandomSchedulingNodeSelector::with_seed(7);
        let mut second = RandomSchedulingNodeSelector::with_seed(7);
        assert_eq!(first.seed(), 7);
        let picks = drain(&mut first);
        assert_eq!(picks, drain(&mut second));

        let mut sorted = picks.clone();
        sorted.sort();
        let mut expected = all.clone();
        expected.sort();
        assert_eq!(sorted, expected);
    }
}
