//! Integration tests for the instruction scheduler.
//!
//! Methods are written in the textual HIR, either inline or loaded from
//! `tests/data`, scheduled for ARM64 and checked against the dependency
//! graph of their original order.

use bumpalo::Bump;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tpde_sched::analysis::HeapLocationCollector;
use tpde_sched::arm64::Arm64LatencyVisitor;
use tpde_sched::ir::{BlockId, Graph, InstId, InstructionSet};
use tpde_sched::scheduler::latency::LatencyVisitor;
use tpde_sched::scheduler::{
    target_for, CriticalPathSchedulingNodeSelector, InstructionScheduling, Scheduler,
    SchedulerOptions, SchedulingGraph, SchedulingTarget,
};
use tpde_sched::{SchedError, SchedulingSession, SchedulingStats};

/// Load every method of a file in `tests/data`.
fn load_hir_file(filename: &str) -> Vec<Graph> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(filename);
    let contents = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    Graph::parse_all(&contents).unwrap_or_else(|e| panic!("Failed to parse {filename}: {e}"))
}

fn all_blocks() -> SchedulerOptions {
    SchedulerOptions {
        only_optimize_loop_blocks: false,
        ..SchedulerOptions::default()
    }
}

fn random(seed: u64) -> SchedulerOptions {
    SchedulerOptions {
        only_optimize_loop_blocks: false,
        schedule_randomly: true,
        random_seed: Some(seed),
        ..SchedulerOptions::default()
    }
}

fn schedule(graph: &Graph, options: SchedulerOptions) -> (Graph, SchedulingStats) {
    let mut scheduled = graph.clone();
    let stats = InstructionScheduling::new(InstructionSet::Arm64, options)
        .unwrap()
        .run(&mut scheduled)
        .unwrap();
    (scheduled, stats)
}

fn block_names<'g>(graph: &'g Graph, block: &str) -> Vec<&'g str> {
    graph
        .block(graph.block_by_name(block).unwrap())
        .instructions
        .iter()
        .map(|&inst| graph.inst(inst).debug_name())
        .collect()
}

/// Every dependency edge of the original block must point backward in the
/// new order.
fn assert_respects_dependencies(original: &Graph, scheduled: &Graph, block: BlockId) {
    let arena = Bump::new();
    let target = target_for(InstructionSet::Arm64).unwrap();
    let collector = HeapLocationCollector::build(original);
    let mut sched = SchedulingGraph::new(&arena, original, block, Some(&collector));
    for &inst in original.block(block).instructions.iter().rev() {
        sched
            .add_node(inst, target.is_scheduling_barrier(original, inst))
            .unwrap();
    }

    let position: HashMap<InstId, usize> = scheduled
        .block(block)
        .instructions
        .iter()
        .enumerate()
        .map(|(position, &inst)| (inst, position))
        .collect();
    for id in sched.node_ids() {
        let node = sched.node(id);
        for &pred in node.data_predecessors().iter().chain(node.other_predecessors()) {
            let pred = sched.node(pred).instruction();
            assert!(
                position[&pred] < position[&node.instruction()],
                "{} must stay before {} in {}:\n{}",
                original.describe(pred),
                original.describe(node.instruction()),
                original.name,
                scheduled
            );
        }
    }
}

/// No instruction crosses a barrier.
fn assert_barriers_in_place(original: &Graph, scheduled: &Graph, block: BlockId) {
    let target = target_for(InstructionSet::Arm64).unwrap();
    let before = &original.block(block).instructions;
    let after = &scheduled.block(block).instructions;
    for (position, &inst) in before.iter().enumerate() {
        if !target.is_scheduling_barrier(original, inst) {
            continue;
        }
        let new_position = after.iter().position(|&i| i == inst).unwrap();
        let mut expected = before[..position].to_vec();
        let mut actual = after[..new_position].to_vec();
        expected.sort();
        actual.sort();
        assert_eq!(expected, actual, "instructions moved across {}", original.describe(inst));
    }
}

fn assert_valid_schedule(original: &Graph, scheduled: &Graph) {
    // Scheduling only permutes block instruction lists.
    assert_eq!(original.instructions, scheduled.instructions);
    for block in original.block_ids() {
        let mut before = original.block(block).instructions.clone();
        let mut after = scheduled.block(block).instructions.clone();
        before.sort();
        after.sort();
        assert_eq!(before, after);
        assert_eq!(original.block(block).phis, scheduled.block(block).phis);
        assert_respects_dependencies(original, scheduled, block);
        assert_barriers_in_place(original, scheduled, block);
    }
}

#[test]
fn test_independent_constants_before_their_user() {
    let _ = env_logger::builder().is_test(true).try_init();

    let graph = Graph::parse(
        r#"
method m() {
entry:
  %i1 = const.i32 1
  %i2 = const.i32 2
  %i3 = add.i32 %i1, %i2
  return %i3
}
"#,
    )
    .unwrap();
    let (scheduled, stats) = schedule(&graph, all_blocks());
    assert_eq!(stats.blocks_scheduled, 1);

    let names = block_names(&scheduled, "entry");
    assert_eq!(names[2..], ["Add", "Return"]);
    assert_valid_schedule(&graph, &scheduled);

    for seed in 0..16 {
        let (scheduled, _) = schedule(&graph, random(seed));
        assert_eq!(block_names(&scheduled, "entry")[2..], ["Add", "Return"]);
    }
}

#[test]
fn test_disjoint_array_accesses_are_independent() {
    let graph = Graph::parse(
        r#"
method m(%a: ref, %i: i32, %v: i32) {
entry:
  %c0 = const.i32 0
  %c1 = const.i32 1
  %x = aget.i32 %a, %c0
  aset.i32 %a, %c1, %v
  %y = aget.i32 %a, %i
  aset.i32 %a, %i, %v
  returnvoid
}
"#,
    )
    .unwrap();
    let arena = Bump::new();
    let collector = HeapLocationCollector::build(&graph);
    let entry = graph.block_by_name("entry").unwrap();
    let mut sched = SchedulingGraph::new(&arena, &graph, entry, Some(&collector));
    let target = target_for(InstructionSet::Arm64).unwrap();
    for &inst in graph.block(entry).instructions.iter().rev() {
        sched.add_node(inst, target.is_scheduling_barrier(&graph, inst)).unwrap();
    }

    let instructions = &graph.block(entry).instructions;
    let (x, store_c1, y, store_i) = (instructions[5], instructions[6], instructions[7], instructions[8]);
    // a[0] and a[1] never overlap.
    assert!(!sched.has_immediate_other_dependency(store_c1, x));
    // a[i] may be a[1].
    assert!(sched.has_immediate_other_dependency(store_i, store_c1));
    assert!(sched.has_immediate_other_dependency(store_i, y));
    assert!(sched.has_immediate_other_dependency(y, store_c1));

    // Some random order swaps the disjoint load and store, none swaps the
    // others.
    let mut swapped = false;
    for seed in 0..64 {
        let (scheduled, _) = schedule(&graph, random(seed));
        assert_valid_schedule(&graph, &scheduled);
        let order = &scheduled.block(entry).instructions;
        let position = |inst| order.iter().position(|&i| i == inst).unwrap();
        swapped |= position(store_c1) < position(x);
        assert!(position(store_c1) < position(y));
        assert!(position(y) < position(store_i));
    }
    assert!(swapped);
}

#[test]
fn test_throwing_instruction_orders_stores() {
    let graph = Graph::parse(
        r#"
method m(%a: ref, %o: ref, %d: i32, %v: i32) {
entry:
  %c0 = const.i32 0
  %check = divzerocheck.i32 %d
  %q = div.i32 %v, %check
  iset.i32 %o, %v, @Point.x
  aset.i32 %a, %c0, %q
  return %q
}
"#,
    )
    .unwrap();
    let entry = graph.block_by_name("entry").unwrap();
    let instructions = graph.block(entry).instructions.clone();
    let (check, field_store) = (instructions[5], instructions[7]);

    for seed in 0..64 {
        let (scheduled, _) = schedule(&graph, random(seed));
        assert_valid_schedule(&graph, &scheduled);
        let order = &scheduled.block(entry).instructions;
        let position = |inst| order.iter().position(|&i| i == inst).unwrap();
        assert!(position(check) < position(field_store));
    }

    let (scheduled, _) = schedule(&graph, all_blocks());
    assert_valid_schedule(&graph, &scheduled);
}

#[test]
fn test_loop_bodies() {
    let _ = env_logger::builder().is_test(true).try_init();

    for graph in load_hir_file("loops.hir") {
        let (scheduled, stats) = schedule(&graph, SchedulerOptions::default());
        assert_valid_schedule(&graph, &scheduled);
        // Header and body of the single loop.
        assert_eq!(stats.blocks_scheduled, 2, "{}", graph.name);
        assert_eq!(stats.blocks_visited, 4, "{}", graph.name);
        assert!(stats.data_edges > 0);

        let (random_scheduled, _) = schedule(&graph, random(11));
        assert_valid_schedule(&graph, &random_scheduled);
    }
}

#[test]
fn test_induction_update_sinks_below_store() {
    let graph = load_hir_file("loops.hir").remove(0);
    assert_eq!(graph.name, "scale");
    let (scheduled, stats) = schedule(&graph, SchedulerOptions::default());

    assert_eq!(
        block_names(&scheduled, "body"),
        ["ArrayGet", "Mul", "Add", "ArraySet", "Add", "SuspendCheck", "Goto"]
    );
    let body = scheduled.block(scheduled.block_by_name("body").unwrap());
    assert_eq!(body.instructions[4], graph.inst_by_name("next").unwrap());
    assert_eq!(stats.instructions_moved, 4);
}

#[test]
fn test_vector_loop() {
    let graph = load_hir_file("vector_loop.hir").remove(0);
    let (scheduled, stats) = schedule(&graph, SchedulerOptions::default());
    assert_valid_schedule(&graph, &scheduled);
    assert_eq!(stats.blocks_scheduled, 2);

    // The replicate is a barrier; all blocks mode keeps it in place.
    let (scheduled, _) = schedule(&graph, all_blocks());
    assert_valid_schedule(&graph, &scheduled);
    assert_eq!(block_names(&scheduled, "entry")[6], "VecReplicateScalar");
}

#[test]
fn test_unschedulable_blocks_are_untouched() {
    for graph in load_hir_file("unschedulable.hir") {
        let (scheduled, stats) = schedule(&graph, all_blocks());
        let body = graph.block_by_name("body").unwrap();
        assert_eq!(
            graph.block(body).instructions,
            scheduled.block(body).instructions,
            "{}",
            graph.name
        );
        // Entry and header are still scheduled, the exit is a single
        // instruction.
        assert_eq!(stats.blocks_scheduled, 2, "{}", graph.name);
        assert_valid_schedule(&graph, &scheduled);
    }
}

#[test]
fn test_blocks_outside_loops_are_skipped_by_default() {
    let graph = Graph::parse(
        r#"
method m(%x: i32) {
entry:
  %a = mul.i32 %x, %x
  %b = add.i32 %x, %x
  %c = add.i32 %a, %b
  return %c
}
"#,
    )
    .unwrap();
    let (scheduled, stats) = schedule(&graph, SchedulerOptions::default());
    assert_eq!(scheduled, graph);
    assert_eq!(stats.blocks_visited, 1);
    assert_eq!(stats.blocks_scheduled, 0);
    assert_eq!(stats.nodes, 0);

    let (scheduled, stats) = schedule(&graph, all_blocks());
    assert_eq!(stats.blocks_scheduled, 1);
    assert_eq!(stats.nodes, 5);
    assert_valid_schedule(&graph, &scheduled);
}

#[test]
fn test_critical_path_mode_is_deterministic() {
    for graph in load_hir_file("loops.hir")
        .into_iter()
        .chain(load_hir_file("vector_loop.hir"))
    {
        let (first, first_stats) = schedule(&graph, all_blocks());
        let (second, second_stats) = schedule(&graph, all_blocks());
        assert_eq!(first, second);
        assert_eq!(first_stats, second_stats);
    }
}

#[test]
fn test_dependency_chain_keeps_its_order() {
    let graph = Graph::parse(
        r#"
method chain(%x: i32) {
entry:
  %a = add.i32 %x, %x
  %b = mul.i32 %a, %a
  %c = sub.i32 %b, %a
  %d = div.i32 %c, %b
  %e = neg.i32 %d
  return %e
}
"#,
    )
    .unwrap();
    let (scheduled, stats) = schedule(&graph, all_blocks());
    assert_eq!(scheduled, graph);
    assert_eq!(stats.instructions_moved, 0);
    for seed in 0..16 {
        let (scheduled, _) = schedule(&graph, random(seed));
        assert_eq!(scheduled, graph);
    }
}

#[test]
fn test_dot_dump() {
    let path = std::env::temp_dir().join(format!("tpde-sched-{}.dot", std::process::id()));
    let _ = fs::remove_file(&path);

    let graph = load_hir_file("loops.hir").remove(0);
    let options = SchedulerOptions {
        dump_dot: Some(path.clone()),
        ..SchedulerOptions::default()
    };
    schedule(&graph, options.clone());
    schedule(&graph, options);

    let dot = fs::read_to_string(&path).unwrap();
    let _ = fs::remove_file(&path);
    // Two runs, two scheduled blocks each, appended.
    assert_eq!(dot.matches("digraph G {").count(), 4);
    assert!(dot.contains("// scale header\n"));
    assert!(dot.contains("// scale body\n"));
    assert!(dot.contains("-> end_of_scheduling:n"));
    assert!(dot.contains("ArrayGet"));
    assert!(dot.contains("(barrier)"));
    assert!(dot.contains("[dir=back,color=blue]"));
}

#[test]
fn test_unsupported_instruction_set() {
    for isa in [InstructionSet::X86, InstructionSet::X86_64, InstructionSet::Thumb2] {
        match InstructionScheduling::new(isa, SchedulerOptions::default()) {
            Err(SchedError::UnsupportedInstructionSet { isa: got }) => assert_eq!(got, isa),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }
}

/// Schedules everything, including kinds the latency table has no entry for.
struct PermissiveTarget;

impl SchedulingTarget for PermissiveTarget {
    fn instruction_set(&self) -> InstructionSet {
        InstructionSet::Arm64
    }

    fn is_schedulable(&self, _graph: &Graph, _instruction: InstId) -> bool {
        true
    }

    fn latency_visitor(&self) -> Box<dyn LatencyVisitor> {
        Box::new(Arm64LatencyVisitor::new())
    }
}

#[test]
fn test_unhandled_instruction_is_an_error() {
    let mut graph = Graph::parse(
        r#"
method m(%o: ref) {
entry:
  %cls = loadclass.ref
  %x = iget.i32 %o, @Point.x
  return %x
}
"#,
    )
    .unwrap();
    let original = graph.clone();
    let target = PermissiveTarget;
    let mut selector = CriticalPathSchedulingNodeSelector::new();
    let mut scheduler = Scheduler::new(&target, &mut selector);
    scheduler.set_only_optimize_loop_blocks(false);
    let mut session = SchedulingSession::new();

    match scheduler.schedule(&mut graph, &mut session) {
        Err(SchedError::UnhandledInstruction { isa, kind, inst }) => {
            assert_eq!(isa, InstructionSet::Arm64);
            assert_eq!(kind, "LoadClass");
            assert!(inst.contains("LoadClass"), "{}", inst);
        }
        other => panic!("unexpected result {:?}", other),
    }
    // Nothing is committed on failure.
    assert_eq!(graph, original);
}
