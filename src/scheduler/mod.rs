//! Block-local instruction scheduling.
//!
//! - [`graph`] - dependency graph of one block, built backward
//! - [`side_effects`] - heap and exception ordering between instructions
//! - [`latency`] - per-target latency visitor interface
//! - [`selector`] - random and critical-path candidate selection
//! - [`target`] - per-target schedulability and barrier hooks
//! - [`driver`] - the list scheduler and the pass entry point

pub mod dot;
pub mod driver;
pub mod graph;
pub mod latency;
pub mod node;
pub mod selector;
pub mod side_effects;
pub mod target;

pub use driver::{InstructionScheduling, Scheduler, SchedulerOptions};
pub use graph::SchedulingGraph;
pub use latency::LatencyVisitor;
pub use node::{NodeId, SchedulingNode};
pub use selector::{CriticalPathSchedulingNodeSelector, NodeSelector, RandomSchedulingNodeSelector};
pub use side_effects::SideEffectDependencyAnalysis;
pub use target::{target_for, SchedulingTarget};
