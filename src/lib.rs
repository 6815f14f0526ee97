//! TPDE instruction scheduler.
//!
//! A block-local backward list scheduler for the low-level HIR of an
//! optimizing compiler. Each eligible basic block gets a dependency graph
//! (data, barrier, heap side-effect, environment and cross-iteration edges),
//! every node is costed by the target's latency table, and the block is
//! re-ordered greedily from its end towards its start.
//!
//! # Primary Usage
//!
//! ```
//! use tpde_sched::ir::{Graph, InstructionSet};
//! use tpde_sched::scheduler::{InstructionScheduling, SchedulerOptions};
//!
//! let mut graph = Graph::parse(
//!     "method m(%x: i32) {\n\
//!      entry:\n\
//!        %a = mul.i32 %x, %x\n\
//!        %b = add.i32 %x, %x\n\
//!        %c = add.i32 %a, %b\n\
//!        return %c\n\
//!      }\n",
//! )?;
//! let options = SchedulerOptions {
//!     only_optimize_loop_blocks: false,
//!     ..SchedulerOptions::default()
//! };
//! let stats = InstructionScheduling::new(InstructionSet::Arm64, options)?.run(&mut graph)?;
//! assert_eq!(stats.blocks_scheduled, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - host IR, text format and loop analysis
//! - [`analysis`] - heap location collection for alias queries
//! - [`scheduler`] - dependency graph, selectors and the list scheduler
//! - [`arm64`] - ARM64 scheduling target and latency table
//! - [`core`] - errors and the per-method scheduling session

pub mod analysis;
pub mod arm64;
pub mod core;
pub mod ir;
pub mod scheduler;

pub use crate::core::{ParseError, SchedError, SchedResult, SchedulingSession, SchedulingStats};
pub use crate::scheduler::{InstructionScheduling, SchedulerOptions};
