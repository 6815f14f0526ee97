//! Core scheduler infrastructure.
//!
//! ## Session Management (`session`)
//! - Arena-based memory allocation using `bumpalo`, reset after every block
//! - Scheduling statistics
//!
//! ## Errors (`error`)
//! - `SchedError` for the pass, `ParseError` for the textual HIR

pub mod error;
pub mod session;

pub use error::{ParseError, SchedError, SchedResult};
pub use session::{SchedulingSession, SchedulingStats};
