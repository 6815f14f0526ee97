// This module defines the error types of the TPDE instruction scheduler using the thiserror
// crate. SchedError covers the two failure families of the pass: configuration errors (an
// instruction kind the target's latency table does not model, an instruction set without a
// scheduler) and internal-consistency errors (an instruction found outside the block being
// built, a successor counter underflow, nodes left unscheduled, a commit that is not a
// permutation of the block). None of them is recoverable: the host compiler is expected to
// abort the compilation when one surfaces. ParseError reports problems in the textual HIR
// used by tests and the command line driver. SchedResult<T> is the convenience alias.

//! Error types for the TPDE instruction scheduler.

use thiserror::Error;

use crate::ir::InstructionSet;

/// Errors raised while scheduling a method.
#[derive(Error, Debug)]
pub enum SchedError {
    #[error("{isa} latency table does not handle `{kind}` ({inst})")]
    UnhandledInstruction {
        isa: InstructionSet,
        kind: &'static str,
        inst: String,
    },

    #[error("no instruction scheduler for instruction set {isa}")]
    UnsupportedInstructionSet { isa: InstructionSet },

    #[error("{inst} is in block {actual}, expected in block {expected}")]
    InstructionOutsideBlock {
        inst: String,
        actual: String,
        expected: String,
    },

    #[error("successor count of {inst} underflowed")]
    SuccessorUnderflow { inst: String },

    #[error("{count} node(s) left unscheduled in block {block}")]
    UnscheduledNodes { block: String, count: usize },

    #[error("new order of block {block} is not a permutation of its instructions")]
    NotAPermutation { block: String },

    #[error("failed to write scheduling graph: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Error produced by the textual HIR parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}
