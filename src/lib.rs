//! Execution engine for knitout, the line-oriented instruction language of V-bed
//! weft-knitting machines: instruction model, program container, header
//! reconciliation, a machine model implementing the engine's machine contract, the
//! carriage-pass assembler, the executer that ties it all together, loop bookkeeping,
//! and a debugger harness.
//!
//! Parsing knitout source text into this crate's [`instruction::Instruction`] values
//! lives in the sibling `knitout-parse` crate, which depends on this one — mirroring
//! how an assembler depends on the instruction set it targets rather than the other
//! way around.

pub mod carrier;
pub mod debug;
pub mod exec;
pub mod header;
pub mod instruction;
pub mod loopgraph;
pub mod machine;
pub mod needle;
pub mod pass;
pub mod program;

pub use exec::{Executer, ExecutionError};
pub use header::Header;
pub use instruction::Instruction;
pub use machine::{MachineError, MachineModel, ViolationPolicy};
pub use program::Program;
