//! Program execution.
//!
//! - [`ProgramExecutor`]: interprets compiled programs block by block
//! - [`ExecutionContext`]: symbol table, buffer pool, backend and cancellation
//! - [`DistributedBackend`]: contract for running job instructions
//! - [`SymbolTable`]: scoped variable map

mod backend;
mod context;
mod interpreter;
mod symbols;

pub use backend::DistributedBackend;
pub use context::{CancellationHandle, ExecutionContext};
pub use interpreter::{ExecutionResult, ProgramExecutor};
pub use symbols::{RuntimeValue, SymbolTable, Variable};
