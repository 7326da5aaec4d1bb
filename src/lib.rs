//! Mantis - compiler and runtime for declarative matrix programs.
//!
//! Programs arrive as a typed AST, are lowered to a logical operator DAG,
//! rewritten, assigned to an in-process or distributed backend by a cost
//! model, clustered into distributed jobs and executed by an interpreter
//! backed by a spilling buffer pool.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

mod compiler;

pub use compiler::{CompiledProgram, Compiler};

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use mantis_core as core;
pub use mantis_distributed as distributed;
pub use mantis_engine as engine;
pub use mantis_logical as logical;
pub use mantis_optimizer as optimizer;

/// Mantis version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
