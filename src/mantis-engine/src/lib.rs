//! Physical planning and runtime for Mantis.
//!
//! This crate turns rewritten HOP DAGs into executable programs and runs
//! them, in-process or through a distributed backend.

#![allow(clippy::missing_const_for_fn)] // Builder patterns often can't be const
#![allow(clippy::return_self_not_must_use)] // Builder patterns don't always need must_use
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)] // Dimensions move between i64 estimates and usize sizes
#![allow(clippy::large_enum_variant)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::significant_drop_tightening)] // Residency guards span a transition
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │  HopDag         │ ──▶ │ LopPlanner +     │ ──▶ │ Instruction       │ ──▶ │ ProgramExecutor  │
//! │ (mantis-logical)│     │ JobClusterer     │     │ Generator         │     │ + BufferPool     │
//! └─────────────────┘     └──────────────────┘     └───────────────────┘     └──────────────────┘
//!                                │                          │                          │
//!                                ▼                          ▼                          ▼
//!                          PhysicalPlan                  Program           DistributedBackend
//! ```
//!
//! # Key Components
//!
//! ## Physical Plan ([`physical`], [`planner`])
//!
//! - [`LopDag`]: arena of physical operators with explicit group/aggregate
//!   data movement and exec-type tags
//! - [`LopPlanner`]: per-backend operator selection and capability checks
//! - [`JobClusterer`]: deterministic merging of compatible operators into jobs
//!
//! ## Instructions ([`instructions`])
//!
//! - [`compile_program`]: linearizes every block into typed instructions
//! - [`Program`]: control-flow blocks; reports its distributed job count
//!
//! ## Runtime ([`executor`], [`memory`], [`metrics`])
//!
//! - [`ProgramExecutor`]: interprets programs; job instructions suspend on
//!   the [`DistributedBackend`]
//! - [`BufferPool`]: pin/release/evict with spill files and lineage
//!   reconstruction, scoped by a [`ScratchSpace`]
//! - [`RuntimeStatistics`]: elapsed time, per-opcode counts, cache hits
//!
//! [`LopDag`]: physical::LopDag
//! [`LopPlanner`]: planner::LopPlanner
//! [`JobClusterer`]: planner::JobClusterer
//! [`compile_program`]: instructions::compile_program
//! [`Program`]: instructions::Program
//! [`ProgramExecutor`]: executor::ProgramExecutor
//! [`DistributedBackend`]: executor::DistributedBackend
//! [`BufferPool`]: memory::BufferPool
//! [`ScratchSpace`]: memory::ScratchSpace
//! [`RuntimeStatistics`]: metrics::RuntimeStatistics

pub mod executor;
pub mod instructions;
pub mod kernels;
pub mod memory;
pub mod metrics;
pub mod physical;
pub mod planner;

pub use executor::{
    CancellationHandle, DistributedBackend, ExecutionContext, ExecutionResult, ProgramExecutor,
    RuntimeValue, SymbolTable, Variable,
};
pub use instructions::{
    DatasetRef, Instruction, InstructionType, JobDescriptor, JobInput, JobStatus, Program,
    ProgramBlock, compile_program,
};
pub use memory::{BufferPool, Lineage, LineageResolver, MatrixHandle, Residency, ScratchSpace};
pub use metrics::{CacheHit, RuntimeStatistics};
pub use physical::{LopDag, PartitioningSpec, PartitioningStrategy, PhysicalPlan};
pub use planner::PhysicalPlanner;
