//! Distributed job backend for Mantis.
//!
//! Runs the job instructions of a compiled program outside the interpreter.
//! The interpreter hands over a serialized [`JobDescriptor`]; the backend
//! partitions the job's inputs by rows, runs each step per partition and
//! writes the outputs back into the run's scratch space.
//!
//! ```text
//!   JobDescriptor ──▶ load inputs ──▶ partition 0..N ──▶ group ──▶ aggregate ──▶ write outputs
//!                                      (row-local)       (shuffle)   (merge)
//! ```
//!
//! # Key Components
//!
//! - [`InProcessBackend`]: [`DistributedBackend`] on local worker threads,
//!   with cancellation and injectable transient failures
//! - [`JobRunner`]: step-by-step partitioned evaluation of one job
//! - [`PartitionTask`]: one operator on one row partition
//!
//! [`JobDescriptor`]: mantis_engine::instructions::JobDescriptor
//! [`DistributedBackend`]: mantis_engine::executor::DistributedBackend

#![allow(clippy::missing_const_for_fn)] // Builder patterns often can't be const
#![allow(clippy::return_self_not_must_use)] // Builder patterns don't always need must_use
#![allow(clippy::redundant_closure, clippy::redundant_closure_for_method_calls)] // Some closures are clearer

pub mod executor;
pub mod worker;

pub use executor::{BackendCounters, InProcessBackend, InProcessBackendConfig};
pub use worker::{JobRunner, PartitionTask, Partitioned};
