//! Core data model for the Mantis matrix compiler.
//!
//! This crate provides the pieces every other layer builds on:
//! - `DataType`, `ValueType`, `ExecType` and `ScalarValue` for the type system
//! - `MatrixCharacteristics` for (possibly unknown) shape and sparsity metadata
//! - `MatrixBlock`, a dense in-memory matrix with its cell kernels
//! - stateless operator functors (`ValueFunction`, `UnaryFunction`,
//!   `IndexFunction`, `AggregateFunction`)
//! - `RandSpec`, seeded uniform random matrices that partition exactly

pub mod block;
pub mod functors;
pub mod random;
pub mod types;

pub use block::MatrixBlock;
pub use functors::{
    AggState, AggregateDirection, AggregateFunction, IndexFunction, UnaryFunction, ValueFunction,
};
pub use random::RandSpec;
pub use types::{DataType, ExecType, MatrixCharacteristics, ScalarValue, UNKNOWN, ValueType};
