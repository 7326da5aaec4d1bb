//! Stateless operator functors shared by every layer.

mod aggregate;
mod binary;
mod index;
mod unary;

pub use aggregate::{AggState, AggregateDirection, AggregateFunction};
pub use binary::ValueFunction;
pub use index::IndexFunction;
pub use unary::UnaryFunction;
