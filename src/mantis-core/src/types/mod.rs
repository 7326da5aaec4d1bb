//! Type system for Mantis.

mod characteristics;
mod data_type;
mod value;

pub use characteristics::{MatrixCharacteristics, UNKNOWN};
pub use data_type::{DataType, ExecType, ValueType};
pub use value::ScalarValue;
