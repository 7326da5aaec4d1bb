//! Error types and result aliases for Mantis.
//!
//! Every crate in the workspace reports failures through [`MantisError`]. The
//! variants follow the failure taxonomy used by the compiler and runtime:
//! structural and capability errors are raised at compile time, domain,
//! backend and resource errors at run time.

mod error;

pub use error::{ErrorKind, GenericError, MantisError, MantisResult};
