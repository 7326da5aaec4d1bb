//! Physical plan structures.
//!
//! A physical plan (LOP DAG) describes how each logical operator runs on its
//! assigned backend, including the grouping operators that distributed
//! aggregation needs and the flags that drive job clustering.

mod dag;
mod lop;
mod operator;
mod plan;
mod properties;

pub use dag::LopDag;
pub use lop::{Lop, LopId, LopKind};
pub use operator::Operator;
pub use plan::PhysicalPlan;
pub use properties::{ExecLocation, JobType, LopProperties, PartitioningSpec, PartitioningStrategy};
