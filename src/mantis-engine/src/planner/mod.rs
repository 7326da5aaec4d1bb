//! Physical planning module.
//!
//! Converts rewritten HOP DAGs to physical plans: operator selection per
//! backend, then job clustering.

mod jobs;
mod lops;

pub use jobs::{ExecutionUnit, Job, JobClusterer, JobPhase};
pub use lops::LopPlanner;

use common_config::CompilerConfig;
use common_error::MantisResult;
use log::debug;
use mantis_logical::HopDag;

use crate::physical::PhysicalPlan;

/// Plans HOP DAGs into clustered physical plans.
#[derive(Debug)]
pub struct PhysicalPlanner {
    lops: LopPlanner,
    clusterer: JobClusterer,
}

impl PhysicalPlanner {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            lops: LopPlanner::new(config),
            clusterer: JobClusterer::new(config.max_job_size),
        }
    }

    pub fn plan(&self, hops: &HopDag) -> MantisResult<PhysicalPlan> {
        let dag = self.lops.plan(hops)?;
        let units = self.clusterer.cluster(&dag)?;
        let plan = PhysicalPlan::new(dag, units);
        debug!(
            "Physical plan: {} operators, {} jobs",
            plan.dag().len(),
            plan.num_jobs()
        );
        Ok(plan)
    }
}
