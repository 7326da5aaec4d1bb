//! Physical plan structure.

use std::fmt::Write;

use super::dag::LopDag;
use crate::planner::ExecutionUnit;

/// The physical plan of one block: the LOP DAG and its ordered execution units.
#[derive(Debug, Clone)]
pub struct PhysicalPlan {
    dag: LopDag,
    units: Vec<ExecutionUnit>,
}

impl PhysicalPlan {
    pub fn new(dag: LopDag, units: Vec<ExecutionUnit>) -> Self {
        Self { dag, units }
    }

    pub fn dag(&self) -> &LopDag {
        &self.dag
    }

    /// Execution units in dependency order.
    pub fn units(&self) -> &[ExecutionUnit] {
        &self.units
    }

    /// Number of distributed jobs.
    pub fn num_jobs(&self) -> usize {
        self.units.iter().filter(|u| u.as_job().is_some()).count()
    }

    /// Generate EXPLAIN output.
    pub fn explain(&self) -> String {
        let mut output = String::new();
        for unit in &self.units {
            match unit {
                ExecutionUnit::Single(id) => {
                    let _ = writeln!(output, "{}", self.dag[*id]);
                }
                ExecutionUnit::Job(job) => {
                    let _ = writeln!(
                        output,
                        "JOB {} [{} {}]",
                        job.index,
                        job.exec_type.code(),
                        job.job_type
                    );
                    for id in &job.lops {
                        let _ = writeln!(output, "  {}", self.dag[*id]);
                    }
                }
            }
        }
        output
    }
}
