//! Job clustering: merging distributed physical operators into jobs.
//!
//! Operators are visited in topological order. A distributed operator joins
//! the most recent job of one of its inputs when the job has room, matches
//! its exec type and job shape, is still in a phase the operator can run in,
//! and joining cannot create a cycle between execution units. Otherwise it
//! opens a new job. Operators that define a job or break alignment always
//! open one. The procedure only depends on the DAG, so repeated compilation
//! yields the same jobs.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use common_error::{MantisError, MantisResult};
use log::debug;
use mantis_core::ExecType;

use crate::physical::{ExecLocation, JobType, LopDag, LopId};

/// Shuffle phase a job has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Map,
    Reduce,
}

/// A cluster of distributed operators submitted as one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub index: usize,
    pub exec_type: ExecType,
    pub job_type: JobType,
    /// Member operators in topological order.
    pub lops: Vec<LopId>,
    pub phase: JobPhase,
}

impl Job {
    pub fn contains(&self, lop: LopId) -> bool {
        self.lops.contains(&lop)
    }
}

/// A schedulable piece of a block: an in-process operator or a whole job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionUnit {
    Single(LopId),
    Job(Job),
}

impl ExecutionUnit {
    pub fn lops(&self) -> &[LopId] {
        match self {
            Self::Single(id) => std::slice::from_ref(id),
            Self::Job(job) => &job.lops,
        }
    }

    pub fn as_job(&self) -> Option<&Job> {
        match self {
            Self::Job(job) => Some(job),
            Self::Single(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum UnitKey {
    Lop(LopId),
    Job(usize),
}

/// Groups the distributed operators of a LOP DAG into jobs.
#[derive(Debug, Clone)]
pub struct JobClusterer {
    max_job_size: usize,
}

impl JobClusterer {
    pub fn new(max_job_size: usize) -> Self {
        Self {
            max_job_size: max_job_size.max(1),
        }
    }

    /// Cluster and order the execution units of `dag`.
    pub fn cluster(&self, dag: &LopDag) -> MantisResult<Vec<ExecutionUnit>> {
        let order = dag.topo_order()?;
        let mut jobs: Vec<Job> = Vec::new();
        let mut unit_of: HashMap<LopId, UnitKey> = HashMap::new();
        let mut deps: HashMap<UnitKey, BTreeSet<UnitKey>> = HashMap::new();

        for &id in &order {
            let lop = &dag[id];
            let input_units: Vec<UnitKey> = lop
                .inputs
                .iter()
                .map(|i| {
                    unit_of.get(i).copied().ok_or_else(|| {
                        MantisError::internal(format!("input {i} of {id} not yet clustered"))
                    })
                })
                .collect::<MantisResult<_>>()?;

            let unit = if lop.is_distributed() {
                let joined = if lop.properties.starts_job() {
                    None
                } else {
                    self.find_job(dag, id, &jobs, &input_units, &deps)
                };
                let index = match joined {
                    Some(index) => {
                        jobs[index].lops.push(id);
                        index
                    }
                    None => {
                        let index = jobs.len();
                        let job_type = lop
                            .properties
                            .compatible_jobs
                            .first()
                            .copied()
                            .unwrap_or(JobType::Generic);
                        jobs.push(Job {
                            index,
                            exec_type: lop.exec_type,
                            job_type,
                            lops: vec![id],
                            phase: JobPhase::Map,
                        });
                        index
                    }
                };
                if matches!(
                    lop.properties.location,
                    ExecLocation::MapAndReduce | ExecLocation::Reduce
                ) {
                    jobs[index].phase = JobPhase::Reduce;
                }
                UnitKey::Job(index)
            } else {
                UnitKey::Lop(id)
            };

            unit_of.insert(id, unit);
            let entry = deps.entry(unit).or_default();
            entry.extend(input_units.into_iter().filter(|u| *u != unit));
        }

        debug!(
            "Clustered {} physical operators into {} jobs",
            order.len(),
            jobs.len()
        );
        Self::schedule(&order, jobs, &unit_of, &deps)
    }

    fn find_job(
        &self,
        dag: &LopDag,
        id: LopId,
        jobs: &[Job],
        input_units: &[UnitKey],
        deps: &HashMap<UnitKey, BTreeSet<UnitKey>>,
    ) -> Option<usize> {
        let lop = &dag[id];
        let candidates: BTreeSet<Reverse<usize>> = input_units
            .iter()
            .filter_map(|u| match u {
                UnitKey::Job(j) => Some(Reverse(*j)),
                UnitKey::Lop(_) => None,
            })
            .collect();

        candidates.into_iter().map(|Reverse(j)| j).find(|&j| {
            let job = &jobs[j];
            let phase_ok = match lop.properties.location {
                ExecLocation::Map | ExecLocation::MapAndReduce => job.phase == JobPhase::Map,
                _ => true,
            };
            job.exec_type == lop.exec_type
                && lop.properties.is_compatible(job.job_type)
                && job.lops.len() < self.max_job_size
                && phase_ok
                && input_units
                    .iter()
                    .filter(|u| **u != UnitKey::Job(j))
                    .all(|u| !reaches(deps, *u, UnitKey::Job(j)))
        })
    }

    /// Order units so every unit follows its dependencies.
    ///
    /// Ready units are taken by their earliest member in topological order.
    fn schedule(
        order: &[LopId],
        jobs: Vec<Job>,
        unit_of: &HashMap<LopId, UnitKey>,
        deps: &HashMap<UnitKey, BTreeSet<UnitKey>>,
    ) -> MantisResult<Vec<ExecutionUnit>> {
        let mut first_pos: HashMap<UnitKey, usize> = HashMap::new();
        for (pos, id) in order.iter().enumerate() {
            if let Some(unit) = unit_of.get(id) {
                first_pos.entry(*unit).or_insert(pos);
            }
        }

        let mut pending: HashMap<UnitKey, usize> = HashMap::new();
        let mut dependents: HashMap<UnitKey, Vec<UnitKey>> = HashMap::new();
        for (unit, unit_deps) in deps {
            pending.insert(*unit, unit_deps.len());
            for dep in unit_deps {
                dependents.entry(*dep).or_default().push(*unit);
            }
        }

        let mut ready: BinaryHeap<Reverse<(usize, UnitKey)>> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(u, _)| Reverse((first_pos[u], *u)))
            .collect();
        let mut jobs: Vec<Option<Job>> = jobs.into_iter().map(Some).collect();
        let mut scheduled = HashSet::new();
        let mut out = Vec::with_capacity(pending.len());

        while let Some(Reverse((_, unit))) = ready.pop() {
            scheduled.insert(unit);
            out.push(match unit {
                UnitKey::Lop(id) => ExecutionUnit::Single(id),
                UnitKey::Job(j) => ExecutionUnit::Job(jobs[j].take().ok_or_else(|| {
                    MantisError::internal(format!("job {j} scheduled twice"))
                })?),
            });
            for next in dependents.get(&unit).into_iter().flatten() {
                if let Some(n) = pending.get_mut(next) {
                    *n -= 1;
                    if *n == 0 {
                        ready.push(Reverse((first_pos[next], *next)));
                    }
                }
            }
        }

        if scheduled.len() != pending.len() {
            return Err(MantisError::internal(format!(
                "job clustering produced a dependency cycle ({} of {} units scheduled)",
                scheduled.len(),
                pending.len()
            )));
        }
        Ok(out)
    }
}

/// Check if `from` transitively depends on `target`.
fn reaches(deps: &HashMap<UnitKey, BTreeSet<UnitKey>>, from: UnitKey, target: UnitKey) -> bool {
    let mut stack = vec![from];
    let mut seen = HashSet::new();
    while let Some(unit) = stack.pop() {
        if unit == target {
            return true;
        }
        if seen.insert(unit) {
            stack.extend(deps.get(&unit).into_iter().flatten().copied());
        }
    }
    false
}
