//! Instruction generation.
//!
//! Each block's physical plan is walked unit by unit in dependency order.
//! In-process operators become one instruction each; a job becomes a single
//! job instruction whose steps reference each other by position. Transient
//! writes are deferred to the end of the block and applied in two phases, so
//! that swaps like `a = b; b = a` read the values from block entry.

use std::collections::{HashMap, HashSet};

use common_config::CompilerConfig;
use common_error::{MantisError, MantisResult};
use log::debug;
use mantis_logical::{DataOpKind, LogicalBlock, LogicalProgram};

use super::instruction::Instruction;
use super::job::{JobOutput, JobSpec, JobStep, StepInput};
use super::operand::Operand;
use super::program::{PredicateBlock, Program, ProgramBlock};
use crate::physical::{LopId, LopKind, PartitioningSpec, PhysicalPlan};
use crate::planner::{ExecutionUnit, Job, PhysicalPlanner};

/// Compile an optimized logical program into an executable program.
pub fn compile_program(program: &LogicalProgram, config: &CompilerConfig) -> MantisResult<Program> {
    InstructionGenerator::new(config).compile(program)
}

/// Stateful generator; temporaries and job ids are numbered program-wide.
pub struct InstructionGenerator<'a> {
    config: &'a CompilerConfig,
    planner: PhysicalPlanner,
    next_temp: usize,
    next_job: usize,
}

/// Instructions of one plan before the block epilogue.
struct Linearized {
    instructions: Vec<Instruction>,
    operands: HashMap<LopId, Operand>,
    /// Temporaries still bound after `instructions`.
    live_temps: Vec<String>,
    /// Deferred transient writes: target and source.
    writes: Vec<(String, Operand)>,
}

const END_OF_BLOCK: usize = usize::MAX;

impl<'a> InstructionGenerator<'a> {
    pub fn new(config: &'a CompilerConfig) -> Self {
        Self {
            config,
            planner: PhysicalPlanner::new(config),
            next_temp: 1,
            next_job: 1,
        }
    }

    pub fn compile(&mut self, program: &LogicalProgram) -> MantisResult<Program> {
        let blocks = self.compile_blocks(&program.blocks, false)?;
        let program = Program::new(blocks);
        debug!(
            "Generated program with {} distributed jobs",
            program.num_distributed_jobs()
        );
        Ok(program)
    }

    fn compile_blocks(
        &mut self,
        blocks: &[LogicalBlock],
        in_loop: bool,
    ) -> MantisResult<Vec<ProgramBlock>> {
        blocks
            .iter()
            .map(|b| self.compile_block(b, in_loop))
            .collect()
    }

    fn compile_block(&mut self, block: &LogicalBlock, in_loop: bool) -> MantisResult<ProgramBlock> {
        match block {
            LogicalBlock::Basic(dag) => {
                let plan = self.planner.plan(dag)?;
                let instructions = self.basic_instructions(&plan)?;
                self.check_loop(&instructions, in_loop)?;
                Ok(ProgramBlock::Basic { instructions, plan })
            }
            LogicalBlock::If {
                predicate,
                then_blocks,
                else_blocks,
            } => {
                let predicate = self.predicate(predicate, in_loop)?;
                Ok(ProgramBlock::If {
                    predicate,
                    then_blocks: self.compile_blocks(then_blocks, in_loop)?,
                    else_blocks: self.compile_blocks(else_blocks, in_loop)?,
                })
            }
            LogicalBlock::While { predicate, body } => {
                let predicate = self.predicate(predicate, true)?;
                Ok(ProgramBlock::While {
                    predicate,
                    body: self.compile_blocks(body, true)?,
                })
            }
            LogicalBlock::For {
                var,
                from,
                to,
                body,
            } => Ok(ProgramBlock::For {
                var: var.clone(),
                from: self.predicate(from, in_loop)?,
                to: self.predicate(to, in_loop)?,
                body: self.compile_blocks(body, true)?,
            }),
        }
    }

    fn check_loop(&self, instructions: &[Instruction], in_loop: bool) -> MantisResult<()> {
        if !in_loop || self.config.allow_jobs_in_loops {
            return Ok(());
        }
        match instructions.iter().find(|i| i.is_job()) {
            Some(Instruction::Job(spec)) => Err(MantisError::structural(format!(
                "distributed job inside a loop while jobs in loops are disabled: {}",
                spec.describe()
            ))),
            _ => Ok(()),
        }
    }

    fn predicate(
        &mut self,
        dag: &mantis_logical::HopDag,
        in_loop: bool,
    ) -> MantisResult<PredicateBlock> {
        let plan = self.planner.plan(dag)?;
        let root = match plan.dag().roots() {
            [root] => *root,
            roots => {
                return Err(MantisError::structural(format!(
                    "predicate must have exactly one root, found {}",
                    roots.len()
                )));
            }
        };
        let lin = self.linearize(&plan)?;
        self.check_loop(&lin.instructions, in_loop)?;
        let result = lin
            .operands
            .get(&root)
            .cloned()
            .ok_or_else(|| MantisError::internal("predicate result was not produced"))?;
        if result.is_matrix() {
            return Err(MantisError::type_error(format!(
                "control-flow predicate must be a scalar, got {}",
                result.data_type
            )));
        }
        let cleanup = if lin.live_temps.is_empty() {
            Vec::new()
        } else {
            vec![Instruction::RemoveVar {
                names: lin.live_temps,
            }]
        };
        Ok(PredicateBlock {
            instructions: lin.instructions,
            result,
            cleanup,
            plan,
        })
    }

    fn basic_instructions(&mut self, plan: &PhysicalPlan) -> MantisResult<Vec<Instruction>> {
        let Linearized {
            mut instructions,
            mut live_temps,
            writes,
            ..
        } = self.linearize(plan)?;

        let targets: HashSet<&str> = writes.iter().map(|(t, _)| t.as_str()).collect();
        let mut copies: HashMap<String, Operand> = HashMap::new();
        let mut staged = Vec::with_capacity(writes.len());
        for (target, source) in &writes {
            if source.name == *target && !source.is_literal() {
                continue;
            }
            let hazard =
                !source.is_literal() && !source.is_temp() && targets.contains(source.name.as_str());
            let source = if hazard {
                if let Some(copy) = copies.get(&source.name) {
                    copy.clone()
                } else {
                    let tmp = self.temp(source.data_type, source.value_type);
                    instructions.push(Instruction::AssignVar {
                        source: source.clone(),
                        target: tmp.name.clone(),
                    });
                    live_temps.push(tmp.name.clone());
                    copies.insert(source.name.clone(), tmp.clone());
                    tmp
                }
            } else {
                source.clone()
            };
            staged.push((target.clone(), source));
        }
        for (target, source) in staged {
            instructions.push(Instruction::AssignVar { source, target });
        }
        if !live_temps.is_empty() {
            instructions.push(Instruction::RemoveVar { names: live_temps });
        }
        Ok(instructions)
    }

    fn linearize(&mut self, plan: &PhysicalPlan) -> MantisResult<Linearized> {
        let dag = plan.dag();
        let units = plan.units();

        let mut unit_index: HashMap<LopId, usize> = HashMap::new();
        for (u, unit) in units.iter().enumerate() {
            for id in unit.lops() {
                unit_index.insert(*id, u);
            }
        }
        // Last unit reading each value from outside its own unit.
        let mut last_use: HashMap<LopId, usize> = HashMap::new();
        for (u, unit) in units.iter().enumerate() {
            for id in unit.lops() {
                let lop = &dag[*id];
                let reader = if lop.kind.is_transient_write() {
                    END_OF_BLOCK
                } else {
                    u
                };
                for input in &lop.inputs {
                    if unit_index.get(input) != Some(&u) {
                        let slot = last_use.entry(*input).or_insert(reader);
                        *slot = (*slot).max(reader);
                    }
                }
            }
        }
        for root in dag.roots() {
            last_use.insert(*root, END_OF_BLOCK);
        }

        let mut lin = Linearized {
            instructions: Vec::new(),
            operands: HashMap::new(),
            live_temps: Vec::new(),
            writes: Vec::new(),
        };
        for (u, unit) in units.iter().enumerate() {
            match unit {
                ExecutionUnit::Single(id) => self.single(plan, *id, &mut lin)?,
                ExecutionUnit::Job(job) => self.job(plan, job, &mut lin)?,
            }
            let done: Vec<String> = unit
                .lops()
                .iter()
                .flat_map(|id| dag[*id].inputs.iter())
                .filter(|input| last_use.get(*input) == Some(&u))
                .filter_map(|input| lin.operands.get(input))
                .filter(|op| op.is_temp())
                .map(|op| op.name.clone())
                .collect::<Vec<_>>();
            let mut names = Vec::new();
            for name in done {
                if let Some(pos) = lin.live_temps.iter().position(|t| *t == name) {
                    lin.live_temps.remove(pos);
                    names.push(name);
                }
            }
            if !names.is_empty() {
                lin.instructions.push(Instruction::RemoveVar { names });
            }
        }
        Ok(lin)
    }

    fn single(&mut self, plan: &PhysicalPlan, id: LopId, lin: &mut Linearized) -> MantisResult<()> {
        let lop = &plan.dag()[id];
        match &lop.kind {
            LopKind::Data { op, name } => match op {
                DataOpKind::PersistentRead | DataOpKind::TransientRead => {
                    lin.operands.insert(
                        id,
                        Operand::variable(name.clone(), lop.data_type, lop.value_type),
                    );
                }
                DataOpKind::TransientWrite => {
                    let source = self.operand_of(lin, lop.inputs[0])?;
                    lin.writes.push((name.clone(), source));
                }
            },
            LopKind::Literal(v) => {
                lin.operands.insert(id, Operand::literal(v.clone()));
            }
            kind => {
                let op = kind.operator().ok_or_else(|| {
                    MantisError::internal(format!("no operator for {}", lop.name()))
                })?;
                let inputs = lop
                    .inputs
                    .iter()
                    .map(|i| self.operand_of(lin, *i))
                    .collect::<MantisResult<Vec<_>>>()?;
                let output = self.temp(lop.data_type, lop.value_type);
                lin.live_temps.push(output.name.clone());
                lin.operands.insert(id, output.clone());
                lin.instructions.push(Instruction::Compute {
                    op,
                    inputs,
                    output,
                });
            }
        }
        Ok(())
    }

    fn job(&mut self, plan: &PhysicalPlan, job: &Job, lin: &mut Linearized) -> MantisResult<()> {
        let dag = plan.dag();
        let mut step_of: HashMap<LopId, usize> = HashMap::new();
        let mut input_of: HashMap<LopId, usize> = HashMap::new();
        let mut inputs: Vec<Operand> = Vec::new();
        let mut steps = Vec::with_capacity(job.lops.len());

        for id in &job.lops {
            let lop = &dag[*id];
            let op = lop.kind.operator().ok_or_else(|| {
                MantisError::internal(format!("{} cannot run inside a job", lop.name()))
            })?;
            let mut step_inputs = Vec::with_capacity(lop.inputs.len());
            for input in &lop.inputs {
                if let Some(step) = step_of.get(input) {
                    step_inputs.push(StepInput::Step(*step));
                } else {
                    let idx = match input_of.get(input) {
                        Some(idx) => *idx,
                        None => {
                            inputs.push(self.operand_of(lin, *input)?);
                            input_of.insert(*input, inputs.len() - 1);
                            inputs.len() - 1
                        }
                    };
                    step_inputs.push(StepInput::Input(idx));
                }
            }
            step_of.insert(*id, steps.len());
            steps.push(JobStep {
                op,
                inputs: step_inputs,
                chars: lop.chars,
            });
        }

        let mut outputs = Vec::new();
        for id in &job.lops {
            let lop = &dag[*id];
            let escapes = dag.roots().contains(id) || lop.outputs.iter().any(|o| !job.contains(*o));
            if escapes {
                let operand = self.temp(lop.data_type, lop.value_type);
                lin.live_temps.push(operand.name.clone());
                lin.operands.insert(*id, operand.clone());
                outputs.push(JobOutput {
                    step: step_of[id],
                    operand,
                });
            }
        }

        let spec = JobSpec {
            id: self.next_job,
            exec_type: job.exec_type,
            job_type: job.job_type,
            steps,
            inputs,
            outputs,
            partitioning: PartitioningSpec::row_blocks(self.config.parallelism, 0),
        };
        self.next_job += 1;
        lin.instructions.push(Instruction::Job(spec));
        Ok(())
    }

    fn operand_of(&self, lin: &Linearized, id: LopId) -> MantisResult<Operand> {
        lin.operands
            .get(&id)
            .cloned()
            .ok_or_else(|| MantisError::internal(format!("operand of {id} used before definition")))
    }

    fn temp(
        &mut self,
        data_type: mantis_core::DataType,
        value_type: mantis_core::ValueType,
    ) -> Operand {
        let operand = Operand::temp(self.next_temp, data_type, value_type);
        self.next_temp += 1;
        operand
    }
}
