//! Compiled programs: control-flow blocks of linear instruction sequences.

use std::fmt::Write;

use super::instruction::Instruction;
use super::operand::Operand;
use crate::physical::PhysicalPlan;

/// Instructions computing one control-flow scalar.
#[derive(Debug, Clone)]
pub struct PredicateBlock {
    pub instructions: Vec<Instruction>,
    /// Operand holding the value once `instructions` ran.
    pub result: Operand,
    /// Run after `result` has been read.
    pub cleanup: Vec<Instruction>,
    pub plan: PhysicalPlan,
}

impl PredicateBlock {
    fn num_jobs(&self) -> usize {
        self.instructions.iter().filter(|i| i.is_job()).count()
    }
}

/// A block of the compiled program.
#[derive(Debug, Clone)]
pub enum ProgramBlock {
    Basic {
        instructions: Vec<Instruction>,
        plan: PhysicalPlan,
    },
    If {
        predicate: PredicateBlock,
        then_blocks: Vec<ProgramBlock>,
        else_blocks: Vec<ProgramBlock>,
    },
    While {
        predicate: PredicateBlock,
        body: Vec<ProgramBlock>,
    },
    /// Inclusive integer range loop.
    For {
        var: String,
        from: PredicateBlock,
        to: PredicateBlock,
        body: Vec<ProgramBlock>,
    },
}

impl ProgramBlock {
    /// Job instructions in this block and every nested block.
    pub fn num_distributed_jobs(&self) -> usize {
        match self {
            Self::Basic { instructions, .. } => instructions.iter().filter(|i| i.is_job()).count(),
            Self::If {
                predicate,
                then_blocks,
                else_blocks,
            } => {
                predicate.num_jobs()
                    + then_blocks
                        .iter()
                        .chain(else_blocks)
                        .map(Self::num_distributed_jobs)
                        .sum::<usize>()
            }
            Self::While { predicate, body } => {
                predicate.num_jobs() + body.iter().map(Self::num_distributed_jobs).sum::<usize>()
            }
            Self::For { from, to, body, .. } => {
                from.num_jobs()
                    + to.num_jobs()
                    + body.iter().map(Self::num_distributed_jobs).sum::<usize>()
            }
        }
    }

    fn collect_plans<'a>(&'a self, out: &mut Vec<&'a PhysicalPlan>) {
        match self {
            Self::Basic { plan, .. } => out.push(plan),
            Self::If {
                predicate,
                then_blocks,
                else_blocks,
            } => {
                out.push(&predicate.plan);
                for b in then_blocks.iter().chain(else_blocks) {
                    b.collect_plans(out);
                }
            }
            Self::While { predicate, body } => {
                out.push(&predicate.plan);
                for b in body {
                    b.collect_plans(out);
                }
            }
            Self::For { from, to, body, .. } => {
                out.push(&from.plan);
                out.push(&to.plan);
                for b in body {
                    b.collect_plans(out);
                }
            }
        }
    }

    fn explain(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let list = |instructions: &[Instruction], out: &mut String| {
            for inst in instructions {
                let _ = writeln!(out, "{indent}  {inst}");
            }
        };
        match self {
            Self::Basic { instructions, .. } => {
                let _ = writeln!(out, "{indent}GENERIC");
                list(instructions, out);
            }
            Self::If {
                predicate,
                then_blocks,
                else_blocks,
            } => {
                let _ = writeln!(out, "{indent}IF ({})", predicate.result);
                list(&predicate.instructions, out);
                for b in then_blocks {
                    b.explain(depth + 1, out);
                }
                if !else_blocks.is_empty() {
                    let _ = writeln!(out, "{indent}ELSE");
                    for b in else_blocks {
                        b.explain(depth + 1, out);
                    }
                }
            }
            Self::While { predicate, body } => {
                let _ = writeln!(out, "{indent}WHILE ({})", predicate.result);
                list(&predicate.instructions, out);
                for b in body {
                    b.explain(depth + 1, out);
                }
            }
            Self::For { var, from, to, body } => {
                let _ = writeln!(out, "{indent}FOR {var} in {}..{}", from.result, to.result);
                list(&from.instructions, out);
                list(&to.instructions, out);
                for b in body {
                    b.explain(depth + 1, out);
                }
            }
        }
    }
}

/// An executable program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub blocks: Vec<ProgramBlock>,
}

impl Program {
    pub fn new(blocks: Vec<ProgramBlock>) -> Self {
        Self { blocks }
    }

    /// Number of job instructions in the program text.
    ///
    /// Loop bodies are counted once, not per iteration.
    pub fn num_distributed_jobs(&self) -> usize {
        self.blocks.iter().map(ProgramBlock::num_distributed_jobs).sum()
    }

    /// Physical plans of every block and predicate, in program order.
    pub fn physical_plans(&self) -> Vec<&PhysicalPlan> {
        let mut out = Vec::new();
        for b in &self.blocks {
            b.collect_plans(&mut out);
        }
        out
    }

    pub fn explain(&self) -> String {
        let mut out = String::from("PROGRAM\n");
        for b in &self.blocks {
            b.explain(1, &mut out);
        }
        out
    }
}
