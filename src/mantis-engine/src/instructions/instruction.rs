//! The instruction set.

use mantis_core::ExecType;
use serde::{Deserialize, Serialize};

use super::job::JobSpec;
use super::operand::Operand;
use crate::physical::Operator;

/// Where an instruction is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstructionType {
    ControlProgram,
    DistributedJob,
    DistributedCollection,
}

impl std::fmt::Display for InstructionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ControlProgram => write!(f, "CP"),
            Self::DistributedJob => write!(f, "MR"),
            Self::DistributedCollection => write!(f, "CL"),
        }
    }
}

/// One immutable instruction.
///
/// Executing an instruction reads and writes named variables in the symbol
/// table; instructions themselves hold no runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// In-process operator application.
    Compute {
        op: Operator,
        inputs: Vec<Operand>,
        output: Operand,
    },
    /// Bind `target` to the value of `source`.
    AssignVar { source: Operand, target: String },
    /// Drop variables; their objects are freed once unreferenced.
    RemoveVar { names: Vec<String> },
    /// Submit a job to the distributed backend. May block on the backend.
    Job(JobSpec),
}

impl Instruction {
    pub fn opcode(&self) -> String {
        match self {
            Self::Compute { op, .. } => op.opcode(),
            Self::AssignVar { .. } => "assignvar".to_string(),
            Self::RemoveVar { .. } => "rmvar".to_string(),
            Self::Job(_) => "job".to_string(),
        }
    }

    pub fn instruction_type(&self) -> InstructionType {
        match self {
            Self::Job(spec) => match spec.exec_type {
                ExecType::Collection => InstructionType::DistributedCollection,
                _ => InstructionType::DistributedJob,
            },
            _ => InstructionType::ControlProgram,
        }
    }

    pub fn is_job(&self) -> bool {
        matches!(self, Self::Job(_))
    }

    /// Operands read by this instruction.
    pub fn inputs(&self) -> Vec<&Operand> {
        match self {
            Self::Compute { inputs, .. } => inputs.iter().collect(),
            Self::AssignVar { source, .. } => vec![source],
            Self::RemoveVar { .. } => Vec::new(),
            Self::Job(spec) => spec.inputs.iter().collect(),
        }
    }

    /// Operands written by this instruction.
    pub fn outputs(&self) -> Vec<&Operand> {
        match self {
            Self::Compute { output, .. } => vec![output],
            Self::Job(spec) => spec.outputs.iter().map(|o| &o.operand).collect(),
            Self::AssignVar { .. } | Self::RemoveVar { .. } => Vec::new(),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.instruction_type(), self.opcode())?;
        match self {
            Self::Compute { inputs, output, .. } => {
                for input in inputs {
                    write!(f, " {input}")?;
                }
                write!(f, " {output}")
            }
            Self::AssignVar { source, target } => write!(f, " {source} {target}"),
            Self::RemoveVar { names } => write!(f, " {}", names.join(" ")),
            Self::Job(spec) => {
                write!(f, " {}", spec.describe())?;
                let ins: Vec<_> = spec.inputs.iter().map(ToString::to_string).collect();
                let outs: Vec<_> = spec.outputs.iter().map(|o| o.operand.to_string()).collect();
                write!(f, " in=[{}] out=[{}]", ins.join(","), outs.join(","))
            }
        }
    }
}
