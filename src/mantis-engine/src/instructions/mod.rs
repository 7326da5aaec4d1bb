//! Instruction generation and the compiled program representation.

mod generator;
mod instruction;
mod job;
mod operand;
mod program;

pub use generator::{InstructionGenerator, compile_program};
pub use instruction::{Instruction, InstructionType};
pub use job::{
    DatasetRef, JobDescriptor, JobInput, JobOutput, JobSpec, JobStatus, JobStep, StepInput,
};
pub use operand::{Operand, TEMP_PREFIX};
pub use program::{PredicateBlock, Program, ProgramBlock};
