//! The compilation pipeline and the compiled-program handle.

use std::sync::Arc;

use common_config::MantisConfig;
use common_error::MantisResult;
use log::info;
use mantis_distributed::InProcessBackend;
use mantis_engine::executor::{DistributedBackend, ExecutionResult, ProgramExecutor, RuntimeValue};
use mantis_engine::instructions::{Program, compile_program};
use mantis_engine::physical::PhysicalPlan;
use mantis_logical::ast::ProgramAst;
use mantis_logical::{LogicalProgram, ProgramBuilder, VariableInfo};
use mantis_optimizer::Optimizer;
use tokio::sync::watch;

/// Compiles front-end programs.
///
/// ```text
/// ProgramAst ─▶ ProgramBuilder ─▶ Optimizer ─▶ PhysicalPlanner + JobClusterer ─▶ Program
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: MantisConfig,
    variables: Vec<(String, VariableInfo)>,
}

impl Compiler {
    pub fn new(config: MantisConfig) -> Self {
        Self {
            config,
            variables: Vec::new(),
        }
    }

    /// Declare a variable bound by the caller before the program starts.
    pub fn with_variable(mut self, name: impl Into<String>, info: VariableInfo) -> Self {
        self.variables.push((name.into(), info));
        self
    }

    pub fn config(&self) -> &MantisConfig {
        &self.config
    }

    /// Build, rewrite and lower `ast`.
    ///
    /// Structural and capability errors surface here, before anything runs.
    pub fn compile(&self, ast: &ProgramAst) -> MantisResult<CompiledProgram> {
        let compiler = &self.config.compiler;
        let mut builder = ProgramBuilder::new(compiler.default_block_size as i64);
        for (name, info) in &self.variables {
            builder = builder.with_variable(name.clone(), info.clone());
        }
        let mut logical = builder.build(ast)?;
        let rewrites = Optimizer::for_config(compiler).optimize_program(&mut logical)?;
        let program = compile_program(&logical, compiler)?;
        info!(
            "Compiled program: {} rewrites applied, {} distributed jobs",
            rewrites,
            program.num_distributed_jobs()
        );
        Ok(CompiledProgram {
            logical,
            program,
            rewrites,
            config: self.config.clone(),
        })
    }
}

/// A compiled program, ready to run any number of times.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    logical: LogicalProgram,
    program: Program,
    rewrites: usize,
    config: MantisConfig,
}

impl CompiledProgram {
    /// Job instructions in the program text; loop bodies count once.
    pub fn num_distributed_jobs(&self) -> usize {
        self.program.num_distributed_jobs()
    }

    /// Rule applications made by the optimizer.
    pub fn rewrites_applied(&self) -> usize {
        self.rewrites
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn logical(&self) -> &LogicalProgram {
        &self.logical
    }

    pub fn physical_plans(&self) -> Vec<&PhysicalPlan> {
        self.program.physical_plans()
    }

    /// Rewritten logical plan followed by the instruction listing.
    pub fn explain(&self) -> String {
        format!(
            "LOGICAL\n{}\n{}",
            self.logical.explain(),
            self.program.explain()
        )
    }

    /// Run with the in-process distributed backend.
    pub async fn execute(
        &self,
        inputs: impl IntoIterator<Item = (String, RuntimeValue)>,
    ) -> MantisResult<ExecutionResult> {
        self.execute_with(inputs, Arc::new(InProcessBackend::new()), None)
            .await
    }

    /// Run against `backend`, optionally cancellable.
    pub async fn execute_with(
        &self,
        inputs: impl IntoIterator<Item = (String, RuntimeValue)>,
        backend: Arc<dyn DistributedBackend>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MantisResult<ExecutionResult> {
        ProgramExecutor::new(&self.config)
            .execute(&self.program, inputs, Some(backend), cancel)
            .await
    }

    /// Blocking [`execute`](Self::execute). Must not be called from within
    /// an async runtime.
    pub fn execute_sync(
        &self,
        inputs: impl IntoIterator<Item = (String, RuntimeValue)>,
    ) -> MantisResult<ExecutionResult> {
        common_runtime::block_on(self.execute(inputs))?
    }
}
