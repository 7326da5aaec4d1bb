//! Program interpretation.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common_config::{BufferPoolConfig, ExecutionConfig, MantisConfig};
use common_error::{MantisError, MantisResult};
use log::{debug, info, warn};
use mantis_core::{DataType, ScalarValue, ValueType};
use tokio::sync::watch;

use super::backend::DistributedBackend;
use super::context::ExecutionContext;
use super::symbols::{RuntimeValue, Variable};
use crate::instructions::{
    Instruction, JobDescriptor, JobInput, JobSpec, JobStatus, Operand, PredicateBlock,
    Program, ProgramBlock,
};
use crate::kernels::{self, StepValue};
use crate::memory::{BufferPool, Lineage, LocalReplay, MatrixHandle, spill};
use crate::metrics::{ExecutionTimer, RuntimeStatistics};

type BlockFuture<'a> = Pin<Box<dyn Future<Output = MantisResult<()>> + Send + 'a>>;

/// Variables and statistics of a finished run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Every non-temporary variable live at program end.
    pub variables: BTreeMap<String, RuntimeValue>,
    pub stats: RuntimeStatistics,
}

impl ExecutionResult {
    pub fn get(&self, name: &str) -> Option<&RuntimeValue> {
        self.variables.get(name)
    }

    pub fn matrix(&self, name: &str) -> Option<&mantis_core::MatrixBlock> {
        self.get(name).and_then(RuntimeValue::as_matrix)
    }

    pub fn scalar(&self, name: &str) -> Option<&ScalarValue> {
        self.get(name).and_then(RuntimeValue::as_scalar)
    }
}

/// Interprets compiled programs.
///
/// Instructions within a block run sequentially. Job instructions suspend on
/// the distributed backend until the job completes; without a backend, jobs
/// are run in-process over the same descriptors.
#[derive(Debug, Clone)]
pub struct ProgramExecutor {
    execution: ExecutionConfig,
    buffer_pool: BufferPoolConfig,
    block_size: i64,
}

impl ProgramExecutor {
    pub fn new(config: &MantisConfig) -> Self {
        Self {
            execution: config.execution.clone(),
            buffer_pool: config.buffer_pool.clone(),
            block_size: config.compiler.default_block_size as i64,
        }
    }

    /// Run `program` to completion.
    ///
    /// On failure or cancellation every pin is released and the scratch
    /// space is removed before the error is returned.
    pub async fn execute(
        &self,
        program: &Program,
        inputs: impl IntoIterator<Item = (String, RuntimeValue)>,
        backend: Option<Arc<dyn DistributedBackend>>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MantisResult<ExecutionResult> {
        let stats = RuntimeStatistics::new();
        let scratch = BufferPool::create_scratch_space_with(
            &self.buffer_pool,
            Arc::new(LocalReplay),
            stats.clone(),
        )?;
        let mut ctx = ExecutionContext::new(scratch, self.execution.clone(), stats.clone())
            .with_block_size(self.block_size);
        if let Some(backend) = backend {
            ctx = ctx.with_backend(backend);
        }
        if let Some(rx) = cancel {
            ctx = ctx.with_cancellation(rx);
        }

        info!(
            "Executing program in run {} ({} blocks)",
            ctx.pool().run_id(),
            program.blocks.len()
        );
        stats.start();
        let outcome = async {
            for (name, value) in inputs {
                ctx.bind_value(name, value)?;
            }
            self.execute_in(program, &mut ctx).await?;
            ctx.read_variables()
        }
        .await;
        stats.finish();

        let unwound = ctx.unwind();
        match (outcome, unwound) {
            (Ok(variables), Ok(())) => Ok(ExecutionResult { variables, stats }),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), unwound) => {
                if let Err(cleanup) = unwound {
                    warn!("Cleanup after failed run also failed: {cleanup}");
                }
                Err(e)
            }
        }
    }

    /// Blocking wrapper around [`execute`](Self::execute).
    ///
    /// Must not be called from within an async runtime.
    pub fn execute_sync(
        &self,
        program: &Program,
        inputs: impl IntoIterator<Item = (String, RuntimeValue)>,
        backend: Option<Arc<dyn DistributedBackend>>,
    ) -> MantisResult<ExecutionResult> {
        common_runtime::block_on(self.execute(program, inputs, backend, None))?
    }

    /// Run `program` against an existing context without unwinding.
    pub async fn execute_in(&self, program: &Program, ctx: &mut ExecutionContext) -> MantisResult<()> {
        self.run_blocks(&program.blocks, ctx).await
    }

    fn run_blocks<'a>(&'a self, blocks: &'a [ProgramBlock], ctx: &'a mut ExecutionContext) -> BlockFuture<'a> {
        Box::pin(async move {
            for block in blocks {
                self.run_block(block, ctx).await?;
            }
            Ok(())
        })
    }

    fn run_block<'a>(&'a self, block: &'a ProgramBlock, ctx: &'a mut ExecutionContext) -> BlockFuture<'a> {
        Box::pin(async move {
            match block {
                ProgramBlock::Basic { instructions, .. } => {
                    self.run_instructions(instructions, ctx).await
                }
                ProgramBlock::If {
                    predicate,
                    then_blocks,
                    else_blocks,
                } => {
                    let cond = self.eval_predicate(predicate, ctx).await?.as_bool()?;
                    let branch = if cond { then_blocks } else { else_blocks };
                    self.run_blocks(branch, ctx).await
                }
                ProgramBlock::While { predicate, body } => {
                    while self.eval_predicate(predicate, ctx).await?.as_bool()? {
                        ctx.push_scope();
                        let result = self.run_blocks(body, ctx).await;
                        ctx.pop_scope()?;
                        result?;
                    }
                    Ok(())
                }
                ProgramBlock::For { var, from, to, body } => {
                    let from = self.eval_predicate(from, ctx).await?.as_i64()?;
                    let to = self.eval_predicate(to, ctx).await?.as_i64()?;
                    debug!("for {var} in {from}..={to}");
                    for i in from..=to {
                        ctx.push_scope();
                        let result = match ctx.bind_local(var.as_str(), Variable::Scalar(ScalarValue::Int(i))) {
                            Ok(()) => self.run_blocks(body, ctx).await,
                            Err(e) => Err(e),
                        };
                        ctx.pop_scope()?;
                        result?;
                    }
                    Ok(())
                }
            }
        })
    }

    async fn eval_predicate(
        &self,
        predicate: &PredicateBlock,
        ctx: &mut ExecutionContext,
    ) -> MantisResult<ScalarValue> {
        self.run_instructions(&predicate.instructions, ctx).await?;
        let value = match &predicate.result.literal {
            Some(v) => v.clone(),
            None => match ctx.symbols().get(&predicate.result.name) {
                Some(Variable::Scalar(s)) => s.clone(),
                Some(Variable::Matrix(_)) => {
                    return Err(MantisError::type_error(format!(
                        "predicate '{}' is a matrix",
                        predicate.result.name
                    )));
                }
                None => {
                    return Err(MantisError::execution(format!(
                        "undefined variable '{}'",
                        predicate.result.name
                    )));
                }
            },
        };
        self.run_instructions(&predicate.cleanup, ctx).await?;
        Ok(value)
    }

    async fn run_instructions(
        &self,
        instructions: &[Instruction],
        ctx: &mut ExecutionContext,
    ) -> MantisResult<()> {
        for inst in instructions {
            if ctx.is_cancelled() {
                return Err(MantisError::cancelled(format!("before '{}'", inst.opcode())));
            }
            let timer = ExecutionTimer::start();
            self.execute_instruction(inst, ctx).await?;
            if ctx.config().collect_stats {
                ctx.statistics().record_instruction(&inst.opcode(), timer.elapsed());
            }
        }
        Ok(())
    }

    async fn execute_instruction(
        &self,
        inst: &Instruction,
        ctx: &mut ExecutionContext,
    ) -> MantisResult<()> {
        match inst {
            Instruction::Compute { op, inputs, output } => {
                let mut pinned = Vec::new();
                let result = resolve_operands(inputs, ctx, &mut pinned)
                    .and_then(|values| kernels::apply(op, &values, ctx.config().strict_domain));
                for h in &pinned {
                    ctx.pool().release(h)?;
                }
                let var = into_variable(result?, output, ctx)?;
                ctx.bind(output.name.as_str(), var)
            }
            Instruction::AssignVar { source, target } => {
                let var = match &source.literal {
                    Some(v) => Variable::Scalar(v.clone()),
                    None => ctx.symbols().get(&source.name).cloned().ok_or_else(|| {
                        MantisError::execution(format!("undefined variable '{}'", source.name))
                    })?,
                };
                ctx.bind(target.as_str(), var)
            }
            Instruction::RemoveVar { names } => {
                for name in names {
                    ctx.unbind(name)?;
                }
                Ok(())
            }
            Instruction::Job(spec) => self.execute_job(spec, ctx).await,
        }
    }

    async fn execute_job(&self, spec: &JobSpec, ctx: &mut ExecutionContext) -> MantisResult<()> {
        let job_id = ctx.next_job_id(spec.id);
        let inputs = spec
            .inputs
            .iter()
            .map(|operand| job_input(operand, ctx))
            .collect::<MantisResult<Vec<_>>>()?;
        let mut descriptor = JobDescriptor {
            output_dir: ctx.pool().job_dir(&job_id),
            job_id,
            exec_type: spec.exec_type,
            job_type: spec.job_type,
            steps: spec.steps.clone(),
            inputs,
            outputs: spec.outputs.iter().map(|o| o.step).collect(),
            partitioning: spec.partitioning.clone(),
            strict: ctx.config().strict_domain,
        };
        kernels::pin_random_seeds(&mut descriptor);

        let status = self.submit_with_retries(&descriptor, ctx).await?;
        if status.outputs.len() != spec.outputs.len() {
            return Err(MantisError::backend(format!(
                "job {} reported {} outputs, expected {}",
                descriptor.job_id,
                status.outputs.len(),
                spec.outputs.len()
            )));
        }

        let job = Arc::new(descriptor);
        for (i, (output, dataset)) in spec.outputs.iter().zip(status.outputs).enumerate() {
            let var = if output.operand.is_matrix() {
                let lineage = Lineage {
                    job: Arc::clone(&job),
                    output: i,
                };
                Variable::Matrix(ctx.pool().create_external(dataset, Some(lineage)))
            } else {
                let (block, _) = spill::read_block(&dataset.path)?;
                into_variable(StepValue::matrix(block), &output.operand, ctx)?
            };
            ctx.bind(output.operand.name.as_str(), var)?;
        }
        Ok(())
    }

    /// Submit a job, resubmitting after transient failures.
    ///
    /// Cancellation while the job runs aborts it on the backend.
    async fn submit_with_retries(
        &self,
        job: &JobDescriptor,
        ctx: &ExecutionContext,
    ) -> MantisResult<JobStatus> {
        let max_retries = ctx.config().max_transient_retries;
        let mut attempt = 0;
        loop {
            info!("Submitting {} (attempt {})", job.job_id, attempt + 1);
            ctx.statistics().record_job();
            let result = match ctx.backend() {
                Some(backend) => {
                    let mut cancel_rx = ctx.cancel_receiver();
                    tokio::select! {
                        status = backend.submit(job.clone()) => status,
                        () = wait_cancelled(&mut cancel_rx) => {
                            warn!("Cancelling {} on backend {}", job.job_id, backend.name());
                            backend.cancel(&job.job_id).await?;
                            return Err(MantisError::cancelled(format!("job {}", job.job_id)));
                        }
                    }
                }
                None => run_local_job(job),
            };
            match result {
                Ok(status) => return Ok(status),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    ctx.statistics().record_retry();
                    warn!(
                        "Job {} failed transiently ({e}); retry {attempt} of {max_retries}",
                        job.job_id
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Resolve when cancellation is signalled; never if the sender is gone.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run a job in-process and write its outputs like a backend would.
fn run_local_job(job: &JobDescriptor) -> MantisResult<JobStatus> {
    let blocks = kernels::run_job_locally(job)?;
    kernels::write_outputs(job, &blocks)
}

fn resolve_operands(
    operands: &[Operand],
    ctx: &ExecutionContext,
    pinned: &mut Vec<MatrixHandle>,
) -> MantisResult<Vec<StepValue>> {
    operands
        .iter()
        .map(|operand| {
            if let Some(v) = &operand.literal {
                return Ok(StepValue::Scalar(v.clone()));
            }
            match ctx.symbols().get(&operand.name) {
                Some(Variable::Scalar(s)) => Ok(StepValue::Scalar(s.clone())),
                Some(Variable::Matrix(h)) => {
                    let block = ctx.pool().pin(h)?;
                    pinned.push(Arc::clone(h));
                    Ok(StepValue::Matrix(block))
                }
                None => Err(MantisError::execution(format!(
                    "undefined variable '{}'",
                    operand.name
                ))),
            }
        })
        .collect()
}

fn job_input(operand: &Operand, ctx: &ExecutionContext) -> MantisResult<JobInput> {
    if let Some(v) = &operand.literal {
        return Ok(JobInput::Scalar(v.clone()));
    }
    match ctx.symbols().get(&operand.name) {
        Some(Variable::Scalar(s)) => Ok(JobInput::Scalar(s.clone())),
        Some(Variable::Matrix(h)) => Ok(JobInput::Dataset(ctx.pool().export(h)?)),
        None => Err(MantisError::execution(format!(
            "undefined variable '{}'",
            operand.name
        ))),
    }
}

/// Convert a kernel result to the data and value type of `output`.
fn into_variable(value: StepValue, output: &Operand, ctx: &ExecutionContext) -> MantisResult<Variable> {
    match output.data_type {
        DataType::Scalar => {
            let scalar = match value {
                StepValue::Scalar(s) => s,
                other => {
                    let m = other.into_matrix()?;
                    if m.rows() != 1 || m.cols() != 1 {
                        return Err(MantisError::type_error(format!(
                            "cannot bind a {} x {} matrix to scalar '{}'",
                            m.rows(),
                            m.cols(),
                            output.name
                        )));
                    }
                    ScalarValue::Double(m.get(0, 0))
                }
            };
            let vt = output.value_type;
            if scalar.value_type() == vt || vt == ValueType::String || scalar.value_type() == ValueType::String {
                Ok(Variable::Scalar(scalar))
            } else {
                Ok(Variable::Scalar(ScalarValue::from_f64(scalar.as_f64()?, vt)))
            }
        }
        DataType::Matrix => {
            let block = value.into_matrix()?;
            let handle = ctx.pool().create(block, ctx.new_chars(), output.value_type)?;
            Ok(Variable::Matrix(handle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::{JobOutput, JobStep, StepInput, TEMP_PREFIX};
    use crate::physical::{JobType, Operator, PartitioningSpec, PhysicalPlan};
    use crate::physical::LopDag;
    use common_error::ErrorKind;
    use mantis_core::{ExecType, MatrixBlock, MatrixCharacteristics, UnaryFunction, ValueFunction};

    fn config(dir: &tempfile::TempDir) -> MantisConfig {
        let mut config = MantisConfig::default();
        config.buffer_pool = BufferPoolConfig::new(dir.path().to_string_lossy());
        config
    }

    fn basic(instructions: Vec<Instruction>) -> ProgramBlock {
        ProgramBlock::Basic {
            instructions,
            plan: PhysicalPlan::new(LopDag::new(), Vec::new()),
        }
    }

    fn matrix(name: &str) -> Operand {
        Operand::variable(name, DataType::Matrix, ValueType::Double)
    }

    fn scalar(name: &str) -> Operand {
        Operand::variable(name, DataType::Scalar, ValueType::Double)
    }

    #[tokio::test]
    async fn test_compute_and_assign() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProgramExecutor::new(&config(&dir));
        let tmp = Operand::temp(1, DataType::Matrix, ValueType::Double);
        let program = Program::new(vec![basic(vec![
            Instruction::Compute {
                op: Operator::Binary(ValueFunction::Plus),
                inputs: vec![matrix("A"), matrix("B")],
                output: tmp.clone(),
            },
            Instruction::AssignVar {
                source: tmp.clone(),
                target: "C".into(),
            },
            Instruction::RemoveVar {
                names: vec![tmp.name.clone()],
            },
        ])]);
        let a = MatrixBlock::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let b = MatrixBlock::filled(2, 2, 10.0);
        let result = executor
            .execute(
                &program,
                [
                    ("A".to_string(), RuntimeValue::Matrix(a)),
                    ("B".to_string(), RuntimeValue::Matrix(b)),
                ],
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            result.matrix("C").unwrap().to_rows(),
            vec![vec![11.0, 12.0], vec![13.0, 14.0]]
        );
        assert!(result.variables.keys().all(|k| !k.starts_with(TEMP_PREFIX)));
        assert_eq!(result.stats.opcode("+").count, 1);
        assert_eq!(result.stats.opcode("rmvar").count, 1);
    }

    #[tokio::test]
    async fn test_domain_error_leaves_target_unbound() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let executor = ProgramExecutor::new(&cfg);
        let tmp = Operand::temp(1, DataType::Scalar, ValueType::Double);
        let program = Program::new(vec![basic(vec![
            Instruction::Compute {
                op: Operator::Unary(UnaryFunction::Sqrt),
                inputs: vec![scalar("x")],
                output: tmp.clone(),
            },
            Instruction::AssignVar {
                source: tmp,
                target: "y".into(),
            },
        ])]);

        let scratch = BufferPool::create_scratch_space(&cfg.buffer_pool).unwrap();
        let mut ctx = ExecutionContext::new(scratch, cfg.execution.clone(), RuntimeStatistics::new());
        ctx.bind_value("x", RuntimeValue::Scalar(ScalarValue::Double(-1.0)))
            .unwrap();
        let err = executor.execute_in(&program, &mut ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert!(!ctx.symbols().contains("y"));
        assert_eq!(ctx.symbols().names(), vec!["x".to_string()]);
        ctx.unwind().unwrap();
    }

    #[tokio::test]
    async fn test_for_loop_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProgramExecutor::new(&config(&dir));
        let bound = |v: i64| PredicateBlock {
            instructions: Vec::new(),
            result: Operand::literal(ScalarValue::Int(v)),
            cleanup: Vec::new(),
            plan: PhysicalPlan::new(LopDag::new(), Vec::new()),
        };
        let body = basic(vec![Instruction::Compute {
            op: Operator::Binary(ValueFunction::Plus),
            inputs: vec![
                Operand::variable("s", DataType::Scalar, ValueType::Int),
                Operand::variable("i", DataType::Scalar, ValueType::Int),
            ],
            output: Operand::variable("s", DataType::Scalar, ValueType::Int),
        }]);
        let program = Program::new(vec![ProgramBlock::For {
            var: "i".into(),
            from: bound(1),
            to: bound(4),
            body: vec![body],
        }]);
        let result = executor
            .execute(
                &program,
                [("s".to_string(), RuntimeValue::Scalar(ScalarValue::Int(0)))],
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.scalar("s"), Some(&ScalarValue::Int(10)));
        assert!(result.get("i").is_none());
    }

    fn sum_job(id: usize) -> JobSpec {
        JobSpec {
            id,
            exec_type: ExecType::MapReduce,
            job_type: JobType::Generic,
            steps: vec![
                JobStep {
                    op: Operator::PartialAggregate {
                        func: mantis_core::AggregateFunction::Sum,
                        direction: mantis_core::AggregateDirection::All,
                    },
                    inputs: vec![StepInput::Input(0)],
                    chars: MatrixCharacteristics::new(1, 1, 1000, 1000),
                },
                JobStep {
                    op: Operator::Group,
                    inputs: vec![StepInput::Step(0)],
                    chars: MatrixCharacteristics::new(1, 1, 1000, 1000),
                },
                JobStep {
                    op: Operator::Aggregate {
                        func: mantis_core::AggregateFunction::Sum,
                    },
                    inputs: vec![StepInput::Step(1)],
                    chars: MatrixCharacteristics::new(1, 1, 1000, 1000),
                },
            ],
            inputs: vec![matrix("A")],
            outputs: vec![JobOutput {
                step: 2,
                operand: matrix("S"),
            }],
            partitioning: PartitioningSpec::row_blocks(2, 0),
        }
    }

    #[tokio::test]
    async fn test_job_without_backend_runs_locally() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProgramExecutor::new(&config(&dir));
        let program = Program::new(vec![basic(vec![Instruction::Job(sum_job(1))])]);
        let a = MatrixBlock::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let result = executor
            .execute(
                &program,
                [("A".to_string(), RuntimeValue::Matrix(a))],
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.matrix("S").unwrap().get(0, 0), 10.0);
        assert_eq!(result.stats.jobs_submitted(), 1);
    }

    #[derive(Debug)]
    struct FlakyBackend {
        failures: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl DistributedBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn submit(&self, job: JobDescriptor) -> MantisResult<JobStatus> {
            use std::sync::atomic::Ordering;
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(MantisError::backend_transient("lost worker"));
            }
            run_local_job(&job)
        }

        async fn cancel(&self, _job_id: &str) -> MantisResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let executor = ProgramExecutor::new(&cfg);
        let program = Program::new(vec![basic(vec![Instruction::Job(sum_job(1))])]);
        let input = || [("A".to_string(), RuntimeValue::Matrix(MatrixBlock::filled(2, 2, 1.0)))];

        let backend = Arc::new(FlakyBackend {
            failures: std::sync::atomic::AtomicU32::new(2),
        });
        let result = executor
            .execute(&program, input(), Some(backend), None)
            .await
            .unwrap();
        assert_eq!(result.stats.retries(), 2);
        assert_eq!(result.stats.jobs_submitted(), 3);

        let backend = Arc::new(FlakyBackend {
            failures: std::sync::atomic::AtomicU32::new(cfg.execution.max_transient_retries + 1),
        });
        let err = executor
            .execute(&program, input(), Some(backend), None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ProgramExecutor::new(&config(&dir));
        let program = Program::new(vec![basic(vec![Instruction::RemoveVar {
            names: vec!["x".into()],
        }])]);
        let (handle, rx) = crate::executor::CancellationHandle::new();
        handle.cancel();
        let err = executor
            .execute(&program, Vec::new(), None, Some(rx))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cancelled"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
