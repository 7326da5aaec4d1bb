//! Operator kernels shared by in-process instructions and job steps.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use common_error::{MantisError, MantisResult};
use mantis_core::{
    AggState, AggregateDirection, AggregateFunction, IndexFunction, MatrixBlock, RandSpec,
    ScalarValue, UnaryFunction, ValueType,
};
use mantis_logical::{AppendKind, ReorgOp};
use uuid::Uuid;

use crate::instructions::{DatasetRef, JobDescriptor, JobInput, JobStatus, StepInput};
use crate::memory::spill;
use crate::physical::Operator;

/// Keyed accumulator states produced on the map side of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialAggregates {
    pub rows: usize,
    pub cols: usize,
    pub cells: BTreeMap<(usize, usize), AggState>,
}

impl PartialAggregates {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: BTreeMap::new(),
        }
    }

    /// One state per cell of `block`, placed at `(row_offset, col_offset)`.
    pub fn from_block(
        block: &MatrixBlock,
        func: AggregateFunction,
        rows: usize,
        cols: usize,
        row_offset: usize,
        col_offset: usize,
    ) -> Self {
        let mut out = Self::new(rows, cols);
        for i in 0..block.rows() {
            for j in 0..block.cols() {
                let mut state = func.init();
                state.accumulate(block.get(i, j));
                out.insert((i + row_offset, j + col_offset), state);
            }
        }
        out
    }

    pub fn insert(&mut self, key: (usize, usize), state: AggState) {
        match self.cells.get_mut(&key) {
            Some(existing) => existing.merge(&state),
            None => {
                self.cells.insert(key, state);
            }
        }
    }

    /// Merge another partition's states.
    pub fn merge(&mut self, other: PartialAggregates) -> MantisResult<()> {
        if (self.rows, self.cols) != (other.rows, other.cols) {
            return Err(MantisError::internal(format!(
                "cannot merge partial aggregates of {}x{} and {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        for (key, state) in other.cells {
            self.insert(key, state);
        }
        Ok(())
    }

    /// Final values; cells without any state are zero.
    pub fn finish(&self) -> MatrixBlock {
        let mut out = MatrixBlock::new(self.rows, self.cols);
        for ((i, j), state) in &self.cells {
            out.set(*i, *j, state.finish());
        }
        out
    }
}

/// A value flowing between job steps or instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum StepValue {
    Scalar(ScalarValue),
    Matrix(Arc<MatrixBlock>),
    Partials(PartialAggregates),
}

impl StepValue {
    pub fn matrix(block: MatrixBlock) -> Self {
        Self::Matrix(Arc::new(block))
    }

    pub fn as_matrix(&self) -> MantisResult<&MatrixBlock> {
        match self {
            Self::Matrix(m) => Ok(m),
            other => Err(MantisError::type_error(format!(
                "expected matrix operand, got {}",
                other.kind_name()
            ))),
        }
    }

    pub fn as_scalar(&self) -> MantisResult<&ScalarValue> {
        match self {
            Self::Scalar(s) => Ok(s),
            other => Err(MantisError::type_error(format!(
                "expected scalar operand, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Materialize as a matrix, finishing partial states.
    pub fn into_matrix(self) -> MantisResult<MatrixBlock> {
        match self {
            Self::Matrix(m) => Ok(Arc::unwrap_or_clone(m)),
            Self::Partials(p) => Ok(p.finish()),
            Self::Scalar(s) => Ok(MatrixBlock::filled(1, 1, s.as_f64()?)),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Matrix(_) => "matrix",
            Self::Partials(_) => "partial aggregates",
        }
    }
}

/// Zero-based half-open bounds of a range re-indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRange {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl IndexRange {
    /// Resolve 1-based inclusive bounds against a `rows x cols` matrix.
    pub fn resolve(bounds: &[StepValue], rows: usize, cols: usize) -> MantisResult<Self> {
        let [rl, ru, cl, cu] = bounds else {
            return Err(MantisError::internal(format!(
                "range re-indexing expects 4 bounds, got {}",
                bounds.len()
            )));
        };
        let bound = |v: &StepValue| v.as_scalar()?.as_i64();
        let (rl, ru, cl, cu) = (bound(rl)?, bound(ru)?, bound(cl)?, bound(cu)?);
        let valid = |lo: i64, hi: i64, n: usize| lo >= 1 && lo <= hi && hi <= n as i64;
        if !valid(rl, ru, rows) || !valid(cl, cu, cols) {
            return Err(MantisError::value_error(format!(
                "index range [{rl}:{ru}, {cl}:{cu}] out of bounds for {rows} x {cols} matrix"
            )));
        }
        Ok(Self {
            rows: (rl - 1) as usize..ru as usize,
            cols: (cl - 1) as usize..cu as usize,
        })
    }

    pub fn output_dims(&self) -> (usize, usize) {
        (self.rows.len(), self.cols.len())
    }

    /// Cells of the range falling into a row partition starting at `row_offset`.
    pub fn partial(&self, block: &MatrixBlock, row_offset: usize) -> MantisResult<PartialAggregates> {
        let (rows, cols) = self.output_dims();
        let start = self.rows.start.max(row_offset);
        let end = self.rows.end.min(row_offset + block.rows());
        if start >= end {
            return Ok(PartialAggregates::new(rows, cols));
        }
        let slice = block.slice(start - row_offset..end - row_offset, self.cols.clone())?;
        Ok(PartialAggregates::from_block(
            &slice,
            AggregateFunction::Sum,
            rows,
            cols,
            start - self.rows.start,
            0,
        ))
    }
}

/// Resolved operands of a random generator.
#[derive(Debug, Clone, PartialEq)]
pub struct DataGenParams {
    pub rows: usize,
    pub cols: usize,
    pub spec: RandSpec,
}

impl DataGenParams {
    /// Read `[rows, cols, min, max, sparsity, seed]`. A negative seed is
    /// replaced by a fresh one.
    pub fn resolve(operands: &[StepValue]) -> MantisResult<Self> {
        let [rows, cols, min, max, sparsity, seed] = operands else {
            return Err(MantisError::internal(format!(
                "rand expects 6 operands, got {}",
                operands.len()
            )));
        };
        let extent = |v: &StepValue, what: &str| -> MantisResult<usize> {
            let n = v.as_scalar()?.as_i64()?;
            usize::try_from(n)
                .map_err(|_| MantisError::value_error(format!("rand with negative {what} {n}")))
        };
        let number = |v: &StepValue| v.as_scalar()?.as_f64();
        let seed = match seed.as_scalar()?.as_i64()? {
            s if s >= 0 => s as u64,
            _ => fresh_seed(),
        };
        Ok(Self {
            rows: extent(rows, "rows")?,
            cols: extent(cols, "cols")?,
            spec: RandSpec::new(number(min)?, number(max)?, number(sparsity)?, seed)?,
        })
    }

    /// Scalar operands that reproduce these parameters exactly.
    pub fn operands(&self) -> Vec<StepValue> {
        [
            ScalarValue::Int(self.rows as i64),
            ScalarValue::Int(self.cols as i64),
            ScalarValue::Double(self.spec.min),
            ScalarValue::Double(self.spec.max),
            ScalarValue::Double(self.spec.sparsity),
            ScalarValue::Int(self.spec.seed as i64),
        ]
        .into_iter()
        .map(StepValue::Scalar)
        .collect()
    }

    /// The given rows of the generated matrix.
    pub fn generate(&self, rows: Range<usize>) -> MatrixBlock {
        MatrixBlock::rand(rows, self.cols, &self.spec)
    }
}

/// A non-negative seed that survives a round trip through `i64`.
fn fresh_seed() -> u64 {
    Uuid::new_v4().as_u64_pair().0 >> 1
}

/// Give every generator of `job` that asks for a fresh seed its own fixed
/// seed, so retries and lineage replays reproduce the same matrix.
pub fn pin_random_seeds(job: &mut JobDescriptor) {
    const SEED: usize = 5;
    for idx in 0..job.steps.len() {
        if job.steps[idx].op != Operator::DataGen {
            continue;
        }
        let Some(StepInput::Input(i)) = job.steps[idx].inputs.get(SEED).copied() else {
            continue;
        };
        let unspecified = matches!(
            job.inputs.get(i),
            Some(JobInput::Scalar(s)) if s.as_i64().is_ok_and(|seed| seed < 0)
        );
        if unspecified {
            job.inputs
                .push(JobInput::Scalar(ScalarValue::Int(fresh_seed() as i64)));
            job.steps[idx].inputs[SEED] = StepInput::Input(job.inputs.len() - 1);
        }
    }
}

/// Output dimensions of an aggregate over a `rows x cols` matrix.
pub fn aggregate_dims(direction: AggregateDirection, rows: usize, cols: usize) -> (usize, usize) {
    let (r, c) = direction
        .index_function()
        .compute_dimension(rows as i64, cols as i64);
    (r as usize, c as usize)
}

/// Map-side aggregate of a block placed at `row_offset` in a matrix of `total_rows`.
pub fn partial_aggregate(
    block: &MatrixBlock,
    func: AggregateFunction,
    direction: AggregateDirection,
    row_offset: usize,
    total_rows: usize,
) -> MantisResult<PartialAggregates> {
    if direction == AggregateDirection::Diag && total_rows != block.cols() {
        return Err(MantisError::structural(format!(
            "trace requires a square matrix, got {} x {}",
            total_rows,
            block.cols()
        )));
    }
    let index: IndexFunction = direction.index_function();
    let (rows, cols) = aggregate_dims(direction, total_rows, block.cols());
    let mut out = PartialAggregates::new(rows, cols);
    for (key, state) in block.partial_aggregate(func, index, row_offset, 0) {
        out.insert(key, state);
    }
    Ok(out)
}

/// Apply `op` to whole operands.
pub fn apply(op: &Operator, inputs: &[StepValue], strict: bool) -> MantisResult<StepValue> {
    if inputs.len() != op.arity() {
        return Err(MantisError::internal(format!(
            "{op} expects {} operands, got {}",
            op.arity(),
            inputs.len()
        )));
    }
    let out = match op {
        Operator::Unary(f) => match &inputs[0] {
            StepValue::Scalar(s) => StepValue::Scalar(unary_scalar(*f, s, strict)?),
            other => StepValue::matrix(other.as_matrix()?.unary(*f, strict)?),
        },
        Operator::Binary(f) => match (&inputs[0], &inputs[1]) {
            (StepValue::Scalar(a), StepValue::Scalar(b)) => {
                StepValue::Scalar(f.execute_scalar(a, b)?)
            }
            (StepValue::Matrix(m), StepValue::Scalar(s)) => {
                StepValue::matrix(m.scalar_op(s.as_f64()?, *f, false))
            }
            (StepValue::Scalar(s), StepValue::Matrix(m)) => {
                StepValue::matrix(m.scalar_op(s.as_f64()?, *f, true))
            }
            (a, b) => StepValue::matrix(a.as_matrix()?.binary(b.as_matrix()?, *f)?),
        },
        Operator::Reorg(ReorgOp::Transpose) => StepValue::matrix(inputs[0].as_matrix()?.transpose()),
        Operator::Reorg(ReorgOp::Diag) => StepValue::matrix(inputs[0].as_matrix()?.diag()?),
        Operator::Append(kind) => {
            let (a, b) = (inputs[0].as_matrix()?, inputs[1].as_matrix()?);
            StepValue::matrix(match kind {
                AppendKind::CBind => a.cbind(b)?,
                AppendKind::RBind => a.rbind(b)?,
            })
        }
        Operator::AggregateUnary { func, direction } => {
            StepValue::matrix(inputs[0].as_matrix()?.aggregate(*func, *direction)?)
        }
        Operator::PartialAggregate { func, direction } => {
            let m = inputs[0].as_matrix()?;
            StepValue::Partials(partial_aggregate(m, *func, *direction, 0, m.rows())?)
        }
        Operator::Group => match &inputs[0] {
            StepValue::Scalar(_) => {
                return Err(MantisError::type_error("cannot group a scalar"));
            }
            other => other.clone(),
        },
        Operator::Aggregate { .. } => match &inputs[0] {
            StepValue::Partials(p) => StepValue::matrix(p.finish()),
            StepValue::Matrix(m) => StepValue::Matrix(Arc::clone(m)),
            StepValue::Scalar(_) => {
                return Err(MantisError::type_error("cannot aggregate a scalar"));
            }
        },
        Operator::MatMult | Operator::MapMult => {
            StepValue::matrix(inputs[0].as_matrix()?.matmult(inputs[1].as_matrix()?)?)
        }
        Operator::Cpmm => {
            let product = inputs[0].as_matrix()?.matmult(inputs[1].as_matrix()?)?;
            StepValue::Partials(sum_partials(&product))
        }
        Operator::ZipMult => {
            let product = inputs[0]
                .as_matrix()?
                .transpose_self_matmult(inputs[1].as_matrix()?)?;
            StepValue::Partials(sum_partials(&product))
        }
        Operator::RangeReIndex => {
            let m = inputs[0].as_matrix()?;
            let range = IndexRange::resolve(&inputs[1..], m.rows(), m.cols())?;
            StepValue::Partials(range.partial(m, 0)?)
        }
        Operator::CastToScalar => {
            let m = inputs[0].as_matrix()?;
            if m.rows() != 1 || m.cols() != 1 {
                return Err(MantisError::value_error(format!(
                    "cannot cast a {} x {} matrix to a scalar",
                    m.rows(),
                    m.cols()
                )));
            }
            StepValue::Scalar(ScalarValue::Double(m.get(0, 0)))
        }
        Operator::DataGen => {
            let params = DataGenParams::resolve(inputs)?;
            StepValue::matrix(params.generate(0..params.rows))
        }
        Operator::Dimension(d) => {
            let m = inputs[0].as_matrix()?;
            let value = d
                .evaluate(m.rows() as i64, m.cols() as i64)
                .ok_or_else(|| MantisError::internal(format!("{d:?} of a materialized matrix")))?;
            StepValue::Scalar(ScalarValue::Int(value))
        }
    };
    Ok(out)
}

fn sum_partials(block: &MatrixBlock) -> PartialAggregates {
    PartialAggregates::from_block(
        block,
        AggregateFunction::Sum,
        block.rows(),
        block.cols(),
        0,
        0,
    )
}

fn unary_scalar(f: UnaryFunction, s: &ScalarValue, strict: bool) -> MantisResult<ScalarValue> {
    let v = f.execute(s.as_f64()?, strict)?;
    let vt = match (f, s.value_type()) {
        (UnaryFunction::Not, _) => ValueType::Boolean,
        (f, ValueType::Int) if f.preserves_int() => ValueType::Int,
        _ => ValueType::Double,
    };
    Ok(ScalarValue::from_f64(v, vt))
}

/// Read a job's inputs into step values.
pub fn load_inputs(job: &JobDescriptor) -> MantisResult<Vec<StepValue>> {
    job.inputs
        .iter()
        .map(|input| match input {
            JobInput::Dataset(ds) => Ok(StepValue::matrix(spill::read_block(&ds.path)?.0)),
            JobInput::Scalar(s) => Ok(StepValue::Scalar(s.clone())),
        })
        .collect()
}

/// Write one block per job output into the job's output directory.
pub fn write_outputs(job: &JobDescriptor, blocks: &[MatrixBlock]) -> MantisResult<JobStatus> {
    if blocks.len() != job.outputs.len() {
        return Err(MantisError::internal(format!(
            "job {} produced {} outputs, expected {}",
            job.job_id,
            blocks.len(),
            job.outputs.len()
        )));
    }
    let outputs = blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let id = job.output_name(i);
            let path = job.output_dir.join(format!("{id}.bin"));
            let chars = job
                .outputs
                .get(i)
                .and_then(|s| job.steps.get(*s))
                .map(|s| s.chars)
                .unwrap_or_default();
            let meta = spill::write_block(&path, block, &chars, ValueType::Double)?;
            Ok(DatasetRef {
                id,
                path,
                chars: meta.chars,
                value_type: meta.value_type,
            })
        })
        .collect::<MantisResult<Vec<_>>>()?;
    Ok(JobStatus {
        job_id: job.job_id.clone(),
        outputs,
    })
}

/// Run a job descriptor in-process over whole matrices.
///
/// Used when no distributed backend is attached and to rebuild objects from
/// lineage. Returns one block per descriptor output.
pub fn run_job_locally(job: &JobDescriptor) -> MantisResult<Vec<MatrixBlock>> {
    let inputs = load_inputs(job)?;

    let mut results: Vec<StepValue> = Vec::with_capacity(job.steps.len());
    for (idx, step) in job.steps.iter().enumerate() {
        let operands = step
            .inputs
            .iter()
            .map(|input| match input {
                StepInput::Input(i) => inputs.get(*i).cloned(),
                StepInput::Step(s) if *s < idx => results.get(*s).cloned(),
                StepInput::Step(_) => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                MantisError::internal(format!("job {} step {idx} has a dangling input", job.job_id))
            })?;
        results.push(apply(&step.op, &operands, job.strict)?);
    }

    job.outputs
        .iter()
        .map(|i| {
            results
                .get(*i)
                .cloned()
                .ok_or_else(|| MantisError::internal(format!("job output step {i} missing")))?
                .into_matrix()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::JobStep;
    use crate::physical::{JobType, PartitioningSpec};
    use common_error::ErrorKind;
    use mantis_core::{ExecType, MatrixCharacteristics, ValueFunction};
    use mantis_logical::DimensionOp;

    fn m(rows: &[Vec<f64>]) -> StepValue {
        StepValue::matrix(MatrixBlock::from_rows(rows).unwrap())
    }

    fn int(v: i64) -> StepValue {
        StepValue::Scalar(ScalarValue::Int(v))
    }

    #[test]
    fn test_binary_broadcast_scalar() {
        let a = m(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        let out = apply(
            &Operator::Binary(ValueFunction::Minus),
            &[StepValue::Scalar(ScalarValue::Double(10.0)), a],
            true,
        )
        .unwrap();
        assert_eq!(
            out.into_matrix().unwrap().to_rows(),
            vec![vec![9.0, 8.0], vec![7.0, 6.0]]
        );
    }

    #[test]
    fn test_unary_scalar_types() {
        let out = apply(&Operator::Unary(UnaryFunction::Abs), &[int(-3)], true).unwrap();
        assert_eq!(out, StepValue::Scalar(ScalarValue::Int(3)));

        let err = apply(
            &Operator::Unary(UnaryFunction::Sqrt),
            &[StepValue::Scalar(ScalarValue::Double(-4.0))],
            true,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Domain);

        let lenient = apply(
            &Operator::Unary(UnaryFunction::Sqrt),
            &[StepValue::Scalar(ScalarValue::Double(-4.0))],
            false,
        )
        .unwrap();
        assert!(matches!(lenient, StepValue::Scalar(ScalarValue::Double(v)) if v.is_nan()));
    }

    #[test]
    fn test_group_aggregate_matches_cp() {
        let a = m(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let func = AggregateFunction::Mean;
        let direction = AggregateDirection::Col;
        let partial = apply(&Operator::PartialAggregate { func, direction }, &[a.clone()], true).unwrap();
        let grouped = apply(&Operator::Group, &[partial], true).unwrap();
        let dist = apply(&Operator::Aggregate { func }, &[grouped], true).unwrap();
        let cp = apply(&Operator::AggregateUnary { func, direction }, &[a], true).unwrap();
        assert_eq!(dist, cp);
    }

    #[test]
    fn test_partials_merge_across_partitions() {
        let block = MatrixBlock::from_rows(&[
            vec![1.0, 2.0],
            vec![3.0, 4.0],
            vec![5.0, 6.0],
        ])
        .unwrap();
        let top = block.slice(0..2, 0..2).unwrap();
        let bottom = block.slice(2..3, 0..2).unwrap();
        let func = AggregateFunction::Sum;
        let mut merged = partial_aggregate(&top, func, AggregateDirection::Col, 0, 3).unwrap();
        merged
            .merge(partial_aggregate(&bottom, func, AggregateDirection::Col, 2, 3).unwrap())
            .unwrap();
        assert_eq!(merged.finish().to_rows(), vec![vec![9.0, 12.0]]);

        let square = MatrixBlock::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let mut trace = partial_aggregate(
            &square.slice(0..1, 0..2).unwrap(),
            func,
            AggregateDirection::Diag,
            0,
            2,
        )
        .unwrap();
        trace
            .merge(
                partial_aggregate(
                    &square.slice(1..2, 0..2).unwrap(),
                    func,
                    AggregateDirection::Diag,
                    1,
                    2,
                )
                .unwrap(),
            )
            .unwrap();
        assert_eq!(trace.finish().get(0, 0), 5.0);
    }

    #[test]
    fn test_range_reindex() {
        let a = m(&[
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ]);
        let out = apply(&Operator::RangeReIndex, &[a.clone(), int(2), int(3), int(2), int(3)], true)
            .unwrap()
            .into_matrix()
            .unwrap();
        assert_eq!(out.to_rows(), vec![vec![5.0, 6.0], vec![8.0, 9.0]]);

        let err = apply(&Operator::RangeReIndex, &[a, int(0), int(3), int(1), int(1)], true)
            .unwrap_err();
        assert!(matches!(err, MantisError::ValueError(_)));
    }

    #[test]
    fn test_range_partial_by_partition() {
        let block = MatrixBlock::from_rows(&[
            vec![1.0, 2.0],
            vec![3.0, 4.0],
            vec![5.0, 6.0],
            vec![7.0, 8.0],
        ])
        .unwrap();
        let range = IndexRange::resolve(&[int(2), int(3), int(1), int(2)], 4, 2).unwrap();
        let mut out = range.partial(&block.slice(0..2, 0..2).unwrap(), 0).unwrap();
        out.merge(range.partial(&block.slice(2..4, 0..2).unwrap(), 2).unwrap())
            .unwrap();
        assert_eq!(out.finish().to_rows(), vec![vec![3.0, 4.0], vec![5.0, 6.0]]);
    }

    #[test]
    fn test_zip_and_cpmm_agree_with_matmult() {
        let x = m(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
        let y = m(&[vec![1.0], vec![0.5], vec![2.0]]);
        let zip = apply(&Operator::ZipMult, &[x.clone(), y.clone()], true)
            .unwrap()
            .into_matrix()
            .unwrap();
        let xt = apply(&Operator::Reorg(ReorgOp::Transpose), &[x], true).unwrap();
        let mm = apply(&Operator::MatMult, &[xt.clone(), y.clone()], true)
            .unwrap()
            .into_matrix()
            .unwrap();
        let cpmm = apply(&Operator::Cpmm, &[xt, y], true)
            .unwrap()
            .into_matrix()
            .unwrap();
        assert_eq!(zip, mm);
        assert_eq!(cpmm, mm);
    }

    #[test]
    fn test_cast_to_scalar() {
        let one = m(&[vec![42.0]]);
        assert_eq!(
            apply(&Operator::CastToScalar, &[one], true).unwrap(),
            StepValue::Scalar(ScalarValue::Double(42.0))
        );
        let two = m(&[vec![1.0, 2.0]]);
        assert!(apply(&Operator::CastToScalar, &[two], true).is_err());
    }

    fn rand_operands(rows: i64, cols: i64, seed: i64) -> Vec<StepValue> {
        let d = |v: f64| StepValue::Scalar(ScalarValue::Double(v));
        vec![int(rows), int(cols), d(0.0), d(1.0), d(1.0), int(seed)]
    }

    #[test]
    fn test_datagen_seeded_and_fresh() {
        let fixed = |seed| {
            apply(&Operator::DataGen, &rand_operands(3, 100, seed), true)
                .unwrap()
                .into_matrix()
                .unwrap()
        };
        let a = fixed(7);
        assert_eq!((a.rows(), a.cols()), (3, 100));
        let spec = RandSpec::new(0.0, 1.0, 1.0, 7).unwrap();
        assert!(a.bit_eq(&MatrixBlock::rand(0..3, 100, &spec)));
        assert!(!fixed(-1).bit_eq(&fixed(-1)));

        let params = DataGenParams::resolve(&rand_operands(2, 2, -1)).unwrap();
        let again = DataGenParams::resolve(&params.operands()).unwrap();
        assert_eq!(again, params);

        let err = apply(&Operator::DataGen, &rand_operands(-2, 2, 1), true).unwrap_err();
        assert!(matches!(err, MantisError::ValueError(_)));
    }

    #[test]
    fn test_dimensions_of_materialized_matrix() {
        let a = m(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        let dim = |op| apply(&Operator::Dimension(op), &[a.clone()], true).unwrap();
        assert_eq!(dim(DimensionOp::Nrow), int(2));
        assert_eq!(dim(DimensionOp::Ncol), int(3));
        assert_eq!(dim(DimensionOp::Length), int(6));
    }

    #[test]
    fn test_unspecified_seeds_pinned_per_generator() {
        let step = JobStep {
            op: Operator::DataGen,
            inputs: (0..6).map(StepInput::Input).collect(),
            chars: MatrixCharacteristics::unknown(),
        };
        let mut job = JobDescriptor {
            job_id: "job1_1".into(),
            exec_type: ExecType::Collection,
            job_type: JobType::Generic,
            steps: vec![step.clone(), step],
            inputs: rand_operands(2, 2, -1)
                .into_iter()
                .map(|v| JobInput::Scalar(v.as_scalar().unwrap().clone()))
                .collect(),
            outputs: vec![0, 1],
            output_dir: std::env::temp_dir(),
            partitioning: PartitioningSpec::row_blocks(2, 0),
            strict: true,
        };
        pin_random_seeds(&mut job);
        assert_eq!(job.inputs.len(), 8);
        assert_eq!(job.steps[0].inputs[5], StepInput::Input(6));
        assert_eq!(job.steps[1].inputs[5], StepInput::Input(7));

        let first = run_job_locally(&job).unwrap();
        let second = run_job_locally(&job).unwrap();
        assert!(first[0].bit_eq(&second[0]));
        assert!(!first[0].bit_eq(&first[1]));
    }
}
