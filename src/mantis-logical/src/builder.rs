//! Construction of the logical program from the front-end AST.
//!
//! One DAG is built per straight-line block. A variable assigned earlier in
//! the same block resolves to the node that computed it, so a reused
//! sub-result becomes a shared node with several parents instead of being
//! recomputed. Variables from earlier blocks are read through
//! `TransientRead` nodes, and every variable a block assigns is published
//! through a `TransientWrite` root.

use std::collections::HashMap;

use common_error::{MantisError, MantisResult};
use log::debug;
use mantis_core::{DataType, ExecType, MatrixCharacteristics, UNKNOWN, ValueType};

use crate::ast::{Expr, ExprKind, ProgramAst, Statement, StatementBlock};
use crate::dag::HopDag;
use crate::hop::{DataOpKind, Hop, HopId, HopKind};
use crate::inference::propagate_characteristics;
use crate::program::{LogicalBlock, LogicalProgram};

/// What the compiler knows about a live variable between blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub data_type: DataType,
    pub value_type: ValueType,
    pub chars: MatrixCharacteristics,
    pub sparsity: f64,
}

impl VariableInfo {
    fn of(hop: &Hop) -> Self {
        Self {
            data_type: hop.data_type,
            value_type: hop.value_type,
            chars: hop.chars,
            sparsity: hop.sparsity,
        }
    }

    fn with_unknown_dims(&self) -> Self {
        let mut info = self.clone();
        if info.data_type.is_matrix() {
            info.chars = MatrixCharacteristics::unknown()
                .with_blocking(info.chars.rows_per_block, info.chars.cols_per_block);
        }
        info
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.data_type == other.data_type
            && self.chars.rows == other.chars.rows
            && self.chars.cols == other.chars.cols
    }
}

type Catalog = HashMap<String, VariableInfo>;

/// Builds a [`LogicalProgram`] from a [`ProgramAst`].
pub struct ProgramBuilder {
    block_size: i64,
    catalog: Catalog,
}

impl ProgramBuilder {
    pub fn new(block_size: i64) -> Self {
        Self {
            block_size,
            catalog: HashMap::new(),
        }
    }

    /// Declare a variable that is live before the first block.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, info: VariableInfo) -> Self {
        self.catalog.insert(name.into(), info);
        self
    }

    pub fn build(mut self, ast: &ProgramAst) -> MantisResult<LogicalProgram> {
        let blocks = self.build_blocks(&ast.blocks)?;
        debug!("Built logical program with {} top-level blocks", blocks.len());
        Ok(LogicalProgram::new(blocks))
    }

    fn build_blocks(&mut self, blocks: &[StatementBlock]) -> MantisResult<Vec<LogicalBlock>> {
        blocks.iter().map(|b| self.build_block(b)).collect()
    }

    fn build_block(&mut self, block: &StatementBlock) -> MantisResult<LogicalBlock> {
        match block {
            StatementBlock::Basic(statements) => {
                Ok(LogicalBlock::Basic(self.build_statements(statements)?))
            }
            StatementBlock::If {
                predicate,
                then_blocks,
                else_blocks,
            } => {
                let predicate = self.build_expression(predicate)?;
                let before = self.catalog.clone();
                let then_blocks = self.build_blocks(then_blocks)?;
                let after_then = std::mem::replace(&mut self.catalog, before);
                let else_blocks = self.build_blocks(else_blocks)?;
                self.catalog = merge_catalogs(&after_then, &self.catalog);
                Ok(LogicalBlock::If {
                    predicate,
                    then_blocks,
                    else_blocks,
                })
            }
            StatementBlock::While { predicate, body } => {
                self.stabilize_loop(block, None)?;
                let predicate = self.build_expression(predicate)?;
                let body = self.build_blocks(body)?;
                Ok(LogicalBlock::While { predicate, body })
            }
            StatementBlock::For {
                var,
                from,
                to,
                body,
            } => {
                let from = self.build_expression(from)?;
                let to = self.build_expression(to)?;
                self.stabilize_loop(block, Some(var))?;
                let body = self.build_blocks(body)?;
                Ok(LogicalBlock::For {
                    var: var.clone(),
                    from,
                    to,
                    body,
                })
            }
        }
    }

    /// Mark variables whose shape changes across loop iterations as unknown.
    fn stabilize_loop(
        &mut self,
        block: &StatementBlock,
        loop_var: Option<&String>,
    ) -> MantisResult<()> {
        if let Some(var) = loop_var {
            self.catalog.insert(
                var.clone(),
                VariableInfo {
                    data_type: DataType::Scalar,
                    value_type: ValueType::Int,
                    chars: MatrixCharacteristics::scalar(),
                    sparsity: 1.0,
                },
            );
        }
        let body = match block {
            StatementBlock::While { body, .. } | StatementBlock::For { body, .. } => body,
            _ => return Ok(()),
        };
        let mut assigned = Vec::new();
        block.assigned_variables(&mut assigned);

        let before = self.catalog.clone();
        self.build_blocks(body)?;
        let after = std::mem::replace(&mut self.catalog, before);
        for name in assigned {
            let Some(post) = after.get(&name) else {
                continue;
            };
            let stable = match self.catalog.get(&name) {
                Some(pre) if pre.same_shape(post) => pre.clone(),
                _ => {
                    debug!("Loop-carried variable '{name}' has varying shape");
                    post.with_unknown_dims()
                }
            };
            self.catalog.insert(name, stable);
        }
        Ok(())
    }

    /// DAG for a predicate or loop bound: the expression is its only root.
    fn build_expression(&mut self, expr: &Expr) -> MantisResult<HopDag> {
        let mut builder = DagBuilder::new(&self.catalog, self.block_size);
        let root = builder.expr(expr)?;
        let mut dag = builder.dag;
        dag.add_root(root);
        propagate_characteristics(&mut dag, self.block_size)?;
        Ok(dag)
    }

    fn build_statements(&mut self, statements: &[Statement]) -> MantisResult<HopDag> {
        let mut builder = DagBuilder::new(&self.catalog, self.block_size);
        let mut order: Vec<String> = Vec::new();
        for stmt in statements {
            builder.statement(stmt)?;
            if !order.contains(&stmt.target) {
                order.push(stmt.target.clone());
            }
        }

        let DagBuilder {
            mut dag,
            bindings,
            reads,
            inputs,
            ..
        } = builder;
        let mut writes = Vec::new();
        for name in order {
            let src = bindings[&name];
            // `x = x` publishes nothing new.
            if reads.get(&name) == Some(&src) {
                continue;
            }
            let (data_type, value_type) = (dag[src].data_type, dag[src].value_type);
            let write = dag.add_hop(
                HopKind::Data {
                    op: DataOpKind::TransientWrite,
                    name: name.clone(),
                },
                data_type,
                value_type,
                vec![src],
            );
            dag.add_root(write);
            writes.push((name, write));
        }
        propagate_characteristics(&mut dag, self.block_size)?;

        for (name, write) in writes {
            self.catalog.insert(name, VariableInfo::of(&dag[write]));
        }
        // Inputs stay bound under their own names for later blocks.
        for (name, read) in inputs {
            self.catalog
                .entry(name)
                .or_insert_with(|| VariableInfo::of(&dag[read]));
        }
        Ok(dag)
    }
}

/// Merge the variable knowledge of two alternative branches.
fn merge_catalogs(a: &Catalog, b: &Catalog) -> Catalog {
    let mut out = b.clone();
    for (name, info) in a {
        match b.get(name) {
            Some(other) if other.same_shape(info) => {}
            Some(_) => {
                out.insert(name.clone(), info.with_unknown_dims());
            }
            None => {
                out.insert(name.clone(), info.clone());
            }
        }
    }
    out
}

struct DagBuilder<'a> {
    dag: HopDag,
    catalog: &'a Catalog,
    block_size: i64,
    /// Variables assigned so far in this block.
    bindings: HashMap<String, HopId>,
    /// Transient reads created for variables of earlier blocks.
    reads: HashMap<String, HopId>,
    /// Persistent reads by input name.
    inputs: HashMap<String, HopId>,
}

impl<'a> DagBuilder<'a> {
    fn new(catalog: &'a Catalog, block_size: i64) -> Self {
        Self {
            dag: HopDag::new(),
            catalog,
            block_size,
            bindings: HashMap::new(),
            reads: HashMap::new(),
            inputs: HashMap::new(),
        }
    }

    fn statement(&mut self, stmt: &Statement) -> MantisResult<()> {
        let first_new = self.dag.ids().last().map_or(0, |id| id.0 + 1);
        let hop = self.expr(&stmt.expr)?;
        if let Some(hint) = stmt.exec_hint {
            self.force_exec_type(first_new, hint);
        }
        self.bindings.insert(stmt.target.clone(), hop);
        Ok(())
    }

    /// Pin every matrix operator created since `first_new` to `exec_type`.
    fn force_exec_type(&mut self, first_new: usize, exec_type: ExecType) {
        let ids: Vec<HopId> = self
            .dag
            .ids()
            .into_iter()
            .filter(|id| id.0 >= first_new)
            .collect();
        for id in ids {
            let is_matrix_op = {
                let hop = &self.dag[id];
                !hop.kind.is_data()
                    && (hop.is_matrix() || hop.inputs.iter().any(|i| self.dag[*i].is_matrix()))
            };
            if is_matrix_op {
                self.dag[id].forced_exec_type = Some(exec_type);
            }
        }
    }

    fn add(&mut self, kind: HopKind, expr: &Expr, inputs: Vec<HopId>) -> HopId {
        self.dag.add_hop(kind, expr.data_type, expr.value_type, inputs)
    }

    fn expr(&mut self, expr: &Expr) -> MantisResult<HopId> {
        let id = match &expr.kind {
            ExprKind::Literal(v) => self.add(HopKind::Literal(v.clone()), expr, vec![]),
            ExprKind::Variable(name) => self.variable(name, expr)?,
            ExprKind::Read {
                name,
                rows,
                cols,
                sparsity,
            } => {
                if let Some(id) = self.inputs.get(name) {
                    return Ok(*id);
                }
                let id = self.add(
                    HopKind::Data {
                        op: DataOpKind::PersistentRead,
                        name: name.clone(),
                    },
                    expr,
                    vec![],
                );
                let hop = &mut self.dag[id];
                let nnz = if *rows >= 0 && *cols >= 0 {
                    (*rows as f64 * *cols as f64 * sparsity).round() as i64
                } else {
                    UNKNOWN
                };
                hop.chars =
                    MatrixCharacteristics::new(*rows, *cols, self.block_size, self.block_size)
                        .with_nnz(nnz);
                hop.sparsity = sparsity.clamp(0.0, 1.0);
                self.inputs.insert(name.clone(), id);
                id
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                self.add(HopKind::Binary(*op), expr, vec![l, r])
            }
            ExprKind::Unary { op, input } => {
                let i = self.expr(input)?;
                self.add(HopKind::Unary(*op), expr, vec![i])
            }
            ExprKind::Aggregate {
                func,
                direction,
                input,
            } => {
                let i = self.expr(input)?;
                self.add(
                    HopKind::Aggregate {
                        func: *func,
                        direction: *direction,
                    },
                    expr,
                    vec![i],
                )
            }
            ExprKind::MatMult { left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                self.add(HopKind::AggregateBinary, expr, vec![l, r])
            }
            ExprKind::Reorg { op, input } => {
                let i = self.expr(input)?;
                self.add(HopKind::Reorg(*op), expr, vec![i])
            }
            ExprKind::Append { kind, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                self.add(HopKind::Append(*kind), expr, vec![l, r])
            }
            ExprKind::Index {
                input,
                row_lower,
                row_upper,
                col_lower,
                col_upper,
            } => {
                let mut inputs = vec![self.expr(input)?];
                for bound in [row_lower, row_upper, col_lower, col_upper] {
                    let b = self.expr(bound)?;
                    if !self.dag[b].is_scalar() {
                        return Err(MantisError::type_error("index bounds must be scalars"));
                    }
                    inputs.push(b);
                }
                self.add(HopKind::Indexing, expr, inputs)
            }
            ExprKind::DataGen {
                rows,
                cols,
                min,
                max,
                sparsity,
                seed,
            } => {
                let mut inputs = Vec::with_capacity(6);
                for arg in [rows, cols, min, max, sparsity, seed] {
                    let a = self.expr(arg)?;
                    if !self.dag[a].is_scalar() {
                        return Err(MantisError::type_error("rand arguments must be scalars"));
                    }
                    inputs.push(a);
                }
                self.add(HopKind::DataGen, expr, inputs)
            }
            ExprKind::Dimension { op, input } => {
                let i = self.expr(input)?;
                if !self.dag[i].is_matrix() {
                    return Err(MantisError::type_error(format!(
                        "{} expects a matrix argument",
                        op.opcode()
                    )));
                }
                self.add(HopKind::Dimension(*op), expr, vec![i])
            }
        };
        Ok(id)
    }

    fn variable(&mut self, name: &str, expr: &Expr) -> MantisResult<HopId> {
        if let Some(id) = self.bindings.get(name) {
            return Ok(*id);
        }
        if let Some(id) = self.reads.get(name) {
            return Ok(*id);
        }
        if let Some(id) = self.inputs.get(name).copied() {
            let data_type = self.dag[id].data_type;
            if data_type != expr.data_type {
                return Err(MantisError::type_error(format!(
                    "input '{name}' is a {data_type} but used as a {}",
                    expr.data_type
                )));
            }
            return Ok(id);
        }
        let info = self
            .catalog
            .get(name)
            .ok_or_else(|| MantisError::structural(format!("undefined variable '{name}'")))?;
        if info.data_type != expr.data_type {
            return Err(MantisError::type_error(format!(
                "variable '{name}' is a {} but used as a {}",
                info.data_type, expr.data_type
            )));
        }
        let id = self.dag.add_hop(
            HopKind::Data {
                op: DataOpKind::TransientRead,
                name: name.to_string(),
            },
            info.data_type,
            info.value_type,
            vec![],
        );
        self.dag[id].chars = info.chars;
        self.dag[id].sparsity = info.sparsity;
        self.reads.insert(name.to_string(), id);
        Ok(id)
    }
}
