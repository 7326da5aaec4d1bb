//! Logical program: control-flow blocks holding HOP DAGs.

use common_error::MantisResult;

use crate::dag::HopDag;

/// A control-flow block of the logical program.
///
/// Predicate and loop-bound DAGs have exactly one root: the expression
/// producing the scalar that drives control flow.
#[derive(Debug, Clone)]
pub enum LogicalBlock {
    Basic(HopDag),
    If {
        predicate: HopDag,
        then_blocks: Vec<LogicalBlock>,
        else_blocks: Vec<LogicalBlock>,
    },
    While {
        predicate: HopDag,
        body: Vec<LogicalBlock>,
    },
    For {
        var: String,
        from: HopDag,
        to: HopDag,
        body: Vec<LogicalBlock>,
    },
}

impl LogicalBlock {
    fn for_each_dag_mut<F>(&mut self, f: &mut F) -> MantisResult<()>
    where
        F: FnMut(&mut HopDag) -> MantisResult<()>,
    {
        match self {
            Self::Basic(dag) => f(dag),
            Self::If {
                predicate,
                then_blocks,
                else_blocks,
            } => {
                f(predicate)?;
                for b in then_blocks.iter_mut().chain(else_blocks.iter_mut()) {
                    b.for_each_dag_mut(f)?;
                }
                Ok(())
            }
            Self::While { predicate, body } => {
                f(predicate)?;
                for b in body {
                    b.for_each_dag_mut(f)?;
                }
                Ok(())
            }
            Self::For { from, to, body, .. } => {
                f(from)?;
                f(to)?;
                for b in body {
                    b.for_each_dag_mut(f)?;
                }
                Ok(())
            }
        }
    }

    fn for_each_dag<'a>(&'a self, f: &mut impl FnMut(&'a HopDag)) {
        match self {
            Self::Basic(dag) => f(dag),
            Self::If {
                predicate,
                then_blocks,
                else_blocks,
            } => {
                f(predicate);
                for b in then_blocks.iter().chain(else_blocks) {
                    b.for_each_dag(f);
                }
            }
            Self::While { predicate, body } => {
                f(predicate);
                for b in body {
                    b.for_each_dag(f);
                }
            }
            Self::For { from, to, body, .. } => {
                f(from);
                f(to);
                for b in body {
                    b.for_each_dag(f);
                }
            }
        }
    }

    fn explain(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let dag_text = |dag: &HopDag, out: &mut String| {
            for line in dag.explain().lines() {
                out.push_str(&format!("{indent}    {line}\n"));
            }
        };
        match self {
            Self::Basic(dag) => {
                out.push_str(&format!("{indent}GENERIC\n"));
                dag_text(dag, out);
            }
            Self::If {
                predicate,
                then_blocks,
                else_blocks,
            } => {
                out.push_str(&format!("{indent}IF\n"));
                dag_text(predicate, out);
                for b in then_blocks {
                    b.explain(depth + 1, out);
                }
                if !else_blocks.is_empty() {
                    out.push_str(&format!("{indent}ELSE\n"));
                    for b in else_blocks {
                        b.explain(depth + 1, out);
                    }
                }
            }
            Self::While { predicate, body } => {
                out.push_str(&format!("{indent}WHILE\n"));
                dag_text(predicate, out);
                for b in body {
                    b.explain(depth + 1, out);
                }
            }
            Self::For { var, from, to, body } => {
                out.push_str(&format!("{indent}FOR {var}\n"));
                dag_text(from, out);
                dag_text(to, out);
                for b in body {
                    b.explain(depth + 1, out);
                }
            }
        }
    }
}

/// The logical plan of a whole program.
#[derive(Debug, Clone, Default)]
pub struct LogicalProgram {
    pub blocks: Vec<LogicalBlock>,
}

impl LogicalProgram {
    pub fn new(blocks: Vec<LogicalBlock>) -> Self {
        Self { blocks }
    }

    /// Apply `f` to every DAG, in program order.
    pub fn for_each_dag_mut<F>(&mut self, mut f: F) -> MantisResult<()>
    where
        F: FnMut(&mut HopDag) -> MantisResult<()>,
    {
        for block in &mut self.blocks {
            block.for_each_dag_mut(&mut f)?;
        }
        Ok(())
    }

    /// All DAGs in program order.
    pub fn dags(&self) -> Vec<&HopDag> {
        let mut out = Vec::new();
        for block in &self.blocks {
            block.for_each_dag(&mut |dag| out.push(dag));
        }
        out
    }

    pub fn explain(&self) -> String {
        let mut out = String::from("PROGRAM\n");
        for block in &self.blocks {
            block.explain(1, &mut out);
        }
        out
    }
}
