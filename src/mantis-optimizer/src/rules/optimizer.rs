//! The rewrite driver.
//!
//! Rules run in a fixed order, repeated until a pass changes nothing or the
//! iteration bound is reached. Finalizers (exec-type selection) then run
//! exactly once over the rewritten DAG.

use common_config::CompilerConfig;
use common_error::MantisResult;
use log::debug;
use mantis_logical::{HopDag, LogicalProgram, validate_dag};

use super::rule::{OptimizedDag, RewriteRule, RuleTrace};
use super::{
    CommonSubexpressionElimination, ConstantFolding, DimensionPropagation, ExecTypeSelection,
    RemoveDoubleTranspose, TransposeAppendPushdown,
};

/// Configuration for the optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of fixpoint iterations before stopping.
    pub max_iterations: usize,
    /// Whether to record before/after plans for every rule application.
    pub enable_trace: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 16,
            enable_trace: false,
        }
    }
}

impl OptimizerConfig {
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_trace(mut self, enable: bool) -> Self {
        self.enable_trace = enable;
        self
    }
}

/// Applies rewrite rules to HOP DAGs.
///
/// # Pass order
///
/// 1. Dimension propagation
/// 2. Constant folding
/// 3. Transpose simplifications
/// 4. Common subexpression elimination
///
/// followed by a single exec-type selection pass.
pub struct Optimizer {
    rules: Vec<Box<dyn RewriteRule>>,
    finalizers: Vec<Box<dyn RewriteRule>>,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(rules: Vec<Box<dyn RewriteRule>>) -> Self {
        Self {
            rules,
            finalizers: Vec::new(),
            config: OptimizerConfig::default(),
        }
    }

    pub fn with_config(rules: Vec<Box<dyn RewriteRule>>, config: OptimizerConfig) -> Self {
        Self {
            rules,
            finalizers: Vec::new(),
            config,
        }
    }

    /// The standard pipeline for a compiler configuration.
    pub fn for_config(config: &CompilerConfig) -> Self {
        let block_size = config.default_block_size as i64;
        let mut optimizer = Self::with_config(
            vec![
                Box::new(DimensionPropagation::new(block_size)),
                Box::new(ConstantFolding),
                Box::new(RemoveDoubleTranspose),
                Box::new(TransposeAppendPushdown),
                Box::new(CommonSubexpressionElimination),
            ],
            OptimizerConfig::default().with_max_iterations(config.max_optimizer_iterations.max(1)),
        );
        optimizer.add_finalizer(ExecTypeSelection::from_config(config));
        optimizer
    }

    /// Add a rule to the fixpoint loop.
    pub fn add_rule<R: RewriteRule + 'static>(&mut self, rule: R) {
        self.rules.push(Box::new(rule));
    }

    /// Add a rule that runs once after the fixpoint.
    pub fn add_finalizer<R: RewriteRule + 'static>(&mut self, rule: R) {
        self.finalizers.push(Box::new(rule));
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Rewrite a DAG to a fixpoint, then run the finalizers.
    pub fn optimize(&self, dag: HopDag) -> MantisResult<OptimizedDag> {
        validate_dag(&dag)?;
        let mut result = OptimizedDag::new(dag);

        loop {
            if result.iterations >= self.config.max_iterations {
                debug!(
                    "Optimizer reached max iterations ({}), stopping",
                    self.config.max_iterations
                );
                break;
            }
            result.iterations += 1;
            let changed = self.run_pass(&self.rules, &mut result)?;
            if !changed {
                debug!("No changes in iteration {}, reached fixpoint", result.iterations);
                break;
            }
        }

        self.run_pass(&self.finalizers, &mut result)?;
        validate_dag(&result.dag)?;
        Ok(result)
    }

    /// Single pass over the rules, then the finalizers.
    pub fn optimize_once(&self, dag: HopDag) -> MantisResult<OptimizedDag> {
        validate_dag(&dag)?;
        let mut result = OptimizedDag::new(dag);
        result.iterations = 1;
        self.run_pass(&self.rules, &mut result)?;
        self.run_pass(&self.finalizers, &mut result)?;
        Ok(result)
    }

    /// Optimize every DAG of a program in place.
    ///
    /// Returns the total number of rule applications.
    pub fn optimize_program(&self, program: &mut LogicalProgram) -> MantisResult<usize> {
        let mut applied = 0;
        program.for_each_dag_mut(|dag| {
            let result = self.optimize(std::mem::take(dag))?;
            applied += result.rules_applied;
            *dag = result.dag;
            Ok(())
        })?;
        Ok(applied)
    }

    fn run_pass(
        &self,
        rules: &[Box<dyn RewriteRule>],
        result: &mut OptimizedDag,
    ) -> MantisResult<bool> {
        let mut changed = false;
        for rule in rules {
            let before = self.config.enable_trace.then(|| result.dag.explain());
            let transformed = rule.apply(std::mem::take(&mut result.dag))?;
            result.dag = transformed.dag;

            if transformed.changed {
                changed = true;
                result.rules_applied += 1;
                debug!(
                    "Rule '{}' applied in iteration {}",
                    rule.name(),
                    result.iterations
                );
                if let Some(before) = before {
                    result.trace.push(RuleTrace::new(
                        rule.name(),
                        before,
                        result.dag.explain(),
                        true,
                    ));
                }
            }
        }
        Ok(changed)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::for_config(&CompilerConfig::default())
    }
}
