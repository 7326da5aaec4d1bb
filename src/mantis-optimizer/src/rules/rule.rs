//! Rewrite rule trait and framework.
//!
//! This module defines the core abstraction for DAG rewrite rules and the
//! bookkeeping returned by the optimizer.

use common_error::MantisResult;
use mantis_logical::HopDag;

/// A single rewrite rule over a logical DAG.
///
/// A rewrite is legal only if it preserves the values bound to every
/// `TransientWrite` root and the shape of every surviving node. Rules that
/// drop nodes must keep input/parent edges mutual.
pub trait RewriteRule: Send + Sync {
    /// Get the name of this rule.
    fn name(&self) -> &'static str;

    /// Get a description of what this rule does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Apply this rule to the DAG, returning a potentially transformed DAG.
    fn apply(&self, dag: HopDag) -> MantisResult<Transformed>;
}

/// The result of applying a rewrite rule.
#[derive(Debug, Clone)]
pub struct Transformed {
    /// The (potentially transformed) DAG.
    pub dag: HopDag,
    /// Whether the DAG was actually changed.
    pub changed: bool,
}

impl Transformed {
    /// The DAG was changed.
    pub fn yes(dag: HopDag) -> Self {
        Self { dag, changed: true }
    }

    /// The DAG was left as is.
    pub fn no(dag: HopDag) -> Self {
        Self {
            dag,
            changed: false,
        }
    }

    pub fn new(dag: HopDag, changed: bool) -> Self {
        Self { dag, changed }
    }
}

impl From<HopDag> for Transformed {
    fn from(dag: HopDag) -> Self {
        Self::no(dag)
    }
}

/// A trace entry for a single rule application.
#[derive(Debug, Clone)]
pub struct RuleTrace {
    /// The name of the rule that was applied.
    pub rule_name: String,
    /// The DAG before the rule was applied (as explain string).
    pub before: String,
    /// The DAG after the rule was applied (as explain string).
    pub after: String,
    /// Whether the rule actually changed the DAG.
    pub changed: bool,
}

impl RuleTrace {
    pub fn new(
        rule_name: impl Into<String>,
        before: impl Into<String>,
        after: impl Into<String>,
        changed: bool,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            before: before.into(),
            after: after.into(),
            changed,
        }
    }
}

/// The result of optimizing one DAG.
#[derive(Debug, Clone)]
pub struct OptimizedDag {
    /// The final DAG.
    pub dag: HopDag,
    /// Number of fixpoint iterations performed.
    pub iterations: usize,
    /// Number of rule applications that changed the DAG.
    pub rules_applied: usize,
    /// Detailed trace of rule applications (if tracing was enabled).
    pub trace: Vec<RuleTrace>,
}

impl OptimizedDag {
    pub fn new(dag: HopDag) -> Self {
        Self {
            dag,
            iterations: 0,
            rules_applied: 0,
            trace: Vec::new(),
        }
    }

    /// Format the trace as a human-readable string.
    pub fn format_trace(&self) -> String {
        let mut output = format!(
            "Rewrites completed in {} iterations, {} rules applied\n",
            self.iterations, self.rules_applied
        );
        if self.trace.is_empty() {
            output.push_str("  (no trace available)\n");
        }
        for (i, entry) in self.trace.iter().filter(|t| t.changed).enumerate() {
            output.push_str(&format!("\n--- Rule {} applied: {} ---\n", i + 1, entry.rule_name));
            output.push_str("Before:\n");
            output.push_str(&entry.before);
            output.push_str("After:\n");
            output.push_str(&entry.after);
        }
        output
    }
}
