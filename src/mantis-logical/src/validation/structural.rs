//! Structural validation for HOP DAGs.
//!
//! This module validates the structure of a logical DAG:
//! - DAG validation (no cycles)
//! - Operator input arity checks
//! - Input/parent edge symmetry

use std::collections::HashMap;

use common_error::{ErrorKind, MantisError};

use crate::dag::HopDag;
use crate::hop::{Hop, HopId};

/// A structural validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralValidationError {
    /// The DAG contains a cycle.
    CycleDetected {
        /// Description of where the cycle was detected.
        location: String,
    },

    /// An operator has incorrect input arity.
    InvalidArity {
        operator: String,
        expected: usize,
        actual: usize,
    },

    /// `input` and `parent` edges disagree.
    AsymmetricEdge {
        node: HopId,
        input: HopId,
        /// Occurrences in `node.inputs`.
        as_input: usize,
        /// Occurrences of `node` in `input.parents`.
        as_parent: usize,
    },

    /// An edge points at a node that is not in the arena.
    DanglingReference { node: HopId, target: HopId },

    /// A root that does not exist.
    MissingRoot(HopId),
}

impl std::fmt::Display for StructuralValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected { location } => write!(f, "Cycle detected in DAG at: {location}"),
            Self::InvalidArity {
                operator,
                expected,
                actual,
            } => write!(
                f,
                "Invalid arity for {operator}: expected {expected} inputs, got {actual}"
            ),
            Self::AsymmetricEdge {
                node,
                input,
                as_input,
                as_parent,
            } => write!(
                f,
                "Edge {node} -> {input} appears {as_input}x as input but {as_parent}x as parent"
            ),
            Self::DanglingReference { node, target } => {
                write!(f, "{node} references missing node {target}")
            }
            Self::MissingRoot(id) => write!(f, "Root {id} does not exist"),
        }
    }
}

impl std::error::Error for StructuralValidationError {}

impl From<StructuralValidationError> for MantisError {
    fn from(e: StructuralValidationError) -> Self {
        MantisError::structural(e.to_string())
    }
}

/// Structural validator for HOP DAGs.
pub struct StructuralValidator;

impl StructuralValidator {
    /// Validate the structural integrity of a DAG.
    ///
    /// Returns `Ok(())` if the DAG is structurally valid, or a list of errors.
    pub fn validate(dag: &HopDag) -> Result<(), Vec<StructuralValidationError>> {
        let mut errors = Vec::new();

        for root in dag.roots() {
            if !dag.contains(*root) {
                errors.push(StructuralValidationError::MissingRoot(*root));
            }
        }
        for hop in dag.hops() {
            Self::validate_arity(hop, &mut errors);
            Self::validate_edges(dag, hop, &mut errors);
        }
        if errors.is_empty() {
            if let Err(e) = dag.topo_order() {
                if e.kind() == ErrorKind::Structural {
                    errors.push(StructuralValidationError::CycleDetected {
                        location: e.to_string(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_arity(hop: &Hop, errors: &mut Vec<StructuralValidationError>) {
        let expected = hop.kind.arity();
        if hop.inputs.len() != expected {
            errors.push(StructuralValidationError::InvalidArity {
                operator: hop.name(),
                expected,
                actual: hop.inputs.len(),
            });
        }
    }

    fn validate_edges(dag: &HopDag, hop: &Hop, errors: &mut Vec<StructuralValidationError>) {
        let mut counts: HashMap<HopId, usize> = HashMap::new();
        for input in &hop.inputs {
            *counts.entry(*input).or_default() += 1;
        }
        let mut inputs: Vec<_> = counts.into_iter().collect();
        inputs.sort_unstable();
        for (input, as_input) in inputs {
            let Some(target) = dag.get(input) else {
                errors.push(StructuralValidationError::DanglingReference {
                    node: hop.id,
                    target: input,
                });
                continue;
            };
            let as_parent = target.parents.iter().filter(|p| **p == hop.id).count();
            if as_parent != as_input {
                errors.push(StructuralValidationError::AsymmetricEdge {
                    node: hop.id,
                    input,
                    as_input,
                    as_parent,
                });
            }
        }
        for parent in &hop.parents {
            if !dag.contains(*parent) {
                errors.push(StructuralValidationError::DanglingReference {
                    node: hop.id,
                    target: *parent,
                });
            }
        }
    }
}

/// Check if a DAG is acyclic.
pub fn is_dag(dag: &HopDag) -> bool {
    dag.topo_order().is_ok()
}

/// Number of nodes reachable from the roots.
pub fn operator_count(dag: &HopDag) -> usize {
    dag.topo_order().map_or(0, |order| order.len())
}

/// Length of the longest root-to-leaf path.
pub fn dag_depth(dag: &HopDag) -> usize {
    let Ok(order) = dag.topo_order() else {
        return 0;
    };
    let mut depth: HashMap<HopId, usize> = HashMap::new();
    for id in order {
        let d = 1 + dag[id]
            .inputs
            .iter()
            .map(|i| depth.get(i).copied().unwrap_or(0))
            .max()
            .unwrap_or(0);
        depth.insert(id, d);
    }
    dag.roots()
        .iter()
        .map(|r| depth.get(r).copied().unwrap_or(0))
        .max()
        .unwrap_or(0)
}
