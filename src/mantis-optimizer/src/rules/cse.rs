//! Common subexpression elimination.

use std::collections::HashMap;

use common_error::MantisResult;
use log::debug;
use mantis_logical::{HopDag, HopId, HopKind};

use super::rule::{RewriteRule, Transformed};

/// Merge structurally identical nodes so a shared result is computed once.
///
/// Two nodes are identical when kind, payload, inputs, types and any forced
/// backend agree. Transient writes are never merged: each binds a distinct
/// variable. Random generators are merged only under the same fixed seed.
pub struct CommonSubexpressionElimination;

impl RewriteRule for CommonSubexpressionElimination {
    fn name(&self) -> &'static str {
        "CommonSubexpressionElimination"
    }

    fn description(&self) -> &'static str {
        "Merge structurally identical subexpressions"
    }

    fn apply(&self, mut dag: HopDag) -> MantisResult<Transformed> {
        let mut seen: HashMap<String, HopId> = HashMap::new();
        let mut changed = false;
        // Inputs are canonical by the time a node is visited.
        for id in dag.topo_order()? {
            let Some(hop) = dag.get(id) else {
                continue;
            };
            if hop.kind.is_transient_write() || !is_deterministic(&dag, id) {
                continue;
            }
            let key = format!(
                "{:?}|{:?}|{:?}|{:?}|{:?}",
                hop.kind, hop.inputs, hop.data_type, hop.value_type, hop.forced_exec_type
            );
            match seen.get(&key) {
                Some(&existing) => {
                    debug!("Merging {} into {existing}", dag[id].name());
                    dag.replace_all_uses(id, existing);
                    dag.remove_if_dead(id);
                    changed = true;
                }
                None => {
                    seen.insert(key, id);
                }
            }
        }
        Ok(Transformed::new(dag, changed))
    }
}

/// A generator draws a fresh seed at runtime unless given a non-negative literal.
fn is_deterministic(dag: &HopDag, id: HopId) -> bool {
    if dag[id].kind != HopKind::DataGen {
        return true;
    }
    dag.input(id, 5)
        .literal()
        .and_then(|seed| seed.as_i64().ok())
        .is_some_and(|seed| seed >= 0)
}
