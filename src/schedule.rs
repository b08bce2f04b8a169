//! Topological block scheduling.
//!
//! Stateful blocks output prior state, so they contribute no dependency
//! edges and cut feedback loops. The remaining edges are ordered by a
//! Kahn traversal whose ready queue is seeded and drained in block
//! insertion order; the resulting order is deterministic and observable
//! in the emitted code.

use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;

use crate::blocks::is_stateful_type;
use crate::error::TranslateError;
use crate::model::{Endpoint, System};

/// Emission order for one system: every non-`Inport` block exactly once.
pub fn schedule(sys: &System) -> Result<Vec<String>, TranslateError> {
    // Nodes in block insertion order.
    let mut dependents: IndexMap<&str, IndexSet<&str>> = IndexMap::new();
    let mut in_degree: IndexMap<&str, usize> = IndexMap::new();
    for blk in sys.blocks.iter().filter(|b| !b.is_inport()) {
        dependents.insert(blk.sid.as_str(), IndexSet::new());
        in_degree.insert(blk.sid.as_str(), 0);
    }

    for conn in &sys.connections {
        let Ok(src) = Endpoint::parse(&conn.source) else {
            continue;
        };
        let Some(src_blk) = sys.find_block_by_sid(&src.block_sid) else {
            continue;
        };
        if src_blk.is_inport() || is_stateful_type(&src_blk.block_type) {
            continue;
        }
        for dst_str in conn.destinations() {
            let Ok(dst) = Endpoint::parse(dst_str) else {
                continue;
            };
            let Some(dst_blk) = sys.find_block_by_sid(&dst.block_sid) else {
                continue;
            };
            let dst_sid = dst_blk.sid.as_str();
            if !in_degree.contains_key(dst_sid) {
                continue;
            }
            let src_sid = src_blk.sid.as_str();
            if let Some(out) = dependents.get_mut(src_sid) {
                // A fan-out may hit the same destination more than once;
                // the edge counts once.
                if out.insert(dst_sid) {
                    *in_degree.get_mut(dst_sid).unwrap() += 1;
                }
            }
        }
    }

    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(sid, _)| *sid)
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(sid) = ready.pop_front() {
        order.push(sid.to_string());
        if let Some(outs) = dependents.get(sid) {
            for dst in outs {
                let deg = in_degree.get_mut(dst).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.push_back(*dst);
                }
            }
        }
    }

    if order.len() != in_degree.len() {
        let stuck: Vec<String> = in_degree
            .iter()
            .filter(|(sid, _)| !order.iter().any(|o| o.as_str() == **sid))
            .map(|(sid, _)| sid.to_string())
            .collect();
        return Err(TranslateError::UnbreakableCycle {
            system: sys.id.clone(),
            blocks: stuck,
        });
    }

    Ok(order)
}
