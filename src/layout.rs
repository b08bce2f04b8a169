//! Column/row auto-layout for synthesized systems.
//!
//! A block's column is its longest dependency-chain distance from an
//! inport, ignoring edges out of stateful blocks (those edges may close
//! feedback loops). Inports sit in column 0, outports in the last
//! column; rows stack per column in block order.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::blocks::is_stateful_type;
use crate::model::{Endpoint, System};

const LEFT_MARGIN: i32 = 50;
const TOP_MARGIN: i32 = 30;
const COL_WIDTH: i32 = 160;
const ROW_HEIGHT: i32 = 60;

pub fn auto_layout(sys: &mut System) {
    if sys.blocks.is_empty() {
        return;
    }

    let mut column: IndexMap<String, i32> = IndexMap::new();
    for blk in &sys.blocks {
        if blk.is_inport() {
            column.insert(blk.sid.clone(), 0);
        }
    }

    // Forward relaxation over non-stateful edges, bounded to stay
    // robust against malformed input.
    let mut edges: Vec<(String, String)> = Vec::new();
    for conn in &sys.connections {
        let Ok(src) = Endpoint::parse(&conn.source) else {
            continue;
        };
        let stateful_src = sys
            .find_block_by_sid(&src.block_sid)
            .map(|b| is_stateful_type(&b.block_type))
            .unwrap_or(false);
        if stateful_src {
            continue;
        }
        for dst_str in conn.destinations() {
            if let Ok(dst) = Endpoint::parse(dst_str) {
                // Outports take the dedicated last column instead.
                let dst_is_outport = sys
                    .find_block_by_sid(&dst.block_sid)
                    .map(|b| b.is_outport())
                    .unwrap_or(false);
                if !dst_is_outport {
                    edges.push((src.block_sid.clone(), dst.block_sid.clone()));
                }
            }
        }
    }

    let mut changed = true;
    let mut iterations = sys.blocks.len() + 1;
    while changed && iterations > 0 {
        changed = false;
        iterations -= 1;
        for (src, dst) in &edges {
            let Some(src_col) = column.get(src).copied() else {
                continue;
            };
            let next = src_col + 1;
            if column.get(dst).copied().unwrap_or(i32::MIN) < next {
                column.insert(dst.clone(), next);
                changed = true;
            }
        }
    }

    let mut max_col = 1;
    for blk in &sys.blocks {
        if !column.contains_key(&blk.sid) && !blk.is_outport() {
            column.insert(blk.sid.clone(), 1);
        }
        if let Some(c) = column.get(&blk.sid) {
            max_col = max_col.max(*c);
        }
    }
    for blk in &sys.blocks {
        if blk.is_outport() {
            column.insert(blk.sid.clone(), max_col + 1);
        }
    }

    let mut per_column: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (idx, blk) in sys.blocks.iter().enumerate() {
        let col = column.get(&blk.sid).copied().unwrap_or(1);
        per_column.entry(col).or_default().push(idx);
    }

    for (col, indices) in per_column {
        let x = LEFT_MARGIN + col * COL_WIDTH;
        for (row, idx) in indices.into_iter().enumerate() {
            let blk = &mut sys.blocks[idx];
            let y = TOP_MARGIN + row as i32 * ROW_HEIGHT;
            let (w, h) = match blk.block_type.as_str() {
                "Inport" | "Outport" => (30, 14),
                "SubSystem" => (120, 80),
                "Sum" => (36, 36),
                "Gain" => (40, 36),
                _ => (50, 36),
            };
            blk.position = vec![x, y, x + w, y + h];
        }
    }
}
