use super::ir::{DecoderPlan, PendingCopy};
use crate::abi::algebra::{difference, gt};
use tracing::trace;

/// Fixed cost of issuing one copy instruction.
pub const COPY_OVERHEAD_COST: i64 = 12;
/// Cost of copying one extra 32-byte word.
pub const COPY_WORD_COST: i64 = 3;
/// Largest gap (in bytes) worth copying over instead of starting a new copy.
pub const MERGE_GAP_THRESHOLD: i64 = COPY_OVERHEAD_COST / COPY_WORD_COST * 32;

/// Merges copies whose calldata and memory gaps are the same small constant.
///
/// Copies are ordered by destination first (insertion sort, moving a copy
/// only past predecessors that definitely start later), then scanned once:
/// each copy is compared against the most recent output only.
pub fn merge_copies(copies: Vec<PendingCopy>) -> Vec<PendingCopy> {
    let mut sorted: Vec<PendingCopy> = Vec::with_capacity(copies.len());
    for copy in copies {
        let mut position = sorted.len();
        while position > 0 && gt(&sorted[position - 1].dst, &copy.dst).is_true() {
            position -= 1;
        }
        sorted.insert(position, copy);
    }

    let mut merged: Vec<PendingCopy> = Vec::with_capacity(sorted.len());
    for copy in sorted {
        if let Some(last) = merged.last_mut() {
            if let Some(gap) = mergeable_gap(last, &copy) {
                trace!(gap, first = ?last.names, second = ?copy.names, "merging copies");
                last.size = last.size.clone() + gap + copy.size;
                last.names.extend(copy.names);
                continue;
            }
        }
        merged.push(copy);
    }
    merged
}

/// The common gap between the end of `first` and the start of `second`, if
/// merging them preserves alignment and is cheaper than two copies.
fn mergeable_gap(first: &PendingCopy, second: &PendingCopy) -> Option<i64> {
    let src_gap = difference(&second.src, &(first.src.clone() + first.size.clone()))?;
    let dst_gap = difference(&second.dst, &(first.dst.clone() + first.size.clone()))?;
    if src_gap == dst_gap && (0..=MERGE_GAP_THRESHOLD).contains(&src_gap) {
        Some(src_gap)
    } else {
        None
    }
}

/// Merges the copies of `plan` and of every loop body below it.
pub fn optimize_plan(mut plan: DecoderPlan) -> DecoderPlan {
    let before = plan.copies.len();
    plan.copies = merge_copies(std::mem::take(&mut plan.copies));
    if plan.copies.len() != before {
        trace!(before, after = plan.copies.len(), "merged plan copies");
    }
    plan.loops = plan
        .loops
        .into_iter()
        .map(|mut pending_loop| {
            pending_loop.body = optimize_plan(pending_loop.body);
            pending_loop
        })
        .collect();
    plan
}
