//! Rank-preserving reordering of calibrated ensemble members.

use ensemble_field::all_valid;

/// Reorder `after` so that member `e` gets the value whose rank among `after`
/// equals the rank of `before[e]` among `before`.
///
/// The multiset of values in `after` is unchanged. Ties in `before` are
/// broken by member index. Does nothing if the lengths differ or either
/// ensemble has a missing value.
pub fn shuffle(before: &[f32], after: &mut [f32]) {
    if before.len() != after.len() || !all_valid(before) || !all_valid(after) {
        return;
    }

    let mut order: Vec<usize> = (0..before.len()).collect();
    order.sort_by(|&a, &b| before[a].total_cmp(&before[b]));

    let mut sorted = after.to_vec();
    sorted.sort_by(f32::total_cmp);

    for (rank, &member) in order.iter().enumerate() {
        after[member] = sorted[rank];
    }
}
