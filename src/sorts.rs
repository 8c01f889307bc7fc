use num_traits::ToPrimitive;
use radsort::sort_by_key;

use crate::ncc_structs::BinEntry;

/// Sorts a bin list by (pos_a, pos_b, group). The neighbour scan in
/// `network` stops early on off-centre bins and relies on pos_a order.
pub fn sort_bin_entries(entries: &mut [BinEntry]) {
    sort_by_key(entries, |e| e.group);
    sort_by_key(entries, |e| e.pos_b);
    sort_by_key(entries, |e| e.pos_a);
}

/// q-th percentile (0..=100) with linear interpolation between closest ranks.
/// `None` for an empty population.
pub fn percentile<T: ToPrimitive + Copy>(values: &[T], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().filter_map(|v| v.to_f64()).collect();
    if sorted.is_empty() {
        return None;
    }
    radsort::sort(&mut sorted);

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Indices of the three largest scores, best first. Ties go to the lower
/// index; slots past the end of `scores` count as zero and are reported as
/// `scores.len()`.
pub fn top_three(scores: &[f64]) -> [(usize, f64); 3] {
    let mut top = [(scores.len(), 0.0_f64); 3];
    let mut filled = 0;

    for (i, &score) in scores.iter().enumerate() {
        let mut slot = filled.min(3);
        while slot > 0 && score > top[slot - 1].1 {
            slot -= 1;
        }
        if slot < 3 {
            for j in (slot + 1..3).rev() {
                top[j] = top[j - 1];
            }
            top[slot] = (i, score);
            filled += 1;
        }
    }

    top
}
