//! Per-group resolution of ambiguous contacts.
//!
//! Candidates on chromosome pairs with little unambiguous evidence are
//! filtered out first, then the remaining decision is made on network scores:
//! a clear winner is kept alone, a clear top two is kept as a narrowed pair,
//! and groups with no support anywhere can optionally be dropped.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::bins::{load_contact_index, ContactIndex};
use crate::cancel::CancelToken;
use crate::config::{IndexParams, ResolveParams};
use crate::decisions::{Decisions, GroupOutcome};
use crate::error::Result;
use crate::ncc_structs::{Candidate, ChromId, GroupId};
use crate::network::NetworkScorer;
use crate::rewrite::{write_ambig_filtered_ncc, PassReport};
use crate::sorts::top_three;

/// Groups with more candidates than this are dropped without scoring.
pub const MAX_GROUP_SIZE: usize = 16;

/// Plausibility of each chromosome pair as a contact partner: the direct
/// unambiguous count plus, for every third chromosome `c`, the geometric mean
/// of the counts linking each end to `c`.
#[derive(Debug, Clone, Default)]
pub struct TransCloseness {
    closeness: FxHashMap<(ChromId, ChromId), f64>,
}

impl TransCloseness {
    pub fn new(index: &ContactIndex) -> Self {
        let counts = &index.chromo_pair_counts;
        let count = |a: ChromId, b: ChromId| -> f64 {
            counts
                .get(&(a, b))
                .or_else(|| counts.get(&(b, a)))
                .copied()
                .unwrap_or(0) as f64
        };

        let mut chromos: Vec<ChromId> = counts.keys().flat_map(|&(a, b)| [a, b]).collect();
        chromos.sort_unstable();
        chromos.dedup();

        let mut closeness = FxHashMap::default();
        for (i, &chr_a) in chromos.iter().enumerate() {
            for &chr_b in &chromos[i..] {
                let mut n_inter = count(chr_a, chr_b);

                for &chr_c in &chromos {
                    if chr_c == chr_a || chr_c == chr_b {
                        continue;
                    }
                    n_inter += (count(chr_a, chr_c) * count(chr_b, chr_c)).sqrt();
                }

                closeness.insert((chr_a, chr_b), n_inter);
                closeness.insert((chr_b, chr_a), n_inter);
            }
        }

        TransCloseness { closeness }
    }

    pub fn get(&self, pair: (ChromId, ChromId)) -> Option<f64> {
        self.closeness.get(&pair).copied()
    }

    /// Pairs without any unambiguous data are never excluded.
    fn allows(&self, pair: (ChromId, ChromId), min_trans_relay: f64) -> bool {
        self.get(pair).map_or(true, |n| n >= min_trans_relay)
    }
}

/// Decides one group against the immutable index.
pub fn decide_group(
    index: &ContactIndex,
    scorer: &NetworkScorer,
    closeness: &TransCloseness,
    candidates: &[Candidate],
    params: &ResolveParams,
) -> GroupOutcome {
    let n_pairs = candidates.len();
    if n_pairs <= 1 {
        return GroupOutcome::Untouched;
    }
    if n_pairs > MAX_GROUP_SIZE {
        return GroupOutcome::Removed;
    }

    let mut outcome = GroupOutcome::Untouched;
    let plausible: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| closeness.allows(c.key.chromo_pair(), params.min_trans_relay))
        .collect();

    if !plausible.is_empty() && plausible.len() < n_pairs {
        if let [only] = plausible[..] {
            let supported = !index.unambig(&only.key).is_empty() && scorer.score_candidate(only, None) != 0.0;
            return if supported {
                GroupOutcome::Resolved(vec![only.line_idx])
            } else {
                GroupOutcome::Removed
            };
        }
        outcome = GroupOutcome::Resolved(plausible.iter().map(|c| c.line_idx).collect());
    }

    let scores: Vec<f64> = candidates
        .iter()
        .map(|c| {
            if index.nonambig(&c.key).is_empty() {
                0.0
            } else {
                scorer.score_candidate(c, None)
            }
        })
        .collect();

    let [(a, best), (b, second), (_, third)] = top_three(&scores);
    let threshold = params.score_threshold;

    if best > threshold * second {
        GroupOutcome::Resolved(vec![candidates[a].line_idx])
    } else if second > threshold * third {
        GroupOutcome::Resolved(vec![candidates[a].line_idx, candidates[b].line_idx])
    } else if best == 0.0 && params.remove_isolated {
        GroupOutcome::Removed
    } else {
        outcome
    }
}

/// Decides every group of the index. Groups are scored in parallel and the
/// outcomes applied in group order.
pub fn resolve_groups(index: &ContactIndex, params: &ResolveParams, cancel: &CancelToken) -> Result<Decisions> {
    params.validate()?;
    let closeness = TransCloseness::new(index);
    let scorer = NetworkScorer::new(index);

    info!("Filtering with network scores");
    let groups: Vec<(GroupId, &Vec<Candidate>)> = index.groups.iter().map(|(&g, c)| (g, c)).collect();
    let processed = AtomicUsize::new(0);
    let t0 = Instant::now();

    let outcomes: Vec<(GroupId, GroupOutcome)> = groups
        .par_iter()
        .map(|&(group, candidates)| -> Result<(GroupId, GroupOutcome)> {
            cancel.check()?;
            let outcome = decide_group(index, &scorer, &closeness, candidates, params);

            let it = processed.fetch_add(1, Ordering::Relaxed) + 1;
            if it % 10_000 == 0 {
                info!(" .. Processed:{:>7} Time taken:{:.3} s", it, t0.elapsed().as_secs_f64());
            }

            Ok((group, outcome))
        })
        .collect::<Result<_>>()?;

    let mut decisions = Decisions::new();
    for (group, outcome) in outcomes {
        decisions.apply(group, outcome);
    }

    if params.remove_pos_ambig {
        debug!(" .. removing {} positionally ambiguous groups", index.pos_ambig.len());
        for &group in &index.pos_ambig {
            decisions.remove(group);
        }
    }

    info!(
        " .. Processed:{:>7} Resolved:{:>7} Removed:{:>7}",
        groups.len(),
        decisions.n_resolved(),
        decisions.n_removed()
    );

    Ok(decisions)
}

/// Resolution pass from `in_path` to `out_path`.
pub fn resolve_contacts(
    in_path: &Path,
    out_path: &Path,
    index_params: &IndexParams,
    params: &ResolveParams,
    cancel: &CancelToken,
) -> Result<PassReport> {
    info!("Reading contact data");
    let index = load_contact_index(in_path, index_params)?;
    let decisions = resolve_groups(&index, params, cancel)?;
    write_ambig_filtered_ncc(in_path, out_path, &index, &decisions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::{index_from_str, ncc_row};

    const MB: i64 = 1_000_000;

    /// Five unambiguous chr1.a-chr2.a contacts around (5 Mb, 7 Mb).
    fn network() -> String {
        let mut text = String::new();
        for (i, offset) in [-400_i64, -200, 200, 400, 600].iter().enumerate() {
            text.push_str(&ncc_row("chr1.a", 5 * MB + offset, "chr2.a", 7 * MB + offset, "1.1", i));
        }
        text
    }

    fn resolve_str(text: &str, params: &ResolveParams) -> (ContactIndex, Decisions) {
        let index = index_from_str(text, &IndexParams::default()).unwrap();
        let decisions = resolve_groups(&index, params, &CancelToken::new()).unwrap();
        (index, decisions)
    }

    #[test]
    fn test_supported_homolog_wins() {
        let mut text = network();
        text.push_str(&ncc_row("chr1.a", 5 * MB, "chr2.a", 7 * MB, "2.1", 10));
        text.push_str(&ncc_row("chr1.b", 5 * MB, "chr2.b", 7 * MB, "0.1", 10));
        let (index, decisions) = resolve_str(&text, &ResolveParams::default());

        let group = index.groups[&6].clone();
        assert_eq!(decisions.resolved_lines(6), Some(&[group[0].line_idx][..]));
        for singleton in 1..=5 {
            assert!(!decisions.is_decided(singleton));
        }
    }

    #[test]
    fn test_unsupported_group_left_or_removed() {
        let mut text = network();
        text.push_str(&ncc_row("chr3.a", 5 * MB, "chr4.a", 9 * MB, "2.1", 10));
        text.push_str(&ncc_row("chr3.b", 5 * MB, "chr4.b", 9 * MB, "0.1", 10));

        let (_, decisions) = resolve_str(&text, &ResolveParams::default());
        assert!(!decisions.is_decided(6));

        let (_, decisions) = resolve_str(&text, &ResolveParams::strict_final());
        assert!(decisions.is_removed(6));
    }

    #[test]
    fn test_positionally_ambiguous_group_removed_on_request() {
        let mut text = network();
        text.push_str(&ncc_row("chr1.a", 5 * MB, "chr2.a", 7 * MB, "2.1", 10));
        text.push_str(&ncc_row("chr3.a", 5 * MB, "chr1.a", 5 * MB, "0.1", 10));

        let (index, decisions) = resolve_str(&text, &ResolveParams::default());
        assert!(index.pos_ambig.contains(&6));
        let group = index.groups[&6].clone();
        assert_eq!(decisions.resolved_lines(6), Some(&[group[0].line_idx][..]));

        let params = ResolveParams {
            remove_pos_ambig: true,
            ..ResolveParams::default()
        };
        let (_, decisions) = resolve_str(&text, &params);
        assert!(decisions.is_removed(6));
        assert_eq!(decisions.resolved_lines(6), None);
    }

    #[test]
    fn test_oversized_group_removed() {
        let mut text = network();
        for i in 0..17_i64 {
            let code = if i == 0 { "17.1" } else { "0.1" };
            text.push_str(&ncc_row("chr1.a", 5 * MB + i * 10, "chr2.a", 7 * MB, code, 10));
        }
        let (_, decisions) = resolve_str(&text, &ResolveParams::default());
        assert!(decisions.is_removed(6));
    }

    #[test]
    fn test_trans_closeness_adds_relay_counts() {
        let mut text = String::new();
        let mut pair_id = 0;
        for (chr_a, chr_b, n) in [("chrA", "chrB", 4), ("chrA", "chrC", 4), ("chrC", "chrB", 9)] {
            for i in 0..n {
                text.push_str(&ncc_row(chr_a, 5 * MB + i * 1_000, chr_b, 5 * MB, "1.1", pair_id));
                pair_id += 1;
            }
        }
        let index = index_from_str(&text, &IndexParams::default()).unwrap();
        let closeness = TransCloseness::new(&index);
        let a = index.chromos.get("chrA").unwrap();
        let b = index.chromos.get("chrB").unwrap();

        assert_eq!(closeness.get((a, b)), Some(4.0 + 6.0));
        assert_eq!(closeness.get((b, a)), Some(10.0));
        assert_eq!(closeness.get((a, a)), Some(8.0));
    }

    /// Six chr1.a-chr1.b contacts at `homolog_pos`, one far chr1.a-chr2.a
    /// contact, then a group whose chr1.a-chr2.a candidate fails the
    /// closeness filter.
    fn narrowing_text(homolog_pos: i64) -> String {
        let mut text = String::new();
        for i in 0..6_i64 {
            text.push_str(&ncc_row("chr1.a", homolog_pos + i * 1_000, "chr1.b", homolog_pos + i * 1_000, "1.1", i as usize));
        }
        text.push_str(&ncc_row("chr1.a", 5 * MB, "chr2.a", 90 * MB, "1.1", 6));
        text.push_str(&ncc_row("chr1.a", 5 * MB, "chr2.a", 7 * MB, "2.1", 10));
        text.push_str(&ncc_row("chr1.a", 5 * MB, "chr1.b", 7 * MB, "0.1", 10));
        text
    }

    #[test]
    fn test_narrowed_to_one_supported_candidate() {
        let (index, decisions) = resolve_str(&narrowing_text(7 * MB), &ResolveParams::default());
        let group = index.groups[&8].clone();
        assert_eq!(decisions.resolved_lines(8), Some(&[group[1].line_idx][..]));
    }

    #[test]
    fn test_narrowed_to_one_unsupported_candidate_removes_group() {
        let (_, decisions) = resolve_str(&narrowing_text(45 * MB), &ResolveParams::default());
        assert!(decisions.is_removed(8));
    }

    #[test]
    fn test_cancelled_resolution() {
        let index = index_from_str(&network(), &IndexParams::default()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(resolve_groups(&index, &ResolveParams::default(), &cancel).is_err());
    }
}
