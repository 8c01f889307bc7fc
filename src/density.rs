//! Cleanup pass run before resolution.
//!
//! First, inter-homolog contacts in anomalously crowded bins are dropped;
//! such bins usually come from mis-mapping in repeats rather than from real
//! homolog pairing. Then every remaining unambiguous contact without network
//! support is removed as noise.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::bins::{load_contact_index, ContactIndex};
use crate::cancel::CancelToken;
use crate::config::{CleanParams, IndexParams};
use crate::decisions::Decisions;
use crate::error::Result;
use crate::ncc_structs::{BinEntry, BinKey, Candidate, GroupId};
use crate::network::NetworkScorer;
use crate::rewrite::{write_ambig_filtered_ncc, PassReport};
use crate::sorts::percentile;

/// Occupancy of every non-empty bin whose two chromosomes share a root,
/// counting ambiguous and non-ambiguous contacts alike.
fn same_root_bin_counts(index: &ContactIndex) -> FxHashMap<BinKey, usize> {
    let keys: FxHashSet<&BinKey> = index.ambig_bins.keys().chain(index.nonambig_bins.keys()).collect();
    let mut bin_counts = FxHashMap::default();

    for key in keys {
        if index.chromos.root(key.chr_a) != index.chromos.root(key.chr_b) {
            continue;
        }
        let n_contacts = index.ambig(key).len() + index.nonambig(key).len();
        if n_contacts > 0 {
            bin_counts.insert(*key, n_contacts);
        }
    }

    bin_counts
}

fn all_entries<'a>(index: &'a ContactIndex, key: &BinKey) -> impl Iterator<Item = &'a BinEntry> {
    index.ambig(key).iter().chain(index.nonambig(key).iter())
}

/// Occupancy of the candidate's bin, extended by nearby contacts in the eight
/// surrounding bins; counting stops once it passes `ceiling`.
fn local_density(index: &ContactIndex, candidate: &Candidate, own_count: usize, ceiling: f64) -> usize {
    let key = &candidate.key;
    let sep = index.sep_threshold;
    let mut count = own_count;

    for a in key.bin_a - 1..=key.bin_a + 1 {
        for b in key.bin_b - 1..=key.bin_b + 1 {
            if a == key.bin_a && b == key.bin_b {
                continue;
            }
            let neighbour = BinKey::new(key.chr_a, key.chr_b, a, b);

            for entry in all_entries(index, &neighbour) {
                if (entry.pos_a - candidate.pos_a).abs() < sep && (entry.pos_b - candidate.pos_b).abs() < sep {
                    count += 1;
                    if count as f64 > ceiling {
                        return count;
                    }
                }
            }
        }
    }

    count
}

/// Drops inter-homolog candidates whose local density reaches the
/// `quantile` percentile of same-root bin occupancy. Dropped singleton
/// contacts are also taken out of the unambiguous network.
pub fn filter_dense_homolog_trans(index: &mut ContactIndex, quantile: f64) -> Decisions {
    let mut decisions = Decisions::new();
    info!("Removing unambiguous inter-homologue contacts from anomolously dense regions");

    let bin_counts = same_root_bin_counts(index);
    let counts: Vec<usize> = bin_counts.values().copied().collect();
    let ceiling = match percentile(&counts, quantile) {
        Some(ceiling) => ceiling,
        None => {
            warn!("No same-root contact bins; density filter skipped");
            return decisions;
        }
    };
    debug!(" .. density ceiling {:.1} from {} bins", ceiling, counts.len());

    let mut scrubbed: Vec<(BinKey, i64, i64)> = Vec::new();

    for (&group, candidates) in &index.groups {
        let n_pairs = candidates.len();
        let mut keep = Vec::with_capacity(n_pairs);

        for candidate in candidates {
            let key = &candidate.key;
            let homolog_trans = key.chr_a != key.chr_b;

            match bin_counts.get(key) {
                Some(&own_count) if homolog_trans => {
                    let mut count = own_count;
                    if (count as f64) < ceiling {
                        count = local_density(index, candidate, own_count, ceiling);
                    }

                    if (count as f64) < ceiling {
                        keep.push(candidate.line_idx);
                    } else if n_pairs == 1 {
                        scrubbed.push((*key, candidate.pos_a, candidate.pos_b));
                    }
                }
                _ => keep.push(candidate.line_idx),
            }
        }

        if keep.is_empty() {
            decisions.remove(group);
        } else if keep.len() < n_pairs {
            decisions.resolve(group, keep);
        }
    }

    for (key, pos_a, pos_b) in scrubbed {
        index.scrub_unambig(&key, pos_a, pos_b);
    }

    info!(" .. removed {}", decisions.n_removed());
    info!(" .. partly resolved {}", decisions.n_resolved());

    decisions
}

/// Removes every remaining singleton group whose network score (relay
/// search included) falls below `threshold`.
pub fn remove_isolated(index: &ContactIndex, decisions: &mut Decisions, threshold: f64, cancel: &CancelToken) -> Result<()> {
    let unambig_pairs: Vec<(GroupId, &Candidate)> = index
        .groups
        .iter()
        .filter(|&(&group, candidates)| candidates.len() == 1 && !decisions.is_removed(group))
        .map(|(&group, candidates)| (group, &candidates[0]))
        .collect();
    info!("Scoring {} unambiguous pairs", unambig_pairs.len());

    let scorer = NetworkScorer::new(index);
    let processed = AtomicUsize::new(0);
    let t0 = Instant::now();

    let isolated: Vec<Option<GroupId>> = unambig_pairs
        .par_iter()
        .map(|&(group, candidate)| -> Result<Option<GroupId>> {
            cancel.check()?;

            let score = if index.unambig(&candidate.key).is_empty() {
                0.0
            } else {
                scorer.score_candidate(candidate, Some(threshold))
            };

            let it = processed.fetch_add(1, Ordering::Relaxed) + 1;
            if it % 1000 == 0 {
                debug!(" .. Processed:{:>7} Time taken:{:.3} s", it, t0.elapsed().as_secs_f64());
            }

            Ok((score < threshold).then_some(group))
        })
        .collect::<Result<_>>()?;

    for group in isolated.into_iter().flatten() {
        decisions.remove(group);
    }

    info!(" .. Processed:{:>7} Removed:{:>7}", unambig_pairs.len(), decisions.n_removed());
    Ok(())
}

/// Both cleanup stages on an already-built index.
pub fn clean_index(index: &mut ContactIndex, params: &CleanParams, cancel: &CancelToken) -> Result<Decisions> {
    params.validate()?;
    let mut decisions = filter_dense_homolog_trans(index, params.homo_trans_dens_quant);
    cancel.check()?;
    remove_isolated(index, &mut decisions, params.threshold, cancel)?;
    Ok(decisions)
}

/// Cleanup pass from `in_path` to `out_path`.
pub fn remove_isolated_unambig(
    in_path: &Path,
    out_path: &Path,
    index_params: &IndexParams,
    params: &CleanParams,
    cancel: &CancelToken,
) -> Result<PassReport> {
    let mut index = load_contact_index(in_path, index_params)?;
    let decisions = clean_index(&mut index, params, cancel)?;
    write_ambig_filtered_ncc(in_path, out_path, &index, &decisions)
}
