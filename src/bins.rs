//! Two-scan loading of an NCC file into bin-keyed contact indices.
//!
//! The first scan finds positionally ambiguous groups; the second files
//! every active contact under its bin key, in the ambiguous or non-ambiguous
//! index depending on its group.

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;
use std::path::Path;

use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::IndexParams;
use crate::error::{NccError, Result};
use crate::ncc::ContactScanner;
use crate::ncc_structs::{BinEntry, BinKey, Candidate, ChromId, ChromoNames, Contact, GroupId};
use crate::sorts::sort_bin_entries;

/// More distinct (chromosome, position) ends than this makes a group
/// positionally ambiguous.
pub const MAX_GROUP_LOCATIONS: usize = 4;
/// As does spanning more chromosome roots than this.
pub const MAX_GROUP_ROOTS: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct ContactIndex {
    pub sep_threshold: i64,
    pub chromos: ChromoNames,
    /// Active candidates of every group, in file order.
    pub groups: BTreeMap<GroupId, Vec<Candidate>>,
    pub pos_ambig: FxHashSet<GroupId>,
    /// (chromosome, bin) pairs holding at least one unambiguous contact end.
    pub chromo_bins: BTreeSet<(ChromId, i64)>,
    pub nonambig_bins: FxHashMap<BinKey, Vec<BinEntry>>,
    /// Singleton-group subset of `nonambig_bins`: the evidence network.
    pub unambig_bins: FxHashMap<BinKey, Vec<(i64, i64)>>,
    pub ambig_bins: FxHashMap<BinKey, Vec<BinEntry>>,
    pub chromo_pair_counts: FxHashMap<(ChromId, ChromId), usize>,
    pub n_lines: usize,
    pub n_groups: usize,
    pub n_contacts: usize,
}

impl ContactIndex {
    pub fn bin_of(&self, pos: i64) -> i64 {
        pos.div_euclid(self.sep_threshold)
    }

    pub fn unambig(&self, key: &BinKey) -> &[(i64, i64)] {
        self.unambig_bins.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn nonambig(&self, key: &BinKey) -> &[BinEntry] {
        self.nonambig_bins.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn ambig(&self, key: &BinKey) -> &[BinEntry] {
        self.ambig_bins.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn group_size(&self, group: GroupId) -> usize {
        self.groups.get(&group).map_or(0, |c| c.len())
    }

    pub fn is_singleton(&self, group: GroupId) -> bool {
        self.group_size(group) == 1
    }

    /// Canonical form of a contact: chromosome pair in name order with
    /// positions following, and its bin key. `None` for unseen chromosomes.
    pub fn canonical(&self, chr_a: &str, pos_a: i64, chr_b: &str, pos_b: i64) -> Option<(BinKey, i64, i64)> {
        let a = self.chromos.get(chr_a)?;
        let b = self.chromos.get(chr_b)?;
        let (a, b, pos_a, pos_b) = if self.chromos.is_after(a, b) {
            (b, a, pos_b, pos_a)
        } else {
            (a, b, pos_a, pos_b)
        };
        Some((
            BinKey::new(a, b, self.bin_of(pos_a), self.bin_of(pos_b)),
            pos_a,
            pos_b,
        ))
    }

    /// Removes one unambiguous contact from its bin so it no longer counts
    /// as evidence.
    pub fn scrub_unambig(&mut self, key: &BinKey, pos_a: i64, pos_b: i64) {
        if let Some(contacts) = self.unambig_bins.get_mut(key) {
            contacts.retain(|&(p1, p2)| p1 != pos_a || p2 != pos_b);
        }
    }
}

/// Accumulates the index across the two scans.
struct IndexBuilder {
    index: ContactIndex,
    max_contacts: Option<usize>,
    group_positions: FxHashMap<GroupId, FxHashSet<(ChromId, i64)>>,
}

impl IndexBuilder {
    fn new(params: &IndexParams) -> Self {
        IndexBuilder {
            index: ContactIndex {
                sep_threshold: params.sep_threshold,
                ..ContactIndex::default()
            },
            max_contacts: params.max_contacts,
            group_positions: FxHashMap::default(),
        }
    }

    fn observe(&mut self, group: GroupId, contact: &Contact) {
        let chr_a = self.index.chromos.encode(&contact.chr_a);
        let chr_b = self.index.chromos.encode(&contact.chr_b);
        let positions = self.group_positions.entry(group).or_default();
        positions.insert((chr_a, contact.pos_a()));
        positions.insert((chr_b, contact.pos_b()));
        self.index.n_contacts += 1;
    }

    fn classify(&mut self) {
        let chromos = &self.index.chromos;
        for (&group, positions) in &self.group_positions {
            let spread = if positions.len() > MAX_GROUP_LOCATIONS {
                true
            } else {
                let roots: FxHashSet<&str> = positions.iter().map(|&(chr, _)| chromos.root(chr)).collect();
                roots.len() > MAX_GROUP_ROOTS
            };
            if spread {
                self.index.pos_ambig.insert(group);
            }
        }
        self.group_positions = FxHashMap::default();
    }

    fn insert(&mut self, group: GroupId, line_idx: usize, contact: &Contact) {
        let index = &mut self.index;
        let mut chr_a = index.chromos.encode(&contact.chr_a);
        let mut chr_b = index.chromos.encode(&contact.chr_b);
        let mut pos_a = contact.pos_a();
        let mut pos_b = contact.pos_b();

        if index.chromos.is_after(chr_a, chr_b) {
            std::mem::swap(&mut chr_a, &mut chr_b);
            std::mem::swap(&mut pos_a, &mut pos_b);
        }

        let key = BinKey::new(chr_a, chr_b, index.bin_of(pos_a), index.bin_of(pos_b));
        index.groups.entry(group).or_default().push(Candidate {
            key,
            pos_a,
            pos_b,
            line_idx,
        });

        let entry = BinEntry { pos_a, pos_b, group };
        if index.pos_ambig.contains(&group) {
            index.ambig_bins.entry(key).or_default().push(entry);
        } else {
            index.nonambig_bins.entry(key).or_default().push(entry);
        }
    }

    fn finish(mut self) -> ContactIndex {
        let index = &mut self.index;
        debug!(" .. sorting data");

        for entries in index.ambig_bins.values_mut() {
            sort_bin_entries(entries);
        }

        for (key, entries) in index.nonambig_bins.iter_mut() {
            sort_bin_entries(entries);

            let unambig: Vec<(i64, i64)> = entries
                .iter()
                .filter(|e| index.groups.get(&e.group).map_or(false, |c| c.len() == 1))
                .map(|e| (e.pos_a, e.pos_b))
                .collect();

            if !unambig.is_empty() {
                index.chromo_bins.insert((key.chr_a, key.bin_a));
                index.chromo_bins.insert((key.chr_b, key.bin_b));
                *index.chromo_pair_counts.entry(key.chromo_pair()).or_insert(0) += unambig.len();
            }
            index.unambig_bins.insert(*key, unambig);
        }

        self.index
    }
}

/// Builds the index from a scanner factory; each call must restart the
/// same source from its first line.
pub fn build_contact_index<R, F>(mut open: F, params: &IndexParams) -> Result<ContactIndex>
where
    R: BufRead,
    F: FnMut() -> Result<ContactScanner<R>>,
{
    params.validate()?;
    let mut builder = IndexBuilder::new(params);

    let mut scanner = open()?;
    let path = scanner.path().to_path_buf();
    info!("Reading {}", path.display());
    for item in &mut scanner {
        let scanned = item?;
        if !scanned.contact.ambig.is_active() {
            continue;
        }
        builder.observe(scanned.group, &scanned.contact);

        if let Some(max) = builder.max_contacts {
            if builder.index.n_contacts > max {
                return Err(NccError::TooManyContacts {
                    path,
                    count: builder.index.n_contacts,
                    max,
                });
            }
        }
    }
    let n_groups = scanner.n_groups();
    builder.classify();
    info!(
        "Found {} positional ambiguity groups from {}",
        builder.index.pos_ambig.len(),
        n_groups
    );

    let mut scanner = open()?;
    for item in &mut scanner {
        let scanned = item?;
        if !scanned.contact.ambig.is_active() {
            continue;
        }
        builder.insert(scanned.group, scanned.line_idx, &scanned.contact);
    }
    if scanner.n_groups() != n_groups {
        return Err(NccError::GroupCountMismatch {
            expected: n_groups,
            found: scanner.n_groups(),
        });
    }
    builder.index.n_lines = scanner.n_lines();
    builder.index.n_groups = n_groups;

    let index = builder.finish();
    info!(
        "Loaded {} contact pairs in {} ambiguity groups",
        index.n_lines,
        index.groups.len()
    );

    Ok(index)
}

pub fn load_contact_index(path: &Path, params: &IndexParams) -> Result<ContactIndex> {
    build_contact_index(|| ContactScanner::open(path), params)
}

#[cfg(test)]
pub(crate) fn index_from_str(text: &str, params: &IndexParams) -> Result<ContactIndex> {
    build_contact_index(
        || Ok(ContactScanner::new(std::io::Cursor::new(text.as_bytes()), "<memory>")),
        params,
    )
}

/// Formats one NCC row with both ends on `+` so that each position is used as-is.
#[cfg(test)]
pub(crate) fn ncc_row(chr_a: &str, pos_a: i64, chr_b: &str, pos_b: i64, code: &str, pair_id: usize) -> String {
    format!(
        "{} {} {} {} {} + {} {} {} {} {} + {} {} 0\n",
        chr_a,
        pos_a - 50,
        pos_a,
        pos_a - 50,
        pos_a,
        chr_b,
        pos_b - 50,
        pos_b,
        pos_b - 50,
        pos_b,
        code,
        pair_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_swaps_positions() {
        let text = ncc_row("chr2", 25_000_000, "chr1", 5_000_000, "1.1", 1);
        let index = index_from_str(&text, &IndexParams::default()).unwrap();

        let candidate = index.groups[&1][0];
        assert_eq!(index.chromos.name(candidate.key.chr_a), "chr1");
        assert_eq!(index.chromos.name(candidate.key.chr_b), "chr2");
        assert_eq!((candidate.pos_a, candidate.pos_b), (5_000_000, 25_000_000));
        assert_eq!((candidate.key.bin_a, candidate.key.bin_b), (0, 1));
        assert_eq!(index.unambig(&candidate.key), &[(5_000_000, 25_000_000)]);
        assert!(index.chromo_bins.contains(&(candidate.key.chr_a, 0)));
        assert!(index.chromo_bins.contains(&(candidate.key.chr_b, 1)));
    }

    #[test]
    fn test_inactive_rows_are_numbered_but_not_indexed() {
        let mut text = String::new();
        text.push_str(&ncc_row("chr1", 1_000, "chr2", 2_000, "2.0", 1));
        text.push_str(&ncc_row("chr1", 3_000, "chr2", 4_000, "0.1", 1));
        text.push_str(&ncc_row("chr1", 5_000, "chr2", 6_000, "1.1", 2));
        let index = index_from_str(&text, &IndexParams::default()).unwrap();

        assert_eq!(index.n_lines, 3);
        assert_eq!(index.n_groups, 2);
        assert_eq!(index.groups[&1].len(), 1);
        assert_eq!(index.groups[&1][0].line_idx, 1);
        assert_eq!(index.groups[&2][0].line_idx, 2);
        assert_eq!(index.n_contacts, 2);
    }

    #[test]
    fn test_positional_ambiguity_by_roots_and_locations() {
        let mut text = String::new();
        // three roots
        text.push_str(&ncc_row("chr1.a", 1_000, "chr2.a", 2_000, "2.1", 1));
        text.push_str(&ncc_row("chr3.a", 1_000, "chr1.a", 1_000, "0.1", 1));
        // homologs only, four locations
        text.push_str(&ncc_row("chr1.a", 1_000, "chr2.a", 2_000, "2.1", 2));
        text.push_str(&ncc_row("chr1.b", 1_000, "chr2.b", 2_000, "0.1", 2));
        // homologs only, six locations
        text.push_str(&ncc_row("chr1.a", 1_000, "chr2.a", 2_000, "3.1", 3));
        text.push_str(&ncc_row("chr1.b", 1_000, "chr2.b", 2_000, "0.1", 3));
        text.push_str(&ncc_row("chr1.a", 9_000, "chr2.a", 8_000, "0.1", 3));
        let index = index_from_str(&text, &IndexParams::default()).unwrap();

        assert!(index.pos_ambig.contains(&1));
        assert!(!index.pos_ambig.contains(&2));
        assert!(index.pos_ambig.contains(&3));
        assert!(!index.ambig_bins.is_empty());
        // multi-candidate groups never enter the unambiguous network
        assert!(index.unambig_bins.values().all(|v| v.is_empty()));
        assert!(index.chromo_pair_counts.is_empty());
    }

    #[test]
    fn test_bins_sorted_and_counted() {
        let mut text = String::new();
        for (i, pos) in [9_000_i64, 3_000, 6_000].iter().enumerate() {
            text.push_str(&ncc_row("chr1", *pos, "chr2", *pos, "1.1", i));
        }
        let index = index_from_str(&text, &IndexParams::default()).unwrap();
        let key = index.groups[&1][0].key;
        let positions: Vec<i64> = index.nonambig(&key).iter().map(|e| e.pos_a).collect();
        assert_eq!(positions, vec![3_000, 6_000, 9_000]);
        assert_eq!(index.chromo_pair_counts[&key.chromo_pair()], 3);
    }

    #[test]
    fn test_too_many_contacts_is_fatal() {
        let mut text = String::new();
        for i in 0..3 {
            text.push_str(&ncc_row("chr1", 1_000 * (i + 1), "chr2", 5_000, "1.1", i as usize));
        }
        let params = IndexParams {
            max_contacts: Some(2),
            ..IndexParams::default()
        };
        let err = index_from_str(&text, &params).unwrap_err();
        assert!(matches!(err, NccError::TooManyContacts { count: 3, max: 2, .. }));
    }
}
