//! Proximity scoring of a candidate contact against the unambiguous network.
//!
//! Each supporting contact end adds `exp(-d^2)` to one of two running sums,
//! where `d` is its offset from the candidate (floored at [`MIN_SEP`]) in
//! units of half the separation threshold. Offsets below the candidate go to
//! the lower sum, the rest to the upper sum; the score is
//! `log10(lower * upper)`, so one-sided support scores less than support
//! flanking the candidate on both sides.

use crate::bins::ContactIndex;
use crate::config::PRIMARY_LIMIT;
use crate::ncc_structs::{BinKey, Candidate, ChromId};

pub const MIN_SEP: i64 = 100;

#[derive(Debug, Clone, Copy)]
struct Support {
    lower: f64,
    upper: f64,
    scale: f64,
}

impl Support {
    fn new(sep_threshold: i64) -> Self {
        Support {
            lower: 1.0,
            upper: 1.0,
            scale: 0.5 * sep_threshold as f64,
        }
    }

    #[inline]
    fn add(&mut self, delta: i64) {
        if delta < 0 {
            let d = (-delta).max(MIN_SEP) as f64 / self.scale;
            self.lower += (-d * d).exp();
        } else {
            let d = delta.max(MIN_SEP) as f64 / self.scale;
            self.upper += (-d * d).exp();
        }
    }

    fn product(&self) -> f64 {
        self.lower * self.upper
    }

    fn log10(&self) -> f64 {
        self.product().log10()
    }
}

/// Scores candidates against a built index. Holds no state of its own, so
/// one scorer can be shared across threads.
#[derive(Debug, Clone, Copy)]
pub struct NetworkScorer<'a> {
    index: &'a ContactIndex,
    sep: i64,
    primary_limit: f64,
}

impl<'a> NetworkScorer<'a> {
    pub fn new(index: &'a ContactIndex) -> Self {
        NetworkScorer {
            index,
            sep: index.sep_threshold,
            primary_limit: PRIMARY_LIMIT,
        }
    }

    pub fn with_primary_limit(mut self, primary_limit: f64) -> Self {
        self.primary_limit = primary_limit;
        self
    }

    pub fn score_candidate(&self, candidate: &Candidate, secondary_limit: Option<f64>) -> f64 {
        self.score(&candidate.key, candidate.pos_a, candidate.pos_b, secondary_limit)
    }

    /// Score of a contact given by chromosome names in either order. Unknown
    /// chromosomes score zero.
    pub fn score_contact(&self, chr_a: &str, pos_a: i64, chr_b: &str, pos_b: i64, secondary_limit: Option<f64>) -> f64 {
        match self.index.canonical(chr_a, pos_a, chr_b, pos_b) {
            Some((key, pos_a, pos_b)) => self.score(&key, pos_a, pos_b, secondary_limit),
            None => 0.0,
        }
    }

    /// Network score of a canonical contact. The relay search only runs when
    /// `secondary_limit` is set, non-zero, and above the direct score.
    pub fn score(&self, key: &BinKey, pos_a: i64, pos_b: i64, secondary_limit: Option<f64>) -> f64 {
        let mut support = Support::new(self.sep);
        let saturation = 10f64.powf(self.primary_limit);

        if self.direct_support(key, pos_a, pos_b, saturation, &mut support) {
            return self.primary_limit;
        }

        if let Some(limit) = secondary_limit {
            if limit != 0.0 && support.log10() < limit {
                self.relay_support(key, pos_a, pos_b, &mut support);
            }
        }

        support.log10()
    }

    /// Scans the 3x3 block of bins around the candidate. Returns true once the
    /// support product passes `saturation`.
    fn direct_support(&self, key: &BinKey, pos_a: i64, pos_b: i64, saturation: f64, support: &mut Support) -> bool {
        let sep = self.sep;

        for a in key.bin_a - 1..=key.bin_a + 1 {
            let rev = a < key.bin_a;
            let peri_a = a != key.bin_a;

            for b in key.bin_b - 1..=key.bin_b + 1 {
                let contacts = self.index.unambig(&BinKey::new(key.chr_a, key.chr_b, a, b));
                if contacts.is_empty() {
                    continue;
                }

                if !peri_a && b == key.bin_b {
                    for &(pos_1, pos_2) in contacts {
                        let delta_1 = pos_1 - pos_a;
                        let delta_2 = pos_2 - pos_b;
                        // zero offset on either end is the candidate itself
                        if delta_1 != 0 && delta_2 != 0 {
                            support.add(delta_1);
                            support.add(delta_2);
                        }
                    }
                } else if rev {
                    Self::scan_peripheral(contacts.iter().rev(), pos_a, pos_b, sep, peri_a, support);
                } else {
                    Self::scan_peripheral(contacts.iter(), pos_a, pos_b, sep, peri_a, support);
                }

                if support.product() > saturation {
                    return true;
                }
            }
        }

        false
    }

    /// Walks an off-centre bin outwards from the candidate. Bin lists are
    /// sorted by pos_a, so once an A-side offset passes the threshold in an
    /// off-centre A bin nothing further in that bin can qualify.
    fn scan_peripheral<'b>(
        contacts: impl Iterator<Item = &'b (i64, i64)>,
        pos_a: i64,
        pos_b: i64,
        sep: i64,
        peri_a: bool,
        support: &mut Support,
    ) {
        for &(pos_1, pos_2) in contacts {
            let delta_1 = pos_1 - pos_a;
            let delta_2 = pos_2 - pos_b;

            if delta_1.abs() < sep && delta_2.abs() < sep {
                support.add(delta_1);
                support.add(delta_2);
            } else if peri_a && delta_1.abs() > sep {
                break;
            }
        }
    }

    /// Indirect support through a third (chromosome, bin): an unambiguous
    /// contact from each candidate end to nearby positions in the same relay
    /// bin, with the two relay positions themselves close.
    fn relay_support(&self, key: &BinKey, pos_a: i64, pos_b: i64, support: &mut Support) {
        for &(chr_c, bin_c) in &self.index.chromo_bins {
            let relays_a = self.relays(key.chr_a, pos_a, key.bin_a, chr_c, bin_c);
            if relays_a.is_empty() {
                continue;
            }
            let relays_b = self.relays(key.chr_b, pos_b, key.bin_b, chr_c, bin_c);

            for &(pos_2, delta_2) in &relays_b {
                for &(pos_1, delta_1) in &relays_a {
                    let delta_3 = (pos_1 - pos_2).abs();

                    if delta_3 != 0 && delta_3 < self.sep {
                        support.add(delta_1);
                        support.add(delta_2);
                        support.add(delta_3);
                    }
                }
            }
        }
    }

    /// (relay position, offset from `pos`) for unambiguous contacts linking
    /// the window around `pos` on `chr` to bin `bin_c` of `chr_c`.
    fn relays(&self, chr: ChromId, pos: i64, bin: i64, chr_c: ChromId, bin_c: i64) -> Vec<(i64, i64)> {
        let mut found = Vec::new();
        let flip = self.index.chromos.is_after(chr, chr_c);

        for x in bin - 1..=bin + 1 {
            let key = if flip {
                BinKey::new(chr_c, chr, bin_c, x)
            } else {
                BinKey::new(chr, chr_c, x, bin_c)
            };

            for &(pos_1, pos_2) in self.index.unambig(&key) {
                let (pos_x, pos_c) = if flip { (pos_2, pos_1) } else { (pos_1, pos_2) };
                let delta = pos_x - pos;

                if delta != 0 && delta.abs() < self.sep {
                    found.push((pos_c, delta));
                }
            }
        }

        found
    }
}
