use rustc_hash::FxHashMap;

/// Interned chromosome code. Codes follow first appearance, not name order.
pub type ChromId = u32;

/// Ambiguity group number, re-derived from the ambiguity-code column on every scan.
pub type GroupId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Plus,
    Minus,
}

/// One row of an NCC file.
///
/// Columns: `chrA fStartA fEndA startA endA strandA chrB fStartB fEndB startB
/// endB strandB ambigCode pairId swapPair`.
#[derive(Debug, Clone)]
pub struct Contact {
    pub chr_a: String,
    pub f_start_a: i64,
    pub f_end_a: i64,
    pub start_a: i64,
    pub end_a: i64,
    pub strand_a: Strand,
    pub chr_b: String,
    pub f_start_b: i64,
    pub f_end_b: i64,
    pub start_b: i64,
    pub end_b: i64,
    pub strand_b: Strand,
    pub ambig: crate::ncc::AmbigCode,
    pub pair_id: i64,
    pub swap_pair: i64,
}

impl Contact {
    /// Ligation-junction side of end A: the read end on `+`, the read start on `-`.
    pub fn pos_a(&self) -> i64 {
        match self.strand_a {
            Strand::Plus => self.end_a,
            Strand::Minus => self.start_a,
        }
    }

    pub fn pos_b(&self) -> i64 {
        match self.strand_b {
            Strand::Plus => self.end_b,
            Strand::Minus => self.start_b,
        }
    }
}

/// Hash key of a bin pair. `chr_a` is never lexicographically after `chr_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinKey {
    pub chr_a: ChromId,
    pub chr_b: ChromId,
    pub bin_a: i64,
    pub bin_b: i64,
}

impl BinKey {
    pub fn new(chr_a: ChromId, chr_b: ChromId, bin_a: i64, bin_b: i64) -> Self {
        BinKey {
            chr_a,
            chr_b,
            bin_a,
            bin_b,
        }
    }

    pub fn chromo_pair(&self) -> (ChromId, ChromId) {
        (self.chr_a, self.chr_b)
    }
}

/// A contact stored in a bin list, positions in key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinEntry {
    pub pos_a: i64,
    pub pos_b: i64,
    pub group: GroupId,
}

/// One candidate of an ambiguity group, already canonicalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub key: BinKey,
    pub pos_a: i64,
    pub pos_b: i64,
    /// Zero-based line index in the file the group was loaded from.
    pub line_idx: usize,
}

/// Chromosome name table. Codes are handed out on first sight, so name
/// comparisons always go through the table.
#[derive(Debug, Clone, Default)]
pub struct ChromoNames {
    names: Vec<String>,
    codes: FxHashMap<String, ChromId>,
}

impl ChromoNames {
    pub fn encode(&mut self, name: &str) -> ChromId {
        if let Some(&code) = self.codes.get(name) {
            return code;
        }
        let code = self.names.len() as ChromId;
        self.names.push(name.to_string());
        self.codes.insert(name.to_string(), code);
        code
    }

    pub fn get(&self, name: &str) -> Option<ChromId> {
        self.codes.get(name).copied()
    }

    pub fn name(&self, code: ChromId) -> &str {
        &self.names[code as usize]
    }

    /// Chromosome name with any homolog suffix removed (`chr1.a` -> `chr1`).
    pub fn root(&self, code: ChromId) -> &str {
        chromo_root(self.name(code))
    }

    /// True when `a` sorts after `b`, i.e. the pair must be swapped.
    pub fn is_after(&self, a: ChromId, b: ChromId) -> bool {
        a != b && self.name(a) > self.name(b)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub fn chromo_root(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}
