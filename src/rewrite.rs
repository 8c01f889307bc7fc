//! Streams the source file again and writes it back out with the ambiguity
//! codes of decided groups (and any legacy integer codes) replaced. Every
//! other byte of every line is kept, line terminators included.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::bins::ContactIndex;
use crate::decisions::Decisions;
use crate::error::{NccError, Result};
use crate::ncc::{ambig_code_span, encode_ambig_code, is_gzip, AmbigCode, ContactScanner, GroupNumbering, NccWriter};
use crate::ncc_structs::GroupId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub lines_written: usize,
    /// Lines whose ambiguity code was replaced.
    pub lines_rewritten: usize,
    pub n_groups: usize,
}

/// Outcome of one filtering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub resolved: usize,
    pub removed: usize,
    pub rewrite: RewriteSummary,
}

/// `line` with only its ambiguity-code column replaced by `code`.
pub fn replace_ambig_code(line: &str, code: &str) -> Option<String> {
    let (start, end) = ambig_code_span(line)?;
    let mut out = String::with_capacity(line.len() + code.len());
    out.push_str(&line[..start]);
    out.push_str(code);
    out.push_str(&line[end..]);
    Some(out)
}

fn part_path(out_path: &Path) -> PathBuf {
    let mut name = OsString::from(out_path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Pairs each input group with the group its rewritten lines open on the
/// next read. Two input groups may never share an output group, nor the
/// reverse.
#[derive(Default)]
struct GroupMap {
    out_numbering: GroupNumbering,
    in_to_out: FxHashMap<GroupId, GroupId>,
    out_to_in: FxHashMap<GroupId, GroupId>,
}

impl GroupMap {
    fn pair(&mut self, group: GroupId, written: &AmbigCode) -> bool {
        let out = self.out_numbering.advance(written);
        *self.in_to_out.entry(group).or_insert(out) == out && *self.out_to_in.entry(out).or_insert(group) == group
    }
}

fn write_lines(
    in_path: &Path,
    writer: &mut NccWriter,
    index: &ContactIndex,
    decisions: &Decisions,
) -> Result<RewriteSummary> {
    let mut scanner = ContactScanner::open(in_path)?;
    let mut seen: FxHashSet<GroupId> = FxHashSet::default();
    let mut groups = GroupMap::default();
    let mut summary = RewriteSummary::default();

    for item in &mut scanner {
        let scanned = item?;
        let opens = seen.insert(scanned.group);
        let legacy = matches!(scanned.contact.ambig, AmbigCode::Legacy(_));

        // legacy lines are always converted, mixed forms renumber groups
        let written = if decisions.is_decided(scanned.group) || legacy {
            let keep = if decisions.is_decided(scanned.group) {
                decisions.keeps_line(scanned.group, scanned.line_idx)
            } else {
                scanned.contact.ambig.is_active()
            };
            let size = if opens { index.group_size(scanned.group).max(1) } else { 0 };
            let line = replace_ambig_code(&scanned.line, &encode_ambig_code(size, keep)).ok_or_else(|| {
                NccError::parse(in_path, scanned.line_idx + 1, "ambiguity code column missing")
            })?;
            writer.write_all(line.as_bytes())?;
            summary.lines_rewritten += 1;
            AmbigCode::Dotted {
                size: size as u64,
                active: keep,
            }
        } else {
            writer.write_all(scanned.line.as_bytes())?;
            scanned.contact.ambig
        };
        summary.lines_written += 1;

        if !groups.pair(scanned.group, &written) {
            return Err(NccError::GroupingChanged {
                line: scanned.line_idx + 1,
            });
        }
    }

    summary.n_groups = scanner.n_groups();
    if summary.lines_written != index.n_lines {
        return Err(NccError::LineCountMismatch {
            expected: index.n_lines,
            found: summary.lines_written,
        });
    }
    if summary.n_groups != index.n_groups {
        return Err(NccError::GroupCountMismatch {
            expected: index.n_groups,
            found: summary.n_groups,
        });
    }

    Ok(summary)
}

/// Rewrites `in_path` to `out_path` applying `decisions`. The output is first
/// written next to its destination and only renamed into place once complete,
/// so a failed pass never leaves a partial file under `out_path`.
pub fn write_ambig_filtered_ncc(
    in_path: &Path,
    out_path: &Path,
    index: &ContactIndex,
    decisions: &Decisions,
) -> Result<PassReport> {
    let tmp_path = part_path(out_path);
    let mut writer = NccWriter::create(&tmp_path, is_gzip(out_path))?;

    let summary = match write_lines(in_path, &mut writer, index, decisions).and_then(|s| writer.finish().map(|_| s)) {
        Ok(summary) => summary,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    };
    fs::rename(&tmp_path, out_path)?;

    debug!(" .. {} lines rewritten", summary.lines_rewritten);
    info!("Written {} of {} lines to {}", summary.lines_written, index.n_lines, out_path.display());

    Ok(PassReport {
        resolved: decisions.n_resolved(),
        removed: decisions.n_removed(),
        rewrite: summary,
    })
}
