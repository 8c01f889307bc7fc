//! The iterated cleanup-then-resolve pipeline, plus contact score listing.
//!
//! Each pass reads the previous pass's output. Group numbers are re-derived
//! from the ambiguity-code column on every read, so the group count of each
//! written file is checked against the input's before the next pass starts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use crate::bins::load_contact_index;
use crate::cancel::CancelToken;
use crate::config::{IndexParams, PipelineConfig};
use crate::density::remove_isolated_unambig;
use crate::error::{NccError, Result};
use crate::ncc::{count_groups, ContactScanner};
use crate::network::NetworkScorer;
use crate::resolve::resolve_contacts;
use crate::rewrite::PassReport;

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub clean: PassReport,
    pub passes: Vec<PassReport>,
    /// Every file written, in pass order; the last one is the final result.
    pub outputs: Vec<PathBuf>,
    pub n_groups: usize,
}

impl PipelineReport {
    pub fn final_output(&self) -> Option<&Path> {
        self.outputs.last().map(|p| p.as_path())
    }
}

/// `dir/X_<suffix>.ncc[.gz]` for an input `X.ncc[.gz]`. Without `out_dir`
/// the output goes next to the input.
pub fn pass_output_path(input: &Path, out_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (name, gz) = match file_name.strip_suffix(".gz") {
        Some(name) => (name, ".gz"),
        None => (file_name.as_str(), ""),
    };
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let dir = match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(format!("{}_{}.ncc{}", stem, suffix, gz))
}

fn pass_suffix(pass: usize, n_passes: usize) -> String {
    if pass + 1 == n_passes {
        "resolved".to_string()
    } else {
        format!("filter{}", pass + 1)
    }
}

fn check_group_count(path: &Path, expected: usize) -> Result<()> {
    let found = count_groups(path)?;
    if found != expected {
        return Err(NccError::GroupCountMismatch { expected, found });
    }
    Ok(())
}

/// Cleanup followed by every configured resolution pass. Earlier outputs are
/// left in place if a later pass fails.
pub fn run_pipeline(
    input: &Path,
    out_dir: Option<&Path>,
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<PipelineReport> {
    config.validate()?;
    if let Some(dir) = out_dir {
        fs::create_dir_all(dir)?;
    }

    let mut report = PipelineReport::default();

    let clean_path = pass_output_path(input, out_dir, "clean");
    info!("Cleaning {}", input.display());
    report.clean = remove_isolated_unambig(input, &clean_path, &config.index, &config.clean, cancel)?;
    report.n_groups = report.clean.rewrite.n_groups;
    check_group_count(&clean_path, report.n_groups)?;
    report.outputs.push(clean_path);

    let n_passes = config.passes.len();
    for (pass, params) in config.passes.iter().enumerate() {
        cancel.check()?;
        let in_path = report.outputs[report.outputs.len() - 1].clone();
        let out_path = pass_output_path(input, out_dir, &pass_suffix(pass, n_passes));

        info!(
            "Pass {} of {}: score_threshold={} remove_isolated={} remove_pos_ambig={}",
            pass + 1,
            n_passes,
            params.score_threshold,
            params.remove_isolated,
            params.remove_pos_ambig
        );
        let pass_report = resolve_contacts(&in_path, &out_path, &config.index, params, cancel)?;
        check_group_count(&out_path, report.n_groups)?;

        report.passes.push(pass_report);
        report.outputs.push(out_path);
    }

    info!(
        "Pipeline complete: {} groups, final output {}",
        report.n_groups,
        report.outputs[report.outputs.len() - 1].display()
    );
    Ok(report)
}

/// Writes the network score of every active contact in `in_path`, one line
/// per contact: `chrA posA chrB posB group score`. Returns the number of
/// contacts scored.
pub fn score_contacts<W: Write>(
    in_path: &Path,
    index_params: &IndexParams,
    primary_limit: f64,
    secondary_limit: Option<f64>,
    out: &mut W,
) -> Result<usize> {
    let index = load_contact_index(in_path, index_params)?;
    let scorer = NetworkScorer::new(&index).with_primary_limit(primary_limit);
    let mut n_scored = 0;

    for item in ContactScanner::open(in_path)? {
        let scanned = item?;
        let contact = &scanned.contact;
        if !contact.ambig.is_active() {
            continue;
        }

        let score = scorer.score_contact(&contact.chr_a, contact.pos_a(), &contact.chr_b, contact.pos_b(), secondary_limit);
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{:.5}",
            contact.chr_a,
            contact.pos_a(),
            contact.chr_b,
            contact.pos_b(),
            scanned.group,
            score
        )?;
        n_scored += 1;
    }

    Ok(n_scored)
}
