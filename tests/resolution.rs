use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use ncc_resolve::config::{IndexParams, PipelineConfig, ResolveParams};
use ncc_resolve::ncc::{ambig_code_span, count_groups};
use ncc_resolve::{remove_isolated_unambig, resolve_contacts, run_pipeline, CancelToken, CleanParams, NccError};

const MB: i64 = 1_000_000;

fn ncc_row(chr_a: &str, pos_a: i64, chr_b: &str, pos_b: i64, code: &str, pair_id: usize) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t+\t{}\t{}\t{}\t{}\t{}\t+\t{}\t{}\t0\n",
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

/// Five clustered unambiguous contacts, then a two-candidate group with one
/// candidate inside the cluster and one on the other homologues.
fn clustered_scenario() -> String {
    let mut text = String::new();
    for (i, offset) in [-400_i64, -200, 200, 400, 600].iter().enumerate() {
        text.push_str(&ncc_row("chr1.a", 5 * MB + offset, "chr2.a", 7 * MB + offset, "1.1", i));
    }
    text.push_str(&ncc_row("chr1.a", 5 * MB, "chr2.a", 7 * MB, "2.1", 10));
    text.push_str(&ncc_row("chr1.b", 5 * MB, "chr2.b", 7 * MB, "0.1", 10));
    text
}

fn write_input(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

fn ambig_codes(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_whitespace().nth(12).unwrap().to_string())
        .collect()
}

fn without_code(line: &str) -> String {
    let (start, end) = ambig_code_span(line).unwrap();
    format!("{}{}", &line[..start], &line[end..])
}

fn resolve_file(input: &Path, output: &Path, params: &ResolveParams) -> ncc_resolve::Result<ncc_resolve::PassReport> {
    resolve_contacts(input, output, &IndexParams::default(), params, &CancelToken::new())
}

#[test]
fn test_clustered_candidate_is_kept() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "cell.ncc", &clustered_scenario());
    let output = dir.path().join("cell_filter1.ncc");

    let report = resolve_file(&input, &output, &ResolveParams::default()).unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(report.removed, 0);
    assert_eq!(report.rewrite.lines_written, 7);
    assert_eq!(report.rewrite.lines_rewritten, 2);

    let written = fs::read_to_string(&output).unwrap();
    let codes = ambig_codes(&written);
    assert_eq!(codes, vec!["1.1", "1.1", "1.1", "1.1", "1.1", "2.1", "0.0"]);
}

#[test]
fn test_rewrite_keeps_every_other_byte() {
    let dir = TempDir::new().unwrap();
    let text = clustered_scenario();
    let input = write_input(&dir, "cell.ncc", &text);
    let output = dir.path().join("out.ncc");
    resolve_file(&input, &output, &ResolveParams::default()).unwrap();

    let written = fs::read_to_string(&output).unwrap();
    assert_eq!(written.lines().count(), text.lines().count());
    for (before, after) in text.lines().zip(written.lines()) {
        assert_eq!(without_code(before), without_code(after));
    }
    assert!(!dir.path().join("out.ncc.part").exists());
}

#[test]
fn test_second_pass_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "cell.ncc", &clustered_scenario());
    let first = dir.path().join("first.ncc");
    let second = dir.path().join("second.ncc");

    resolve_file(&input, &first, &ResolveParams::default()).unwrap();
    let report = resolve_file(&first, &second, &ResolveParams::default()).unwrap();

    assert_eq!(report.resolved, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

/// The clustered scenario with legacy integer codes: the ambiguous pair is
/// group 9 and the network contacts are groups 1 to 5, after it.
fn legacy_scenario() -> String {
    let mut text = String::new();
    text.push_str(&ncc_row("chr1.a", 5 * MB, "chr2.a", 7 * MB, "9", 10));
    text.push_str(&ncc_row("chr1.b", 5 * MB, "chr2.b", 7 * MB, "9", 10));
    for (i, offset) in [-400_i64, -200, 200, 400, 600].iter().enumerate() {
        let group = (i + 1).to_string();
        text.push_str(&ncc_row("chr1.a", 5 * MB + offset, "chr2.a", 7 * MB + offset, &group, i));
    }
    text
}

#[test]
fn test_legacy_codes_keep_their_grouping() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "cell.ncc", &legacy_scenario());
    let first = dir.path().join("first.ncc");
    let second = dir.path().join("second.ncc");

    let report = resolve_file(&input, &first, &ResolveParams::default()).unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(report.rewrite.lines_rewritten, 7);
    assert_eq!(count_groups(&input).unwrap(), 6);
    assert_eq!(count_groups(&first).unwrap(), 6);

    let codes = ambig_codes(&fs::read_to_string(&first).unwrap());
    assert_eq!(codes, vec!["2.1", "0.0", "1.1", "1.1", "1.1", "1.1", "1.1"]);

    let report = resolve_file(&first, &second, &ResolveParams::default()).unwrap();
    assert_eq!(report.resolved, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(count_groups(&second).unwrap(), 6);
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_split_legacy_group_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut text = String::new();
    text.push_str(&ncc_row("chr1.a", 5 * MB, "chr2.a", 7 * MB, "5", 1));
    text.push_str(&ncc_row("chr3.a", 5 * MB, "chr4.a", 5 * MB, "9", 2));
    text.push_str(&ncc_row("chr1.b", 5 * MB, "chr2.b", 7 * MB, "5", 1));
    let input = write_input(&dir, "cell.ncc", &text);
    let output = dir.path().join("out.ncc");

    let err = resolve_file(&input, &output, &ResolveParams::default()).unwrap_err();
    assert!(matches!(err, NccError::GroupingChanged { line: 3 }), "{}", err);
    assert!(!output.exists());
    assert!(!dir.path().join("out.ncc.part").exists());
}

#[test]
fn test_crlf_and_missing_final_newline_kept() {
    let dir = TempDir::new().unwrap();
    let text = clustered_scenario().trim_end().replace('\n', "\r\n");
    let input = write_input(&dir, "cell.ncc", &text);
    let output = dir.path().join("out.ncc");

    resolve_file(&input, &output, &ResolveParams::default()).unwrap();
    let expected = text.replace("\t0.1\t10\t", "\t0.0\t10\t");
    assert_eq!(fs::read_to_string(&output).unwrap(), expected);
}

#[test]
fn test_three_root_group_removed() {
    let dir = TempDir::new().unwrap();
    let mut text = String::new();
    text.push_str(&ncc_row("chr1.a", 5 * MB, "chr2.a", 7 * MB, "2.1", 1));
    text.push_str(&ncc_row("chr3.a", 5 * MB, "chr1.a", 5 * MB, "0.1", 1));
    text.push_str(&ncc_row("chr1.a", 9 * MB, "chr2.a", 9 * MB, "1.1", 2));
    let input = write_input(&dir, "cell.ncc", &text);
    let output = dir.path().join("out.ncc");

    let params = ResolveParams {
        remove_pos_ambig: true,
        ..ResolveParams::default()
    };
    let report = resolve_file(&input, &output, &params).unwrap();
    assert_eq!(report.removed, 1);

    let codes = ambig_codes(&fs::read_to_string(&output).unwrap());
    assert_eq!(codes, vec!["2.0", "0.0", "1.1"]);
}

#[test]
fn test_isolated_contact_cleaned() {
    let dir = TempDir::new().unwrap();
    let mut text = clustered_scenario();
    text.push_str(&ncc_row("chr3.a", 5 * MB, "chr4.a", 5 * MB, "1.1", 20));
    let input = write_input(&dir, "cell.ncc", &text);
    let output = dir.path().join("cell_clean.ncc");

    let report = remove_isolated_unambig(
        &input,
        &output,
        &IndexParams::default(),
        &CleanParams::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(report.removed, 1);

    let codes = ambig_codes(&fs::read_to_string(&output).unwrap());
    assert_eq!(codes.last().map(String::as_str), Some("1.0"));
    assert_eq!(&codes[..7], &ambig_codes(&clustered_scenario())[..]);
}

#[test]
fn test_gzip_matches_plain() {
    let dir = TempDir::new().unwrap();
    let text = clustered_scenario();
    let plain_in = write_input(&dir, "cell.ncc", &text);
    let gz_in = dir.path().join("cell.ncc.gz");
    let mut encoder = GzEncoder::new(File::create(&gz_in).unwrap(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let plain_out = dir.path().join("plain.ncc");
    let gz_out = dir.path().join("gz.ncc.gz");
    resolve_file(&plain_in, &plain_out, &ResolveParams::default()).unwrap();
    resolve_file(&gz_in, &gz_out, &ResolveParams::default()).unwrap();

    let mut decoded = String::new();
    MultiGzDecoder::new(File::open(&gz_out).unwrap())
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, fs::read_to_string(&plain_out).unwrap());
}

#[test]
fn test_malformed_line_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut text = clustered_scenario();
    text.push_str("chr1.a\t100\t200\t100\t200\t+\tchr2.a\t300\t400\t300\t400\t+\t1.1\n");
    let input = write_input(&dir, "cell.ncc", &text);
    let output = dir.path().join("out.ncc");

    let err = resolve_file(&input, &output, &ResolveParams::default()).unwrap_err();
    assert!(matches!(err, NccError::Parse { line: 8, .. }), "{}", err);
    assert!(!output.exists());
    assert!(!dir.path().join("out.ncc.part").exists());
}

#[test]
fn test_contact_cap_is_fatal() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "cell.ncc", &clustered_scenario());
    let output = dir.path().join("out.ncc");
    let index = IndexParams {
        max_contacts: Some(3),
        ..IndexParams::default()
    };

    let err = resolve_contacts(&input, &output, &index, &ResolveParams::default(), &CancelToken::new()).unwrap_err();
    assert!(matches!(err, NccError::TooManyContacts { max: 3, .. }));
    assert!(!output.exists());
}

#[test]
fn test_cancelled_pass_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "cell.ncc", &clustered_scenario());
    let output = dir.path().join("out.ncc");
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = resolve_contacts(&input, &output, &IndexParams::default(), &ResolveParams::default(), &cancel).unwrap_err();
    assert!(matches!(err, NccError::Cancelled));
    assert!(!output.exists());
}

#[test]
fn test_pipeline_writes_every_pass() {
    let dir = TempDir::new().unwrap();
    let mut text = clustered_scenario();
    text.push_str(&ncc_row("chr3.a", 5 * MB, "chr4.a", 5 * MB, "2.1", 20));
    text.push_str(&ncc_row("chr3.b", 5 * MB, "chr4.b", 5 * MB, "0.1", 20));
    let input = write_input(&dir, "cell.ncc", &text);
    let out_dir = dir.path().join("passes");

    let report = run_pipeline(&input, Some(&out_dir), &PipelineConfig::default(), &CancelToken::new()).unwrap();

    let names: Vec<String> = report
        .outputs
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["cell_clean.ncc", "cell_filter1.ncc", "cell_filter2.ncc", "cell_resolved.ncc"]);
    assert_eq!(report.n_groups, 7);

    for path in &report.outputs {
        let written = fs::read_to_string(path).unwrap();
        assert_eq!(written.lines().count(), 9);
    }

    let codes = ambig_codes(&fs::read_to_string(report.final_output().unwrap()).unwrap());
    assert_eq!(&codes[5..7], &["2.1", "0.0"]);
    // no support for either homologue pair: dropped by the final strict pass
    assert_eq!(&codes[7..], &["2.0", "0.0"]);
}
