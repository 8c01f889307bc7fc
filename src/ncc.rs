//! NCC contact files: row parsing, ambiguity codes and group numbering.
//!
//! Every scan of a file (both indexing scans and the rewrite) goes through
//! [`ContactScanner`], so the group numbers seen by each stage are derived by
//! the same rule from the same column.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rustc_hash::FxHashSet;

use crate::error::{NccError, Result};
use crate::ncc_structs::{Contact, GroupId, Strand};

pub const NCC_COLUMNS: usize = 15;
pub const AMBIG_COLUMN: usize = 12;

/// Decoded ambiguity-code column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbigCode {
    /// Plain integer: the value is the group number.
    Legacy(GroupId),
    /// `<size>.<keep>`: a non-zero size opens a new group, keep 0 marks the
    /// row inactive.
    Dotted { size: u64, active: bool },
}

impl AmbigCode {
    pub fn is_active(&self) -> bool {
        match *self {
            AmbigCode::Legacy(_) => true,
            AmbigCode::Dotted { active, .. } => active,
        }
    }
}

/// The only decoder for the ambiguity-code column.
pub fn decode_ambig_code(code: &str) -> Option<AmbigCode> {
    match code.split_once('.') {
        Some((size, keep)) => {
            let size = size.parse::<u64>().ok()?;
            if keep.is_empty() || !keep.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some(AmbigCode::Dotted {
                size,
                active: keep != "0",
            })
        }
        None => code.parse::<GroupId>().ok().map(AmbigCode::Legacy),
    }
}

pub fn encode_ambig_code(size: usize, keep: bool) -> String {
    format!("{}.{}", size, keep as u8)
}

/// Running group number over a file, plus the set of distinct numbers seen.
#[derive(Debug, Default)]
pub struct GroupNumbering {
    current: GroupId,
    seen: FxHashSet<GroupId>,
}

impl GroupNumbering {
    pub fn advance(&mut self, code: &AmbigCode) -> GroupId {
        match *code {
            AmbigCode::Dotted { size, .. } => {
                // inactive rows still open groups
                if size > 0 {
                    self.current += 1;
                }
            }
            AmbigCode::Legacy(group) => self.current = group,
        }
        self.seen.insert(self.current);
        self.current
    }

    pub fn n_groups(&self) -> usize {
        self.seen.len()
    }
}

fn parse_int(field: &str, name: &str) -> std::result::Result<i64, String> {
    field
        .parse::<i64>()
        .map_err(|_| format!("invalid {} '{}'", name, field))
}

fn parse_strand(field: &str) -> std::result::Result<Strand, String> {
    match field {
        "+" => Ok(Strand::Plus),
        "-" => Ok(Strand::Minus),
        _ => Err(format!("invalid strand '{}'", field)),
    }
}

pub fn parse_contact(line: &str) -> std::result::Result<Contact, String> {
    let fields: Vec<&str> = line.split_ascii_whitespace().collect();
    if fields.len() != NCC_COLUMNS {
        return Err(format!(
            "expected {} columns, found {}",
            NCC_COLUMNS,
            fields.len()
        ));
    }

    let ambig = decode_ambig_code(fields[AMBIG_COLUMN])
        .ok_or_else(|| format!("invalid ambiguity code '{}'", fields[AMBIG_COLUMN]))?;

    Ok(Contact {
        chr_a: fields[0].to_string(),
        f_start_a: parse_int(fields[1], "fragment start")?,
        f_end_a: parse_int(fields[2], "fragment end")?,
        start_a: parse_int(fields[3], "start")?,
        end_a: parse_int(fields[4], "end")?,
        strand_a: parse_strand(fields[5])?,
        chr_b: fields[6].to_string(),
        f_start_b: parse_int(fields[7], "fragment start")?,
        f_end_b: parse_int(fields[8], "fragment end")?,
        start_b: parse_int(fields[9], "start")?,
        end_b: parse_int(fields[10], "end")?,
        strand_b: parse_strand(fields[11])?,
        ambig,
        pair_id: parse_int(fields[13], "pair id")?,
        swap_pair: parse_int(fields[14], "swap flag")?,
    })
}

/// Byte range of the ambiguity-code column within `line`.
pub fn ambig_code_span(line: &str) -> Option<(usize, usize)> {
    let base = line.as_ptr() as usize;
    line.split_ascii_whitespace().nth(AMBIG_COLUMN).map(|field| {
        let start = field.as_ptr() as usize - base;
        (start, start + field.len())
    })
}

pub fn is_gzip(path: &Path) -> bool {
    matches!(path.extension(), Some(ext) if ext == "gz")
}

pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| {
        NccError::Io(io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Output sink, optionally gzip-compressed.
pub enum NccWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl NccWriter {
    pub fn create(path: &Path, gzip: bool) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            NccError::Io(io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let writer = BufWriter::new(file);
        if gzip {
            Ok(NccWriter::Gzip(GzEncoder::new(writer, Compression::default())))
        } else {
            Ok(NccWriter::Plain(writer))
        }
    }

    pub fn finish(self) -> Result<()> {
        match self {
            NccWriter::Plain(mut w) => w.flush()?,
            NccWriter::Gzip(w) => w.finish()?.flush()?,
        }
        Ok(())
    }
}

impl Write for NccWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            NccWriter::Plain(w) => w.write(buf),
            NccWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            NccWriter::Plain(w) => w.flush(),
            NccWriter::Gzip(w) => w.flush(),
        }
    }
}

/// A parsed row together with its position and group number.
#[derive(Debug)]
pub struct ScannedLine {
    pub line_idx: usize,
    pub group: GroupId,
    /// Raw text, including its line terminator if it had one.
    pub line: String,
    pub contact: Contact,
}

/// Streams every row of an NCC source, numbering groups as it goes.
pub struct ContactScanner<R: BufRead> {
    path: PathBuf,
    reader: R,
    numbering: GroupNumbering,
    n_lines: usize,
}

impl ContactScanner<Box<dyn BufRead>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(ContactScanner::new(open_reader(path)?, path))
    }
}

impl<R: BufRead> ContactScanner<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        ContactScanner {
            path: path.into(),
            reader,
            numbering: GroupNumbering::default(),
            n_lines: 0,
        }
    }

    pub fn n_lines(&self) -> usize {
        self.n_lines
    }

    pub fn n_groups(&self) -> usize {
        self.numbering.n_groups()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<R: BufRead> Iterator for ContactScanner<R> {
    type Item = Result<ScannedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(NccError::Io(e))),
        }
        let line_idx = self.n_lines;
        self.n_lines += 1;

        let contact = match parse_contact(&line) {
            Ok(contact) => contact,
            Err(message) => return Some(Err(NccError::parse(&self.path, line_idx + 1, message))),
        };
        let group = self.numbering.advance(&contact.ambig);

        Some(Ok(ScannedLine {
            line_idx,
            group,
            line,
            contact,
        }))
    }
}

/// Number of distinct ambiguity groups in a file, numbered the same way as
/// every other scan.
pub fn count_groups(path: &Path) -> Result<usize> {
    let mut scanner = ContactScanner::open(path)?;
    for item in &mut scanner {
        item?;
    }
    Ok(scanner.n_groups())
}
