//src/reftable.rs

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::{PivotError, Result};
use crate::input::{open_text_reader, unquote};

/// One reference genome and the taxon it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEntry {
    pub gid: u32,
    pub tid: u32,
    pub genome_length: u32,
    pub bin_start: u32,
    pub bin_end: u32,
    pub strain: String,
    pub species: String,
}

impl ReferenceEntry {
    /// Number of 1000-base bins this genome spans.
    pub fn bin_count(&self) -> u64 {
        u64::from(self.bin_end).saturating_sub(u64::from(self.bin_start)) + 1
    }
}

/// Genome id -> entry. Ordered by genome id so that every derived
/// per-taxon lookup is built in the same order on every run.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: BTreeMap<u32, ReferenceEntry>,
}

impl ReferenceTable {
    pub fn from_entries<I: IntoIterator<Item = ReferenceEntry>>(entries: I) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.gid, e)).collect(),
        }
    }

    pub fn get(&self, gid: u32) -> Option<&ReferenceEntry> {
        self.entries.get(&gid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses a reference table in the format:
/// ```text
/// <gid>,<tid>,<genome_length>,<bin_start>,<bin_end>,<strain>,<species>
/// ```
/// The first line is a header and is skipped. Blank lines are ignored.
pub fn parse_reference_table<P: AsRef<Path>>(filepath: P) -> Result<ReferenceTable> {
    let path = filepath.as_ref();
    let reader = open_text_reader(path)?;
    let mut entries = Vec::new();

    for (idx, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| PivotError::io(path, e))?;
        if idx == 0 || line.trim().is_empty() {
            continue;
        }
        entries.push(parse_reference_row(&line, idx + 1)?);
    }

    if entries.is_empty() {
        return Err(PivotError::EmptyReferenceTable);
    }
    log::info!("Loaded {} reference genomes from {}", entries.len(), path.display());
    Ok(ReferenceTable::from_entries(entries))
}

fn parse_reference_row(line: &str, line_no: usize) -> Result<ReferenceEntry> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 7 {
        return Err(PivotError::ReferenceTable {
            line: line_no,
            detail: format!("expected 7 fields, found {}", parts.len()),
        });
    }

    let number = |i: usize| -> Result<u32> {
        let raw = unquote(parts[i]);
        raw.parse().map_err(|_| PivotError::ReferenceTable {
            line: line_no,
            detail: format!("field {} is not an unsigned integer: '{}'", i, raw),
        })
    };

    let entry = ReferenceEntry {
        gid: number(0)?,
        tid: number(1)?,
        genome_length: number(2)?,
        bin_start: number(3)?,
        bin_end: number(4)?,
        strain: unquote(parts[5]).to_string(),
        species: unquote(parts[6]).to_string(),
    };

    if entry.bin_end < entry.bin_start {
        return Err(PivotError::ReferenceTable {
            line: line_no,
            detail: format!("bin range {}..{} is reversed", entry.bin_start, entry.bin_end),
        });
    }
    Ok(entry)
}
