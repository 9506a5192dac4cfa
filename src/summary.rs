//src/summary.rs
//
// The summary file sits between the converter and the two profiling passes.
// Downstream code indexes columns by position, never by header name.

use std::fmt::Write as FmtWrite;
use std::str::FromStr;

use crate::error::RecordError;
use crate::input::unquote;
use crate::types::AlignmentSummary;

pub const SUMMARY_COLUMNS: usize = 10;

pub const SUMMARY_HEADER: &str =
    "Read ID,Identity,Length,Mismatch,Gaps,Read Quality,Map Quality,Bin,GID,TID";

pub const COL_READ_ID: usize = 0;
pub const COL_IDENTITY: usize = 1;
pub const COL_LENGTH: usize = 2;
pub const COL_MISMATCH: usize = 3;
pub const COL_GAP: usize = 4;
pub const COL_QUALITY: usize = 5;
pub const COL_MAPQ: usize = 6;
pub const COL_BIN: usize = 7;
pub const COL_GID: usize = 8;
pub const COL_TID: usize = 9;

/// Render one record (without trailing newline).
pub fn format_summary_line(s: &AlignmentSummary) -> String {
    let mut out = String::with_capacity(64 + s.read_id.len());
    let _ = write!(
        out,
        "\"{}\",{:.2},{},{},{},{:.2},{},{},{},{}",
        s.read_id, s.identity, s.length, s.mismatch, s.gap, s.quality, s.mapq, s.bin, s.gid, s.tid
    );
    out
}

/// Split a summary line into exactly `SUMMARY_COLUMNS` fields. Tab-separated
/// lines are accepted as well as comma-separated ones. The read id is the
/// only free-text column, so splitting from the right lets it contain commas.
pub fn split_summary_line(line: &str) -> Result<Vec<&str>, RecordError> {
    let delim = if line.contains('\t') { '\t' } else { ',' };
    let mut fields: Vec<&str> = line.rsplitn(SUMMARY_COLUMNS, delim).collect();
    if fields.len() < SUMMARY_COLUMNS {
        return Err(RecordError::MissingField {
            index: SUMMARY_COLUMNS - fields.len(),
        });
    }
    fields.reverse();
    Ok(fields)
}

pub fn parse_field<T: FromStr>(fields: &[&str], index: usize) -> Result<T, RecordError> {
    let raw = fields
        .get(index)
        .ok_or(RecordError::MissingField { index })?
        .trim();
    raw.parse().map_err(|_| RecordError::InvalidNumber {
        index,
        value: raw.to_string(),
    })
}

/// Like `parse_field`, but `NaN` and infinities are rejected.
pub fn parse_finite(fields: &[&str], index: usize) -> Result<f64, RecordError> {
    let value: f64 = parse_field(fields, index)?;
    if !value.is_finite() {
        return Err(RecordError::InvalidNumber {
            index,
            value: fields[index].trim().to_string(),
        });
    }
    Ok(value)
}

pub fn parse_summary_line(line: &str) -> Result<AlignmentSummary, RecordError> {
    let fields = split_summary_line(line)?;
    Ok(AlignmentSummary {
        read_id: unquote(fields[COL_READ_ID]).to_string(),
        identity: parse_finite(&fields, COL_IDENTITY)?,
        length: parse_field(&fields, COL_LENGTH)?,
        mismatch: parse_field(&fields, COL_MISMATCH)?,
        gap: parse_field(&fields, COL_GAP)?,
        quality: parse_finite(&fields, COL_QUALITY)?,
        mapq: parse_field(&fields, COL_MAPQ)?,
        bin: parse_field(&fields, COL_BIN)?,
        gid: parse_field(&fields, COL_GID)?,
        tid: parse_field(&fields, COL_TID)?,
    })
}
