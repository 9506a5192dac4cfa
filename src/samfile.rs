//src/samfile.rs
//
// Turns raw alignment lines into fixed-column summary records:
// identity, aligned length, mismatches (from the MD tag), gaps, read quality,
// mapping quality and a global genomic bin.

use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{PivotError, RecordError, Result};
use crate::input::{create_text_writer, open_text_reader};
use crate::pool::scan_lines;
use crate::reftable::ReferenceTable;
use crate::summary::{format_summary_line, SUMMARY_HEADER};
use crate::types::{AlignmentSummary, ScanStats};

/// Optional tags begin at this (0-based) field.
pub const OPTIONAL_FIELDS_START: usize = 11;

/// Prefix of the mismatch-position tag.
pub const MD_TAG_PREFIX: &str = "MD:Z:";

/// CIGAR strings shorter than this mark a read the aligner did not place.
pub const MIN_CIGAR_LEN: usize = 3;

/// Mapping position -> 1000-base bin.
pub const BIN_SCALE: f64 = 0.001;

/// ASCII offset of Sanger-encoded quality characters.
pub const PHRED_OFFSET: i64 = 33;

const FIELD_QNAME: usize = 0;
const FIELD_FLAG: usize = 1;
const FIELD_RNAME: usize = 2;
const FIELD_POS: usize = 3;
const FIELD_MAPQ: usize = 4;
const FIELD_CIGAR: usize = 5;
const FIELD_QUAL: usize = 10;

/// Bitwise alignment flag (field 1). Decoded and kept with the record but not
/// used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamFlags(pub u32);

impl SamFlags {
    /// Part of a pair aligned in a paired-end fashion (0x2).
    pub fn is_paired_aligned(self) -> bool {
        self.0 & 0x2 != 0
    }

    /// The segment itself is mapped (0x4 unset).
    pub fn is_mapped(self) -> bool {
        self.0 & 0x4 == 0
    }

    /// First segment in the template (0x40).
    pub fn is_first(self) -> bool {
        self.0 & 0x40 != 0
    }

    /// Last segment in the template (0x80).
    pub fn is_last(self) -> bool {
        self.0 & 0x80 != 0
    }
}

const CIGAR_OPS: &[u8; 9] = b"MIDNSHP=X";

/// Total base count per CIGAR operation over the whole string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CigarCounts {
    counts: [u32; 9],
}

impl CigarCounts {
    #[inline]
    fn slot(op: u8) -> Option<usize> {
        CIGAR_OPS.iter().position(|&c| c == op)
    }

    /// Total count recorded for `op` (0 for letters outside the alphabet).
    pub fn get(&self, op: u8) -> u32 {
        Self::slot(op).map(|i| self.counts[i]).unwrap_or(0)
    }

    /// Aligned length: total M.
    pub fn alignment_length(&self) -> u32 {
        self.get(b'M')
    }

    /// Gaps: total I + total D.
    pub fn gaps(&self) -> u32 {
        self.get(b'I').saturating_add(self.get(b'D'))
    }

    pub fn insertions(&self) -> u32 {
        self.get(b'I')
    }

    pub fn soft_clips(&self) -> u32 {
        self.get(b'S')
    }
}

/// Sum the count of every operation in a CIGAR string. Operations may repeat
/// and appear in any order. Letters outside `MIDNSHP=X` are dropped along
/// with their count.
pub fn decode_cigar(cigar: &str) -> CigarCounts {
    let mut out = CigarCounts::default();
    let mut run: u32 = 0;

    for &b in cigar.as_bytes() {
        if b.is_ascii_digit() {
            run = run.saturating_mul(10).saturating_add((b - b'0') as u32);
            continue;
        }
        if let Some(i) = CigarCounts::slot(b) {
            out.counts[i] = out.counts[i].saturating_add(run);
        }
        run = 0;
    }
    out
}

/// Mismatches from the first `MD:Z:` tag at or after field 11: every
/// alphabetic character in the tag value marks one reference base that
/// differs (deleted bases after `^` included). No tag means 0.
pub fn count_md_mismatches(fields: &[&str]) -> u32 {
    fields
        .iter()
        .skip(OPTIONAL_FIELDS_START)
        .find_map(|f| f.strip_prefix(MD_TAG_PREFIX))
        .map(|md| md.bytes().filter(u8::is_ascii_alphabetic).count() as u32)
        .unwrap_or(0)
}

/// Mean Phred score of a Sanger-encoded quality string; 0.0 for strings of
/// length 0 or 1 (including the `*` placeholder).
pub fn sanger_quality(qual: &str) -> f64 {
    let bytes = qual.as_bytes();
    if bytes.len() <= 1 {
        return 0.0;
    }
    let total: i64 = bytes.iter().map(|&b| b as i64 - PHRED_OFFSET).sum();
    total as f64 / bytes.len() as f64
}

/// Global bin of a mapping position: the local 1000-base bin (rounded half to
/// even) shifted by the genome's first bin.
pub fn genomic_bin(position: u32, bin_start: u32) -> u32 {
    let local = (position as f64 * BIN_SCALE).round_ties_even() as u32;
    local.saturating_add(bin_start)
}

/// `(M - mismatches + I) / (M + I + S)` on a 0-100 scale.
pub fn percent_identity(cigar: &CigarCounts, mismatches: u32) -> std::result::Result<f64, RecordError> {
    let m = cigar.alignment_length() as i64;
    let ins = cigar.insertions() as i64;
    let soft = cigar.soft_clips() as i64;

    let denominator = m + ins + soft;
    if denominator == 0 {
        return Err(RecordError::ZeroIdentityDenominator);
    }
    let numerator = m - mismatches as i64 + ins;
    Ok(100.0 * numerator as f64 / denominator as f64)
}

/// A decoded alignment line and its flag.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAlignment {
    pub flags: SamFlags,
    pub summary: AlignmentSummary,
}

fn number<T: std::str::FromStr>(fields: &[&str], index: usize) -> std::result::Result<T, RecordError> {
    let raw = fields[index].trim();
    raw.parse().map_err(|_| RecordError::InvalidNumber {
        index,
        value: raw.to_string(),
    })
}

/// Decode one alignment line.
///
/// `Ok(None)` for lines filtered by policy: header lines, unaligned reads
/// (short CIGAR) and genome ids missing from the table.
pub fn summarize_alignment_line(
    line: &str,
    table: &ReferenceTable,
) -> std::result::Result<Option<DecodedAlignment>, RecordError> {
    if line.starts_with('@') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() <= FIELD_QUAL {
        return Err(RecordError::MissingField { index: fields.len() });
    }

    let flags = SamFlags(number(&fields, FIELD_FLAG)?);

    let cigar_field = fields[FIELD_CIGAR];
    if cigar_field.len() < MIN_CIGAR_LEN {
        return Ok(None);
    }

    let gid = fields[FIELD_RNAME]
        .split('|')
        .nth(1)
        .and_then(|tok| tok.trim().parse::<u32>().ok());
    let entry = match gid.and_then(|g| table.get(g)) {
        Some(entry) => entry,
        None => return Ok(None),
    };

    let cigar = decode_cigar(cigar_field);
    let mismatch = count_md_mismatches(&fields);
    let identity = percent_identity(&cigar, mismatch)?;
    let position: u32 = number(&fields, FIELD_POS)?;
    let mapq: u32 = number(&fields, FIELD_MAPQ)?;

    Ok(Some(DecodedAlignment {
        flags,
        summary: AlignmentSummary {
            read_id: fields[FIELD_QNAME].to_string(),
            identity,
            length: cigar.alignment_length(),
            mismatch,
            gap: cigar.gaps(),
            quality: sanger_quality(fields[FIELD_QUAL]),
            mapq,
            bin: genomic_bin(position, entry.bin_start),
            gid: entry.gid,
            tid: entry.tid,
        },
    }))
}

/// Convert a whole alignment file (plain or gzipped) into a summary file.
///
/// Output line order follows worker completion order and is only stable with
/// a single worker; the downstream passes do not depend on it.
pub fn convert_alignments<P: AsRef<Path>, Q: AsRef<Path>>(
    table: &ReferenceTable,
    input: P,
    output: Q,
    threads: usize,
) -> Result<ScanStats> {
    let input = input.as_ref();
    let output = output.as_ref();

    let reader = open_text_reader(input)?;
    let mut writer = create_text_writer(output)?;
    writeln!(writer, "{}", SUMMARY_HEADER).map_err(|e| PivotError::io(output, e))?;

    log::info!("Converting {} -> {}", input.display(), output.display());
    let sink = Mutex::new(writer);
    let stats = scan_lines(
        input,
        reader,
        threads,
        &sink,
        |_, line| summarize_alignment_line(line, table),
        |w, decoded| {
            writeln!(w, "{}", format_summary_line(&decoded.summary))
                .map_err(|e| PivotError::io(output, e))
        },
    )?;

    sink.into_inner()
        .flush()
        .map_err(|e| PivotError::io(output, e))?;

    log::info!(
        "Converted {} of {} alignment lines ({} filtered, {} rejected)",
        stats.kept,
        stats.lines,
        stats.skipped,
        stats.rejected
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reftable::ReferenceEntry;

    fn table() -> ReferenceTable {
        ReferenceTable::from_entries(vec![ReferenceEntry {
            gid: 42,
            tid: 100,
            genome_length: 5000,
            bin_start: 10,
            bin_end: 15,
            strain: "S1".to_string(),
            species: "Sp1".to_string(),
        }])
    }

    fn sam_line(rname: &str, pos: &str, cigar: &str, qual: &str, tags: &[&str]) -> String {
        let mut fields = vec![
            "read1", "0", rname, pos, "37", cigar, "*", "0", "0", "ACGTACGTAC", qual,
        ];
        fields.extend_from_slice(tags);
        fields.join("\t")
    }

    #[test]
    fn cigar_totals_ignore_order_and_repeats() {
        let a = decode_cigar("10M2I3D");
        assert_eq!(a.alignment_length(), 10);
        assert_eq!(a.gaps(), 5);
        assert_eq!(decode_cigar("2I10M3D"), a);

        let b = decode_cigar("5S20M1I4M2D30M");
        assert_eq!(b.alignment_length(), 54);
        assert_eq!(b.gaps(), 3);
        assert_eq!(b.soft_clips(), 5);
        assert_eq!(decode_cigar("3=1X4=").get(b'='), 7);
    }

    #[test]
    fn md_mismatches_count_every_letter() {
        let fields = ["q", "", "", "", "", "", "", "", "", "", "", "NM:i:3", "MD:Z:10A5^AC6"];
        assert_eq!(count_md_mismatches(&fields), 3);
        let no_tag = ["q", "", "", "", "", "", "", "", "", "", "", "NM:i:0"];
        assert_eq!(count_md_mismatches(&no_tag), 0);
    }

    #[test]
    fn md_tag_before_optional_fields_is_ignored() {
        let mut fields = vec![""; 11];
        fields[5] = "MD:Z:A";
        assert_eq!(count_md_mismatches(&fields), 0);
    }

    #[test]
    fn quality_is_mean_offset_score() {
        assert_eq!(sanger_quality("II"), 40.0);
        assert_eq!(sanger_quality("!+"), 5.0);
        assert_eq!(sanger_quality("*"), 0.0);
        assert_eq!(sanger_quality(""), 0.0);
    }

    #[test]
    fn bins_round_half_to_even_and_shift() {
        assert_eq!(genomic_bin(0, 10), 10);
        assert_eq!(genomic_bin(499, 10), 10);
        assert_eq!(genomic_bin(501, 10), 11);
        assert_eq!(genomic_bin(2500, 0), 2);
        assert_eq!(genomic_bin(3500, 0), 4);
    }

    #[test]
    fn identity_formula_and_zero_guard() {
        let c = decode_cigar("5S90M5I");
        let id = percent_identity(&c, 2).unwrap();
        assert!((id - 100.0 * 93.0 / 100.0).abs() < 1e-9);

        let empty = decode_cigar("10H");
        assert_eq!(
            percent_identity(&empty, 0),
            Err(RecordError::ZeroIdentityDenominator)
        );
    }

    #[test]
    fn decodes_a_full_line() {
        let line = sam_line("gi|42|ref|NC_1|", "1500", "10M2I3D", "IIIIIIIIII", &["MD:Z:4A5"]);
        let d = summarize_alignment_line(&line, &table()).unwrap().unwrap();
        let s = &d.summary;
        assert_eq!(s.read_id, "read1");
        assert_eq!(s.length, 10);
        assert_eq!(s.mismatch, 1);
        assert_eq!(s.gap, 5);
        assert_eq!(s.mapq, 37);
        assert_eq!(s.bin, 12);
        assert_eq!(s.gid, 42);
        assert_eq!(s.tid, 100);
        assert_eq!(s.quality, 40.0);
        assert!((s.identity - 100.0 * 11.0 / 12.0).abs() < 1e-9);
        assert!(d.flags.is_mapped());
    }

    #[test]
    fn filtered_lines_produce_nothing() {
        let t = table();
        let unaligned = sam_line("gi|42|ref|", "0", "*", "II", &[]);
        assert_eq!(summarize_alignment_line(&unaligned, &t), Ok(None));

        let unknown = sam_line("gi|7|ref|", "10", "10M", "II", &[]);
        assert_eq!(summarize_alignment_line(&unknown, &t), Ok(None));

        let no_bar = sam_line("chr1", "10", "10M", "II", &[]);
        assert_eq!(summarize_alignment_line(&no_bar, &t), Ok(None));

        assert_eq!(summarize_alignment_line("@SQ\tSN:x\tLN:10", &t), Ok(None));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let t = table();
        assert!(matches!(
            summarize_alignment_line("r\t0\tgi|42|", &t),
            Err(RecordError::MissingField { .. })
        ));

        let bad_pos = sam_line("gi|42|ref|", "x", "10M", "II", &[]);
        assert!(matches!(
            summarize_alignment_line(&bad_pos, &t),
            Err(RecordError::InvalidNumber { index: 3, .. })
        ));

        let clipped_only = sam_line("gi|42|ref|", "10", "20H", "II", &[]);
        assert_eq!(
            summarize_alignment_line(&clipped_only, &t),
            Err(RecordError::ZeroIdentityDenominator)
        );
    }

    #[test]
    fn flag_bits() {
        let f = SamFlags(0x2 | 0x40);
        assert!(f.is_paired_aligned());
        assert!(f.is_first());
        assert!(!f.is_last());
        assert!(!SamFlags(0x4).is_mapped());
    }
}
