//src/types.rs

/// One decoded alignment, as written to and read back from the summary file.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentSummary {
    pub read_id: String,
    /// Percent identity, 0-100.
    pub identity: f64,
    /// Total M bases in the CIGAR string.
    pub length: u32,
    pub mismatch: u32,
    /// Inserted plus deleted bases.
    pub gap: u32,
    /// Mean Phred score of the read.
    pub quality: f64,
    pub mapq: u32,
    /// Global bin index (genome's bin_start + local 1000-base bin).
    pub bin: u32,
    pub gid: u32,
    pub tid: u32,
}

/// Per-contribution averages of the six alignment metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricMeans {
    pub identity: f64,
    pub length: f64,
    pub mismatch: f64,
    pub gap: f64,
    pub quality: f64,
    pub mapq: f64,
}

/// A structured representation of one row in the strain-level report.
///  Taxon  Abundance  Shannon  Coverage  WSEI  Total Bin  <means...>
#[derive(Debug, Clone)]
pub struct StrainReportRow {
    pub tid: u32,
    pub taxon: String,
    pub abundance: usize,
    pub shannon: f64,
    pub coverage: f64,
    pub wsei: f64,
    pub total_bins: u64,
    pub means: MetricMeans,
}

/// A structured representation of one row in the species-level report.
#[derive(Debug, Clone)]
pub struct SpeciesReportRow {
    pub species: String,
    pub abundance: usize,
    pub means: MetricMeans,
}

/// The winning assignment of a single read.
#[derive(Debug, Clone)]
pub struct ReadAssignmentRow {
    pub read_id: String,
    pub identity: f64,
    pub length: u64,
    pub mismatch: u64,
    pub gap: u64,
    pub quality: f64,
    pub mapq: u64,
    pub tid: u32,
    pub wsei: f64,
    pub species: String,
}

/// Line accounting for one pass over an input file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Lines read after the header.
    pub lines: u64,
    /// Lines that produced a record and were merged.
    pub kept: u64,
    /// Lines filtered out by policy (unaligned, unknown genome, thresholds).
    pub skipped: u64,
    /// Lines that could not be parsed.
    pub rejected: u64,
}
