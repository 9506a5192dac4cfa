// src/lib.rs
pub mod assign;
pub mod config;
pub mod diversity;
pub mod error;
pub mod input;
pub mod logging;
pub mod pivot;
pub mod pool;
pub mod reftable;
pub mod samfile;
pub mod summary;
pub mod types;

use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assign::{SpeciesAssigner, StrainAggregator, WseiIndex};
use crate::config::PipelineConfig;
use crate::error::{PivotError, Result};
use crate::reftable::ReferenceTable;
use crate::types::{ReadAssignmentRow, ScanStats, SpeciesReportRow, StrainReportRow};

pub use crate::reftable::parse_reference_table;
pub use crate::samfile::convert_alignments;

pub const STRAIN_REPORT_HEADER: &str = "Taxon,Abundance,Shannon,Coverage,WSEI,Total Bin,Identity,\
Alignment Length,Mismatch,Gap,Read Quality,Alignment Quality";

pub const SPECIES_REPORT_HEADER: &str =
    "Taxon,Abundance,Identity,Alignment Length,Mismatch,Gap,Read Quality,Alignment Quality";

pub const ASSIGNMENT_REPORT_HEADER: &str = "Read ID,Identity,Alignment Length,Mismatch,Gap,\
Read Quality,Alignment Quality,TID,WSEI,Taxon";

/// Results of the strain and species passes over one summary file.
/// Only structured rows are kept; report text is generated on demand.
pub struct ProfileResults {
    /// One row per taxonomy id seen in the input
    pub strain_rows: Vec<StrainReportRow>,
    /// taxonomy id -> WSEI for taxa that passed the identity filter
    pub wsei_index: WseiIndex,
    pub species_rows: Vec<SpeciesReportRow>,
    /// The winning taxonomy of every assigned read
    pub read_rows: Vec<ReadAssignmentRow>,

    pub strain_stats: ScanStats,
    pub species_stats: ScanStats,
}

/// Where the three reports of one run are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub strain: PathBuf,
    pub species: PathBuf,
    pub assignment: PathBuf,
}

impl ReportPaths {
    pub fn from_prefix<P: AsRef<Path>>(prefix: P) -> Self {
        let prefix = prefix.as_ref().as_os_str().to_string_lossy().into_owned();
        Self {
            strain: PathBuf::from(format!("{prefix}.strain.csv")),
            species: PathBuf::from(format!("{prefix}.pivot.csv")),
            assignment: PathBuf::from(format!("{prefix}.assign.csv")),
        }
    }
}

/// Report prefix for an input: same directory, file name cut at its first '.'.
pub fn default_prefix(input: &Path) -> PathBuf {
    let stem = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.split('.').next().unwrap_or_default();
    let stem = if stem.is_empty() { "profile" } else { stem };
    input.with_file_name(stem)
}

impl ProfileResults {
    /// Generate the strain-level report on demand
    pub fn get_strain_report(&self) -> String {
        let mut output = String::new();
        output.push_str(STRAIN_REPORT_HEADER);
        output.push('\n');

        for row in &self.strain_rows {
            let m = &row.means;
            let _ = writeln!(
                output,
                "{},{},{:.2},{:.2},{:.2},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
                row.taxon, row.abundance, row.shannon, row.coverage, row.wsei, row.total_bins,
                m.identity, m.length, m.mismatch, m.gap, m.quality, m.mapq
            );
        }
        output
    }

    /// Generate the species-level report on demand
    pub fn get_species_report(&self) -> String {
        let mut output = String::new();
        output.push_str(SPECIES_REPORT_HEADER);
        output.push('\n');

        for row in &self.species_rows {
            let m = &row.means;
            let _ = writeln!(
                output,
                "{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
                row.species, row.abundance, m.identity, m.length, m.mismatch, m.gap, m.quality, m.mapq
            );
        }
        output
    }

    /// Generate the per-read assignment report on demand
    pub fn get_assignment_report(&self) -> String {
        let mut output = String::new();
        output.push_str(ASSIGNMENT_REPORT_HEADER);
        output.push('\n');

        for row in &self.read_rows {
            let _ = writeln!(
                output,
                "{},{:.2},{},{},{},{:.2},{},{},{:.2},{}",
                row.read_id, row.identity, row.length, row.mismatch, row.gap,
                row.quality, row.mapq, row.tid, row.wsei, row.species
            );
        }
        output
    }

    /// Write all three reports next to `prefix`.
    pub fn write_reports<P: AsRef<Path>>(&self, prefix: P) -> Result<ReportPaths> {
        let paths = ReportPaths::from_prefix(prefix);
        write_text(&paths.strain, &self.get_strain_report())?;
        write_text(&paths.species, &self.get_species_report())?;
        write_text(&paths.assignment, &self.get_assignment_report())?;
        Ok(paths)
    }
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).map_err(|e| PivotError::io(path, e))
}

/// Strain pass followed by species pass over the same summary file.
/// The species pass only sees the strain pass's WSEI map.
pub fn profile_alignments<P: AsRef<Path>>(
    table: &ReferenceTable,
    summary_path: P,
    config: &PipelineConfig,
) -> Result<ProfileResults> {
    let summary_path = summary_path.as_ref();

    // 1. Strain level: bin occupancy diversity per taxonomy id
    let strain = StrainAggregator::new(table, config).run(summary_path)?;

    // 2. Species level: one winner per read, using the strain WSEI map
    let species = SpeciesAssigner::new(table, &strain.wsei_index, config).run(summary_path)?;

    Ok(ProfileResults {
        strain_rows: strain.rows,
        wsei_index: strain.wsei_index,
        species_rows: species.species_rows,
        read_rows: species.read_rows,
        strain_stats: strain.stats,
        species_stats: species.stats,
    })
}
