// src/assign/strain.rs

use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::config::PipelineConfig;
use crate::diversity::DiversityIndex;
use crate::error::{PivotError, Result};
use crate::input::{open_text_reader, skip_header};
use crate::pivot::PivotAccumulator;
use crate::pool::scan_lines;
use crate::reftable::ReferenceTable;
use crate::summary::parse_summary_line;
use crate::types::{ScanStats, StrainReportRow};

/// taxonomy id -> weighted Shannon evenness index, for taxa that passed the
/// identity filter. The only state handed from the strain pass to the
/// species pass.
pub type WseiIndex = BTreeMap<u32, f64>;

/// taxonomy id -> merged contributions.
pub type StrainAccumulators = AHashMap<u32, PivotAccumulator>;

/// Merge one contribution into its taxon's accumulator.
pub fn merge_contribution(accumulators: &mut StrainAccumulators, contribution: PivotAccumulator) {
    match accumulators.entry(contribution.tid) {
        Entry::Occupied(mut e) => *e.get_mut() += contribution,
        Entry::Vacant(e) => {
            e.insert(contribution);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrainResult {
    /// One row per taxonomy id, ordered by taxonomy id.
    pub rows: Vec<StrainReportRow>,
    pub wsei_index: WseiIndex,
    pub stats: ScanStats,
    /// Records skipped because their taxonomy id is not in the reference table.
    pub unknown_taxon_records: u64,
}

/// Strain-level abundance and bin-occupancy diversity.
pub struct StrainAggregator {
    /// tid -> strain name
    taxon_names: AHashMap<u32, String>,
    /// tid -> bins summed over every genome of that taxon
    total_bins: AHashMap<u32, u64>,
    min_identity: f64,
    threads: usize,
}

impl StrainAggregator {
    pub fn new(table: &ReferenceTable, config: &PipelineConfig) -> Self {
        let mut taxon_names = AHashMap::new();
        let mut total_bins: AHashMap<u32, u64> = AHashMap::new();

        for entry in table.iter() {
            taxon_names.insert(entry.tid, entry.strain.clone());
            let bins = total_bins.entry(entry.tid).or_insert(0);
            *bins = bins.saturating_add(entry.bin_count());
        }

        Self {
            taxon_names,
            total_bins,
            min_identity: config.strain_min_identity,
            threads: config.threads,
        }
    }

    pub fn total_bins(&self, tid: u32) -> Option<u64> {
        self.total_bins.get(&tid).copied()
    }

    /// Single pass over a summary file: every record is merged into the
    /// accumulator of its taxonomy id with its genomic bin as the site.
    /// Records of taxa unknown to the reference table are skipped and
    /// counted (last element of the result).
    pub fn aggregate<P: AsRef<Path>>(
        &self,
        summary_path: P,
    ) -> Result<(StrainAccumulators, ScanStats, u64)> {
        let path = summary_path.as_ref();
        let mut reader = open_text_reader(path)?;
        if !skip_header(&mut reader).map_err(|e| PivotError::io(path, e))? {
            log::warn!("{} is empty", path.display());
            return Ok((StrainAccumulators::new(), ScanStats::default(), 0));
        }

        let unknown = AtomicU64::new(0);
        let table = Mutex::new(StrainAccumulators::new());
        let stats = scan_lines(
            path,
            reader,
            self.threads,
            &table,
            |_, line| {
                let s = parse_summary_line(line)?;
                if !self.total_bins.contains_key(&s.tid) {
                    unknown.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
                Ok(Some(PivotAccumulator::from_summary(&s, s.bin)))
            },
            |acc, contribution| {
                merge_contribution(acc, contribution);
                Ok(())
            },
        )?;

        let unknown = unknown.into_inner();
        if unknown > 0 {
            log::warn!(
                "{}: {} record(s) skipped, taxonomy id not in the reference table",
                path.display(),
                unknown
            );
        }
        Ok((table.into_inner(), stats, unknown))
    }

    /// Diversity per taxon and the filtered WSEI map.
    pub fn finalize(&self, accumulators: &StrainAccumulators) -> (Vec<StrainReportRow>, WseiIndex) {
        let mut tids: Vec<u32> = accumulators.keys().copied().collect();
        tids.sort_unstable();

        let mut rows = Vec::with_capacity(tids.len());
        let mut wsei_index = WseiIndex::new();

        for tid in tids {
            let acc = &accumulators[&tid];
            let bins = self.total_bins(tid).unwrap_or(0);
            let diversity = DiversityIndex::compute(&acc.sites, bins);
            if diversity.degenerate {
                log::warn!(
                    "taxon {} spans {} bin(s); diversity indices reported as 0",
                    tid,
                    bins
                );
            }

            rows.push(StrainReportRow {
                tid,
                taxon: self.taxon_names.get(&tid).cloned().unwrap_or_default(),
                abundance: acc.count(),
                shannon: diversity.shannon,
                coverage: diversity.coverage,
                wsei: diversity.wsei,
                total_bins: bins,
                means: acc.means(),
            });

            if acc.identity < self.min_identity * acc.count() as f64 {
                continue;
            }
            wsei_index.insert(tid, diversity.wsei);
        }

        (rows, wsei_index)
    }

    pub fn run<P: AsRef<Path>>(&self, summary_path: P) -> Result<StrainResult> {
        let path = summary_path.as_ref();
        log::info!("Strain level assignment of {}", path.display());

        let (accumulators, stats, unknown_taxon_records) = self.aggregate(path)?;
        let (rows, wsei_index) = self.finalize(&accumulators);

        log::info!(
            "{} taxa observed, {} retained for species assignment",
            rows.len(),
            wsei_index.len()
        );
        Ok(StrainResult {
            rows,
            wsei_index,
            stats,
            unknown_taxon_records,
        })
    }
}
