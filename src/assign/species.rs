// src/assign/species.rs

use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use ahash::AHashMap;
use parking_lot::Mutex;

use super::strain::WseiIndex;
use crate::config::{PipelineConfig, TieBreak};
use crate::error::{PivotError, Result};
use crate::input::{open_text_reader, skip_header};
use crate::pivot::PivotAccumulator;
use crate::pool::scan_lines;
use crate::reftable::ReferenceTable;
use crate::summary::parse_summary_line;
use crate::types::{AlignmentSummary, ReadAssignmentRow, ScanStats, SpeciesReportRow};

/// A candidate (or winning) taxonomy for one read: a single-contribution
/// accumulator whose only site is its taxonomy id, and the position of the
/// line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadAssignment {
    pub pivot: PivotAccumulator,
    pub seq: u64,
}

/// read id -> current winner
pub type AssignmentTable = AHashMap<String, ReadAssignment>;

/// Shared state of the resolution pass.
#[derive(Debug, Default)]
pub struct AssignmentState {
    resolved: AssignmentTable,
    /// Candidates held back until the pass ends (`TieBreak::LastInFile`).
    pending: AHashMap<String, Vec<ReadAssignment>>,
}

#[derive(Debug, Clone, Default)]
pub struct SpeciesResult {
    /// Ordered by species name.
    pub species_rows: Vec<SpeciesReportRow>,
    /// Ordered by read id.
    pub read_rows: Vec<ReadAssignmentRow>,
    pub stats: ScanStats,
}

/// Resolves every read to one taxonomy id and rolls the winners up by species.
pub struct SpeciesAssigner {
    /// tid -> species name
    species_of: AHashMap<u32, String>,
    /// species name -> max strain WSEI, only species at or above the threshold
    species_wsei: BTreeMap<String, f64>,
    min_identity: f64,
    tie_break: TieBreak,
    threads: usize,
}

impl SpeciesAssigner {
    /// `wsei_index` is the strain pass's output.
    pub fn new(table: &ReferenceTable, wsei_index: &WseiIndex, config: &PipelineConfig) -> Self {
        let mut species_of = AHashMap::new();
        for entry in table.iter() {
            species_of.insert(entry.tid, entry.species.clone());
        }

        let mut species_wsei: BTreeMap<String, f64> = BTreeMap::new();
        for (&tid, &wsei) in wsei_index {
            if wsei < config.species_min_wsei {
                continue;
            }
            let Some(species) = species_of.get(&tid) else {
                log::warn!("taxonomy id {} has no species in the reference table", tid);
                continue;
            };
            let best = species_wsei.entry(species.clone()).or_insert(wsei);
            if wsei > *best {
                *best = wsei;
            }
        }
        log::info!("{} species pass the evenness filter", species_wsei.len());

        Self {
            species_of,
            species_wsei,
            min_identity: config.read_min_identity,
            tie_break: config.tie_break,
            threads: config.threads,
        }
    }

    pub fn species_of(&self, tid: u32) -> Option<&str> {
        self.species_of.get(&tid).map(String::as_str)
    }

    /// Species-level WSEI; `None` if the species was filtered out.
    pub fn species_wsei(&self, species: &str) -> Option<f64> {
        self.species_wsei.get(species).copied()
    }

    fn tid_wsei(&self, tid: u32) -> f64 {
        self.species_of(tid)
            .and_then(|s| self.species_wsei(s))
            .unwrap_or(0.0)
    }

    /// Turn a summary record into a candidate, or `None` if the alignment is
    /// too poor or its species did not pass the evenness filter.
    pub fn candidate(&self, seq: u64, summary: &AlignmentSummary) -> Option<ReadAssignment> {
        let species = self.species_of(summary.tid)?;
        self.species_wsei(species)?;
        if summary.identity < self.min_identity {
            return None;
        }
        Some(ReadAssignment {
            pivot: PivotAccumulator::from_summary(summary, summary.tid),
            seq,
        })
    }

    /// Resolve `candidate` against the current winner for `read_id`.
    /// Returns whether the candidate took the slot.
    ///
    /// 1. no winner yet: take it
    /// 2. winner has more matched bases (length - mismatches): keep winner
    /// 3. winner's species has the higher WSEI: keep winner
    /// 4. otherwise the candidate replaces the winner
    pub fn resolve(&self, assignments: &mut AssignmentTable, read_id: String, candidate: ReadAssignment) -> bool {
        let incumbent = match assignments.entry(read_id) {
            Entry::Vacant(e) => {
                e.insert(candidate);
                return true;
            }
            Entry::Occupied(e) => e.into_mut(),
        };

        if incumbent.pivot.matched_bases() > candidate.pivot.matched_bases() {
            return false;
        }
        if self.tid_wsei(incumbent.pivot.tid) > self.tid_wsei(candidate.pivot.tid) {
            return false;
        }
        *incumbent = candidate;
        true
    }

    fn merge_candidate(&self, state: &mut AssignmentState, read_id: String, candidate: ReadAssignment) {
        match self.tie_break {
            TieBreak::LastProcessed => {
                self.resolve(&mut state.resolved, read_id, candidate);
            }
            TieBreak::LastInFile => {
                state.pending.entry(read_id).or_default().push(candidate);
            }
        }
    }

    /// Replay held-back candidates in file order.
    fn settle(&self, state: AssignmentState) -> AssignmentTable {
        let AssignmentState { mut resolved, pending } = state;
        for (read_id, mut candidates) in pending {
            candidates.sort_unstable_by_key(|c| c.seq);
            for c in candidates {
                self.resolve(&mut resolved, read_id.clone(), c);
            }
        }
        resolved
    }

    /// Second pass over the summary file: pick the winning taxonomy of every read.
    pub fn assign<P: AsRef<Path>>(&self, summary_path: P) -> Result<(AssignmentTable, ScanStats)> {
        let path = summary_path.as_ref();
        let mut reader = open_text_reader(path)?;
        if !skip_header(&mut reader).map_err(|e| PivotError::io(path, e))? {
            log::warn!("{} is empty", path.display());
            return Ok((AssignmentTable::new(), ScanStats::default()));
        }

        let state = Mutex::new(AssignmentState::default());
        let stats = scan_lines(
            path,
            reader,
            self.threads,
            &state,
            |seq, line| {
                let s = parse_summary_line(line)?;
                Ok(self.candidate(seq, &s).map(|c| (s.read_id, c)))
            },
            |st, (read_id, candidate)| {
                self.merge_candidate(st, read_id, candidate);
                Ok(())
            },
        )?;

        Ok((self.settle(state.into_inner()), stats))
    }

    /// Species report rows and per-read rows from the winners.
    pub fn finalize(&self, assignments: &AssignmentTable) -> (Vec<SpeciesReportRow>, Vec<ReadAssignmentRow>) {
        let mut read_ids: Vec<&String> = assignments.keys().collect();
        read_ids.sort_unstable();

        let mut per_species: BTreeMap<&str, PivotAccumulator> = BTreeMap::new();
        let mut read_rows = Vec::with_capacity(read_ids.len());

        for read_id in read_ids {
            let pivot = &assignments[read_id].pivot;
            let species = self.species_of(pivot.tid).unwrap_or_default();

            match per_species.get_mut(species) {
                Some(acc) => *acc += pivot,
                None => {
                    per_species.insert(species, pivot.clone());
                }
            }

            read_rows.push(ReadAssignmentRow {
                read_id: read_id.clone(),
                identity: pivot.identity,
                length: pivot.length,
                mismatch: pivot.mismatch,
                gap: pivot.gap,
                quality: pivot.quality,
                mapq: pivot.mapq,
                tid: pivot.tid,
                wsei: self.tid_wsei(pivot.tid),
                species: species.to_string(),
            });
        }

        let species_rows = per_species
            .into_iter()
            .map(|(species, acc)| SpeciesReportRow {
                species: species.to_string(),
                abundance: acc.count(),
                means: acc.means(),
            })
            .collect();

        (species_rows, read_rows)
    }

    pub fn run<P: AsRef<Path>>(&self, summary_path: P) -> Result<SpeciesResult> {
        let path = summary_path.as_ref();
        log::info!("Species level assignment of {}", path.display());

        let (assignments, stats) = self.assign(path)?;
        let (species_rows, read_rows) = self.finalize(&assignments);

        log::info!(
            "{} reads assigned to {} species",
            read_rows.len(),
            species_rows.len()
        );
        Ok(SpeciesResult { species_rows, read_rows, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reftable::ReferenceEntry;

    fn entry(gid: u32, tid: u32, species: &str) -> ReferenceEntry {
        ReferenceEntry {
            gid,
            tid,
            genome_length: 4000,
            bin_start: gid * 4,
            bin_end: gid * 4 + 3,
            strain: format!("strain{tid}"),
            species: species.to_string(),
        }
    }

    fn assigner(wsei: &[(u32, f64)], tie_break: TieBreak) -> SpeciesAssigner {
        let table = ReferenceTable::from_entries(vec![
            entry(1, 100, "Alpha"),
            entry(2, 101, "Alpha"),
            entry(3, 200, "Beta"),
            entry(4, 300, "Gamma"),
        ]);
        let index: WseiIndex = wsei.iter().copied().collect();
        let cfg = PipelineConfig::default().with_threads(1).with_tie_break(tie_break);
        SpeciesAssigner::new(&table, &index, &cfg)
    }

    fn summary(read: &str, tid: u32, identity: f64, length: u32, mismatch: u32) -> AlignmentSummary {
        AlignmentSummary {
            read_id: read.to_string(),
            identity,
            length,
            mismatch,
            gap: 0,
            quality: 30.0,
            mapq: 40,
            bin: 0,
            gid: 1,
            tid,
        }
    }

    #[test]
    fn species_index_takes_max_and_applies_threshold() {
        let a = assigner(&[(100, 0.2), (101, 0.6), (200, 0.15), (300, 0.1499)], TieBreak::default());
        assert_eq!(a.species_wsei("Alpha"), Some(0.6));
        assert_eq!(a.species_wsei("Beta"), Some(0.15));
        assert_eq!(a.species_wsei("Gamma"), None);
    }

    #[test]
    fn candidates_need_identity_and_an_even_species() {
        let a = assigner(&[(100, 0.5), (300, 0.01)], TieBreak::default());
        assert!(a.candidate(0, &summary("r", 100, 85.0, 100, 0)).is_some());
        assert!(a.candidate(0, &summary("r", 100, 84.99, 100, 0)).is_none());
        assert!(a.candidate(0, &summary("r", 300, 99.0, 100, 0)).is_none());
        assert!(a.candidate(0, &summary("r", 999, 99.0, 100, 0)).is_none());

        let c = a.candidate(7, &summary("r", 100, 90.0, 100, 0)).unwrap();
        assert_eq!(c.pivot.sites, vec![100]);
        assert_eq!(c.seq, 7);
    }

    #[test]
    fn more_matched_bases_wins() {
        let a = assigner(&[(100, 0.5), (200, 0.9)], TieBreak::default());
        let mut table = AssignmentTable::new();
        let strong = a.candidate(0, &summary("r", 100, 95.0, 100, 1)).unwrap();
        let weak = a.candidate(1, &summary("r", 200, 95.0, 100, 5)).unwrap();

        assert!(a.resolve(&mut table, "r".to_string(), strong));
        assert!(!a.resolve(&mut table, "r".to_string(), weak));
        assert_eq!(table["r"].pivot.tid, 100);
    }

    #[test]
    fn higher_species_wsei_breaks_equal_matches() {
        let a = assigner(&[(100, 0.5), (200, 0.9)], TieBreak::default());
        let mut table = AssignmentTable::new();
        let beta = a.candidate(0, &summary("r", 200, 95.0, 100, 2)).unwrap();
        let alpha = a.candidate(1, &summary("r", 100, 95.0, 100, 2)).unwrap();

        a.resolve(&mut table, "r".to_string(), beta);
        assert!(!a.resolve(&mut table, "r".to_string(), alpha));
        assert_eq!(table["r"].pivot.tid, 200);
    }

    #[test]
    fn exact_tie_goes_to_the_later_candidate() {
        // 100 and 101 share species Alpha, so both criteria tie.
        let a = assigner(&[(100, 0.5), (101, 0.5)], TieBreak::LastProcessed);
        let mut table = AssignmentTable::new();
        let first = a.candidate(0, &summary("r", 100, 95.0, 100, 2)).unwrap();
        let second = a.candidate(1, &summary("r", 101, 95.0, 100, 2)).unwrap();

        a.resolve(&mut table, "r".to_string(), first);
        assert!(a.resolve(&mut table, "r".to_string(), second));
        assert_eq!(table["r"].pivot.tid, 101);
    }

    #[test]
    fn last_in_file_replays_in_scan_order() {
        let a = assigner(&[(100, 0.5), (101, 0.5)], TieBreak::LastInFile);
        let mut state = AssignmentState::default();
        // arrive out of file order
        let later = a.candidate(9, &summary("r", 101, 95.0, 100, 2)).unwrap();
        let earlier = a.candidate(3, &summary("r", 100, 95.0, 100, 2)).unwrap();
        a.merge_candidate(&mut state, "r".to_string(), later);
        a.merge_candidate(&mut state, "r".to_string(), earlier);

        let settled = a.settle(state);
        assert_eq!(settled["r"].pivot.tid, 101);
        assert_eq!(settled["r"].seq, 9);
    }

    #[test]
    fn finalize_groups_by_species() {
        let a = assigner(&[(100, 0.5), (101, 0.7), (200, 0.9)], TieBreak::default());
        let mut table = AssignmentTable::new();
        for (i, (read, tid, identity)) in [("r1", 100, 90.0), ("r2", 101, 94.0), ("r3", 200, 99.0)]
            .into_iter()
            .enumerate()
        {
            let c = a.candidate(i as u64, &summary(read, tid, identity, 100, 1)).unwrap();
            a.resolve(&mut table, read.to_string(), c);
        }

        let (species, reads) = a.finalize(&table);
        assert_eq!(species.len(), 2);
        assert_eq!(species[0].species, "Alpha");
        assert_eq!(species[0].abundance, 2);
        assert!((species[0].means.identity - 92.0).abs() < 1e-9);
        assert_eq!(species[1].species, "Beta");
        assert_eq!(species[1].abundance, 1);

        assert_eq!(reads.iter().map(|r| r.read_id.as_str()).collect::<Vec<_>>(), ["r1", "r2", "r3"]);
        assert_eq!(reads[0].wsei, 0.7);
        assert_eq!(reads[2].species, "Beta");
    }
}
