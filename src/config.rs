//src/config.rs

use std::thread;

/// Minimum mean percent identity for a taxon to keep its WSEI.
pub const STRAIN_MIN_IDENTITY: f64 = 70.0;

/// Minimum species-level WSEI for a species to be reported.
pub const SPECIES_MIN_WSEI: f64 = 0.15;

/// Minimum percent identity for a read to take part in species assignment.
pub const READ_MIN_IDENTITY: f64 = 85.0;

/// What happens when two candidates for one read tie on both
/// (length - mismatches) and species WSEI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Whichever candidate reaches the assignment table last wins.
    /// With more than one worker this depends on scheduling.
    #[default]
    LastProcessed,
    /// The candidate appearing later in the input file wins, regardless of
    /// which worker handled it. Same result as a single worker.
    LastInFile,
}

/// Knobs shared by the strain and species passes.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub threads: usize,
    pub strain_min_identity: f64,
    pub species_min_wsei: f64,
    pub read_min_identity: f64,
    pub tie_break: TieBreak,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            strain_min_identity: STRAIN_MIN_IDENTITY,
            species_min_wsei: SPECIES_MIN_WSEI,
            read_min_identity: READ_MIN_IDENTITY,
            tie_break: TieBreak::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }
}

pub fn default_threads() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
