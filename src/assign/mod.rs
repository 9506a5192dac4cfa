pub mod species;
pub mod strain;

pub use species::{AssignmentTable, ReadAssignment, SpeciesAssigner, SpeciesResult};
pub use strain::{StrainAggregator, StrainResult, WseiIndex};
