//! Concurrent simulated-annealing search over code-layout transformations.

pub mod driver;
pub mod schedule;

pub use driver::{AnnealingSearch, SearchOutcome, SearchParams, SearchState};
pub use schedule::CoolingSchedule;
