//! Loop-nesting profile graph and tuning-candidate selection.

pub mod graph;
pub mod selector;

pub use graph::{Loop, LoopGraph, LoopId};
pub use selector::{select_candidates, topological_order, SelectionBand};
