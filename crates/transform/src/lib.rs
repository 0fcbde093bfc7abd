//! Composable code-layout transformations.
//!
//! A transformation is an ordered edit log relative to a base module;
//! mutation appends edits, application hands the whole log to the external
//! reorder tool in one call, and an accepted transformation can fold its
//! edits into a fresh base so long searches never replay a growing log.

pub mod edit;
pub mod info;
pub mod module;
pub mod reorder;

pub use edit::CodeLayoutEdit;
pub use info::{ModuleInfo, ModuleInfoCache};
pub use module::ModuleState;
pub use reorder::{MutationRates, Reordering, Transform};
