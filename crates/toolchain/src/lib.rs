//! Boundary to the external code-transformation toolchain.
//!
//! Every operation here shells out to an opaque collaborator (the loop
//! extractor, the reorder tool, the build makefile) that consumes and
//! produces files and signals failure through its exit status. Nothing in
//! this crate understands what the tools do to the code.

pub mod artifact;
pub mod command;
pub mod error;
pub mod job;
pub mod measure;
pub mod tools;

pub use artifact::TempArtifact;
pub use error::ToolError;
pub use job::BuildJob;
pub use measure::{DirectMeasure, Measure};
pub use tools::{ExtractedLoop, ExtractionManifest, FunctionBlocks, Toolchain};
