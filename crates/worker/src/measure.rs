//! Worker-backed cost measurement.

use crate::protocol;
use crate::registry::{RegistryError, WorkerRegistry};
use anyhow::Result;
use looptune_toolchain::{BuildJob, Measure, Toolchain};
use std::path::Path;

/// Build the candidate module into a shared library and ask the function's
/// replay worker to measure it.
pub struct WorkerMeasure {
    toolchain: Toolchain,
    job: BuildJob,
    registry: WorkerRegistry,
    function: String,
}

impl WorkerMeasure {
    /// Fails up front if no worker serves `function`.
    pub fn new(
        toolchain: Toolchain,
        job: BuildJob,
        registry: WorkerRegistry,
        function: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let function = function.into();
        registry.lookup(&function)?;
        Ok(Self {
            toolchain,
            job,
            registry,
            function,
        })
    }
}

impl Measure for WorkerMeasure {
    fn measure(&self, module: &Path) -> Result<f64> {
        let socket = self.registry.lookup(&self.function)?;
        let obj = self.toolchain.compile_module(module)?;
        let lib = self.job.shared_library(obj.path())?;
        let elapsed = protocol::run_candidate(socket, lib.path())?;
        tracing::debug!(
            function = %self.function,
            elapsed,
            "worker measured candidate"
        );
        Ok(elapsed as f64)
    }
}
