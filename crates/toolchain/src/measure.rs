//! Cost measurement seam.

use crate::job::BuildJob;
use crate::tools::Toolchain;
use std::path::{Path, PathBuf};

/// Measures the execution cost of a transformed module, in seconds.
///
/// Implementations block; the search driver gets concurrency by measuring
/// candidates from multiple threads, not from the measurer itself.
pub trait Measure: Send + Sync {
    fn measure(&self, module: &Path) -> anyhow::Result<f64>;
}

/// Compile, link and run the whole program, timing the run rule.
///
/// When the candidate is an extracted fragment, the companion modules
/// holding the rest of the program are linked in first, so the makefile
/// always receives one self-contained object.
pub struct DirectMeasure {
    toolchain: Toolchain,
    job: BuildJob,
    companions: Vec<PathBuf>,
}

impl DirectMeasure {
    pub fn new(toolchain: Toolchain, job: BuildJob) -> Self {
        Self {
            toolchain,
            job,
            companions: Vec::new(),
        }
    }

    /// Modules linked alongside every candidate before building.
    pub fn with_companions(mut self, companions: Vec<PathBuf>) -> Self {
        self.companions = companions;
        self
    }

    fn link_inputs(&self, module: &Path) -> Vec<PathBuf> {
        let mut inputs = Vec::with_capacity(self.companions.len() + 1);
        inputs.push(module.to_path_buf());
        inputs.extend(self.companions.iter().cloned());
        inputs
    }
}

impl Measure for DirectMeasure {
    fn measure(&self, module: &Path) -> anyhow::Result<f64> {
        let whole_program = if self.companions.is_empty() {
            None
        } else {
            Some(self.toolchain.link_modules(&self.link_inputs(module))?)
        };
        let target = whole_program.as_ref().map(|a| a.path()).unwrap_or(module);

        let obj = self.toolchain.compile_module(target)?;
        let exe = self.job.link_executable(obj.path())?;
        let elapsed = self.job.run_executable(exe.path())?;
        Ok(elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_is_linked_ahead_of_companions() {
        let measure = DirectMeasure::new(
            Toolchain::new("/opt/tuner"),
            BuildJob::new("/project/build.mak"),
        )
        .with_companions(vec![
            PathBuf::from("/work/extracted.main.bc"),
            PathBuf::from("/work/extracted.1.bc"),
        ]);

        let inputs = measure.link_inputs(Path::new("/tmp/candidate.bc"));
        assert_eq!(
            inputs,
            [
                PathBuf::from("/tmp/candidate.bc"),
                PathBuf::from("/work/extracted.main.bc"),
                PathBuf::from("/work/extracted.1.bc"),
            ]
        );
    }

    #[test]
    fn test_lone_module_needs_no_link_inputs() {
        let measure = DirectMeasure::new(
            Toolchain::new("/opt/tuner"),
            BuildJob::new("/project/build.mak"),
        );
        let inputs = measure.link_inputs(Path::new("/tmp/candidate.bc"));
        assert_eq!(inputs, [PathBuf::from("/tmp/candidate.bc")]);
    }
}
