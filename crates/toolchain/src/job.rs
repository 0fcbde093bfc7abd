//! Makefile-driven build jobs.
//!
//! The user supplies a makefile that knows how to link an object file into
//! a runnable artifact and how to run it; variable and rule names are
//! configurable so existing build files can be reused untouched.

use crate::artifact::TempArtifact;
use crate::command::{lex_command, render, run_checked};
use crate::error::ToolError;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BuildJob {
    pub makefile: PathBuf,
    /// Variable holding the object file being linked.
    pub obj_var: String,
    /// Variable holding the executable being produced.
    pub exe_var: String,
    /// Variable holding the shared library being produced.
    pub lib_var: String,
    /// Rule that runs the built executable.
    pub run_rule: String,
}

impl BuildJob {
    pub fn new(makefile: impl Into<PathBuf>) -> Self {
        Self {
            makefile: makefile.into(),
            obj_var: "OBJ".to_string(),
            exe_var: "EXE".to_string(),
            lib_var: "LIB".to_string(),
            run_rule: "run".to_string(),
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("make");
        let mut flag = OsString::from("-f");
        flag.push(&self.makefile);
        cmd.arg(flag);
        cmd
    }

    /// Run `make` against a single goal with variable assignments. The
    /// goal may be a target file or a plain rule name.
    pub fn make(
        &self,
        goal: impl AsRef<OsStr>,
        assignments: &[(&str, &Path)],
    ) -> Result<(), ToolError> {
        let mut cmd = self.base_command();
        for (var, value) in assignments {
            let mut assignment = OsString::from(*var);
            assignment.push("=");
            assignment.push(value);
            cmd.arg(assignment);
        }
        cmd.arg(goal.as_ref());
        run_checked(&mut cmd)?;
        Ok(())
    }

    /// Link an object file into a scratch executable.
    pub fn link_executable(&self, obj: &Path) -> Result<TempArtifact, ToolError> {
        let exe = TempArtifact::with_name("exe")?;
        self.make(
            exe.path(),
            &[(&self.obj_var, obj), (&self.exe_var, exe.path())],
        )?;
        Ok(exe)
    }

    /// Link an object file into a scratch shared library (replay-server
    /// measurement path).
    pub fn shared_library(&self, obj: &Path) -> Result<TempArtifact, ToolError> {
        let lib = TempArtifact::with_name("candidate.so")?;
        self.make(
            lib.path(),
            &[(&self.obj_var, obj), (&self.lib_var, lib.path())],
        )?;
        Ok(lib)
    }

    /// Run the executable through the makefile's run rule and time it.
    ///
    /// The recipe is extracted with `--just-print` and executed directly so
    /// the measurement excludes make's own overhead.
    pub fn run_executable(&self, exe: &Path) -> Result<Duration, ToolError> {
        let printed = {
            let mut cmd = self.base_command();
            let mut assignment = OsString::from(self.exe_var.as_str());
            assignment.push("=");
            assignment.push(exe);
            cmd.arg("--just-print").arg(&self.run_rule).arg(assignment);
            run_checked(&mut cmd)?
        };

        let recipe = printed.stdout.trim();
        let mut cmd = lex_command(recipe).ok_or_else(|| ToolError::Malformed {
            command: format!("make -f{} {}", self.makefile.display(), self.run_rule),
            detail: "run rule printed no command".to_string(),
        })?;
        tracing::debug!(command = %render(&cmd), "timing run command");
        let output = run_checked(&mut cmd)?;
        Ok(output.elapsed)
    }
}
