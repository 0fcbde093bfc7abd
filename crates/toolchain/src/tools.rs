//! Typed wrappers for the loop-tuning toolchain binaries.
//!
//! Each wrapper runs one collaborator command, captures its diagnostics,
//! and parses the file or stdout contract described in the tool's manifest
//! formats. The wrappers never interpret the code being rewritten.

use crate::artifact::TempArtifact;
use crate::command::{render, run_checked};
use crate::error::ToolError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Per-function basic-block count reported by `reorder-functions -list-functions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBlocks {
    pub function: String,
    pub block_count: usize,
}

/// One loop pulled out into its own module by the extractor.
#[derive(Debug, Clone)]
pub struct ExtractedLoop {
    /// Name of the function the loop was outlined into.
    pub extracted_func: String,
    /// Function the loop originally lived in.
    pub function: String,
    pub header_id: u32,
    pub module: PathBuf,
}

/// Output of the loop extractor: the rewritten main module first, then one
/// module per extracted loop.
#[derive(Debug, Clone)]
pub struct ExtractionManifest {
    pub main_module: PathBuf,
    pub loops: Vec<ExtractedLoop>,
}

/// Locator for the external toolchain installation.
#[derive(Debug, Clone)]
pub struct Toolchain {
    root: PathBuf,
}

impl Toolchain {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bin(&self, name: &str) -> PathBuf {
        self.root.join("bin").join(name)
    }

    /// Bitcode runtime object shipped under the toolchain's `obj/`
    /// directory (invocation logger, replay-server core).
    pub fn runtime(&self, name: &str) -> PathBuf {
        self.root.join("obj").join(name)
    }

    /// Apply an encoded edit sequence to `module`, producing a new module.
    /// The base module is never modified.
    pub fn reorder(&self, module: &Path, edit_args: &[String]) -> Result<TempArtifact, ToolError> {
        let out = TempArtifact::with_name("module.bc")?;
        let mut cmd = Command::new(self.bin("reorder-functions"));
        cmd.arg(module).arg("-o").arg(out.path()).args(edit_args);
        run_checked(&mut cmd)?;
        Ok(out)
    }

    /// Query per-function basic-block counts for `module`.
    ///
    /// The tool prints one line of comma-separated `function|count` pairs.
    pub fn list_functions(&self, module: &Path) -> Result<Vec<FunctionBlocks>, ToolError> {
        let mut cmd = Command::new(self.bin("reorder-functions"));
        cmd.arg("-list-functions").arg(module);
        let rendered = render(&cmd);
        let output = run_checked(&mut cmd)?;

        let line = output.stdout.lines().next().unwrap_or("");
        let mut functions = Vec::new();
        for pair in line.split(',').filter(|p| !p.trim().is_empty()) {
            let (function, count) = pair.split_once('|').ok_or_else(|| ToolError::Malformed {
                command: rendered.clone(),
                detail: format!("bad function entry {pair:?}"),
            })?;
            let block_count = count.trim().parse().map_err(|_| ToolError::Malformed {
                command: rendered.clone(),
                detail: format!("bad block count in {pair:?}"),
            })?;
            functions.push(FunctionBlocks {
                function: function.to_string(),
                block_count,
            });
        }
        Ok(functions)
    }

    /// Extract the given `(function, header_id)` loops from `module` into
    /// standalone modules, reading back the extraction manifest.
    pub fn extract_loops(
        &self,
        module: &Path,
        loops: &[(String, u32)],
        prefix: &str,
    ) -> Result<ExtractionManifest, ToolError> {
        let mut cmd = Command::new(self.bin("extract-loops"));
        cmd.arg(module).arg("-p").arg(prefix);
        for (function, header_id) in loops {
            cmd.arg(format!("-l{function},{header_id}"));
        }
        let rendered = render(&cmd);
        run_checked(&mut cmd)?;

        let manifest_path = format!("{prefix}.list");
        let manifest = fs::read_to_string(&manifest_path).map_err(|err| ToolError::Malformed {
            command: rendered.clone(),
            detail: format!("missing extraction manifest {manifest_path}: {err}"),
        })?;
        parse_extraction_manifest(&manifest, &rendered)
    }

    /// Instrument `function`'s entry in `module` so every invocation logs
    /// its elapsed time.
    pub fn instrument_invocations(
        &self,
        module: &Path,
        function: &str,
    ) -> Result<TempArtifact, ToolError> {
        let out = TempArtifact::with_name("instrumented.bc")?;
        let mut cmd = Command::new(self.bin("instrument-invos"));
        cmd.arg(module)
            .arg("-o")
            .arg(out.path())
            .arg(format!("-f{function}"));
        run_checked(&mut cmd)?;
        Ok(out)
    }

    /// Rewrite the main module into a replay server that records the given
    /// invocations of `function` and serves them to measurement workers.
    pub fn create_replay_server(
        &self,
        main_module: &Path,
        function: &str,
        invocations: &[u64],
    ) -> Result<TempArtifact, ToolError> {
        let out = TempArtifact::with_name("server.bc")?;
        let mut cmd = Command::new(self.bin("create-server"));
        cmd.arg(main_module).arg(format!("-f{function}"));
        for invocation in invocations {
            cmd.arg(format!("-inv{invocation}"));
        }
        cmd.arg("-o").arg(out.path());
        run_checked(&mut cmd)?;
        Ok(out)
    }

    /// Link several bitcode modules into one whole-program module.
    ///
    /// An extracted module is just a fragment; before it can be built into
    /// anything runnable it has to be rejoined with the other extraction
    /// outputs and whichever runtime the build needs.
    pub fn link_modules(&self, modules: &[PathBuf]) -> Result<TempArtifact, ToolError> {
        let out = TempArtifact::with_name("linked.bc")?;
        let mut cmd = Command::new("llvm-link");
        cmd.args(modules).arg("-o").arg(out.path());
        run_checked(&mut cmd)?;
        Ok(out)
    }

    /// Compile a module down to an object file.
    pub fn compile_module(&self, module: &Path) -> Result<TempArtifact, ToolError> {
        let obj = TempArtifact::with_name("module.o")?;
        let mut cmd = Command::new("llc");
        cmd.arg(module)
            .arg("-filetype=obj")
            .arg("-o")
            .arg(obj.path());
        run_checked(&mut cmd)?;
        Ok(obj)
    }

    /// Relocatable link of tuned objects into the final output object.
    pub fn link_objects(&self, objects: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        let mut cmd = Command::new("ld");
        cmd.arg("-r").args(objects).arg("-o").arg(output);
        run_checked(&mut cmd)?;
        Ok(())
    }
}

fn parse_extraction_manifest(
    manifest: &str,
    command: &str,
) -> Result<ExtractionManifest, ToolError> {
    let mut lines = manifest.lines();
    let main_module = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| ToolError::Malformed {
            command: command.to_string(),
            detail: "empty extraction manifest".to_string(),
        })?;

    let mut loops = Vec::new();
    for line in lines.filter(|line| !line.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [extracted_func, function, header_id, module] = fields[..] else {
            return Err(ToolError::Malformed {
                command: command.to_string(),
                detail: format!("bad manifest row {line:?}"),
            });
        };
        let header_id = header_id.parse().map_err(|_| ToolError::Malformed {
            command: command.to_string(),
            detail: format!("bad header id in {line:?}"),
        })?;
        loops.push(ExtractedLoop {
            extracted_func: extracted_func.to_string(),
            function: function.to_string(),
            header_id,
            module: PathBuf::from(module),
        });
    }

    Ok(ExtractionManifest {
        main_module: PathBuf::from(main_module.trim()),
        loops,
    })
}
