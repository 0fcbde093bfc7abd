//! CLI wiring for the looptune binary.

use crate::pipeline::{run_tune, TuneConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use looptune_profile::SelectionBand;
use looptune_search::SearchParams;
use looptune_worker::{protocol, WorkerRegistry};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "looptune", about = "profile-guided code-layout autotuner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tune a bitcode module's code layout against its loop profile.
    Tune {
        /// Bitcode module to tune.
        input: PathBuf,
        /// Root of the tuning toolchain installation.
        #[arg(long, default_value = ".")]
        toolchain_path: PathBuf,
        #[arg(long, default_value = "loop-prof.flat.csv")]
        flat_profile: PathBuf,
        #[arg(long, default_value = "loop-prof.graph.csv")]
        graph_profile: PathBuf,
        /// Makefile that links an object into an executable and runs it.
        #[arg(long, default_value = "provided.mak")]
        makefile: PathBuf,
        #[arg(long, default_value = "run")]
        run_rule: String,
        #[arg(long, default_value = "OBJ")]
        obj_var: String,
        #[arg(long, default_value_t = 100)]
        iterations: usize,
        /// Candidates measured per search batch; defaults to half the cores.
        #[arg(long)]
        workers: Option<usize>,
        /// Relative-time band a loop must fall in to be tuned, in percent.
        #[arg(long, default_value_t = 10.0)]
        lower: f64,
        #[arg(long, default_value_t = 60.0)]
        upper: f64,
        /// Fixed seed for a reproducible search.
        #[arg(long)]
        seed: Option<u64>,
        /// Measure candidates by relinking and rerunning the whole program
        /// instead of asking replay workers.
        #[arg(long, default_value_t = false)]
        direct: bool,
        #[arg(long, default_value = "worker-data.txt")]
        worker_manifest: PathBuf,
        /// Final linked object; defaults to the input with a `.tuned.o` suffix.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Send one request to a measurement worker.
    Worker {
        /// Function the worker serves.
        function: String,
        /// Candidate shared library to measure.
        #[arg(short = 'l', long)]
        library: Option<PathBuf>,
        /// Terminate the worker instead of measuring.
        #[arg(short = 'k', long, default_value_t = false)]
        kill: bool,
        #[arg(short = 'w', long, default_value = "worker-data.txt")]
        worker_manifest: PathBuf,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match cli.command {
        Command::Tune {
            input,
            toolchain_path,
            flat_profile,
            graph_profile,
            makefile,
            run_rule,
            obj_var,
            iterations,
            workers,
            lower,
            upper,
            seed,
            direct,
            worker_manifest,
            output,
        } => {
            let mut search = SearchParams {
                iterations,
                seed,
                ..SearchParams::default()
            };
            if let Some(workers) = workers {
                search.workers = workers;
            }
            run_tune(TuneConfig {
                input,
                toolchain_path,
                flat_profile,
                graph_profile,
                makefile,
                run_rule,
                obj_var,
                band: SelectionBand { lower, upper },
                search,
                direct,
                worker_manifest,
                output,
            })
        }
        Command::Worker {
            function,
            library,
            kill,
            worker_manifest,
        } => worker_request(&function, library, kill, &worker_manifest),
    }
}

fn worker_request(
    function: &str,
    library: Option<PathBuf>,
    kill: bool,
    manifest: &Path,
) -> Result<()> {
    let registry = WorkerRegistry::load(manifest)?;
    let socket = registry.lookup(function)?;

    if kill {
        protocol::kill_worker(socket)?;
        return Ok(());
    }

    let library = library.context("a library path is required unless --kill is given")?;
    // the worker resolves the path in its own working directory
    let library = std::env::current_dir()?.join(library);
    let elapsed = protocol::run_candidate(socket, &library)?;
    println!("{elapsed}");
    Ok(())
}
