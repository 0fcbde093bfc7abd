//! End-to-end tuning pipeline.
//!
//! Selects candidate loops from the profile, extracts each into its own
//! module, stands up a replay worker per loop, runs the layout search, and
//! links the tuned modules into the final object.

use anyhow::{ensure, Context, Result};
use looptune_cluster::{cluster_invocations, parse_invocation_samples};
use looptune_profile::{select_candidates, LoopGraph, SelectionBand};
use looptune_search::{AnnealingSearch, SearchParams};
use looptune_toolchain::{
    BuildJob, DirectMeasure, ExtractedLoop, ExtractionManifest, Measure, Toolchain,
};
use looptune_transform::{ModuleInfoCache, ModuleState, Reordering};
use looptune_worker::{protocol, WorkerMeasure, WorkerRegistry};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Where the instrumented profiling run dumps per-invocation timings.
const INVOCATIONS_FILE: &str = "invocations.txt";
/// Weight file read by the replay server, one weight per invocation line.
const WEIGHT_FILE: &str = "worker-weight.txt";
/// Filename prefix the loop extractor writes its modules under.
const EXTRACTION_PREFIX: &str = "extracted";
/// Toolchain runtime that logs per-invocation elapsed times.
const INVOS_RUNTIME: &str = "invos.bc";
/// Toolchain runtime implementing the replay-server core.
const SERVER_RUNTIME: &str = "server.bc";

#[derive(Debug, Clone)]
pub struct TuneConfig {
    pub input: PathBuf,
    pub toolchain_path: PathBuf,
    pub flat_profile: PathBuf,
    pub graph_profile: PathBuf,
    pub makefile: PathBuf,
    pub run_rule: String,
    pub obj_var: String,
    pub band: SelectionBand,
    pub search: SearchParams,
    pub direct: bool,
    pub worker_manifest: PathBuf,
    pub output: Option<PathBuf>,
}

/// Per-loop entry of the final tuning report.
#[derive(Debug, Serialize)]
struct LoopReport {
    function: String,
    header_id: u32,
    extracted_func: String,
    module: String,
    init_cost: f64,
    best_cost: f64,
    final_cost: f64,
    iterations: usize,
    accepted: usize,
}

#[derive(Debug, Serialize)]
struct TuningReport {
    input: String,
    output: String,
    loops: Vec<LoopReport>,
}

pub fn run_tune(config: TuneConfig) -> Result<()> {
    let toolchain = Arc::new(Toolchain::new(&config.toolchain_path));
    let mut job = BuildJob::new(&config.makefile);
    job.obj_var = config.obj_var.clone();
    job.run_rule = config.run_rule.clone();

    let graph = LoopGraph::from_files(&config.flat_profile, &config.graph_profile)?;
    let candidates = select_candidates(&graph, config.band);
    ensure!(
        !candidates.is_empty(),
        "no loop falls inside the tuning band [{}, {}]",
        config.band.lower,
        config.band.upper
    );

    let loops: Vec<(String, u32)> = candidates
        .iter()
        .map(|l| (l.function.clone(), l.header_id))
        .collect();
    let extraction = toolchain.extract_loops(&config.input, &loops, EXTRACTION_PREFIX)?;
    info!(
        modules = extraction.loops.len(),
        main = %extraction.main_module.display(),
        "extracted candidate loops"
    );

    let interrupt = install_interrupt_handler()?;
    let mut rng = match config.search.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut reports = Vec::new();
    let mut tuned: Vec<ModuleState> = Vec::new();
    let mut interrupted = false;

    for extracted in &extraction.loops {
        if interrupt.load(Ordering::SeqCst) {
            interrupted = true;
            break;
        }
        info!(
            function = %extracted.extracted_func,
            module = %extracted.module.display(),
            "tuning extracted loop"
        );

        let (measurer, worker_socket): (Arc<dyn Measure>, Option<PathBuf>) = if config.direct {
            let direct = DirectMeasure::new((*toolchain).clone(), job.clone())
                .with_companions(companion_modules(&extraction, &extracted.module));
            (Arc::new(direct), None)
        } else {
            let registry =
                spawn_replay_workers(&toolchain, &job, &config, &extraction, extracted, &mut rng)?;
            let socket = registry.lookup(&extracted.extracted_func)?.to_path_buf();
            let measure = WorkerMeasure::new(
                (*toolchain).clone(),
                job.clone(),
                registry,
                &extracted.extracted_func,
            )?;
            (Arc::new(measure), Some(socket))
        };

        let init = Reordering::new(
            ModuleState::external(&extracted.module),
            Arc::clone(&toolchain),
            Arc::new(ModuleInfoCache::new()),
            measurer,
        );
        let search =
            AnnealingSearch::new(config.search.clone())?.with_interrupt(Arc::clone(&interrupt));
        let outcome = search.run(init)?;

        if let Some(socket) = worker_socket {
            if let Err(err) = protocol::kill_worker(&socket) {
                warn!(socket = %socket.display(), error = %err, "could not stop replay worker");
            }
        }

        info!(
            function = %extracted.extracted_func,
            init = outcome.state.init_cost,
            best = outcome.state.best_cost,
            "finished tuning loop"
        );
        reports.push(LoopReport {
            function: extracted.function.clone(),
            header_id: extracted.header_id,
            extracted_func: extracted.extracted_func.clone(),
            module: extracted.module.display().to_string(),
            init_cost: outcome.state.init_cost,
            best_cost: outcome.state.best_cost,
            final_cost: outcome.state.cost,
            iterations: outcome.state.iteration,
            accepted: outcome.state.accepted,
        });
        tuned.push(outcome.module);

        if outcome.interrupted {
            interrupted = true;
            break;
        }
    }

    if interrupted {
        warn!("tuning interrupted; skipping the final link");
        return Ok(());
    }

    let output = config
        .output
        .unwrap_or_else(|| config.input.with_extension("tuned.o"));
    link_tuned_modules(&toolchain, &extraction, &tuned, &output)?;
    info!(output = %output.display(), "linked tuned object");

    let report = TuningReport {
        input: config.input.display().to_string(),
        output: output.display().to_string(),
        loops: reports,
    };
    let report_path = output.with_extension("report.json");
    fs::write(&report_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("writing tuning report {}", report_path.display()))?;
    info!(report = %report_path.display(), "wrote tuning report");
    Ok(())
}

/// Second profiling pass plus worker setup for one extracted loop: record
/// per-invocation timings, cluster them down to weighted representatives,
/// rewrite the main module into a replay server for those invocations, and
/// launch it through the user's run rule. The server forks its workers and
/// writes the worker manifest before returning.
fn spawn_replay_workers(
    toolchain: &Toolchain,
    job: &BuildJob,
    config: &TuneConfig,
    extraction: &ExtractionManifest,
    extracted: &ExtractedLoop,
    rng: &mut StdRng,
) -> Result<WorkerRegistry> {
    let instrumented =
        toolchain.instrument_invocations(&extracted.module, &extracted.extracted_func)?;
    // the instrumented fragment needs the rest of the program and the
    // invocation-logging runtime before it can run
    let mut modules = vec![instrumented.path().to_path_buf()];
    modules.extend(companion_modules(extraction, &extracted.module));
    modules.push(toolchain.runtime(INVOS_RUNTIME));
    let linked = toolchain.link_modules(&modules)?;
    let obj = toolchain.compile_module(linked.path())?;
    let exe = job.link_executable(obj.path())?;
    job.run_executable(exe.path())
        .context("running the instrumented profiling pass")?;

    let samples = parse_invocation_samples(
        &fs::read_to_string(INVOCATIONS_FILE)
            .with_context(|| format!("reading {INVOCATIONS_FILE}"))?,
    )?;
    let representatives = cluster_invocations(&samples, rng);
    ensure!(
        !representatives.members.is_empty(),
        "no invocation cluster found for {}",
        extracted.extracted_func
    );
    info!(
        invocations = samples.len(),
        representatives = representatives.members.len(),
        "clustered invocation timings"
    );

    let weights: String = representatives
        .members
        .iter()
        .map(|r| format!("{}\n", r.weight))
        .collect();
    fs::write(WEIGHT_FILE, weights).with_context(|| format!("writing {WEIGHT_FILE}"))?;

    let server = toolchain.create_replay_server(
        &extraction.main_module,
        &extracted.extracted_func,
        &representatives.invocations(),
    )?;
    // the server bitcode stands in for the main module; the loop modules
    // and the server runtime complete the program
    let mut server_modules = vec![server.path().to_path_buf()];
    server_modules.extend(companion_modules(extraction, &extraction.main_module));
    server_modules.push(toolchain.runtime(SERVER_RUNTIME));
    let server_linked = toolchain.link_modules(&server_modules)?;
    let server_obj = toolchain.compile_module(server_linked.path())?;
    let server_exe = job.link_executable(server_obj.path())?;
    job.make(&job.run_rule, &[(job.exe_var.as_str(), server_exe.path())])
        .context("launching the replay server")?;

    let registry = WorkerRegistry::load(&config.worker_manifest)?;
    ensure!(
        !registry.is_empty(),
        "replay server wrote an empty worker manifest {}",
        config.worker_manifest.display()
    );
    Ok(registry)
}

/// Every extraction output except `replaced`, whose role the caller's
/// rewritten module takes over. Instrumented and candidate fragments are
/// completed with these before any whole-program build.
fn companion_modules(extraction: &ExtractionManifest, replaced: &Path) -> Vec<PathBuf> {
    let mut modules = Vec::new();
    if extraction.main_module != replaced {
        modules.push(extraction.main_module.clone());
    }
    for l in &extraction.loops {
        if l.module != replaced {
            modules.push(l.module.clone());
        }
    }
    modules
}

/// Compile the rewritten main module and every tuned loop module, then
/// relocatably link them into `output`.
fn link_tuned_modules(
    toolchain: &Toolchain,
    extraction: &ExtractionManifest,
    tuned: &[ModuleState],
    output: &Path,
) -> Result<()> {
    let mut objects = vec![toolchain.compile_module(&extraction.main_module)?];
    for module in tuned {
        objects.push(toolchain.compile_module(module.path())?);
    }
    let paths: Vec<PathBuf> = objects.iter().map(|o| o.path().to_path_buf()).collect();
    toolchain.link_objects(&paths, output)?;
    Ok(())
}

/// First interrupt asks the pipeline to wind down after the in-flight
/// batch; a second one terminates immediately.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if seen.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("interrupt received; finishing the in-flight measurements");
    })
    .context("installing the interrupt handler")?;
    Ok(flag)
}
