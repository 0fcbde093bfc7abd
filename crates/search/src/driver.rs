//! Batched simulated-annealing driver.
//!
//! Each round the driver derives one fresh mutation per worker from the
//! current transformation, measures the whole batch in parallel, then scans
//! the results in submission order and accepts at most one. Every scanned
//! candidate counts as one annealing step, so a batch that yields an early
//! acceptance cools less than one scanned to the end.

use crate::schedule::CoolingSchedule;
use anyhow::{Context, Result};
use looptune_transform::{ModuleState, Transform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// Knobs for one search run.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Total annealing steps to spend.
    pub iterations: usize,
    /// Candidates mutated and measured per batch.
    pub workers: usize,
    /// Fixed seed for reproducible mutation and acceptance draws.
    pub seed: Option<u64>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            workers: default_workers(),
            seed: None,
        }
    }
}

/// Half the available cores, leaving headroom for the measured workloads.
fn default_workers() -> usize {
    let cores = thread::available_parallelism().map_or(1, |n| n.get());
    (cores / 2).max(1)
}

/// Annealing state after a batch, also the progress-log payload.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SearchState {
    /// Cost of the currently accepted transformation, in seconds.
    pub cost: f64,
    /// Lowest cost seen so far.
    pub best_cost: f64,
    /// Cost of the untransformed module.
    pub init_cost: f64,
    pub temperature: f64,
    pub iteration: usize,
    /// How many candidates have been accepted so far.
    pub accepted: usize,
}

/// What a finished (or interrupted) search hands back.
pub struct SearchOutcome<T> {
    /// The lowest-cost transformation encountered.
    pub best: T,
    /// That transformation's materialized module.
    pub module: ModuleState,
    pub state: SearchState,
    /// True when the run stopped on an interrupt rather than exhausting
    /// its iteration budget.
    pub interrupted: bool,
}

/// Simulated-annealing search over a [`Transform`] implementation.
pub struct AnnealingSearch {
    params: SearchParams,
    schedule: CoolingSchedule,
    pool: rayon::ThreadPool,
    rng: StdRng,
    interrupt: Arc<AtomicBool>,
}

impl AnnealingSearch {
    pub fn new(params: SearchParams) -> Result<Self> {
        let schedule = CoolingSchedule::for_iterations(params.iterations);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.workers)
            .build()
            .context("building the measurement thread pool")?;
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            params,
            schedule,
            pool,
            rng,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops the search after the in-flight batch. Safe to set
    /// from a signal handler.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Share an externally owned interrupt flag, so one signal handler can
    /// stop every search in a longer pipeline.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// Run the search starting from `init`, usually the identity
    /// transformation over the baseline module.
    pub fn run<T>(mut self, init: T) -> Result<SearchOutcome<T>>
    where
        T: Transform + Clone + Sync,
    {
        let init_cost = init
            .evaluate()
            .context("measuring the untransformed module")?;
        let mut state = SearchState {
            cost: init_cost,
            best_cost: init_cost,
            init_cost,
            temperature: self.schedule.t_max,
            iteration: 0,
            accepted: 0,
        };
        info!(cost = state.cost, workers = self.params.workers, "search started");

        let mut current = init.clone();
        let mut best = init;
        let mut interrupted = false;

        while state.iteration < self.params.iterations {
            if self.interrupt.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }

            let mut batch = Vec::with_capacity(self.params.workers);
            for _ in 0..self.params.workers {
                batch.push(current.mutate(&mut self.rng)?);
            }
            let costs: Vec<Result<f64>> = self
                .pool
                .install(|| batch.par_iter().map(|candidate| candidate.evaluate()).collect());

            let (scanned, accepted) = scan_batch(
                &costs,
                state.cost,
                state.temperature,
                self.schedule.t_min,
                &mut self.rng,
            );

            if let Some((index, new_cost)) = accepted {
                let mut chosen = batch.swap_remove(index);
                chosen
                    .update_module()
                    .context("committing the accepted transformation")?;
                current = chosen;
                state.cost = new_cost;
                state.accepted += 1;
                if new_cost < state.best_cost {
                    state.best_cost = new_cost;
                    best = current.clone();
                }
            }

            state.temperature *= self.schedule.alpha.powi(scanned as i32);
            state.iteration += scanned;
            info!(
                cost = state.cost,
                best = state.best_cost,
                init = state.init_cost,
                iteration = state.iteration,
                temperature = state.temperature,
                accepted = accepted.is_some(),
                "annealing step"
            );
        }

        if interrupted {
            info!(iteration = state.iteration, "search interrupted");
        }
        let module = best.apply().context("materializing the best module")?;
        Ok(SearchOutcome {
            best,
            module,
            state,
            interrupted,
        })
    }
}

/// Scan measured costs in submission order and pick the first acceptable
/// candidate. A cost no worse than the current one is always taken; a
/// regression is taken with probability `exp(diff / t)` while the
/// temperature is above its floor, where `diff = cost / new_cost - 1` is
/// the negative normalized slowdown. Failed measurements are logged and
/// skipped but still count as scanned steps.
fn scan_batch(
    costs: &[Result<f64>],
    current_cost: f64,
    temperature: f64,
    t_min: f64,
    rng: &mut StdRng,
) -> (usize, Option<(usize, f64)>) {
    for (index, outcome) in costs.iter().enumerate() {
        let new_cost = match outcome {
            Ok(cost) => *cost,
            Err(err) => {
                warn!(candidate = index, error = %format!("{err:#}"), "measurement failed");
                continue;
            }
        };
        let diff = current_cost / new_cost - 1.0;
        let accept = new_cost <= current_cost
            || (temperature > t_min && rng.gen::<f64>() < (diff / temperature).exp());
        if accept {
            return (index + 1, Some((index, new_cost)));
        }
    }
    (costs.len(), None)
}
