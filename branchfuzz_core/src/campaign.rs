//! The fuzzing campaign driver.
//!
//! A [`Campaign`] owns everything one fuzzing run mutates: the executor, the
//! mutator, the corpus, the coverage tracker and the random source. Nothing is
//! shared between campaigns, so independent campaigns can run on separate
//! threads.

use crate::corpus::{Corpus, CorpusError, InMemoryCorpus};
use crate::coverage::{CoverageMap, CoverageTracker};
use crate::executor::{ExecutionStatus, Executor};
use crate::feedback::{Feedback, FeedbackError, NewBranchFeedback};
use crate::input::Input;
use crate::mutator::Mutator;
use crate::scheduler::{RandomScheduler, Scheduler, SchedulerError};
use log::{debug, info, trace};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// How a campaign produces candidates and what it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FuzzPolicy {
    /// Every iteration synthesizes a fresh input. The corpus is never read or grown.
    PureRandom,
    /// Every iteration mutates a corpus entry and keeps the result if it
    /// reached a branch the campaign had not covered before.
    CoverageGuided,
}

impl fmt::Display for FuzzPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuzzPolicy::PureRandom => f.write_str("pure-random"),
            FuzzPolicy::CoverageGuided => f.write_str("coverage-guided"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignState {
    Idle,
    Running,
    Completed,
}

/// Failures of the engine itself. Target misbehaviour never ends up here.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Iteration count must be at least 1, got {0}")]
    InvalidIterations(u64),
    #[error("Coverage-guided campaign needs at least one seed, but the corpus is empty")]
    EmptyCorpus,
    #[error("Campaign cannot be started from state {0:?}")]
    InvalidState(CampaignState),
    #[error("Corpus operation failed: {0}")]
    Corpus(#[from] CorpusError),
    #[error("Scheduling failed: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Feedback failed: {0}")]
    Feedback(#[from] FeedbackError),
}

/// Execution outcome counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub executions: u64,
    pub completed: u64,
    pub runtime_errors: u64,
    pub timeouts: u64,
    pub crashes: u64,
    pub corpus_additions: u64,
}

impl CampaignStats {
    fn record(&mut self, status: &ExecutionStatus) {
        self.executions += 1;
        match status {
            ExecutionStatus::Completed => self.completed += 1,
            ExecutionStatus::RuntimeError(_) => self.runtime_errors += 1,
            ExecutionStatus::Timeout => self.timeouts += 1,
            ExecutionStatus::Crash(_) => self.crashes += 1,
        }
    }
}

/// Everything a finished campaign hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignReport {
    pub policy: FuzzPolicy,
    /// Final persistent coverage map.
    pub coverage: CoverageMap,
    /// Coverage size after each completed iteration.
    pub history: Vec<usize>,
    /// Corpus size after each completed iteration.
    pub corpus_sizes: Vec<usize>,
    pub stats: CampaignStats,
    /// The stop flag ended the campaign before all iterations ran.
    pub cancelled: bool,
}

impl CampaignReport {
    pub fn final_coverage(&self) -> usize {
        self.coverage.len()
    }

    /// The last `n` history values, oldest first.
    pub fn history_tail(&self, n: usize) -> &[usize] {
        &self.history[self.history.len().saturating_sub(n)..]
    }
}

struct LoopOutcome {
    history: Vec<usize>,
    corpus_sizes: Vec<usize>,
    stats: CampaignStats,
    cancelled: bool,
}

/// One fuzzing campaign. Runs exactly once: Idle -> Running -> Completed.
pub struct Campaign<I, E, M>
where
    I: Input,
{
    executor: E,
    mutator: M,
    corpus: Box<dyn Corpus<I>>,
    scheduler: Box<dyn Scheduler<I>>,
    feedback: Box<dyn Feedback<I>>,
    tracker: CoverageTracker,
    rng: ChaCha8Rng,
    state: CampaignState,
    stop: Arc<AtomicBool>,
}

impl<I, E, M> Campaign<I, E, M>
where
    I: Input,
    E: Executor<I>,
    M: Mutator<I, ChaCha8Rng>,
{
    /// A campaign with uniform seed selection and new-branch feedback.
    pub fn new(executor: E, mutator: M, corpus: Box<dyn Corpus<I>>, rng_seed: u64) -> Self {
        Self {
            executor,
            mutator,
            corpus,
            scheduler: Box::new(RandomScheduler::new()),
            feedback: Box::new(NewBranchFeedback::new()),
            tracker: CoverageTracker::new(),
            rng: ChaCha8Rng::seed_from_u64(rng_seed),
            state: CampaignState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler<I>>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_feedback(mut self, feedback: Box<dyn Feedback<I>>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn state(&self) -> CampaignState {
        self.state
    }

    /// Setting the returned flag stops the campaign after the iteration in flight.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn corpus(&self) -> &dyn Corpus<I> {
        self.corpus.as_ref()
    }

    pub fn corpus_mut(&mut self) -> &mut dyn Corpus<I> {
        self.corpus.as_mut()
    }

    pub fn coverage(&self) -> &CoverageMap {
        self.tracker.map()
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs `iterations` iterations under `policy`.
    ///
    /// Fails without running anything if the campaign already ran, if
    /// `iterations` is zero, or if a guided campaign has no seeds.
    pub fn run(&mut self, iterations: u64, policy: FuzzPolicy) -> Result<CampaignReport, EngineError> {
        if self.state != CampaignState::Idle {
            return Err(EngineError::InvalidState(self.state));
        }
        if iterations == 0 {
            return Err(EngineError::InvalidIterations(iterations));
        }
        if policy == FuzzPolicy::CoverageGuided && self.corpus.is_empty() {
            return Err(EngineError::EmptyCorpus);
        }

        info!(
            "Starting {policy} campaign: {iterations} iterations, {} corpus entries",
            self.corpus.len()
        );
        self.state = CampaignState::Running;
        let outcome = self.run_loop(iterations, policy);
        self.state = CampaignState::Completed;
        let outcome = outcome?;

        info!(
            "{policy} campaign finished after {} executions: {} branches covered, corpus size {}{}",
            outcome.stats.executions,
            self.tracker.snapshot(),
            self.corpus.len(),
            if outcome.cancelled { " (cancelled)" } else { "" }
        );
        Ok(CampaignReport {
            policy,
            coverage: self.tracker.map().clone(),
            history: outcome.history,
            corpus_sizes: outcome.corpus_sizes,
            stats: outcome.stats,
            cancelled: outcome.cancelled,
        })
    }

    fn run_loop(&mut self, iterations: u64, policy: FuzzPolicy) -> Result<LoopOutcome, EngineError> {
        let mut outcome = LoopOutcome {
            history: Vec::new(),
            corpus_sizes: Vec::new(),
            stats: CampaignStats::default(),
            cancelled: false,
        };
        let progress_every = (iterations / 10).max(1);

        for iteration in 0..iterations {
            if self.stop.load(Ordering::Relaxed) {
                info!("Stop requested, ending campaign after {iteration} iterations");
                outcome.cancelled = true;
                break;
            }

            let candidate = match policy {
                FuzzPolicy::PureRandom => self.mutator.mutate(None, &mut self.rng),
                FuzzPolicy::CoverageGuided => {
                    let id = self.scheduler.next(self.corpus.as_mut(), &mut self.rng)?;
                    let (seed, _) = self
                        .corpus
                        .get(id)
                        .ok_or(CorpusError::InputNotFound(id))?;
                    self.mutator.mutate(Some(seed), &mut self.rng)
                }
            };

            let mut scope = self.tracker.fresh_scope();
            let status = self.executor.execute_sync(&candidate, &mut scope);
            outcome.stats.record(&status);
            trace!(
                "Iteration {iteration}: {status:?}, {} branch(es) recorded",
                scope.len()
            );

            if policy == FuzzPolicy::CoverageGuided {
                let novel = self
                    .feedback
                    .is_interesting(&candidate, &scope, self.tracker.map());
                if !novel.is_empty() {
                    self.feedback
                        .report_interesting(candidate, iteration, &novel, self.corpus.as_mut())?;
                    outcome.stats.corpus_additions += 1;
                }
            }

            self.tracker.merge(&scope);
            outcome.history.push(self.tracker.snapshot());
            outcome.corpus_sizes.push(self.corpus.len());

            if (iteration + 1) % progress_every == 0 {
                debug!(
                    "Iteration {}/{}: coverage {}, corpus {}",
                    iteration + 1,
                    iterations,
                    self.tracker.snapshot(),
                    self.corpus.len()
                );
            }
        }
        Ok(outcome)
    }
}

/// Runs one campaign over an in-memory corpus built from `seed_corpus`.
pub fn run_campaign<I, E, M>(
    executor: E,
    mutator: M,
    policy: FuzzPolicy,
    iterations: u64,
    seed_corpus: Vec<I>,
    rng_seed: u64,
) -> Result<CampaignReport, EngineError>
where
    I: Input,
    E: Executor<I>,
    M: Mutator<I, ChaCha8Rng>,
{
    let corpus = InMemoryCorpus::from_seeds(seed_corpus);
    Campaign::new(executor, mutator, Box::new(corpus), rng_seed).run(iterations, policy)
}
