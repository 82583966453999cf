use crate::corpus::{Corpus, CorpusError};
use crate::input::Input;
use rand::Rng;
use rand_core::RngCore;
use thiserror::Error;

/// Errors that can occur during scheduler operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Indicates that the corpus is empty, and therefore no input can be scheduled.
    #[error("Corpus is empty, cannot schedule next input")]
    CorpusEmpty,
    /// Wraps an error originating from the corpus backend (e.g., I/O error)
    /// encountered during a scheduler operation.
    #[error("Corpus interaction failed within scheduler: {0}")]
    CorpusInteractionError(#[from] CorpusError),
}

/// A `Scheduler` picks the corpus entry the next guided iteration mutates.
pub trait Scheduler<I: Input>: Send + Sync {
    /// Selects and returns the ID of the next input to be processed from the corpus.
    ///
    /// # Returns
    /// The ID (index) of the selected input within the corpus, or
    /// [`SchedulerError::CorpusEmpty`] when there is nothing to select.
    fn next(
        &mut self,
        corpus: &mut dyn Corpus<I>,
        rng: &mut dyn RngCore,
    ) -> Result<usize, SchedulerError>;
}

/// Selects uniformly at random among the current corpus entries.
#[derive(Default, Debug)]
pub struct RandomScheduler;

impl RandomScheduler {
    pub fn new() -> Self {
        RandomScheduler
    }
}

impl<I: Input> Scheduler<I> for RandomScheduler {
    fn next(
        &mut self,
        corpus: &mut dyn Corpus<I>,
        rng: &mut dyn RngCore,
    ) -> Result<usize, SchedulerError> {
        if corpus.is_empty() {
            return Err(SchedulerError::CorpusEmpty);
        }
        let id = rng.random_range(0..corpus.len());
        // An on-disk corpus cannot hand out an entry whose file fails to load.
        if corpus.get(id).is_none() {
            return Err(CorpusError::InputNotFound(id).into());
        }
        Ok(id)
    }
}
