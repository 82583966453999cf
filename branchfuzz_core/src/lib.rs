pub mod campaign;
pub mod config;
pub mod corpus;
pub mod coverage;
pub mod executor;
pub mod feedback;
pub mod input;
pub mod mutator;
pub mod scheduler;
pub mod target;

pub use campaign::{
    Campaign, CampaignReport, CampaignState, CampaignStats, EngineError, FuzzPolicy, run_campaign,
};
pub use config::BranchfuzzConfig;
pub use corpus::{Corpus, CorpusEntryMetadata, CorpusError, InMemoryCorpus, OnDiskCorpus};
pub use coverage::{BranchId, CoverageMap, CoverageTracker};
pub use executor::{ExecutionStatus, Executor, InProcessExecutor};
pub use feedback::{Feedback, FeedbackError, NewBranchFeedback};
pub use input::{EditableInput, Input};
pub use mutator::{
    EditKind, EditMutator, ExpressionMutator, Generator, Mutator, MutatorError, UniformGenerator,
};
pub use scheduler::{RandomScheduler, Scheduler, SchedulerError};
pub use target::{ExecContext, Target, TargetError};
