use crate::corpus::{Corpus, CorpusEntryMetadata};
use crate::coverage::{BranchId, CoverageMap};
use crate::input::Input;
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Corpus operation failed within feedback: {0}")]
    CorpusInteractionError(#[from] crate::corpus::CorpusError),
}

/// Decides whether an executed input is worth keeping.
pub trait Feedback<I: Input>: Send + Sync {
    fn name(&self) -> &'static str;

    /// The branches that make `input` interesting; empty means not interesting.
    ///
    /// `scope` is what this execution recorded, `persistent` is the campaign
    /// map before this execution is merged into it.
    fn is_interesting(
        &mut self,
        input: &I,
        scope: &CoverageMap,
        persistent: &CoverageMap,
    ) -> Vec<BranchId>;

    /// Stores an interesting input. Returns its corpus ID.
    fn report_interesting(
        &mut self,
        input: I,
        iteration: u64,
        novel: &[BranchId],
        corpus: &mut dyn Corpus<I>,
    ) -> Result<usize, FeedbackError>;
}

/// Keeps every input that reaches a branch the campaign has not seen yet.
#[derive(Debug, Default)]
pub struct NewBranchFeedback {
    kept: usize,
}

impl NewBranchFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of inputs this feedback has added to the corpus.
    pub fn kept(&self) -> usize {
        self.kept
    }
}

impl<I: Input> Feedback<I> for NewBranchFeedback {
    fn name(&self) -> &'static str {
        "NewBranchFeedback"
    }

    fn is_interesting(
        &mut self,
        _input: &I,
        scope: &CoverageMap,
        persistent: &CoverageMap,
    ) -> Vec<BranchId> {
        scope.novel_relative_to(persistent)
    }

    fn report_interesting(
        &mut self,
        input: I,
        iteration: u64,
        novel: &[BranchId],
        corpus: &mut dyn Corpus<I>,
    ) -> Result<usize, FeedbackError> {
        let metadata = CorpusEntryMetadata::discovered(&input, iteration, novel);
        let id = corpus.add(input, metadata)?;
        self.kept += 1;
        debug!(
            "Iteration {iteration}: corpus entry {id} reached {} new branch(es): {}",
            novel.len(),
            novel
                .iter()
                .map(BranchId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{EntryOrigin, InMemoryCorpus};

    #[test]
    fn new_branch_feedback_works() {
        let mut feedback = NewBranchFeedback::new();
        let mut corpus: InMemoryCorpus<String> = InMemoryCorpus::new();
        let mut persistent: CoverageMap = ["lexer_start", "lexer_end"].into_iter().collect();

        let input1 = "x=1;".to_string();
        let scope1: CoverageMap = ["lexer_start", "lexer_ident", "lexer_end"]
            .into_iter()
            .collect();
        let novel = feedback.is_interesting(&input1, &scope1, &persistent);
        assert_eq!(novel, vec![BranchId::from("lexer_ident")]);
        let id = feedback
            .report_interesting(input1.clone(), 7, &novel, &mut corpus)
            .unwrap();
        assert_eq!(id, 0);
        assert_eq!(corpus.len(), 1);
        persistent.merge(&scope1);

        let (stored, meta) = corpus.get(0).unwrap();
        assert_eq!(*stored, input1);
        assert_eq!(meta.origin, EntryOrigin::Discovered { iteration: 7 });
        assert_eq!(meta.new_branches, vec!["lexer_ident"]);

        // Same branches again: nothing new.
        let input2 = "y=2;".to_string();
        assert!(
            Feedback::<String>::is_interesting(&mut feedback, &input2, &scope1, &persistent)
                .is_empty()
        );
        assert_eq!(feedback.kept(), 1);
    }

    #[test]
    fn empty_scope_is_never_interesting() {
        let mut feedback = NewBranchFeedback::new();
        let persistent = CoverageMap::new();
        let novel = feedback.is_interesting(&vec![0u8], &CoverageMap::new(), &persistent);
        assert!(novel.is_empty());
    }
}
