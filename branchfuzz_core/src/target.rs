use crate::coverage::{BranchId, CoverageMap};
use crate::input::Input;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a single execution of a target did not complete.
///
/// These are findings, not failures of the engine: the executor turns every
/// variant into a sentinel branch and the campaign moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// The target rejected or failed on the input (parse error, division by
    /// zero, undefined variable, ...). `kind` is a short stable category.
    #[error("{kind}: {message}")]
    Runtime { kind: &'static str, message: String },

    /// The execution ran past its time budget.
    #[error("execution exceeded its time budget of {0:?}")]
    Timeout(Duration),
}

impl TargetError {
    pub fn runtime(kind: &'static str, message: impl Into<String>) -> Self {
        TargetError::Runtime {
            kind,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TargetError::Timeout(_))
    }
}

/// Per-execution handle given to a target.
///
/// Owns nothing: it borrows the iteration's coverage scope exclusively for the
/// duration of one `execute` call, so no other component can observe the
/// scope mid-iteration.
pub struct ExecContext<'a> {
    scope: &'a mut CoverageMap,
    budget: Option<Duration>,
    deadline: Option<Instant>,
}

impl<'a> ExecContext<'a> {
    pub fn new(scope: &'a mut CoverageMap, budget: Option<Duration>) -> Self {
        Self {
            scope,
            budget,
            // A budget too large to add to `now` means no deadline.
            deadline: budget.and_then(|b| Instant::now().checked_add(b)),
        }
    }

    /// Marks a branch as taken during this execution.
    pub fn record(&mut self, branch: impl Into<BranchId>) {
        self.scope.record(branch);
    }

    /// Fails with [`TargetError::Timeout`] once the budget is spent.
    ///
    /// Targets call this inside loops and recursive descent.
    pub fn checkpoint(&self) -> Result<(), TargetError> {
        match (self.deadline, self.budget) {
            (Some(deadline), Some(budget)) if Instant::now() >= deadline => {
                Err(TargetError::Timeout(budget))
            }
            _ => Ok(()),
        }
    }

    /// Branches recorded so far in this execution.
    pub fn recorded(&self) -> &CoverageMap {
        &*self.scope
    }
}

/// The adapter contract every system under test implements.
///
/// A target accepts one input, runs it, and reports the branches it took
/// through the context. All parsing and evaluation is the target's business;
/// the engine only ever sees the branch set and the outcome.
pub trait Target<I: Input> {
    fn name(&self) -> &str;

    fn execute(&mut self, input: &I, ctx: &mut ExecContext<'_>) -> Result<(), TargetError>;
}

impl<I: Input, T: Target<I> + ?Sized> Target<I> for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn execute(&mut self, input: &I, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        (**self).execute(input, ctx)
    }
}

/// A target backed by a closure. Built with [`from_fn`].
pub struct FnTarget<F> {
    name: &'static str,
    harness_fn: F,
}

/// Wraps a closure as a [`Target`].
pub fn from_fn<I, F>(name: &'static str, harness_fn: F) -> FnTarget<F>
where
    I: Input,
    F: FnMut(&I, &mut ExecContext<'_>) -> Result<(), TargetError>,
{
    FnTarget { name, harness_fn }
}

impl<I, F> Target<I> for FnTarget<F>
where
    I: Input,
    F: FnMut(&I, &mut ExecContext<'_>) -> Result<(), TargetError>,
{
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&mut self, input: &I, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        (self.harness_fn)(input, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_records_into_scope() {
        let mut scope = CoverageMap::new();
        {
            let mut ctx = ExecContext::new(&mut scope, None);
            ctx.record("start");
            ctx.record("start");
            ctx.record(format!("calc_func_{}", "sqrt"));
            assert_eq!(ctx.recorded().len(), 2);
        }
        assert!(scope.contains("start"));
        assert!(scope.contains("calc_func_sqrt"));
    }

    #[test]
    fn checkpoint_without_budget_never_times_out() {
        let mut scope = CoverageMap::new();
        let ctx = ExecContext::new(&mut scope, None);
        assert!(ctx.checkpoint().is_ok());
    }

    #[test]
    fn checkpoint_after_spent_budget_times_out() {
        let mut scope = CoverageMap::new();
        let ctx = ExecContext::new(&mut scope, Some(Duration::ZERO));
        let err = ctx.checkpoint().unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn unrepresentable_deadline_means_no_deadline() {
        let mut scope = CoverageMap::new();
        let ctx = ExecContext::new(&mut scope, Some(Duration::from_millis(u64::MAX)));
        assert!(ctx.checkpoint().is_ok());
    }

    #[test]
    fn fn_target_runs_closure() {
        let mut target = from_fn("first_byte", |input: &Vec<u8>, ctx| {
            ctx.record("start");
            match input.first() {
                Some(b'B') => Err(TargetError::runtime("bad_input", "starts with B")),
                _ => Ok(()),
            }
        });
        assert_eq!(Target::<Vec<u8>>::name(&target), "first_byte");

        let mut scope = CoverageMap::new();
        let mut ctx = ExecContext::new(&mut scope, None);
        assert!(target.execute(&b"GOOD".to_vec(), &mut ctx).is_ok());
        let err = target.execute(&b"BAD".to_vec(), &mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "bad_input: starts with B");
    }
}
