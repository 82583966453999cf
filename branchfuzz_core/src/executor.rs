use crate::coverage::{BranchId, CoverageMap};
use crate::input::Input;
use crate::target::{ExecContext, Target, TargetError};
use log::{trace, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_SENTINEL: BranchId = BranchId::from_static("exception");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Completed,
    RuntimeError(String),
    Timeout,
    Crash(String),
}

impl ExecutionStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionStatus::Completed)
    }
}

/// Runs one input against a system under test.
///
/// Implementations never fail: every misbehaviour of the target is folded
/// into the returned status and the branches recorded into `scope`.
pub trait Executor<I: Input> {
    fn execute_sync(&mut self, input: &I, scope: &mut CoverageMap) -> ExecutionStatus;
}

impl<I: Input, E: Executor<I> + ?Sized> Executor<I> for Box<E> {
    fn execute_sync(&mut self, input: &I, scope: &mut CoverageMap) -> ExecutionStatus {
        (**self).execute_sync(input, scope)
    }
}

/// Runs a [`Target`] on the calling thread.
///
/// Panics are caught and reported as [`ExecutionStatus::Crash`]. The time
/// bound is enforced through the context deadline and, for targets that never
/// call `checkpoint`, by measuring wall time once the target returns.
pub struct InProcessExecutor<T> {
    target: T,
    timeout: Option<Duration>,
    sentinel: BranchId,
}

impl<T> InProcessExecutor<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            timeout: Some(DEFAULT_TIMEOUT),
            sentinel: DEFAULT_SENTINEL,
        }
    }

    /// `None` disables the time bound entirely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<BranchId>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn sentinel(&self) -> &BranchId {
        &self.sentinel
    }
}

impl<I, T> Executor<I> for InProcessExecutor<T>
where
    I: Input,
    T: Target<I>,
{
    fn execute_sync(&mut self, input: &I, scope: &mut CoverageMap) -> ExecutionStatus {
        let start = Instant::now();
        let budget = self.timeout;
        let target = &mut self.target;

        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = ExecContext::new(&mut *scope, budget);
            target.execute(input, &mut ctx)
        }));

        let mut status = match result {
            Ok(Ok(())) => ExecutionStatus::Completed,
            Ok(Err(TargetError::Timeout(_))) => ExecutionStatus::Timeout,
            Ok(Err(e)) => ExecutionStatus::RuntimeError(e.to_string()),
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic type".to_string()
                };
                ExecutionStatus::Crash(msg)
            }
        };

        // A target that never calls `checkpoint` is still held to the bound.
        if let Some(limit) = budget {
            if status.is_completed() && start.elapsed() > limit {
                status = ExecutionStatus::Timeout;
            }
        }

        match &status {
            ExecutionStatus::Completed => {}
            ExecutionStatus::RuntimeError(msg) => {
                trace!("{}: runtime error: {msg}", self.target.name());
            }
            ExecutionStatus::Timeout => {
                warn!(
                    "{}: execution exceeded {:?} on a {}-byte input",
                    self.target.name(),
                    budget.unwrap_or_default(),
                    input.len()
                );
            }
            ExecutionStatus::Crash(msg) => {
                warn!("{}: target panicked: {msg}", self.target.name());
            }
        }
        if !status.is_completed() {
            scope.record(self.sentinel.clone());
        }
        status
    }
}

#[cfg(test)]
mod in_process_executor_tests {
    use super::*;
    use crate::target::from_fn;

    fn simple_harness(input: &Vec<u8>, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        ctx.record("start");
        if input.len() > 2 {
            ctx.record("long");
        }
        Ok(())
    }

    fn panicking_harness(input: &Vec<u8>, ctx: &mut ExecContext<'_>) -> Result<(), TargetError> {
        ctx.record("start");
        if input.first() == Some(&0xFF) {
            panic!("Boom!");
        }
        Ok(())
    }

    #[test]
    fn in_process_executor_runs_harness() {
        let mut executor = InProcessExecutor::new(from_fn("simple", simple_harness));
        let mut scope = CoverageMap::new();
        let status = executor.execute_sync(&vec![1, 2, 3], &mut scope);
        assert_eq!(status, ExecutionStatus::Completed);
        assert!(scope.contains("start"));
        assert!(scope.contains("long"));
        assert!(!scope.contains("exception"));
    }

    #[test]
    fn in_process_executor_catches_panic() {
        let mut executor = InProcessExecutor::new(from_fn("panicky", panicking_harness));
        let mut scope = CoverageMap::new();
        let status = executor.execute_sync(&vec![0xFF], &mut scope);
        match status {
            ExecutionStatus::Crash(msg) => assert!(msg.contains("Boom!")),
            _ => panic!("Expected a crash, got {status:?}"),
        }
        // Branches recorded before the panic are kept.
        assert!(scope.contains("start"));
        assert!(scope.contains("exception"));
    }

    #[test]
    fn runtime_error_records_configured_sentinel() {
        let target = from_fn("rejecting", |_: &Vec<u8>, ctx: &mut ExecContext<'_>| {
            ctx.record("parse_start");
            Err(TargetError::runtime("parse_error", "unexpected token"))
        });
        let mut executor = InProcessExecutor::new(target).with_sentinel("fuzz_exception");
        let mut scope = CoverageMap::new();
        let status = executor.execute_sync(&vec![], &mut scope);
        assert_eq!(
            status,
            ExecutionStatus::RuntimeError("parse_error: unexpected token".to_string())
        );
        let tags: Vec<&str> = scope.iter().map(BranchId::as_str).collect();
        assert_eq!(tags, vec!["fuzz_exception", "parse_start"]);
    }

    #[test]
    fn cooperative_timeout_is_reported() {
        let target = from_fn("spinning", |_: &Vec<u8>, ctx: &mut ExecContext<'_>| {
            loop {
                ctx.checkpoint()?;
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        let mut executor =
            InProcessExecutor::new(target).with_timeout(Some(Duration::from_millis(20)));
        let mut scope = CoverageMap::new();
        let status = executor.execute_sync(&vec![0], &mut scope);
        assert_eq!(status, ExecutionStatus::Timeout);
        assert!(scope.contains("exception"));
    }

    #[test]
    fn slow_target_without_checkpoints_still_times_out() {
        let target = from_fn("sleepy", |_: &Vec<u8>, _ctx: &mut ExecContext<'_>| {
            std::thread::sleep(Duration::from_millis(30));
            Ok(())
        });
        let mut executor =
            InProcessExecutor::new(target).with_timeout(Some(Duration::from_millis(5)));
        let mut scope = CoverageMap::new();
        assert_eq!(
            executor.execute_sync(&vec![], &mut scope),
            ExecutionStatus::Timeout
        );
    }

    #[test]
    fn disabled_timeout_lets_slow_target_complete() {
        let target = from_fn("sleepy", |_: &Vec<u8>, _ctx: &mut ExecContext<'_>| {
            std::thread::sleep(Duration::from_millis(10));
            Ok(())
        });
        let mut executor = InProcessExecutor::new(target).with_timeout(None);
        let mut scope = CoverageMap::new();
        assert_eq!(
            executor.execute_sync(&vec![], &mut scope),
            ExecutionStatus::Completed
        );
        assert!(scope.is_empty());
    }

    #[test]
    fn huge_timeout_does_not_crash_the_target() {
        let target = from_fn("checks", |_: &Vec<u8>, ctx: &mut ExecContext<'_>| {
            ctx.checkpoint()?;
            ctx.record("ran");
            Ok(())
        });
        let mut executor =
            InProcessExecutor::new(target).with_timeout(Some(Duration::from_millis(u64::MAX)));
        let mut scope = CoverageMap::new();
        assert_eq!(
            executor.execute_sync(&vec![], &mut scope),
            ExecutionStatus::Completed
        );
        assert!(scope.contains("ran"));
    }
}
