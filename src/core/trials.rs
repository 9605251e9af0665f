//! # Trial Controller Module / 试运行控制模块
//!
//! Repeats one compile/execute combination up to `num_trials` times, stopping
//! early once a trial runs longer than the skip threshold.
//!
//! 将一个 编译/执行 组合最多重复运行 `num_trials` 次；一旦某次试运行超过跳过阈值就提前停止。

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

use crate::core::models::ExecutionResult;

/// Anything that knows how long it took.
pub trait Timed {
    fn elapsed(&self) -> Duration;
}

impl Timed for ExecutionResult {
    fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// What the trial body wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialControl {
    Continue,
    /// Abandon the remaining trials of this combination.
    Stop,
}

/// Repetition policy for one combination.
///
/// 单个组合的重复运行策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialPolicy {
    pub num_trials: u32,
    /// A trial slower than this skips the rest.
    pub skip_threshold: Option<Duration>,
    /// A trial slower than this only earns a warning.
    pub warn_threshold: Option<Duration>,
}

impl TrialPolicy {
    /// Builds the policy for a test. A test whose timeout exceeds the global
    /// timeout runs exactly once. The second value reports whether the trial
    /// count was lowered for that reason.
    pub fn for_test(
        num_trials: u32,
        timeout_secs: u64,
        global_timeout_secs: u64,
        warn_secs: Option<u64>,
        skip_secs: Option<u64>,
    ) -> (Self, bool) {
        let forced = timeout_secs > global_timeout_secs && num_trials != 1;
        let policy = Self {
            num_trials: if timeout_secs > global_timeout_secs { 1 } else { num_trials },
            skip_threshold: skip_secs.map(Duration::from_secs),
            warn_threshold: warn_secs.map(Duration::from_secs),
        };
        (policy, forced)
    }

    pub fn warns(&self, elapsed: Duration) -> bool {
        self.warn_threshold.is_some_and(|limit| elapsed > limit)
    }

    pub fn skips(&self, elapsed: Duration) -> bool {
        self.skip_threshold.is_some_and(|limit| elapsed > limit)
    }
}

/// One finished trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome<T> {
    /// 1-based trial number.
    pub trial: u32,
    pub value: T,
}

/// Runs `body` once per trial, sequentially. Each trial is independent; the
/// controller only looks at elapsed time (and the body's own stop request).
///
/// 按顺序为每次试运行调用 `body`。各次试运行相互独立；控制器只关注耗时
/// （以及 `body` 自身的停止请求）。
pub async fn run_trials<T, F, Fut>(policy: &TrialPolicy, mut body: F) -> Result<Vec<TrialOutcome<T>>>
where
    T: Timed,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(T, TrialControl)>>,
{
    let mut outcomes = Vec::new();
    for trial in 1..=policy.num_trials.max(1) {
        let (value, control) = body(trial).await?;
        let elapsed = value.elapsed();
        let skip = policy.skips(elapsed);
        if skip {
            tracing::debug!(trial, ?elapsed, "trial exceeded skip threshold");
        }
        outcomes.push(TrialOutcome { trial, value });
        if skip || control == TrialControl::Stop {
            break;
        }
    }
    Ok(outcomes)
}
