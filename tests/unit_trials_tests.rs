//! # Trial Controller Unit Tests / 试运行控制单元测试

use std::time::Duration;
use subtest_runner::core::trials::{Timed, TrialControl, TrialPolicy, run_trials};

#[derive(Debug, Clone, PartialEq)]
struct Fake(Duration);

impl Timed for Fake {
    fn elapsed(&self) -> Duration {
        self.0
    }
}

fn policy(num_trials: u32, skip: Option<u64>, warn: Option<u64>) -> TrialPolicy {
    TrialPolicy {
        num_trials,
        skip_threshold: skip.map(Duration::from_secs),
        warn_threshold: warn.map(Duration::from_secs),
    }
}

#[test]
fn test_long_timeout_forces_single_trial() {
    assert_eq!(TrialPolicy::for_test(3, 400, 300, None, None).0.num_trials, 1);
    assert!(TrialPolicy::for_test(3, 400, 300, None, None).1);
    assert!(!TrialPolicy::for_test(1, 400, 300, None, None).1);
    assert_eq!(TrialPolicy::for_test(3, 100, 300, None, None), (policy(3, None, None), false));
}

#[tokio::test]
async fn test_runs_every_trial() {
    let outcomes = run_trials(&policy(3, None, None), |_| async {
        Ok((Fake(Duration::from_millis(1)), TrialControl::Continue))
    })
    .await
    .unwrap();
    let trials: Vec<u32> = outcomes.iter().map(|o| o.trial).collect();
    assert_eq!(trials, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_slow_trial_skips_the_rest() {
    let outcomes = run_trials(&policy(5, Some(1), None), |_| async {
        Ok((Fake(Duration::from_secs(2)), TrialControl::Continue))
    })
    .await
    .unwrap();
    assert_eq!(outcomes.len(), 1);
}

#[tokio::test]
async fn test_body_can_stop_early() {
    let outcomes = run_trials(&policy(5, None, None), |trial| async move {
        let control = if trial == 2 { TrialControl::Stop } else { TrialControl::Continue };
        Ok((Fake(Duration::ZERO), control))
    })
    .await
    .unwrap();
    assert_eq!(outcomes.len(), 2);
}

#[tokio::test]
async fn test_warn_threshold_does_not_stop_trials() {
    let policy = policy(2, None, Some(1));
    let outcomes = run_trials(&policy, |trial| async move {
        Ok((Fake(Duration::from_secs(u64::from(trial))), TrialControl::Continue))
    })
    .await
    .unwrap();
    let warned: Vec<bool> = outcomes.iter().map(|o| policy.warns(o.value.elapsed())).collect();
    assert_eq!(warned, vec![false, true]);
}

#[tokio::test]
async fn test_later_slow_trial_skips_the_rest() {
    let policy = policy(5, Some(2), None);
    let outcomes = run_trials(&policy, |trial| async move {
        let elapsed = if trial == 1 { Duration::from_millis(100) } else { Duration::from_secs(3) };
        Ok((Fake(elapsed), TrialControl::Continue))
    })
    .await
    .unwrap();
    let trials: Vec<u32> = outcomes.iter().map(|o| o.trial).collect();
    assert_eq!(trials, vec![1, 2]);
    assert!(!policy.skips(outcomes[0].value.elapsed()));
    assert!(policy.skips(outcomes[1].value.elapsed()));
}

#[tokio::test]
async fn test_zero_trials_still_runs_once() {
    let outcomes = run_trials(&policy(0, None, None), |_| async {
        Ok((Fake(Duration::ZERO), TrialControl::Continue))
    })
    .await
    .unwrap();
    assert_eq!(outcomes.len(), 1);
}

#[tokio::test]
async fn test_body_error_propagates() {
    let result = run_trials(&policy(3, None, None), |_| async {
        Err::<(Fake, TrialControl), _>(anyhow::anyhow!("spawn failed"))
    })
    .await;
    assert!(result.is_err());
}
