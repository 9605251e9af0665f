//! # Command Module Unit Tests / Command 模块单元测试
//!
//! Exercises the Timeout-Bounded Runner with real child processes: output
//! capture and ordering, the three deadline strategies, and standard input.
//!
//! 使用真实子进程测试超时控制运行器：输出捕获与顺序、三种截止时间策略以及标准输入。

mod common;

use std::time::Duration;
use subtest_runner::config::EnvMap;
use subtest_runner::core::errors::find_fatal;
use subtest_runner::infra::command::{
    OutputMerge, RunRequest, StdinSource, TimeoutStrategy, WRAPPER_TIMEOUT_STATUS, launcher_timeout_args, run,
    run_to_completion,
};

fn env() -> EnvMap {
    let mut env = EnvMap::new();
    env.insert("PATH".into(), std::env::var("PATH").unwrap_or_default());
    env
}

fn shell(script: &str) -> RunRequest {
    let mut req = RunRequest::new("/bin/sh", vec!["-c".to_string(), script.to_string()]);
    req.env = env();
    req.timeout = Duration::from_secs(30);
    req
}

#[cfg(test)]
mod capture_tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_status() {
        let result = run(&shell("echo hi; exit 3")).await.unwrap();
        assert_eq!(result.output_text(), "hi\n");
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.timed_out);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_stdout_then_stderr_ordering() {
        let mut req = shell("echo err >&2; sleep 0.1; echo out");
        req.merge = OutputMerge::StdoutThenStderr;
        let result = run(&req).await.unwrap();
        assert_eq!(result.output_text(), "out\nerr\n");
    }

    #[tokio::test]
    async fn test_environment_is_exactly_the_given_map() {
        let mut req = shell("echo \"${MARKER:-unset} ${HOME:-nohome}\"");
        req.env.insert("MARKER".into(), "set".into());
        let result = run(&req).await.unwrap();
        assert_eq!(result.output_text(), "set nohome\n");
    }

    #[tokio::test]
    async fn test_stdin_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        std::fs::write(&input, "piped\n").unwrap();
        let mut req = shell("cat");
        req.stdin = StdinSource::File(input);
        let result = run(&req).await.unwrap();
        assert_eq!(result.output_text(), "piped\n");
    }

    #[tokio::test]
    async fn test_null_stdin_reads_nothing() {
        let result = run(&shell("cat; echo done")).await.unwrap();
        assert_eq!(result.output_text(), "done\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let mut req = RunRequest::new("/nonexistent/program", Vec::new());
        req.env = env();
        assert!(run(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_run_to_completion_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_to_completion("/bin/sh", &["-c".to_string(), "pwd".to_string()], &env(), Some(dir.path()))
            .await
            .unwrap();
        let reported = std::fs::canonicalize(result.output_text().trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_display_command() {
        let req = RunRequest::new("./t", vec!["-nl".to_string(), "2".to_string()]);
        assert_eq!(req.display_command(), "./t -nl 2");
    }
}

#[cfg(test)]
mod deadline_tests {
    use super::*;

    #[tokio::test]
    async fn test_polling_deadline_terminates_process_group() {
        let mut req = shell("sleep 10 & sleep 10; echo unreachable");
        req.timeout = Duration::from_millis(300);
        req.kill_timeout = Duration::from_secs(1);
        let result = run(&req).await.unwrap();
        assert!(result.timed_out);
        assert!(result.elapsed < Duration::from_secs(5));
        assert!(!result.output_text().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_sigterm_ignoring_child_is_killed_after_grace_period() {
        let mut req = shell("trap '' TERM; sleep 20");
        req.strategy = TimeoutStrategy::Polling;
        req.timeout = Duration::from_millis(300);
        req.kill_timeout = Duration::from_secs(1);
        let result = run(&req).await.unwrap();
        assert!(result.timed_out);
        assert!(result.elapsed >= Duration::from_millis(1300), "grace period was skipped: {:?}", result.elapsed);
        assert!(result.elapsed < Duration::from_millis(2500), "took {:?}", result.elapsed);
    }

    #[tokio::test]
    async fn test_wrapper_status_means_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = dir.path().join("timedexec");
        common::write_executable(&wrapper, &format!("#!/bin/sh\necho \"limit $1\"\nexit {WRAPPER_TIMEOUT_STATUS}\n"));
        let mut req = shell("echo never");
        req.timeout = Duration::from_secs(7);
        req.strategy = TimeoutStrategy::Wrapper { program: wrapper };
        let result = run(&req).await.unwrap();
        assert!(result.timed_out);
        assert_eq!(result.output_text(), "limit 7\n");
    }

    #[tokio::test]
    async fn test_wrapper_runs_quoted_command() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = dir.path().join("timedexec");
        common::write_executable(&wrapper, "#!/bin/sh\nshift\nexec /bin/sh -c \"$1\"\n");
        let mut req = RunRequest::new("echo", vec!["two words".to_string()]);
        req.env = env();
        req.strategy = TimeoutStrategy::Wrapper { program: wrapper };
        let result = run(&req).await.unwrap();
        assert!(!result.timed_out);
        assert_eq!(result.output_text(), "two words\n");
    }

    #[tokio::test]
    async fn test_launcher_timeout_comes_from_output() {
        let mut req = shell("echo 'PBS: job killed: walltime 61 exceeded limit 60'");
        req.strategy = TimeoutStrategy::Launcher;
        assert!(run(&req).await.unwrap().timed_out);

        let mut req = shell("echo fine");
        req.strategy = TimeoutStrategy::Launcher;
        assert!(!run(&req).await.unwrap().timed_out);
    }

    #[test]
    fn test_launcher_walltime_format() {
        assert_eq!(
            launcher_timeout_args("slurm", Duration::from_secs(3725)).unwrap(),
            vec!["--walltime=01:02:05".to_string()]
        );
        assert_eq!(
            launcher_timeout_args("pbs", Duration::from_secs(59)).unwrap(),
            vec!["--walltime=00:00:59".to_string()]
        );
    }

    #[test]
    fn test_unknown_launcher_family_is_fatal() {
        let err = launcher_timeout_args("lsf", Duration::from_secs(1)).unwrap_err();
        assert!(find_fatal(&err).is_some());
    }
}
