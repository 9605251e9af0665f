//! # Config Module Unit Tests / Config 模块单元测试
//!
//! Settings layering (defaults, TOML file, environment) and the directory
//! context built on top of it.
//!
//! 设置的分层加载（默认值、TOML 文件、环境变量）以及基于它构建的目录上下文。

mod common;

use std::path::PathBuf;
use std::time::Duration;
use subtest_runner::core::config::{EnvMap, FuturesMode, Settings, TimeoutMode};
use subtest_runner::core::errors::{HarnessError, fatal_exit_code, find_fatal};

fn env_of(pairs: &[(&str, &str)]) -> EnvMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[cfg(test)]
mod settings_tests {
    use super::*;

    #[test]
    fn test_defaults_without_environment() {
        let settings = Settings::load(&EnvMap::new()).unwrap();
        assert_eq!(settings.futures, FuturesMode::Exclude);
        assert_eq!(settings.default_timeout_secs(), 300);
        assert_eq!(settings.global_timeout_secs(), 300);
        assert_eq!(settings.kill_timeout_secs, 10);
        assert_eq!(settings.num_trials, 1);
        assert_eq!(settings.timeout_mode, TimeoutMode::Wrapper);
        assert_eq!(settings.wait_for_files_secs, 10);
        assert_eq!(settings.perf_label(), "");
        assert!(!settings.capabilities.multilocale());
        assert_eq!(settings.capabilities.locale_model, "flat");
    }

    #[test]
    fn test_valgrind_raises_default_timeout() {
        let settings = Settings::load(&env_of(&[("CHPL_TEST_VGRND_EXE", "on")])).unwrap();
        assert_eq!(settings.default_timeout_secs(), 1000);
    }

    #[test]
    fn test_compile_timeout_defaults_to_four_times_exec() {
        let settings = Settings::default();
        assert_eq!(settings.compile_timeout(Duration::from_secs(30)), Duration::from_secs(120));

        let settings = Settings::load(&env_of(&[("CHPL_TEST_COMP_TIMEOUT", "45")])).unwrap();
        assert_eq!(settings.compile_timeout(Duration::from_secs(30)), Duration::from_secs(45));
    }

    #[test]
    fn test_compile_timeout_saturates_on_huge_exec_timeout() {
        let settings = Settings::default();
        assert_eq!(settings.compile_timeout(Duration::from_secs(u64::MAX / 2)), Duration::MAX);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::load(&env_of(&[
            ("CHPL_TEST_FUTURES", "3"),
            ("CHPL_TEST_TIMEOUT", "90"),
            ("CHPL_TEST_TIMEOUT_MODE", "poll"),
            ("CHPL_COMM", "gasnet"),
            ("CHPL_SYSTEM_PREDIFF", "/a,/b"),
            ("COMPOPTS", "--fast '-s x=1'"),
            ("CHPL_TEST_LIMIT_RUNNING_EXECUTABLES", "lots"),
        ]))
        .unwrap();
        assert_eq!(settings.futures, FuturesMode::WithSkipIf);
        assert_eq!(settings.global_timeout_secs(), 90);
        assert_eq!(settings.timeout_mode, TimeoutMode::Poll);
        assert!(settings.capabilities.multilocale());
        assert_eq!(settings.system_prediffs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(settings.env_compopts, vec!["--fast".to_string(), "-s x=1".to_string()]);
        assert_eq!(settings.limit_running_executables, Some(1));
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        for pairs in [
            &[("CHPL_TEST_FUTURES", "9")][..],
            &[("CHPL_TEST_TIMEOUT", "soon")][..],
            &[("CHPL_TEST_TIMEOUT_MODE", "sometimes")][..],
            &[("CHPL_TEST_PERF", "1"), ("CHPL_TEST_PERF_DIR", "/tmp/perf")][..],
        ] {
            let err = Settings::load(&env_of(pairs)).unwrap_err();
            assert!(find_fatal(&err).is_some(), "expected fatal error for {pairs:?}");
        }
    }

    #[test]
    fn test_perf_settings_and_description() {
        let settings = Settings::load(&env_of(&[
            ("CHPL_TEST_PERF", "on"),
            ("CHPL_TEST_PERF_LABEL", "perf"),
            ("CHPL_TEST_PERF_DIR", "/data/perf"),
            ("CHPL_TEST_PERF_DESCRIPTION", "nightly"),
        ]))
        .unwrap();
        assert!(settings.is_perf());
        assert_eq!(settings.perf_label(), "perf");
        assert_eq!(
            settings.perf.as_ref().map(|p| p.dir.clone()),
            Some(PathBuf::from("/data/perf/nightly"))
        );
    }

    #[test]
    fn test_toml_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
num_trials = 4
timeout_mode = "poll"
kill_timeout_secs = 3

[capabilities]
comm = "ofi"
"#,
        )
        .unwrap();
        let path_str = path.display().to_string();
        let settings = Settings::load(&env_of(&[
            ("CHPL_TEST_SETTINGS", &path_str),
            ("CHPL_TEST_NUM_TRIALS", "2"),
        ]))
        .unwrap();
        assert_eq!(settings.num_trials, 2);
        assert_eq!(settings.timeout_mode, TimeoutMode::Poll);
        assert_eq!(settings.kill_timeout_secs, 3);
        assert_eq!(settings.capabilities.comm, "ofi");
        assert_eq!(settings.capabilities.tasks, "none");
    }

    #[test]
    fn test_unparsable_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "num_trials = [").unwrap();
        assert!(Settings::from_toml_file(&path).is_err());
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_fatal_exit_code() {
        assert_eq!(fatal_exit_code(), 173);
    }

    #[test]
    fn test_find_fatal_through_context() {
        let err = anyhow::Error::from(HarnessError::fatal("boom")).context("while loading");
        assert_eq!(find_fatal(&err).map(|e| e.to_string()), Some("boom".to_string()));

        let per_test = anyhow::Error::from(HarnessError::PerTestConfig {
            kind: ".skipif",
            test: "d/t".to_string(),
            detail: "bad".to_string(),
        });
        assert!(find_fatal(&per_test).is_none());
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;
    use common::Suite;

    #[tokio::test]
    async fn test_localdir_is_relative_to_test_root() {
        let suite = Suite::new();
        let ctx = suite.context(&[]).await;
        assert_eq!(ctx.localdir, "suite");
        assert_eq!(ctx.machine, "testhost");
        assert_eq!(ctx.platform, "linux64");
        assert!(!ctx.doc_compiler);
        assert_eq!(ctx.helper("testEnv"), suite.util.join("test").join("testEnv"));
    }

    #[tokio::test]
    async fn test_directory_files_are_loaded() {
        let suite = Suite::new();
        suite
            .file("NUMLOCALES", "3\n")
            .file("CATFILES", "a.txt b.txt\n")
            .file("NOEXEC", "");
        let ctx = suite.context(&[]).await;
        assert_eq!(ctx.files.numlocales, Some(3));
        assert_eq!(ctx.files.catfiles, vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert!(ctx.files.noexec);
    }

    #[tokio::test]
    async fn test_wrapper_mode_requires_timedexec() {
        let suite = Suite::new();
        std::fs::remove_file(suite.util.join("test").join("timedexec")).unwrap();
        let env = suite.env(&[("CHPL_TEST_TIMEOUT_MODE", "wrapper")]);
        let settings = Settings::load(&env).unwrap();
        let err = subtest_runner::core::config::DirectoryContext::build(&suite.compiler, &suite.dir, settings, env)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timedexec"));
    }
}
