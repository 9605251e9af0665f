//! # Configuration Module / 配置模块
//!
//! Harness-wide [`Settings`] (compiled defaults, an optional TOML file, then the
//! process environment) and the immutable per-directory [`DirectoryContext`].
//!
//! 测试框架级别的 [`Settings`]（编译期默认值、可选的 TOML 文件、进程环境变量），
//! 以及不可变的目录上下文 [`DirectoryContext`]。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::errors::HarnessError;
use crate::core::resolve::{self, DirectoryFiles};
use crate::infra::fs;

/// A snapshot of environment variables. The harness never mutates its own
/// process environment; overlays are passed to children explicitly.
pub type EnvMap = BTreeMap<String, String>;

/// Captures the current process environment.
pub fn env_snapshot() -> EnvMap {
    std::env::vars().collect()
}

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const VALGRIND_TIMEOUT_SECS: u64 = 1000;
const DEFAULT_KILL_TIMEOUT_SECS: u64 = 10;
const COMPILE_TIMEOUT_FACTOR: u32 = 4;

/// How the Timeout-Bounded Runner enforces the execution deadline.
/// 超时控制运行器执行截止时间的方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutMode {
    /// Launch through the `timedexec` helper, which reports a timeout as exit status 222.
    #[default]
    Wrapper,
    /// Poll the child directly and escalate signals on expiry.
    Poll,
}

/// Which tests run with respect to `.future` markers (`CHPL_TEST_FUTURES`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FuturesMode {
    /// 0: skip futures.
    #[default]
    Exclude,
    /// 1: run everything.
    All,
    /// 2: run futures only.
    Only,
    /// 3: run only the futures that carry a `.skipif`.
    WithSkipIf,
}

impl FuturesMode {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(FuturesMode::Exclude),
            1 => Some(FuturesMode::All),
            2 => Some(FuturesMode::Only),
            3 => Some(FuturesMode::WithSkipIf),
            _ => None,
        }
    }
}

/// The four capability tags used to select golden files, plus the launcher.
///
/// 用于选择期望输出文件的四个能力标签，以及启动器。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub comm: String,
    pub network_atomics: String,
    pub locale_model: String,
    pub tasks: String,
    pub launcher: String,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            comm: "none".to_string(),
            network_atomics: "none".to_string(),
            locale_model: "flat".to_string(),
            tasks: "none".to_string(),
            launcher: "none".to_string(),
        }
    }
}

impl Capabilities {
    /// Variables injected into predicate and executable config-file environments.
    pub fn env_pairs(&self) -> [(&'static str, &str); 5] {
        [
            ("CHPL_COMM", &self.comm),
            ("CHPL_NETWORK_ATOMICS", &self.network_atomics),
            ("CHPL_LOCALE_MODEL", &self.locale_model),
            ("CHPL_TASKS", &self.tasks),
            ("CHPL_LAUNCHER", &self.launcher),
        ]
    }

    pub fn multilocale(&self) -> bool {
        self.comm != "none"
    }
}

/// Performance-testing mode parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfSettings {
    /// Replaces `perf` in per-test suffixes (`.perfkeys`, `.perfcompopts`, ...).
    pub label: String,
    pub dir: PathBuf,
    #[serde(default)]
    pub description: Option<String>,
    /// `mm/dd/yy`; today when absent.
    #[serde(default)]
    pub date: Option<String>,
}

/// Native toolchain used for `.test.c` / `.ml-test.c` sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
    pub c_compiler: String,
    pub cxx_compiler: String,
    pub host_c_compiler: Option<String>,
    pub host_cxx_compiler: Option<String>,
    pub runtime_includes: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            c_compiler: "cc".to_string(),
            cxx_compiler: "c++".to_string(),
            host_c_compiler: None,
            host_cxx_compiler: None,
            runtime_includes: String::new(),
        }
    }
}

/// Process-wide harness settings. Every field is optional in the TOML file.
///
/// 进程级别的测试框架设置。TOML 文件中的每个字段都是可选的。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub futures: FuturesMode,
    pub run_notests: bool,
    pub valgrind_compiler: bool,
    pub valgrind_executable: bool,
    pub valgrind_opts: String,
    pub perf: Option<PerfSettings>,
    pub max_locales: Option<u32>,
    pub multilocale_only: bool,
    /// Launcher family for `--walltime` style deadlines (`pbs`, `slurm`).
    pub launcher_timeout: Option<String>,
    /// Slot count for the execution limiter; `None` disables it.
    pub limit_running_executables: Option<u32>,
    pub limiter_dir: Option<PathBuf>,
    pub no_stdin_redirect: bool,
    /// Global execution timeout ceiling in seconds.
    pub timeout_secs: Option<u64>,
    pub comp_timeout_secs: Option<u64>,
    pub kill_timeout_secs: u64,
    pub num_trials: u32,
    pub exec_time_warn_limit: Option<u64>,
    pub exec_time_skip_trials: Option<u64>,
    pub timeout_mode: TimeoutMode,
    pub util_dir: Option<PathBuf>,
    pub test_root_dir: Option<PathBuf>,
    pub chpl_home: Option<PathBuf>,
    pub onetest: Option<String>,
    pub uniquify_exe: bool,
    pub compile_only: bool,
    pub no_use_o: bool,
    pub launchcmd: Option<String>,
    pub system_preexecs: Vec<PathBuf>,
    pub system_prediffs: Vec<PathBuf>,
    pub env_compopts: Vec<String>,
    pub env_execopts: Option<String>,
    pub env_chpldocopts: Vec<String>,
    pub env_numlocales: u32,
    pub capabilities: Capabilities,
    pub machine: Option<String>,
    pub platform: Option<String>,
    pub toolchain: Toolchain,
    pub wait_for_files_secs: u64,
    /// Destination of the machine-readable outcome report.
    pub json_report: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            futures: FuturesMode::default(),
            run_notests: false,
            valgrind_compiler: false,
            valgrind_executable: false,
            valgrind_opts: "--tool=memcheck".to_string(),
            perf: None,
            max_locales: None,
            multilocale_only: false,
            launcher_timeout: None,
            limit_running_executables: None,
            limiter_dir: None,
            no_stdin_redirect: false,
            timeout_secs: None,
            comp_timeout_secs: None,
            kill_timeout_secs: DEFAULT_KILL_TIMEOUT_SECS,
            num_trials: 1,
            exec_time_warn_limit: None,
            exec_time_skip_trials: None,
            timeout_mode: TimeoutMode::default(),
            util_dir: None,
            test_root_dir: None,
            chpl_home: None,
            onetest: None,
            uniquify_exe: false,
            compile_only: false,
            no_use_o: false,
            launchcmd: None,
            system_preexecs: Vec::new(),
            system_prediffs: Vec::new(),
            env_compopts: Vec::new(),
            env_execopts: None,
            env_chpldocopts: Vec::new(),
            env_numlocales: 0,
            capabilities: Capabilities::default(),
            machine: None,
            platform: None,
            toolchain: Toolchain::default(),
            wait_for_files_secs: 10,
            json_report: None,
        }
    }
}

/// `true` when the variable is set to anything but an empty string, `0` or `false`.
fn truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false" | "False" | "no")
}

fn parse_number<T: std::str::FromStr>(env: &EnvMap, key: &str) -> Result<Option<T>> {
    match env.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| HarnessError::fatal(format!("Invalid integer value in ${} ({})", key, raw)).into()),
    }
}

fn split_words(raw: &str, key: &str) -> Result<Vec<String>> {
    shlex::split(raw).ok_or_else(|| {
        HarnessError::fatal(format!("Cannot parse ${} as shell words: {}", key, raw)).into()
    })
}

impl Settings {
    /// Loads settings: compiled defaults, then `CHPL_TEST_SETTINGS` (TOML), then the environment.
    ///
    /// 加载设置：编译期默认值 → `CHPL_TEST_SETTINGS` 指定的 TOML 文件 → 环境变量。
    pub fn load(env: &EnvMap) -> Result<Self> {
        let mut settings = match env.get("CHPL_TEST_SETTINGS") {
            Some(path) => Self::from_toml_file(Path::new(path))?,
            None => Settings::default(),
        };
        settings.apply_env(env)?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Overlays every recognised environment variable onto `self`.
    pub fn apply_env(&mut self, env: &EnvMap) -> Result<()> {
        if let Some(level) = parse_number::<u8>(env, "CHPL_TEST_FUTURES")? {
            self.futures = FuturesMode::from_level(level).ok_or_else(|| {
                HarnessError::fatal(format!("Unknown futures mode {}", level))
            })?;
        }
        if let Some(v) = env.get("CHPL_TEST_NOTESTS") {
            self.run_notests = truthy(v);
        }
        if let Some(v) = env.get("CHPL_TEST_VGRND_COMP") {
            self.valgrind_compiler = v == "on";
        }
        if let Some(v) = env.get("CHPL_TEST_VGRND_EXE") {
            self.valgrind_executable = v == "on";
        }
        if let Some(v) = env.get("CHPL_VALGRIND_OPTS") {
            self.valgrind_opts = v.clone();
        }

        if env.contains_key("CHPL_TEST_PERF") {
            let (Some(label), Some(dir)) =
                (env.get("CHPL_TEST_PERF_LABEL"), env.get("CHPL_TEST_PERF_DIR"))
            else {
                return Err(HarnessError::fatal(
                    "$CHPL_TEST_PERF_DIR and $CHPL_TEST_PERF_LABEL must be set for performance testing",
                )
                .into());
            };
            let description = env.get("CHPL_TEST_PERF_DESCRIPTION").cloned();
            let mut dir = PathBuf::from(dir);
            if let Some(desc) = &description {
                dir.push(desc);
            }
            self.perf = Some(PerfSettings {
                label: label.clone(),
                dir,
                description,
                date: env.get("CHPL_TEST_PERF_DATE").cloned(),
            });
        }

        let max_locales = match parse_number::<u32>(env, "CHPL_TEST_MAX_LOCALES")? {
            Some(n) => Some(n),
            None => parse_number::<u32>(env, "CHPL_TEST_NUM_LOCALES_AVAILABLE")?,
        };
        if max_locales.is_some() {
            self.max_locales = max_locales;
        }
        if let Some(v) = env.get("CHPL_TEST_MULTILOCALE_ONLY") {
            self.multilocale_only = truthy(v);
        }
        if let Some(v) = env.get("CHPL_LAUNCHER_TIMEOUT") {
            self.launcher_timeout = Some(v.trim().to_string());
        }
        if let Some(v) = env.get("CHPL_TEST_LIMIT_RUNNING_EXECUTABLES") {
            // A non-numeric value still enables the limiter with a single slot.
            self.limit_running_executables = Some(v.trim().parse::<u32>().unwrap_or(1).max(1));
        }
        if let Some(v) = env.get("CHPL_TEST_LIMITER_DIR") {
            self.limiter_dir = Some(PathBuf::from(v));
        }
        if env.contains_key("CHPL_NO_STDIN_REDIRECT") {
            self.no_stdin_redirect = true;
        }

        if let Some(t) = parse_number(env, "CHPL_TEST_TIMEOUT")? {
            self.timeout_secs = Some(t);
        }
        if let Some(t) = parse_number(env, "CHPL_TEST_COMP_TIMEOUT")? {
            self.comp_timeout_secs = Some(t);
        }
        if let Some(t) = parse_number(env, "CHPL_TEST_KILL_TIMEOUT")? {
            self.kill_timeout_secs = t;
        }
        if let Some(n) = parse_number(env, "CHPL_TEST_NUM_TRIALS")? {
            self.num_trials = n;
        }
        if let Some(n) = parse_number::<u64>(env, "CHPL_TEST_EXEC_TIME_WARN_LIMIT")? {
            self.exec_time_warn_limit = (n > 0).then_some(n);
        }
        if let Some(n) = parse_number::<u64>(env, "CHPL_TEST_EXEC_TIME_LIMIT_NUM_TRIALS")? {
            self.exec_time_skip_trials = (n > 0).then_some(n);
        }
        if let Some(n) = parse_number(env, "CHPL_TEST_WAIT_FOR_FILES_TIMEOUT")? {
            self.wait_for_files_secs = n;
        }
        if let Some(mode) = env.get("CHPL_TEST_TIMEOUT_MODE") {
            self.timeout_mode = match mode.trim() {
                "wrapper" => TimeoutMode::Wrapper,
                "poll" => TimeoutMode::Poll,
                other => {
                    return Err(HarnessError::fatal(format!("Unknown timeout mode '{}'", other)).into());
                }
            };
        }

        let path_vars: [(&str, &mut Option<PathBuf>); 4] = [
            ("CHPL_TEST_UTIL_DIR", &mut self.util_dir),
            ("CHPL_TEST_ROOT_DIR", &mut self.test_root_dir),
            ("CHPL_HOME", &mut self.chpl_home),
            ("CHPL_TEST_JSON_REPORT", &mut self.json_report),
        ];
        for (key, slot) in path_vars {
            if let Some(v) = env.get(key) {
                *slot = Some(PathBuf::from(v));
            }
        }

        if let Some(v) = env.get("CHPL_ONETEST") {
            self.onetest = Some(v.clone());
        }
        if env.contains_key("CHPL_TEST_UNIQUIFY_EXE") {
            self.uniquify_exe = true;
        }
        if let Some(v) = env.get("CHPL_COMPONLY") {
            self.compile_only = !v.is_empty();
        }
        if let Some(v) = env.get("CHPL_TEST_NO_USE_O") {
            self.no_use_o = v == "true";
        }
        if let Some(v) = env.get("LAUNCHCMD") {
            self.launchcmd = Some(v.clone());
        }
        for (key, slot) in [
            ("CHPL_SYSTEM_PREEXEC", &mut self.system_preexecs),
            ("CHPL_SYSTEM_PREDIFF", &mut self.system_prediffs),
        ] {
            if let Some(v) = env.get(key).filter(|v| !v.trim().is_empty()) {
                *slot = v.trim().split(',').map(PathBuf::from).collect();
            }
        }

        if let Some(v) = env.get("COMPOPTS") {
            self.env_compopts = split_words(v, "COMPOPTS")?;
        }
        if let Some(v) = env.get("EXECOPTS") {
            self.env_execopts = Some(v.clone());
        }
        if let Some(v) = env.get("CHPLDOCOPTS") {
            self.env_chpldocopts = split_words(v, "CHPLDOCOPTS")?;
        }
        if let Some(n) = parse_number(env, "NUMLOCALES")? {
            self.env_numlocales = n;
        }

        let caps = &mut self.capabilities;
        for (key, slot) in [
            ("CHPL_COMM", &mut caps.comm),
            ("CHPL_NETWORK_ATOMICS", &mut caps.network_atomics),
            ("CHPL_LOCALE_MODEL", &mut caps.locale_model),
            ("CHPL_TASKS", &mut caps.tasks),
            ("CHPL_LAUNCHER", &mut caps.launcher),
        ] {
            if let Some(v) = env.get(key) {
                *slot = v.trim().to_string();
            }
        }

        if let Some(v) = env.get("CHPL_TEST_MACHINE") {
            self.machine = Some(v.trim().to_string());
        }
        if let Some(v) = env.get("CHPL_TARGET_PLATFORM") {
            self.platform = Some(v.trim().to_string());
        }
        let tc = &mut self.toolchain;
        if let Some(v) = env.get("CHPL_TEST_C_COMPILER") {
            tc.c_compiler = v.clone();
        }
        if let Some(v) = env.get("CHPL_TEST_CXX_COMPILER") {
            tc.cxx_compiler = v.clone();
        }
        if let Some(v) = env.get("CHPL_TEST_HOST_C_COMPILER") {
            tc.host_c_compiler = Some(v.clone());
        }
        if let Some(v) = env.get("CHPL_TEST_HOST_CXX_COMPILER") {
            tc.host_cxx_compiler = Some(v.clone());
        }
        if let Some(v) = env.get("CHPL_TEST_RUNTIME_INCLUDES") {
            tc.runtime_includes = v.clone();
        }
        Ok(())
    }

    pub fn valgrind(&self) -> bool {
        self.valgrind_compiler || self.valgrind_executable
    }

    /// The compiled-in execution timeout: 300 s, or 1000 s under valgrind.
    pub fn default_timeout_secs(&self) -> u64 {
        if self.valgrind() {
            VALGRIND_TIMEOUT_SECS
        } else {
            DEFAULT_TIMEOUT_SECS
        }
    }

    /// The global ceiling (`CHPL_TEST_TIMEOUT`), defaulting to [`Self::default_timeout_secs`].
    pub fn global_timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or_else(|| self.default_timeout_secs())
    }

    /// Compile deadline for a test whose execution deadline is `exec_timeout`.
    pub fn compile_timeout(&self, exec_timeout: Duration) -> Duration {
        match self.comp_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => exec_timeout.saturating_mul(COMPILE_TIMEOUT_FACTOR),
        }
    }

    /// Label prefixed to perf-sensitive suffixes; empty outside perf mode.
    pub fn perf_label(&self) -> &str {
        self.perf.as_ref().map(|p| p.label.as_str()).unwrap_or("")
    }

    pub fn is_perf(&self) -> bool {
        self.perf.is_some()
    }
}

/// Everything a resolution or execution step may consult about the directory
/// being run. Built once; never mutated afterwards.
///
/// 解析或执行步骤可能需要查询的关于当前目录的全部信息。只构建一次，之后不再修改。
#[derive(Debug, Clone)]
pub struct DirectoryContext {
    pub settings: Settings,
    /// Absolute path of the directory being run.
    pub root: PathBuf,
    /// The directory relative to the test root, as printed in every record.
    pub localdir: String,
    pub compiler: PathBuf,
    /// The compiler under test is the documentation tool itself.
    pub doc_compiler: bool,
    pub util_dir: PathBuf,
    pub machine: String,
    pub platform: String,
    /// Sorted directory listing.
    pub listing: Vec<String>,
    pub files: DirectoryFiles,
    /// The process environment the harness was started with.
    pub process_env: EnvMap,
}

impl DirectoryContext {
    /// Validates required helpers and reads every directory-wide file.
    ///
    /// 校验所需的辅助程序，并读取所有目录级配置文件。
    pub async fn build(
        compiler: &Path,
        root: &Path,
        settings: Settings,
        process_env: EnvMap,
    ) -> Result<Self> {
        if !fs::is_executable(compiler) {
            return Err(HarnessError::missing_helper("compiler", compiler).into());
        }
        let doc_compiler = compiler
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("chpldoc"));

        let util_dir = match &settings.util_dir {
            Some(dir) if dir.is_dir() => dir.clone(),
            other => {
                let shown = other
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "None".to_string());
                return Err(HarnessError::fatal(format!("Cannot find test util directory {}", shown)).into());
            }
        };
        if settings.timeout_mode == TimeoutMode::Wrapper {
            let timedexec = util_dir.join("test").join("timedexec");
            if !fs::is_executable(&timedexec) {
                return Err(HarnessError::missing_helper("timedexec script", &timedexec).into());
            }
        }
        for (what, hooks) in [
            ("system-wide preexec", &settings.system_preexecs),
            ("system-wide prediff", &settings.system_prediffs),
        ] {
            if let Some(bad) = hooks.iter().find(|h| !fs::is_executable(h)) {
                return Err(HarnessError::missing_helper(what, bad).into());
            }
        }

        let root = fs::absolute_path(root)?;
        let localdir = local_dir_name(&root, &settings, compiler);
        let machine = settings.machine.clone().unwrap_or_else(fs::short_host_name);
        let platform = settings
            .platform
            .clone()
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        let listing = fs::sorted_listing(&root)?;

        let mut expand_env = process_env.clone();
        for (key, value) in settings.capabilities.env_pairs() {
            expand_env.insert(key.to_string(), value.to_string());
        }
        let files = resolve::load_directory_files(&root, &localdir, &settings, &expand_env).await?;

        Ok(Self {
            settings,
            root,
            localdir,
            compiler: compiler.to_path_buf(),
            doc_compiler,
            util_dir,
            machine,
            platform,
            listing,
            files,
            process_env,
        })
    }

    /// Process environment plus the capability tags, used for predicates and
    /// executable config files.
    pub fn capability_env(&self) -> EnvMap {
        let mut env = self.process_env.clone();
        for (key, value) in self.settings.capabilities.env_pairs() {
            env.insert(key.to_string(), value.to_string());
        }
        env
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.settings.capabilities
    }

    /// `COMPOPTS` from the environment contains `--no-local`.
    pub fn no_local(&self) -> bool {
        self.settings.env_compopts.iter().any(|o| o == "--no-local")
    }

    pub fn helper(&self, name: &str) -> PathBuf {
        self.util_dir.join("test").join(name)
    }
}

/// `<root>` relative to the test root (`CHPL_TEST_ROOT_DIR`, else `$CHPL_HOME/test`,
/// else two levels above the compiler plus `test`). Falls back to the full path.
fn local_dir_name(root: &Path, settings: &Settings, compiler: &Path) -> String {
    let test_root = settings.test_root_dir.clone().or_else(|| {
        let home = settings.chpl_home.clone().or_else(|| {
            let abs = fs::absolute_path(compiler).ok()?;
            Some(abs.parent()?.parent()?.parent()?.to_path_buf())
        })?;
        Some(home.join("test"))
    });
    test_root
        .and_then(|t| fs::absolute_path(&t).ok())
        .and_then(|t| root.strip_prefix(t).ok().map(Path::to_path_buf))
        .map(|rel| rel.display().to_string())
        .filter(|rel| !rel.is_empty())
        .unwrap_or_else(|| root.display().to_string())
}
