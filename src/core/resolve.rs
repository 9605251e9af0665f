//! # Configuration Resolver Module / 配置解析模块
//!
//! Turns the directory-wide files, a test's own suffix-named files and the
//! process environment into the effective configuration of one test.
//!
//! Reading happens in two I/O passes ([`load_directory_files`] once per
//! directory, [`gather_test_inputs`] and [`read_option_files`] once per test).
//! Everything in between is an ordered list of pure steps over [`TestConfig`],
//! so each precedence rule can be exercised without touching the disk.
//!
//! 将目录级文件、测试自身的后缀命名文件以及进程环境变量合并为单个测试的有效配置。
//! 读取分为两个 I/O 阶段；其间是一系列作用于 [`TestConfig`] 的纯函数步骤，
//! 因此每条优先级规则都可以在不访问磁盘的情况下单独测试。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::core::config::{DirectoryContext, EnvMap, FuturesMode, Settings};
use crate::core::errors::HarnessError;
use crate::core::models::{TestCase, TestKind};
use crate::core::planner;
use crate::core::trials::TrialPolicy;
use crate::infra::fs;

/// Contents of the directory-wide configuration files.
///
/// 目录级配置文件的内容。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryFiles {
    /// `COMPOPTS` (or `<LABEL>COMPOPTS` in perf mode), one variant per line.
    pub compopts: Vec<String>,
    pub lastcompopts: Vec<String>,
    pub chpldoc_opts: Vec<String>,
    /// First line of `EXECOPTS`, split into words.
    pub execopts: Vec<String>,
    pub lastexecopts: Vec<String>,
    pub compenv: Vec<(String, String)>,
    pub execenv: Vec<(String, String)>,
    pub numlocales: Option<u32>,
    /// Raw `TIMEOUT` value; whether it is honoured is decided later.
    pub timeout: Option<u64>,
    pub kill_timeout: Option<u64>,
    pub num_trials: Option<u32>,
    pub noexec: bool,
    pub novgrbin: bool,
    pub compstdin: Option<PathBuf>,
    pub catfiles: Vec<String>,
    pub precomp: Option<PathBuf>,
    pub prediff: Option<PathBuf>,
    pub preexec: Option<PathBuf>,
}

/// `<LABEL><NAME>` in perf mode, plain `<NAME>` otherwise.
pub fn label_dir_file(settings: &Settings, name: &str) -> String {
    format!("{}{}", settings.perf_label().to_uppercase(), name)
}

/// `.<label><suffix>` in perf mode, plain `.<suffix>` otherwise.
pub fn label_suffix(settings: &Settings, suffix: &str) -> String {
    format!(".{}{}", settings.perf_label(), suffix)
}

fn to_u64(value: i64, path: &Path, localdir: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| HarnessError::invalid_integer(path, localdir).into())
}

fn to_u32(value: i64, path: &Path, localdir: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| HarnessError::invalid_integer(path, localdir).into())
}

fn read_words(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(text.split_whitespace().map(str::to_string).collect())
}

/// Parses `VAR=value` lines; anything without `=` is ignored.
pub fn parse_env_lines(lines: &[String]) -> Vec<(String, String)> {
    lines
        .iter()
        .filter_map(|line| match line.split_once('=') {
            Some((var, val)) => Some((var.trim().to_string(), val.trim().to_string())),
            None => {
                tracing::warn!(line = %line, "ignoring environment line without '='");
                None
            }
        })
        .collect()
}

fn first_line_words(lines: &[String], path: &Path) -> Result<Vec<String>> {
    match lines.first() {
        None => Ok(Vec::new()),
        Some(line) => shlex::split(line).ok_or_else(|| {
            HarnessError::fatal(format!("Cannot parse {} as shell words", path.display())).into()
        }),
    }
}

/// Reads every directory-wide file in `root`. Malformed integer files are fatal.
///
/// 读取 `root` 中的所有目录级文件。格式错误的整数文件是致命错误。
pub async fn load_directory_files(
    root: &Path,
    localdir: &str,
    settings: &Settings,
    env: &EnvMap,
) -> Result<DirectoryFiles> {
    let path = |name: &str| root.join(name);
    let readable = |name: &str| fs::is_readable_file(&root.join(name));
    let mut files = DirectoryFiles::default();

    let perf_compopts = label_dir_file(settings, "COMPOPTS");
    if settings.is_perf() && readable(&perf_compopts) {
        files.compopts = fs::read_file_with_comments(&path(&perf_compopts), env, true).await?;
    } else if readable("COMPOPTS") {
        files.compopts = fs::read_file_with_comments(&path("COMPOPTS"), env, true).await?;
    }
    if readable("LASTCOMPOPTS") {
        files.lastcompopts = read_words(&path("LASTCOMPOPTS"))?;
    }
    if readable("CHPLDOCOPTS") {
        let lines = fs::read_file_with_comments(&path("CHPLDOCOPTS"), env, true).await?;
        files.chpldoc_opts = first_line_words(&lines, &path("CHPLDOCOPTS"))?;
    }
    let perf_execopts = label_dir_file(settings, "EXECOPTS");
    let execopts_file = if settings.is_perf() && readable(&perf_execopts) {
        Some(perf_execopts)
    } else if readable("EXECOPTS") {
        Some("EXECOPTS".to_string())
    } else {
        None
    };
    if let Some(name) = execopts_file {
        let lines = fs::read_file_with_comments(&path(&name), env, true).await?;
        files.execopts = first_line_words(&lines, &path(&name))?;
    }
    if readable("LASTEXECOPTS") {
        files.lastexecopts = read_words(&path("LASTEXECOPTS"))?;
    }
    if readable("COMPENV") {
        files.compenv = parse_env_lines(&fs::read_file_with_comments(&path("COMPENV"), env, true).await?);
    }
    if readable("EXECENV") {
        files.execenv = parse_env_lines(&fs::read_file_with_comments(&path("EXECENV"), env, true).await?);
    }

    let numlocales = label_dir_file(settings, "NUMLOCALES");
    if readable(&numlocales) {
        let p = path(&numlocales);
        files.numlocales = Some(to_u32(fs::read_integer_value(&p, env, localdir).await?, &p, localdir)?);
    }
    if readable("TIMEOUT") {
        let p = path("TIMEOUT");
        files.timeout = Some(to_u64(fs::read_integer_value(&p, env, localdir).await?, &p, localdir)?);
    }
    if readable("KILLTIMEOUT") {
        let p = path("KILLTIMEOUT");
        files.kill_timeout = Some(to_u64(fs::read_integer_value(&p, env, localdir).await?, &p, localdir)?);
    }
    let numtrials = label_dir_file(settings, "NUMTRIALS");
    if readable(&numtrials) {
        let p = path(&numtrials);
        files.num_trials = Some(to_u32(fs::read_integer_value(&p, env, localdir).await?, &p, localdir)?);
    }

    files.noexec = readable("NOEXEC");
    files.novgrbin = readable("NOVGRBIN");
    files.compstdin = readable("COMPSTDIN").then(|| path("COMPSTDIN"));
    if readable("CATFILES") {
        files.catfiles = read_words(&path("CATFILES"))?;
    }
    let hook = |name: &str| fs::is_executable(&root.join(name)).then(|| PathBuf::from(name));
    files.precomp = hook("PRECOMP");
    files.prediff = hook("PREDIFF");
    files.preexec = hook("PREEXEC");

    tracing::debug!(?files, "loaded directory-wide files");
    Ok(files)
}

/// The testable sources of the directory, in sorted order, or exactly
/// `CHPL_ONETEST` when it is set.
///
/// 目录中可测试的源文件（按排序顺序），或在设置了 `CHPL_ONETEST` 时仅该文件。
pub fn discover(ctx: &DirectoryContext) -> Vec<TestCase> {
    let candidates: Vec<&str> = match &ctx.settings.onetest {
        Some(one) => vec![one.as_str()],
        None => ctx.listing.iter().map(String::as_str).collect(),
    };
    candidates
        .into_iter()
        .filter_map(|file| match TestKind::classify(file, ctx.doc_compiler) {
            Some((base, kind)) => Some(TestCase::new(file, base, kind)),
            None => {
                if ctx.settings.onetest.is_some() {
                    tracing::warn!(file, "CHPL_ONETEST does not name a testable source");
                }
                None
            }
        })
        .collect()
}

/// Files that belong to `base`: `<base>.<suffix>` with exactly one further
/// extension. A `.skipif` is moved to the front.
///
/// 属于 `base` 的文件：恰好多一个扩展名的 `<base>.<suffix>`。`.skipif` 被移到最前面。
pub fn test_file_names(listing: &[String], base: &str) -> Vec<String> {
    let mut names: Vec<String> = listing
        .iter()
        .filter(|name| name.rsplit_once('.').is_some_and(|(root, _)| root == base))
        .cloned()
        .collect();
    if let Some(pos) = names.iter().position(|n| n.ends_with(".skipif")) {
        let skipif = names.remove(pos);
        names.insert(0, skipif);
    }
    names
}

/// One fact learned from a test's own files, in file order.
///
/// 从测试自身文件中得到的一条信息，按文件顺序排列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestInput {
    /// Perf mode, and the test has no perf keys or perf options.
    NotPerf,
    NoTest,
    SkipIf { skip: bool },
    /// `.suppressif` evaluated true; the reason is the first comment line.
    Suppress { reason: String },
    /// A predicate failed to produce a verdict.
    PredicateError { kind: &'static str, detail: String },
    Timeout(u64),
    KillTimeout(u64),
    NumTrials(u32),
    NumLocales(u32),
    CatFiles(Vec<String>),
    LastCompOpts(Vec<String>),
    LastExecOpts(Vec<String>),
    /// `.future`, with its first line.
    Future(String),
    NoExec,
    PreComp(String),
    PreDiff(String),
    PreExec(String),
    Stdin(String),
}

impl TestInput {
    /// No further files are consulted after this input.
    fn is_terminal(&self, settings: &Settings) -> bool {
        match self {
            TestInput::NotPerf | TestInput::NoTest | TestInput::PredicateError { .. } => true,
            TestInput::SkipIf { skip } => *skip,
            TestInput::Stdin(_) => settings.no_stdin_redirect,
            _ => false,
        }
    }
}

/// Reads the per-test files of `case` in order, running predicates as they
/// come. Stops at the first input that decides the test will not run.
///
/// 按顺序读取 `case` 的测试专属文件，并在遇到谓词文件时运行它。
/// 一旦某个输入决定测试不会运行便停止。
pub async fn gather_test_inputs(ctx: &DirectoryContext, case: &TestCase) -> Result<Vec<TestInput>> {
    let settings = &ctx.settings;
    let base = &case.name;
    let names = test_file_names(&ctx.listing, base);
    let mut inputs = Vec::new();

    if settings.is_perf() {
        let markers = ["keys", "execopts", "compopts"].map(|s| format!("{base}{}", label_suffix(settings, s)));
        if !markers.iter().any(|m| names.contains(m)) {
            inputs.push(TestInput::NotPerf);
            return Ok(inputs);
        }
    }

    let env = ctx.capability_env();
    let timeout_sfx = label_suffix(settings, "timeout");
    let trials_sfx = label_suffix(settings, "numtrials");
    let locales_sfx = label_suffix(settings, "numlocales");
    let localdir = ctx.localdir.as_str();

    for name in names {
        let path = ctx.root.join(&name);
        if !fs::is_readable_file(&path) {
            continue;
        }
        let suffix = &name[base.len()..];
        let input = match suffix {
            ".notest" if !settings.run_notests => Some(TestInput::NoTest),
            ".skipif" => Some(match run_predicate(ctx, &name, case, ".skipif").await {
                Ok(skip) => TestInput::SkipIf { skip },
                Err(e) => predicate_error(e)?,
            }),
            ".suppressif" => match run_predicate(ctx, &name, case, ".suppressif").await {
                Ok(true) => {
                    let text = match std::fs::read(&path) {
                        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "cannot read suppressif reason");
                            String::new()
                        }
                    };
                    Some(TestInput::Suppress {
                        reason: suppress_reason(&text),
                    })
                }
                Ok(false) => None,
                Err(e) => Some(predicate_error(e)?),
            },
            s if s == timeout_sfx => Some(TestInput::Timeout(to_u64(
                fs::read_integer_value(&path, &env, localdir).await?,
                &path,
                localdir,
            )?)),
            s if s == trials_sfx => Some(TestInput::NumTrials(to_u32(
                fs::read_integer_value(&path, &env, localdir).await?,
                &path,
                localdir,
            )?)),
            ".killtimeout" => Some(TestInput::KillTimeout(to_u64(
                fs::read_integer_value(&path, &env, localdir).await?,
                &path,
                localdir,
            )?)),
            s if s == locales_sfx => Some(TestInput::NumLocales(to_u32(
                fs::read_integer_value(&path, &env, localdir).await?,
                &path,
                localdir,
            )?)),
            ".catfiles" => Some(TestInput::CatFiles(read_words(&path)?)),
            ".lastcompopts" => Some(TestInput::LastCompOpts(read_words(&path)?)),
            ".lastexecopts" => Some(TestInput::LastExecOpts(read_words(&path)?)),
            ".future" => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Some(TestInput::Future(text.lines().next().unwrap_or_default().trim().to_string()))
            }
            ".noexec" => Some(TestInput::NoExec),
            ".precomp" if fs::is_executable(&path) => Some(TestInput::PreComp(name.clone())),
            ".prediff" if fs::is_executable(&path) => Some(TestInput::PreDiff(name.clone())),
            ".preexec" if fs::is_executable(&path) => Some(TestInput::PreExec(name.clone())),
            ".stdin" => Some(TestInput::Stdin(name.clone())),
            _ => None,
        };
        if let Some(input) = input {
            let stop = input.is_terminal(settings);
            inputs.push(input);
            if stop {
                break;
            }
        }
    }
    Ok(inputs)
}

/// Per-test predicate failures become an input; anything else propagates.
fn predicate_error(err: anyhow::Error) -> Result<TestInput> {
    match err.downcast::<HarnessError>() {
        Ok(HarnessError::PerTestConfig { kind, detail, .. }) => {
            Ok(TestInput::PredicateError { kind, detail })
        }
        Ok(other) => Err(other.into()),
        Err(other) => Err(other),
    }
}

/// First `#` line that is not a shebang, with the `#`s removed.
pub fn suppress_reason(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| l.starts_with('#') && !l.starts_with("#!"))
        .map(|l| l.replace('#', "").trim().to_string())
        .unwrap_or_default()
}

/// Interprets a predicate's trimmed standard output.
///
/// `True`/`False`, or an integer where zero is false. Anything else is `None`.
pub fn parse_predicate_output(stdout: &str) -> Option<bool> {
    match stdout.trim() {
        "True" => Some(true),
        "False" => Some(false),
        other => other.parse::<i64>().ok().map(|n| n != 0),
    }
}

/// Runs a `.skipif` / `.suppressif` through the `testEnv` helper with the
/// capability environment injected.
///
/// 通过 `testEnv` 辅助程序运行 `.skipif` / `.suppressif`，并注入能力环境变量。
async fn run_predicate(
    ctx: &DirectoryContext,
    file: &str,
    case: &TestCase,
    kind: &'static str,
) -> Result<bool> {
    let test = case.qualified_name(&ctx.localdir);
    let per_test = |detail: String| HarnessError::PerTestConfig {
        kind,
        test: test.clone(),
        detail,
    };
    let helper = ctx.helper("testEnv");
    let output = tokio::process::Command::new(&helper)
        .arg(format!("./{file}"))
        .current_dir(&ctx.root)
        .env_clear()
        .envs(ctx.capability_env())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| per_test(format!("cannot run {}: {}", helper.display(), e)))?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let mut detail = stderr.clone();
    if !output.status.success() {
        if !detail.is_empty() {
            detail.push('\n');
        }
        detail.push_str(&format!("exit status {}", output.status.code().unwrap_or(-1)));
    }
    if !stderr.is_empty() || !output.status.success() {
        return Err(per_test(detail).into());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_predicate_output(&stdout).ok_or_else(|| {
        per_test(format!("invalid literal for a predicate result: '{}'", stdout.trim())).into()
    })
}

/// Where a test's standard input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinRedirect {
    /// `CHPL_NO_STDIN_REDIRECT`: the harness's own stdin is inherited.
    Disabled,
    DevNull,
    File(String),
}

/// Whether, and why not, a test runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Run,
    /// The record to print, e.g. `[Skipping future test: dir/t]`.
    Skip(String),
    /// A predicate failed; only this test is abandoned.
    ConfigError { kind: &'static str, detail: String },
}

/// The effective configuration of one test, built up step by step.
///
/// 单个测试的有效配置，逐步构建。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    pub timeout_secs: u64,
    pub kill_timeout_secs: u64,
    pub num_trials: u32,
    pub num_locales: u32,
    /// ` -nl <n>`, appended to every execution variant.
    pub locale_args: Option<String>,
    pub catfiles: Vec<String>,
    pub lastcompopts: Vec<String>,
    pub lastexecopts: Vec<String>,
    /// `Future (<reason>) ` or `Suppress (<reason>) ` prefix for result records.
    pub future: Option<String>,
    pub has_future_file: bool,
    pub has_skipif_file: bool,
    pub execute: bool,
    pub stdin: StdinRedirect,
    pub precomp: Option<String>,
    pub prediff: Option<String>,
    pub preexec: Option<String>,
    pub trial_policy: TrialPolicy,
    /// Records produced while resolving, printed before anything else.
    pub notes: Vec<String>,
    pub gate: Gate,
}

impl TestConfig {
    pub fn runs(&self) -> bool {
        self.gate == Gate::Run
    }

    pub fn future_prefix(&self) -> &str {
        self.future.as_deref().unwrap_or("")
    }
}

/// Overrides are honoured only strictly inside the band between the compiled
/// default and the global ceiling.
pub fn within_band(value: u64, default: u64, ceiling: u64) -> bool {
    let (lo, hi) = (default.min(ceiling), default.max(ceiling));
    value > lo && value < hi
}

/// A named pure resolution step.
pub type Step = fn(TestConfig, &DirectoryContext, &TestCase) -> TestConfig;

/// The pipeline applied after [`directory_defaults`] and [`apply_inputs`].
pub const GATE_STEPS: &[(&str, Step)] = &[
    ("futures", futures_gate),
    ("kind", kind_gate),
    ("locales", locale_gate),
    ("trials", trial_step),
];

/// Resolves one test from its gathered inputs.
///
/// 根据收集到的输入解析单个测试。
pub fn resolve_test(ctx: &DirectoryContext, case: &TestCase, inputs: &[TestInput]) -> TestConfig {
    let mut config = apply_inputs(directory_defaults(ctx, case), ctx, case, inputs);
    for (name, step) in GATE_STEPS {
        if !config.runs() {
            break;
        }
        config = step(config, ctx, case);
        tracing::trace!(step = name, gate = ?config.gate, "resolution step");
    }
    config
}

/// Step 1: directory-wide values shared by every test.
pub fn directory_defaults(ctx: &DirectoryContext, case: &TestCase) -> TestConfig {
    let settings = &ctx.settings;
    let files = &ctx.files;
    let default = settings.default_timeout_secs();
    let global = settings.global_timeout_secs();
    let timeout_secs = match files.timeout {
        Some(t) if within_band(t, default, global) => t,
        _ => global,
    };
    TestConfig {
        timeout_secs,
        kill_timeout_secs: files.kill_timeout.unwrap_or(settings.kill_timeout_secs),
        num_trials: files.num_trials.unwrap_or(settings.num_trials),
        num_locales: files.numlocales.unwrap_or(settings.env_numlocales),
        locale_args: None,
        catfiles: files.catfiles.clone(),
        lastcompopts: files.lastcompopts.clone(),
        lastexecopts: files.lastexecopts.clone(),
        future: None,
        has_future_file: false,
        has_skipif_file: false,
        execute: !files.noexec && !case.kind.is_doc(),
        stdin: if settings.no_stdin_redirect {
            StdinRedirect::Disabled
        } else {
            StdinRedirect::DevNull
        },
        precomp: None,
        prediff: None,
        preexec: None,
        trial_policy: TrialPolicy {
            num_trials: 1,
            skip_threshold: None,
            warn_threshold: None,
        },
        notes: Vec::new(),
        gate: Gate::Run,
    }
}

/// Step 2: fold the test's own files over the directory defaults, in file order.
pub fn apply_inputs(
    mut config: TestConfig,
    ctx: &DirectoryContext,
    case: &TestCase,
    inputs: &[TestInput],
) -> TestConfig {
    let settings = &ctx.settings;
    let qualified = case.qualified_name(&ctx.localdir);
    for input in inputs {
        match input {
            TestInput::NotPerf => {
                config.gate = Gate::Skip(format!("[Skipping noperf test: {qualified}]"));
            }
            TestInput::NoTest => {
                config.gate = Gate::Skip(format!("[Skipping notest test: {qualified}]"));
            }
            TestInput::SkipIf { skip } => {
                config.has_skipif_file = true;
                if *skip {
                    config.gate = Gate::Skip(format!(
                        "[Skipping test based on .skipif environment settings: {qualified}]"
                    ));
                }
            }
            TestInput::Suppress { reason } => {
                config.future = Some(format!("Suppress ({reason}) "));
            }
            TestInput::PredicateError { kind, detail } => {
                config.gate = Gate::ConfigError {
                    kind,
                    detail: detail.clone(),
                };
            }
            TestInput::Timeout(t) => {
                if within_band(*t, settings.default_timeout_secs(), settings.global_timeout_secs()) {
                    config.timeout_secs = *t;
                    config.notes.push(format!("[Overriding default timeout with {t}]"));
                }
            }
            TestInput::KillTimeout(t) => config.kill_timeout_secs = *t,
            TestInput::NumTrials(n) => {
                if *n >= 1 {
                    config.num_trials = *n;
                }
            }
            TestInput::NumLocales(n) => config.num_locales = *n,
            TestInput::CatFiles(files) => config.catfiles.extend(files.iter().cloned()),
            TestInput::LastCompOpts(opts) => config.lastcompopts.extend(opts.iter().cloned()),
            TestInput::LastExecOpts(opts) => config.lastexecopts.extend(opts.iter().cloned()),
            TestInput::Future(reason) => {
                config.has_future_file = true;
                config.future = Some(format!("Future ({reason}) "));
            }
            TestInput::NoExec => config.execute = false,
            TestInput::PreComp(f) => config.precomp = Some(f.clone()),
            TestInput::PreDiff(f) => config.prediff = Some(f.clone()),
            TestInput::PreExec(f) => config.preexec = Some(f.clone()),
            TestInput::Stdin(f) => {
                if config.stdin == StdinRedirect::Disabled {
                    config.gate = Gate::Skip(format!(
                        "[Skipping test with .stdin input since -nostdinredirect is given: {qualified}]"
                    ));
                } else {
                    config.stdin = StdinRedirect::File(f.clone());
                }
            }
        }
        if !config.runs() {
            break;
        }
    }
    config
}

/// Step 3: `CHPL_TEST_FUTURES`.
pub fn futures_gate(mut config: TestConfig, ctx: &DirectoryContext, case: &TestCase) -> TestConfig {
    let qualified = case.qualified_name(&ctx.localdir);
    let skip = match ctx.settings.futures {
        FuturesMode::Exclude if config.has_future_file => Some("future test"),
        FuturesMode::Only if !config.has_future_file => Some("non-future test"),
        FuturesMode::WithSkipIf if config.has_future_file && !config.has_skipif_file => {
            Some("future test without a skipif")
        }
        _ => None,
    };
    if let Some(what) = skip {
        config.gate = Gate::Skip(format!("[Skipping {what}: {qualified}]"));
    }
    config
}

/// Step 4: native tests that cannot run in this configuration.
pub fn kind_gate(mut config: TestConfig, ctx: &DirectoryContext, case: &TestCase) -> TestConfig {
    let qualified = case.qualified_name(&ctx.localdir);
    let caps = ctx.capabilities();
    if case.kind.is_c_family() && caps.launcher != "none" {
        config.gate = Gate::Skip(format!("[Skipping {} test: {qualified}]", case.kind.language()));
    } else if case.kind.is_multilocale_only() && !caps.multilocale() {
        config.gate = Gate::Skip(format!(
            "[Skipping multilocale-only {} test: {qualified}]",
            case.kind.language()
        ));
    }
    config
}

/// Step 5: locale count, against what the machine offers.
pub fn locale_gate(mut config: TestConfig, ctx: &DirectoryContext, case: &TestCase) -> TestConfig {
    let n = config.num_locales;
    if n == 0 || !ctx.capabilities().multilocale() || case.kind.is_c_family() {
        config.locale_args = None;
        return config;
    }
    let qualified = case.qualified_name(&ctx.localdir);
    if let Some(max) = ctx.settings.max_locales {
        if n > max {
            config.gate = Gate::Skip(format!(
                "[Skipping test {qualified} because it requires {n} locales but only {max} are available]"
            ));
            return config;
        }
    }
    if ctx.settings.multilocale_only && n <= 1 && !case.kind.is_multilocale_only() {
        config.gate = Gate::Skip(format!(
            "[Skipping {qualified} because it does not use more than one locale]"
        ));
        return config;
    }
    config.locale_args = Some(format!(" -nl {n}"));
    config
}

/// Step 6: the trial policy. A test whose timeout exceeds the global one runs once.
pub fn trial_step(mut config: TestConfig, ctx: &DirectoryContext, case: &TestCase) -> TestConfig {
    let settings = &ctx.settings;
    let (policy, lowered) = TrialPolicy::for_test(
        config.num_trials,
        config.timeout_secs,
        settings.global_timeout_secs(),
        settings.exec_time_warn_limit,
        settings.exec_time_skip_trials,
    );
    if lowered {
        config.notes.push(format!("[Lowering number of trials for {} to 1]", case.name));
    }
    config.num_trials = policy.num_trials;
    config.trial_policy = policy;
    config
}

/// Option lists and environment overlays of a test that will run.
///
/// 将要运行的测试的选项列表和环境变量覆盖。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOptions {
    /// Directory × test compile lines, already merged.
    pub compile_lines: Vec<String>,
    pub exec_lines: Vec<String>,
    pub compenv: Vec<(String, String)>,
    pub execenv: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

impl TestOptions {
    /// Process environment with the compile overlay applied.
    pub fn compile_env(&self, ctx: &DirectoryContext) -> EnvMap {
        overlay(&ctx.process_env, &self.compenv)
    }

    pub fn exec_env(&self, ctx: &DirectoryContext) -> EnvMap {
        overlay(&ctx.process_env, &self.execenv)
    }
}

fn overlay(base: &EnvMap, pairs: &[(String, String)]) -> EnvMap {
    let mut env = base.clone();
    env.extend(pairs.iter().cloned());
    env
}

/// Reads a test's option and environment files. Directory-wide values come
/// first and the test's own augment them.
///
/// 读取测试的选项文件和环境文件。目录级的值在前，测试自身的值对其进行补充。
pub async fn read_option_files(ctx: &DirectoryContext, case: &TestCase) -> Result<TestOptions> {
    let settings = &ctx.settings;
    let env = ctx.capability_env();
    let base = &case.name;
    let mut options = TestOptions::default();

    let doc_file = format!("{base}.chpldocopts");
    let comp_file = format!("{base}{}", label_suffix(settings, "compopts"));
    let (opts_file, what) = if case.kind.is_doc() && fs::is_readable_file(&ctx.root.join(&doc_file)) {
        (Some(doc_file), "chpldocopts")
    } else if fs::is_readable_file(&ctx.root.join(&comp_file)) {
        (Some(comp_file), "compopts")
    } else {
        (None, "compopts")
    };
    let mut test_compopts = Vec::new();
    if let Some(file) = opts_file {
        let path = ctx.root.join(&file);
        test_compopts = fs::read_file_with_comments(&path, &env, false).await?;
        if std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(false) {
            options
                .warnings
                .push(format!("[Warning: ignoring an empty {what} file {file}]"));
        }
    }
    options.compile_lines = planner::merge_compile_lines(&ctx.files.compopts, &test_compopts);

    let exec_file = ctx.root.join(format!("{base}{}", label_suffix(settings, "execopts")));
    if fs::is_readable_file(&exec_file) {
        options.exec_lines = fs::read_file_with_comments(&exec_file, &env, false).await?;
    }

    options.compenv = ctx.files.compenv.clone();
    let compenv_file = ctx.root.join(format!("{base}{}", label_suffix(settings, "compenv")));
    if fs::is_readable_file(&compenv_file) {
        options
            .compenv
            .extend(parse_env_lines(&fs::read_file_with_comments(&compenv_file, &env, true).await?));
    }
    options.execenv = ctx.files.execenv.clone();
    let execenv_file = ctx.root.join(format!("{base}{}", label_suffix(settings, "execenv")));
    if fs::is_readable_file(&execenv_file) {
        options
            .execenv
            .extend(parse_env_lines(&fs::read_file_with_comments(&execenv_file, &env, true).await?));
    }
    Ok(options)
}
