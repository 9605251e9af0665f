//! # Test Driver Module / 测试驱动模块
//!
//! The state machine that walks one directory: for every discovered test it
//! resolves the configuration, then for every compile variant builds the test,
//! and for every execution variant runs the binary (once per trial) and
//! compares its output with the resolved golden file.
//!
//! Control flow is strictly sequential. Each failure is reported as a
//! bracketed record and the driver moves on; only fatal configuration errors
//! propagate out of [`run_directory`].
//!
//! 遍历单个目录的状态机：对每个发现的测试解析其配置，然后对每个编译变体构建测试，
//! 对每个执行变体运行程序（每次试运行一次）并将输出与解析出的期望输出文件比较。
//! 控制流严格顺序执行；每个失败都以方括号记录报告后继续，只有致命配置错误会从
//! [`run_directory`] 传播出去。

use anyhow::Result;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::classify;
use crate::core::compare;
use crate::core::config::{DirectoryContext, EnvMap, TimeoutMode};
use crate::core::errors;
use crate::core::goodfile::GoodFileResolver;
use crate::core::models::{
    BadFileMatch, ExecutionResult, FailureReason, Phase, TestCase, TestKind, VariantRecord, Verdict,
};
use crate::core::planner::{GoodFileSpec, MatrixPlan, OptionVariant, plan_matrix};
use crate::core::resolve::{self, Gate, StdinRedirect, TestConfig, TestOptions};
use crate::core::trials::{self, Timed, TrialControl};
use crate::infra::command::{self, OutputMerge, RunRequest, StdinSource, TimeoutStrategy};
use crate::infra::fs;
use crate::infra::hooks::{self, Hook, HookArgs, HookScope, Stage};
use crate::infra::limiter::ExecLimiter;
use crate::reporting::console;

/// Everything a directory run produced.
///
/// 一次目录运行产生的全部结果。
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started: DateTime<Local>,
    pub elapsed: Duration,
    pub records: Vec<VariantRecord>,
}

/// Runs every test of the directory described by `ctx`.
///
/// # Errors / 错误
/// Only fatal configuration errors (and I/O failures of the harness itself)
/// are returned; test failures are reported and recorded.
pub async fn run_directory(ctx: &DirectoryContext) -> Result<RunSummary> {
    let started = Local::now();
    let clock = Instant::now();
    console::starting(&started.format("%a %b %d %H:%M:%S %Z %Y").to_string());
    for (what, hooks) in [
        ("preexec", &ctx.settings.system_preexecs),
        ("prediff", &ctx.settings.system_prediffs),
    ] {
        if !hooks.is_empty() {
            let joined: Vec<String> = hooks.iter().map(|h| h.display().to_string()).collect();
            console::record(&format!("[system-wide {what}(s): '{}']", joined.join(", ")));
        }
    }

    let driver = Driver::new(ctx);
    let mut records = Vec::new();
    for case in resolve::discover(ctx) {
        match driver.run_test(&case).await {
            Ok(produced) => records.extend(produced),
            Err(e) if errors::find_fatal(&e).is_some() => return Err(e),
            Err(e) => records.push(driver.harness_failure(&case, None, (0, 0, 0), "", &e)),
        }
    }

    let elapsed = clock.elapsed();
    console::finished(&ctx.localdir, elapsed.as_secs_f64());
    Ok(RunSummary {
        started,
        elapsed,
        records,
    })
}

struct Driver<'a> {
    ctx: &'a DirectoryContext,
    limiter: ExecLimiter,
    goodfiles: GoodFileResolver,
    compiler: String,
}

/// A test that passed its gates, with everything needed to run its matrix.
struct ActiveTest<'a> {
    case: &'a TestCase,
    qualified: String,
    exec_name: String,
    config: TestConfig,
    options: TestOptions,
    plan: MatrixPlan,
}

/// The compiler invocation for one compile variant.
struct CompileCommand {
    program: String,
    args: Vec<String>,
}

/// One execution variant, fully assembled.
struct ExecSpec<'a> {
    compile: &'a OptionVariant,
    exec: &'a OptionVariant,
    program: String,
    args: Vec<String>,
    stdin: StdinSource,
    stdin_display: Option<String>,
    env: EnvMap,
    execlog: String,
    pre_exec_output: Vec<u8>,
}

/// What one trial produced.
struct TrialRun {
    result: ExecutionResult,
    record: VariantRecord,
}

impl Timed for TrialRun {
    fn elapsed(&self) -> Duration {
        self.result.elapsed
    }
}

impl<'a> Driver<'a> {
    fn new(ctx: &'a DirectoryContext) -> Self {
        Self {
            ctx,
            limiter: ExecLimiter::from_settings(&ctx.settings),
            goodfiles: GoodFileResolver::for_directory(ctx),
            compiler: ctx.compiler.display().to_string(),
        }
    }

    fn record(&self, test: &ActiveTest<'_>, phase: Phase, nums: (u32, u32, u32), verdict: Verdict) -> VariantRecord {
        VariantRecord {
            directory: self.ctx.localdir.clone(),
            test: test.case.name.clone(),
            phase,
            compile_num: nums.0,
            exec_num: nums.1,
            trial: nums.2,
            verdict,
            future: test.config.future.clone(),
            bad_file: None,
            elapsed_secs: 0.0,
        }
    }

    /// Resolves, builds and runs one test.
    async fn run_test(&self, case: &TestCase) -> Result<Vec<VariantRecord>> {
        let ctx = self.ctx;
        let qualified = case.qualified_name(&ctx.localdir);
        console::record(&format!("[test: {}/{}]", ctx.localdir, case.source));

        let inputs = resolve::gather_test_inputs(ctx, case).await?;
        let config = resolve::resolve_test(ctx, case, &inputs);
        for note in &config.notes {
            console::record(note);
        }
        let skipped = |reason: String| VariantRecord {
            directory: ctx.localdir.clone(),
            test: case.name.clone(),
            phase: Phase::Compile,
            compile_num: 0,
            exec_num: 0,
            trial: 0,
            verdict: Verdict::Skipped { reason },
            future: config.future.clone(),
            bad_file: None,
            elapsed_secs: 0.0,
        };
        match &config.gate {
            Gate::Run => {}
            Gate::Skip(message) => {
                console::record(message);
                return Ok(vec![skipped(message.clone())]);
            }
            Gate::ConfigError { kind, detail } => {
                console::echo(detail);
                console::record(&format!("[Error processing {kind} file for {qualified}]"));
                console::end_of_test(&qualified, 0.0);
                let mut record = skipped(detail.clone());
                record.verdict = Verdict::Failed {
                    reason: FailureReason::Configuration,
                    annotation: Some(format!("{kind}: {detail}")),
                };
                return Ok(vec![record]);
            }
        }

        let options = resolve::read_option_files(ctx, case).await?;
        for warning in &options.warnings {
            console::record(warning);
        }
        let plan = plan_matrix(&options.compile_lines, &options.exec_lines);
        let exec_name = if ctx.settings.uniquify_exe {
            format!("{}.{}", case.name, std::process::id())
        } else {
            case.name.clone()
        };
        let test = ActiveTest {
            case,
            qualified,
            exec_name,
            config,
            options,
            plan,
        };

        let start = Instant::now();
        let mut records = Vec::new();
        for compile in &test.plan.compiles {
            match self.run_compile_variant(&test, compile).await {
                Ok(Some(mut produced)) => records.append(&mut produced),
                Ok(None) => break,
                Err(e) if errors::find_fatal(&e).is_some() => return Err(e),
                Err(e) => {
                    self.cleanup(&test.exec_name);
                    records.push(self.harness_failure(
                        case,
                        test.config.future.as_ref(),
                        (compile.num, 0, 0),
                        &test.plan.variation(compile, None),
                        &e,
                    ));
                }
            }
        }
        console::end_of_test(&test.qualified, start.elapsed().as_secs_f64());
        Ok(records)
    }

    /// Builds one compile variant and, when it succeeds, runs its execution
    /// variants. `None` abandons the remaining compile variants.
    async fn run_compile_variant(
        &self,
        test: &ActiveTest<'_>,
        compile: &OptionVariant,
    ) -> Result<Option<Vec<VariantRecord>>> {
        let ctx = self.ctx;
        let settings = &ctx.settings;
        let complog = test.plan.compile_log(&test.exec_name, compile);

        let mut precomp = Vec::new();
        if ctx.files.precomp.is_some() {
            precomp.push(Hook::new(Stage::Precomp, HookScope::Directory, "PRECOMP"));
        }
        if let Some(file) = &test.config.precomp {
            precomp.push(Hook::new(Stage::Precomp, HookScope::Test(test.case.name.clone()), file));
        }
        let hook_args = HookArgs {
            exec_name: &test.exec_name,
            log: &complog,
            compiler: &self.compiler,
            prediff_extra: None,
        };
        hooks::run_hooks(&precomp, &hook_args, &ctx.process_env, &ctx.root).await?;

        let Some(command) = self.compile_command(test, compile) else {
            return Ok(None);
        };
        let exec_timeout = Duration::from_secs(test.config.timeout_secs);
        let (stdin, stdin_display) = match &ctx.files.compstdin {
            Some(path) => (StdinSource::File(path.clone()), "./COMPSTDIN".to_string()),
            None => (StdinSource::Null, "/dev/null".to_string()),
        };
        let mut req = RunRequest::new(command.program, command.args);
        req.env = test.options.compile_env(ctx);
        req.stdin = stdin;
        req.current_dir = Some(ctx.root.clone());
        req.timeout = settings.compile_timeout(exec_timeout);
        req.kill_timeout = Duration::from_secs(test.config.kill_timeout_secs);
        req.strategy = self.local_strategy();
        req.merge = OutputMerge::Interleaved;
        console::record(&format!(
            "[Executing compiler {} < {}]",
            req.display_command(),
            stdin_display
        ));

        let result = command::run(&req).await?;
        let variation = test.plan.variation(compile, None);
        let nums = (compile.num, 0, 0);
        if result.timed_out {
            console::record(&format!(
                "{}[Error: Timed out compilation for {}{}]",
                test.config.future_prefix(),
                test.qualified,
                variation
            ));
            console::record("[Compilation output was as follows:]");
            console::echo(&classify::trim_output(&result.output));
            self.cleanup(&test.exec_name);
            let mut record = self.record(test, Phase::Compile, nums, Verdict::failed(FailureReason::CompileTimeout));
            record.elapsed_secs = result.elapsed.as_secs_f64();
            return Ok(Some(vec![record]));
        }

        let mut timed_name = test.qualified.clone();
        if compile.num != 0 {
            timed_name.push_str(&format!(" (compopts: {})", compile.num));
        }
        console::elapsed("compilation time", &timed_name, result.elapsed.as_secs_f64());

        let native_args = if test.case.kind.is_native() {
            req.args.clone()
        } else {
            Vec::new()
        };
        let output = classify::apply_all(&classify::compile_pipeline(&native_args), &result.output_text());

        if !result.success() || !test.config.execute {
            let mut record = self
                .compare_compile_output(test, compile, &req.args, &complog, &output, &timed_name)
                .await?;
            record.elapsed_secs = result.elapsed.as_secs_f64();
            self.cleanup(&test.exec_name);
            return Ok(Some(vec![record]));
        }

        for exec in &test.plan.execs {
            fs::write_artifact(
                &ctx.root.join(test.plan.exec_log(&test.exec_name, compile, exec)),
                output.as_bytes(),
            )?;
        }
        console::record(&format!("[Success compiling {}]", test.qualified));
        let mut records = vec![self.record(test, Phase::Compile, nums, Verdict::Passed)];
        records[0].elapsed_secs = result.elapsed.as_secs_f64();

        if settings.compile_only {
            console::record("[Note: Not executing or comparing the output due to -noexec flags]");
            self.cleanup(&test.exec_name);
            return Ok(Some(records));
        }

        records.extend(self.run_exec_variants(test, compile, &output).await?);
        self.cleanup(&test.exec_name);
        Ok(Some(records))
    }

    /// The compiler, or `None` when the documentation tool is missing.
    fn compile_command(&self, test: &ActiveTest<'_>, compile: &OptionVariant) -> Option<CompileCommand> {
        let ctx = self.ctx;
        let settings = &ctx.settings;
        let case = test.case;
        let words = compile.words();

        if case.kind.is_native() {
            let tc = &settings.toolchain;
            let (program, host) = match case.kind {
                TestKind::C => (tc.c_compiler.clone(), false),
                TestKind::Cpp => (tc.cxx_compiler.clone(), false),
                TestKind::MultiLocaleC => (tc.host_c_compiler.clone().unwrap_or_else(|| tc.c_compiler.clone()), true),
                _ => (tc.host_cxx_compiler.clone().unwrap_or_else(|| tc.cxx_compiler.clone()), true),
            };
            let mut args = Vec::new();
            if host {
                args.extend(tc.runtime_includes.split_whitespace().map(str::to_string));
            }
            args.extend(["-o".to_string(), case.name.clone()]);
            args.extend(words);
            args.push(case.source.clone());
            args.extend(test.config.lastcompopts.iter().cloned());
            return Some(CompileCommand { program, args });
        }

        let mut args = Vec::new();
        let mut compiler = self.compiler.clone();
        if case.kind.is_doc() {
            args.extend(ctx.files.chpldoc_opts.iter().cloned());
            args.extend(settings.env_chpldocopts.iter().cloned());
            args.extend(words);
            if !ctx.doc_compiler {
                compiler.push_str("doc");
                if !fs::is_executable(Path::new(&compiler)) {
                    console::record(&format!(
                        "[Warning: Could not find chpldoc, skipping test {}]",
                        test.qualified
                    ));
                    return None;
                }
            }
        } else {
            if !settings.no_use_o {
                args.extend(["-o".to_string(), test.exec_name.clone()]);
            }
            args.extend(settings.env_compopts.iter().cloned());
            args.extend(words);
        }
        args.push(case.source.clone());

        let (program, mut args) = if settings.valgrind_compiler {
            let home = settings.chpl_home.clone().unwrap_or_default();
            let mut wrapped: Vec<String> = settings.valgrind_opts.split_whitespace().map(str::to_string).collect();
            wrapped.push("--gen-suppressions=all".to_string());
            wrapped.push(format!(
                "--suppressions={}",
                home.join("compiler/etc/valgrind.suppressions").display()
            ));
            wrapped.push("-q".to_string());
            wrapped.push(compiler);
            wrapped.extend(args);
            ("valgrind".to_string(), wrapped)
        } else {
            (compiler, args)
        };
        args.extend(test.config.lastcompopts.iter().cloned());
        Some(CompileCommand { program, args })
    }

    /// Failed compile, or a test that is not executed: compare the compiler's
    /// own output with the golden file.
    async fn compare_compile_output(
        &self,
        test: &ActiveTest<'_>,
        compile: &OptionVariant,
        args: &[String],
        complog: &str,
        output: &str,
        timed_name: &str,
    ) -> Result<VariantRecord> {
        let ctx = self.ctx;
        let nums = (compile.num, 0, 0);
        let variation = test.plan.variation(compile, None);
        let future = test.config.future_prefix();

        let mut log = output.as_bytes().to_vec();
        log.extend(self.cat_files(test).await?);
        let complog_path = ctx.root.join(complog);
        fs::write_artifact(&complog_path, &log)?;

        let hook_args = HookArgs {
            exec_name: &test.exec_name,
            log: complog,
            compiler: &self.compiler,
            prediff_extra: Some(self.prediff_extra(compile, args)),
        };
        hooks::run_hooks(&self.prediff_hooks(test), &hook_args, &ctx.process_env, &ctx.root).await?;

        let (good_name, good) = self.find_good(&test.plan.compile_good(&test.case.name, compile));
        if let Some(message) = classify::classify_compile(output) {
            console::record(&format!("[Error {message} for {timed_name}]"));
            console::record("[Compiler output was as follows:]");
            console::echo(output);
            return Ok(self.record(
                test,
                Phase::Compile,
                nums,
                Verdict::Failed {
                    reason: FailureReason::KnownInfrastructure,
                    annotation: Some(message.to_string()),
                },
            ));
        }

        if !fs::is_readable_file(&good) {
            let reason = if ctx.settings.is_perf() || test.config.execute {
                console::record(&format!("[Error compilation failed for {timed_name}]"));
                FailureReason::CompileFailed
            } else {
                console::record(&format!(
                    "[Error cannot locate compiler output comparison file {}/{}]",
                    ctx.localdir, good_name
                ));
                FailureReason::MissingGoodFile
            };
            console::record("[Compiler output was as follows:]");
            console::echo(output);
            return Ok(self.record(test, Phase::Compile, nums, Verdict::failed(reason)));
        }

        let matched = compare::compare_files(&good, &complog_path)?;
        if matched {
            fs::remove_if_exists(&complog_path);
        }
        console::record(&format!(
            "{future}[{} matching compiler output for {}{}]",
            if matched { "Success" } else { "Error" },
            test.qualified,
            variation
        ));
        if !matched && (test.config.prediff.is_some() || ctx.files.prediff.is_some()) {
            console::record("[Compiler output before prediff was as follows:]");
            console::echo(output);
        }

        let mut record = self.record(
            test,
            Phase::Compile,
            nums,
            if matched {
                Verdict::Passed
            } else {
                Verdict::failed(FailureReason::DiffMismatch)
            },
        );
        if !matched {
            record.bad_file = self.compare_bad(test, &complog_path, &variation)?;
        }
        Ok(record)
    }

    /// Runs every execution variant of one successful compile. A variant
    /// that cannot be run is recorded and the next one proceeds.
    async fn run_exec_variants(
        &self,
        test: &ActiveTest<'_>,
        compile: &OptionVariant,
        compile_output: &str,
    ) -> Result<Vec<VariantRecord>> {
        let exec_env = test.options.exec_env(self.ctx);
        let mut records = Vec::new();
        for exec in &test.plan.execs {
            match self.run_exec_variant(test, compile, exec, compile_output, &exec_env).await {
                Ok((produced, control)) => {
                    records.extend(produced);
                    if control == TrialControl::Stop {
                        break;
                    }
                }
                Err(e) if errors::find_fatal(&e).is_some() => return Err(e),
                Err(e) => records.push(self.harness_failure(
                    test.case,
                    test.config.future.as_ref(),
                    (compile.num, exec.num, 0),
                    &test.plan.variation(compile, Some(exec)),
                    &e,
                )),
            }
        }
        Ok(records)
    }

    /// Preexec hooks, then every trial of one execution variant. `Stop`
    /// abandons the remaining execution variants.
    async fn run_exec_variant(
        &self,
        test: &ActiveTest<'_>,
        compile: &OptionVariant,
        exec: &OptionVariant,
        compile_output: &str,
        exec_env: &EnvMap,
    ) -> Result<(Vec<VariantRecord>, TrialControl)> {
        let ctx = self.ctx;
        let execlog = test.plan.exec_log(&test.exec_name, compile, exec);
        let mut preexec = Vec::new();
        for path in &ctx.settings.system_preexecs {
            preexec.push(Hook::new(Stage::Preexec, HookScope::System, path));
        }
        if ctx.files.preexec.is_some() {
            preexec.push(Hook::new(Stage::Preexec, HookScope::Directory, "PREEXEC"));
        }
        if let Some(file) = &test.config.preexec {
            preexec.push(Hook::new(Stage::Preexec, HookScope::Test(test.case.name.clone()), file));
        }
        let hook_args = HookArgs {
            exec_name: &test.exec_name,
            log: &execlog,
            compiler: &self.compiler,
            prediff_extra: None,
        };
        hooks::run_hooks(&preexec, &hook_args, &ctx.process_env, &ctx.root).await?;

        let execlog_path = ctx.root.join(&execlog);
        let pre_exec_output = std::fs::read(&execlog_path).unwrap_or_default();
        let variation = test.plan.variation(compile, Some(exec));

        if !fs::is_executable(&ctx.root.join(&test.exec_name)) {
            console::record(&format!(
                "{}[Error could not locate executable {} for {}{}]",
                test.config.future_prefix(),
                test.exec_name,
                test.qualified,
                variation
            ));
            let record = self.record(
                test,
                Phase::Execute,
                (compile.num, exec.num, 0),
                Verdict::failed(FailureReason::MissingExecutable),
            );
            return Ok((vec![record], TrialControl::Stop));
        }

        let Some(spec) = self.exec_spec(test, compile, exec, execlog, pre_exec_output, exec_env)? else {
            return Ok((Vec::new(), TrialControl::Stop));
        };
        let spec = &spec;
        let outcomes = trials::run_trials(&test.config.trial_policy, move |trial| {
            self.run_trial(test, spec, trial, compile_output)
        })
        .await?;
        let records = outcomes.into_iter().map(|o| o.value.record).collect();
        Ok((records, TrialControl::Continue))
    }

    /// Assembles the command line of one execution variant. `None` means the
    /// remaining execution variants are abandoned (the reason was reported).
    fn exec_spec<'s>(
        &self,
        test: &ActiveTest<'_>,
        compile: &'s OptionVariant,
        exec: &'s OptionVariant,
        execlog: String,
        pre_exec_output: Vec<u8>,
        exec_env: &EnvMap,
    ) -> Result<Option<ExecSpec<'s>>> {
        let ctx = self.ctx;
        let settings = &ctx.settings;

        let mut program = format!("./{}", test.exec_name);
        let mut args: Vec<String> = Vec::new();
        if settings.valgrind_executable && !ctx.files.novgrbin {
            args.extend(settings.valgrind_opts.split_whitespace().map(str::to_string));
            args.push("-q".to_string());
            if ctx.capabilities().multilocale() {
                args.push("--trace-children=yes".to_string());
            }
            args.push(program);
            program = "valgrind".to_string();
        }
        if let Some(launchcmd) = &settings.launchcmd {
            let mut words = shlex::split(launchcmd).unwrap_or_default().into_iter();
            if let Some(first) = words.next() {
                let mut wrapped: Vec<String> = words.collect();
                wrapped.push(program);
                wrapped.append(&mut args);
                program = first;
                args = wrapped;
            }
        }
        args.extend(ctx.files.execopts.iter().cloned());
        let mut variant = exec.options.clone();
        if let Some(nl) = &test.config.locale_args {
            variant.push_str(nl);
        }
        args.extend(shlex::split(&variant).unwrap_or_else(|| {
            variant.split_whitespace().map(str::to_string).collect()
        }));
        if !test.case.kind.is_c_family() {
            if let Some(env_execopts) = &settings.env_execopts {
                args.extend(shlex::split(env_execopts).unwrap_or_default());
            }
        }
        if let Some(family) = &settings.launcher_timeout {
            args.extend(command::launcher_timeout_args(
                family,
                Duration::from_secs(test.config.timeout_secs),
            )?);
        }
        args.extend(test.config.lastexecopts.iter().cloned());

        let mut redirect = test.config.stdin.clone();
        if args.len() >= 2 {
            if let Some(idx) = args.iter().position(|a| a == "<") {
                let file = args.get(idx + 1).cloned().unwrap_or_default();
                args.drain(idx..(idx + 2).min(args.len()));
                match &redirect {
                    StdinRedirect::Disabled => {
                        console::record(&format!(
                            "[Skipping test with stdin redirection (\"<\") in execopts since -nostdinredirect is given {}]",
                            test.qualified
                        ));
                        return Ok(None);
                    }
                    StdinRedirect::DevNull => {
                        if !fs::is_readable_file(&ctx.root.join(&file)) {
                            console::record(&format!("[Error: redirection file {file} does not exist]"));
                            return Ok(None);
                        }
                        redirect = StdinRedirect::File(file);
                    }
                    StdinRedirect::File(existing) => {
                        console::record(&format!("[Error: a redirection file already exists: {existing}]"));
                        return Ok(None);
                    }
                }
            }
        }
        let (stdin, stdin_display) = match redirect {
            StdinRedirect::Disabled => (StdinSource::Inherit, None),
            StdinRedirect::DevNull => (StdinSource::Null, Some("/dev/null".to_string())),
            StdinRedirect::File(file) => (StdinSource::File(ctx.root.join(&file)), Some(file)),
        };

        Ok(Some(ExecSpec {
            compile,
            exec,
            program,
            args,
            stdin,
            stdin_display,
            env: exec_env.clone(),
            execlog,
            pre_exec_output,
        }))
    }

    /// One trial: run under the limiter, then compare or record perf keys.
    async fn run_trial(
        &self,
        test: &ActiveTest<'_>,
        spec: &ExecSpec<'_>,
        trial: u32,
        compile_output: &str,
    ) -> Result<(TrialRun, TrialControl)> {
        let ctx = self.ctx;
        let settings = &ctx.settings;
        let future = test.config.future_prefix();
        let variation = test.plan.variation(spec.compile, Some(spec.exec));
        let nums = (spec.compile.num, spec.exec.num, trial);

        let req = RunRequest {
            program: spec.program.clone(),
            args: spec.args.clone(),
            env: spec.env.clone(),
            stdin: spec.stdin.clone(),
            current_dir: Some(ctx.root.clone()),
            timeout: Duration::from_secs(test.config.timeout_secs),
            kill_timeout: Duration::from_secs(test.config.kill_timeout_secs),
            strategy: if settings.launcher_timeout.is_some() {
                TimeoutStrategy::Launcher
            } else {
                self.local_strategy()
            },
            merge: OutputMerge::StdoutThenStderr,
        };

        let result = {
            let _guard = self
                .limiter
                .acquire(&format!("{}/{}", ctx.localdir, test.case.name))
                .await?;
            let redirect = spec
                .stdin_display
                .as_ref()
                .map(|s| format!(" < {s}"))
                .unwrap_or_default();
            console::record(&format!("[Executing program {}{}]", req.display_command(), redirect));
            command::run(&req).await?
        };

        let text = result.output_text().into_owned();
        let classification = classify::classify(&text, compile_output);
        let timed_out = result.timed_out || classification.timeout_like;
        if timed_out {
            console::record(&format!(
                "{future}[Error: Timed out executing program {}{}]",
                test.qualified, variation
            ));
            console::record("[Execution output was as follows:]");
            console::echo(&classify::trim_output(&result.output));
        }

        let mut timed_name = test.qualified.clone();
        let labels: Vec<String> = [("compopts", spec.compile.num), ("execopts", spec.exec.num)]
            .iter()
            .filter(|(_, n)| *n != 0)
            .map(|(what, n)| format!("{what}: {n}"))
            .collect();
        if !labels.is_empty() {
            timed_name.push_str(&format!(" ({})", labels.join(" ")));
        }
        console::elapsed("execution time", &timed_name, result.elapsed.as_secs_f64());
        let policy = &test.config.trial_policy;
        if policy.warns(result.elapsed) {
            if let Some(limit) = policy.warn_threshold {
                console::record(&format!(
                    "[Warning: {} took over {} seconds to execute]",
                    test.qualified,
                    limit.as_secs()
                ));
            }
        }

        let mut output = result.output.clone();
        output.extend(self.cat_files(test).await?);
        let execlog_path = ctx.root.join(&spec.execlog);
        let mut log = spec.pre_exec_output.clone();
        log.extend_from_slice(&output);
        fs::write_artifact(&execlog_path, &log)?;

        let mut record = self.record(test, Phase::Execute, nums, Verdict::failed(FailureReason::ExecTimeout));
        record.elapsed_secs = result.elapsed.as_secs_f64();
        let mut control = TrialControl::Continue;

        if !timed_out {
            let hook_args = HookArgs {
                exec_name: &test.exec_name,
                log: &spec.execlog,
                compiler: &self.compiler,
                prediff_extra: Some(self.prediff_extra(spec.compile, &spec.args)),
            };
            hooks::run_hooks(&self.prediff_hooks(test), &hook_args, &spec.env, &ctx.root).await?;

            if !settings.is_perf() {
                let good_spec = test.plan.exec_good(&test.case.name, spec.compile, spec.exec);
                let (good_name, good) = self.find_good(&good_spec);
                if !fs::is_readable_file(&good) {
                    console::record(&format!(
                        "[Error cannot locate program output comparison file {}/{}]",
                        ctx.localdir, good_name
                    ));
                    console::record("[Execution output was as follows:]");
                    console::echo(&classify::trim_output(&std::fs::read(&execlog_path).unwrap_or_default()));
                    record.verdict = Verdict::failed(FailureReason::MissingGoodFile);
                } else if compare::compare_files(&good, &execlog_path)? {
                    fs::remove_if_exists(&execlog_path);
                    console::record(&format!("{future}[Success matching program output for {}]", test.qualified));
                    record.verdict = Verdict::Passed;
                } else {
                    let annotation = classification.annotation.clone();
                    let shown = annotation.as_deref().map(|a| format!("{a} ")).unwrap_or_default();
                    console::record(&format!(
                        "{future}[Error {shown}matching program output for {}{}]",
                        test.qualified, variation
                    ));
                    let reason = if classification.is_infrastructure() {
                        FailureReason::KnownInfrastructure
                    } else {
                        FailureReason::DiffMismatch
                    };
                    record.verdict = Verdict::Failed { reason, annotation };
                    record.bad_file =
                        self.compare_bad(test, &execlog_path, &test.plan.variation(spec.compile, None))?;
                }
            }
        }

        if settings.is_perf() {
            let (verdict, stop) = self.perf_keys(test, spec, &execlog_path, timed_out, &variation).await?;
            if let Some(verdict) = verdict {
                record.verdict = verdict;
            }
            if stop {
                control = TrialControl::Stop;
            }
        }

        Ok((TrialRun { result, record }, control))
    }

    /// Hands the log to `computePerfStats`. Returns the verdict (none for a
    /// timed-out trial) and whether the remaining trials should be dropped.
    async fn perf_keys(
        &self,
        test: &ActiveTest<'_>,
        spec: &ExecSpec<'_>,
        execlog_path: &Path,
        timed_out: bool,
        variation: &str,
    ) -> Result<(Option<Verdict>, bool)> {
        let ctx = self.ctx;
        let settings = &ctx.settings;
        let Some(perf) = &settings.perf else {
            return Ok((None, false));
        };
        if let Err(e) = std::fs::create_dir_all(&perf.dir) {
            console::record(&format!(
                "[Error creating performance test directory {}: {}]",
                perf.dir.display(),
                e
            ));
            return Ok((Some(Verdict::failed(FailureReason::PerfKeys)), true));
        }

        let base = &test.case.name;
        let keys_sfx = resolve::label_suffix(settings, "keys");
        let default_keys = format!("{base}{keys_sfx}");
        let explicit = spec.exec.good_override.as_ref().or(spec.compile.good_override.as_ref());
        let (perf_name, keyfile) = match explicit {
            None => (base.clone(), default_keys),
            Some(name) => {
                let stripped = name.strip_suffix(keys_sfx.as_str()).unwrap_or(name).to_string();
                let keyfile = if ctx.root.join(name).is_file() && name != base {
                    name.clone()
                } else {
                    default_keys
                };
                (stripped, keyfile)
            }
        };
        let date = perf
            .date
            .clone()
            .unwrap_or_else(|| Local::now().format("%m/%d/%y").to_string());
        let helper = ctx.helper("computePerfStats");
        let args = vec![
            perf_name,
            perf.dir.display().to_string(),
            keyfile,
            spec.execlog.clone(),
            if timed_out { "True" } else { "False" }.to_string(),
            date,
        ];
        console::record(&format!("[Executing {} {}]", helper.display(), args.join(" ")));
        let result =
            command::run_to_completion(&helper.display().to_string(), &args, &ctx.process_env, Some(ctx.root.as_path()))
                .await?;
        console::echo(&result.output_text());

        let ok = result.success();
        let mut verdict = None;
        if !timed_out {
            let future = test.config.future_prefix();
            if ok {
                fs::remove_if_exists(execlog_path);
                console::record(&format!("{future}[Success matching performance keys for {}]", test.qualified));
                verdict = Some(Verdict::Passed);
            } else {
                console::record(&format!(
                    "{future}[Error matching performance keys for {}{}]",
                    test.qualified, variation
                ));
                verdict = Some(Verdict::failed(FailureReason::PerfKeys));
            }
        }
        Ok((verdict, timed_out || !ok))
    }

    /// For a failing future test, compares the log with `<test>.bad`.
    fn compare_bad(&self, test: &ActiveTest<'_>, log: &Path, variation: &str) -> Result<Option<BadFileMatch>> {
        if test.config.future.is_none() {
            return Ok(None);
        }
        let bad = self.ctx.root.join(format!("{}.bad", test.case.name));
        if !fs::is_readable_file(&bad) {
            return Ok(None);
        }
        if compare::compare_bad_files(&bad, log)? {
            fs::remove_if_exists(log);
            console::record(&format!("[Clean match against .bad file for {}{}]", test.qualified, variation));
            Ok(Some(BadFileMatch::Clean))
        } else {
            console::record(&format!("[Error matching .bad file for {}{}]", test.qualified, variation));
            Ok(Some(BadFileMatch::Mismatch))
        }
    }

    /// Reports a test or variant that could not be run and builds its record.
    fn harness_failure(
        &self,
        case: &TestCase,
        future: Option<&String>,
        nums: (u32, u32, u32),
        variation: &str,
        err: &anyhow::Error,
    ) -> VariantRecord {
        let qualified = case.qualified_name(&self.ctx.localdir);
        tracing::warn!(test = %qualified, variation, error = %format!("{err:#}"), "test could not be run");
        console::record(&format!(
            "{}[Error running {}{}: {:#}]",
            future.map(String::as_str).unwrap_or(""),
            qualified,
            variation,
            err
        ));
        VariantRecord {
            directory: self.ctx.localdir.clone(),
            test: case.name.clone(),
            phase: if nums.1 == 0 { Phase::Compile } else { Phase::Execute },
            compile_num: nums.0,
            exec_num: nums.1,
            trial: nums.2,
            verdict: Verdict::Failed {
                reason: FailureReason::HelperFailure,
                annotation: Some(format!("{err:#}")),
            },
            future: future.cloned(),
            bad_file: None,
            elapsed_secs: 0.0,
        }
    }

    fn find_good(&self, spec: &GoodFileSpec) -> (String, PathBuf) {
        let root = &self.ctx.root;
        let name = self
            .goodfiles
            .resolve_with(&spec.base, &spec.suffixes, |candidate| root.join(candidate).is_file());
        let path = root.join(&name);
        (name, path)
    }

    fn prediff_hooks(&self, test: &ActiveTest<'_>) -> Vec<Hook> {
        let mut prediff: Vec<Hook> = self
            .ctx
            .settings
            .system_prediffs
            .iter()
            .map(|p| Hook::new(Stage::Prediff, HookScope::System, p))
            .collect();
        if self.ctx.files.prediff.is_some() {
            prediff.push(Hook::new(Stage::Prediff, HookScope::Directory, "PREDIFF"));
        }
        if let Some(file) = &test.config.prediff {
            prediff.push(Hook::new(Stage::Prediff, HookScope::Test(test.case.name.clone()), file));
        }
        prediff
    }

    /// `("<env COMPOPTS> <variant options>", "<all arguments>")`.
    fn prediff_extra(&self, compile: &OptionVariant, args: &[String]) -> (String, String) {
        (
            format!("{} {}", self.ctx.settings.env_compopts.join(" "), compile.options),
            args.join(" "),
        )
    }

    /// Contents of the catfiles, waiting briefly for late ones.
    async fn cat_files(&self, test: &ActiveTest<'_>) -> Result<Vec<u8>> {
        if test.config.catfiles.is_empty() {
            return Ok(Vec::new());
        }
        let ctx = self.ctx;
        console::record(&format!("[Concatenating extra files: {}.catfiles]", test.case.name));
        let paths: Vec<PathBuf> = test.config.catfiles.iter().map(|f| ctx.root.join(f)).collect();
        fs::wait_for_files(&paths, Duration::from_secs(ctx.settings.wait_for_files_secs)).await;
        let mut out = Vec::new();
        for path in &paths {
            match std::fs::read(path) {
                Ok(bytes) => out.extend(bytes),
                Err(e) => out.extend(format!("cat: {}: {}\n", path.display(), e).into_bytes()),
            }
        }
        Ok(out)
    }

    fn local_strategy(&self) -> TimeoutStrategy {
        match self.ctx.settings.timeout_mode {
            TimeoutMode::Wrapper => TimeoutStrategy::Wrapper {
                program: self.ctx.helper("timedexec"),
            },
            TimeoutMode::Poll => TimeoutStrategy::Polling,
        }
    }

    /// Removes the executable (and a launcher's `_real` companion).
    fn cleanup(&self, exec_name: &str) {
        fs::remove_if_exists(&self.ctx.root.join(exec_name));
        fs::remove_if_exists(&self.ctx.root.join(format!("{exec_name}_real")));
    }
}
