//! # Hook Invocation Module / 钩子调用模块
//!
//! Precompile, preexec and prediff scripts are opaque executables. They are
//! run at fixed points with `(<exec>, <log>, <compiler>)`, prediffs also with
//! the compile options and the full argument string, and whatever they print
//! is echoed into the log.
//!
//! 预编译、预执行和预比较脚本都是不透明的可执行文件。它们在固定时刻以
//! `(<exec>, <log>, <compiler>)` 为参数运行（预比较脚本还会额外得到编译选项和完整参数串），
//! 其输出会被原样回显到日志中。

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::core::config::EnvMap;
use crate::infra::command;
use crate::reporting::console;

/// When a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Precomp,
    Preexec,
    Prediff,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Precomp => "precomp",
            Stage::Preexec => "preexec",
            Stage::Prediff => "prediff",
        }
    }
}

/// Where a hook was configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookScope {
    /// `CHPL_SYSTEM_PREEXEC` / `CHPL_SYSTEM_PREDIFF`.
    System,
    /// `./PRECOMP`, `./PREEXEC`, `./PREDIFF`.
    Directory,
    /// `<test>.precomp` and friends.
    Test(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub stage: Stage,
    pub scope: HookScope,
    pub path: PathBuf,
}

impl Hook {
    pub fn new(stage: Stage, scope: HookScope, path: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            scope,
            path: path.into(),
        }
    }

    fn stage_args(&self, args: &HookArgs<'_>) -> Vec<String> {
        args.for_stage(self.stage)
    }

    /// The `[Executing ...]` record printed before the hook runs.
    fn banner(&self, args: &[String]) -> String {
        match &self.scope {
            HookScope::System => format!(
                "[Executing system-wide {} {}]",
                self.stage.name(),
                self.path.display()
            ),
            HookScope::Directory if self.stage == Stage::Precomp => {
                format!("[Executing ./PRECOMP {}]", args.join(" "))
            }
            HookScope::Directory => {
                format!("[Executing ./{}]", self.stage.name().to_uppercase())
            }
            HookScope::Test(name) => {
                format!("[Executing {} {}.{}]", self.stage.name(), name, self.stage.name())
            }
        }
    }
}

/// The arguments every hook receives.
#[derive(Debug, Clone)]
pub struct HookArgs<'a> {
    pub exec_name: &'a str,
    pub log: &'a str,
    pub compiler: &'a str,
    /// Compile options string and full argument string, for prediffs only.
    pub prediff_extra: Option<(String, String)>,
}

impl HookArgs<'_> {
    fn for_stage(&self, stage: Stage) -> Vec<String> {
        let mut args = vec![
            self.exec_name.to_string(),
            self.log.to_string(),
            self.compiler.to_string(),
        ];
        if stage == Stage::Prediff {
            if let Some((compopts, all_args)) = &self.prediff_extra {
                args.push(compopts.clone());
                args.push(all_args.clone());
            }
        }
        args
    }
}

/// Runs `hooks` in order from `cwd`, echoing each one's output.
///
/// 在 `cwd` 中按顺序运行 `hooks`，并回显每个钩子的输出。
pub async fn run_hooks(hooks: &[Hook], args: &HookArgs<'_>, env: &EnvMap, cwd: &Path) -> Result<()> {
    for hook in hooks {
        let argv = hook.stage_args(args);
        console::record(&hook.banner(&argv));
        let program = if hook.path.is_absolute() {
            hook.path.display().to_string()
        } else {
            format!("./{}", hook.path.display())
        };
        tracing::debug!(hook = %program, ?argv, "running hook");
        let result = command::run_to_completion(&program, &argv, env, Some(cwd)).await?;
        console::echo(&result.output_text());
    }
    Ok(())
}
