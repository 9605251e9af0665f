//! # Error Taxonomy Module / 错误分类模块
//!
//! Errors the driver has to branch on. Everything else travels as `anyhow::Error`
//! with context attached.
//!
//! 驱动程序需要区分处理的错误类型。其余错误均以附带上下文的 `anyhow::Error` 传递。

use std::path::Path;
use thiserror::Error;

/// The string whose character codes, summed modulo 256, form the fatal exit code.
const FATAL_EXIT_SEED: &str = "CHAPEL";

/// Exit code for unrecoverable configuration errors (173).
///
/// 不可恢复的配置错误所使用的退出码（173）。
pub fn fatal_exit_code() -> u8 {
    let sum: u32 = FATAL_EXIT_SEED.bytes().map(u32::from).sum();
    (sum % 256) as u8
}

/// Errors that change how the harness proceeds.
///
/// 改变测试框架执行流程的错误。
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Aborts the entire directory run with [`fatal_exit_code`].
    /// 以 [`fatal_exit_code`] 终止整个目录的运行。
    #[error("{message}")]
    FatalConfig { message: String },

    /// Aborts only the current test; the driver reports it and moves on.
    /// 仅终止当前测试；驱动程序报告后继续下一个测试。
    #[error("Error processing {kind} file for {test}: {detail}")]
    PerTestConfig {
        kind: &'static str,
        test: String,
        detail: String,
    },
}

impl HarnessError {
    pub fn fatal(message: impl Into<String>) -> Self {
        HarnessError::FatalConfig {
            message: message.into(),
        }
    }

    pub fn invalid_integer(path: &Path, localdir: &str) -> Self {
        HarnessError::fatal(format!(
            "Invalid integer value in {} ({})",
            path.display(),
            localdir
        ))
    }

    pub fn missing_helper(what: &str, path: &Path) -> Self {
        HarnessError::fatal(format!("Cannot execute {} '{}'", what, path.display()))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::FatalConfig { .. })
    }
}

/// Returns the fatal configuration error buried in an `anyhow` chain, if any.
pub fn find_fatal(err: &anyhow::Error) -> Option<&HarnessError> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<HarnessError>())
        .find(|e| e.is_fatal())
}
