//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for file system operations: reading the
//! harness's line-oriented configuration files, listing the test directory,
//! and creating or removing log artifacts.
//!
//! 此模块提供文件系统操作的实用功能：读取面向行的配置文件、列出测试目录，
//! 以及创建或删除日志产物。

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::core::config::EnvMap;
use crate::core::errors::HarnessError;

/// Checks if a path is a regular file with any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Checks if a path is a readable regular file.
pub fn is_readable_file(path: &Path) -> bool {
    fs::File::open(path)
        .and_then(|f| f.metadata())
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Gets the absolute path from a potentially relative path.
///
/// # Returns
/// Canonicalized absolute path, or an error if the path doesn't exist
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}

/// Host name up to the first dot.
pub fn short_host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for `buf.len()` bytes and gethostname NUL-terminates on success.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let full = String::from_utf8_lossy(&buf[..end]);
    full.split('.').next().unwrap_or_default().to_string()
}

/// File names in `dir`, sorted.
///
/// 返回目录中排序后的文件名列表。
pub fn sorted_listing(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Reads a configuration file as a list of meaningful lines.
///
/// An executable file is run (with `env`) and its standard output is used
/// instead of its contents. Blank lines and `#` comments are dropped and
/// `$VAR` / `${VAR}` references are expanded against `env`; unknown variables
/// are left untouched. With `ignore_leading_space`, indented comments are also
/// dropped.
///
/// 读取配置文件，返回有意义的行列表。可执行文件会被运行并使用其标准输出；
/// 空行和 `#` 注释被丢弃，`$VAR` / `${VAR}` 会根据 `env` 展开，未知变量保持原样。
pub async fn read_file_with_comments(
    path: &Path,
    env: &EnvMap,
    ignore_leading_space: bool,
) -> Result<Vec<String>> {
    let raw = if is_executable(path) {
        let abs = absolute_path(path)?;
        let mut cmd = tokio::process::Command::new(&abs);
        cmd.env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = abs.parent() {
            cmd.current_dir(dir);
        }
        match cmd.output().await {
            Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
            Err(e) => {
                println!("[Error trying to execute '{}': {}]", path.display(), e);
                String::new()
            }
        }
    } else {
        tokio::fs::read(path)
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    Ok(filter_config_lines(&raw, env, ignore_leading_space))
}

/// The pure half of [`read_file_with_comments`].
pub fn filter_config_lines(raw: &str, env: &EnvMap, ignore_leading_space: bool) -> Vec<String> {
    raw.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .filter(|line| {
            let candidate = if ignore_leading_space { line.trim_start() } else { line };
            !candidate.starts_with('#')
        })
        .map(|line| {
            shellexpand::env_with_context_no_errors(line, |name: &str| env.get(name)).into_owned()
        })
        .collect()
}

/// Reads the first non-comment line of `path` as an integer.
///
/// Anything else is a fatal configuration error: an unreadable integer in a
/// required file aborts the whole directory run.
///
/// 读取 `path` 的第一个非注释行作为整数；否则视为致命配置错误。
pub async fn read_integer_value(path: &Path, env: &EnvMap, localdir: &str) -> Result<i64> {
    let lines = read_file_with_comments(path, env, true).await?;
    lines
        .first()
        .and_then(|l| l.trim().parse::<i64>().ok())
        .ok_or_else(|| HarnessError::invalid_integer(path, localdir).into())
}

/// Writes `content` to `path`, replacing any previous artifact.
pub fn write_artifact(path: &Path, content: &[u8]) -> Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Removes a file if it exists, reporting a warning record when it cannot be removed.
pub fn remove_if_exists(path: &Path) {
    if path.is_file() {
        if let Err(e) = fs::remove_file(path) {
            println!("[Warning: could not remove {}: {}]", path.display(), e);
        }
    }
}

/// Waits (up to `timeout` in total) for each file to appear. Some launchers only
/// flush a program's files after returning.
pub async fn wait_for_files(files: &[PathBuf], timeout: Duration) {
    let mut waited = Duration::ZERO;
    let step = Duration::from_secs(1);
    for file in files {
        while !file.exists() && waited < timeout {
            tokio::time::sleep(step).await;
            waited += step;
        }
    }
}
