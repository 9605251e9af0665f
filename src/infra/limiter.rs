//! # Execution Limiter Module / 执行限流模块
//!
//! Bounds how many test binaries run at once across every harness process on
//! the machine. Coordination happens through advisory `flock(2)` locks on files
//! in a shared directory. The kernel drops a lock when its holder exits, so a
//! crashed harness never leaves a slot taken.
//!
//! 限制本机所有测试框架进程同时运行的测试程序数量。通过共享目录中文件上的
//! `flock(2)` 建议锁进行协调。持有者退出时内核会自动释放锁，因此崩溃的测试框架不会占住槽位。

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::Settings;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The gate in front of every trial.
///
/// 每次试运行前的闸门。
#[derive(Debug, Clone)]
pub enum ExecLimiter {
    /// Always available.
    NoLock,
    FileLock(FileLockLimiter),
}

/// File-lock strategy: one lock per test key, plus one of `slots` global slots.
#[derive(Debug, Clone)]
pub struct FileLockLimiter {
    dir: PathBuf,
    slots: u32,
}

impl ExecLimiter {
    /// `FileLock` when a slot count is configured, otherwise `NoLock`.
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.limit_running_executables {
            Some(slots) => {
                let dir = settings
                    .limiter_dir
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("subtest-exec-limiter"));
                ExecLimiter::FileLock(FileLockLimiter::new(dir, slots))
            }
            None => ExecLimiter::NoLock,
        }
    }

    /// Waits until `key` may run. The returned guard releases on drop, on
    /// every exit path of the guarded trial.
    ///
    /// 等待直到 `key` 可以运行。返回的守卫在析构时释放锁。
    pub async fn acquire(&self, key: &str) -> Result<LimiterGuard> {
        match self {
            ExecLimiter::NoLock => Ok(LimiterGuard { held: Vec::new() }),
            ExecLimiter::FileLock(limiter) => limiter.acquire(key).await,
        }
    }
}

impl FileLockLimiter {
    pub fn new(dir: PathBuf, slots: u32) -> Self {
        Self {
            dir,
            slots: slots.max(1),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("key-{sanitized}.lock"))
    }

    fn slot_path(&self, slot: u32) -> PathBuf {
        self.dir.join(format!("slot-{slot}.lock"))
    }

    async fn acquire(&self, key: &str) -> Result<LimiterGuard> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create limiter directory {}", self.dir.display()))?;

        let mut guard = LimiterGuard { held: Vec::new() };
        let key_path = self.key_path(key);
        let mut waited = false;
        loop {
            if let Some(lock) = try_lock(&key_path, key)? {
                guard.held.push(lock);
                break;
            }
            if !waited {
                tracing::debug!(key, path = %key_path.display(), "waiting for test lock");
                waited = true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        waited = false;
        loop {
            for slot in 0..self.slots {
                if let Some(lock) = try_lock(&self.slot_path(slot), key)? {
                    tracing::debug!(key, slot, "acquired execution slot");
                    guard.held.push(lock);
                    return Ok(guard);
                }
            }
            if !waited {
                tracing::debug!(key, slots = self.slots, "all execution slots busy");
                waited = true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Held locks; released in reverse acquisition order when dropped.
#[derive(Debug)]
pub struct LimiterGuard {
    held: Vec<File>,
}

impl LimiterGuard {
    pub fn is_noop(&self) -> bool {
        self.held.is_empty()
    }
}

impl Drop for LimiterGuard {
    fn drop(&mut self) {
        // Closing the descriptor releases the flock.
        while let Some(file) = self.held.pop() {
            drop(file);
        }
    }
}

/// One non-blocking `LOCK_EX` attempt. The lock file itself is never removed;
/// only the lock on it is exclusive.
fn try_lock(path: &Path, key: &str) -> Result<Option<File>> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))?;

    // SAFETY: `file` owns a valid open descriptor for the duration of the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Ok(None);
        }
        return Err(err).with_context(|| format!("Failed to lock {}", path.display()));
    }

    // Holder details are informational only.
    if file.set_len(0).is_ok() {
        let _ = writeln!(file, "{}\n{}", std::process::id(), key);
    }
    Ok(Some(file))
}
