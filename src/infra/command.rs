//! # Command Execution Module / 命令执行模块
//!
//! The Timeout-Bounded Runner: launches an external process, captures its
//! output, and enforces a wall-clock deadline in one of three ways (an external
//! `timedexec` wrapper, direct polling with signal escalation, or a launcher
//! that is handed its own wall time).
//!
//! 超时控制运行器：启动外部进程、捕获其输出，并以三种方式之一强制执行墙钟截止时间
//! （外部 `timedexec` 包装器、带信号升级的直接轮询，或将墙钟时间交给启动器自行处理）。

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::classify;
use crate::core::config::EnvMap;
use crate::core::errors::HarnessError;
use crate::core::models::ExecutionResult;

/// Exit status with which `timedexec` reports that it enforced the deadline.
pub const WRAPPER_TIMEOUT_STATUS: i32 = 222;

/// Upper bound on how long reader tasks may keep draining after the child is reaped.
const READER_DRAIN: Duration = Duration::from_millis(250);

const READ_CHUNK: usize = 8192;

/// Where the child's standard input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    Null,
    Inherit,
    File(PathBuf),
}

/// How standard output and standard error are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMerge {
    /// One stream, in arrival order.
    Interleaved,
    /// All of standard output, then all of standard error.
    StdoutThenStderr,
}

/// Deadline enforcement strategy.
///
/// 截止时间的执行策略。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutStrategy {
    /// Run as `<program> <secs> '<shell-quoted command>'`; exit status 222 means timeout.
    Wrapper { program: PathBuf },
    /// Poll the child; on expiry send SIGTERM to its process group, wait up to the
    /// kill timeout, then SIGKILL.
    Polling,
    /// The deadline was passed to the launcher on its command line; only known
    /// scheduler signatures in the output mark a timeout.
    Launcher,
}

/// One invocation of an external process.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub program: String,
    pub args: Vec<String>,
    /// The complete child environment.
    pub env: EnvMap,
    pub stdin: StdinSource,
    pub current_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub kill_timeout: Duration,
    pub strategy: TimeoutStrategy,
    pub merge: OutputMerge,
}

impl RunRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: EnvMap::new(),
            stdin: StdinSource::Null,
            current_dir: None,
            timeout: Duration::from_secs(300),
            kill_timeout: Duration::from_secs(10),
            strategy: TimeoutStrategy::Polling,
            merge: OutputMerge::Interleaved,
        }
    }

    /// `program arg1 arg2 ...` as printed in `[Executing ...]` records.
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs `req` to completion or deadline and returns the captured result.
///
/// Never blocks longer than `timeout + kill_timeout` plus a short drain
/// interval in polling mode.
///
/// 运行 `req` 直到完成或超时，并返回捕获的结果。
pub async fn run(req: &RunRequest) -> Result<ExecutionResult> {
    match &req.strategy {
        TimeoutStrategy::Wrapper { program } => {
            let whole = shlex::try_join(
                std::iter::once(req.program.as_str()).chain(req.args.iter().map(String::as_str)),
            )
            .map_err(|e| anyhow!("Cannot quote command '{}': {}", req.display_command(), e))?;
            let args = vec![req.timeout.as_secs().to_string(), whole];
            let cmd = build_command(&program.display().to_string(), &args, req)?;
            let mut result = capture(cmd, None, req.kill_timeout, req.merge).await?;
            if result.exit_code == Some(WRAPPER_TIMEOUT_STATUS) {
                result.timed_out = true;
            }
            Ok(result)
        }
        TimeoutStrategy::Polling => {
            let cmd = build_command(&req.program, &req.args, req)?;
            capture(cmd, Some(req.timeout), req.kill_timeout, req.merge).await
        }
        TimeoutStrategy::Launcher => {
            let cmd = build_command(&req.program, &req.args, req)?;
            let mut result = capture(cmd, None, req.kill_timeout, req.merge).await?;
            result.timed_out = classify::is_remote_timeout(&result.output_text());
            Ok(result)
        }
    }
}

/// Runs a helper (hook, predicate, perf-key script) with no deadline. Output is
/// merged in arrival order.
pub async fn run_to_completion(
    program: &str,
    args: &[String],
    env: &EnvMap,
    current_dir: Option<&Path>,
) -> Result<ExecutionResult> {
    let mut req = RunRequest::new(program, args.to_vec());
    req.env = env.clone();
    req.current_dir = current_dir.map(Path::to_path_buf);
    let cmd = build_command(program, args, &req)?;
    capture(cmd, None, req.kill_timeout, OutputMerge::Interleaved).await
}

/// `--walltime=HH:MM:SS` for the launcher families that accept it.
///
/// 为支持的启动器族生成 `--walltime=HH:MM:SS` 参数。
pub fn launcher_timeout_args(family: &str, timeout: Duration) -> Result<Vec<String>> {
    match family {
        "pbs" | "slurm" => {
            let secs = timeout.as_secs();
            let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
            Ok(vec![format!("--walltime={:02}:{:02}:{:02}", h, m, s)])
        }
        other => Err(HarnessError::fatal(format!(
            "LauncherTimeoutArgs encountered an unknown format spec: {}",
            other
        ))
        .into()),
    }
}

fn build_command(program: &str, args: &[String], req: &RunRequest) -> Result<Command> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .env_clear()
        .envs(&req.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    if let Some(dir) = &req.current_dir {
        cmd.current_dir(dir);
    }
    let stdin = match &req.stdin {
        StdinSource::Null => Stdio::null(),
        StdinSource::Inherit => Stdio::inherit(),
        StdinSource::File(path) => Stdio::from(
            std::fs::File::open(path)
                .with_context(|| format!("Failed to open stdin file {}", path.display()))?,
        ),
    };
    cmd.stdin(stdin);
    Ok(cmd)
}

/// Spawns `cmd` and captures its output, following the `spawn_and_capture`
/// reader-task pattern. With a deadline, expiry triggers [`terminate`].
async fn capture(
    mut cmd: Command,
    deadline: Option<Duration>,
    kill_timeout: Duration,
    merge: OutputMerge,
) -> Result<ExecutionResult> {
    let start = Instant::now();
    let mut child = cmd.spawn().with_context(|| {
        format!("Failed to spawn {}", cmd.as_std().get_program().to_string_lossy())
    })?;
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("Failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("Failed to capture stderr"))?;

    let out_buf = Arc::new(Mutex::new(Vec::new()));
    let err_buf = match merge {
        OutputMerge::Interleaved => Arc::clone(&out_buf),
        OutputMerge::StdoutThenStderr => Arc::new(Mutex::new(Vec::new())),
    };
    let mut readers = vec![
        spawn_reader(stdout, Arc::clone(&out_buf)),
        spawn_reader(stderr, Arc::clone(&err_buf)),
    ];

    let mut timed_out = false;
    let status = match deadline {
        None => {
            for reader in &mut readers {
                let _ = reader.await;
            }
            Some(child.wait().await.context("Failed to wait for process")?)
        }
        Some(limit) => {
            let natural = async {
                for reader in readers.iter_mut() {
                    let _ = reader.await;
                }
                child.wait().await
            };
            let outcome = tokio::time::timeout(limit, natural).await;
            match outcome {
                Ok(status) => Some(status.context("Failed to wait for process")?),
                Err(_) => {
                    timed_out = true;
                    terminate(&mut child, pid, kill_timeout).await
                }
            }
        }
    };

    drain(&mut readers).await;
    let elapsed = start.elapsed();

    let mut output = std::mem::take(&mut *out_buf.lock().await);
    if !Arc::ptr_eq(&out_buf, &err_buf) {
        output.extend_from_slice(&err_buf.lock().await);
    }

    Ok(ExecutionResult {
        output,
        exit_code: status.and_then(|s| s.code()),
        elapsed,
        timed_out,
    })
}

fn spawn_reader<R>(mut stream: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    })
}

/// Gives reader tasks a short window to collect what is left in the pipes; a
/// grandchild that inherited the pipe must not hold the caller hostage.
async fn drain(readers: &mut [JoinHandle<()>]) {
    let until = Instant::now() + READER_DRAIN;
    for reader in readers.iter_mut() {
        if reader.is_finished() {
            continue;
        }
        let left = until.saturating_duration_since(Instant::now());
        if tokio::time::timeout(left, &mut *reader).await.is_err() {
            reader.abort();
        }
    }
}

/// Graceful then forced termination of the child's process group.
///
/// 先优雅终止，再强制终止子进程所在的进程组。
async fn terminate(
    child: &mut Child,
    pid: Option<u32>,
    kill_timeout: Duration,
) -> Option<std::process::ExitStatus> {
    signal_group(pid, libc::SIGTERM);
    tracing::debug!(?pid, "sent SIGTERM to process group");
    if let Ok(Ok(status)) = tokio::time::timeout(kill_timeout, child.wait()).await {
        return Some(status);
    }
    tracing::warn!(?pid, ?kill_timeout, "process ignored SIGTERM, sending SIGKILL");
    signal_group(pid, libc::SIGKILL);
    let _ = child.start_kill();
    child.wait().await.ok()
}

fn signal_group(pid: Option<u32>, signal: libc::c_int) {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid addresses the group
    // created by `process_group(0)`.
    unsafe {
        libc::kill(-pid, signal);
    }
}
