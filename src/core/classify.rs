//! # Output Classifier Module / 输出分类模块
//!
//! Recognises known infrastructure failures in captured output and turns them
//! into short annotations, and hosts the pure text transforms applied to raw
//! output before it is classified or compared.
//!
//! 识别捕获输出中已知的基础设施故障并生成简短注释；同时提供在分类或比较之前
//! 应用于原始输出的纯文本转换。

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Maximum number of bytes of captured output echoed into the log.
pub const TRIM_LIMIT: usize = 256 * 1024;

/// Which captured text a signature is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// The program's own output.
    Output,
    /// The output of the compile that produced the program.
    CompileOutput,
    Either,
}

/// Whether a matched signature means the run itself is unreliable, or is just
/// a hint attached to a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Infrastructure,
    Hint,
}

struct Signature {
    pattern: Regex,
    annotation: &'static str,
    scope: Scope,
    severity: Severity,
}

fn pattern(re: &str) -> Regex {
    RegexBuilder::new(re)
        .case_insensitive(true)
        .build()
        .expect("Static regex pattern should always compile")
}

fn signature(re: &str, annotation: &'static str, scope: Scope, severity: Severity) -> Signature {
    Signature {
        pattern: pattern(re),
        annotation,
        scope,
        severity,
    }
}

/// Known failure signatures, in precedence order. The first match wins.
static KNOWN_FAILURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    use Scope::*;
    use Severity::*;
    vec![
        signature(
            "slurmstepd: Munge decode failed: Expired credential",
            "Expired slurm credential for",
            Output,
            Infrastructure,
        ),
        signature(
            "output file from job .* does not exist",
            "Missing output file for",
            Output,
            Infrastructure,
        ),
        signature(
            "aprun: Unexpected close of the apsys control connection",
            "Unexpected close of apsys for",
            Output,
            Infrastructure,
        ),
        signature(
            "qsub: cannot connect to server sdb",
            "Sporadic: qstat failed to connect to server sdb",
            Output,
            Infrastructure,
        ),
        signature(
            "Failed to recv data from background qsub",
            "Failed to recv data from background qsub for",
            Output,
            Infrastructure,
        ),
        signature(
            r"\d+ Killed /var/spool/PBS/mom_priv/jobs",
            "PBS job killed for",
            Output,
            Infrastructure,
        ),
        signature(
            "Fatal MPP reservation error on (confirm|create)",
            "Fatal MPP reservation error for",
            Output,
            Infrastructure,
        ),
        signature("Text file busy", "Text file busy for", Output, Infrastructure),
        signature(
            "Socket timed out on send/recv operation",
            "Slurm socket timed out on send/recv",
            Output,
            Infrastructure,
        ),
        signature("GASNet timer calibration on", "(timer calibration)", Output, Hint),
        signature("=* Memory Leaks =*", "(memory leak)", Output, Hint),
        signature(
            "could not checkout FLEXlm license",
            "(license checkout failure)",
            Either,
            Hint,
        ),
        signature("Clock skew detected", "(clock skew)", CompileOutput, Hint),
        signature(
            "Master got an xSocket: error in sendAll",
            "(possible xSocket sendAll failure)",
            Output,
            Hint,
        ),
        signature(
            concat!(
                "got exn while reading exit code: connection closed",
                "|slave got an unknown command on coord socket:",
                "|Slave got an xSocket: connection closed on recv",
                r"|recursive failure in AMUDP_SPMDShutdown",
                r"|AM_ERR_RESOURCE \(Problem with requested resource\)"
            ),
            "(possible connection failure)",
            Output,
            Hint,
        ),
    ]
});

/// Scheduler signatures that mean the job was killed for exceeding its wall time.
static TIMEOUT_SIGNATURES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        pattern("PBS: job killed: walltime"),
        pattern("slurm.* CANCELLED .* DUE TO TIME LIMIT"),
    ]
});

static COMPILER_FAILURES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![(
        pattern("could not checkout FLEXlm license"),
        "(license checkout failure)",
    )]
});

static CLOCK_SKEW: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        pattern(r"g?make.*: Warning: File .* has modification time .* s in the future *\n"),
        pattern(r"g?make.*: warning:  Clock skew detected\.  Your build may be incomplete\. *\n"),
    ]
});

/// Annotation for a text whose diff should not be trusted, or should be explained.
///
/// 对不可信或需要解释的输出所生成的注释。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classification {
    pub annotation: Option<String>,
    pub severity: Option<Severity>,
    /// A scheduler reported a timeout; callers treat this like a local timeout.
    pub timeout_like: bool,
}

impl Classification {
    pub fn is_infrastructure(&self) -> bool {
        self.severity == Some(Severity::Infrastructure)
    }
}

/// Classifies `output` (and the compile output that preceded it).
///
/// Known failures are tried first, in table order, and give the annotation.
/// Scheduler timeout signatures are checked on every call and set
/// `timeout_like` whether or not a known failure matched.
///
/// 对 `output`（以及其之前的编译输出）进行分类。先按表顺序匹配已知故障以得到注释；
/// 调度器超时特征每次都会检查，无论是否匹配了已知故障都会设置 `timeout_like`。
pub fn classify(output: &str, compile_output: &str) -> Classification {
    let timeout_like = is_remote_timeout(output);
    let hit = KNOWN_FAILURES.iter().find(|sig| match sig.scope {
        Scope::Output => sig.pattern.is_match(output),
        Scope::CompileOutput => sig.pattern.is_match(compile_output),
        Scope::Either => sig.pattern.is_match(output) || sig.pattern.is_match(compile_output),
    });
    match hit {
        Some(sig) => Classification {
            annotation: Some(sig.annotation.to_string()),
            severity: Some(sig.severity),
            timeout_like,
        },
        None if timeout_like => Classification {
            annotation: Some("Timed out executing program".to_string()),
            severity: Some(Severity::Infrastructure),
            timeout_like,
        },
        None => Classification::default(),
    }
}

/// `true` when a job scheduler reported killing the job for exceeding its time limit.
pub fn is_remote_timeout(output: &str) -> bool {
    TIMEOUT_SIGNATURES.iter().any(|re| re.is_match(output))
}

/// Known compiler infrastructure errors that make a compile comparison meaningless.
pub fn classify_compile(compile_output: &str) -> Option<&'static str> {
    COMPILER_FAILURES
        .iter()
        .find(|(re, _)| re.is_match(compile_output))
        .map(|(_, msg)| *msg)
}

/// One pure post-processing step over captured text.
///
/// 对捕获文本的一个纯后处理步骤。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// Drop `make` clock-skew warnings.
    StripClockSkew,
    /// Drop the `<file>:` lines some C compilers echo for each source they build.
    StripSourceEcho(Vec<String>),
}

impl Transform {
    pub fn apply(&self, text: &str) -> String {
        match self {
            Transform::StripClockSkew => CLOCK_SKEW
                .iter()
                .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned()),
            Transform::StripSourceEcho(sources) => {
                sources.iter().fold(text.to_string(), |acc, src| acc.replace(&format!("{src}:\n"), ""))
            }
        }
    }
}

/// The transforms applied to a compile log. `c_args` are the compiler
/// arguments of a native C/C++ compile, empty otherwise.
pub fn compile_pipeline(c_args: &[String]) -> Vec<Transform> {
    let mut pipeline = vec![Transform::StripClockSkew];
    let sources: Vec<String> = c_args
        .iter()
        .filter(|a| a.ends_with(".c") || a.ends_with(".cpp"))
        .cloned()
        .collect();
    if !sources.is_empty() {
        pipeline.push(Transform::StripSourceEcho(sources));
    }
    pipeline
}

pub fn apply_all(pipeline: &[Transform], text: &str) -> String {
    pipeline
        .iter()
        .fold(text.to_string(), |acc, step| step.apply(&acc))
}

/// Keeps the first and last 128 KiB of oversized output and replaces
/// non-printable characters with `~`.
///
/// 保留超大输出的前后各 128 KiB，并将不可打印字符替换为 `~`。
pub fn trim_output(output: &[u8]) -> String {
    let half = TRIM_LIMIT / 2;
    let kept: Vec<u8> = if output.len() > TRIM_LIMIT {
        output[..half]
            .iter()
            .chain(&output[output.len() - half..])
            .copied()
            .collect()
    } else {
        output.to_vec()
    };
    kept.iter()
        .map(|&b| {
            let c = b as char;
            if c.is_ascii_graphic() || matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c') {
                c
            } else {
                '~'
            }
        })
        .collect()
}
