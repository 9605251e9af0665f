//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the harness:
//! the discovered test case and its kind, the captured result of one external
//! process, and the per-variant outcome records that reporting consumes.
//!
//! 此模块定义了整个测试框架中使用的核心数据结构：
//! 发现的测试用例及其类型、单个外部进程的捕获结果，以及报告模块使用的每个变体的结果记录。

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// The closed set of source kinds, decided once at discovery time.
///
/// 源文件类型的封闭集合，在发现阶段一次性确定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestKind {
    /// A test written in the language of the compiler under test (`.chpl`).
    Compiled,
    /// A documentation test: built with the doc tool and never executed.
    Doc,
    /// `.test.c`
    C,
    /// `.test.cpp`
    Cpp,
    /// `.ml-test.c`, only meaningful in a multi-locale configuration.
    MultiLocaleC,
    /// `.ml-test.cpp`, only meaningful in a multi-locale configuration.
    MultiLocaleCpp,
}

/// Source suffixes in match order. `.ml-test.c` must be tried before `.test.c`.
const SOURCE_SUFFIXES: &[(&str, TestKind)] = &[
    (".ml-test.cpp", TestKind::MultiLocaleCpp),
    (".ml-test.c", TestKind::MultiLocaleC),
    (".test.cpp", TestKind::Cpp),
    (".test.c", TestKind::C),
    (".chpl", TestKind::Compiled),
];

impl TestKind {
    /// Classifies a file name, returning its base name and kind.
    /// `doc_compiler` is set when the compiler under test is the doc tool itself.
    ///
    /// 对文件名进行分类，返回其基础名称和类型。
    pub fn classify(file_name: &str, doc_compiler: bool) -> Option<(String, TestKind)> {
        SOURCE_SUFFIXES.iter().find_map(|(suffix, kind)| {
            let base = file_name.strip_suffix(suffix)?;
            if base.is_empty() {
                return None;
            }
            let kind = match kind {
                TestKind::Compiled if doc_compiler || base.ends_with(".doc") => TestKind::Doc,
                other => *other,
            };
            Some((base.to_string(), kind))
        })
    }

    /// Single-locale C or C++ tests. These have no way to launch themselves.
    pub fn is_c_family(self) -> bool {
        matches!(self, TestKind::C | TestKind::Cpp)
    }

    pub fn is_multilocale_only(self) -> bool {
        matches!(self, TestKind::MultiLocaleC | TestKind::MultiLocaleCpp)
    }

    /// Any test compiled with the native C/C++ toolchain.
    pub fn is_native(self) -> bool {
        self.is_c_family() || self.is_multilocale_only()
    }

    pub fn is_doc(self) -> bool {
        self == TestKind::Doc
    }

    /// Language label used in skip messages.
    pub fn language(self) -> &'static str {
        match self {
            TestKind::C | TestKind::MultiLocaleC => "c",
            TestKind::Cpp | TestKind::MultiLocaleCpp => "c++",
            TestKind::Compiled | TestKind::Doc => "chpl",
        }
    }
}

/// A test discovered in the directory being run.
///
/// 在被运行目录中发现的测试。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// The source file name, e.g. `hello.chpl`.
    pub source: String,
    /// The base name shared by all of this test's configuration files, e.g. `hello`.
    pub name: String,
    pub kind: TestKind,
}

impl TestCase {
    pub fn new(source: impl Into<String>, name: impl Into<String>, kind: TestKind) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            kind,
        }
    }

    /// `<dir>/<name>` as used in every log record.
    pub fn qualified_name(&self, localdir: &str) -> String {
        if localdir.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", localdir, self.name)
        }
    }
}

/// The captured result of one external process.
///
/// 单个外部进程的捕获结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Merged standard output and standard error.
    pub output: Vec<u8>,
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Wall time from spawn to reap.
    pub elapsed: Duration,
    /// `true` when the deadline fired before natural completion, locally or as
    /// reported by a wrapper or launcher.
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn output_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

/// Which half of a variant an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Compile,
    Execute,
}

/// Enumerates the possible reasons for a failed comparison or run.
/// 枚举比较或运行失败的可能原因。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The compiler exceeded its deadline.
    CompileTimeout,
    /// The compiler failed and no golden compile output exists to compare against.
    CompileFailed,
    /// No golden file could be located.
    MissingGoodFile,
    /// The golden file exists but the content differs.
    DiffMismatch,
    /// The program exceeded its deadline, locally or per a scheduler signature.
    ExecTimeout,
    /// A known infrastructure failure signature was found in the output.
    KnownInfrastructure,
    /// The compiled program could not be found after a successful build.
    MissingExecutable,
    /// A malformed per-test predicate or redirect.
    Configuration,
    /// The performance-key helper rejected the output.
    PerfKeys,
    /// A hook, helper, compiler or the program itself could not be run.
    HelperFailure,
}

/// Final verdict for one compile or execute step.
///
/// 单个编译或执行步骤的最终结论。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Verdict {
    Passed,
    Failed {
        reason: FailureReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        annotation: Option<String>,
    },
    Skipped {
        reason: String,
    },
}

impl Verdict {
    pub fn failed(reason: FailureReason) -> Self {
        Verdict::Failed {
            reason,
            annotation: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Failed { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Verdict::Failed {
                reason: FailureReason::ExecTimeout | FailureReason::CompileTimeout,
                ..
            }
        )
    }
}

/// How a failing future test compared against its expected-bad output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BadFileMatch {
    Clean,
    Mismatch,
}

/// One reportable event: a compile comparison or one trial of one execution variant.
///
/// 一个可报告的事件：一次编译比较，或某个执行变体的一次试运行。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantRecord {
    pub directory: String,
    pub test: String,
    pub phase: Phase,
    pub compile_num: u32,
    pub exec_num: u32,
    pub trial: u32,
    pub verdict: Verdict,
    /// `Future (...)` / `Suppress (...)` marker, when the test is expected to fail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub future: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bad_file: Option<BadFileMatch>,
    pub elapsed_secs: f64,
}

impl fmt::Display for VariantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} [{:?} {}-{} #{}] {:?}",
            self.directory,
            self.test,
            self.phase,
            self.compile_num,
            self.exec_num,
            self.trial,
            self.verdict
        )
    }
}
