//! # Option Matrix Planner Module / 选项矩阵计划模块
//!
//! This module expands the resolved compile-option and execution-option lists
//! of one test into the ordered matrix the driver walks: numbered variants,
//! explicit golden-file annotations, and the log and golden-file names each
//! combination uses.
//!
//! 此模块将单个测试已解析的编译选项列表和执行选项列表展开为驱动程序遍历的有序矩阵：
//! 带编号的变体、显式期望输出文件注释，以及每个组合使用的日志名和期望输出文件名。

/// The entry that stands for "no extra options".
pub const BLANK: &str = " ";

/// One compile-option or execution-option line after its `#` annotation has
/// been split off.
///
/// 拆分掉 `#` 注释后的一行编译选项或执行选项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionVariant {
    /// 1-based position among non-blank entries; 0 for a blank entry.
    pub num: u32,
    /// Options passed to the tool, without the annotation.
    pub options: String,
    /// Golden-file base named by the annotation, without `.good`.
    pub good_override: Option<String>,
}

impl OptionVariant {
    pub fn is_blank(&self) -> bool {
        self.options.trim().is_empty()
    }

    /// Options split into shell words.
    pub fn words(&self) -> Vec<String> {
        shlex::split(&self.options).unwrap_or_else(|| {
            self.options.split_whitespace().map(str::to_string).collect()
        })
    }
}

/// Which golden file a comparison should look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodFileSpec {
    pub base: String,
    /// Candidate suffixes, tried in order.
    pub suffixes: Vec<String>,
}

/// The expanded compile × execute matrix of one test.
///
/// 单个测试展开后的 编译 × 执行 矩阵。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixPlan {
    pub compiles: Vec<OptionVariant>,
    pub execs: Vec<OptionVariant>,
}

/// Cross product of directory-level and test-level compile lines. Either side
/// being empty counts as a single blank entry; an all-blank result collapses
/// to [`BLANK`].
///
/// 目录级与测试级编译选项行的笛卡尔积。
pub fn merge_compile_lines(directory: &[String], test: &[String]) -> Vec<String> {
    let blank = [BLANK.to_string()];
    let dir = if directory.is_empty() { &blank[..] } else { directory };
    let local = if test.is_empty() { &blank[..] } else { test };
    dir.iter()
        .flat_map(|d| {
            local.iter().map(move |t| {
                let joined = format!("{d} {t}");
                if joined.trim().is_empty() {
                    BLANK.to_string()
                } else {
                    joined
                }
            })
        })
        .collect()
}

/// Splits a compile line at its first `#`: the rest up to the next `#`,
/// trimmed and with `.good` removed, is the golden-file base.
fn split_compile_line(line: &str) -> (String, Option<String>) {
    match line.split_once('#') {
        None => (line.to_string(), None),
        Some((opts, rest)) => {
            let name = rest.split('#').next().unwrap_or_default().trim();
            let base = (!name.is_empty()).then(|| name.replace(".good", ""));
            (opts.to_string(), base)
        }
    }
}

/// Splits an execution line at its first `#`: only the first token after it
/// names the golden file.
fn split_exec_line(line: &str) -> (String, Option<String>) {
    match line.split_once('#') {
        None => (line.trim().to_string(), None),
        Some((opts, rest)) => {
            let base = rest
                .split('#')
                .next()
                .and_then(|seg| seg.split_whitespace().next())
                .map(|tok| tok.replace(".good", ""));
            (opts.trim().to_string(), base)
        }
    }
}

fn number<F>(lines: &[String], split: F) -> Vec<OptionVariant>
where
    F: Fn(&str) -> (String, Option<String>),
{
    let mut counter = 0;
    lines
        .iter()
        .map(|line| {
            let (options, good_override) = split(line);
            let num = if options.trim().is_empty() {
                0
            } else {
                counter += 1;
                counter
            };
            OptionVariant {
                num,
                options,
                good_override,
            }
        })
        .collect()
}

/// Expands merged compile lines and test execution lines into a plan.
/// An empty list on either side becomes a single blank entry, so a test always
/// runs at least once.
///
/// 将合并后的编译选项行和执行选项行展开为计划。任一侧为空都视为单个空白条目，
/// 因此测试至少运行一次。
pub fn plan_matrix(compile_lines: &[String], exec_lines: &[String]) -> MatrixPlan {
    let blank = [BLANK.to_string()];
    let compile_lines = if compile_lines.is_empty() { &blank[..] } else { compile_lines };
    let exec_lines = if exec_lines.is_empty() { &blank[..] } else { exec_lines };
    MatrixPlan {
        compiles: number(compile_lines, split_compile_line),
        execs: number(exec_lines, split_exec_line),
    }
}

impl MatrixPlan {
    /// Exactly one compile variant and one execution variant.
    pub fn is_single(&self) -> bool {
        self.compiles.len() == 1 && self.execs.len() == 1
    }

    pub fn combination_count(&self) -> usize {
        self.compiles.len() * self.execs.len()
    }

    /// `<exec>.<c>.comp.out.tmp` when there is more than one compile variant,
    /// else `<exec>.comp.out.tmp`.
    pub fn compile_log(&self, exec_name: &str, compile: &OptionVariant) -> String {
        if self.compiles.len() > 1 {
            format!("{exec_name}.{}.comp.out.tmp", compile.num)
        } else {
            format!("{exec_name}.comp.out.tmp")
        }
    }

    /// `<exec>.<c>-<e>.exec.out.tmp`, or `<exec>.exec.out.tmp` for a single combination.
    pub fn exec_log(&self, exec_name: &str, compile: &OptionVariant, exec: &OptionVariant) -> String {
        if self.is_single() {
            format!("{exec_name}.exec.out.tmp")
        } else {
            format!("{exec_name}.{}-{}.exec.out.tmp", compile.num, exec.num)
        }
    }

    /// Golden file for a compile-only comparison.
    pub fn compile_good(&self, test_base: &str, compile: &OptionVariant) -> GoodFileSpec {
        GoodFileSpec {
            base: compile
                .good_override
                .clone()
                .unwrap_or_else(|| test_base.to_string()),
            suffixes: vec![String::new()],
        }
    }

    /// Golden file for one execution. An annotation on the execution line beats
    /// one on the compile line; either pins the base and disables the
    /// `.<c>-<e>` suffix.
    ///
    /// 单次执行的期望输出文件。执行行上的注释优先于编译行上的注释。
    pub fn exec_good(
        &self,
        test_base: &str,
        compile: &OptionVariant,
        exec: &OptionVariant,
    ) -> GoodFileSpec {
        if let Some(base) = exec.good_override.as_ref().or(compile.good_override.as_ref()) {
            return GoodFileSpec {
                base: base.clone(),
                suffixes: vec![String::new()],
            };
        }
        let suffixes = if self.is_single() {
            vec![String::new()]
        } else {
            vec![format!(".{}-{}", compile.num, exec.num), String::new()]
        };
        GoodFileSpec {
            base: test_base.to_string(),
            suffixes,
        }
    }

    /// `(compopts: N, execopts: M)` as appended to failure records; empty when
    /// neither side has more than one variant.
    pub fn variation(&self, compile: &OptionVariant, exec: Option<&OptionVariant>) -> String {
        let comp = (compile.num != 0 && self.compiles.len() > 1).then_some(compile.num);
        let exe = exec
            .filter(|e| e.num != 0 && self.execs.len() > 1)
            .map(|e| e.num);
        match (comp, exe) {
            (None, None) => String::new(),
            (Some(c), None) => format!(" (compopts: {c})"),
            (None, Some(e)) => format!(" (execopts: {e})"),
            (Some(c), Some(e)) => format!(" (compopts: {c}, execopts: {e})"),
        }
    }
}
