//! # Good-File Resolver Module / 期望输出文件解析模块
//!
//! Picks the expected-output file for a test from a fixed priority chain of
//! machine, `no-local`, capability-tag and platform specialisations.
//!
//! 根据机器名、`no-local`、能力标签和平台的固定优先级链，为测试选择期望输出文件。

use crate::core::config::{Capabilities, DirectoryContext};

/// Everything resolution depends on besides the file system.
///
/// 除文件系统之外，解析所依赖的全部输入。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodFileResolver {
    pub machine: String,
    pub platform: String,
    pub no_local: bool,
    comm: String,
    na: String,
    lm: String,
    tasks: String,
}

impl GoodFileResolver {
    pub fn new(machine: &str, platform: &str, no_local: bool, caps: &Capabilities) -> Self {
        Self {
            machine: machine.to_string(),
            platform: platform.to_string(),
            no_local,
            comm: format!(".comm-{}", caps.comm),
            na: format!(".na-{}", caps.network_atomics),
            lm: format!(".lm-{}", caps.locale_model),
            tasks: format!(".tasks-{}", caps.tasks),
        }
    }

    pub fn for_directory(ctx: &DirectoryContext) -> Self {
        Self::new(&ctx.machine, &ctx.platform, ctx.no_local(), ctx.capabilities())
    }

    /// The nine capability combinations, most specific first.
    fn capability_tags(&self) -> [String; 9] {
        let (c, n, l, t) = (&self.comm, &self.na, &self.lm, &self.tasks);
        [
            format!("{c}{n}{l}"),
            format!("{c}{n}"),
            format!("{c}{l}"),
            format!("{c}{t}"),
            format!("{n}{l}"),
            c.clone(),
            t.clone(),
            n.clone(),
            l.clone(),
        ]
    }

    /// Every candidate for one suffix, in priority order.
    pub fn candidates(&self, base: &str, suffix: &str) -> Vec<String> {
        let mut out = Vec::with_capacity(13);
        out.push(format!("{base}.{}{suffix}.good", self.machine));
        if self.no_local {
            out.push(format!("{base}.no-local{suffix}.good"));
        }
        for tag in self.capability_tags() {
            out.push(format!("{base}{tag}{suffix}.good"));
        }
        out.push(format!("{base}.{}{suffix}.good", self.platform));
        out.push(format!("{base}{suffix}.good"));
        out
    }

    /// Resolves with an arbitrary existence check.
    ///
    /// Returns the first candidate that exists; when none does, the last one
    /// tried (the bare `<base><suffix>.good` of the last suffix) so the caller
    /// can report which file it expected.
    ///
    /// 返回第一个存在的候选文件；若都不存在，则返回最后尝试的候选（最后一个后缀的
    /// 裸 `<base><suffix>.good`），由调用方报告缺失。
    pub fn resolve_with<F>(&self, base: &str, suffixes: &[String], mut exists: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        let mut last = format!("{base}.good");
        for suffix in suffixes {
            for candidate in self.candidates(base, suffix) {
                if exists(&candidate) {
                    return candidate;
                }
                last = candidate;
            }
        }
        last
    }
}
