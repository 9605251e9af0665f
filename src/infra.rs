//! # Infrastructure Module / 基础设施模块
//!
//! Services the driver leans on: running external processes under a deadline,
//! invoking hook scripts, limiting concurrently running executables, and small
//! file system helpers.
//!
//! 驱动程序依赖的服务：在截止时间内运行外部进程、调用钩子脚本、
//! 限制同时运行的可执行程序数量，以及一些文件系统辅助函数。

pub mod command;
pub mod fs;
pub mod hooks;
pub mod limiter;
