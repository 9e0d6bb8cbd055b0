//! Global Config Define

/// 模拟物理内存的大小, 同时也是每个进程地址空间的容量 (64 MiB)
pub const MEMORY_SIZE: usize = 64 * 1024 * 1024;
/// size of process stack segment (64 KiB)
pub const STACK_SIZE: usize = 65536;
/// 第一个进程的PID
pub const INIT_PID: u32 = 1024;

/// 空闲段共用的保留名
pub const FREE_SPACE_NAME: &str = "<FREE_SPACE>";
/// 进程创建时自动分配的代码段名
pub const TEXT_NAME: &str = "<TEXT>";
/// 进程创建时自动分配的全局数据段名
pub const GLOBALS_NAME: &str = "<GLOBALS>";
/// 进程创建时自动分配的栈段名
pub const STACK_NAME: &str = "<STACK>";
