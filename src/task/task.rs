//! Type related to process

use crate::config::MEMORY_SIZE;
use crate::mm::MemorySet;

use super::pid::Pid;

/// struct of PCB
pub struct ProcessControlBlock {
    /// Pid
    pub pid: Pid,
    /// address space
    pub memory_set: MemorySet,
}

impl ProcessControlBlock {
    /// 新建进程, 地址空间初始为一整段空闲空间
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            memory_set: MemorySet::new_bare(MEMORY_SIZE),
        }
    }
}
