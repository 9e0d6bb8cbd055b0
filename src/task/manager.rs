use std::collections::BTreeMap;

use crate::error::{MemoryError, MemoryResult};

use super::pid::{Pid, PidAllocator};
use super::task::ProcessControlBlock;

/// 存活进程的目录
pub struct ProcessManager {
    pid_allocator: PidAllocator,
    processes: BTreeMap<Pid, ProcessControlBlock>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            pid_allocator: PidAllocator::new(),
            processes: BTreeMap::new(),
        }
    }

    /// 创建并登记一个新进程
    pub fn create(&mut self) -> Pid {
        let pid = self.pid_allocator.alloc();
        self.processes.insert(pid, ProcessControlBlock::new(pid));
        info!("create process {}", pid);
        pid
    }

    /// 注销进程并移出目录
    pub fn remove(&mut self, pid: Pid) -> MemoryResult<ProcessControlBlock> {
        self.processes
            .remove(&pid)
            .ok_or(MemoryError::ProcessNotFound(pid))
    }

    /// 判断进程是否存活
    pub fn exists(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn get(&self, pid: Pid) -> MemoryResult<&ProcessControlBlock> {
        self.processes
            .get(&pid)
            .ok_or(MemoryError::ProcessNotFound(pid))
    }

    pub fn get_mut(&mut self, pid: Pid) -> MemoryResult<&mut ProcessControlBlock> {
        self.processes
            .get_mut(&pid)
            .ok_or(MemoryError::ProcessNotFound(pid))
    }

    /// 存活进程的pid, 升序
    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.processes.keys().copied()
    }

    /// 遍历全部进程, 按pid升序
    pub fn iter(&self) -> impl Iterator<Item = &ProcessControlBlock> {
        self.processes.values()
    }
}
