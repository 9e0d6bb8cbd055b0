//! PID Allocator

use crate::config::INIT_PID;

/// pid_t
pub type Pid = u32;

/// PID分配器, 从INIT_PID开始单调递增
/// 进程终止后pid不会被重新使用
pub struct PidAllocator {
    current: Pid,
}

impl PidAllocator {
    /// 创建一个新的Pid Allocator
    pub fn new() -> Self {
        PidAllocator { current: INIT_PID }
    }

    /// 分配PID
    pub fn alloc(&mut self) -> Pid {
        self.current += 1;
        self.current - 1
    }
}
