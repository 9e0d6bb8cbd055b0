//! Recoverable errors of the simulator core

use thiserror::Error;

use crate::mm::VirtAddr;
use crate::task::Pid;

/// 核心操作的错误类型
/// 所有错误都只中止当前命令, 不破坏已有状态
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// 进程不存在
    #[error("process {0} does not exist")]
    ProcessNotFound(Pid),
    /// 变量不存在
    #[error("variable {0} does not exist")]
    VariableNotFound(String),
    /// 变量名重复
    #[error("variable {0} already exists")]
    VariableAlreadyExists(String),
    /// 没有足够大的空闲区间, 或帧池耗尽
    #[error("not enough free memory for allocation")]
    OutOfMemory,
    /// 地址所在页没有映射
    #[error("{0:?} is not mapped")]
    Unmapped(VirtAddr),
    /// 无法识别的元素类型
    #[error("unrecognized data type '{0}'")]
    InvalidKind(String),
    /// 对空闲段读/写/打印
    #[error("cannot operate on free space")]
    CannotOperateOnFreeSpace,
}

/// Result alias for core operations
pub type MemoryResult<T> = Result<T, MemoryError>;
