//! Implementation of Segment and MemorySet

use crate::config::FREE_SPACE_NAME;
use crate::error::{MemoryError, MemoryResult};

use super::address::{PageLayout, VPNRange, VirtAddr, VirtPageNum};

/// 变量的元素类型, 决定元素宽度
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DataType {
    /// 空闲段
    FreeSpace,
    /// 1 byte
    Char,
    /// 2 bytes
    Short,
    /// 4 bytes
    Int,
    /// 4 bytes
    Float,
    /// 8 bytes
    Long,
    /// 8 bytes
    Double,
}

impl DataType {
    /// 元素宽度(字节)
    pub fn width(&self) -> usize {
        match self {
            DataType::FreeSpace => 0,
            DataType::Char => 1,
            DataType::Short => 2,
            DataType::Int | DataType::Float => 4,
            DataType::Long | DataType::Double => 8,
        }
    }

    /// 解析命令中的类型名
    pub fn from_token(token: &str) -> MemoryResult<Self> {
        match token {
            "char" => Ok(DataType::Char),
            "short" => Ok(DataType::Short),
            "int" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            "long" => Ok(DataType::Long),
            "double" => Ok(DataType::Double),
            _ => Err(MemoryError::InvalidKind(token.to_string())),
        }
    }
}

/// 地址空间中的一段: 具名变量或空闲空间
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// 变量名, 空闲段统一使用保留名
    pub name: String,
    /// 元素类型
    pub data_type: DataType,
    /// 段基址
    pub start_va: VirtAddr,
    /// 字节大小
    pub size: usize,
}

impl Segment {
    fn free(start_va: VirtAddr, size: usize) -> Self {
        Segment {
            name: FREE_SPACE_NAME.to_string(),
            data_type: DataType::FreeSpace,
            start_va,
            size,
        }
    }

    /// 是否为空闲段
    pub fn is_free(&self) -> bool {
        self.data_type == DataType::FreeSpace
    }

    /// 段末尾后第一个字节的地址
    pub fn end_va(&self) -> VirtAddr {
        VirtAddr(self.start_va.0 + self.size)
    }

    /// 段跨越的全部页面
    pub fn span(&self, layout: PageLayout) -> VPNRange {
        layout.span(self.start_va, self.size)
    }
}

/// Address Space
/// segments按基址有序, 两两不重叠且无空洞, 大小总和恒等于capacity
pub struct MemorySet {
    segments: Vec<Segment>,
    capacity: usize,
}

impl MemorySet {
    /// 创建一个新的地址空间, 初始为一整段空闲空间
    pub fn new_bare(capacity: usize) -> Self {
        Self {
            segments: vec![Segment::free(VirtAddr(0), capacity)],
            capacity,
        }
    }

    /// 地址空间容量(字节)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 全部段, 按基址升序
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// first-fit: 从第一个足够大的空闲段头部截取size字节, 返回截取区间的基址
    /// 截取后空闲段基址前移, 继续表示剩下的尾部; 截空的空闲段被移除
    pub fn allocate(&mut self, size: usize) -> MemoryResult<VirtAddr> {
        let idx = self
            .segments
            .iter()
            .position(|seg| seg.is_free() && seg.size >= size)
            .ok_or(MemoryError::OutOfMemory)?;

        let base = self.segments[idx].start_va;
        self.segments[idx].start_va = VirtAddr(base.0 + size);
        self.segments[idx].size -= size;
        if self.segments[idx].size == 0 {
            self.segments.remove(idx);
        }

        Ok(base)
    }

    /// 按基址序插入一个具名段
    /// 必须配合allocate使用, start_va是allocate刚返回的基址
    pub fn insert(&mut self, name: &str, data_type: DataType, size: usize, start_va: VirtAddr) {
        let seg = Segment {
            name: name.to_string(),
            data_type,
            start_va,
            size,
        };
        let idx = self.segments.partition_point(|s| s.start_va < start_va);
        self.segments.insert(idx, seg);
    }

    /// 按名字查找段, 返回第一个匹配
    pub fn lookup(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|seg| seg.name == name)
    }

    /// 释放具名段: 转为空闲段, 并与紧邻的空闲前驱/后继合并
    /// 返回被释放段原来的内容
    pub fn deallocate(&mut self, name: &str) -> MemoryResult<Segment> {
        let idx = self
            .segments
            .iter()
            .position(|seg| seg.name == name)
            .ok_or_else(|| MemoryError::VariableNotFound(name.to_string()))?;

        let freed = self.segments[idx].clone();
        self.segments[idx].name = FREE_SPACE_NAME.to_string();
        self.segments[idx].data_type = DataType::FreeSpace;

        // 合并只看列表中紧邻的两个段
        if idx + 1 < self.segments.len() && self.segments[idx + 1].is_free() {
            self.segments[idx].size += self.segments[idx + 1].size;
            self.segments.remove(idx + 1);
        }
        if idx > 0 && self.segments[idx - 1].is_free() {
            self.segments[idx - 1].size += self.segments[idx].size;
            self.segments.remove(idx);
        }

        Ok(freed)
    }

    /// 页vpn是否被name以外的具名段占用
    /// 用于决定释放变量时能否一并解除页的映射
    pub fn page_occupied_by_other(&self, name: &str, vpn: VirtPageNum, layout: PageLayout) -> bool {
        self.segments
            .iter()
            .filter(|seg| !seg.is_free() && seg.name != name && seg.size > 0)
            .any(|seg| seg.span(layout).contains(vpn))
    }
}
