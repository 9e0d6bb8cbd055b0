//! 以(pid, 页号)为键的全局页表

use std::collections::BTreeMap;

use crate::config::MEMORY_SIZE;
use crate::error::{MemoryError, MemoryResult};
use crate::task::Pid;

use super::address::{FrameNum, PageLayout, PhysAddr, VPNRange, VirtAddr, VirtPageNum};
use super::frame_allocator::{BumpFrameAllocator, FrameAllocator};

/// Page Table Structure
/// 所有进程共用一张表, 表项在页第一次被分配到变量时懒建立
pub struct PageTable {
    layout: PageLayout,
    entries: BTreeMap<(Pid, VirtPageNum), FrameNum>,
    allocator: BumpFrameAllocator,
}

impl PageTable {
    /// 创建一个新的空页表
    /// 帧池大小由页大小决定
    pub fn new(page_size: usize) -> Self {
        PageTable {
            layout: PageLayout::new(page_size),
            entries: BTreeMap::new(),
            allocator: BumpFrameAllocator::new(MEMORY_SIZE / page_size),
        }
    }

    /// 当前页表使用的页大小参数
    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    /// 保证range中的每一页都绑定了帧
    /// 已绑定的页保持原帧不动; 帧池不足时不做任何修改
    pub fn ensure_pages(&mut self, pid: Pid, range: VPNRange) -> MemoryResult<()> {
        let needed = range
            .into_iter()
            .filter(|vpn| !self.entries.contains_key(&(pid, *vpn)))
            .count();
        if needed > self.allocator.remaining() {
            return Err(MemoryError::OutOfMemory);
        }

        for vpn in range {
            if self.entries.contains_key(&(pid, vpn)) {
                continue;
            }
            // 容量已检查, alloc必定成功
            let frame = self.allocator.alloc().unwrap();
            debug!("pid {} bind {:?} -> {:?}", pid, vpn, frame);
            self.entries.insert((pid, vpn), frame);
        }

        Ok(())
    }

    /// 将pid的虚拟地址翻译为物理地址
    pub fn translate(&self, pid: Pid, va: VirtAddr) -> MemoryResult<PhysAddr> {
        let vpn = self.layout.vpn_of(va);
        let offset = self.layout.offset_of(va);
        match self.entries.get(&(pid, vpn)) {
            Some(frame) => Ok(PhysAddr(usize::from(self.layout.frame_base(*frame)) + offset)),
            None => Err(MemoryError::Unmapped(va)),
        }
    }

    /// 判断(pid, vpn)是否有表项
    pub fn is_mapped(&self, pid: Pid, vpn: VirtPageNum) -> bool {
        self.entries.contains_key(&(pid, vpn))
    }

    /// 移除(pid, vpn)的表项, 不存在则忽略
    pub fn free_page(&mut self, pid: Pid, vpn: VirtPageNum) {
        if let Some(frame) = self.entries.remove(&(pid, vpn)) {
            debug!("pid {} unbind {:?} -> {:?}", pid, vpn, frame);
            self.allocator.dealloc(frame);
        }
    }

    /// 移除pid的全部表项
    pub fn free_process(&mut self, pid: Pid) {
        // 键按(pid, vpn)排序, 同一pid的表项是连续区间
        let keys: Vec<(Pid, VirtPageNum)> = self
            .entries
            .range((pid, VirtPageNum(0))..=(pid, VirtPageNum(usize::MAX)))
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            let frame = self.entries.remove(&key).unwrap();
            self.allocator.dealloc(frame);
        }
        debug!("pid {} page table cleared", pid);
    }

    /// 全部表项, 按pid-页号升序
    pub fn entries(&self) -> impl Iterator<Item = (Pid, VirtPageNum, FrameNum)> + '_ {
        self.entries
            .iter()
            .map(|((pid, vpn), frame)| (*pid, *vpn, *frame))
    }
}
