//! MMU: 把地址空间分配与页表绑定组合成完整的操作
//!
//! 命令层的每一条命令最终都落到这里的某个方法上

use crate::config::{GLOBALS_NAME, STACK_NAME, STACK_SIZE, TEXT_NAME};
use crate::error::{MemoryError, MemoryResult};
use crate::mm::{DataType, FrameNum, PageTable, PhysAddr, Segment, VirtAddr, VirtPageNum};
use crate::task::{Pid, ProcessManager};

/// 模拟的MMU: 进程目录 + 全局页表
pub struct Mmu {
    processes: ProcessManager,
    page_table: PageTable,
}

impl Mmu {
    /// 以给定页大小构造, 页大小必须是2的幂
    pub fn new(page_size: usize) -> Self {
        Self {
            processes: ProcessManager::new(),
            page_table: PageTable::new(page_size),
        }
    }

    /// 创建进程并分配三个保留段
    /// 保留段的虚拟地址不向调用方报告
    pub fn create_process(&mut self, text_size: usize, data_size: usize) -> MemoryResult<Pid> {
        let pid = self.processes.create();
        // 保留段与普通变量走同一条分配路径, 以Char逐字节计数
        let reserved = [
            (TEXT_NAME, text_size),
            (GLOBALS_NAME, data_size),
            (STACK_NAME, STACK_SIZE),
        ];
        for (name, count) in reserved {
            if let Err(e) = self.allocate_variable(pid, name, DataType::Char, count) {
                // 中途失败: 整个进程回收, 不留下半初始化的目录项
                self.terminate_process(pid)?;
                return Err(e);
            }
        }
        Ok(pid)
    }

    /// 为pid分配一个具名变量, 返回其虚拟地址
    /// count必须大于0
    pub fn allocate_variable(
        &mut self,
        pid: Pid,
        name: &str,
        data_type: DataType,
        count: usize,
    ) -> MemoryResult<VirtAddr> {
        let layout = self.page_table.layout();
        let proc = self.processes.get_mut(pid)?;
        if proc.memory_set.lookup(name).is_some() {
            return Err(MemoryError::VariableAlreadyExists(name.to_string()));
        }

        let size = data_type.width() * count;
        let base = proc.memory_set.allocate(size)?;
        proc.memory_set.insert(name, data_type, size, base);

        // 变量触及的每一页都要绑定帧, 已绑定的页保持不变
        if let Err(e) = self.page_table.ensure_pages(pid, layout.span(base, size)) {
            // 帧池不足: 撤销刚插入的段, 地址空间恢复原状
            self.processes.get_mut(pid)?.memory_set.deallocate(name)?;
            return Err(e);
        }

        debug!("pid {} allocate {} ({} bytes) at {:?}", pid, name, size, base);
        Ok(base)
    }

    /// 释放变量, 并解除只有它占用的页的映射
    pub fn free_variable(&mut self, pid: Pid, name: &str) -> MemoryResult<()> {
        let layout = self.page_table.layout();
        let proc = self.processes.get(pid)?;
        let seg = proc
            .memory_set
            .lookup(name)
            .ok_or_else(|| MemoryError::VariableNotFound(name.to_string()))?;
        if seg.is_free() {
            return Err(MemoryError::CannotOperateOnFreeSpace);
        }

        // 变量跨越的每一页: 没有其他具名段占用时才解除映射
        let to_free: Vec<VirtPageNum> = seg
            .span(layout)
            .into_iter()
            .filter(|vpn| !proc.memory_set.page_occupied_by_other(name, *vpn, layout))
            .collect();
        for vpn in to_free {
            self.page_table.free_page(pid, vpn);
        }

        self.processes.get_mut(pid)?.memory_set.deallocate(name)?;
        debug!("pid {} free {}", pid, name);
        Ok(())
    }

    /// 终止进程: 移出目录并清空它的页表项
    /// pid之后不会再被使用
    pub fn terminate_process(&mut self, pid: Pid) -> MemoryResult<()> {
        self.processes.remove(pid)?;
        self.page_table.free_process(pid);
        info!("terminate process {}", pid);
        Ok(())
    }

    /// 读出变量第offset个元素的原始字节
    pub fn read_value(
        &self,
        pid: Pid,
        name: &str,
        offset: usize,
        memory: &[u8],
    ) -> MemoryResult<Vec<u8>> {
        let (va, pa, width) = self.element_address(pid, name, offset)?;
        let src = memory
            .get(pa.0..pa.0 + width)
            .ok_or(MemoryError::Unmapped(va))?;
        Ok(src.to_vec())
    }

    /// 把value写入变量第offset个元素
    /// value的长度必须等于元素宽度
    pub fn write_value(
        &self,
        pid: Pid,
        name: &str,
        offset: usize,
        value: &[u8],
        memory: &mut [u8],
    ) -> MemoryResult<()> {
        let (va, pa, width) = self.element_address(pid, name, offset)?;
        assert_eq!(value.len(), width, "value width mismatch for {}", name);
        let dst = memory
            .get_mut(pa.0..pa.0 + width)
            .ok_or(MemoryError::Unmapped(va))?;
        dst.copy_from_slice(value);
        Ok(())
    }

    /// 元素的(虚拟地址, 物理地址, 宽度)
    /// 元素整体按起始地址所在页翻译
    fn element_address(
        &self,
        pid: Pid,
        name: &str,
        offset: usize,
    ) -> MemoryResult<(VirtAddr, PhysAddr, usize)> {
        let proc = self.processes.get(pid)?;
        let seg = proc
            .memory_set
            .lookup(name)
            .ok_or_else(|| MemoryError::VariableNotFound(name.to_string()))?;
        if seg.is_free() {
            return Err(MemoryError::CannotOperateOnFreeSpace);
        }

        let width = seg.data_type.width();
        let va = VirtAddr(seg.start_va.0 + offset * width);
        let pa = self.page_table.translate(pid, va)?;
        Ok((va, pa, width))
    }

    /// 判断进程是否存活
    pub fn process_exists(&self, pid: Pid) -> bool {
        self.processes.exists(pid)
    }

    /// 存活进程的pid, 升序
    pub fn pids(&self) -> Vec<Pid> {
        self.processes.pids().collect()
    }

    /// 查找变量段, 空闲段不可见
    pub fn variable(&self, pid: Pid, name: &str) -> MemoryResult<&Segment> {
        let proc = self.processes.get(pid)?;
        let seg = proc
            .memory_set
            .lookup(name)
            .ok_or_else(|| MemoryError::VariableNotFound(name.to_string()))?;
        if seg.is_free() {
            return Err(MemoryError::CannotOperateOnFreeSpace);
        }
        Ok(seg)
    }

    /// 全部进程的全部具名段, 按pid序/地址序
    pub fn variables(&self) -> impl Iterator<Item = (Pid, &Segment)> + '_ {
        self.processes.iter().flat_map(|proc| {
            let pid = proc.pid;
            proc.memory_set
                .segments()
                .iter()
                .filter(|seg| !seg.is_free())
                .map(move |seg| (pid, seg))
        })
    }

    /// 全部页表项, 按pid-页号升序
    pub fn page_entries(&self) -> impl Iterator<Item = (Pid, VirtPageNum, FrameNum)> + '_ {
        self.page_table.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MEMORY_SIZE;

    fn entries_of(mmu: &Mmu, pid: Pid) -> Vec<(usize, usize)> {
        mmu.page_entries()
            .filter(|(p, _, _)| *p == pid)
            .map(|(_, vpn, frame)| (vpn.0, frame.0))
            .collect()
    }

    #[test]
    fn test_create_process_layout() {
        // 页大小1024: 栈段一直铺到偏移65835, 页0..=64被绑定
        let mut mmu = Mmu::new(1024);
        let pid = mmu.create_process(200, 100).unwrap();
        assert_eq!(pid, 1024);

        let text = mmu.variable(pid, "<TEXT>").unwrap();
        assert_eq!((text.start_va, text.size), (VirtAddr(0), 200));
        let globals = mmu.variable(pid, "<GLOBALS>").unwrap();
        assert_eq!((globals.start_va, globals.size), (VirtAddr(200), 100));
        let stack = mmu.variable(pid, "<STACK>").unwrap();
        assert_eq!((stack.start_va, stack.size), (VirtAddr(300), 65536));

        let entries = entries_of(&mmu, pid);
        assert_eq!(entries.len(), 65);
        assert_eq!(entries[0], (0, 0));
        assert_eq!(entries[64], (64, 64));
    }

    #[test]
    fn test_allocate_lands_after_stack_without_new_frame() {
        let mut mmu = Mmu::new(1024);
        let pid = mmu.create_process(200, 100).unwrap();

        // int x[3]: 12字节, 紧跟在栈段之后
        let va = mmu.allocate_variable(pid, "x", DataType::Int, 3).unwrap();
        assert_eq!(va, VirtAddr(65836));
        // 页64已被栈段绑定, 不分配新帧
        assert_eq!(entries_of(&mmu, pid).len(), 65);
    }

    #[test]
    fn test_free_keeps_shared_page_mapped() {
        let mut mmu = Mmu::new(1024);
        let pid = mmu.create_process(200, 100).unwrap();
        mmu.allocate_variable(pid, "x", DataType::Int, 3).unwrap();

        mmu.free_variable(pid, "x").unwrap();
        // 页64上还有栈段, 映射保留
        assert_eq!(entries_of(&mmu, pid).len(), 65);
        // x的空间并回尾部空闲段
        assert!(matches!(
            mmu.variable(pid, "x"),
            Err(MemoryError::VariableNotFound(_))
        ));
        let last_free = mmu
            .variable(pid, "<STACK>")
            .map(|seg| seg.end_va())
            .unwrap();
        assert_eq!(last_free, VirtAddr(65836));
    }

    #[test]
    fn test_free_unmaps_exclusive_pages() {
        let mut mmu = Mmu::new(1024);
        let pid = mmu.create_process(200, 100).unwrap();
        // 2048字节从65836开始, 跨页64..=66; 页65和66只属于它
        mmu.allocate_variable(pid, "buf", DataType::Char, 2048)
            .unwrap();
        assert_eq!(entries_of(&mmu, pid).len(), 67);

        mmu.free_variable(pid, "buf").unwrap();
        let entries = entries_of(&mmu, pid);
        assert_eq!(entries.len(), 65);
        assert!(!entries.iter().any(|(vpn, _)| *vpn == 65 || *vpn == 66));
    }

    #[test]
    fn test_duplicate_variable_name() {
        let mut mmu = Mmu::new(1024);
        let pid = mmu.create_process(200, 100).unwrap();
        mmu.allocate_variable(pid, "x", DataType::Int, 1).unwrap();
        assert_eq!(
            mmu.allocate_variable(pid, "x", DataType::Char, 1),
            Err(MemoryError::VariableAlreadyExists("x".to_string()))
        );
    }

    #[test]
    fn test_operations_on_missing_process() {
        let mut mmu = Mmu::new(1024);
        assert_eq!(
            mmu.allocate_variable(7, "x", DataType::Int, 1),
            Err(MemoryError::ProcessNotFound(7))
        );
        assert_eq!(
            mmu.free_variable(7, "x"),
            Err(MemoryError::ProcessNotFound(7))
        );
        assert_eq!(
            mmu.terminate_process(7),
            Err(MemoryError::ProcessNotFound(7))
        );
    }

    #[test]
    fn test_virtual_out_of_memory() {
        let mut mmu = Mmu::new(1024);
        let pid = mmu.create_process(200, 100).unwrap();
        // 地址空间里已没有这么大的连续空闲区间
        assert_eq!(
            mmu.allocate_variable(pid, "huge", DataType::Char, MEMORY_SIZE),
            Err(MemoryError::OutOfMemory)
        );
    }

    #[test]
    fn test_frame_exhaustion_rolls_back_allocation() {
        // 页大小32MiB: 帧池一共2帧
        let mut mmu = Mmu::new(32 * 1024 * 1024);
        let a = mmu.create_process(200, 100).unwrap();
        let b = mmu.create_process(200, 100).unwrap();
        assert_eq!(mmu.page_entries().count(), 2);

        // b的变量跨进第二页, 但帧池已空
        let before: Vec<(VirtAddr, usize)> = mmu
            .variables()
            .filter(|(pid, _)| *pid == b)
            .map(|(_, seg)| (seg.start_va, seg.size))
            .collect();
        assert_eq!(
            mmu.allocate_variable(b, "big", DataType::Char, 33 * 1024 * 1024),
            Err(MemoryError::OutOfMemory)
        );

        // 地址空间和页表都保持原状
        let after: Vec<(VirtAddr, usize)> = mmu
            .variables()
            .filter(|(pid, _)| *pid == b)
            .map(|(_, seg)| (seg.start_va, seg.size))
            .collect();
        assert_eq!(before, after);
        assert_eq!(mmu.page_entries().count(), 2);
        assert!(mmu.process_exists(a));
    }

    #[test]
    fn test_create_process_rolls_back_on_exhaustion() {
        // 帧池只有1帧: 第一个进程占满, 第二个创建失败且不留痕迹
        let mut mmu = Mmu::new(MEMORY_SIZE);
        let a = mmu.create_process(200, 100).unwrap();
        assert_eq!(
            mmu.create_process(200, 100),
            Err(MemoryError::OutOfMemory)
        );
        assert_eq!(mmu.pids(), vec![a]);
        assert_eq!(mmu.page_entries().count(), 1);
    }

    #[test]
    fn test_terminate_clears_page_table_and_pid() {
        let mut mmu = Mmu::new(1024);
        let pid = mmu.create_process(200, 100).unwrap();
        mmu.terminate_process(pid).unwrap();

        assert!(!mmu.process_exists(pid));
        assert_eq!(mmu.page_entries().count(), 0);
        // pid不复用
        assert_eq!(mmu.create_process(200, 100).unwrap(), 1025);
    }

    #[test]
    fn test_value_round_trip() {
        let mut mmu = Mmu::new(1024);
        let mut memory = vec![0u8; MEMORY_SIZE];
        let pid = mmu.create_process(200, 100).unwrap();
        mmu.allocate_variable(pid, "x", DataType::Int, 3).unwrap();

        mmu.write_value(pid, "x", 1, &42i32.to_le_bytes(), &mut memory)
            .unwrap();
        let bytes = mmu.read_value(pid, "x", 1, &memory).unwrap();
        assert_eq!(i32::from_le_bytes(bytes.try_into().unwrap()), 42);

        // 其他元素不受影响
        let bytes = mmu.read_value(pid, "x", 0, &memory).unwrap();
        assert_eq!(i32::from_le_bytes(bytes.try_into().unwrap()), 0);
    }

    #[test]
    fn test_value_goes_through_translation() {
        let mut mmu = Mmu::new(1024);
        let mut memory = vec![0u8; MEMORY_SIZE];
        let pid = mmu.create_process(200, 100).unwrap();
        mmu.allocate_variable(pid, "c", DataType::Char, 1).unwrap();

        mmu.write_value(pid, "c", 0, b"Z", &mut memory).unwrap();
        // 变量在偏移65836: 页64(帧64)内偏移300 -> 物理65836
        assert_eq!(memory[64 * 1024 + 300], b'Z');
    }

    #[test]
    fn test_free_space_is_not_readable() {
        let mut mmu = Mmu::new(1024);
        let memory = vec![0u8; MEMORY_SIZE];
        let pid = mmu.create_process(200, 100).unwrap();
        assert_eq!(
            mmu.read_value(pid, "<FREE_SPACE>", 0, &memory),
            Err(MemoryError::CannotOperateOnFreeSpace)
        );
        assert_eq!(
            mmu.free_variable(pid, "<FREE_SPACE>"),
            Err(MemoryError::CannotOperateOnFreeSpace)
        );
        assert!(matches!(
            mmu.variable(pid, "<FREE_SPACE>"),
            Err(MemoryError::CannotOperateOnFreeSpace)
        ));
    }

    #[test]
    fn test_variables_projection_skips_free_space() {
        let mut mmu = Mmu::new(1024);
        let pid = mmu.create_process(200, 100).unwrap();
        mmu.allocate_variable(pid, "x", DataType::Long, 2).unwrap();

        let names: Vec<&str> = mmu
            .variables()
            .map(|(_, seg)| seg.name.as_str())
            .collect();
        assert_eq!(names, vec!["<TEXT>", "<GLOBALS>", "<STACK>", "x"]);
    }
}
