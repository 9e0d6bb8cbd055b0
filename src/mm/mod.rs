//! Memory Management Implementation
//! 地址空间分配 + 页表翻译 + 帧分配

mod address;
mod frame_allocator;
mod memory_set;
mod page_table;

pub use address::{FrameNum, PageLayout, PhysAddr, VPNRange, VirtAddr, VirtPageNum};
pub use frame_allocator::{BumpFrameAllocator, FrameAllocator};
pub use memory_set::{DataType, MemorySet, Segment};
pub use page_table::PageTable;
