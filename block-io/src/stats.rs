//! 缓存统计与缓冲区分配计数
//!
//! 命中、未命中、淘汰等计数始终维护；缓冲区分配计数只在测试或
//! `alloc-stats` feature 下编译，用于检测缓冲区泄漏或重复释放。

/// 块缓存统计信息
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 查找命中次数
    pub hits: usize,
    /// 查找未命中次数
    pub misses: usize,
    /// 新建条目次数（替换已有条目不计入）
    pub insertions: usize,
    /// 淘汰条目次数
    pub evictions: usize,
    /// 写回后端的块数（淘汰与 flush 都计入）
    pub write_backs: usize,
    /// 交给缓存的块缓冲区数量
    #[cfg(any(test, feature = "alloc-stats"))]
    pub buffers_allocated: usize,
    /// 缓存释放的块缓冲区数量
    #[cfg(any(test, feature = "alloc-stats"))]
    pub buffers_released: usize,
}

impl CacheStats {
    #[inline]
    pub(crate) fn on_buffer_acquired(&mut self) {
        #[cfg(any(test, feature = "alloc-stats"))]
        {
            self.buffers_allocated += 1;
        }
    }

    #[inline]
    pub(crate) fn on_buffer_released(&mut self) {
        #[cfg(any(test, feature = "alloc-stats"))]
        {
            self.buffers_released += 1;
        }
    }

    /// 仍由缓存持有的缓冲区数量
    #[cfg(any(test, feature = "alloc-stats"))]
    pub fn live_buffers(&self) -> usize {
        self.buffers_allocated - self.buffers_released
    }
}
