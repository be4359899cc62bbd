//! 块缓存
//!
//! 以 (描述符, 块对齐偏移) 为键、容量固定的 LRU 缓存，采用写回策略：
//! 块只在被淘汰、所属描述符关闭或显式 flush 时写回后端。
//!
//! 条目存放在槽位数组中，最近使用链表通过槽位下标双向链接，
//! 索引表把键映射到槽位下标。

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::block_dev::BLOCK_SZ;
use crate::error::Result;
use crate::stats::CacheStats;

/// 默认缓存容量（块数）
pub const DEFAULT_CAPACITY: usize = 10_000;

/// 一个块缓冲区
pub type Block = [u8; BLOCK_SZ];

/// 缓存键
///
/// `offset` 总是 [`BLOCK_SZ`] 的整数倍。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    /// 所属描述符
    pub fd: usize,
    /// 块起始字节偏移
    pub offset: u64,
}

impl BlockKey {
    /// 由描述符和块号构造
    pub fn new(fd: usize, block_id: u64) -> Self {
        Self {
            fd,
            offset: block_id * BLOCK_SZ as u64,
        }
    }

    /// 块号
    pub fn block_id(&self) -> u64 {
        self.offset / BLOCK_SZ as u64
    }
}

/// 写回目标
///
/// 块缓存不持有后端，淘汰或 flush 时通过此 trait 把块交给调用方写回。
pub trait WriteBack {
    /// 将 `key` 对应的块内容写回
    fn write_back(&mut self, key: BlockKey, data: &Block) -> Result<()>;
}

struct Entry {
    key: BlockKey,
    data: Box<Block>,
    /// 更近使用的邻居
    newer: Option<usize>,
    /// 更久未使用的邻居
    older: Option<usize>,
}

/// 块缓存管理器
pub struct BlockCache {
    slots: Vec<Option<Entry>>,
    /// 空闲槽位
    free: Vec<usize>,
    index: BTreeMap<BlockKey, usize>,
    /// 最近使用端
    head: Option<usize>,
    /// 最久未使用端
    tail: Option<usize>,
    capacity: usize,
    stats: CacheStats,
}

impl BlockCache {
    /// 创建容量为 `capacity` 块的缓存
    ///
    /// 容量为 0 时按 1 处理。
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            log::warn!("block cache capacity 0 is not usable, using 1");
        }
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: BTreeMap::new(),
            head: None,
            tail: None,
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    /// 缓存容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 是否缓存了 `key`，不改变使用顺序
    pub fn contains(&self, key: &BlockKey) -> bool {
        self.index.contains_key(key)
    }

    /// 属于 `fd` 的条目数
    pub fn count_for(&self, fd: usize) -> usize {
        self.index
            .range(BlockKey { fd, offset: 0 }..=BlockKey { fd, offset: u64::MAX })
            .count()
    }

    /// 统计信息
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// 按从最近到最久的顺序列出所有键
    pub fn keys_by_recency(&self) -> Vec<BlockKey> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cur = self.head;
        while let Some(slot) = cur {
            let entry = self.entry(slot);
            keys.push(entry.key);
            cur = entry.older;
        }
        keys
    }

    /// 查找块
    ///
    /// 命中时将条目提升为最近使用并返回其缓冲区；未命中时无副作用。
    pub fn lookup(&mut self, key: BlockKey) -> Option<&mut Block> {
        match self.index.get(&key).copied() {
            Some(slot) => {
                self.stats.hits += 1;
                log::trace!("cache hit fd={} block={}", key.fd, key.block_id());
                self.detach(slot);
                self.push_front(slot);
                Some(&mut *self.entry_mut(slot).data)
            }
            None => {
                self.stats.misses += 1;
                log::trace!("cache miss fd={} block={}", key.fd, key.block_id());
                None
            }
        }
    }

    /// 取得块缓冲区，不改变使用顺序也不计入统计
    pub fn peek_mut(&mut self, key: &BlockKey) -> Option<&mut Block> {
        let slot = *self.index.get(key)?;
        Some(&mut *self.entry_mut(slot).data)
    }

    /// 插入块
    ///
    /// 键已存在时替换其缓冲区并提升为最近使用；否则新建条目。
    /// 插入后条目数超过容量则淘汰最久未使用的条目。
    ///
    /// 淘汰写回失败时新块已经在缓存中，错误照常返回。
    pub fn insert<W: WriteBack>(
        &mut self,
        key: BlockKey,
        data: Box<Block>,
        sink: &mut W,
    ) -> Result<()> {
        self.stats.on_buffer_acquired();
        if let Some(slot) = self.index.get(&key).copied() {
            // 旧缓冲区在此释放
            self.entry_mut(slot).data = data;
            self.stats.on_buffer_released();
            self.detach(slot);
            self.push_front(slot);
            return Ok(());
        }

        let entry = Entry {
            key,
            data,
            newer: None,
            older: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.push_front(slot);
        self.stats.insertions += 1;

        if self.len() > self.capacity {
            self.evict_lru(sink)?;
        }
        Ok(())
    }

    /// 淘汰最久未使用的条目，返回其键
    pub fn evict_lru<W: WriteBack>(&mut self, sink: &mut W) -> Result<Option<BlockKey>> {
        match self.tail {
            Some(slot) => self.evict(slot, sink).map(Some),
            None => Ok(None),
        }
    }

    /// 淘汰并写回 `fd` 的全部条目，从最久未使用端开始
    ///
    /// 某个块写回失败时继续处理其余条目，最终返回第一个错误。
    pub fn remove_all<W: WriteBack>(&mut self, fd: usize, sink: &mut W) -> Result<usize> {
        let slots = self.slots_of(fd);
        let mut result = Ok(slots.len());
        for slot in slots {
            if let Err(err) = self.evict(slot, sink) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// 写回 `fd` 的全部条目但保留在缓存中
    pub fn flush<W: WriteBack>(&mut self, fd: usize, sink: &mut W) -> Result<usize> {
        let slots = self.slots_of(fd);
        for &slot in &slots {
            let entry = self.entry(slot);
            sink.write_back(entry.key, &entry.data)?;
            self.stats.write_backs += 1;
        }
        Ok(slots.len())
    }

    /// 从链表与索引中移除条目，写回后释放缓冲区
    fn evict<W: WriteBack>(&mut self, slot: usize, sink: &mut W) -> Result<BlockKey> {
        self.detach(slot);
        let entry = match self.slots[slot].take() {
            Some(entry) => entry,
            None => unreachable!("evicting empty slot {}", slot),
        };
        self.free.push(slot);
        self.index.remove(&entry.key);
        self.stats.evictions += 1;
        log::debug!(
            "evict fd={} block={}",
            entry.key.fd,
            entry.key.block_id()
        );
        let result = sink.write_back(entry.key, &entry.data);
        if result.is_ok() {
            self.stats.write_backs += 1;
        }
        drop(entry.data);
        self.stats.on_buffer_released();
        result.map(|_| entry.key)
    }

    /// `fd` 的全部槽位，按从最久到最近的顺序
    fn slots_of(&self, fd: usize) -> Vec<usize> {
        let mut slots = Vec::new();
        let mut cur = self.tail;
        while let Some(slot) = cur {
            let entry = self.entry(slot);
            if entry.key.fd == fd {
                slots.push(slot);
            }
            cur = entry.newer;
        }
        slots
    }

    fn entry(&self, slot: usize) -> &Entry {
        match &self.slots[slot] {
            Some(entry) => entry,
            None => unreachable!("dangling cache slot {}", slot),
        }
    }

    fn entry_mut(&mut self, slot: usize) -> &mut Entry {
        match &mut self.slots[slot] {
            Some(entry) => entry,
            None => unreachable!("dangling cache slot {}", slot),
        }
    }

    /// 把条目从链表摘下
    fn detach(&mut self, slot: usize) {
        let (newer, older) = {
            let entry = self.entry_mut(slot);
            (entry.newer.take(), entry.older.take())
        };
        match newer {
            Some(n) => self.entry_mut(n).older = older,
            None => self.head = older,
        }
        match older {
            Some(o) => self.entry_mut(o).newer = newer,
            None => self.tail = newer,
        }
    }

    /// 把已摘下的条目放到最近使用端
    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let entry = self.entry_mut(slot);
            entry.newer = None;
            entry.older = old_head;
        }
        match old_head {
            Some(h) => self.entry_mut(h).newer = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// 记录写回顺序的写回目标
    #[derive(Default)]
    struct Recorder {
        written: Vec<(BlockKey, u8)>,
        fail: bool,
    }

    impl WriteBack for Recorder {
        fn write_back(&mut self, key: BlockKey, data: &Block) -> Result<()> {
            if self.fail {
                return Err(Error::BackendWriteFailed);
            }
            self.written.push((key, data[0]));
            Ok(())
        }
    }

    fn block(fill: u8) -> Box<Block> {
        Box::new([fill; BLOCK_SZ])
    }

    fn key(fd: usize, block_id: u64) -> BlockKey {
        BlockKey::new(fd, block_id)
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut cache = BlockCache::new(3);
        let mut sink = Recorder::default();
        for i in 0..10u64 {
            cache.insert(key(0, i), block(i as u8), &mut sink).unwrap();
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(sink.written.len(), 7);
        // 写回顺序即插入顺序
        let evicted: Vec<u64> = sink.written.iter().map(|(k, _)| k.block_id()).collect();
        assert_eq!(evicted, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn lookup_promotes_to_most_recent() {
        let mut cache = BlockCache::new(2);
        let mut sink = Recorder::default();
        cache.insert(key(0, 0), block(0xA), &mut sink).unwrap();
        cache.insert(key(0, 1), block(0xB), &mut sink).unwrap();
        assert_eq!(cache.lookup(key(0, 0)).map(|b| b[0]), Some(0xA));
        cache.insert(key(0, 2), block(0xC), &mut sink).unwrap();
        // 块 1 成为最久未使用而被淘汰
        assert_eq!(sink.written, vec![(key(0, 1), 0xB)]);
        assert_eq!(cache.keys_by_recency(), vec![key(0, 2), key(0, 0)]);
    }

    #[test]
    fn lookup_miss_has_no_side_effect() {
        let mut cache = BlockCache::new(2);
        let mut sink = Recorder::default();
        cache.insert(key(0, 0), block(1), &mut sink).unwrap();
        cache.insert(key(1, 0), block(2), &mut sink).unwrap();
        assert!(cache.lookup(key(2, 0)).is_none());
        assert_eq!(cache.keys_by_recency(), vec![key(1, 0), key(0, 0)]);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn insert_existing_replaces_buffer() {
        let mut cache = BlockCache::new(2);
        let mut sink = Recorder::default();
        cache.insert(key(0, 0), block(1), &mut sink).unwrap();
        cache.insert(key(0, 1), block(2), &mut sink).unwrap();
        cache.insert(key(0, 0), block(3), &mut sink).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(sink.written.is_empty());
        assert_eq!(cache.keys_by_recency(), vec![key(0, 0), key(0, 1)]);
        assert_eq!(cache.lookup(key(0, 0)).map(|b| b[0]), Some(3));
        assert_eq!(cache.stats().insertions, 2);
        assert_eq!(cache.stats().live_buffers(), 2);
    }

    #[test]
    fn remove_all_only_touches_one_descriptor() {
        let mut cache = BlockCache::new(8);
        let mut sink = Recorder::default();
        cache.insert(key(1, 0), block(10), &mut sink).unwrap();
        cache.insert(key(2, 0), block(20), &mut sink).unwrap();
        cache.insert(key(1, 1), block(11), &mut sink).unwrap();
        cache.insert(key(2, 1), block(21), &mut sink).unwrap();

        assert_eq!(cache.remove_all(1, &mut sink), Ok(2));
        assert_eq!(sink.written, vec![(key(1, 0), 10), (key(1, 1), 11)]);
        assert_eq!(cache.count_for(1), 0);
        assert_eq!(cache.count_for(2), 2);
        assert_eq!(cache.keys_by_recency(), vec![key(2, 1), key(2, 0)]);
    }

    #[test]
    fn flush_keeps_entries_cached() {
        let mut cache = BlockCache::new(8);
        let mut sink = Recorder::default();
        cache.insert(key(1, 0), block(10), &mut sink).unwrap();
        cache.insert(key(2, 0), block(20), &mut sink).unwrap();
        assert_eq!(cache.flush(1, &mut sink), Ok(1));
        assert_eq!(sink.written, vec![(key(1, 0), 10)]);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key(1, 0)));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut cache = BlockCache::new(2);
        let mut sink = Recorder::default();
        for i in 0..100u64 {
            cache.insert(key(0, i), block(0), &mut sink).unwrap();
        }
        assert_eq!(cache.slots.len(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_write_back_is_reported() {
        let mut cache = BlockCache::new(1);
        let mut sink = Recorder::default();
        cache.insert(key(0, 0), block(1), &mut sink).unwrap();
        sink.fail = true;
        assert_eq!(
            cache.insert(key(0, 1), block(2), &mut sink),
            Err(Error::BackendWriteFailed)
        );
        // 淘汰仍然完成，容量不被突破
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(0, 1)));
        assert_eq!(cache.stats().write_backs, 0);
    }

    #[test]
    fn every_buffer_released_exactly_once() {
        let mut cache = BlockCache::new(4);
        let mut sink = Recorder::default();
        for fd in 0..3 {
            for i in 0..3u64 {
                cache.insert(key(fd, i), block(0), &mut sink).unwrap();
            }
        }
        cache.insert(key(2, 2), block(9), &mut sink).unwrap();
        for fd in 0..3 {
            cache.remove_all(fd, &mut sink).unwrap();
        }
        let stats = cache.stats();
        assert!(cache.is_empty());
        assert_eq!(stats.buffers_allocated, 10);
        assert_eq!(stats.buffers_released, 10);
        assert_eq!(stats.live_buffers(), 0);
    }

    #[test]
    fn zero_capacity_is_raised() {
        let cache = BlockCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }
}
