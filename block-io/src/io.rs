//! 块缓存 I/O 引擎
//!
//! 把任意字节范围的读写翻译为整块操作：计算覆盖的块范围，
//! 经块缓存取得或创建块，在缓存缓冲区中合并部分块，最后更新光标与大小。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;
use spin::Mutex;

use crate::block_cache::{Block, BlockCache, BlockKey, WriteBack};
use crate::block_dev::{StorageBackend, BLOCK_SZ};
use crate::error::{Error, Result};
use crate::file::{FileTable, OpenFlags};
use crate::stats::CacheStats;

/// 块缓存 I/O 上下文
///
/// 持有存储后端、文件表与块缓存，所有操作都经由它完成。
/// 被丢弃时会关闭所有仍打开的描述符。
pub struct BlockIo<B: StorageBackend> {
    backend: B,
    files: FileTable<B::Handle>,
    cache: BlockCache,
}

/// 把淘汰的块写回所属描述符的后端句柄
struct Sink<'a, B: StorageBackend> {
    files: &'a FileTable<B::Handle>,
    backend: &'a mut B,
}

impl<B: StorageBackend> WriteBack for Sink<'_, B> {
    fn write_back(&mut self, key: BlockKey, data: &Block) -> Result<()> {
        let file = self.files.get(key.fd)?;
        self.backend
            .write_block(file.handle(), key.offset, data)
            .map_err(|err| {
                log::warn!(
                    "write back fd={} offset={} failed: {:?}",
                    key.fd,
                    key.offset,
                    err
                );
                Error::BackendWriteFailed
            })
    }
}

/// 字节范围 `[start, start + len)` 覆盖的块号范围
///
/// 只包含与该范围真正相交的块；`len` 为 0 时为空。
/// 范围越过 `u64::MAX` 时截断到最后一个块。
pub fn block_span(start: u64, len: usize) -> Range<u64> {
    if len == 0 {
        return 0..0;
    }
    let last = start.saturating_add(len as u64 - 1);
    let bs = BLOCK_SZ as u64;
    start / bs..last / bs + 1
}

/// 字节范围 `[start, start + len)` 的末尾，越过 `u64::MAX` 时为 `OutOfRange`
fn range_end(start: u64, len: usize) -> Result<u64> {
    start.checked_add(len as u64).ok_or(Error::OutOfRange)
}

/// 块 `block_id` 与字节范围 `[start, end)` 的交集
///
/// 返回 (块内范围, 调用方缓冲区内范围)。
fn overlap(block_id: u64, start: u64, end: u64) -> (Range<usize>, Range<usize>) {
    let base = block_id * BLOCK_SZ as u64;
    let lo = start.max(base);
    let hi = end.min(base.saturating_add(BLOCK_SZ as u64));
    (
        (lo - base) as usize..(hi - base) as usize,
        (lo - start) as usize..(hi - start) as usize,
    )
}

impl<B: StorageBackend> BlockIo<B> {
    /// 创建 I/O 上下文，缓存容量为 `capacity` 块
    pub fn new(backend: B, capacity: usize) -> Self {
        Self {
            backend,
            files: FileTable::new(),
            cache: BlockCache::new(capacity),
        }
    }

    /// 包装为可共享的上下文，所有操作共用一把锁
    pub fn into_shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    /// 打开文件，不存在时创建
    pub fn open(&mut self, path: &str) -> Result<usize> {
        self.open_with(path, OpenFlags::CREATE)
    }

    /// 按标志打开文件，返回新描述符
    pub fn open_with(&mut self, path: &str, flags: OpenFlags) -> Result<usize> {
        let (handle, size) = self.backend.handle_for(path, flags).map_err(|err| {
            log::warn!("open {} failed: {:?}", path, err);
            Error::OpenFailed
        })?;
        let fd = self.files.register(handle, size);
        log::info!("open {} -> fd={} size={}", path, fd, size);
        Ok(fd)
    }

    /// 关闭描述符
    ///
    /// 先淘汰并写回该描述符的全部缓存块，再释放后端句柄。
    /// 写回失败时仍完成关闭，返回第一个错误。
    pub fn close(&mut self, fd: usize) -> Result<()> {
        self.files.check_closable(fd)?;
        let flushed = self.cache.remove_all(
            fd,
            &mut Sink {
                files: &self.files,
                backend: &mut self.backend,
            },
        );
        let handle = self.files.take_handle(fd)?;
        let released = self.backend.release(handle).map_err(|err| {
            log::warn!("release fd={} failed: {:?}", fd, err);
            Error::ReleaseFailed
        });
        log::info!("close fd={}", fd);
        let blocks = flushed?;
        log::debug!("fd={} wrote back {} blocks on close", fd, blocks);
        released
    }

    /// 设置光标，不做越界检查
    pub fn seek(&mut self, fd: usize, offset: u64) -> Result<u64> {
        self.files.get_mut(fd)?.cursor = offset;
        Ok(offset)
    }

    /// 从光标处读取 `len` 字节
    ///
    /// 超出文件逻辑大小时返回 `OutOfRange`，不做短读。
    pub fn read(&mut self, fd: usize, len: usize) -> Result<Vec<u8>> {
        // 先检查范围再分配
        self.readable_end(fd, len)?;
        let mut buf = vec![0u8; len];
        self.read_into(fd, &mut buf)?;
        Ok(buf)
    }

    /// 从光标处读取恰好 `buf.len()` 字节到 `buf`
    pub fn read_into(&mut self, fd: usize, buf: &mut [u8]) -> Result<()> {
        let start = self.files.get(fd)?.cursor;
        let end = self.readable_end(fd, buf.len())?;
        for block_id in block_span(start, buf.len()) {
            let (in_block, in_buf) = overlap(block_id, start, end);
            let data = self.block(fd, block_id)?;
            buf[in_buf].copy_from_slice(&data[in_block]);
        }
        self.files.get_mut(fd)?.cursor = end;
        Ok(())
    }

    /// 在光标处写入 `buf`
    ///
    /// 只修改缓存中的块；超出逻辑大小时扩展大小。
    /// 写入末尾越过 `u64::MAX` 时返回 `OutOfRange`，不触及任何块。
    /// 中途后端失败时，出错块的缓存状态不确定。
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<()> {
        let start = self.files.get(fd)?.cursor;
        let end = range_end(start, buf.len())?;
        for block_id in block_span(start, buf.len()) {
            let (in_block, in_buf) = overlap(block_id, start, end);
            let data = self.block(fd, block_id)?;
            data[in_block].copy_from_slice(&buf[in_buf]);
        }
        let file = self.files.get_mut(fd)?;
        if end > file.size {
            file.size = end;
        }
        file.cursor = end;
        Ok(())
    }

    /// 将描述符的全部缓存块写回后端，块仍保留在缓存中
    pub fn fsync(&mut self, fd: usize) -> Result<()> {
        self.files.get(fd)?;
        let blocks = self.cache.flush(
            fd,
            &mut Sink {
                files: &self.files,
                backend: &mut self.backend,
            },
        )?;
        log::debug!("fsync fd={} wrote back {} blocks", fd, blocks);
        let file = self.files.get(fd)?;
        self.backend.sync(file.handle()).map_err(|err| {
            log::warn!("sync fd={} failed: {:?}", fd, err);
            Error::BackendWriteFailed
        })
    }

    /// 关闭所有仍打开的描述符，返回第一个错误
    pub fn close_all(&mut self) -> Result<()> {
        let open: Vec<usize> = self.files.open_descriptors().collect();
        let mut result = Ok(());
        for fd in open {
            if let Err(err) = self.close(fd) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// 文件逻辑大小
    pub fn file_size(&self, fd: usize) -> Result<u64> {
        Ok(self.files.get(fd)?.size)
    }

    /// 当前光标位置
    pub fn tell(&self, fd: usize) -> Result<u64> {
        Ok(self.files.get(fd)?.cursor)
    }

    /// 描述符是否处于打开状态
    pub fn is_open(&self, fd: usize) -> bool {
        self.files.is_open(fd)
    }

    /// 缓存中属于 `fd` 的块数
    pub fn cached_blocks(&self, fd: usize) -> usize {
        self.cache.count_for(fd)
    }

    /// 块缓存
    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// 缓存统计信息
    pub fn stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    /// 存储后端
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 存储后端的可变引用
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// 从光标读取 `len` 字节后的位置，超出逻辑大小时为 `OutOfRange`
    fn readable_end(&self, fd: usize, len: usize) -> Result<u64> {
        let file = self.files.get(fd)?;
        match range_end(file.cursor, len) {
            Ok(end) if end <= file.size => Ok(end),
            _ => Err(Error::OutOfRange),
        }
    }

    /// 取得 `fd` 的第 `block_id` 块，未命中时从后端读入缓存
    fn block(&mut self, fd: usize, block_id: u64) -> Result<&mut Block> {
        let key = BlockKey::new(fd, block_id);
        if self.cache.lookup(key).is_none() {
            let mut data = Box::new([0u8; BLOCK_SZ]);
            let file = self.files.get(fd)?;
            self.backend
                .read_block(file.handle(), key.offset, &mut data)
                .map_err(|err| {
                    log::warn!(
                        "read block fd={} offset={} failed: {:?}",
                        fd,
                        key.offset,
                        err
                    );
                    Error::BackendReadFailed
                })?;
            self.cache.insert(
                key,
                data,
                &mut Sink {
                    files: &self.files,
                    backend: &mut self.backend,
                },
            )?;
        }
        match self.cache.peek_mut(&key) {
            Some(data) => Ok(data),
            None => unreachable!("block fd={} offset={} missing after insert", fd, key.offset),
        }
    }
}

impl<B: StorageBackend> Drop for BlockIo<B> {
    fn drop(&mut self) {
        if let Err(err) = self.close_all() {
            log::error!("closing descriptors on drop failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BS: u64 = BLOCK_SZ as u64;

    #[test]
    fn span_covers_only_touched_blocks() {
        assert_eq!(block_span(0, 10), 0..1);
        assert_eq!(block_span(0, BLOCK_SZ), 0..1);
        assert_eq!(block_span(0, BLOCK_SZ + 1), 0..2);
        assert_eq!(block_span(BS - 1, 2), 0..2);
        assert_eq!(block_span(BS, BLOCK_SZ), 1..2);
        assert_eq!(block_span(3 * BS + 5, 0), 0..0);
        assert_eq!(block_span(u64::MAX - 5, 10), u64::MAX / BS..u64::MAX / BS + 1);
    }

    #[test]
    fn range_end_rejects_overflow() {
        assert_eq!(range_end(BS, 10), Ok(BS + 10));
        assert_eq!(range_end(u64::MAX - 5, 5), Ok(u64::MAX));
        assert_eq!(range_end(u64::MAX - 5, 10), Err(Error::OutOfRange));
    }

    #[test]
    fn overlap_maps_block_and_buffer_ranges() {
        // 跨越块 0 与块 1 的范围 [BS-3, BS+2)
        let start = BS - 3;
        let end = BS + 2;
        assert_eq!(overlap(0, start, end), (BLOCK_SZ - 3..BLOCK_SZ, 0..3));
        assert_eq!(overlap(1, start, end), (0..2, 3..5));

        // 地址空间最后一个块
        let last = u64::MAX / BS;
        let start = u64::MAX - 10;
        assert_eq!(
            overlap(last, start, u64::MAX - 5),
            (BLOCK_SZ - 11..BLOCK_SZ - 6, 0..5)
        );
    }
}
