use core::fmt::Debug;

use crate::file::OpenFlags;

/// 块大小常量，固定为 8192 字节
pub const BLOCK_SZ: usize = 8192;

/// 存储后端抽象接口
///
/// 只支持以整块为单位、按块对齐偏移进行传输，不做任何缓存。
/// 块缓存层通过此 trait 读写底层介质，调用方需实现此 trait。
pub trait StorageBackend {
    /// 后端句柄，由 `handle_for` 分配、`release` 回收
    type Handle;
    /// 后端自身的错误类型，由引擎记录日志后映射为 [`crate::Error`]
    type Error: Debug;

    /// 为路径获取句柄并返回其当前字节大小
    ///
    /// # 参数
    /// - `path`: 文件路径
    /// - `flags`: 打开标志，`CREATE` 时路径不存在则创建，`TRUNC` 时截断为 0
    fn handle_for(
        &mut self,
        path: &str,
        flags: OpenFlags,
    ) -> Result<(Self::Handle, u64), Self::Error>;

    /// 读取 `block_offset` 处的整块
    ///
    /// 超出介质末尾的部分应以 0 填充。
    fn read_block(
        &mut self,
        handle: &Self::Handle,
        block_offset: u64,
        buf: &mut [u8; BLOCK_SZ],
    ) -> Result<(), Self::Error>;

    /// 将整块写入 `block_offset` 处
    fn write_block(
        &mut self,
        handle: &Self::Handle,
        block_offset: u64,
        buf: &[u8; BLOCK_SZ],
    ) -> Result<(), Self::Error>;

    /// 释放句柄
    fn release(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;

    /// 将已写入的块落盘，默认不做任何事
    fn sync(&mut self, _handle: &Self::Handle) -> Result<(), Self::Error> {
        Ok(())
    }
}
