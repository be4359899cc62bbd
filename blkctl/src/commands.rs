//! blkctl 子命令的实现，全部经由块缓存层完成

use std::path::Path;

use block_io::{BlockIo, OpenFlags, StorageBackend};

use crate::error::CliError;

/// `copy` 每次搬运的字节数
pub const COPY_CHUNK: usize = 64 * 1024;

/// 从 `offset` 读取 `len` 字节，`len` 为空时读到文件末尾
pub fn read<B: StorageBackend>(
    io: &mut BlockIo<B>,
    path: &str,
    offset: u64,
    len: Option<usize>,
) -> Result<Vec<u8>, CliError> {
    let fd = io.open_with(path, OpenFlags::empty())?;
    let len = match len {
        Some(len) => len,
        None => io.file_size(fd)?.saturating_sub(offset) as usize,
    };
    io.seek(fd, offset)?;
    let data = io.read(fd, len);
    io.close(fd)?;
    Ok(data?)
}

/// 在 `offset` 处写入 `data` 并同步
pub fn write<B: StorageBackend>(
    io: &mut BlockIo<B>,
    path: &str,
    offset: u64,
    data: &[u8],
) -> Result<(), CliError> {
    let fd = io.open(path)?;
    io.seek(fd, offset)?;
    io.write(fd, data)?;
    io.fsync(fd)?;
    io.close(fd)?;
    Ok(())
}

/// 把 `src` 的全部内容复制到 `dst`，返回复制的字节数
///
/// 目标以截断方式打开，源与目标为同一路径时直接拒绝。
pub fn copy<B: StorageBackend>(
    io: &mut BlockIo<B>,
    src: &str,
    dst: &str,
) -> Result<u64, CliError> {
    if Path::new(src) == Path::new(dst) {
        return Err(CliError::SamePath(src.to_string()));
    }
    let from = io.open_with(src, OpenFlags::empty())?;
    let to = io.open_with(dst, OpenFlags::CREATE | OpenFlags::TRUNC)?;
    let total = io.file_size(from)?;
    let mut chunk = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;
    while copied < total {
        let n = (total - copied).min(COPY_CHUNK as u64) as usize;
        io.read_into(from, &mut chunk[..n])?;
        io.write(to, &chunk[..n])?;
        copied += n as u64;
    }
    io.fsync(to)?;
    io.close(to)?;
    io.close(from)?;
    log::info!("copied {} bytes from {} to {}", copied, src, dst);
    Ok(copied)
}
