//! 基于 `std::fs::File` 的存储后端

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use block_io::{OpenFlags, StorageBackend, BLOCK_SZ};

/// 以目录为根的文件后端
///
/// 路径相对于 `root` 解析；只按整块、块对齐偏移读写。
pub struct FileBackend {
    root: PathBuf,
    /// 每写一块都落盘
    write_through: bool,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>, write_through: bool) -> Self {
        Self {
            root: root.into(),
            write_through,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl StorageBackend for FileBackend {
    type Handle = File;
    type Error = io::Error;

    fn handle_for(&mut self, path: &str, flags: OpenFlags) -> io::Result<(File, u64)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(flags.contains(OpenFlags::CREATE))
            .truncate(flags.contains(OpenFlags::TRUNC))
            .open(self.resolve(path))?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn read_block(
        &mut self,
        handle: &File,
        block_offset: u64,
        buf: &mut [u8; BLOCK_SZ],
    ) -> io::Result<()> {
        let mut file = handle;
        file.seek(SeekFrom::Start(block_offset))?;
        let mut filled = 0;
        while filled < BLOCK_SZ {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        // 文件末尾之后按 0 处理
        buf[filled..].fill(0);
        Ok(())
    }

    fn write_block(
        &mut self,
        handle: &File,
        block_offset: u64,
        buf: &[u8; BLOCK_SZ],
    ) -> io::Result<()> {
        let mut file = handle;
        file.seek(SeekFrom::Start(block_offset))?;
        file.write_all(buf)?;
        if self.write_through {
            file.sync_data()?;
        }
        Ok(())
    }

    fn release(&mut self, handle: File) -> io::Result<()> {
        if self.write_through {
            handle.sync_all()?;
        }
        Ok(())
    }

    fn sync(&mut self, handle: &File) -> io::Result<()> {
        handle.sync_data()
    }
}
