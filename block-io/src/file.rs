//! 文件表
//!
//! 描述符是文件表中的下标。关闭后槽位保留为哨兵，不会被后续 open 复用，
//! 因此描述符单调增长。

use alloc::vec::Vec;

use crate::error::{Error, Result};

bitflags::bitflags! {
    /// 文件打开标志
    pub struct OpenFlags: u32 {
        /// 路径不存在时创建
        const CREATE = 1 << 9;
        /// 打开时截断为 0
        const TRUNC = 1 << 10;
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::CREATE
    }
}

/// 已打开的文件
pub struct OpenFile<H> {
    /// 后端句柄
    handle: H,
    /// 逻辑大小（字节）
    pub size: u64,
    /// 当前读写位置
    pub cursor: u64,
}

impl<H> OpenFile<H> {
    /// 后端句柄
    pub fn handle(&self) -> &H {
        &self.handle
    }
}

enum Slot<H> {
    Open(OpenFile<H>),
    Closed,
}

/// 描述符到已打开文件的映射
pub struct FileTable<H> {
    slots: Vec<Slot<H>>,
}

impl<H> FileTable<H> {
    /// 创建空文件表
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// 登记新打开的文件，光标置 0，返回新描述符
    pub fn register(&mut self, handle: H, size: u64) -> usize {
        self.slots.push(Slot::Open(OpenFile {
            handle,
            size,
            cursor: 0,
        }));
        self.slots.len() - 1
    }

    /// 获取已打开文件
    ///
    /// 越界返回 `InvalidDescriptor`，已关闭返回 `Closed`。
    pub fn get(&self, fd: usize) -> Result<&OpenFile<H>> {
        match self.slots.get(fd) {
            Some(Slot::Open(file)) => Ok(file),
            Some(Slot::Closed) => Err(Error::Closed),
            None => Err(Error::InvalidDescriptor),
        }
    }

    /// 获取已打开文件的可变引用
    pub fn get_mut(&mut self, fd: usize) -> Result<&mut OpenFile<H>> {
        match self.slots.get_mut(fd) {
            Some(Slot::Open(file)) => Ok(file),
            Some(Slot::Closed) => Err(Error::Closed),
            None => Err(Error::InvalidDescriptor),
        }
    }

    /// 检查描述符能否关闭
    ///
    /// 与 [`Self::get`] 相同，但已关闭时返回 `AlreadyClosed`。
    pub fn check_closable(&self, fd: usize) -> Result<()> {
        match self.get(fd) {
            Err(Error::Closed) => Err(Error::AlreadyClosed),
            other => other.map(|_| ()),
        }
    }

    /// 将槽位标记为关闭并取出后端句柄
    pub fn take_handle(&mut self, fd: usize) -> Result<H> {
        self.check_closable(fd)?;
        match core::mem::replace(&mut self.slots[fd], Slot::Closed) {
            Slot::Open(file) => Ok(file.handle),
            Slot::Closed => Err(Error::AlreadyClosed),
        }
    }

    /// 描述符是否处于打开状态
    pub fn is_open(&self, fd: usize) -> bool {
        matches!(self.slots.get(fd), Some(Slot::Open(_)))
    }

    /// 曾经分配过的描述符数量（包括已关闭的）
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 是否从未分配过描述符
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 所有仍打开的描述符
    pub fn open_descriptors(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Slot::Open(_)))
            .map(|(fd, _)| fd)
    }
}

impl<H> Default for FileTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_grow_monotonically() {
        let mut table = FileTable::new();
        assert_eq!(table.register('a', 0), 0);
        assert_eq!(table.register('b', 0), 1);
        assert_eq!(table.take_handle(0), Ok('a'));
        // 关闭的槽位不被复用
        assert_eq!(table.register('c', 0), 2);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn closed_and_invalid_are_distinguished() {
        let mut table = FileTable::new();
        let fd = table.register((), 10);
        assert_eq!(table.get(fd).map(|f| f.size), Ok(10));
        assert_eq!(table.get(fd + 1).err(), Some(Error::InvalidDescriptor));
        table.take_handle(fd).unwrap();
        assert_eq!(table.get(fd).err(), Some(Error::Closed));
        assert_eq!(table.take_handle(fd), Err(Error::AlreadyClosed));
        assert_eq!(table.take_handle(7), Err(Error::InvalidDescriptor));
    }

    #[test]
    fn open_descriptors_skips_closed() {
        let mut table = FileTable::new();
        for i in 0..4 {
            table.register(i, 0);
        }
        table.take_handle(1).unwrap();
        table.take_handle(3).unwrap();
        let open: Vec<usize> = table.open_descriptors().collect();
        assert_eq!(open, vec![0, 2]);
        assert!(table.is_open(2));
        assert!(!table.is_open(3));
    }
}
