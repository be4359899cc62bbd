//! block-io: 面向只支持整块、无缓冲传输的存储介质的块缓存文件 I/O 层
//!
//! 对外提供类 POSIX 的 open / close / read / write / seek / fsync，
//! 内部把任意字节范围翻译为整块操作，用容量固定的 LRU 缓存保存最近访问的块，
//! 并把持久化推迟到淘汰或显式同步。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod block_cache;
mod block_dev;
mod error;
mod file;
mod io;
mod stats;

pub use block_cache::{Block, BlockCache, BlockKey, WriteBack, DEFAULT_CAPACITY};
pub use block_dev::{StorageBackend, BLOCK_SZ};
pub use error::{Error, Result};
pub use file::{FileTable, OpenFile, OpenFlags};
pub use io::{block_span, BlockIo};
pub use stats::CacheStats;
