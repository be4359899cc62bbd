//! blkctl: block-io 的宿主机工具
//!
//! 提供基于文件的存储后端、配置加载、日志输出以及命令行子命令。

pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;

pub use backend::FileBackend;
pub use config::Config;
pub use error::CliError;
