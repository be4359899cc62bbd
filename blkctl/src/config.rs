//! blkctl 配置
//!
//! 从 TOML 文件加载，所有字段都有默认值：
//!
//! ```toml
//! [cache]
//! capacity = 10000
//!
//! [log]
//! level = "info"
//!
//! [storage]
//! root = "."
//! write_through = false
//! ```

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde_derive::Deserialize;

use crate::error::CliError;

/// 默认配置文件路径，可由环境变量 `BLKCTL_CONFIG` 覆盖
pub static DEFAULT_CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    env::var_os("BLKCTL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("blkctl.toml"))
});

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cache: CacheConfig,
    pub log: LogConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// 缓存容量（块数）
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: block_io::DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// 文件路径的解析根目录
    pub root: PathBuf,
    /// 每写一块都落盘
    pub write_through: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            write_through: false,
        }
    }
}

impl Config {
    /// 解析 TOML 文本
    pub fn from_toml(text: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(text)?)
    }

    /// 加载配置
    ///
    /// 显式给出的路径必须存在；未给出时尝试默认路径，不存在则使用默认配置。
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let (path, required) = match path {
            Some(path) => (path, true),
            None => (DEFAULT_CONFIG_PATH.as_path(), false),
        };
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(err) if err.kind() == ErrorKind::NotFound && !required => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }
}
