use std::fmt;
use std::io;

/// blkctl 的错误类型
#[derive(Debug)]
pub enum CliError {
    /// 读取配置文件或输出时的 I/O 错误
    Io(io::Error),
    /// 配置文件格式错误
    Config(toml::de::Error),
    /// 块缓存层返回的错误
    BlockIo(block_io::Error),
    /// 复制的源与目标是同一路径
    SamePath(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Config(err) => write!(f, "invalid config: {}", err),
            Self::BlockIo(err) => write!(f, "{} (code {})", err, err.code()),
            Self::SamePath(path) => write!(f, "cannot copy {} onto itself", path),
        }
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err)
    }
}

impl From<block_io::Error> for CliError {
    fn from(err: block_io::Error) -> Self {
        Self::BlockIo(err)
    }
}
