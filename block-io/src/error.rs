use core::fmt;

/// 块缓存 I/O 层的错误类型
///
/// 所有错误都同步返回给调用方，不做重试。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// 描述符超出文件表范围
    InvalidDescriptor,
    /// 对已关闭的描述符执行读写、定位或同步
    Closed,
    /// 重复关闭同一描述符
    AlreadyClosed,
    /// 读取范围超过文件逻辑大小，或读写末尾越过 `u64::MAX`
    OutOfRange,
    /// 后端读块失败
    BackendReadFailed,
    /// 后端写块失败
    BackendWriteFailed,
    /// 后端无法提供句柄或大小
    OpenFailed,
    /// 后端释放句柄失败
    ReleaseFailed,
}

impl Error {
    /// 返回与 C 风格接口一致的负数错误码
    pub fn code(self) -> isize {
        match self {
            Self::InvalidDescriptor | Self::OpenFailed | Self::ReleaseFailed => -1,
            Self::Closed | Self::AlreadyClosed => -2,
            Self::OutOfRange => -3,
            Self::BackendReadFailed => -4,
            Self::BackendWriteFailed => -5,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidDescriptor => "invalid file descriptor",
            Self::Closed => "file descriptor is closed",
            Self::AlreadyClosed => "file descriptor already closed",
            Self::OutOfRange => "read past end of file",
            Self::BackendReadFailed => "backend block read failed",
            Self::BackendWriteFailed => "backend block write failed",
            Self::OpenFailed => "backend could not open file",
            Self::ReleaseFailed => "backend could not release file handle",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_c_interface() {
        assert_eq!(Error::InvalidDescriptor.code(), -1);
        assert_eq!(Error::Closed.code(), -2);
        assert_eq!(Error::AlreadyClosed.code(), -2);
        assert_eq!(Error::OutOfRange.code(), -3);
        assert_eq!(Error::BackendReadFailed.code(), -4);
        assert_eq!(Error::BackendWriteFailed.code(), -5);
        assert_eq!(Error::OpenFailed.code(), -1);
        assert_eq!(Error::ReleaseFailed.code(), -1);
    }
}
