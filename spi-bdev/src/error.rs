use core::fmt;

pub const EPERM: i32 = 1;
pub const EIO: i32 = 5;
pub const EBUSY: i32 = 16;
pub const EINVAL: i32 = 22;
pub const ETIMEDOUT: i32 = 110;

/// 闪存驱动返回的错误码
///
/// 内部保存负的 errno，原样向上传递给块设备调用方。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashError(i32);

impl FlashError {
    pub const EIO: FlashError = FlashError(-EIO);
    pub const ETIMEDOUT: FlashError = FlashError(-ETIMEDOUT);

    /// 由 errno 构造，正数会被取反
    pub fn from_errno(code: i32) -> Self {
        if code > 0 {
            FlashError(-code)
        } else {
            FlashError(code)
        }
    }

    pub fn errno(self) -> i32 {
        self.0
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flash error {}", self.0)
    }
}

/// 块设备适配层错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BdevError {
    /// 未知的控制码
    InvalidOperation(u32),
    /// 参数缺失、缓冲区过短或地址溢出
    InvalidArgument,
    /// 中断上下文中状态已被占用
    Busy,
    /// 定时刷新在未排除竞争中断的优先级上运行
    PriorityTooLow,
    /// 闪存驱动报告的失败
    Flash(FlashError),
}

impl BdevError {
    /// 转换为 ioctl 风格的负状态码
    pub fn errno(self) -> i32 {
        match self {
            BdevError::InvalidOperation(_) | BdevError::InvalidArgument => -EINVAL,
            BdevError::Busy => -EBUSY,
            BdevError::PriorityTooLow => -EPERM,
            BdevError::Flash(e) => e.errno(),
        }
    }
}

impl From<FlashError> for BdevError {
    fn from(e: FlashError) -> Self {
        BdevError::Flash(e)
    }
}

impl fmt::Display for BdevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BdevError::InvalidOperation(op) => write!(f, "invalid control operation {}", op),
            BdevError::InvalidArgument => f.write_str("invalid argument"),
            BdevError::Busy => f.write_str("device state busy"),
            BdevError::PriorityTooLow => {
                f.write_str("poll called below the flash guard priority")
            }
            BdevError::Flash(e) => fmt::Display::fmt(e, f),
        }
    }
}
