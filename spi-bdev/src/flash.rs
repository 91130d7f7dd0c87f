use crate::FlashError;

/// 字节寻址的 SPI 闪存驱动
///
/// 驱动自身带写回缓存：`write` 可能只写入缓存，`flush` 才真正擦写芯片。
pub trait SpiFlash {
    /// 驱动配置（引脚、总线等），由调用方持有
    type Config: 'static;

    fn init(&mut self, config: &'static Self::Config) -> Result<(), FlashError>;

    fn read(&mut self, addr: u32, dest: &mut [u8]) -> Result<(), FlashError>;

    fn write(&mut self, addr: u32, src: &[u8]) -> Result<(), FlashError>;

    fn flush(&mut self) -> Result<(), FlashError>;

    /// 缓存层是否持有尚未落盘的数据
    fn cache_active(&self) -> bool;

    /// 芯片容量（字节）
    fn capacity(&self) -> u32;
}
