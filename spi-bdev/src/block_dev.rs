use crate::BdevError;

/// 块大小常量，固定为 512 字节
pub const BLOCK_SZ: usize = 512;

/// 块设备抽象接口
///
/// 以 `BLOCK_SZ` 字节块为单位读写，块号与块数乘以 `BLOCK_SZ` 得到字节范围。
/// 范围必须落在设备容量内，由调用方（文件系统层）保证。
pub trait BlockDevice {
    /// 从 `block_id` 开始读取 `count` 个块到 `buf`
    fn read_blocks(&self, buf: &mut [u8], block_id: u32, count: u32) -> Result<(), BdevError>;

    /// 将 `buf` 写入从 `block_id` 开始的 `count` 个块
    fn write_blocks(&self, buf: &[u8], block_id: u32, count: u32) -> Result<(), BdevError>;

    /// 将缓冲的写入落盘
    fn sync(&self) -> Result<(), BdevError>;

    /// 设备总块数
    fn num_blocks(&self) -> u32;

    fn read_block(&self, block_id: u32, buf: &mut [u8]) -> Result<(), BdevError> {
        self.read_blocks(buf, block_id, 1)
    }

    fn write_block(&self, block_id: u32, buf: &[u8]) -> Result<(), BdevError> {
        self.write_blocks(buf, block_id, 1)
    }
}

/// 块号与块数转换为 (字节偏移, 字节长度)，溢出时返回 `None`
pub fn byte_range(block_id: u32, count: u32) -> Option<(u32, usize)> {
    let offset = block_id.checked_mul(BLOCK_SZ as u32)?;
    let len = count.checked_mul(BLOCK_SZ as u32)?;
    offset.checked_add(len)?;
    Some((offset, len as usize))
}
