//! spi-bdev: SPI 闪存之上的块设备适配层
//!
//! 把块读写翻译为闪存字节范围操作，按写回策略延迟刷新，
//! 并通过中断优先级保护与 USB 大容量存储中断互斥地访问闪存总线。

#![no_std]

mod bdev;
mod block_dev;
mod error;
mod flash;
mod ioctl;
mod led;
mod tick;

pub use bdev::{BdevState, SpiBdev};
pub use block_dev::{byte_range, BlockDevice, BLOCK_SZ};
pub use error::{BdevError, FlashError, EBUSY, EINVAL, EIO, EPERM, ETIMEDOUT};
pub use flash::SpiFlash;
pub use ioctl::BdevOp;
pub use led::StatusLed;
pub use sync::{ExtIrqMask, IrqPriority, PriorityGuard};
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub use tick::TimeCsrTicks;
pub use tick::{TickSource, FLUSH_DELAY_TICKS};
