use crate::block_dev::{byte_range, BlockDevice, BLOCK_SZ};
use crate::ioctl::BdevOp;
use crate::{BdevError, SpiFlash, StatusLed, TickSource, FLUSH_DELAY_TICKS};
use sync::{IrqPriority, PriorityCell};

/// 与中断共享、受优先级保护的设备状态
struct BdevInner<F: SpiFlash> {
    flash: F,
    config: Option<&'static F::Config>,
    /// 自上次成功刷新以来是否有写入停留在驱动缓存中
    dirty: bool,
    /// 最近一次置脏写入时的 tick，仅在 `dirty` 时有意义
    last_write: u32,
}

/// 设备状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BdevState {
    pub configured: bool,
    pub dirty: bool,
    pub last_write: u32,
}

/// SPI 闪存块设备
///
/// 把块读写翻译为闪存字节范围读写，写入先停留在驱动缓存中，
/// 由定时中断里的 `poll` 在空闲 `flush_delay` 个 tick 后刷新，或由 `sync` 立即刷新。
/// 所有访问闪存的操作都在 `P` 提升的优先级下进行，
/// 以免与共享同一总线的 USB 大容量存储中断冲突。
pub struct SpiBdev<F, T, P, L>
where
    F: SpiFlash,
    T: TickSource,
    P: IrqPriority,
    L: StatusLed,
{
    inner: PriorityCell<BdevInner<F>, P>,
    tick: T,
    led: L,
    flush_delay: u32,
}

impl<F, T, P, L> SpiBdev<F, T, P, L>
where
    F: SpiFlash,
    T: TickSource,
    P: IrqPriority,
    L: StatusLed,
{
    /// 创建未绑定配置的干净设备
    ///
    /// # Safety
    ///
    /// 调用方必须保证运行在单核上，且 `pri` 提升后的优先级排除了
    /// 所有其他访问该闪存总线的中断（USB 大容量存储等）。
    pub unsafe fn new(flash: F, tick: T, pri: P, led: L) -> Self {
        Self {
            inner: PriorityCell::new(
                BdevInner {
                    flash,
                    config: None,
                    dirty: false,
                    last_write: 0,
                },
                pri,
            ),
            tick,
            led,
            flush_delay: FLUSH_DELAY_TICKS,
        }
    }

    pub fn with_flush_delay(mut self, ticks: u32) -> Self {
        self.flush_delay = ticks;
        self
    }

    pub fn flush_delay(&self) -> u32 {
        self.flush_delay
    }

    /// 绑定配置并初始化闪存驱动，状态复位为干净
    ///
    /// 驱动初始化失败时返回其错误，但配置仍会被记录。
    pub fn init(&self, config: &'static F::Config) -> Result<(), BdevError> {
        let mut inner = self.inner.exclusive_access();
        inner.config = Some(config);
        inner.dirty = false;
        inner.last_write = 0;
        self.led.set(false);
        let ret = inner.flash.init(config);
        match ret {
            Ok(()) => log::debug!("spi bdev: flash initialized"),
            Err(e) => log::warn!("spi bdev: flash init failed: {}", e),
        }
        ret.map_err(BdevError::from)
    }

    /// 定时中断入口：脏且距最近写入已过 `flush_delay` 个 tick 时刷新
    ///
    /// 不提升优先级。调用它的中断必须配置在保护阈值之上；
    /// 无需刷新时直接返回，需要刷新而平台判断优先级不足时返回 `PriorityTooLow`，
    /// 不访问闪存。返回是否执行了刷新。
    pub fn poll(&self) -> Result<bool, BdevError> {
        let mut inner = self.inner.irq_access().ok_or(BdevError::Busy)?;
        if !inner.dirty || !self.tick.has_passed(inner.last_write, self.flush_delay) {
            return Ok(false);
        }
        if self.inner.priority().excludes_competing() == Some(false) {
            log::warn!("spi bdev: poll below guard priority, flush skipped");
            return Err(BdevError::PriorityTooLow);
        }
        Self::flush_locked(&mut inner, &self.led)?;
        Ok(true)
    }

    /// 若有未落盘的写入则立即刷新
    pub fn sync(&self) -> Result<(), BdevError> {
        let mut inner = self.inner.exclusive_access();
        if !inner.dirty {
            return Ok(());
        }
        Self::flush_locked(&mut inner, &self.led)
    }

    pub fn read_blocks(&self, dest: &mut [u8], block_id: u32, count: u32) -> Result<(), BdevError> {
        let (offset, len) = byte_range(block_id, count).ok_or(BdevError::InvalidArgument)?;
        let dest = dest.get_mut(..len).ok_or(BdevError::InvalidArgument)?;
        log::trace!("spi bdev: read {} blocks at {}", count, block_id);
        let mut inner = self.inner.exclusive_access();
        inner.flash.read(offset, dest)?;
        Ok(())
    }

    /// 写入块；驱动缓存处于活动状态时置脏、点亮指示灯并记录时间
    ///
    /// 返回驱动的写入结果，即使写入失败，脏状态也按驱动报告的缓存状态更新。
    pub fn write_blocks(&self, src: &[u8], block_id: u32, count: u32) -> Result<(), BdevError> {
        let (offset, len) = byte_range(block_id, count).ok_or(BdevError::InvalidArgument)?;
        let src = src.get(..len).ok_or(BdevError::InvalidArgument)?;
        log::trace!("spi bdev: write {} blocks at {}", count, block_id);
        let mut inner = self.inner.exclusive_access();
        let ret = inner.flash.write(offset, src);
        if inner.flash.cache_active() {
            inner.dirty = true;
            self.led.set(true);
            inner.last_write = self.tick.now();
        }
        ret.map_err(BdevError::from)
    }

    pub fn num_blocks(&self) -> u32 {
        self.inner
            .exclusive_session(|inner| inner.flash.capacity() / BLOCK_SZ as u32)
    }

    /// 控制入口，返回 0、正的查询结果或负的 errno
    ///
    /// `INIT` 需要 `arg` 提供配置，其余控制码忽略 `arg`。
    pub fn ioctl(&self, op: u32, arg: Option<&'static F::Config>) -> i32 {
        let ret = match BdevOp::parse(op) {
            Some(BdevOp::INIT) => match arg {
                Some(config) => self.init(config).map(|_| 0),
                None => Err(BdevError::InvalidArgument),
            },
            Some(BdevOp::IRQ_HANDLER) => self.poll().map(|_| 0),
            Some(BdevOp::SYNC) => self.sync().map(|_| 0),
            Some(BdevOp::NUM_BLOCKS) => Ok(i32::try_from(self.num_blocks()).unwrap_or(i32::MAX)),
            Some(BdevOp::BLOCK_SIZE) => Ok(BLOCK_SZ as i32),
            None => Err(BdevError::InvalidOperation(op)),
        };
        ret.unwrap_or_else(BdevError::errno)
    }

    pub fn state(&self) -> BdevState {
        self.inner.exclusive_session(|inner| BdevState {
            configured: inner.config.is_some(),
            dirty: inner.dirty,
            last_write: inner.last_write,
        })
    }

    /// 在保护下直接操作闪存驱动
    pub fn with_flash<V>(&self, f: impl FnOnce(&mut F) -> V) -> V {
        self.inner.exclusive_session(|inner| f(&mut inner.flash))
    }

    fn flush_locked(inner: &mut BdevInner<F>, led: &L) -> Result<(), BdevError> {
        match inner.flash.flush() {
            Ok(()) => {
                inner.dirty = false;
                led.set(false);
                log::debug!("spi bdev: cache flushed");
                Ok(())
            }
            Err(e) => {
                // 驱动仍报告缓存未落盘时保持脏状态，留给下一次 poll/sync 重试
                inner.dirty = inner.flash.cache_active();
                if !inner.dirty {
                    led.set(false);
                }
                log::warn!("spi bdev: flush failed: {}", e);
                Err(e.into())
            }
        }
    }
}

impl<F, T, P, L> BlockDevice for SpiBdev<F, T, P, L>
where
    F: SpiFlash,
    T: TickSource,
    P: IrqPriority,
    L: StatusLed,
{
    fn read_blocks(&self, buf: &mut [u8], block_id: u32, count: u32) -> Result<(), BdevError> {
        SpiBdev::read_blocks(self, buf, block_id, count)
    }

    fn write_blocks(&self, buf: &[u8], block_id: u32, count: u32) -> Result<(), BdevError> {
        SpiBdev::write_blocks(self, buf, block_id, count)
    }

    fn sync(&self) -> Result<(), BdevError> {
        SpiBdev::sync(self)
    }

    fn num_blocks(&self) -> u32 {
        SpiBdev::num_blocks(self)
    }
}

impl<F, T, P, L> Drop for SpiBdev<F, T, P, L>
where
    F: SpiFlash,
    T: TickSource,
    P: IrqPriority,
    L: StatusLed,
{
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            log::warn!("spi bdev: final sync failed: {}", e);
        }
    }
}
