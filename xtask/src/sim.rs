//! 主机上模拟的闪存、tick 与指示灯

use once_cell::sync::Lazy;
use serde_derive::Deserialize;
use spi_bdev::{FlashError, IrqPriority, PriorityGuard, SpiFlash, StatusLed, TickSource, EINVAL};
use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub const DEFAULT_SECTOR_SIZE: u32 = 4096;

/// 闪存几何参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Geometry {
    pub capacity: u32,
    #[serde(default = "default_sector_size")]
    pub sector_size: u32,
}

fn default_sector_size() -> u32 {
    DEFAULT_SECTOR_SIZE
}

/// 进程内已发布的几何参数，每种只泄漏一份
static INTERNED: Lazy<Mutex<Vec<&'static Geometry>>> = Lazy::new(|| Mutex::new(Vec::new()));

impl Geometry {
    /// 取得与 `self` 相等的 `'static` 几何参数，供驱动 `init` 长期持有
    pub fn interned(self) -> &'static Geometry {
        let mut interned = INTERNED.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(g) = interned.iter().copied().find(|g| **g == self) {
            return g;
        }
        let g: &'static Geometry = Box::leak(Box::new(self));
        interned.push(g);
        g
    }

    fn is_valid(&self) -> bool {
        self.sector_size.is_power_of_two()
            && self.capacity > 0
            && self.capacity % self.sector_size == 0
    }
}

/// 缓存的一个擦除扇区
struct SectorCache {
    sector: u32,
    data: Vec<u8>,
    dirty: bool,
}

/// 带单扇区写回缓存的 SPI 闪存模拟
///
/// 写入先进入扇区缓存，写到另一个扇区或 `flush` 时才擦除并编程回镜像。
pub struct SimFlash {
    image: Vec<u8>,
    geometry: Option<&'static Geometry>,
    cache: Option<SectorCache>,
    erase_count: u64,
}

impl SimFlash {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            geometry: None,
            cache: None,
            erase_count: 0,
        }
    }

    pub fn erased(capacity: u32) -> Self {
        Self::new(vec![0xFF; capacity as usize])
    }

    /// 已落盘的内容，不包含缓存中的写入
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn erase_count(&self) -> u64 {
        self.erase_count
    }

    fn geometry(&self) -> Result<&'static Geometry, FlashError> {
        self.geometry.ok_or(FlashError::EIO)
    }

    fn check_range(&self, addr: u32, len: usize) -> Result<&'static Geometry, FlashError> {
        let geometry = self.geometry()?;
        let end = addr as u64 + len as u64;
        if end > geometry.capacity as u64 {
            return Err(FlashError::from_errno(EINVAL));
        }
        Ok(geometry)
    }

    fn write_back(&mut self) {
        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        if !cache.dirty {
            return;
        }
        let start = cache.sector as usize * cache.data.len();
        let target = &mut self.image[start..start + cache.data.len()];
        // 擦除后编程
        target.fill(0xFF);
        target.copy_from_slice(&cache.data);
        cache.dirty = false;
        self.erase_count += 1;
        log::trace!("sim flash: programmed sector {}", cache.sector);
    }

    fn load_sector(&mut self, sector: u32, sector_size: u32) {
        if let Some(cache) = &self.cache {
            if cache.sector == sector {
                return;
            }
        }
        self.write_back();
        let start = (sector * sector_size) as usize;
        self.cache = Some(SectorCache {
            sector,
            data: self.image[start..start + sector_size as usize].to_vec(),
            dirty: false,
        });
    }
}

impl SpiFlash for SimFlash {
    type Config = Geometry;

    fn init(&mut self, config: &'static Geometry) -> Result<(), FlashError> {
        if !config.is_valid() || config.capacity as usize != self.image.len() {
            return Err(FlashError::from_errno(EINVAL));
        }
        self.geometry = Some(config);
        self.cache = None;
        Ok(())
    }

    fn read(&mut self, addr: u32, dest: &mut [u8]) -> Result<(), FlashError> {
        self.check_range(addr, dest.len())?;
        let start = addr as usize;
        dest.copy_from_slice(&self.image[start..start + dest.len()]);
        // 缓存中的扇区覆盖镜像
        if let Some(cache) = &self.cache {
            let c_start = cache.sector as usize * cache.data.len();
            let c_end = c_start + cache.data.len();
            let lo = start.max(c_start);
            let hi = (start + dest.len()).min(c_end);
            if lo < hi {
                dest[lo - start..hi - start].copy_from_slice(&cache.data[lo - c_start..hi - c_start]);
            }
        }
        Ok(())
    }

    fn write(&mut self, addr: u32, src: &[u8]) -> Result<(), FlashError> {
        let geometry = self.check_range(addr, src.len())?;
        let sector_size = geometry.sector_size;
        let mut addr = addr;
        let mut src = src;
        while !src.is_empty() {
            let sector = addr / sector_size;
            let offset = (addr % sector_size) as usize;
            let n = src.len().min(sector_size as usize - offset);
            self.load_sector(sector, sector_size);
            if let Some(cache) = self.cache.as_mut() {
                cache.data[offset..offset + n].copy_from_slice(&src[..n]);
                cache.dirty = true;
            }
            addr += n as u32;
            src = &src[n..];
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FlashError> {
        self.geometry()?;
        self.write_back();
        Ok(())
    }

    fn cache_active(&self) -> bool {
        self.cache.as_ref().map_or(false, |c| c.dirty)
    }

    fn capacity(&self) -> u32 {
        self.geometry
            .map_or(self.image.len() as u32, |g| g.capacity)
    }
}

/// 由回放步骤推进的 tick 计数器
#[derive(Default)]
pub struct SimTicks(AtomicU32);

impl SimTicks {
    pub fn advance(&self, ticks: u32) {
        let now = self.0.load(Ordering::SeqCst).wrapping_add(ticks);
        self.0.store(now, Ordering::SeqCst);
    }
}

impl TickSource for SimTicks {
    fn now(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// 单线程模拟的外部中断屏蔽
///
/// 每个实例代表一颗独立的核，屏蔽状态不与其他实例共享。
#[derive(Default)]
pub struct SimIrq {
    masked: Cell<bool>,
}

impl SimIrq {
    /// 进入定时中断：处理程序运行期间外部中断保持屏蔽
    pub fn enter_timer_irq(&self) -> PriorityGuard<'_, Self> {
        PriorityGuard::raise(self)
    }
}

impl IrqPriority for SimIrq {
    type Level = bool;

    fn raise(&self) -> bool {
        self.masked.replace(true)
    }

    fn restore(&self, prior: bool) {
        self.masked.set(prior);
    }

    fn excludes_competing(&self) -> Option<bool> {
        Some(self.masked.get())
    }
}

/// 把状态变化写到日志里的指示灯
#[derive(Default)]
pub struct LogLed {
    on: Cell<bool>,
}

impl LogLed {
    pub fn is_on(&self) -> bool {
        self.on.get()
    }
}

impl StatusLed for LogLed {
    fn set(&self, on: bool) {
        if self.on.replace(on) != on {
            log::info!("led {}", if on { "on (dirty)" } else { "off (clean)" });
        }
    }
}
