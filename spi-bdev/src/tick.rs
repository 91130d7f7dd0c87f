/// 默认写回延迟：最后一次写入后 1000 个 tick（毫秒）才在定时中断中刷新
pub const FLUSH_DELAY_TICKS: u32 = 1000;

/// 单调递增的 tick 计数器
pub trait TickSource {
    fn now(&self) -> u32;

    /// 自 `since` 起是否已经过至少 `ticks` 个 tick，按回绕算术计算
    fn has_passed(&self, since: u32, ticks: u32) -> bool {
        self.now().wrapping_sub(since) >= ticks
    }
}

impl<T: TickSource + ?Sized> TickSource for &T {
    fn now(&self) -> u32 {
        (**self).now()
    }

    fn has_passed(&self, since: u32, ticks: u32) -> bool {
        (**self).has_passed(since, ticks)
    }
}

/// 读取 `time` CSR 的毫秒计数器
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
#[derive(Debug, Clone, Copy)]
pub struct TimeCsrTicks {
    /// `time` 每毫秒的计数，QEMU virt 平台为 10_000
    pub cycles_per_tick: u64,
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl TickSource for TimeCsrTicks {
    fn now(&self) -> u32 {
        let cycles = riscv::register::time::read64();
        (cycles / self.cycles_per_tick.max(1)) as u32
    }
}
