//! sync: 基于中断优先级的单核互斥原语
//!
//! 提供 `IrqPriority` 抽象、作用域化的 `PriorityGuard`，
//! 以及在提升优先级期间独占访问数据的 `PriorityCell`。

#![no_std]

use core::cell::{RefCell, RefMut};
use core::ops::{Deref, DerefMut};

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
mod arch_intr {
    use riscv::register::{sie, sstatus};

    pub fn ext_enabled() -> bool {
        sie::read().sext()
    }

    pub fn global_enabled() -> bool {
        sstatus::read().sie()
    }

    pub fn mask_ext() {
        unsafe {
            sie::clear_sext();
        }
    }

    pub fn unmask_ext() {
        unsafe {
            sie::set_sext();
        }
    }
}

#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
mod arch_intr {
    use core::sync::atomic::{AtomicBool, Ordering};

    // 主机模拟：以软件标志代替 sie.SEIE
    static EXT_ENABLED: AtomicBool = AtomicBool::new(true);

    pub fn ext_enabled() -> bool {
        EXT_ENABLED.load(Ordering::SeqCst)
    }

    pub fn global_enabled() -> bool {
        true
    }

    pub fn mask_ext() {
        EXT_ENABLED.store(false, Ordering::SeqCst);
    }

    pub fn unmask_ext() {
        EXT_ENABLED.store(true, Ordering::SeqCst);
    }
}

/// 中断优先级提升原语
///
/// `raise` 将当前执行优先级提升到排除竞争中断（如 USB 大容量存储）的阈值，
/// 返回此前的优先级；`restore` 恢复之。
pub trait IrqPriority {
    /// 优先级的平台表示
    type Level: Copy;

    /// 提升优先级，返回之前的级别
    fn raise(&self) -> Self::Level;

    /// 恢复到 `raise` 返回的级别
    fn restore(&self, prior: Self::Level);

    /// 当前上下文是否已处于排除竞争中断的优先级
    ///
    /// 平台无法判断时返回 `None`。
    fn excludes_competing(&self) -> Option<bool> {
        None
    }
}

impl<P: IrqPriority + ?Sized> IrqPriority for &P {
    type Level = P::Level;

    fn raise(&self) -> Self::Level {
        (**self).raise()
    }

    fn restore(&self, prior: Self::Level) {
        (**self).restore(prior)
    }

    fn excludes_competing(&self) -> Option<bool> {
        (**self).excludes_competing()
    }
}

/// 屏蔽外部中断的优先级实现
///
/// RISC-V 上清除 `sie.SEIE`：外设中断（USB 等）被排除，定时器中断仍可进入。
/// 其他目标上使用软件标志模拟。
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtIrqMask;

impl IrqPriority for ExtIrqMask {
    type Level = bool;

    fn raise(&self) -> bool {
        let prior = arch_intr::ext_enabled();
        arch_intr::mask_ext();
        prior
    }

    fn restore(&self, prior: bool) {
        if prior {
            arch_intr::unmask_ext();
        }
    }

    fn excludes_competing(&self) -> Option<bool> {
        Some(!arch_intr::global_enabled() || !arch_intr::ext_enabled())
    }
}

/// 作用域化的优先级提升
///
/// 创建时调用 `raise`，析构时以保存的级别调用 `restore`，
/// 因此包括提前返回在内的所有退出路径都会恢复优先级。
pub struct PriorityGuard<'a, P: IrqPriority> {
    pri: &'a P,
    prior: P::Level,
}

impl<'a, P: IrqPriority> PriorityGuard<'a, P> {
    pub fn raise(pri: &'a P) -> Self {
        let prior = pri.raise();
        Self { pri, prior }
    }
}

impl<'a, P: IrqPriority> Drop for PriorityGuard<'a, P> {
    fn drop(&mut self) {
        self.pri.restore(self.prior);
    }
}

/// 由优先级保护的单核共享单元
///
/// 与中断处理程序共享的数据放在其中：低优先级上下文通过 `exclusive_access`
/// 在提升的优先级下访问，中断上下文通过 `irq_access` 直接访问。
pub struct PriorityCell<T, P: IrqPriority> {
    inner: RefCell<T>,
    pri: P,
}

// 单核上所有访问都被同一优先级阈值串行化
unsafe impl<T: Send, P: IrqPriority + Sync> Sync for PriorityCell<T, P> {}

pub struct PriorityRefMut<'a, T, P: IrqPriority> {
    // 字段按声明顺序析构：先释放借用，再恢复优先级
    borrow: RefMut<'a, T>,
    _guard: PriorityGuard<'a, P>,
}

impl<T, P: IrqPriority> PriorityCell<T, P> {
    /// # Safety
    ///
    /// 调用方必须保证运行在单核上，且 `pri` 提升后的级别排除了
    /// 所有其他会访问 `value` 的中断上下文。
    pub unsafe fn new(value: T, pri: P) -> Self {
        Self {
            inner: RefCell::new(value),
            pri,
        }
    }

    pub fn priority(&self) -> &P {
        &self.pri
    }

    /// 提升优先级后独占访问
    ///
    /// 重入（已被借用时再次访问）是编程错误，会先恢复优先级再 panic。
    pub fn exclusive_access(&self) -> PriorityRefMut<'_, T, P> {
        let guard = PriorityGuard::raise(&self.pri);
        match self.inner.try_borrow_mut() {
            Ok(borrow) => PriorityRefMut {
                borrow,
                _guard: guard,
            },
            Err(_) => {
                drop(guard);
                panic!("PriorityCell already borrowed");
            }
        }
    }

    pub fn exclusive_session<F, V>(&self, f: F) -> V
    where
        F: FnOnce(&mut T) -> V,
    {
        let mut guard = self.exclusive_access();
        f(&mut guard)
    }

    /// 中断上下文中的访问，不提升优先级
    ///
    /// 调用方的中断源必须配置在保护阈值之上。已被借用时返回 `None`，从不阻塞。
    pub fn irq_access(&self) -> Option<RefMut<'_, T>> {
        self.inner.try_borrow_mut().ok()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<'a, T, P: IrqPriority> Deref for PriorityRefMut<'a, T, P> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.borrow
    }
}

impl<'a, T, P: IrqPriority> DerefMut for PriorityRefMut<'a, T, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.borrow
    }
}
