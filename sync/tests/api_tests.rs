//! sync crate 功能性验证测试
//!
//! 这些测试验证 sync crate 对外提供的 API 的正确性。
//! 测试在用户态环境运行，使用 std；优先级由记录事件的 mock 模拟。

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use sync::{IrqPriority, PriorityCell, PriorityGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Raise(u8),
    Restore(u8),
}

/// 记录 raise/restore 顺序的 mock 优先级
struct MockPriority {
    level: Cell<u8>,
    threshold: u8,
    events: RefCell<Vec<Event>>,
}

impl MockPriority {
    fn new(threshold: u8) -> Self {
        Self {
            level: Cell::new(0),
            threshold,
            events: RefCell::new(Vec::new()),
        }
    }

    fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }
}

impl IrqPriority for MockPriority {
    type Level = u8;

    fn raise(&self) -> u8 {
        let prior = self.level.get();
        self.level.set(prior.max(self.threshold));
        self.events.borrow_mut().push(Event::Raise(prior));
        prior
    }

    fn restore(&self, prior: u8) {
        self.level.set(prior);
        self.events.borrow_mut().push(Event::Restore(prior));
    }

    fn excludes_competing(&self) -> Option<bool> {
        Some(self.level.get() >= self.threshold)
    }
}

#[test]
fn test_guard_raises_and_restores() {
    let pri = MockPriority::new(6);
    {
        let _guard = PriorityGuard::raise(&pri);
        assert_eq!(pri.level.get(), 6);
        assert_eq!(pri.excludes_competing(), Some(true));
    }
    assert_eq!(pri.level.get(), 0);
    assert_eq!(pri.events(), vec![Event::Raise(0), Event::Restore(0)]);
}

#[test]
fn test_nested_guards_restore_in_order() {
    let pri = MockPriority::new(6);
    {
        let _outer = PriorityGuard::raise(&pri);
        {
            let _inner = PriorityGuard::raise(&pri);
            assert_eq!(pri.level.get(), 6);
        }
        // 内层恢复到外层提升后的级别
        assert_eq!(pri.level.get(), 6);
    }
    assert_eq!(pri.level.get(), 0);
    assert_eq!(
        pri.events(),
        vec![
            Event::Raise(0),
            Event::Raise(6),
            Event::Restore(6),
            Event::Restore(0)
        ]
    );
}

#[test]
fn test_guard_restores_on_early_return() {
    fn early(pri: &MockPriority, bail: bool) -> Result<(), ()> {
        let _guard = PriorityGuard::raise(pri);
        if bail {
            return Err(());
        }
        Ok(())
    }
    let pri = MockPriority::new(3);
    assert!(early(&pri, true).is_err());
    assert_eq!(pri.level.get(), 0);
    assert!(early(&pri, false).is_ok());
    assert_eq!(pri.events().len(), 4);
}

#[test]
fn test_cell_exclusive_access_holds_priority() {
    let cell = unsafe { PriorityCell::new(0u32, MockPriority::new(5)) };
    {
        let mut v = cell.exclusive_access();
        *v += 1;
        assert_eq!(cell.priority().level.get(), 5);
    }
    assert_eq!(cell.priority().level.get(), 0);
    assert_eq!(cell.exclusive_session(|v| *v), 1);
    assert_eq!(cell.priority().events().len(), 4);
}

#[test]
fn test_cell_reentrant_access_panics_and_restores() {
    let cell = unsafe { PriorityCell::new(0u32, MockPriority::new(5)) };
    let result = catch_unwind(AssertUnwindSafe(|| {
        let _outer = cell.exclusive_access();
        let _inner = cell.exclusive_access();
    }));
    assert!(result.is_err());
    // 两次 raise 都已恢复
    assert_eq!(cell.priority().level.get(), 0);
    let events = cell.priority().events();
    let raises = events.iter().filter(|e| matches!(e, Event::Raise(_))).count();
    let restores = events.iter().filter(|e| matches!(e, Event::Restore(_))).count();
    assert_eq!(raises, 2);
    assert_eq!(restores, 2);
}

#[test]
fn test_irq_access_never_raises() {
    let cell = unsafe { PriorityCell::new(7u32, MockPriority::new(5)) };
    {
        let v = cell.irq_access().expect("cell should be free");
        assert_eq!(*v, 7);
    }
    assert!(cell.priority().events().is_empty());
}

#[test]
fn test_irq_access_reports_busy() {
    let cell = unsafe { PriorityCell::new(7u32, MockPriority::new(5)) };
    let _held = cell.exclusive_access();
    assert!(cell.irq_access().is_none());
}

#[test]
fn test_into_inner() {
    let cell = unsafe { PriorityCell::new(vec![1u8, 2, 3], MockPriority::new(1)) };
    cell.exclusive_session(|v| v.push(4));
    assert_eq!(cell.into_inner(), vec![1, 2, 3, 4]);
}

#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
#[test]
fn test_ext_irq_mask_host_simulation() {
    use sync::ExtIrqMask;

    let mask = ExtIrqMask;
    assert_eq!(mask.excludes_competing(), Some(false));
    {
        let _outer = PriorityGuard::raise(&mask);
        assert_eq!(mask.excludes_competing(), Some(true));
        {
            let _inner = PriorityGuard::raise(&mask);
        }
        // 内层 restore(false) 不会提前解除屏蔽
        assert_eq!(mask.excludes_competing(), Some(true));
    }
    assert_eq!(mask.excludes_competing(), Some(false));
}
