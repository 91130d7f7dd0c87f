/// 脏/干净状态指示灯，亮表示有未落盘的写入
pub trait StatusLed {
    fn set(&self, on: bool);
}

/// 没有指示灯的板子
impl StatusLed for () {
    fn set(&self, _on: bool) {}
}

impl<L: StatusLed + ?Sized> StatusLed for &L {
    fn set(&self, on: bool) {
        (**self).set(on)
    }
}
