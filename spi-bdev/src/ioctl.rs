use core::convert::TryFrom;
use numeric_enum_macro::numeric_enum;

numeric_enum! {
    #[repr(u32)]
    #[allow(non_camel_case_types)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BdevOp {
        INIT = 1,
        SYNC = 3,
        NUM_BLOCKS = 4,
        BLOCK_SIZE = 5,
        IRQ_HANDLER = 7,
    }
}

impl BdevOp {
    /// 解析原始控制码，未知值返回 `None`
    pub fn parse(op: u32) -> Option<Self> {
        BdevOp::try_from(op).ok()
    }
}
