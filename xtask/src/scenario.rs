//! TOML 描述的块设备操作序列及其回放

use crate::sim::{Geometry, LogLed, SimFlash, SimIrq, SimTicks};
use serde_derive::Deserialize;
use spi_bdev::{BdevOp, SpiBdev, BLOCK_SZ, FLUSH_DELAY_TICKS};
use std::error::Error;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub geometry: Geometry,
    #[serde(default = "default_flush_delay")]
    pub flush_delay: u32,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_flush_delay() -> u32 {
    FLUSH_DELAY_TICKS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Write {
        block: u32,
        #[serde(default = "one")]
        count: u32,
        fill: u8,
    },
    Read {
        block: u32,
        #[serde(default = "one")]
        count: u32,
        expect: Option<u8>,
    },
    Tick {
        ticks: u32,
    },
    Poll,
    Sync,
}

fn one() -> u32 {
    1
}

/// 回放结果
#[derive(Debug)]
pub struct Outcome {
    /// 落盘后的镜像
    pub image: Vec<u8>,
    pub flushes: u64,
    pub dirty: bool,
}

impl Scenario {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// 在 `image` 上回放全部步骤
    ///
    /// `final_sync` 为假时模拟掉电：缓存中的写入不会进入返回的镜像。
    pub fn replay(&self, image: Vec<u8>, final_sync: bool) -> Result<Outcome, Box<dyn Error>> {
        let geometry = self.geometry.interned();
        let ticks = SimTicks::default();
        let led = LogLed::default();
        let irq = SimIrq::default();
        let bdev = unsafe { SpiBdev::new(SimFlash::new(image), &ticks, &irq, &led) }
            .with_flush_delay(self.flush_delay);
        let ret = bdev.ioctl(BdevOp::INIT.into(), Some(geometry));
        if ret != 0 {
            return Err(format!("init failed: {}", ret).into());
        }

        for (i, step) in self.steps.iter().enumerate() {
            log::debug!("step {}: {:?}", i, step);
            match *step {
                Step::Write { block, count, fill } => {
                    let buf = vec![fill; count as usize * BLOCK_SZ];
                    bdev.write_blocks(&buf, block, count)
                        .map_err(|e| format!("step {}: write failed: {}", i, e))?;
                }
                Step::Read {
                    block,
                    count,
                    expect,
                } => {
                    let mut buf = vec![0u8; count as usize * BLOCK_SZ];
                    bdev.read_blocks(&mut buf, block, count)
                        .map_err(|e| format!("step {}: read failed: {}", i, e))?;
                    if let Some(fill) = expect {
                        if let Some(pos) = buf.iter().position(|b| *b != fill) {
                            return Err(format!(
                                "step {}: byte {} is {:#04x}, expected {:#04x}",
                                i, pos, buf[pos], fill
                            )
                            .into());
                        }
                    }
                }
                Step::Tick { ticks: n } => ticks.advance(n),
                Step::Poll => {
                    let _timer = irq.enter_timer_irq();
                    let ret = bdev.ioctl(BdevOp::IRQ_HANDLER.into(), None);
                    if ret < 0 {
                        log::warn!("step {}: poll returned {}", i, ret);
                    }
                }
                Step::Sync => {
                    let ret = bdev.ioctl(BdevOp::SYNC.into(), None);
                    if ret != 0 {
                        return Err(format!("step {}: sync failed: {}", i, ret).into());
                    }
                }
            }
        }

        if final_sync {
            bdev.sync()
                .map_err(|e| format!("final sync failed: {}", e))?;
        }
        let dirty = bdev.state().dirty;
        let (image, flushes) = bdev.with_flash(|flash| (flash.image().to_vec(), flash.erase_count()));
        Ok(Outcome {
            image,
            flushes,
            dirty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
flush_delay = 1000

[geometry]
capacity = 65536

[[steps]]
op = "write"
block = 0
fill = 0xAA

[[steps]]
op = "tick"
ticks = 500

[[steps]]
op = "poll"

[[steps]]
op = "read"
block = 0
expect = 0xAA

[[steps]]
op = "tick"
ticks = 500

[[steps]]
op = "poll"
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        assert_eq!(scenario.geometry.capacity, 65536);
        assert_eq!(scenario.geometry.sector_size, 4096);
        assert_eq!(scenario.steps.len(), 6);
        assert_eq!(
            scenario.steps[0],
            Step::Write {
                block: 0,
                count: 1,
                fill: 0xAA
            }
        );
        assert_eq!(scenario.steps[2], Step::Poll);
    }

    #[test]
    fn test_default_flush_delay() {
        let scenario = Scenario::parse("[geometry]\ncapacity = 4096\n").unwrap();
        assert_eq!(scenario.flush_delay, FLUSH_DELAY_TICKS);
        assert!(scenario.steps.is_empty());
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let text = "[geometry]\ncapacity = 4096\n[[steps]]\nop = \"erase\"\n";
        assert!(Scenario::parse(text).is_err());
    }

    #[test]
    fn test_replay_flushes_after_delay() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        let outcome = scenario.replay(vec![0xFF; 65536], false).unwrap();
        assert!(!outcome.dirty);
        assert_eq!(outcome.flushes, 1);
        assert!(outcome.image[..BLOCK_SZ].iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn test_replay_power_loss_drops_cached_writes() {
        let mut scenario = Scenario::parse(SCENARIO).unwrap();
        scenario.steps.truncate(4);
        let outcome = scenario.replay(vec![0xFF; 65536], false).unwrap();
        assert!(outcome.dirty);
        assert_eq!(outcome.flushes, 0);
        assert!(outcome.image[..BLOCK_SZ].iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn test_replay_read_mismatch_fails() {
        let text = "[geometry]\ncapacity = 4096\n[[steps]]\nop = \"read\"\nblock = 1\nexpect = 0\n";
        let scenario = Scenario::parse(text).unwrap();
        assert!(scenario.replay(vec![0xFF; 4096], true).is_err());
    }

    #[test]
    fn test_replay_rejects_mismatched_image() {
        let scenario = Scenario::parse("[geometry]\ncapacity = 8192\n").unwrap();
        assert!(scenario.replay(vec![0xFF; 4096], true).is_err());
    }
}
