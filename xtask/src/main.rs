mod logger;
mod scenario;
mod sim;

use clap::{Args, Parser, Subcommand};
use scenario::Scenario;
use sim::{Geometry, SimFlash, DEFAULT_SECTOR_SIZE};
use spi_bdev::{ExtIrqMask, SpiBdev, TickSource, BLOCK_SZ};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "xtask", about = "Host tools for the SPI flash block device")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    log: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an erased flash image.
    Mkimage(MkimageArgs),
    /// Replay a TOML scenario against a flash image.
    Replay(ReplayArgs),
    /// Hex-dump one block of a flash image.
    Dump(DumpArgs),
}

#[derive(Args)]
struct MkimageArgs {
    #[arg(long)]
    out: PathBuf,
    /// Image size in bytes, a multiple of the sector size.
    #[arg(long, default_value_t = 2 * 1024 * 1024)]
    size: u32,
}

#[derive(Args)]
struct ReplayArgs {
    scenario: PathBuf,
    /// Image to start from; an erased image is used when absent.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Where to save the resulting image.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Skip the final sync, dropping writes still in the flash cache.
    #[arg(long)]
    power_loss: bool,
}

#[derive(Args)]
struct DumpArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long, default_value_t = 0)]
    block: u32,
    #[arg(long, default_value_t = DEFAULT_SECTOR_SIZE)]
    sector_size: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(Some(&cli.log));
    let ret = match cli.command {
        Commands::Mkimage(args) => args.run(),
        Commands::Replay(args) => args.run(),
        Commands::Dump(args) => args.run(),
    };
    match ret {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

impl MkimageArgs {
    fn run(self) -> Result<(), Box<dyn Error>> {
        fs::write(&self.out, erased_image(self.size)?)?;
        log::info!(
            "created {} ({} blocks)",
            self.out.display(),
            self.size as usize / BLOCK_SZ
        );
        Ok(())
    }
}

/// 全部为擦除态（0xFF）的镜像
fn erased_image(size: u32) -> Result<Vec<u8>, String> {
    if size == 0 || size % DEFAULT_SECTOR_SIZE != 0 {
        return Err(format!("size must be a multiple of {}", DEFAULT_SECTOR_SIZE));
    }
    Ok(vec![0xFF; size as usize])
}

impl ReplayArgs {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let scenario = Scenario::parse(&fs::read_to_string(&self.scenario)?)?;
        let image = match &self.image {
            Some(path) => fs::read(path)?,
            None => vec![0xFF; scenario.geometry.capacity as usize],
        };
        let outcome = scenario.replay(image, !self.power_loss)?;
        log::info!(
            "replayed {} steps, {} sector programs, {}",
            scenario.steps.len(),
            outcome.flushes,
            if outcome.dirty { "cache dirty" } else { "clean" }
        );
        if let Some(out) = &self.out {
            fs::write(out, &outcome.image)?;
            log::info!("saved {}", out.display());
        }
        Ok(())
    }
}

impl DumpArgs {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let image = fs::read(&self.image)?;
        for line in dump_block(image, self.block, self.sector_size)? {
            println!("{}", line);
        }
        Ok(())
    }
}

/// 通过块设备读出 `block` 并格式化为十六进制转储行
fn dump_block(image: Vec<u8>, block: u32, sector_size: u32) -> Result<Vec<String>, String> {
    let geometry = Geometry {
        capacity: image.len() as u32,
        sector_size,
    }
    .interned();
    let bdev = unsafe { SpiBdev::new(SimFlash::new(image), NoTicks, ExtIrqMask, ()) };
    bdev.init(geometry)
        .map_err(|e| format!("bad image: {}", e))?;
    let mut buf = vec![0u8; BLOCK_SZ];
    bdev.read_blocks(&mut buf, block, 1)
        .map_err(|e| format!("read block {}: {}", block, e))?;
    let base = block as usize * BLOCK_SZ;
    let lines = buf
        .chunks(16)
        .enumerate()
        .map(|(i, line)| {
            let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
            let ascii: String = line
                .iter()
                .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                .collect();
            format!("{:08x}  {}  {}", base + i * 16, hex.join(" "), ascii)
        })
        .collect();
    Ok(lines)
}

/// 只读转储不需要计时
struct NoTicks;

impl TickSource for NoTicks {
    fn now(&self) -> u32 {
        0
    }
}
