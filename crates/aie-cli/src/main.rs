//! `aie` — command-line interface for AI Engine arrays.
//!
//! ```text
//! USAGE:
//!   aie info                               Partition geometry and backend
//!   aie sync-timers                        Align every timer in the partition
//!   aie read-timer <col> <row> <module>    Read one 64-bit timer
//!   aie reset-timer <col> <row> <module>   Reset one timer to zero
//!   aie wait-cycles <col> <row> <module> <cycles>
//!   aie lock acquire|release <col> <row> <id> <value>
//!   aie channels [count]                   Free (or reserve) broadcast channels
//! ```
//!
//! The device comes from `--backend`/`--device`/`--preset`, falling back to
//! the `AIE_*` environment variables, then to a simulated NPU1 array.

use aie_driver::{
    BackendSelection, DeviceConfig, DeviceContext, Generation, Lock, Module, Partition, TileLoc,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aie", about = "AMD/Xilinx AI Engine array CLI", version)]
struct Cli {
    #[command(flatten)]
    device: DeviceArgs,

    /// Log driver activity (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args)]
struct DeviceArgs {
    /// Register backend: simulated or mmap.
    #[arg(long, global = true)]
    backend: Option<BackendSelection>,

    /// Register window to map (selects the mmap backend).
    #[arg(long, global = true)]
    device: Option<PathBuf>,

    /// Partition preset: npu1, ve2802 or vc1902.
    #[arg(long, global = true)]
    preset: Option<String>,

    /// Override the preset's generation: aie or aieml.
    #[arg(long, global = true)]
    generation: Option<Generation>,

    /// Address of tile (0, 0), hex or decimal.
    #[arg(long, global = true)]
    base_address: Option<String>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print partition geometry, backend and resource state.
    Info,
    /// Reset every timer in the partition at the same instant.
    SyncTimers,
    /// Read the 64-bit timer of one module.
    ReadTimer(TimerTarget),
    /// Reset the timer of one module to zero.
    ResetTimer(TimerTarget),
    /// Busy-wait on one module's timer.
    WaitCycles {
        #[command(flatten)]
        target: TimerTarget,
        /// Cycles to wait (at most 0xFFFF_FFFF_FFFF).
        cycles: u64,
    },
    /// Acquire or release a hardware lock.
    Lock {
        #[command(subcommand)]
        op: LockCmd,
    },
    /// Show free broadcast channels, optionally reserving some first.
    Channels {
        /// Channels to reserve across the partition.
        count: Option<u32>,
    },
}

#[derive(Args)]
struct TimerTarget {
    /// Column.
    col: u8,
    /// Row (0 = shim).
    row: u8,
    /// Module: core, memory or pl.
    module: Module,
}

#[derive(Args)]
struct LockTarget {
    /// Column.
    col: u8,
    /// Row (0 = shim).
    row: u8,
    /// Lock index within the tile.
    id: u8,
    /// Request value (AIE: -1, 0 or 1; AIE-ML: -64..=63).
    #[arg(allow_hyphen_values = true)]
    value: i8,
    /// Poll for up to this many microseconds (0 = single attempt).
    #[arg(long, default_value_t = 0)]
    timeout_us: u32,
}

#[derive(Subcommand)]
enum LockCmd {
    /// Acquire a lock.
    Acquire(LockTarget),
    /// Release a lock.
    Release(LockTarget),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let config = build_config(&cli.device)?;
    let mut ctx = DeviceContext::open(&config).context("opening device")?;
    info!(
        "Opened {} partition ({} columns) on the {} backend",
        ctx.generation(),
        ctx.partition().num_cols,
        ctx.backend().backend_type()
    );

    match cli.command {
        Cmd::Info => cmd_info(&ctx),
        Cmd::SyncTimers => cmd_sync_timers(&mut ctx)?,
        Cmd::ReadTimer(t) => {
            let value = ctx.read_timer(TileLoc::new(t.col, t.row), t.module)?;
            println!("{value} ({value:#x})");
        }
        Cmd::ResetTimer(t) => {
            ctx.reset_timer(TileLoc::new(t.col, t.row), t.module)?;
            println!("Timer reset at ({}, {}) {}", t.col, t.row, t.module);
        }
        Cmd::WaitCycles { target: t, cycles } => {
            let loc = TileLoc::new(t.col, t.row);
            let start = ctx.read_timer(loc, t.module)?;
            ctx.wait_cycles(loc, t.module, cycles)?;
            let end = ctx.read_timer(loc, t.module)?;
            println!("Waited {} cycles (requested {cycles})", end - start);
        }
        Cmd::Lock { op } => cmd_lock(&mut ctx, op)?,
        Cmd::Channels { count } => cmd_channels(&mut ctx, count)?,
    }

    Ok(())
}

fn build_config(args: &DeviceArgs) -> Result<DeviceConfig> {
    let mut config = DeviceConfig::from_env().context("reading AIE_* environment")?;

    if let Some(name) = &args.preset {
        let partition = Partition::preset(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown preset: {name} (expected npu1, ve2802 or vc1902)"))?;
        config = config.with_partition(partition);
    }
    if let Some(generation) = args.generation {
        config = config.with_generation(generation);
    }
    if let Some(address) = &args.base_address {
        config = config.with_base_address(aie_driver::parse_address(address)?);
    }
    if let Some(path) = &args.device {
        config = config.with_device_path(path);
    }
    if let Some(backend) = args.backend {
        config = config.with_backend(backend);
    }
    debug!("CLI device config: {config:?}");
    Ok(config)
}

fn cmd_info(ctx: &DeviceContext) {
    let p = ctx.partition();
    println!("Generation    : {}", ctx.generation());
    println!("Backend       : {}", ctx.backend().backend_type());
    println!("Base address  : {:#x}", ctx.base_address());
    println!(
        "Geometry      : {} columns x {} rows ({} mem-tile rows)",
        p.num_cols, p.num_rows, p.mem_tile_rows
    );
    println!("Timer targets : {}", ctx.timer_target_count());
    println!("Free channels : {}", ctx.free_broadcast_channels());
    println!();

    for col in 0..p.num_cols {
        let column: Vec<String> = (0..p.num_rows)
            .filter_map(|row| ctx.tile_type(TileLoc::new(col, row)).ok())
            .map(|tt| tt.to_string())
            .collect();
        println!("  col {col:>3}: {}", column.join(" "));
    }
}

fn cmd_sync_timers(ctx: &mut DeviceContext) -> Result<()> {
    let report = ctx.synchronize_timers().context("timer synchronization")?;
    println!(
        "Synchronized {} timers across {} columns (broadcast channel {})",
        report.targets, report.columns, report.channel
    );
    Ok(())
}

fn cmd_lock(ctx: &mut DeviceContext, op: LockCmd) -> Result<()> {
    let t = match op {
        LockCmd::Acquire(t) => {
            let loc = TileLoc::new(t.col, t.row);
            ctx.acquire_lock(loc, Lock::new(t.id, t.value), t.timeout_us)?;
            println!("Acquired lock {} at {loc} (value {})", t.id, t.value);
            t
        }
        LockCmd::Release(t) => {
            let loc = TileLoc::new(t.col, t.row);
            ctx.release_lock(loc, Lock::new(t.id, t.value), t.timeout_us)?;
            println!("Released lock {} at {loc} (value {})", t.id, t.value);
            t
        }
    };
    let loc = TileLoc::new(t.col, t.row);

    if ctx.generation() == Generation::AieMl {
        println!("Lock value now {}", ctx.lock_value(loc, t.id)?);
    }
    Ok(())
}

fn cmd_channels(ctx: &mut DeviceContext, count: Option<u32>) -> Result<()> {
    if let Some(count) = count {
        let grant = ctx.request_broadcast_channels(count)?;
        println!(
            "Reserved channels {:?} on {} targets",
            grant.channels(),
            ctx.timer_target_count()
        );
    }
    println!("Free broadcast channels: {}", ctx.free_broadcast_channels());
    Ok(())
}
