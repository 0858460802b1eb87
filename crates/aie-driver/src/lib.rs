//! Pure Rust driver for AMD/Xilinx AI Engine arrays (AIE and AIE-ML).
//!
//! Drives the per-tile primitives directly through 32-bit register access:
//! hardware locks, broadcast channels, and the 64-bit timers. On top of
//! those it aligns every timer of a partition to a single instant.
//!
//! # Backend hierarchy
//!
//! ```text
//! Hardware:
//!   MmapBackend      UIO / devmem register window via mmap(2)
//!
//! Development and CI:
//!   SimulatedArray   in-process register file with timers, locks and
//!                    broadcast propagation
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use aie_driver::{DeviceConfig, DeviceContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::from_env()?;
//! let mut ctx = DeviceContext::open(&config)?;
//!
//! let report = ctx.synchronize_timers()?;
//! println!("{} timers aligned via broadcast channel {}", report.targets, report.channel);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
mod config;
mod device;
mod error;
mod event;
pub mod locks;
mod poll;
mod resource;
mod sync;
mod timer;

pub use aie_chip;
pub use aie_chip::{Event, Generation, Module, Partition, TileLoc, TileType};

pub use backend::{select_backend, BackendSelection, BackendType, RegisterIo};
pub use backends::{MmapBackend, SimulatedArray};
pub use config::{parse_address, DeviceConfig};
pub use device::DeviceContext;
pub use error::{AieError, ErrorKind, Result};
pub use locks::{AieLocks, AieMlLocks, Lock, LockEngine, LockOp, LockSite};
pub use resource::{BroadcastPool, ChannelGrant, ResourceRecord, NUM_BROADCAST_CHANNELS};
pub use sync::{SyncPhase, SyncReport};
pub use timer::{ResetMode, MAX_WAIT_CYCLES};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        AieError, DeviceConfig, DeviceContext, Event, Lock, Module, Partition, RegisterIo,
        ResetMode, Result, SyncReport, TileLoc,
    };
}
