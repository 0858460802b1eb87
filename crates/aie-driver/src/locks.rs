//! Lock Engine
//!
//! Hardware locks are requested by *reading* an address that encodes the
//! lock id, the operation and the value; bit 0 of the returned word says
//! whether the request was granted. The encoding differs per generation, so
//! it sits behind [`LockEngine`], chosen once when a context is opened.
//!
//! | Generation | Lock kind | Request value |
//! |------------|-----------|---------------|
//! | AIE | binary, with an optional 0/1 value | `-1` (none), `0`, `1` |
//! | AIE-ML | semaphore, `0..=63` | 7-bit signed change, `-64..=63` |
//!
//! A failed request leaves nothing to undo: the hardware lock is unchanged.

use crate::backend::RegisterIo;
use crate::device::DeviceContext;
use crate::error::{AieError, Result};
use aie_chip::regs::{aie, aieml, LockRegs};
use aie_chip::{Generation, TileLoc};
use std::fmt::Debug;

/// Mask of the result bit in a lock request read
pub const LOCK_RESULT_MASK: u32 = 0x1;

/// Result bit pattern of a granted request
pub const LOCK_RESULT_SUCCESS: u32 = 0x1;

/// Largest value a lock value register holds
pub const MAX_LOCK_VALUE: u8 = 63;

/// A lock and the value attached to one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock {
    /// Lock index within the tile
    pub id: u8,
    /// Request value; meaning depends on the generation
    pub value: i8,
}

impl Lock {
    /// Create a lock request
    #[must_use]
    pub const fn new(id: u8, value: i8) -> Self {
        Self { id, value }
    }
}

/// Lock request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOp {
    /// Acquire
    Acquire,
    /// Release
    Release,
}

impl std::fmt::Display for LockOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquire => write!(f, "acquire"),
            Self::Release => write!(f, "release"),
        }
    }
}

/// Lock module of one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSite {
    /// Tile holding the locks
    pub loc: TileLoc,
    /// Absolute address of the tile's register window
    pub tile_address: u64,
    /// Lock module registers
    pub regs: LockRegs,
}

/// Generation-specific lock request encoding
pub trait LockEngine: Debug + Send + Sync {
    /// Generation this engine encodes for
    fn generation(&self) -> Generation;

    /// Offset of the request within the tile's register window
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a lock id or value the generation
    /// cannot encode.
    fn request_offset(&self, regs: &LockRegs, lock: Lock, op: LockOp) -> Result<u32>;

    /// Absolute address of the request
    ///
    /// # Errors
    ///
    /// See [`LockEngine::request_offset`].
    fn request_address(&self, site: &LockSite, lock: Lock, op: LockOp) -> Result<u64> {
        Ok(site.tile_address + u64::from(self.request_offset(&site.regs, lock, op)?))
    }

    /// Acquire `lock`, polling for up to `timeout_us` (0 = single attempt)
    ///
    /// # Errors
    ///
    /// Returns `LockOperationFailed` if the request is not granted in time.
    fn acquire(&self, io: &mut dyn RegisterIo, site: &LockSite, lock: Lock, timeout_us: u32) -> Result<()> {
        request(self, io, site, lock, LockOp::Acquire, timeout_us)
    }

    /// Release `lock`, polling for up to `timeout_us` (0 = single attempt)
    ///
    /// # Errors
    ///
    /// Returns `LockOperationFailed` if the request is not granted in time.
    fn release(&self, io: &mut dyn RegisterIo, site: &LockSite, lock: Lock, timeout_us: u32) -> Result<()> {
        request(self, io, site, lock, LockOp::Release, timeout_us)
    }
}

fn request<E: LockEngine + ?Sized>(
    engine: &E,
    io: &mut dyn RegisterIo,
    site: &LockSite,
    lock: Lock,
    op: LockOp,
    timeout_us: u32,
) -> Result<()> {
    let address = engine.request_address(site, lock, op)?;
    if io.mask_poll(address, LOCK_RESULT_MASK, LOCK_RESULT_SUCCESS, timeout_us)? {
        tracing::debug!("Lock {} {op} at {} (value {})", lock.id, site.loc, lock.value);
        Ok(())
    } else {
        Err(AieError::LockOperationFailed {
            loc: site.loc,
            lock_id: lock.id,
            timeout_us,
        })
    }
}

fn check_id(regs: &LockRegs, lock: Lock) -> Result<()> {
    if lock.id >= regs.num_locks {
        return Err(AieError::invalid_argument(format!(
            "lock {} out of range (tile has {})",
            lock.id, regs.num_locks
        )));
    }
    Ok(())
}

/// First-generation binary locks
#[derive(Debug, Clone, Copy, Default)]
pub struct AieLocks;

impl LockEngine for AieLocks {
    fn generation(&self) -> Generation {
        Generation::Aie
    }

    fn request_offset(&self, regs: &LockRegs, lock: Lock, op: LockOp) -> Result<u32> {
        check_id(regs, lock)?;
        let value = match lock.value {
            -1 => 0,
            0 => aie::LOCK_VALUE0_OFFSET,
            1 => aie::LOCK_VALUE1_OFFSET,
            v => {
                return Err(AieError::invalid_argument(format!(
                    "AIE lock value must be -1, 0 or 1, got {v}"
                )))
            }
        };
        let acquire = if op == LockOp::Acquire { regs.acquire_offset } else { 0 };
        Ok(regs.request_base + u32::from(lock.id) * regs.lock_stride + acquire + value)
    }
}

/// Second-generation semaphore locks
#[derive(Debug, Clone, Copy, Default)]
pub struct AieMlLocks;

impl LockEngine for AieMlLocks {
    fn generation(&self) -> Generation {
        Generation::AieMl
    }

    fn request_offset(&self, regs: &LockRegs, lock: Lock, op: LockOp) -> Result<u32> {
        check_id(regs, lock)?;
        if !(-64..=63).contains(&lock.value) {
            return Err(AieError::invalid_argument(format!(
                "AIE-ML lock value must be in -64..=63, got {}",
                lock.value
            )));
        }
        #[allow(clippy::cast_sign_loss)]
        let value = (i32::from(lock.value) as u32 & aieml::LOCK_VALUE_MASK) << aieml::LOCK_VALUE_SHIFT;
        let acquire = if op == LockOp::Acquire { regs.acquire_offset } else { 0 };
        Ok(regs.request_base + u32::from(lock.id) * regs.lock_stride + acquire + value)
    }
}

static AIE_LOCK_ENGINE: AieLocks = AieLocks;
static AIEML_LOCK_ENGINE: AieMlLocks = AieMlLocks;

/// Lock engine for `generation`
pub fn engine_for(generation: Generation) -> &'static dyn LockEngine {
    match generation {
        Generation::Aie => &AIE_LOCK_ENGINE,
        Generation::AieMl => &AIEML_LOCK_ENGINE,
    }
}

impl<B: RegisterIo> DeviceContext<B> {
    /// Lock module of the tile at `loc`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` if the tile has no lock module.
    pub fn lock_site(&self, loc: TileLoc) -> Result<LockSite> {
        let regs = self
            .tile_props(loc)?
            .locks
            .ok_or_else(|| AieError::invalid_tile(loc, "tile has no lock module"))?;
        Ok(LockSite {
            loc,
            tile_address: self.tile_address(loc),
            regs,
        })
    }

    /// Acquire `lock` at `loc`
    ///
    /// `timeout_us == 0` makes a single, non-blocking attempt.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile`/`InvalidArgument` before any access for a bad
    /// location or lock, `LockOperationFailed` if not granted in time.
    pub fn acquire_lock(&mut self, loc: TileLoc, lock: Lock, timeout_us: u32) -> Result<()> {
        let site = self.lock_site(loc)?;
        let engine = self.lock_engine();
        engine.acquire(&mut self.io, &site, lock, timeout_us)
    }

    /// Release `lock` at `loc`
    ///
    /// # Errors
    ///
    /// As [`DeviceContext::acquire_lock`].
    pub fn release_lock(&mut self, loc: TileLoc, lock: Lock, timeout_us: u32) -> Result<()> {
        let site = self.lock_site(loc)?;
        let engine = self.lock_engine();
        engine.release(&mut self.io, &site, lock, timeout_us)
    }

    /// Write the value register of lock `id` at `loc`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an out-of-range id or value, or on a
    /// generation without lock value registers.
    pub fn set_lock_value(&mut self, loc: TileLoc, id: u8, value: u8) -> Result<()> {
        if value > MAX_LOCK_VALUE {
            return Err(AieError::invalid_argument(format!(
                "lock value {value} above {MAX_LOCK_VALUE}"
            )));
        }
        let address = self.lock_value_address(loc, id)?;
        tracing::debug!("Lock {id} at {loc} set to {value}");
        self.io.write32(address, u32::from(value))
    }

    /// Read the value register of lock `id` at `loc`
    ///
    /// # Errors
    ///
    /// As [`DeviceContext::set_lock_value`].
    pub fn lock_value(&mut self, loc: TileLoc, id: u8) -> Result<u8> {
        let address = self.lock_value_address(loc, id)?;
        let raw = self.io.read32(address)?;
        #[allow(clippy::cast_possible_truncation)]
        let value = (raw & u32::from(MAX_LOCK_VALUE)) as u8;
        Ok(value)
    }

    fn lock_value_address(&self, loc: TileLoc, id: u8) -> Result<u64> {
        let site = self.lock_site(loc)?;
        check_id(&site.regs, Lock::new(id, 0))?;
        let reg = site.regs.value_register(id).ok_or_else(|| {
            AieError::invalid_argument(format!("{} locks have no value registers", self.generation()))
        })?;
        Ok(site.tile_address + u64::from(reg))
    }
}
