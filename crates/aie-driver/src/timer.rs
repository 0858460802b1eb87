//! Timer Engine
//!
//! Every timer-bearing module has a free-running 64-bit counter exposed as
//! two 32-bit halves, a trigger threshold and a control register holding a
//! one-shot reset bit and the event that resets the counter.

use crate::backend::RegisterIo;
use crate::device::DeviceContext;
use crate::error::{AieError, Result};
use aie_chip::{Event, Module, TileLoc, TranslateError};

/// Largest cycle count [`DeviceContext::wait_cycles`] accepts
pub const MAX_WAIT_CYCLES: u64 = 0xFFFF_FFFF_FFFF;

/// Value of the control register's reset field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Leave the counter running
    #[default]
    Disable,
    /// Reset the counter now
    Enable,
}

impl ResetMode {
    const fn bit(self) -> u32 {
        match self {
            Self::Disable => 0,
            Self::Enable => 1,
        }
    }
}

impl TryFrom<u8> for ResetMode {
    type Error = AieError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Disable),
            1 => Ok(Self::Enable),
            other => Err(AieError::invalid_argument(format!(
                "reset mode must be 0 or 1, got {other}"
            ))),
        }
    }
}

impl<B: RegisterIo> DeviceContext<B> {
    /// Read the 64-bit timer of `module` at `loc`
    ///
    /// The low half is read first, then the high half. The two reads are
    /// not atomic: if the low half wraps in between, the result is off by
    /// 2^32. Callers needing an exact value re-read and compare.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` for an unsupported module, or the read error.
    pub fn read_timer(&mut self, loc: TileLoc, module: Module) -> Result<u64> {
        let timer = self.module_props(loc, module)?.timer;
        let base = self.tile_address(loc);
        let low = self.io.read32(base + u64::from(timer.low))?;
        let high = self.io.read32(base + u64::from(timer.high))?;
        Ok((u64::from(high) << 32) | u64::from(low))
    }

    /// Reset the timer of `module` at `loc` to zero
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` for an unsupported module, or the access error.
    pub fn reset_timer(&mut self, loc: TileLoc, module: Module) -> Result<()> {
        let timer = self.module_props(loc, module)?.timer;
        let address = self.tile_address(loc) + u64::from(timer.ctrl);
        tracing::debug!("Reset timer at {loc} {module}");
        self.io.mask_write32(address, timer.reset.mask, timer.reset.set(1))
    }

    /// Program the trigger threshold of `module` at `loc`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` for an unsupported module, or the write error.
    pub fn set_timer_trigger(&mut self, loc: TileLoc, module: Module, low: u32, high: u32) -> Result<()> {
        let timer = self.module_props(loc, module)?.timer;
        let base = self.tile_address(loc);
        tracing::debug!("Timer trigger at {loc} {module} = {high:#x}:{low:#x}");
        self.io.write32(base + u64::from(timer.trig_low), low)?;
        self.io.write32(base + u64::from(timer.trig_high), high)
    }

    /// Make `event` reset the timer of `module` at `loc`
    ///
    /// Writes the reset-event and reset fields of the control register in a
    /// single write; other control bits are cleared.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an event outside the module's range,
    /// `EventTranslationFailed` for an event the module cannot observe, and
    /// `InvalidTile` for an unsupported module. Nothing is written on error.
    pub fn set_timer_reset_event(&mut self, loc: TileLoc, module: Module, event: Event, reset: ResetMode) -> Result<()> {
        let props = self.module_props(loc, module)?;
        let number = props.event_table.translate(event).map_err(|e| match e {
            TranslateError::OutOfRange => AieError::invalid_argument(format!(
                "{event} outside the {module} module event range"
            )),
            TranslateError::Unmapped => AieError::EventTranslationFailed { event, module },
        })?;
        let timer = props.timer;
        let value = timer.reset_event.set(u32::from(number)) | timer.reset.set(reset.bit());
        tracing::debug!("Timer reset event at {loc} {module} = {number} ({reset:?})");
        self.io.write32(self.tile_address(loc) + u64::from(timer.ctrl), value)
    }

    /// Busy-wait until the timer of `module` at `loc` has advanced by `cycles`
    ///
    /// Bounded by the hardware counter, not by wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for `cycles` above [`MAX_WAIT_CYCLES`]
    /// without touching the timer, `HardwareAccessFailed` if the timer
    /// would wrap past `u64::MAX` before the wait ends, otherwise any read
    /// error.
    pub fn wait_cycles(&mut self, loc: TileLoc, module: Module, cycles: u64) -> Result<()> {
        if cycles > MAX_WAIT_CYCLES {
            return Err(AieError::invalid_argument(format!(
                "cannot wait {cycles} cycles (max {MAX_WAIT_CYCLES:#x})"
            )));
        }
        let start = self.read_timer(loc, module)?;
        let Some(end) = start.checked_add(cycles) else {
            let low = self.tile_address(loc) + u64::from(self.module_props(loc, module)?.timer.low);
            return Err(AieError::hardware_access_failed(
                low,
                format!("timer at {start:#x} would wrap before advancing {cycles} cycles"),
            ));
        };
        while self.read_timer(loc, module)? < end {
            std::hint::spin_loop();
        }
        Ok(())
    }
}
