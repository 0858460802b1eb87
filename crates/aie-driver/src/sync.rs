//! Sync Orchestrator
//!
//! Aligns the timer of every timer-bearing module in the partition to one
//! instant by resetting them all from a single broadcast event.
//!
//! ```text
//!  Idle ─▶ ChannelReserved ─▶ ShimBroadcastConfigured ─▶ TimerResetArmed ─▶ Triggered ─▶ Cleaned ─▶ Idle
//!               │                      │                        │
//!               └──────────────────────┴──────── RollingBack ◀──┘
//! ```
//!
//! 1. Reserve one broadcast channel on every target.
//! 2. Make every column's shim re-broadcast the shim event on that channel.
//! 3. Arm every target's timer to reset on its own broadcast event for the
//!    channel.
//! 4. Generate the shim event once at the column-0 shim.
//! 5. Disarm every target, clear every shim, release the channel.
//!
//! A failure in step 2 at column `k` clears shims `[0, k)`; a failure in
//! step 3 at target `j` disarms targets `[0, j)` and clears every shim.
//! Both release the channel. A failed trigger clears every shim and releases
//! the channel but leaves the arming in place, since the event may already
//! have reached part of the array. A released channel never has a shim
//! still driving it.

use crate::backend::RegisterIo;
use crate::device::DeviceContext;
use crate::error::{AieError, Result};
use crate::resource::ResourceRecord;
use crate::timer::ResetMode;
use aie_chip::{Event, Module, TileLoc};
use std::fmt;
use std::ops::Range;
use tracing::{debug, error, info, warn};

/// Protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing held
    Idle,
    /// Broadcast channel reserved on every target
    ChannelReserved,
    /// Every shim re-broadcasts the shim event
    ShimBroadcastConfigured,
    /// Every target resets on the channel's event
    TimerResetArmed,
    /// Shim event generated
    Triggered,
    /// Arming and shim configuration undone, channel released
    Cleaned,
    /// Undoing a failed step
    RollingBack,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ChannelReserved => "channel-reserved",
            Self::ShimBroadcastConfigured => "shim-broadcast-configured",
            Self::TimerResetArmed => "timer-reset-armed",
            Self::Triggered => "triggered",
            Self::Cleaned => "cleaned",
            Self::RollingBack => "rolling-back",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Broadcast channel used
    pub channel: u8,
    /// Columns whose shim was configured
    pub columns: u8,
    /// Timers reset
    pub targets: usize,
}

impl<B: RegisterIo> DeviceContext<B> {
    /// Reset every timer in the partition at the same instant
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhausted` if no broadcast channel is free on every
    /// target (nothing is changed), or the first failure of any later step
    /// after rolling that step back.
    pub fn synchronize_timers(&mut self) -> Result<SyncReport> {
        let mut sync = TimerSync::reserve(self)?;
        sync.fan_out()?;
        sync.arm()?;
        sync.trigger()?;
        sync.clean_up()
    }
}

struct TimerSync<'a, B: RegisterIo> {
    ctx: &'a mut DeviceContext<B>,
    records: Vec<ResourceRecord>,
    channel: u8,
    shim_event: Event,
    columns: u8,
    phase: SyncPhase,
}

impl<'a, B: RegisterIo> TimerSync<'a, B> {
    fn reserve(ctx: &'a mut DeviceContext<B>) -> Result<Self> {
        let targets = ctx.timer_target_count();
        let columns = ctx.partition().num_cols;
        let grant = ctx.request_broadcast_channels(1)?;
        debug_assert_eq!(grant.records.len(), targets);

        let Some(channel) = grant.records.first().map(|r| r.rsc_id) else {
            return Err(AieError::invalid_argument("partition has no timer targets"));
        };

        let shim_event = match ctx.broadcast_event_for_channel(TileLoc::shim(0), Module::Pl, channel) {
            Ok(event) => event,
            Err(e) => {
                error!("Timer sync: no shim event for channel {channel}: {e}");
                if let Err(release) = ctx.release_broadcast_channels(&grant.records) {
                    warn!("Timer sync: releasing channel {channel} failed: {release}");
                }
                return Err(e);
            }
        };

        let mut sync = Self {
            ctx,
            records: grant.records,
            channel,
            shim_event,
            columns,
            phase: SyncPhase::Idle,
        };
        sync.enter(SyncPhase::ChannelReserved);
        Ok(sync)
    }

    fn fan_out(&mut self) -> Result<()> {
        for col in 0..self.columns {
            if let Err(e) = self
                .ctx
                .broadcast_event(TileLoc::shim(col), Module::Pl, self.channel, self.shim_event)
            {
                error!("Timer sync: shim broadcast at column {col} failed: {e}");
                self.roll_back(0, col);
                return Err(e);
            }
        }
        self.enter(SyncPhase::ShimBroadcastConfigured);
        Ok(())
    }

    fn arm(&mut self) -> Result<()> {
        for j in 0..self.records.len() {
            let ResourceRecord { loc, module, .. } = self.records[j];
            let armed = self
                .ctx
                .broadcast_event_for_channel(loc, module, self.channel)
                .and_then(|event| self.ctx.set_timer_reset_event(loc, module, event, ResetMode::Disable));
            if let Err(e) = armed {
                error!("Timer sync: arming {loc} {module} failed: {e}");
                self.roll_back(j, self.columns);
                return Err(e);
            }
        }
        self.enter(SyncPhase::TimerResetArmed);
        Ok(())
    }

    /// Generate the shim event at column 0.
    ///
    /// On failure the shims are cleared before the channel is released; the
    /// targets stay armed.
    fn trigger(&mut self) -> Result<()> {
        if let Err(e) = self.ctx.generate_event(TileLoc::shim(0), Module::Pl, self.shim_event) {
            error!("Timer sync: trigger failed, timers left armed: {e}");
            self.enter(SyncPhase::RollingBack);
            self.clear_shims(0..self.columns);
            self.release();
            self.enter(SyncPhase::Idle);
            return Err(e);
        }
        self.enter(SyncPhase::Triggered);
        Ok(())
    }

    fn clean_up(mut self) -> Result<SyncReport> {
        let disarmed = self.disarm(self.records.len());
        let cleared = self.clear_shims(0..self.columns);
        let released = self.ctx.release_broadcast_channels(&self.records).err();

        if let Some(e) = disarmed.or(cleared).or(released) {
            error!("Timer sync: clean-up incomplete: {e}");
            self.enter(SyncPhase::Idle);
            return Err(e);
        }

        self.enter(SyncPhase::Cleaned);
        let report = SyncReport {
            channel: self.channel,
            columns: self.columns,
            targets: self.records.len(),
        };
        info!(
            "Synchronized {} timers across {} columns on broadcast channel {}",
            report.targets, report.columns, report.channel
        );
        self.enter(SyncPhase::Idle);
        Ok(report)
    }

    /// Disarm targets `[0, armed)`, clear shims `[0, shims)`, release the channel.
    fn roll_back(&mut self, armed: usize, shims: u8) {
        self.enter(SyncPhase::RollingBack);
        self.disarm(armed);
        self.clear_shims(0..shims);
        self.release();
        self.enter(SyncPhase::Idle);
    }

    /// Reset-event configuration of targets `[0, count)` back to baseline.
    /// Keeps going past failures and returns the first.
    fn disarm(&mut self, count: usize) -> Option<AieError> {
        let mut first = None;
        for &ResourceRecord { loc, module, .. } in &self.records[..count] {
            let result = self
                .ctx
                .module_props(loc, module)
                .map(|props| props.event_table.baseline())
                .and_then(|baseline| self.ctx.set_timer_reset_event(loc, module, baseline, ResetMode::Disable));
            if let Err(e) = result {
                warn!("Timer sync: disarming {loc} {module} failed: {e}");
                first = first.or(Some(e));
            }
        }
        first
    }

    /// Shim broadcast output of `columns` back to no event.
    /// Keeps going past failures and returns the first.
    fn clear_shims(&mut self, columns: Range<u8>) -> Option<AieError> {
        let mut first = None;
        for col in columns {
            let shim = TileLoc::shim(col);
            let result = self
                .ctx
                .module_props(shim, Module::Pl)
                .map(|props| props.event_table.baseline())
                .and_then(|none| self.ctx.broadcast_event(shim, Module::Pl, self.channel, none));
            if let Err(e) = result {
                warn!("Timer sync: clearing shim broadcast at column {col} failed: {e}");
                first = first.or(Some(e));
            }
        }
        first
    }

    fn release(&mut self) {
        if let Err(e) = self.ctx.release_broadcast_channels(&self.records) {
            warn!("Timer sync: releasing channel {} failed: {e}", self.channel);
        }
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!("Timer sync: {} -> {phase}", self.phase);
        self.phase = phase;
    }
}
