//! Resource Allocator for broadcast channels
//!
//! Every (tile, module) pair has 16 broadcast channels. A channel requested
//! for a set of targets must be free on *all* of them, and is then reserved
//! on all of them. Requests are all-or-nothing: a request that cannot be
//! satisfied reserves nothing.
//!
//! The pool lives inside the [`DeviceContext`] and is mutated only through
//! `&mut` access, so the context's owner serialises all allocator calls.

use crate::backend::RegisterIo;
use crate::device::DeviceContext;
use crate::error::{AieError, Result};
use aie_chip::{Module, TileLoc};
use std::collections::HashMap;

/// Broadcast channels per module
pub const NUM_BROADCAST_CHANNELS: u8 = 16;

/// One reserved channel on one (tile, module)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceRecord {
    /// Tile location
    pub loc: TileLoc,
    /// Module within the tile
    pub module: Module,
    /// Reserved channel
    pub rsc_id: u8,
}

/// Result of a successful channel request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGrant {
    /// Number of channels granted
    pub granted: u32,
    /// One record per channel per target, channel-major
    pub records: Vec<ResourceRecord>,
}

impl ChannelGrant {
    /// Distinct channels in the grant, in grant order
    pub fn channels(&self) -> Vec<u8> {
        let mut channels: Vec<u8> = Vec::new();
        for record in &self.records {
            if !channels.contains(&record.rsc_id) {
                channels.push(record.rsc_id);
            }
        }
        channels
    }
}

/// Broadcast-channel reservation state
#[derive(Debug, Clone, Default)]
pub struct BroadcastPool {
    reserved: HashMap<(TileLoc, Module), u16>,
}

impl BroadcastPool {
    /// Empty pool: every channel free everywhere
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `channel` is reserved on `module` at `loc`
    pub fn is_reserved(&self, loc: TileLoc, module: Module, channel: u8) -> bool {
        channel < NUM_BROADCAST_CHANNELS
            && self
                .reserved
                .get(&(loc, module))
                .is_some_and(|mask| mask & (1 << channel) != 0)
    }

    /// Channels free on every one of `targets`, ascending
    pub fn free_channels(&self, targets: &[(TileLoc, Module)]) -> Vec<u8> {
        let busy = targets
            .iter()
            .filter_map(|key| self.reserved.get(key))
            .fold(0u16, |acc, mask| acc | mask);
        (0..NUM_BROADCAST_CHANNELS).filter(|ch| busy & (1 << ch) == 0).collect()
    }

    /// Number of channels free on every one of `targets`
    pub fn free_channel_count(&self, targets: &[(TileLoc, Module)]) -> u32 {
        // at most 16
        #[allow(clippy::cast_possible_truncation)]
        let count = self.free_channels(targets).len() as u32;
        count
    }

    /// Total reservations held, over all tiles and channels
    pub fn reserved_count(&self) -> u32 {
        self.reserved.values().map(|mask| mask.count_ones()).sum()
    }

    /// Reserve `count` channels on every one of `targets`
    ///
    /// The lowest free channels are granted. Records come channel-major,
    /// targets in the order given.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for `count == 0` or no targets, and
    /// `ResourceExhausted` (reserving nothing) if fewer than `count`
    /// channels are free.
    pub fn request_channels(&mut self, targets: &[(TileLoc, Module)], count: u32) -> Result<ChannelGrant> {
        if count == 0 {
            return Err(AieError::invalid_argument("channel count must be at least 1"));
        }
        if targets.is_empty() {
            return Err(AieError::invalid_argument("no targets to reserve channels on"));
        }

        let free = self.free_channels(targets);
        let wanted = usize::try_from(count).unwrap_or(usize::MAX);
        if free.len() < wanted {
            #[allow(clippy::cast_possible_truncation)]
            let available = free.len() as u32;
            return Err(AieError::ResourceExhausted {
                requested: count,
                available,
            });
        }

        let channels = &free[..wanted];
        let mut records = Vec::with_capacity(wanted * targets.len());
        for &channel in channels {
            for &(loc, module) in targets {
                *self.reserved.entry((loc, module)).or_default() |= 1 << channel;
                records.push(ResourceRecord {
                    loc,
                    module,
                    rsc_id: channel,
                });
            }
        }

        tracing::debug!("Reserved broadcast channels {channels:?} on {} targets", targets.len());
        Ok(ChannelGrant {
            granted: count,
            records,
        })
    }

    /// Reserve one channel on a single (tile, module)
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a channel above 15 and
    /// `ResourceExhausted` if it is already reserved there.
    pub fn reserve(&mut self, record: ResourceRecord) -> Result<()> {
        check_channel(record.rsc_id)?;
        if self.is_reserved(record.loc, record.module, record.rsc_id) {
            return Err(AieError::ResourceExhausted {
                requested: 1,
                available: 0,
            });
        }
        *self.reserved.entry((record.loc, record.module)).or_default() |= 1 << record.rsc_id;
        Ok(())
    }

    /// Free every record in `records`
    ///
    /// Releasing a record that is not reserved is a no-op, so a list may be
    /// released more than once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` (freeing nothing) if a record names a
    /// channel above 15.
    pub fn release_channels(&mut self, records: &[ResourceRecord]) -> Result<()> {
        for record in records {
            check_channel(record.rsc_id)?;
        }
        for record in records {
            let key = (record.loc, record.module);
            if let Some(mask) = self.reserved.get_mut(&key) {
                *mask &= !(1 << record.rsc_id);
                if *mask == 0 {
                    self.reserved.remove(&key);
                }
            }
        }
        Ok(())
    }
}

fn check_channel(channel: u8) -> Result<()> {
    if channel >= NUM_BROADCAST_CHANNELS {
        return Err(AieError::invalid_argument(format!(
            "broadcast channel {channel} out of range (0..{NUM_BROADCAST_CHANNELS})"
        )));
    }
    Ok(())
}

impl<B: RegisterIo> DeviceContext<B> {
    /// Reserve `count` broadcast channels across the whole partition
    ///
    /// # Errors
    ///
    /// See [`BroadcastPool::request_channels`].
    pub fn request_broadcast_channels(&mut self, count: u32) -> Result<ChannelGrant> {
        let targets = self.timer_targets();
        let grant = self.broadcast.request_channels(&targets, count)?;
        tracing::info!("Reserved broadcast channel(s) {:?} across the partition", grant.channels());
        Ok(grant)
    }

    /// Release channels obtained from [`DeviceContext::request_broadcast_channels`]
    ///
    /// # Errors
    ///
    /// See [`BroadcastPool::release_channels`].
    pub fn release_broadcast_channels(&mut self, records: &[ResourceRecord]) -> Result<()> {
        self.broadcast.release_channels(records)?;
        tracing::info!("Released {} broadcast channel reservation(s)", records.len());
        Ok(())
    }

    /// Reserve one channel on one (tile, module)
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` if the module does not exist at the location,
    /// otherwise see [`BroadcastPool::reserve`].
    pub fn reserve_broadcast_channel(&mut self, record: ResourceRecord) -> Result<()> {
        self.module_props(record.loc, record.module)?;
        self.broadcast.reserve(record)
    }

    /// Channels free on every timer target of the partition
    pub fn free_broadcast_channels(&self) -> u32 {
        self.broadcast.free_channel_count(&self.timer_targets())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn targets() -> Vec<(TileLoc, Module)> {
        vec![
            (TileLoc::shim(0), Module::Pl),
            (TileLoc::new(0, 1), Module::Memory),
            (TileLoc::new(0, 2), Module::Core),
        ]
    }

    #[test]
    fn grants_lowest_channels_channel_major() {
        let mut pool = BroadcastPool::new();
        let grant = pool.request_channels(&targets(), 2).unwrap();
        assert_eq!(grant.granted, 2);
        assert_eq!(grant.channels(), vec![0, 1]);
        assert_eq!(grant.records.len(), 6);
        assert_eq!(grant.records[0].rsc_id, 0);
        assert_eq!(grant.records[2].rsc_id, 0);
        assert_eq!(grant.records[3].rsc_id, 1);
        assert_eq!(grant.records[3].loc, TileLoc::shim(0));
        assert_eq!(pool.reserved_count(), 6);
    }

    #[test]
    fn exact_fit_then_exhaustion() {
        let mut pool = BroadcastPool::new();
        pool.reserve(ResourceRecord {
            loc: TileLoc::new(0, 1),
            module: Module::Memory,
            rsc_id: 5,
        })
        .unwrap();
        let t = targets();
        assert_eq!(pool.free_channel_count(&t), 15);

        let err = pool.request_channels(&t, 16).unwrap_err();
        assert!(matches!(
            err,
            AieError::ResourceExhausted {
                requested: 16,
                available: 15
            }
        ));
        assert_eq!(pool.free_channel_count(&t), 15, "failed request reserves nothing");

        let grant = pool.request_channels(&t, 15).unwrap();
        let mut ids = grant.channels();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 15);
        assert!(!ids.contains(&5));
        assert_eq!(pool.free_channel_count(&t), 0);
    }

    #[test]
    fn release_is_idempotent() {
        let mut pool = BroadcastPool::new();
        let t = targets();
        let grant = pool.request_channels(&t, 1).unwrap();
        pool.release_channels(&grant.records).unwrap();
        pool.release_channels(&grant.records).unwrap();
        assert_eq!(pool.free_channel_count(&t), 16);
        assert_eq!(pool.reserved_count(), 0);
    }

    #[test]
    fn partial_release_frees_only_listed_records() {
        let mut pool = BroadcastPool::new();
        let t = targets();
        let grant = pool.request_channels(&t, 1).unwrap();
        pool.release_channels(&grant.records[..1]).unwrap();
        assert!(!pool.is_reserved(TileLoc::shim(0), Module::Pl, 0));
        assert!(pool.is_reserved(TileLoc::new(0, 2), Module::Core, 0));
        assert_eq!(pool.free_channel_count(&t[..1]), 16);
        assert_eq!(pool.free_channel_count(&t), 15);
    }

    #[test]
    fn bad_arguments() {
        let mut pool = BroadcastPool::new();
        assert_eq!(pool.request_channels(&targets(), 0).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(pool.request_channels(&[], 1).unwrap_err().kind(), ErrorKind::InvalidArgument);
        let bad = ResourceRecord {
            loc: TileLoc::shim(0),
            module: Module::Pl,
            rsc_id: 16,
        };
        assert_eq!(pool.reserve(bad).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(pool.release_channels(&[bad]).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn double_reserve_is_exhausted() {
        let mut pool = BroadcastPool::new();
        let rec = ResourceRecord {
            loc: TileLoc::shim(3),
            module: Module::Pl,
            rsc_id: 7,
        };
        pool.reserve(rec).unwrap();
        assert_eq!(pool.reserve(rec).unwrap_err().kind(), ErrorKind::ResourceExhausted);
    }
}
