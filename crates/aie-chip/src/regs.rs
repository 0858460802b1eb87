//! Register maps for the lock, timer and event blocks of each tile type.
//!
//! All offsets are relative to the tile's register window.
//!
//! ## Timer block layout (same shape in every module)
//!
//! ```text
//! +0x000  Timer_Control            Reset[31], Reset_Event[14:8] (MemTile: [15:8])
//! +0x008  Event_Generate
//! +0x010  Event_Broadcast0..15     one word per channel
//! +0x0F0  Timer_Trig_Event_Low_Value
//! +0x0F4  Timer_Trig_Event_High_Value
//! +0x0F8  Timer_Low
//! +0x0FC  Timer_High
//! ```
//!
//! ## Lock request encoding
//!
//! AIE-ML issues a lock request by *reading* an address that encodes the
//! request: `base + id * stride + (acquire ? acq_off : 0) + (value & 0x7F) << 2`.
//! Bit 0 of the read data is the result (1 = success).

/// A bit field inside a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Position of the least significant bit.
    pub lsb: u8,
    /// Mask of the field, already shifted into place.
    pub mask: u32,
}

impl Field {
    /// Field of `width` bits starting at `lsb`.
    #[must_use]
    pub const fn new(lsb: u8, width: u8) -> Self {
        let ones = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
        Self {
            lsb,
            mask: ones << lsb,
        }
    }

    /// Place `value` into the field, discarding bits that don't fit.
    #[must_use]
    pub const fn set(self, value: u32) -> u32 {
        (value << self.lsb) & self.mask
    }

    /// Extract the field from a register value.
    #[must_use]
    pub const fn get(self, reg: u32) -> u32 {
        (reg & self.mask) >> self.lsb
    }

    /// Largest value the field can hold.
    #[must_use]
    pub const fn max_value(self) -> u32 {
        self.mask >> self.lsb
    }
}

/// Timer registers of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRegs {
    /// Timer control register.
    pub ctrl: u32,
    /// Timer-low trigger threshold.
    pub trig_low: u32,
    /// Timer-high trigger threshold.
    pub trig_high: u32,
    /// Low 32 bits of the counter.
    pub low: u32,
    /// High 32 bits of the counter.
    pub high: u32,
    /// One-shot reset enable in the control register.
    pub reset: Field,
    /// Event that resets the counter, in the control register.
    pub reset_event: Field,
}

impl TimerRegs {
    /// Timer block whose control register sits at `base`.
    #[must_use]
    pub const fn at(base: u32, reset_event_width: u8) -> Self {
        Self {
            ctrl: base,
            trig_low: base + 0xF0,
            trig_high: base + 0xF4,
            low: base + 0xF8,
            high: base + 0xFC,
            reset: Field::new(31, 1),
            reset_event: Field::new(8, reset_event_width),
        }
    }
}

/// Event generate and broadcast registers of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRegs {
    /// Writing an event number here raises it in the module.
    pub generate: u32,
    /// First broadcast register.
    pub broadcast_base: u32,
    /// Number of broadcast channels.
    pub num_broadcasts: u8,
}

impl EventRegs {
    /// Event block sharing the timer block's base.
    #[must_use]
    pub const fn at(base: u32) -> Self {
        Self {
            generate: base + 0x08,
            broadcast_base: base + 0x10,
            num_broadcasts: 16,
        }
    }

    /// Broadcast register for `channel`.
    #[must_use]
    pub const fn broadcast(&self, channel: u8) -> u32 {
        self.broadcast_base + channel as u32 * 4
    }

    /// Channel whose broadcast register is `reg`, if any.
    #[must_use]
    pub const fn channel_of(&self, reg: u32) -> Option<u8> {
        if reg < self.broadcast_base || (reg - self.broadcast_base) % 4 != 0 {
            return None;
        }
        let channel = (reg - self.broadcast_base) / 4;
        if channel < self.num_broadcasts as u32 {
            #[allow(clippy::cast_possible_truncation)]
            Some(channel as u8)
        } else {
            None
        }
    }
}

/// Lock module of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRegs {
    /// Start of the lock request window.
    pub request_base: u32,
    /// Distance between consecutive locks in the request window.
    pub lock_stride: u32,
    /// Added to the request address for acquires.
    pub acquire_offset: u32,
    /// Number of locks.
    pub num_locks: u8,
    /// Lock value registers, when the generation has them.
    pub value_base: Option<u32>,
    /// Distance between value registers.
    pub value_stride: u32,
}

impl LockRegs {
    /// Size of the request window in bytes.
    #[must_use]
    pub const fn request_window(&self) -> u32 {
        self.num_locks as u32 * self.lock_stride
    }

    /// Whether `reg` falls inside the request window.
    #[must_use]
    pub const fn is_request(&self, reg: u32) -> bool {
        reg >= self.request_base && reg < self.request_base + self.request_window()
    }

    /// Value register of `lock_id`, when present.
    #[must_use]
    pub const fn value_register(&self, lock_id: u8) -> Option<u32> {
        match self.value_base {
            Some(base) => Some(base + lock_id as u32 * self.value_stride),
            None => None,
        }
    }
}

/// AIE-ML register maps (AM025).
pub mod aieml {
    use super::{EventRegs, LockRegs, TimerRegs};

    /// Compute-tile core module timer block.
    pub const CORE_TIMER: TimerRegs = TimerRegs::at(0x34000, 7);
    /// Compute-tile core module event block.
    pub const CORE_EVENTS: EventRegs = EventRegs::at(0x34000);
    /// Compute-tile memory module timer block.
    pub const MEM_TIMER: TimerRegs = TimerRegs::at(0x14000, 7);
    /// Compute-tile memory module event block.
    pub const MEM_EVENTS: EventRegs = EventRegs::at(0x14000);
    /// Memory tile timer block; its reset-event field is 8 bits wide.
    pub const MEM_TILE_TIMER: TimerRegs = TimerRegs::at(0x94000, 8);
    /// Memory tile event block.
    pub const MEM_TILE_EVENTS: EventRegs = EventRegs::at(0x94000);
    /// Shim PL module timer block.
    pub const PL_TIMER: TimerRegs = TimerRegs::at(0x34000, 7);
    /// Shim PL module event block.
    pub const PL_EVENTS: EventRegs = EventRegs::at(0x34000);

    /// Compute-tile locks: Lock_Request @ 0x40000, Lock0_value @ 0x1F000.
    pub const AIE_LOCKS: LockRegs = LockRegs {
        request_base: 0x40000,
        lock_stride: 0x400,
        acquire_offset: 0x200,
        num_locks: 16,
        value_base: Some(0x1F000),
        value_stride: 0x10,
    };

    /// Memory-tile locks: Lock_Request @ 0xD0000, Lock0_value @ 0xC0000.
    pub const MEM_TILE_LOCKS: LockRegs = LockRegs {
        request_base: 0xD0000,
        lock_stride: 0x400,
        acquire_offset: 0x200,
        num_locks: 64,
        value_base: Some(0xC0000),
        value_stride: 0x10,
    };

    /// Shim locks: Lock_Request @ 0x10000, Lock0_value @ 0x14000.
    pub const SHIM_LOCKS: LockRegs = LockRegs {
        request_base: 0x10000,
        lock_stride: 0x400,
        acquire_offset: 0x200,
        num_locks: 16,
        value_base: Some(0x14000),
        value_stride: 0x10,
    };

    /// Width of the lock change value in the request address.
    pub const LOCK_VALUE_MASK: u32 = 0x7F;
    /// Position of the lock change value in the request address.
    pub const LOCK_VALUE_SHIFT: u32 = 2;
}

/// AIE register maps (AM015).
pub mod aie {
    use super::{EventRegs, LockRegs, TimerRegs};

    /// Core module timer block.
    pub const CORE_TIMER: TimerRegs = TimerRegs::at(0x34000, 7);
    /// Core module event block.
    pub const CORE_EVENTS: EventRegs = EventRegs::at(0x34000);
    /// Memory module timer block.
    pub const MEM_TIMER: TimerRegs = TimerRegs::at(0x14000, 7);
    /// Memory module event block.
    pub const MEM_EVENTS: EventRegs = EventRegs::at(0x14000);
    /// Shim PL module timer block.
    pub const PL_TIMER: TimerRegs = TimerRegs::at(0x34000, 7);
    /// Shim PL module event block.
    pub const PL_EVENTS: EventRegs = EventRegs::at(0x34000);

    /// Compute-tile locks.
    ///
    /// Each lock owns 0x80 bytes: release at +0x00, acquire at +0x40,
    /// with "no value" at +0x00, value 0 at +0x20 and value 1 at +0x30.
    pub const AIE_LOCKS: LockRegs = LockRegs {
        request_base: 0x1E000,
        lock_stride: 0x80,
        acquire_offset: 0x40,
        num_locks: 16,
        value_base: None,
        value_stride: 0,
    };

    /// NoC shim locks, same encoding as compute tiles.
    pub const SHIM_LOCKS: LockRegs = LockRegs {
        request_base: 0x14000,
        lock_stride: 0x80,
        acquire_offset: 0x40,
        num_locks: 16,
        value_base: None,
        value_stride: 0,
    };

    /// Offset of the "with value 0" request within a lock's window.
    pub const LOCK_VALUE0_OFFSET: u32 = 0x20;
    /// Offset of the "with value 1" request within a lock's window.
    pub const LOCK_VALUE1_OFFSET: u32 = 0x30;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_round_trip() {
        let f = Field::new(8, 7);
        assert_eq!(f.mask, 0x7F00);
        assert_eq!(f.set(0x6B), 0x6B00);
        assert_eq!(f.get(0xFFFF_6B00), 0x6B);
        assert_eq!(f.set(0xFF), 0x7F00);
        assert_eq!(f.max_value(), 0x7F);
    }

    #[test]
    fn reset_enable_is_top_bit() {
        assert_eq!(aieml::CORE_TIMER.reset.mask, 0x8000_0000);
        assert_eq!(aieml::CORE_TIMER.reset.set(1), 0x8000_0000);
    }

    #[test]
    fn timer_block_layout() {
        let t = aieml::CORE_TIMER;
        assert_eq!(t.ctrl, 0x34000);
        assert_eq!(t.trig_low, 0x340F0);
        assert_eq!(t.trig_high, 0x340F4);
        assert_eq!(t.low, 0x340F8);
        assert_eq!(t.high, 0x340FC);
        assert_eq!(aieml::MEM_TILE_TIMER.reset_event.mask, 0xFF00);
    }

    #[test]
    fn broadcast_registers() {
        let e = aieml::MEM_EVENTS;
        assert_eq!(e.generate, 0x14008);
        assert_eq!(e.broadcast(0), 0x14010);
        assert_eq!(e.broadcast(15), 0x1404C);
        assert_eq!(e.channel_of(0x14018), Some(2));
        assert_eq!(e.channel_of(0x14050), None);
        assert_eq!(e.channel_of(0x14011), None);
        assert_eq!(e.channel_of(0x14008), None);
    }

    #[test]
    fn lock_windows() {
        let l = aieml::AIE_LOCKS;
        assert_eq!(l.request_window(), 0x4000);
        assert!(l.is_request(0x40000));
        assert!(l.is_request(0x43FFC));
        assert!(!l.is_request(0x44000));
        assert_eq!(l.value_register(1), Some(0x1F010));
        assert_eq!(aie::AIE_LOCKS.value_register(1), None);
    }

    #[test]
    fn lock_windows_do_not_overlap_timer_blocks() {
        let l = aieml::SHIM_LOCKS;
        assert!(!l.is_request(aieml::PL_TIMER.ctrl));
        let m = aieml::MEM_TILE_LOCKS;
        assert!(!m.is_request(aieml::MEM_TILE_TIMER.ctrl));
    }
}
