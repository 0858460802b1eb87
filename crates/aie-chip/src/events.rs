//! Abstract event identifiers and their per-module hardware numbers.
//!
//! Every module kind owns a contiguous block of the abstract event space.
//! The same abstract slot (say `BROADCAST_3`) maps to a different hardware
//! number depending on the module that raises or observes it, so events are
//! always translated through the module's [`EventTable`] before they reach a
//! register.
//!
//! ```text
//! abstract space   0 ─── core ─── 63 │ 64 ── memory ── 127 │ 128 ── pl ── 191 │ 192 ── mem-tile ── 255
//! slot layout      NONE TRUE GROUP_0 TIMER_SYNC TIMER_VALUE_REACHED PERF_CNT_0..3
//!                  COMBO_EVENT_0..3 USER_EVENT_0..3 BROADCAST_0..15 EDGE_DETECTION_0..1
//! ```

use std::fmt;

/// Hardware number reserved for "no mapping".
pub const INVALID: u8 = 0xFF;

/// Number of slots used in each module's block.
const SLOTS: u16 = 35;

/// Slot of `BROADCAST_0` within a block.
const BROADCAST_SLOT: u16 = 17;

/// Abstract, module-qualified event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Event(u16);

impl Event {
    /// Wrap a raw abstract identifier.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw abstract identifier.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Event `n` slots after this one.
    #[must_use]
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0 + n)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

macro_rules! event_block {
    ($(#[$doc:meta])* $name:ident, $base:expr) => {
        $(#[$doc])*
        pub mod $name {
            use super::Event;

            const B: u16 = $base;

            /// No event; hardware number 0 in every module.
            pub const NONE: Event = Event(B);
            /// Always-true event.
            pub const TRUE: Event = Event(B + 1);
            /// Event group 0.
            pub const GROUP_0: Event = Event(B + 2);
            /// Timer synchronisation event.
            pub const TIMER_SYNC: Event = Event(B + 3);
            /// Timer reached its trigger value.
            pub const TIMER_VALUE_REACHED: Event = Event(B + 4);
            /// Performance counter 0 reached its threshold.
            pub const PERF_CNT_0: Event = Event(B + 5);
            /// Performance counter 1 reached its threshold.
            pub const PERF_CNT_1: Event = Event(B + 6);
            /// Performance counter 2 reached its threshold.
            pub const PERF_CNT_2: Event = Event(B + 7);
            /// Performance counter 3 reached its threshold.
            pub const PERF_CNT_3: Event = Event(B + 8);
            /// Combo event 0.
            pub const COMBO_EVENT_0: Event = Event(B + 9);
            /// Combo event 3.
            pub const COMBO_EVENT_3: Event = Event(B + 12);
            /// User event 0.
            pub const USER_EVENT_0: Event = Event(B + 13);
            /// User event 1.
            pub const USER_EVENT_1: Event = Event(B + 14);
            /// User event 2.
            pub const USER_EVENT_2: Event = Event(B + 15);
            /// User event 3.
            pub const USER_EVENT_3: Event = Event(B + 16);
            /// Broadcast channel 0; channel `n` is `BROADCAST_0.offset(n)`.
            pub const BROADCAST_0: Event = Event(B + super::BROADCAST_SLOT);
            /// Broadcast channel 15.
            pub const BROADCAST_15: Event = Event(B + super::BROADCAST_SLOT + 15);
            /// Edge detection event 0.
            pub const EDGE_DETECTION_0: Event = Event(B + 33);
            /// Last event of the block.
            pub const LAST: Event = Event(B + super::SLOTS - 1);
        }
    };
}

event_block!(
    /// Core module events.
    core,
    0
);
event_block!(
    /// Memory module events (compute tiles).
    memory,
    64
);
event_block!(
    /// Shim PL module events.
    pl,
    128
);
event_block!(
    /// Memory tile events.
    mem_tile,
    192
);

/// Why an abstract event could not be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateError {
    /// The event belongs to another module's block.
    OutOfRange,
    /// The event is in range but this module has no hardware number for it.
    Unmapped,
}

/// Translation table from a module's abstract events to hardware numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTable {
    /// First abstract event of the module.
    pub min: Event,
    /// Last abstract event of the module.
    pub max: Event,
    /// Hardware number per slot; [`INVALID`] where unmapped.
    pub numbers: &'static [u8],
    /// Abstract event of broadcast channel 0.
    pub broadcast_base: Event,
}

impl EventTable {
    /// Hardware number for `event`.
    ///
    /// # Errors
    ///
    /// [`TranslateError::OutOfRange`] when `event` lies outside `[min, max]`,
    /// [`TranslateError::Unmapped`] when the module has no number for it.
    pub fn translate(&self, event: Event) -> Result<u8, TranslateError> {
        if event < self.min || event > self.max {
            return Err(TranslateError::OutOfRange);
        }
        match self.numbers.get(usize::from(event.0 - self.min.0)) {
            Some(&n) if n != INVALID => Ok(n),
            Some(_) => Err(TranslateError::Unmapped),
            None => Err(TranslateError::OutOfRange),
        }
    }

    /// Abstract event carried by broadcast `channel` in this module.
    #[must_use]
    pub const fn broadcast_event(&self, channel: u8) -> Event {
        self.broadcast_base.offset(channel as u16)
    }

    /// Baseline event used to disarm a timer reset.
    #[must_use]
    pub const fn baseline(&self) -> Event {
        self.min
    }

    /// Whether `event` belongs to this module.
    #[must_use]
    pub fn contains(&self, event: Event) -> bool {
        event >= self.min && event <= self.max
    }
}

const X: u8 = INVALID;

/// Core module numbers.
static CORE_NUMBERS: [u8; SLOTS as usize] = [
    0, 1, 2, 3, 4, // NONE TRUE GROUP_0 TIMER_SYNC TIMER_VALUE_REACHED
    5, 6, 7, 8, // PERF_CNT_0..3
    9, 10, 11, 12, // COMBO_EVENT_0..3
    124, 125, 126, 127, // USER_EVENT_0..3
    107, 108, 109, 110, 111, 112, 113, 114, // BROADCAST_0..7
    115, 116, 117, 118, 119, 120, 121, 122, // BROADCAST_8..15
    13, 14, // EDGE_DETECTION_0..1
];

/// Memory module numbers; two performance counters only.
static MEMORY_NUMBERS: [u8; SLOTS as usize] = [
    0, 1, 2, 3, 4, //
    5, 6, X, X, //
    7, 8, 9, 10, //
    124, 125, 126, 127, //
    107, 108, 109, 110, 111, 112, 113, 114, //
    115, 116, 117, 118, 119, 120, 121, 122, //
    11, 12,
];

/// Shim PL module numbers; two user events, no combo 2/3.
static PL_NUMBERS: [u8; SLOTS as usize] = [
    0, 1, 2, 3, 4, //
    5, 6, X, X, //
    7, 8, X, X, //
    126, 127, X, X, //
    110, 111, 112, 113, 114, 115, 116, 117, //
    118, 119, 120, 121, 122, 123, 124, 125, //
    11, 12,
];

/// Memory tile numbers.
static MEM_TILE_NUMBERS: [u8; SLOTS as usize] = [
    0, 1, 2, 3, 4, //
    5, 6, 7, 8, //
    9, 10, 11, 12, //
    159, 160, 161, 162, //
    142, 143, 144, 145, 146, 147, 148, 149, //
    150, 151, 152, 153, 154, 155, 156, 157, //
    13, 14,
];

/// Core module translation table.
pub static CORE_TABLE: EventTable = EventTable {
    min: core::NONE,
    max: core::LAST,
    numbers: &CORE_NUMBERS,
    broadcast_base: core::BROADCAST_0,
};

/// Memory module translation table.
pub static MEMORY_TABLE: EventTable = EventTable {
    min: memory::NONE,
    max: memory::LAST,
    numbers: &MEMORY_NUMBERS,
    broadcast_base: memory::BROADCAST_0,
};

/// Shim PL module translation table.
pub static PL_TABLE: EventTable = EventTable {
    min: pl::NONE,
    max: pl::LAST,
    numbers: &PL_NUMBERS,
    broadcast_base: pl::BROADCAST_0,
};

/// Memory tile translation table.
pub static MEM_TILE_TABLE: EventTable = EventTable {
    min: mem_tile::NONE,
    max: mem_tile::LAST,
    numbers: &MEM_TILE_NUMBERS,
    broadcast_base: mem_tile::BROADCAST_0,
};
