//! Per-generation device property tables.
//!
//! For every tile type a generation supports, the table lists the modules
//! that carry a timer (in access order) and the lock module, if any. A
//! (tile type, module) pair missing from the table is not applicable and
//! must be rejected before any register access.

use crate::events::{EventTable, CORE_TABLE, MEMORY_TABLE, MEM_TILE_TABLE, PL_TABLE};
use crate::partition::{AddressLayout, Generation};
use crate::regs::{aie, aieml, EventRegs, LockRegs, TimerRegs};
use crate::tile::{Module, TileType};

/// Registers and event table of one module.
#[derive(Debug, Clone, Copy)]
pub struct ModuleProps {
    /// Which module this is.
    pub module: Module,
    /// Timer block.
    pub timer: TimerRegs,
    /// Event generate/broadcast block.
    pub events: EventRegs,
    /// Abstract-to-hardware event translation.
    pub event_table: &'static EventTable,
}

/// Modules and locks of one tile type.
#[derive(Debug, Clone, Copy)]
pub struct TileProps {
    /// Tile type described.
    pub tile_type: TileType,
    /// Timer-bearing modules, in access order.
    pub modules: &'static [ModuleProps],
    /// Lock module, when the tile has one.
    pub locks: Option<LockRegs>,
}

/// Complete property table of a generation.
#[derive(Debug)]
pub struct DeviceProps {
    /// Generation described.
    pub generation: Generation,
    /// Tile address layout.
    pub layout: AddressLayout,
    /// Supported tile types.
    pub tiles: &'static [TileProps],
}

impl DeviceProps {
    /// Property table for `generation`.
    #[must_use]
    pub fn for_generation(generation: Generation) -> &'static Self {
        match generation {
            Generation::Aie => &AIE_PROPS,
            Generation::AieMl => &AIEML_PROPS,
        }
    }

    /// Properties of `tile_type`, if the generation has it.
    #[must_use]
    pub fn tile(&self, tile_type: TileType) -> Option<&'static TileProps> {
        self.tiles.iter().find(|t| t.tile_type == tile_type)
    }

    /// Properties of `module` within `tile_type`, if applicable.
    #[must_use]
    pub fn module(&self, tile_type: TileType, module: Module) -> Option<&'static ModuleProps> {
        self.tile(tile_type)?.modules.iter().find(|m| m.module == module)
    }

    /// Number of timer-bearing modules in `tile_type` (0 when unsupported).
    #[must_use]
    pub fn num_modules(&self, tile_type: TileType) -> usize {
        self.tile(tile_type).map_or(0, |t| t.modules.len())
    }
}

// ── AIE-ML ───────────────────────────────────────────────────────────────────

static AIEML_AIE_MODULES: [ModuleProps; 2] = [
    ModuleProps {
        module: Module::Memory,
        timer: aieml::MEM_TIMER,
        events: aieml::MEM_EVENTS,
        event_table: &MEMORY_TABLE,
    },
    ModuleProps {
        module: Module::Core,
        timer: aieml::CORE_TIMER,
        events: aieml::CORE_EVENTS,
        event_table: &CORE_TABLE,
    },
];

static AIEML_SHIM_MODULES: [ModuleProps; 1] = [ModuleProps {
    module: Module::Pl,
    timer: aieml::PL_TIMER,
    events: aieml::PL_EVENTS,
    event_table: &PL_TABLE,
}];

static AIEML_MEM_TILE_MODULES: [ModuleProps; 1] = [ModuleProps {
    module: Module::Memory,
    timer: aieml::MEM_TILE_TIMER,
    events: aieml::MEM_TILE_EVENTS,
    event_table: &MEM_TILE_TABLE,
}];

static AIEML_TILES: [TileProps; 4] = [
    TileProps {
        tile_type: TileType::Aie,
        modules: &AIEML_AIE_MODULES,
        locks: Some(aieml::AIE_LOCKS),
    },
    TileProps {
        tile_type: TileType::ShimPl,
        modules: &AIEML_SHIM_MODULES,
        locks: Some(aieml::SHIM_LOCKS),
    },
    TileProps {
        tile_type: TileType::ShimNoc,
        modules: &AIEML_SHIM_MODULES,
        locks: Some(aieml::SHIM_LOCKS),
    },
    TileProps {
        tile_type: TileType::MemTile,
        modules: &AIEML_MEM_TILE_MODULES,
        locks: Some(aieml::MEM_TILE_LOCKS),
    },
];

/// AIE-ML property table.
pub static AIEML_PROPS: DeviceProps = DeviceProps {
    generation: Generation::AieMl,
    layout: Generation::AieMl.layout(),
    tiles: &AIEML_TILES,
};

// ── AIE ──────────────────────────────────────────────────────────────────────

static AIE_AIE_MODULES: [ModuleProps; 2] = [
    ModuleProps {
        module: Module::Memory,
        timer: aie::MEM_TIMER,
        events: aie::MEM_EVENTS,
        event_table: &MEMORY_TABLE,
    },
    ModuleProps {
        module: Module::Core,
        timer: aie::CORE_TIMER,
        events: aie::CORE_EVENTS,
        event_table: &CORE_TABLE,
    },
];

static AIE_SHIM_MODULES: [ModuleProps; 1] = [ModuleProps {
    module: Module::Pl,
    timer: aie::PL_TIMER,
    events: aie::PL_EVENTS,
    event_table: &PL_TABLE,
}];

static AIE_TILES: [TileProps; 3] = [
    TileProps {
        tile_type: TileType::Aie,
        modules: &AIE_AIE_MODULES,
        locks: Some(aie::AIE_LOCKS),
    },
    TileProps {
        tile_type: TileType::ShimPl,
        modules: &AIE_SHIM_MODULES,
        locks: None,
    },
    TileProps {
        tile_type: TileType::ShimNoc,
        modules: &AIE_SHIM_MODULES,
        locks: Some(aie::SHIM_LOCKS),
    },
];

/// AIE property table.
pub static AIE_PROPS: DeviceProps = DeviceProps {
    generation: Generation::Aie,
    layout: Generation::Aie.layout(),
    tiles: &AIE_TILES,
};
