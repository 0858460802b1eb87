//! Tile coordinates and the tile/module taxonomy.
//!
//! ```text
//!  row N   ┌──────┐┌──────┐┌──────┐
//!   ...    │ AIE  ││ AIE  ││ AIE  │   core + memory modules
//!  row 2   └──────┘└──────┘└──────┘
//!  row 1   [ MEM  ][ MEM  ][ MEM  ]   memory module (AIE-ML only)
//!  row 0   [ SHIM ][ SHIM ][ SHIM ]   PL module (NoC or PL variant)
//!           col 0   col 1   col 2
//! ```

use std::fmt;

/// Zero-based (column, row) coordinate of a tile within a partition.
///
/// Row 0 is always the shim (boundary) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TileLoc {
    /// Column index.
    pub col: u8,
    /// Row index.
    pub row: u8,
}

impl TileLoc {
    /// Create a tile location.
    #[must_use]
    pub const fn new(col: u8, row: u8) -> Self {
        Self { col, row }
    }

    /// Shim tile at the bottom of `col`.
    #[must_use]
    pub const fn shim(col: u8) -> Self {
        Self { col, row: 0 }
    }

    /// Whether this location is in the shim row.
    #[must_use]
    pub const fn is_shim(&self) -> bool {
        self.row == 0
    }
}

impl fmt::Display for TileLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Kind of tile at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileType {
    /// Compute tile: core module plus memory module.
    Aie,
    /// Shim tile with a PL interface.
    ShimPl,
    /// Shim tile with a NoC interface.
    ShimNoc,
    /// Memory tile (AIE-ML).
    MemTile,
}

impl TileType {
    /// All tile types, in table order.
    pub const ALL: [Self; 4] = [Self::Aie, Self::ShimPl, Self::ShimNoc, Self::MemTile];

    /// Whether this is one of the shim variants.
    #[must_use]
    pub const fn is_shim(self) -> bool {
        matches!(self, Self::ShimPl | Self::ShimNoc)
    }
}

impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aie => write!(f, "AIE"),
            Self::ShimPl => write!(f, "Shim-PL"),
            Self::ShimNoc => write!(f, "Shim-NoC"),
            Self::MemTile => write!(f, "MemTile"),
        }
    }
}

/// Functional block within a tile that owns a register window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Module {
    /// Core module (compute tiles).
    Core,
    /// Memory module (compute tiles and memory tiles).
    Memory,
    /// PL/NoC interface module (shim tiles).
    Pl,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Memory => write!(f, "memory"),
            Self::Pl => write!(f, "pl"),
        }
    }
}

impl std::str::FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(Self::Core),
            "mem" | "memory" => Ok(Self::Memory),
            "pl" | "shim" => Ok(Self::Pl),
            other => Err(format!("unknown module '{other}' (expected core, memory or pl)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shim_location() {
        let loc = TileLoc::shim(3);
        assert!(loc.is_shim());
        assert_eq!(loc, TileLoc::new(3, 0));
        assert!(!TileLoc::new(3, 2).is_shim());
    }

    #[test]
    fn module_parsing() {
        assert_eq!("core".parse::<Module>(), Ok(Module::Core));
        assert_eq!("MEM".parse::<Module>(), Ok(Module::Memory));
        assert_eq!("shim".parse::<Module>(), Ok(Module::Pl));
        assert!("dma".parse::<Module>().is_err());
    }

    #[test]
    fn display_forms() {
        assert_eq!(TileLoc::new(1, 2).to_string(), "(1, 2)");
        assert_eq!(TileType::ShimNoc.to_string(), "Shim-NoC");
    }
}
