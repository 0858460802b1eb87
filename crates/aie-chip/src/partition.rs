//! Hardware generations, tile address layout and partition geometry.
//!
//! A tile's register window sits at
//! `base + (col << col_shift) + (row << row_shift)`; the low `row_shift`
//! bits address registers inside the tile.
//!
//! ## Presets
//!
//! | Preset | Generation | Columns | Rows | Mem-tile rows |
//! |--------|------------|---------|------|---------------|
//! | [`Partition::npu1`] | AIE-ML | 5 | 6 | 1 |
//! | [`Partition::ve2802`] | AIE-ML | 38 | 11 | 2 |
//! | [`Partition::vc1902`] | AIE | 50 | 9 | 0 |

use crate::tile::{TileLoc, TileType};
use std::fmt;

/// AI Engine hardware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// First generation (Versal AI Core).
    Aie,
    /// Second generation (Versal AI Edge, Ryzen AI NPU).
    AieMl,
}

impl Generation {
    /// Address layout used by this generation.
    #[must_use]
    pub const fn layout(self) -> AddressLayout {
        match self {
            Self::Aie => AddressLayout {
                col_shift: 23,
                row_shift: 18,
            },
            Self::AieMl => AddressLayout {
                col_shift: 25,
                row_shift: 20,
            },
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aie => write!(f, "AIE"),
            Self::AieMl => write!(f, "AIE-ML"),
        }
    }
}

impl std::str::FromStr for Generation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "aie" | "aie1" => Ok(Self::Aie),
            "aieml" | "aie2" => Ok(Self::AieMl),
            other => Err(format!("unknown generation '{other}' (expected aie or aieml)")),
        }
    }
}

/// Bit positions of the column and row fields in a tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLayout {
    /// Shift of the column field.
    pub col_shift: u8,
    /// Shift of the row field; also the width of the in-tile offset.
    pub row_shift: u8,
}

impl AddressLayout {
    /// Offset of a tile's register window relative to the partition base.
    #[must_use]
    pub const fn tile_offset(&self, loc: TileLoc) -> u64 {
        ((loc.col as u64) << self.col_shift) | ((loc.row as u64) << self.row_shift)
    }

    /// Split a partition-relative offset into tile location and in-tile register.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(&self, offset: u64) -> (TileLoc, u32) {
        let row_bits = self.col_shift - self.row_shift;
        let col = (offset >> self.col_shift) & 0x7F;
        let row = (offset >> self.row_shift) & ((1 << row_bits) - 1);
        let reg = offset & ((1 << self.row_shift) - 1);
        (TileLoc::new(col as u8, row as u8), reg as u32)
    }
}

/// Geometry of a device partition.
///
/// Row 0 is the shim row, followed by `mem_tile_rows` rows of memory tiles,
/// then compute tiles up to `num_rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// Hardware generation.
    pub generation: Generation,
    /// Number of columns.
    pub num_cols: u8,
    /// Total number of rows, shim row included.
    pub num_rows: u8,
    /// Memory-tile rows directly above the shim row.
    pub mem_tile_rows: u8,
    /// Bit `c` set means column `c` has a NoC shim; otherwise a PL shim.
    pub noc_columns: u64,
}

impl Partition {
    /// Create a partition with only PL shims.
    #[must_use]
    pub const fn new(generation: Generation, num_cols: u8, num_rows: u8, mem_tile_rows: u8) -> Self {
        Self {
            generation,
            num_cols,
            num_rows,
            mem_tile_rows,
            noc_columns: 0,
        }
    }

    /// Set which columns carry a NoC shim.
    #[must_use]
    pub const fn with_noc_columns(mut self, mask: u64) -> Self {
        self.noc_columns = mask;
        self
    }

    /// Ryzen AI NPU1 (Phoenix) array: 5 columns, 1 mem-tile row, 4 compute rows.
    #[must_use]
    pub const fn npu1() -> Self {
        Self::new(Generation::AieMl, 5, 6, 1).with_noc_columns(0b1_1110)
    }

    /// Versal AI Edge VE2802: 38 columns, 2 mem-tile rows, 8 compute rows.
    #[must_use]
    pub const fn ve2802() -> Self {
        Self::new(Generation::AieMl, 38, 11, 2).with_noc_columns(0x0CCC_CCCC_CC)
    }

    /// Versal AI Core VC1902: 50 columns of 8 compute rows.
    #[must_use]
    pub const fn vc1902() -> Self {
        Self::new(Generation::Aie, 50, 9, 0).with_noc_columns(0x0000_CC0C_0C0C_0CCC)
    }

    /// Look up a preset by name.
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "npu1" | "phoenix" => Some(Self::npu1()),
            "ve2802" => Some(Self::ve2802()),
            "vc1902" => Some(Self::vc1902()),
            _ => None,
        }
    }

    /// Whether `loc` falls inside the partition.
    #[must_use]
    pub const fn contains(&self, loc: TileLoc) -> bool {
        loc.col < self.num_cols && loc.row < self.num_rows
    }

    /// Shim variant of a column.
    #[must_use]
    pub const fn shim_type(&self, col: u8) -> TileType {
        if col < 64 && self.noc_columns & (1 << col) != 0 {
            TileType::ShimNoc
        } else {
            TileType::ShimPl
        }
    }

    /// Tile type at `loc`, or `None` outside the partition.
    #[must_use]
    pub const fn tile_type(&self, loc: TileLoc) -> Option<TileType> {
        if !self.contains(loc) {
            return None;
        }
        if loc.row == 0 {
            Some(self.shim_type(loc.col))
        } else if loc.row <= self.mem_tile_rows {
            Some(TileType::MemTile)
        } else {
            Some(TileType::Aie)
        }
    }

    /// Number of rows holding tiles of type `tile_type` in one column.
    ///
    /// Both shim variants report the single shim row.
    #[must_use]
    pub const fn rows_of(&self, tile_type: TileType) -> u8 {
        match tile_type {
            TileType::ShimPl | TileType::ShimNoc => 1,
            TileType::MemTile => self.mem_tile_rows,
            TileType::Aie => self.num_rows.saturating_sub(1 + self.mem_tile_rows),
        }
    }

    /// Total number of tiles.
    #[must_use]
    pub const fn num_tiles(&self) -> usize {
        self.num_cols as usize * self.num_rows as usize
    }

    /// Every tile location, column-major.
    pub fn locations(&self) -> impl Iterator<Item = TileLoc> + '_ {
        (0..self.num_cols).flat_map(move |col| (0..self.num_rows).map(move |row| TileLoc::new(col, row)))
    }
}
