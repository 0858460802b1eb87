//! Device context
//!
//! A [`DeviceContext`] owns everything the driver needs for one partition:
//! the register backend, the geometry, the generation's property tables, the
//! lock engine and the broadcast-channel pool. It is the single owner of
//! mutable driver state; operations that change it take `&mut self`, so
//! concurrent use needs an external lock around the whole context.

use crate::backend::{select_backend, RegisterIo};
use crate::config::DeviceConfig;
use crate::error::{AieError, Result};
use crate::locks::{self, LockEngine};
use crate::resource::BroadcastPool;
use aie_chip::{DeviceProps, Generation, Module, ModuleProps, Partition, TileLoc, TileProps, TileType};

/// Open partition
#[derive(Debug)]
pub struct DeviceContext<B: RegisterIo = Box<dyn RegisterIo>> {
    pub(crate) io: B,
    partition: Partition,
    base_address: u64,
    props: &'static DeviceProps,
    locks: &'static dyn LockEngine,
    pub(crate) broadcast: BroadcastPool,
}

impl DeviceContext {
    /// Build the configured backend and open a context on it
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be opened or the partition is
    /// malformed.
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        let io = select_backend(config)?;
        Ok(Self::new(config.partition, io)?.with_base_address(config.base_address))
    }
}

impl<B: RegisterIo> DeviceContext<B> {
    /// Open a context on `io`, with tile (0, 0) at address 0
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the geometry cannot exist on the
    /// partition's generation.
    pub fn new(partition: Partition, io: B) -> Result<Self> {
        validate(&partition)?;
        let props = DeviceProps::for_generation(partition.generation);

        tracing::info!(
            "Opened {} partition: {} columns x {} rows, {} mem-tile rows ({} backend)",
            partition.generation,
            partition.num_cols,
            partition.num_rows,
            partition.mem_tile_rows,
            io.backend_type()
        );

        Ok(Self {
            io,
            partition,
            base_address: 0,
            props,
            locks: locks::engine_for(partition.generation),
            broadcast: BroadcastPool::new(),
        })
    }

    /// Place tile (0, 0) at `base_address`
    #[must_use]
    pub fn with_base_address(mut self, base_address: u64) -> Self {
        self.base_address = base_address;
        self
    }

    /// Partition geometry
    pub const fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Hardware generation
    pub const fn generation(&self) -> Generation {
        self.partition.generation
    }

    /// Address of tile (0, 0)
    pub const fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Generation property tables
    pub const fn props(&self) -> &'static DeviceProps {
        self.props
    }

    /// Lock engine selected for the generation
    pub fn lock_engine(&self) -> &'static dyn LockEngine {
        self.locks
    }

    /// Broadcast-channel reservations
    pub const fn broadcast_pool(&self) -> &BroadcastPool {
        &self.broadcast
    }

    /// Register backend
    pub const fn backend(&self) -> &B {
        &self.io
    }

    /// Register backend, mutably (for raw access and test inspection)
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.io
    }

    /// Tile type at `loc`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` outside the partition.
    pub fn tile_type(&self, loc: TileLoc) -> Result<TileType> {
        self.partition
            .tile_type(loc)
            .ok_or_else(|| AieError::invalid_tile(loc, "outside the partition"))
    }

    /// Property table of the tile at `loc`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` outside the partition or if the generation has
    /// no such tile type.
    pub fn tile_props(&self, loc: TileLoc) -> Result<&'static TileProps> {
        let tile_type = self.tile_type(loc)?;
        self.props
            .tile(tile_type)
            .ok_or_else(|| AieError::invalid_tile(loc, format!("{tile_type} tiles not supported on {}", self.generation())))
    }

    /// Registers of `module` at `loc`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTile` if the tile has no such module.
    pub fn module_props(&self, loc: TileLoc, module: Module) -> Result<&'static ModuleProps> {
        self.tile_props(loc)?
            .modules
            .iter()
            .find(|m| m.module == module)
            .ok_or_else(|| AieError::invalid_tile(loc, format!("no {module} module on this tile")))
    }

    /// Absolute address of the register window of `loc`
    pub fn tile_address(&self, loc: TileLoc) -> u64 {
        self.base_address + self.props.layout.tile_offset(loc)
    }

    /// Every timer-bearing (tile, module) pair, column-major
    pub fn timer_targets(&self) -> Vec<(TileLoc, Module)> {
        self.partition
            .locations()
            .filter_map(|loc| Some((loc, self.props.tile(self.partition.tile_type(loc)?)?)))
            .flat_map(|(loc, tile)| tile.modules.iter().map(move |m| (loc, m.module)))
            .collect()
    }

    /// Number of timer targets, from the geometry alone
    ///
    /// Sums modules x rows x columns per tile type. The NoC shim type is
    /// skipped: both shim variants report the single shim row, so counting
    /// both would count that row twice.
    pub fn timer_target_count(&self) -> usize {
        TileType::ALL
            .iter()
            .filter(|&&tt| tt != TileType::ShimNoc)
            .map(|&tt| {
                self.props.num_modules(tt)
                    * usize::from(self.partition.rows_of(tt))
                    * usize::from(self.partition.num_cols)
            })
            .sum()
    }
}

fn validate(partition: &Partition) -> Result<()> {
    let layout = partition.generation.layout();
    let max_rows = 1u32 << (layout.col_shift - layout.row_shift);

    if partition.num_cols == 0 || partition.num_cols > 128 {
        return Err(AieError::invalid_argument(format!(
            "{} columns (expected 1..=128)",
            partition.num_cols
        )));
    }
    if partition.num_rows == 0 || u32::from(partition.num_rows) > max_rows {
        return Err(AieError::invalid_argument(format!(
            "{} rows (expected 1..={max_rows})",
            partition.num_rows
        )));
    }
    if partition.mem_tile_rows >= partition.num_rows {
        return Err(AieError::invalid_argument("memory tiles leave no room for the shim row"));
    }
    if partition.mem_tile_rows > 0 && partition.generation == Generation::Aie {
        return Err(AieError::invalid_argument("AIE partitions have no memory tiles"));
    }
    Ok(())
}
