//! Silicon model for AMD/Xilinx AI Engine arrays (AIE and AIE-ML).
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the array covering tile addressing, the tile/module taxonomy,
//! per-generation register maps, and the abstract event space with its
//! per-module translation tables.
//!
//! Register offsets follow the AM025 (AIE-ML) and AM015 (AIE) register
//! references.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`tile`] | `TileLoc`, `TileType`, `Module` |
//! | [`partition`] | Generation, address layout, partition geometry presets |
//! | [`regs`] | Lock, timer and event register maps per tile type |
//! | [`events`] | Abstract event identifiers and translation tables |
//! | [`props`] | Per-generation device property tables |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod events;
pub mod partition;
pub mod props;
pub mod regs;
pub mod tile;

pub use events::{Event, EventTable, TranslateError};
pub use partition::{AddressLayout, Generation, Partition};
pub use props::{DeviceProps, ModuleProps, TileProps};
pub use regs::{EventRegs, Field, LockRegs, TimerRegs};
pub use tile::{Module, TileLoc, TileType};
