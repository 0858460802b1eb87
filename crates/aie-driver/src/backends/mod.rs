//! Register backend implementations
//!
//! Two backends available:
//! - **Mmap**: Memory-mapped register window (UIO node or `/dev/mem`)
//! - **Simulated**: Register-level model of a partition (CI, no hardware)

pub mod mmap;
pub mod simulated;

pub use mmap::{MmapBackend, MmapRegion};
pub use simulated::SimulatedArray;
