//! Register access abstraction
//!
//! Everything the driver does to hardware goes through [`RegisterIo`]:
//! 32-bit reads and writes, masked writes, and masked polls. Addresses are
//! absolute (partition base + tile offset + register offset).

use crate::backends::{MmapBackend, SimulatedArray};
use crate::config::DeviceConfig;
use crate::error::{AieError, Result};
use crate::poll;
use std::fmt::Debug;

/// Register access backend
///
/// All methods take `&mut self`: on AI Engine hardware a read can have side
/// effects (lock requests are issued by reading the request window), so even
/// reads need exclusive access to the device.
pub trait RegisterIo: Debug + Send {
    /// Read a 32-bit register
    ///
    /// # Errors
    ///
    /// Returns `HardwareAccessFailed` if the transaction fails.
    fn read32(&mut self, address: u64) -> Result<u32>;

    /// Write a 32-bit register
    ///
    /// # Errors
    ///
    /// Returns `HardwareAccessFailed` if the transaction fails.
    fn write32(&mut self, address: u64, value: u32) -> Result<()>;

    /// Replace the bits selected by `mask` with those of `value`
    ///
    /// Default implementation is a read-modify-write.
    ///
    /// # Errors
    ///
    /// Returns `HardwareAccessFailed` if either transaction fails.
    fn mask_write32(&mut self, address: u64, mask: u32, value: u32) -> Result<()> {
        let current = self.read32(address)?;
        self.write32(address, (current & !mask) | (value & mask))
    }

    /// Poll until `read32(address) & mask == expected`
    ///
    /// `timeout_us == 0` reads exactly once. Returns `Ok(false)` if the
    /// pattern was not observed before the timeout.
    ///
    /// Default implementation busy-waits via [`poll::retry_until`]; a backend
    /// with interrupt support may override it.
    ///
    /// # Errors
    ///
    /// Returns `HardwareAccessFailed` if a read fails.
    fn mask_poll(&mut self, address: u64, mask: u32, expected: u32, timeout_us: u32) -> Result<bool> {
        poll::retry_until(timeout_us, || Ok((self.read32(address)? & mask) == expected))
    }

    /// Get backend type for debugging
    fn backend_type(&self) -> BackendType;
}

impl<T: RegisterIo + ?Sized> RegisterIo for Box<T> {
    fn read32(&mut self, address: u64) -> Result<u32> {
        (**self).read32(address)
    }

    fn write32(&mut self, address: u64, value: u32) -> Result<()> {
        (**self).write32(address, value)
    }

    fn mask_write32(&mut self, address: u64, mask: u32, value: u32) -> Result<()> {
        (**self).mask_write32(address, mask, value)
    }

    fn mask_poll(&mut self, address: u64, mask: u32, expected: u32, timeout_us: u32) -> Result<bool> {
        (**self).mask_poll(address, mask, expected, timeout_us)
    }

    fn backend_type(&self) -> BackendType {
        (**self).backend_type()
    }
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Memory-mapped register window (UIO, `/dev/mem`, or any mappable file)
    Mmap,

    /// Register-level software model of the array, no hardware required
    Simulated,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mmap => write!(f, "Mmap"),
            Self::Simulated => write!(f, "Simulated"),
        }
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelection {
    /// Software model of the configured partition
    #[default]
    Simulated,

    /// Map the configured device file
    Mmap,
}

impl std::str::FromStr for BackendSelection {
    type Err = AieError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sim" | "simulated" | "software" => Ok(Self::Simulated),
            "mmap" | "uio" => Ok(Self::Mmap),
            other => Err(AieError::invalid_argument(format!(
                "unknown backend '{other}' (expected simulated or mmap)"
            ))),
        }
    }
}

/// Build the backend described by `config`
///
/// # Errors
///
/// Returns `InvalidArgument` if the mmap backend is selected without a
/// device path, or the backend's own error if it cannot be opened.
pub fn select_backend(config: &DeviceConfig) -> Result<Box<dyn RegisterIo>> {
    match config.backend {
        BackendSelection::Simulated => {
            tracing::info!(
                "Using simulated {} array ({} columns x {} rows)",
                config.partition.generation,
                config.partition.num_cols,
                config.partition.num_rows
            );
            Ok(Box::new(SimulatedArray::new(config.partition, config.base_address)))
        }

        BackendSelection::Mmap => {
            let path = config.device_path.as_deref().ok_or_else(|| {
                AieError::invalid_argument("mmap backend requires a device path (AIE_DEVICE_PATH)")
            })?;
            let size = config.map_size.unwrap_or_else(|| config.partition_extent());
            tracing::info!("Using mmap backend on {}", path.display());
            MmapBackend::open(path, config.base_address, size).map(|b| Box::new(b) as Box<dyn RegisterIo>)
        }
    }
}
