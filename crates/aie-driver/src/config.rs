//! Device configuration
//!
//! `DeviceConfig::default()` is an NPU1-like AIE-ML partition on the
//! simulated backend. Environment overrides:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `AIE_PRESET` | `npu1`, `ve2802` or `vc1902` partition |
//! | `AIE_GENERATION` | `aie` or `aieml` (overrides the preset's) |
//! | `AIE_BASE_ADDRESS` | address of tile (0, 0), hex (`0x…`) or decimal |
//! | `AIE_DEVICE_PATH` | register window to map; selects the mmap backend |
//! | `AIE_BACKEND` | `simulated` or `mmap` |

use crate::backend::BackendSelection;
use crate::error::{AieError, Result};
use aie_chip::{Generation, Partition, TileLoc};
use std::path::PathBuf;

/// Everything needed to open a device context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Partition geometry and generation
    pub partition: Partition,
    /// Address of tile (0, 0)
    pub base_address: u64,
    /// Backend to build
    pub backend: BackendSelection,
    /// Register window for the mmap backend
    pub device_path: Option<PathBuf>,
    /// Bytes to map; defaults to the partition's extent
    pub map_size: Option<usize>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            partition: Partition::npu1(),
            base_address: 0,
            backend: BackendSelection::Simulated,
            device_path: None,
            map_size: None,
        }
    }
}

impl DeviceConfig {
    /// Use `partition`
    #[must_use]
    pub const fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    /// Use `generation`, keeping the geometry
    #[must_use]
    pub const fn with_generation(mut self, generation: Generation) -> Self {
        self.partition.generation = generation;
        self
    }

    /// Place tile (0, 0) at `base_address`
    #[must_use]
    pub const fn with_base_address(mut self, base_address: u64) -> Self {
        self.base_address = base_address;
        self
    }

    /// Select a backend
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendSelection) -> Self {
        self.backend = backend;
        self
    }

    /// Map `path` (and select the mmap backend)
    #[must_use]
    pub fn with_device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_path = Some(path.into());
        self.backend = BackendSelection::Mmap;
        self
    }

    /// Map exactly `size` bytes
    #[must_use]
    pub const fn with_map_size(mut self, size: usize) -> Self {
        self.map_size = Some(size);
        self
    }

    /// Default configuration with overrides from the process environment
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a variable holds an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `var`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a variable holds an unparsable value.
    pub fn with_overrides<F>(mut self, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = var("AIE_PRESET") {
            self.partition = Partition::preset(&name)
                .ok_or_else(|| AieError::invalid_argument(format!("AIE_PRESET: unknown preset '{name}'")))?;
        }
        if let Some(generation) = var("AIE_GENERATION") {
            self.partition.generation = generation
                .parse()
                .map_err(|e: String| AieError::invalid_argument(format!("AIE_GENERATION: {e}")))?;
        }
        if let Some(address) = var("AIE_BASE_ADDRESS") {
            self.base_address = parse_address(&address)?;
        }
        if let Some(path) = var("AIE_DEVICE_PATH") {
            self = self.with_device_path(path);
        }
        if let Some(backend) = var("AIE_BACKEND") {
            self.backend = backend.parse()?;
        }
        tracing::debug!("Device config: {self:?}");
        Ok(self)
    }

    /// Bytes spanned by the partition's register windows
    #[must_use]
    pub fn partition_extent(&self) -> usize {
        let layout = self.partition.generation.layout();
        let end = layout.tile_offset(TileLoc::new(self.partition.num_cols, 0));
        usize::try_from(end).unwrap_or(usize::MAX)
    }
}

/// Parse `0x`-prefixed hex or decimal
///
/// # Errors
///
/// Returns `InvalidArgument` if `text` is neither.
pub fn parse_address(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|e| AieError::invalid_argument(format!("bad address '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> Result<DeviceConfig> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        DeviceConfig::default().with_overrides(|key| env.get(key).cloned())
    }

    #[test]
    fn default_is_simulated_npu1() {
        let config = DeviceConfig::default();
        assert_eq!(config.partition, Partition::npu1());
        assert_eq!(config.backend, BackendSelection::Simulated);
        assert!(config.device_path.is_none());
    }

    #[test]
    fn env_overrides_apply_in_order() {
        let config = overrides(&[
            ("AIE_PRESET", "vc1902"),
            ("AIE_GENERATION", "aieml"),
            ("AIE_BASE_ADDRESS", "0x2000_0000"),
        ])
        .unwrap();
        assert_eq!(config.partition.num_cols, 50);
        assert_eq!(config.partition.generation, Generation::AieMl);
        assert_eq!(config.base_address, 0x2000_0000);
    }

    #[test]
    fn device_path_selects_mmap() {
        let config = overrides(&[("AIE_DEVICE_PATH", "/dev/uio0")]).unwrap();
        assert_eq!(config.backend, BackendSelection::Mmap);
        assert_eq!(config.device_path, Some(PathBuf::from("/dev/uio0")));

        let config = overrides(&[("AIE_DEVICE_PATH", "/dev/uio0"), ("AIE_BACKEND", "simulated")]).unwrap();
        assert_eq!(config.backend, BackendSelection::Simulated);
    }

    #[test]
    fn bad_values_are_rejected() {
        for pair in [
            ("AIE_PRESET", "npu9"),
            ("AIE_GENERATION", "aie3"),
            ("AIE_BASE_ADDRESS", "0xZZ"),
            ("AIE_BACKEND", "kernel"),
        ] {
            let err = overrides(&[pair]).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument, "{pair:?}");
        }
    }

    #[test]
    fn address_forms() {
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert_eq!(parse_address("0X1000").unwrap(), 0x1000);
        assert!(parse_address("").is_err());
    }

    #[test]
    fn extent_covers_all_columns() {
        let config = DeviceConfig::default();
        assert_eq!(config.partition_extent(), 5 << 25);
    }
}
