//! Error types for AI Engine driver operations

use aie_chip::{Event, Module, TileLoc};
use thiserror::Error;

/// Result type alias for AI Engine operations
pub type Result<T> = std::result::Result<T, AieError>;

/// Errors that can occur during AI Engine operations
#[derive(Debug, Error)]
pub enum AieError {
    /// Null/out-of-range input, bad enable flag, or event outside a module's range
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Reason for rejection
        reason: String,
    },

    /// Location resolves to an unsupported tile type or module
    #[error("Invalid tile {loc}: {reason}")]
    InvalidTile {
        /// Offending location
        loc: TileLoc,
        /// Reason for rejection
        reason: String,
    },

    /// Lock poll did not observe success within the timeout
    #[error("Lock {lock_id} at {loc} not granted within {timeout_us}us")]
    LockOperationFailed {
        /// Tile holding the lock
        loc: TileLoc,
        /// Lock index
        lock_id: u8,
        /// Timeout that was exhausted
        timeout_us: u32,
    },

    /// Allocator could not satisfy a request
    #[error("Resource exhausted: requested {requested}, {available} available")]
    ResourceExhausted {
        /// Number of resources requested
        requested: u32,
        /// Number of resources that were free
        available: u32,
    },

    /// An underlying register transaction failed
    #[error("Hardware access failed at {address:#x}: {reason}")]
    HardwareAccessFailed {
        /// Absolute register address
        address: u64,
        /// Reason for failure
        reason: String,
    },

    /// Abstract event has no hardware number in the target module
    #[error("{event} has no hardware mapping in the {module} module")]
    EventTranslationFailed {
        /// Event that failed to translate
        event: Event,
        /// Module it was translated for
        module: Module,
    },

    /// I/O error while opening a backend
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

/// Error category, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`AieError::InvalidArgument`]
    InvalidArgument,
    /// See [`AieError::InvalidTile`]
    InvalidTile,
    /// See [`AieError::LockOperationFailed`]
    LockOperationFailed,
    /// See [`AieError::ResourceExhausted`]
    ResourceExhausted,
    /// See [`AieError::HardwareAccessFailed`] and [`AieError::Io`]
    HardwareAccessFailed,
    /// See [`AieError::EventTranslationFailed`]
    EventTranslationFailed,
}

impl AieError {
    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an invalid tile error
    pub fn invalid_tile(loc: TileLoc, reason: impl Into<String>) -> Self {
        Self::InvalidTile {
            loc,
            reason: reason.into(),
        }
    }

    /// Create a hardware access error
    pub fn hardware_access_failed(address: u64, reason: impl Into<String>) -> Self {
        Self::HardwareAccessFailed {
            address,
            reason: reason.into(),
        }
    }

    /// Category of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::InvalidTile { .. } => ErrorKind::InvalidTile,
            Self::LockOperationFailed { .. } => ErrorKind::LockOperationFailed,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::HardwareAccessFailed { .. } | Self::Io { .. } => ErrorKind::HardwareAccessFailed,
            Self::EventTranslationFailed { .. } => ErrorKind::EventTranslationFailed,
        }
    }
}
