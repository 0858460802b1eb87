//! Memory-mapped register window
//!
//! Maps a device file (a UIO node, `/dev/mem`, or any file that exposes the
//! partition's register space) and performs bounds-checked volatile 32-bit
//! accesses on it. All `unsafe` in the driver lives here.

use crate::backend::{BackendType, RegisterIo};
use crate::error::{AieError, Result};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Memory-mapped region of a device file
///
/// Provides safe, bounds-checked access to memory-mapped hardware.
#[derive(Debug)]
pub struct MmapRegion {
    ptr: NonNull<u8>,
    size: usize,
    _file: File,
    path: PathBuf,
}

impl MmapRegion {
    /// Map `size` bytes of `path`, starting at file offset 0
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the file cannot be opened read-write
    /// - `size` is 0, or a regular file is shorter than `size`
    /// - mmap fails
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        tracing::debug!("Mapping register window: {}", path.display());

        if size == 0 {
            return Err(AieError::invalid_argument("register window size is 0"));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;

        // Device nodes report a length of 0; only regular files can be checked.
        let metadata = file.metadata()?;
        if metadata.is_file() && metadata.len() < size as u64 {
            return Err(AieError::invalid_argument(format!(
                "{} is {} bytes, window needs {size}",
                path.display(),
                metadata.len()
            )));
        }

        // SAFETY: mmap is unsafe but all preconditions are validated:
        // - File descriptor is valid (just opened via OpenOptions)
        // - Size is non-zero (checked above)
        // - PROT_READ|PROT_WRITE for register access, MAP_SHARED so writes reach the device
        // - Offset is 0 (start of the window)
        // - The file is stored in the struct so the fd outlives the mapping
        // - The mapping is released in Drop
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                0,
            )
        }
        .map_err(|e| AieError::hardware_access_failed(0, format!("mmap failed: {e}")))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| AieError::hardware_access_failed(0, "mmap returned a null pointer"))?;

        tracing::info!("Mapped {} ({size:#x} bytes at {ptr:p})", path.display());

        Ok(Self {
            ptr,
            size,
            _file: file,
            path: path.to_path_buf(),
        })
    }

    fn check(&self, offset: usize) -> Result<()> {
        if offset % 4 != 0 {
            return Err(AieError::invalid_argument(format!(
                "unaligned register offset {offset:#x}"
            )));
        }
        if offset.checked_add(4).map_or(true, |end| end > self.size) {
            return Err(AieError::invalid_argument(format!(
                "offset {offset:#x} outside window of {:#x} bytes",
                self.size
            )));
        }
        Ok(())
    }

    /// Read 32-bit register at offset
    ///
    /// # Errors
    ///
    /// Returns error if offset is unaligned or out of bounds
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.check(offset)?;

        // SAFETY: Volatile read from a memory-mapped register.
        // - Bounds validated above: offset + 4 <= self.size
        // - Alignment validated above: offset is a multiple of 4 and the
        //   mapping is page aligned
        // - ptr is valid for the lifetime of self (successful mmap)
        // - read_volatile keeps the compiler from eliding or reordering reads
        //   that have side effects on the device
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() };

        tracing::trace!("Read u32 @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    /// Write 32-bit register at offset
    ///
    /// # Errors
    ///
    /// Returns error if offset is unaligned or out of bounds
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        self.check(offset)?;

        tracing::trace!("Write u32 @ {offset:#x} = {value:#x}");

        // SAFETY: Volatile write to a memory-mapped register.
        // Same invariants as read_u32; &mut self gives exclusive access.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u32>().write_volatile(value);
        }

        Ok(())
    }

    /// Get region size
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Get the mapped file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        tracing::debug!("Unmapping {} ({:#x} bytes)", self.path.display(), self.size);

        // SAFETY: munmap requires:
        // - addr returned by mmap: self.ptr came from the successful mmap in open()
        // - length matching the mapping: self.size is the length passed to mmap
        // - no further use: we're in Drop
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
    }
}

// SAFETY: MmapRegion owns its mapping exclusively; moving it to another
// thread does not invalidate the mapping (the fd moves with it).
unsafe impl Send for MmapRegion {}

// SAFETY: writes require &mut self; reads through &self are volatile loads of
// an immutable pointer/size pair.
unsafe impl Sync for MmapRegion {}

/// Register backend over a mapped window
///
/// Register addresses are absolute; `base_address` is the address of tile
/// (0, 0) and maps to offset 0 of the window.
#[derive(Debug)]
pub struct MmapBackend {
    region: MmapRegion,
    base_address: u64,
}

impl MmapBackend {
    /// Map `size` bytes of `path` as the register space starting at `base_address`
    ///
    /// # Errors
    ///
    /// See [`MmapRegion::open`].
    pub fn open(path: &Path, base_address: u64, size: usize) -> Result<Self> {
        let region = MmapRegion::open(path, size)?;
        Ok(Self {
            region,
            base_address,
        })
    }

    /// Underlying mapped region
    #[must_use]
    pub const fn region(&self) -> &MmapRegion {
        &self.region
    }

    fn offset(&self, address: u64) -> Result<usize> {
        address
            .checked_sub(self.base_address)
            .and_then(|off| usize::try_from(off).ok())
            .ok_or_else(|| AieError::hardware_access_failed(address, "address below the register window"))
    }
}

impl RegisterIo for MmapBackend {
    fn read32(&mut self, address: u64) -> Result<u32> {
        let offset = self.offset(address)?;
        self.region
            .read_u32(offset)
            .map_err(|e| AieError::hardware_access_failed(address, e.to_string()))
    }

    fn write32(&mut self, address: u64, value: u32) -> Result<()> {
        let offset = self.offset(address)?;
        self.region
            .write_u32(offset, value)
            .map_err(|e| AieError::hardware_access_failed(address, e.to_string()))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Mmap
    }
}
