//! Platform abstraction layer
//!
//! This module provides platform-independent interfaces for:
//! - Reading values, pointers and strings from a remote process
//! - Scatter reads (many independent requests in one round trip)
//! - User-space address validation

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsPlatform;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform;

/// In-memory process for tests
#[cfg(test)]
pub mod mock;

/// Lowest address considered part of user space. The first 64KiB is never mapped.
pub const MIN_USER_ADDRESS: usize = 0x1_0000;

/// Highest canonical user-space address on 64-bit targets.
pub const MAX_USER_ADDRESS: usize = 0x7FFF_FFFF_FFFF;

/// Platform-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Failed to read memory at address
    #[error("Memory read failed at 0x{address:X} (size: {size}): {reason}")]
    MemoryReadFailed {
        address: usize,
        size: usize,
        reason: String,
    },

    /// Invalid address
    #[error("Invalid memory address: 0x{0:X}")]
    InvalidAddress(usize),

    /// The target process went away
    #[error("Target process detached: {0}")]
    Detached(String),

    /// Access denied
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Backend transport failure (device, driver, syscall)
    #[error("Backend I/O failure: {0}")]
    Io(String),

    /// Platform-specific error
    #[error("Platform error: {0}")]
    Other(String),
}

impl PlatformError {
    /// Whether this error invalidates a whole batch rather than one address.
    ///
    /// Unreadable or invalid addresses are expected while walking a live object
    /// graph; losing the process or the transport is not.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            PlatformError::Detached(_) | PlatformError::AccessDenied(_) | PlatformError::Io(_)
        )
    }
}

/// One entry of a scatter read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScatterRequest {
    /// Remote address to read
    pub address: usize,
    /// Number of bytes
    pub size: usize,
}

impl ScatterRequest {
    /// Create a new request
    #[inline]
    pub fn new(address: usize, size: usize) -> Self {
        Self { address, size }
    }
}

/// Check whether an address lies inside the user-space range
#[inline]
pub fn is_user_address(address: usize) -> bool {
    (MIN_USER_ADDRESS..=MAX_USER_ADDRESS).contains(&address)
}

/// `base + offset`, rejecting results that wrap around the address space
#[inline]
pub fn offset_address(base: usize, offset: usize) -> Result<usize, PlatformError> {
    base.checked_add(offset)
        .ok_or(PlatformError::InvalidAddress(base))
}

/// Core trait for reading memory from a target process
///
/// Every read crosses the process boundary, so callers that need many values
/// should prefer [`MemoryReader::read_scatter`] (or the scatter pipeline built on
/// it) over individual reads.
pub trait MemoryReader: Send + Sync {
    /// Read raw bytes from memory
    ///
    /// # Arguments
    /// * `address` - Address to read from
    /// * `size` - Number of bytes to read
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>, PlatformError>;

    /// Check if an address is valid (readable)
    fn is_valid_address(&self, address: usize) -> bool {
        is_user_address(address)
    }

    /// Read many independent ranges in a single round trip
    ///
    /// The returned vector is parallel to `requests`. An entry is `None` when that
    /// particular range could not be read. Only hard errors (see
    /// [`PlatformError::is_hard`]) fail the whole call.
    ///
    /// The default implementation issues one `read_bytes` per request; backends
    /// with a native scatter facility should override it.
    fn read_scatter(
        &self,
        requests: &[ScatterRequest],
    ) -> Result<Vec<Option<Vec<u8>>>, PlatformError> {
        let mut out = Vec::with_capacity(requests.len());

        for request in requests {
            match self.read_bytes(request.address, request.size) {
                Ok(bytes) if bytes.len() == request.size => out.push(Some(bytes)),
                Ok(_) => out.push(None),
                Err(e) if e.is_hard() => return Err(e),
                Err(_) => out.push(None),
            }
        }

        Ok(out)
    }

    /// Read a POD (Plain Old Data) type from memory
    fn read<T: bytemuck::Pod>(&self, address: usize) -> Result<T, PlatformError>
    where
        Self: Sized,
    {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(address, size)?;

        if bytes.len() != size {
            return Err(PlatformError::MemoryReadFailed {
                address,
                size,
                reason: format!("Expected {} bytes, got {}", size, bytes.len()),
            });
        }

        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    /// Read a pointer and reject anything outside user space
    fn read_pointer(&self, address: usize) -> Result<usize, PlatformError>
    where
        Self: Sized,
    {
        let value = self.read::<u64>(address)? as usize;

        if !is_user_address(value) {
            return Err(PlatformError::InvalidAddress(value));
        }

        Ok(value)
    }

    /// Follow a pointer chain: for each offset, add it and dereference
    fn read_pointer_chain(&self, base: usize, offsets: &[usize]) -> Result<usize, PlatformError>
    where
        Self: Sized,
    {
        let mut current = base;

        for &offset in offsets {
            if !is_user_address(current) {
                return Err(PlatformError::InvalidAddress(current));
            }
            current = self.read_pointer(offset_address(current, offset)?)?;
        }

        Ok(current)
    }

    /// Read `count` consecutive 64-bit pointers in one request
    ///
    /// Values are returned as-is; null or wild entries are left to the caller.
    fn read_pointer_array(&self, base: usize, count: usize) -> Result<Vec<usize>, PlatformError>
    where
        Self: Sized,
    {
        let size = count
            .checked_mul(8)
            .ok_or(PlatformError::InvalidAddress(base))?;
        let bytes = self.read_bytes(base, size)?;

        if bytes.len() != size {
            return Err(PlatformError::MemoryReadFailed {
                address: base,
                size,
                reason: format!("Expected {} bytes, got {}", size, bytes.len()),
            });
        }

        Ok(bytes
            .chunks_exact(8)
            .map(|entry| bytemuck::pod_read_unaligned::<u64>(entry) as usize)
            .collect())
    }

    /// Read a null-terminated string from memory
    fn read_cstring(&self, address: usize, max_length: usize) -> Result<String, PlatformError>
    where
        Self: Sized,
    {
        let bytes = self.read_bytes(address, max_length)?;
        decode_cstring(&bytes)
    }
}

/// Decode a NUL-terminated UTF-8 string from a fixed-size buffer
pub fn decode_cstring(bytes: &[u8]) -> Result<String, PlatformError> {
    let null_pos = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());

    String::from_utf8(bytes[..null_pos].to_vec())
        .map_err(|e| PlatformError::Other(format!("Invalid UTF-8 string: {}", e)))
}

/// Default platform implementation for the current OS
#[cfg(windows)]
pub type DefaultPlatform = WindowsPlatform;

/// Default platform implementation for the current OS
#[cfg(target_os = "linux")]
pub type DefaultPlatform = LinuxPlatform;
