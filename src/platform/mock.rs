//! Mock platform for testing
//!
//! This module provides a mock implementation of the platform traits
//! that can be used for testing without requiring a real target process.

use super::{MemoryReader, PlatformError, ScatterRequest};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock memory storage
#[derive(Default, Clone)]
struct MockMemory {
    /// Memory regions with their data, keyed by base address
    regions: HashMap<usize, Vec<u8>>,
}

impl MockMemory {
    fn write(&mut self, address: usize, data: &[u8]) {
        // Patch an existing region in place when the write fits inside it
        for (&base, region) in self.regions.iter_mut() {
            if address >= base && address + data.len() <= base + region.len() {
                let offset = address - base;
                region[offset..offset + data.len()].copy_from_slice(data);
                return;
            }
        }

        self.regions.insert(address, data.to_vec());
    }

    fn read(&self, address: usize, size: usize) -> Option<Vec<u8>> {
        if let Some(data) = self.regions.get(&address) {
            if data.len() >= size {
                return Some(data[..size].to_vec());
            }
        }

        for (&base, data) in &self.regions {
            if address >= base && address < base + data.len() {
                let offset = address - base;
                let available = data.len() - offset;

                if available >= size {
                    return Some(data[offset..offset + size].to_vec());
                }
            }
        }

        None
    }

    fn clear(&mut self, address: usize) {
        self.regions.remove(&address);
    }
}

/// Mock platform implementation for testing
///
/// Besides serving reads from a sparse memory map it records every scatter
/// round so tests can assert on round counts and ordering.
#[derive(Clone, Default)]
pub struct MockPlatform {
    memory: Arc<RwLock<MockMemory>>,
    scatter_log: Arc<RwLock<Vec<Vec<ScatterRequest>>>>,
    read_calls: Arc<AtomicUsize>,
    fail_hard: Arc<AtomicBool>,
}

impl MockPlatform {
    /// Create a new mock platform
    pub fn new() -> Self {
        Self::default()
    }

    /// Write data to mock memory
    pub fn write_memory(&self, address: usize, data: &[u8]) {
        self.memory.write().write(address, data);
    }

    /// Write a POD type to memory
    pub fn write_value<T: bytemuck::Pod>(&self, address: usize, value: &T) {
        self.write_memory(address, bytemuck::bytes_of(value));
    }

    /// Write a 64-bit pointer
    pub fn write_pointer(&self, address: usize, target: usize) {
        self.write_value(address, &(target as u64));
    }

    /// Write a NUL-terminated string
    pub fn write_cstring(&self, address: usize, value: &str) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.write_memory(address, &bytes);
    }

    /// Drop the region that starts at `address`
    pub fn unmap(&self, address: usize) {
        self.memory.write().clear(address);
    }

    /// Make every subsequent read fail with a hard I/O error
    pub fn set_fail_hard(&self, fail: bool) {
        self.fail_hard.store(fail, Ordering::SeqCst);
    }

    /// Number of scatter round trips issued so far
    pub fn scatter_calls(&self) -> usize {
        self.scatter_log.read().len()
    }

    /// Requests issued in each scatter round, in order
    pub fn scatter_log(&self) -> Vec<Vec<ScatterRequest>> {
        self.scatter_log.read().clone()
    }

    /// Number of single `read_bytes` calls issued outside scatter rounds
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Forget recorded calls
    pub fn reset_counters(&self) {
        self.scatter_log.write().clear();
        self.read_calls.store(0, Ordering::SeqCst);
    }

    fn read_inner(&self, address: usize, size: usize) -> Result<Vec<u8>, PlatformError> {
        if self.fail_hard.load(Ordering::SeqCst) {
            return Err(PlatformError::Io("mock transport down".to_string()));
        }

        self.memory
            .read()
            .read(address, size)
            .ok_or(PlatformError::MemoryReadFailed {
                address,
                size,
                reason: "Address not found in mock memory".to_string(),
            })
    }
}

impl MemoryReader for MockPlatform {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>, PlatformError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.read_inner(address, size)
    }

    fn read_scatter(
        &self,
        requests: &[ScatterRequest],
    ) -> Result<Vec<Option<Vec<u8>>>, PlatformError> {
        self.scatter_log.write().push(requests.to_vec());

        let mut out = Vec::with_capacity(requests.len());
        for request in requests {
            match self.read_inner(request.address, request.size) {
                Ok(bytes) => out.push(Some(bytes)),
                Err(e) if e.is_hard() => return Err(e),
                Err(_) => out.push(None),
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_platform() {
        let platform = MockPlatform::new();

        let test_data = vec![0x01, 0x02, 0x03, 0x04, 0x05];
        platform.write_memory(0x10000, &test_data);

        let result = platform.read_bytes(0x10000, 5).unwrap();
        assert_eq!(result, test_data);

        // Read from the middle of a region
        let result = platform.read_bytes(0x10002, 2).unwrap();
        assert_eq!(result, vec![0x03, 0x04]);
    }

    #[test]
    fn test_mock_platform_write_value() {
        let platform = MockPlatform::new();

        let test_value: u64 = 0x1234567890ABCDEF;
        platform.write_value(0x20000, &test_value);

        let result: u64 = platform.read(0x20000).unwrap();
        assert_eq!(result, test_value);
    }

    #[test]
    fn test_patch_in_place() {
        let platform = MockPlatform::new();
        platform.write_memory(0x30000, &[0u8; 32]);
        platform.write_pointer(0x30008, 0x40000);

        assert_eq!(platform.read_pointer(0x30008).unwrap(), 0x40000);
        assert_eq!(platform.read::<u64>(0x30000).unwrap(), 0);
    }

    #[test]
    fn test_pointer_chain_and_string() {
        let platform = MockPlatform::new();
        platform.write_pointer(0x10010, 0x20000);
        platform.write_pointer(0x20008, 0x30000);
        // Strings are read as fixed-size blocks, so back them with enough memory
        platform.write_memory(0x30000, &[0u8; 32]);
        platform.write_cstring(0x30000, "Target");

        let end = platform.read_pointer_chain(0x10000, &[0x10, 0x08]).unwrap();
        assert_eq!(end, 0x30000);
        assert_eq!(platform.read_cstring(end, 16).unwrap(), "Target");

        // Offsets that would wrap around the address space
        assert!(matches!(
            platform.read_pointer_chain(0x10000, &[usize::MAX]),
            Err(PlatformError::InvalidAddress(0x10000))
        ));
        assert!(matches!(
            platform.read_pointer_array(0x10000, usize::MAX),
            Err(PlatformError::InvalidAddress(0x10000))
        ));

        // Null pointer in the chain
        platform.write_pointer(0x20008, 0);
        assert!(platform.read_pointer_chain(0x10000, &[0x10, 0x08]).is_err());
    }

    #[test]
    fn test_scatter_unavailable_and_hard() {
        let platform = MockPlatform::new();
        platform.write_value(0x10000, &7u32);

        let requests = [ScatterRequest::new(0x10000, 4), ScatterRequest::new(0x90000, 4)];
        let results = platform.read_scatter(&requests).unwrap();
        assert_eq!(results[0].as_deref(), Some(&7u32.to_le_bytes()[..]));
        assert!(results[1].is_none());
        assert_eq!(platform.scatter_calls(), 1);

        platform.set_fail_hard(true);
        assert!(platform.read_scatter(&requests).is_err());
    }
}
