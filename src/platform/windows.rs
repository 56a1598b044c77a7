//! Windows platform implementation
//!
//! Reads a remote process through `ReadProcessMemory`. Windows has no vectored
//! cross-process read, so scatter rounds use the per-request default.

use super::{is_user_address, MemoryReader, PlatformError};
use windows::Win32::Foundation::{CloseHandle, GetLastError, BOOL, ERROR_PARTIAL_COPY, HANDLE};
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_VM_READ,
};

/// Exit code reported while a process is still running
const STILL_ACTIVE: u32 = 259;

/// Windows platform implementation
pub struct WindowsPlatform {
    /// Handle to the target process
    process_handle: HANDLE,
}

impl WindowsPlatform {
    /// Open a process for reading
    pub fn attach(process_id: u32) -> Result<Self, PlatformError> {
        let process_handle = unsafe {
            OpenProcess(
                PROCESS_VM_READ | PROCESS_QUERY_LIMITED_INFORMATION,
                BOOL::from(false),
                process_id,
            )
        }
        .map_err(|e| {
            PlatformError::AccessDenied(format!("Failed to open process {}: {}", process_id, e))
        })?;

        tracing::info!(process_id, "attached to target process");

        Ok(Self { process_handle })
    }

    fn is_alive(&self) -> bool {
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(self.process_handle, &mut code) }.is_ok()
            && code == STILL_ACTIVE
    }
}

impl Drop for WindowsPlatform {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.process_handle);
        }
    }
}

impl MemoryReader for WindowsPlatform {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>, PlatformError> {
        if size == 0 {
            return Ok(Vec::new());
        }

        if !is_user_address(address) {
            return Err(PlatformError::InvalidAddress(address));
        }

        let mut buffer = vec![0u8; size];
        let mut bytes_read = 0;

        let result = unsafe {
            ReadProcessMemory(
                self.process_handle,
                address as *const _,
                buffer.as_mut_ptr() as *mut _,
                size,
                Some(&mut bytes_read),
            )
        };

        if let Err(e) = result {
            if !self.is_alive() {
                return Err(PlatformError::Detached("target process exited".to_string()));
            }

            let reason = if unsafe { GetLastError() } == ERROR_PARTIAL_COPY {
                "partial copy".to_string()
            } else {
                format!("ReadProcessMemory failed: {}", e)
            };

            return Err(PlatformError::MemoryReadFailed {
                address,
                size,
                reason,
            });
        }

        if bytes_read != size {
            return Err(PlatformError::MemoryReadFailed {
                address,
                size,
                reason: format!("Expected to read {} bytes, got {}", size, bytes_read),
            });
        }

        Ok(buffer)
    }
}

// The handle is only used for reads, which the OS serializes
unsafe impl Send for WindowsPlatform {}
unsafe impl Sync for WindowsPlatform {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_own_memory() {
        let platform = WindowsPlatform::attach(std::process::id()).unwrap();

        let test_value: u64 = 0x1234567890ABCDEF;
        let address = &test_value as *const u64 as usize;

        let result: u64 = platform.read(address).unwrap();
        assert_eq!(result, test_value);
    }

    #[test]
    fn test_invalid_address() {
        let platform = WindowsPlatform::attach(std::process::id()).unwrap();
        assert!(platform.read_bytes(0, 8).is_err());
        assert!(platform.read_bytes(0x1000, 8).is_err());
    }
}
