//! Linux platform implementation
//!
//! Reads a remote process with `process_vm_readv`. A scatter round is issued as
//! a single vectored syscall; if the kernel stops short, the round falls back to
//! per-request reads so one unmapped page does not poison its neighbours.

use super::{is_user_address, MemoryReader, PlatformError, ScatterRequest};
use std::path::Path;

/// `process_vm_readv` refuses more iovecs than this per call
const IOV_MAX: usize = 1024;

/// Linux platform implementation
pub struct LinuxPlatform {
    /// Process ID we're reading from
    pid: libc::pid_t,
}

impl LinuxPlatform {
    /// Attach to a specific process
    pub fn attach(pid: i32) -> Result<Self, PlatformError> {
        if !Path::new(&format!("/proc/{}", pid)).exists() {
            return Err(PlatformError::Detached(format!("process {} does not exist", pid)));
        }

        tracing::info!(pid, "attached to target process");

        Ok(Self { pid })
    }

    /// Process ID of the target
    pub fn pid(&self) -> i32 {
        self.pid
    }

    fn is_alive(&self) -> bool {
        Path::new(&format!("/proc/{}", self.pid)).exists()
    }

    /// Classify an errno from `process_vm_readv`
    fn classify_errno(&self, address: usize, size: usize) -> PlatformError {
        let err = std::io::Error::last_os_error();

        match err.raw_os_error() {
            Some(libc::ESRCH) => PlatformError::Detached(format!("process {} exited", self.pid)),
            Some(libc::EPERM) => {
                PlatformError::AccessDenied(format!("process {}: {}", self.pid, err))
            }
            Some(libc::EFAULT) => PlatformError::MemoryReadFailed {
                address,
                size,
                reason: "page not mapped".to_string(),
            },
            _ if !self.is_alive() => {
                PlatformError::Detached(format!("process {} exited", self.pid))
            }
            _ => PlatformError::MemoryReadFailed {
                address,
                size,
                reason: err.to_string(),
            },
        }
    }

    /// One vectored read; returns total bytes transferred
    fn readv(&self, requests: &[ScatterRequest], buffers: &mut [Vec<u8>]) -> isize {
        let local: Vec<libc::iovec> = buffers
            .iter_mut()
            .map(|b| libc::iovec {
                iov_base: b.as_mut_ptr() as *mut libc::c_void,
                iov_len: b.len(),
            })
            .collect();

        let remote: Vec<libc::iovec> = requests
            .iter()
            .map(|r| libc::iovec {
                iov_base: r.address as *mut libc::c_void,
                iov_len: r.size,
            })
            .collect();

        // SAFETY: every local iovec points into a live, correctly sized buffer owned
        // by `buffers`; remote iovecs are only interpreted by the kernel.
        unsafe {
            libc::process_vm_readv(
                self.pid,
                local.as_ptr(),
                local.len() as libc::c_ulong,
                remote.as_ptr(),
                remote.len() as libc::c_ulong,
                0,
            )
        }
    }
}

impl MemoryReader for LinuxPlatform {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>, PlatformError> {
        if size == 0 {
            return Ok(Vec::new());
        }

        if !is_user_address(address) {
            return Err(PlatformError::InvalidAddress(address));
        }

        let request = [ScatterRequest::new(address, size)];
        let mut buffer = vec![vec![0u8; size]];

        let read = self.readv(&request, &mut buffer);
        if read < 0 {
            return Err(self.classify_errno(address, size));
        }

        if read as usize != size {
            return Err(PlatformError::MemoryReadFailed {
                address,
                size,
                reason: format!("Expected to read {} bytes, got {}", size, read),
            });
        }

        Ok(buffer.pop().unwrap_or_default())
    }

    fn read_scatter(
        &self,
        requests: &[ScatterRequest],
    ) -> Result<Vec<Option<Vec<u8>>>, PlatformError> {
        let mut out = Vec::with_capacity(requests.len());

        for chunk in requests.chunks(IOV_MAX) {
            let mut buffers: Vec<Vec<u8>> = chunk.iter().map(|r| vec![0u8; r.size]).collect();
            let expected: usize = chunk.iter().map(|r| r.size).sum();

            let read = self.readv(chunk, &mut buffers);

            if read >= 0 && read as usize == expected {
                out.extend(buffers.into_iter().map(Some));
                continue;
            }

            if read < 0 && !self.is_alive() {
                return Err(PlatformError::Detached(format!("process {} exited", self.pid)));
            }

            // Partial transfer: find out which entries are readable
            for request in chunk {
                match self.read_bytes(request.address, request.size) {
                    Ok(bytes) => out.push(Some(bytes)),
                    Err(e) if e.is_hard() => return Err(e),
                    Err(_) => out.push(None),
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own_process() -> LinuxPlatform {
        LinuxPlatform::attach(std::process::id() as i32).unwrap()
    }

    #[test]
    fn test_attach_missing_process() {
        assert!(LinuxPlatform::attach(i32::MAX).is_err());
    }

    #[test]
    fn test_read_own_memory() {
        let platform = own_process();

        let test_value: u64 = 0x1234567890ABCDEF;
        let address = &test_value as *const u64 as usize;

        let result: u64 = platform.read(address).unwrap();
        assert_eq!(result, test_value);
    }

    #[test]
    fn test_scatter_own_memory() {
        let platform = own_process();

        let a: u32 = 0xAABBCCDD;
        let b: [u8; 4] = *b"lens";
        let requests = [
            ScatterRequest::new(&a as *const u32 as usize, 4),
            ScatterRequest::new(&b as *const [u8; 4] as usize, 4),
            ScatterRequest::new(0x10000, 8),
        ];

        let results = platform.read_scatter(&requests).unwrap();
        assert_eq!(results[0].as_deref(), Some(&a.to_ne_bytes()[..]));
        assert_eq!(results[1].as_deref(), Some(&b[..]));
        assert!(results[2].is_none());
    }
}
