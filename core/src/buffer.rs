//! Linear buffer memory objects.

use alloc::sync::Arc;
use core::fmt;

use replay_hal::{Error, GpuAddr, Result};

use crate::device::Device;

bitflags::bitflags! {
    /// Buffer creation and access flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemFlags: u32 {
        /// Read and written by kernels
        const READ_WRITE = 1 << 0;
        /// Only written by kernels
        const WRITE_ONLY = 1 << 1;
        /// Only read by kernels
        const READ_ONLY = 1 << 2;
        /// Backing store lives in host memory
        const ALLOC_HOST = 1 << 3;
    }
}

/// Kernel access mode of a buffer argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read and write
    ReadWrite,
    /// Write only
    WriteOnly,
    /// Read only
    ReadOnly,
}

impl AccessMode {
    /// Decode the access bits of `flags`; exactly one must be set
    pub fn from_flags(flags: MemFlags) -> Result<Self> {
        let access = flags & (MemFlags::READ_WRITE | MemFlags::WRITE_ONLY | MemFlags::READ_ONLY);
        if access == MemFlags::READ_WRITE {
            Ok(Self::ReadWrite)
        } else if access == MemFlags::WRITE_ONLY {
            Ok(Self::WriteOnly)
        } else if access == MemFlags::READ_ONLY {
            Ok(Self::ReadOnly)
        } else {
            Err(Error::InvalidArgument)
        }
    }
}

/// A linear buffer backed by one unified allocation
pub struct Buffer {
    device: Arc<Device>,
    addr: GpuAddr,
    size: usize,
    on_host: bool,
}

impl Buffer {
    pub(crate) fn new(device: Arc<Device>, addr: GpuAddr, size: usize, on_host: bool) -> Self {
        Self {
            device,
            addr,
            size,
            on_host,
        }
    }

    /// Size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Backing store is host memory
    #[inline]
    pub fn is_on_host(&self) -> bool {
        self.on_host
    }

    /// Device address for an access mode
    #[inline]
    pub fn device_address(&self, _access: AccessMode) -> GpuAddr {
        self.addr
    }

    /// Address of `offset`, checking that `len` bytes fit
    pub fn address_at(&self, offset: usize, len: usize) -> Result<GpuAddr> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(self.addr.offset(offset as u64)),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.native().free(self.addr) {
            log::error!("failed to free buffer {}: {}", self.addr, e);
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("addr", &self.addr)
            .field("size", &self.size)
            .field("on_host", &self.on_host)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode_requires_exactly_one_bit() {
        assert_eq!(AccessMode::from_flags(MemFlags::READ_ONLY), Ok(AccessMode::ReadOnly));
        assert_eq!(
            AccessMode::from_flags(MemFlags::WRITE_ONLY | MemFlags::ALLOC_HOST),
            Ok(AccessMode::WriteOnly)
        );
        assert_eq!(
            AccessMode::from_flags(MemFlags::READ_ONLY | MemFlags::WRITE_ONLY),
            Err(Error::InvalidArgument)
        );
        assert_eq!(AccessMode::from_flags(MemFlags::empty()), Err(Error::InvalidArgument));
    }
}
