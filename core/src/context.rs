//! Contexts: allocation of events, buffers and unified memory.

use alloc::sync::Arc;

use replay_hal::{Error, EventDesc, GpuAddr, MemoryKind, Result};

use crate::buffer::{Buffer, MemFlags};
use crate::device::Device;
use crate::event::Event;

/// Default alignment for unified allocations
const USM_ALIGNMENT: usize = 64;

/// A context bound to one device
#[derive(Debug)]
pub struct Context {
    device: Arc<Device>,
}

impl Context {
    /// Create a context
    pub fn new(device: Arc<Device>) -> Arc<Self> {
        Arc::new(Self { device })
    }

    /// Owning device
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Allocate a non-signaled event
    pub fn create_event(&self, host_visible: bool, profiling: bool) -> Result<Arc<Event>> {
        let desc = EventDesc {
            host_visible,
            profiling,
        };
        let native = self.device.native().create_event(&desc)?;
        Ok(Arc::new(Event::new(self.device.clone(), native, host_visible, profiling)))
    }

    /// Allocate unified memory
    pub fn usm_alloc(&self, kind: MemoryKind, size: usize) -> Result<GpuAddr> {
        if size == 0 || kind == MemoryKind::Unknown {
            return Err(Error::InvalidValue);
        }
        self.device.native().allocate(kind, size, USM_ALIGNMENT)
    }

    /// Free unified memory
    pub fn usm_free(&self, addr: GpuAddr) -> Result<()> {
        self.device.native().free(addr)
    }

    /// Placement of a unified pointer
    #[inline]
    pub fn memory_kind(&self, addr: GpuAddr) -> MemoryKind {
        self.device.native().memory_kind(addr)
    }

    /// Create a buffer; `ALLOC_HOST` places it in host memory
    pub fn create_buffer(&self, flags: MemFlags, size: usize) -> Result<Arc<Buffer>> {
        let on_host = flags.contains(MemFlags::ALLOC_HOST);
        let kind = if on_host { MemoryKind::Host } else { MemoryKind::Device };
        let addr = self.usm_alloc(kind, size)?;
        Ok(Arc::new(Buffer::new(self.device.clone(), addr, size, on_host)))
    }

    /// Host write into unified memory
    pub fn write(&self, addr: GpuAddr, src: &[u8]) -> Result<()> {
        self.device.native().write_memory(addr, src)
    }

    /// Host read from unified memory
    pub fn read(&self, addr: GpuAddr, dst: &mut [u8]) -> Result<()> {
        self.device.native().read_memory(addr, dst)
    }
}
