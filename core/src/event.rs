//! # Events
//!
//! Shared completion events. A native event is destroyed exactly once, when
//! the last `Arc<Event>` drops; the graph and callers holding a returned
//! event handle share ownership this way.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use replay_hal::{Error, EventHandle, EventStatus, GpuAddr, KernelTimestamp, Result};

use crate::device::Device;

/// Side buffer filled with per-command timestamps
#[derive(Debug, Clone, Copy)]
struct TimestampBuffer {
    addr: GpuAddr,
    count: usize,
}

/// A completion event
pub struct Event {
    device: Arc<Device>,
    native: EventHandle,
    host_visible: bool,
    profiling: bool,
    timestamps: spin::Mutex<Option<TimestampBuffer>>,
}

impl Event {
    pub(crate) fn new(device: Arc<Device>, native: EventHandle, host_visible: bool, profiling: bool) -> Self {
        Self {
            device,
            native,
            host_visible,
            profiling,
            timestamps: spin::Mutex::new(None),
        }
    }

    /// Native handle
    #[inline]
    pub fn native(&self) -> EventHandle {
        self.native
    }

    /// Completion observable from the host
    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.host_visible
    }

    /// Captures device timestamps
    #[inline]
    pub fn is_profiling(&self) -> bool {
        self.profiling
    }

    /// Block until signaled
    pub fn wait(&self) -> Result<()> {
        self.device.native().host_synchronize_event(self.native, u64::MAX)
    }

    /// Signaled already
    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.device.native().query_event_status(self.native)? == EventStatus::Complete)
    }

    /// Signal from the host
    pub fn host_signal(&self) -> Result<()> {
        self.device.native().host_signal_event(self.native)
    }

    /// Reset from the host
    pub fn host_reset(&self) -> Result<()> {
        self.device.native().host_reset_event(self.native)
    }

    /// Attach a timestamp buffer the event now owns
    pub fn attach_timestamps(&self, addr: GpuAddr, count: usize) {
        let previous = self.timestamps.lock().replace(TimestampBuffer { addr, count });
        if let Some(old) = previous {
            self.free_buffer(old.addr);
        }
    }

    /// Per-command timestamps captured by the submission this event tracks
    ///
    /// `Ok(None)` when the event carries no timestamp buffer.
    /// Fails with `NotReady` until the event is signaled.
    pub fn command_timestamps(&self) -> Result<Option<Vec<KernelTimestamp>>> {
        let Some(buffer) = *self.timestamps.lock() else {
            return Ok(None);
        };
        if !self.is_complete()? {
            return Err(Error::NotReady);
        }
        let mut raw = vec![0u8; buffer.count * KernelTimestamp::SIZE];
        self.device.native().read_memory(buffer.addr, &mut raw)?;
        let mut out = Vec::new();
        out.try_reserve(buffer.count)?;
        for chunk in raw.chunks_exact(KernelTimestamp::SIZE) {
            let mut slot = [0u8; KernelTimestamp::SIZE];
            slot.copy_from_slice(chunk);
            out.push(KernelTimestamp::from_bytes(&slot));
        }
        Ok(Some(out))
    }

    fn free_buffer(&self, addr: GpuAddr) {
        if let Err(e) = self.device.native().free(addr) {
            log::error!("failed to free timestamp buffer {}: {}", addr, e);
        }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if let Some(buffer) = self.timestamps.get_mut().take() {
            self.free_buffer(buffer.addr);
        }
        if let Err(e) = self.device.native().destroy_event(self.native) {
            log::error!("failed to destroy event {:?}: {}", self.native, e);
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("native", &self.native)
            .field("host_visible", &self.host_visible)
            .field("profiling", &self.profiling)
            .finish()
    }
}
