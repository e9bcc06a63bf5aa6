//! Device wrapper around a native backend.

use alloc::sync::Arc;
use core::fmt;

use replay_hal::{DeviceProperties, NativeDevice};

/// A device and its cached capabilities
pub struct Device {
    native: Arc<dyn NativeDevice>,
    properties: DeviceProperties,
}

impl Device {
    /// Wrap a backend
    pub fn new(native: Arc<dyn NativeDevice>) -> Arc<Self> {
        let properties = *native.properties();
        log::debug!(
            "device: compute queues {}, copy queues {}, mutable flags {:?}",
            properties.compute_queue_count,
            properties.copy_queue_count,
            properties.mutable_command_flags
        );
        Arc::new(Self { native, properties })
    }

    /// Backend primitives
    #[inline]
    pub fn native(&self) -> &dyn NativeDevice {
        &*self.native
    }

    /// Capabilities captured at creation
    #[inline]
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Device exposes a copy engine
    #[inline]
    pub fn has_copy_engine(&self) -> bool {
        self.properties.has_copy_engine()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}
