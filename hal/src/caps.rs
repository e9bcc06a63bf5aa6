//! # Device Capabilities
//!
//! What a native device reports about itself. The graph engine consults
//! these when choosing engines and when validating mutable-command updates.

bitflags::bitflags! {
    /// Fields of a recorded kernel launch the device can rewrite in place
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MutableCommandFlags: u32 {
        /// Kernel arguments
        const KERNEL_ARGUMENTS = 1 << 0;
        /// Group count
        const GROUP_COUNT = 1 << 1;
        /// Group size
        const GROUP_SIZE = 1 << 2;
        /// Global offset
        const GLOBAL_OFFSET = 1 << 3;
    }
}

/// Capabilities and quirks of a native device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Physical compute queues exposed by the device
    pub compute_queue_count: u32,
    /// Physical copy queues; zero when there is no copy engine
    pub copy_queue_count: u32,
    /// Largest fill pattern the compute engine accepts, in bytes
    pub compute_max_fill_pattern_size: usize,
    /// Largest fill pattern the copy engine accepts, in bytes
    pub copy_max_fill_pattern_size: usize,
    /// Mutable command lists are available
    pub supports_mutable_command_lists: bool,
    /// Which launch fields can be mutated
    pub mutable_command_flags: MutableCommandFlags,
    /// Kernels accept a global offset
    pub supports_global_offset: bool,
    /// Command lists can be created with strict in-order execution
    pub supports_in_order_lists: bool,
    /// Copy engine is slow when either side of a copy is a shared allocation
    pub copy_engine_slow_for_shared: bool,
}

impl DeviceProperties {
    /// Device exposes at least one copy queue
    #[inline]
    pub const fn has_copy_engine(&self) -> bool {
        self.copy_queue_count > 0
    }

    /// Largest fill pattern for an engine
    #[inline]
    pub const fn max_fill_pattern_size(&self, engine: crate::EngineKind) -> usize {
        match engine {
            crate::EngineKind::Compute => self.compute_max_fill_pattern_size,
            crate::EngineKind::Copy => self.copy_max_fill_pattern_size,
        }
    }
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            compute_queue_count: 1,
            copy_queue_count: 1,
            compute_max_fill_pattern_size: 128,
            copy_max_fill_pattern_size: 4,
            supports_mutable_command_lists: true,
            mutable_command_flags: MutableCommandFlags::all(),
            supports_global_offset: true,
            supports_in_order_lists: true,
            copy_engine_slow_for_shared: false,
        }
    }
}
