//! # Native Layer Traits
//!
//! The primitives a device backend provides to the runtime.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! NativeDevice
//!    │
//!    ├── EventOps        (create / signal / reset / query events)
//!    ├── CommandListOps  (record, close, mutate command lists)
//!    ├── KernelOps       (arguments and launch geometry)
//!    ├── QueueOps        (physical queues, fences, submission)
//!    └── MemoryOps       (unified allocations)
//! ```
//!
//! All methods take `&self`; backends synchronize internally so the
//! runtime can call them from any thread.

use crate::caps::{DeviceProperties, MutableCommandFlags};
use crate::command::{CommandListDesc, CopyRegion, EventDeps, EventDesc, MemAdvice, Mutation};
use crate::error::Result;
use crate::types::*;

// =============================================================================
// EVENTS
// =============================================================================

/// Completion event primitives
pub trait EventOps {
    /// Allocate an event in the non-signaled state
    fn create_event(&self, desc: &EventDesc) -> Result<EventHandle>;

    /// Destroy an event
    fn destroy_event(&self, event: EventHandle) -> Result<()>;

    /// Signal from the host
    fn host_signal_event(&self, event: EventHandle) -> Result<()>;

    /// Reset from the host
    fn host_reset_event(&self, event: EventHandle) -> Result<()>;

    /// Query without blocking
    fn query_event_status(&self, event: EventHandle) -> Result<EventStatus>;

    /// Block until signaled; `u64::MAX` waits forever
    fn host_synchronize_event(&self, event: EventHandle, timeout_ns: u64) -> Result<()>;

    /// Timestamps captured when a profiling event was signaled
    fn event_timestamp(&self, event: EventHandle) -> Result<KernelTimestamp>;
}

// =============================================================================
// COMMAND LISTS
// =============================================================================

/// Command list recording primitives
pub trait CommandListOps {
    /// Create an open, empty command list
    fn create_command_list(&self, desc: &CommandListDesc) -> Result<CommandListHandle>;

    /// Seal a list against further appends
    fn close_command_list(&self, list: CommandListHandle) -> Result<()>;

    /// Drop every recorded command and reopen the list
    fn reset_command_list(&self, list: CommandListHandle) -> Result<()>;

    /// Destroy a list
    fn destroy_command_list(&self, list: CommandListHandle) -> Result<()>;

    /// Barrier: every prior command and every `deps.wait` completes first
    fn append_barrier(&self, list: CommandListHandle, deps: EventDeps<'_>) -> Result<()>;

    /// Signal an event
    fn append_signal_event(&self, list: CommandListHandle, event: EventHandle) -> Result<()>;

    /// Reset an event to non-signaled
    fn append_reset_event(&self, list: CommandListHandle, event: EventHandle) -> Result<()>;

    /// Block subsequent commands on `events`
    fn append_wait_on_events(&self, list: CommandListHandle, events: &[EventHandle]) -> Result<()>;

    /// Linear copy
    fn append_memory_copy(
        &self,
        list: CommandListHandle,
        dst: GpuAddr,
        src: GpuAddr,
        size: usize,
        deps: EventDeps<'_>,
    ) -> Result<()>;

    /// Rectangular copy
    fn append_memory_copy_region(
        &self,
        list: CommandListHandle,
        dst: GpuAddr,
        src: GpuAddr,
        region: &CopyRegion,
        deps: EventDeps<'_>,
    ) -> Result<()>;

    /// Repeat `pattern` over `size` bytes
    fn append_memory_fill(
        &self,
        list: CommandListHandle,
        dst: GpuAddr,
        pattern: &[u8],
        size: usize,
        deps: EventDeps<'_>,
    ) -> Result<()>;

    /// Migrate memory toward the device
    fn append_memory_prefetch(&self, list: CommandListHandle, ptr: GpuAddr, size: usize) -> Result<()>;

    /// Apply placement hints
    fn append_mem_advise(
        &self,
        list: CommandListHandle,
        ptr: GpuAddr,
        size: usize,
        advice: MemAdvice,
    ) -> Result<()>;

    /// Launch a kernel with its current arguments, group size and offset
    fn append_launch_kernel(
        &self,
        list: CommandListHandle,
        kernel: KernelHandle,
        group_count: GroupCount,
        deps: EventDeps<'_>,
    ) -> Result<()>;

    /// Write the timestamps of `events` into `dst`, one [`KernelTimestamp`] each
    fn append_query_kernel_timestamps(
        &self,
        list: CommandListHandle,
        events: &[EventHandle],
        dst: GpuAddr,
        deps: EventDeps<'_>,
    ) -> Result<()>;

    /// Reserve the id the next launch appended to a mutable list will carry
    fn next_command_id(&self, list: CommandListHandle, flags: MutableCommandFlags) -> Result<u64>;

    /// Apply every mutation in one call
    fn update_mutable_commands(&self, list: CommandListHandle, mutations: &[Mutation]) -> Result<()>;
}

// =============================================================================
// KERNELS
// =============================================================================

/// Kernel object primitives
pub trait KernelOps {
    /// Create a kernel by entry-point name
    fn create_kernel(&self, name: &str) -> Result<KernelHandle>;

    /// Destroy a kernel
    fn destroy_kernel(&self, kernel: KernelHandle) -> Result<()>;

    /// Set an argument; `None` is a null argument
    fn set_kernel_argument(&self, kernel: KernelHandle, index: u32, value: Option<&[u8]>) -> Result<()>;

    /// Set the group size used by subsequent launches
    fn set_group_size(&self, kernel: KernelHandle, size: GroupSize) -> Result<()>;

    /// Set the global offset used by subsequent launches
    fn set_global_offset(&self, kernel: KernelHandle, offset: [u32; 3]) -> Result<()>;

    /// Suggest a group size dividing `global`
    fn suggest_group_size(&self, kernel: KernelHandle, global: [u32; 3]) -> Result<GroupSize>;
}

// =============================================================================
// QUEUES AND FENCES
// =============================================================================

/// Physical queue and fence primitives
pub trait QueueOps {
    /// Physical queue `index` of an engine
    fn queue(&self, engine: EngineKind, index: u32) -> Result<QueueHandle>;

    /// Create a fence bound to a queue
    fn create_fence(&self, queue: QueueHandle) -> Result<FenceHandle>;

    /// Return a fence to the non-signaled state
    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;

    /// Query without blocking
    fn query_fence_status(&self, fence: FenceHandle) -> Result<bool>;

    /// Block until signaled; `u64::MAX` waits forever
    fn host_synchronize_fence(&self, fence: FenceHandle, timeout_ns: u64) -> Result<()>;

    /// Destroy a fence
    fn destroy_fence(&self, fence: FenceHandle) -> Result<()>;

    /// Submit closed lists in order; the fence signals after the last one
    fn execute_command_lists(
        &self,
        queue: QueueHandle,
        lists: &[CommandListHandle],
        fence: Option<FenceHandle>,
    ) -> Result<()>;
}

// =============================================================================
// MEMORY
// =============================================================================

/// Unified memory primitives
pub trait MemoryOps {
    /// Allocate `size` bytes of `kind` memory
    fn allocate(&self, kind: MemoryKind, size: usize, alignment: usize) -> Result<GpuAddr>;

    /// Free an allocation by its base address
    fn free(&self, addr: GpuAddr) -> Result<()>;

    /// Placement of the allocation containing `addr`
    fn memory_kind(&self, addr: GpuAddr) -> MemoryKind;

    /// Host read
    fn read_memory(&self, addr: GpuAddr, dst: &mut [u8]) -> Result<()>;

    /// Host write
    fn write_memory(&self, addr: GpuAddr, src: &[u8]) -> Result<()>;
}

// =============================================================================
// DEVICE
// =============================================================================

/// A complete native device backend
pub trait NativeDevice:
    EventOps + CommandListOps + KernelOps + QueueOps + MemoryOps + Send + Sync
{
    /// Capabilities and quirks
    fn properties(&self) -> &DeviceProperties;
}
