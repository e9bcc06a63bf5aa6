//! # Command Recording
//!
//! Append operations of a command graph. Each one:
//!
//! 1. resolves its sync-point wait-list to native events
//! 2. picks the compute or copy list through the engine selector
//! 3. allocates a completion event and appends the native command so that
//!    it waits on the resolved events and signals the new one
//! 4. registers the event under the next sync point
//!
//! In-order graphs skip the events entirely; list order is the dependency
//! order there, and no sync point is returned.
//!
//! Fills, prefetches and advice get host-visible completion events. Prefetch
//! and advice have no native signal slot, so they are bracketed by an
//! explicit wait and an explicit signal instead.

use alloc::sync::Arc;

use replay_core::{AccessMode, Buffer, Kernel};
use replay_hal::{
    CommandListHandle, CopyRegion, Error, EventDeps, GpuAddr, MemAdvice, NativeDevice, Region3d, Result,
};

use crate::command::{CommandHandle, LaunchConfig};
use crate::graph::{CommandGraph, GraphState};
use crate::lock;
use crate::sync_point::SyncPoint;
use crate::work_dims;

// =============================================================================
// DESCRIPTORS
// =============================================================================

/// Geometry of a kernel launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDesc {
    /// Number of dimensions in use, 1 to 3
    pub work_dim: u32,
    /// Offset added to every global id
    pub global_offset: Option<[u64; 3]>,
    /// Global work size
    pub global_size: [u64; 3],
    /// Work-group size; the driver picks one when absent
    pub local_size: Option<[u64; 3]>,
}

impl LaunchDesc {
    /// Launch over `global_size` in `work_dim` dimensions
    pub const fn new(work_dim: u32, global_size: [u64; 3]) -> Self {
        Self {
            work_dim,
            global_offset: None,
            global_size,
            local_size: None,
        }
    }

    /// One-dimensional launch over `size` work-items
    pub const fn linear(size: u64) -> Self {
        Self::new(1, [size, 1, 1])
    }

    /// Use an explicit work-group size
    pub const fn with_local_size(mut self, local_size: [u64; 3]) -> Self {
        self.local_size = Some(local_size);
        self
    }

    /// Offset every global id
    pub const fn with_global_offset(mut self, offset: [u64; 3]) -> Self {
        self.global_offset = Some(offset);
        self
    }
}

/// Result of recording a kernel launch
#[derive(Debug, Clone, Default)]
pub struct LaunchOutcome {
    /// Sync point of the launch, absent for in-order graphs
    pub sync_point: Option<SyncPoint>,
    /// Mutable handle, present only for updatable graphs
    pub command: Option<Arc<CommandHandle>>,
}

/// Rectangular copy between two buffers
///
/// A zero row pitch defaults to the region width, a zero slice pitch to
/// height times row pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RectCopy {
    /// Source origin: byte, row, slice
    pub src_origin: [u64; 3],
    /// Destination origin: byte, row, slice
    pub dst_origin: [u64; 3],
    /// Width in bytes, height in rows, depth in slices
    pub region: [u64; 3],
    /// Source row pitch in bytes
    pub src_row_pitch: u64,
    /// Source slice pitch in bytes
    pub src_slice_pitch: u64,
    /// Destination row pitch in bytes
    pub dst_row_pitch: u64,
    /// Destination slice pitch in bytes
    pub dst_slice_pitch: u64,
}

/// Rectangular transfer between a buffer and host memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferRect {
    /// Origin inside the buffer
    pub buffer_origin: [u64; 3],
    /// Origin inside host memory
    pub host_origin: [u64; 3],
    /// Width in bytes, height in rows, depth in slices
    pub region: [u64; 3],
    /// Buffer row pitch in bytes
    pub buffer_row_pitch: u64,
    /// Buffer slice pitch in bytes
    pub buffer_slice_pitch: u64,
    /// Host row pitch in bytes
    pub host_row_pitch: u64,
    /// Host slice pitch in bytes
    pub host_slice_pitch: u64,
}

bitflags::bitflags! {
    /// Placement hints for a unified allocation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UsmAdvice: u32 {
        /// Memory is mostly read
        const SET_READ_MOSTLY = 1 << 0;
        /// Clear read-mostly hint
        const CLEAR_READ_MOSTLY = 1 << 1;
        /// Prefer device placement
        const SET_PREFERRED_LOCATION = 1 << 2;
        /// Clear preferred placement
        const CLEAR_PREFERRED_LOCATION = 1 << 3;
        /// Device accesses are non-atomic
        const SET_NON_ATOMIC_MOSTLY = 1 << 4;
        /// Clear non-atomic hint
        const CLEAR_NON_ATOMIC_MOSTLY = 1 << 5;
        /// Bias placement toward cached memory
        const BIAS_CACHED = 1 << 6;
        /// Bias placement toward uncached memory
        const BIAS_UNCACHED = 1 << 7;
        /// Prefer host placement
        const SET_PREFERRED_LOCATION_HOST = 1 << 8;
        /// Clear host placement preference
        const CLEAR_PREFERRED_LOCATION_HOST = 1 << 9;
    }
}

impl UsmAdvice {
    /// Native advice bits
    ///
    /// The host-location variants land on the preferred-location bits.
    pub fn to_native(self) -> MemAdvice {
        const MAP: [(UsmAdvice, MemAdvice); 10] = [
            (UsmAdvice::SET_READ_MOSTLY, MemAdvice::SET_READ_MOSTLY),
            (UsmAdvice::CLEAR_READ_MOSTLY, MemAdvice::CLEAR_READ_MOSTLY),
            (UsmAdvice::SET_PREFERRED_LOCATION, MemAdvice::SET_PREFERRED_LOCATION),
            (UsmAdvice::CLEAR_PREFERRED_LOCATION, MemAdvice::CLEAR_PREFERRED_LOCATION),
            (UsmAdvice::SET_NON_ATOMIC_MOSTLY, MemAdvice::SET_NON_ATOMIC_MOSTLY),
            (UsmAdvice::CLEAR_NON_ATOMIC_MOSTLY, MemAdvice::CLEAR_NON_ATOMIC_MOSTLY),
            (UsmAdvice::BIAS_CACHED, MemAdvice::BIAS_CACHED),
            (UsmAdvice::BIAS_UNCACHED, MemAdvice::BIAS_UNCACHED),
            (UsmAdvice::SET_PREFERRED_LOCATION_HOST, MemAdvice::SET_PREFERRED_LOCATION),
            (UsmAdvice::CLEAR_PREFERRED_LOCATION_HOST, MemAdvice::CLEAR_PREFERRED_LOCATION),
        ];
        MAP.iter()
            .filter(|(usm, _)| self.contains(*usm))
            .fold(MemAdvice::empty(), |acc, (_, native)| acc | *native)
    }
}

// =============================================================================
// RECORDING
// =============================================================================

impl CommandGraph {
    /// Record a kernel launch
    ///
    /// The kernel's pending arguments, group size and global offset are
    /// captured now; later argument changes on the kernel do not reach the
    /// recorded launch.
    pub fn append_kernel_launch(
        self: &Arc<Self>,
        kernel: &Arc<Kernel>,
        desc: &LaunchDesc,
        wait: &[SyncPoint],
    ) -> Result<LaunchOutcome> {
        let program = kernel.program().ok_or(Error::InvalidNullHandle)?;
        let mut guard = lock::lock_launch(kernel, program, self);
        if guard.graph.finalized {
            return Err(Error::InvalidOperation);
        }

        let device = self.device();
        let native = device.native();
        if let Some(offset) = desc.global_offset {
            if !device.properties().supports_global_offset {
                log::warn!("global offset requested on a device without offset support");
                return Err(Error::UnsupportedFeature);
            }
            let mut narrowed = [0u32; 3];
            for (slot, &value) in narrowed.iter_mut().zip(&offset) {
                *slot = u32::try_from(value).map_err(|_| Error::InvalidValue)?;
            }
            native.set_global_offset(kernel.native(), narrowed)?;
        } else if device.properties().supports_global_offset {
            native.set_global_offset(kernel.native(), [0; 3])?;
        }

        if guard.kernel.pending_arguments() > 0 {
            guard.kernel.flush_pending_arguments(device, kernel.native())?;
        }

        let (group_count, group_size) = work_dims::calculate(
            native,
            kernel.native(),
            desc.work_dim,
            &desc.global_size,
            desc.local_size.as_ref(),
        )?;
        native.set_group_size(kernel.native(), group_size)?;
        log::debug!(
            "launch {}: group size {:?}, group count {:?}",
            kernel.name(),
            group_size,
            group_count
        );

        guard.graph.kernels.try_reserve(1)?;
        let updatable = self.is_updatable();
        let flags = device.properties().mutable_command_flags;
        let mut command_id = None;
        let sync_point = self.record_locked(&mut guard.graph, false, false, wait, |native, list, deps| {
            if updatable {
                command_id = Some(native.next_command_id(list, flags)?);
            }
            native.append_launch_kernel(list, kernel.native(), group_count, deps)
        })?;

        guard.graph.kernels.push(kernel.clone());
        guard.kernel.add_submission();

        let command = command_id.map(|id| {
            let config = LaunchConfig {
                global_offset: desc.global_offset.unwrap_or([0; 3]),
                global_size: desc.global_size,
                group_size,
                group_count,
            };
            Arc::new(CommandHandle::new(
                Arc::clone(self),
                kernel.clone(),
                id,
                desc.work_dim,
                desc.local_size.is_some(),
                config,
            ))
        });
        Ok(LaunchOutcome { sync_point, command })
    }

    /// Record a copy between two unified allocations
    pub fn append_usm_memcpy(
        &self,
        dst: GpuAddr,
        src: GpuAddr,
        size: usize,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        if dst.is_null() || src.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        let context = self.context();
        let prefer_copy = self.selector().usm_copy(context.memory_kind(src), context.memory_kind(dst));
        self.record(prefer_copy, false, wait, |native, list, deps| {
            native.append_memory_copy(list, dst, src, size, deps)
        })
    }

    /// Record a copy between two buffers
    pub fn append_buffer_copy(
        &self,
        src: &Buffer,
        dst: &Buffer,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        let src_addr = src.address_at(src_offset, size)?;
        let dst_addr = dst.address_at(dst_offset, size)?;
        let prefer_copy = self.selector().buffer_copy(src.is_on_host(), dst.is_on_host());
        self.record(prefer_copy, false, wait, |native, list, deps| {
            native.append_memory_copy(list, dst_addr, src_addr, size, deps)
        })
    }

    /// Record a rectangular copy between two buffers
    pub fn append_buffer_copy_rect(
        &self,
        src: &Buffer,
        dst: &Buffer,
        rect: &RectCopy,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        let region = copy_region(
            &rect.src_origin,
            rect.src_row_pitch,
            rect.src_slice_pitch,
            &rect.dst_origin,
            rect.dst_row_pitch,
            rect.dst_slice_pitch,
            &rect.region,
        )?;
        let src_addr = src.device_address(AccessMode::ReadOnly);
        let dst_addr = dst.device_address(AccessMode::WriteOnly);
        let prefer_copy = self.selector().buffer_copy(src.is_on_host(), dst.is_on_host());
        self.record(prefer_copy, false, wait, |native, list, deps| {
            native.append_memory_copy_region(list, dst_addr, src_addr, &region, deps)
        })
    }

    /// Record a write of `size` bytes at `src` into `buffer`
    pub fn append_buffer_write(
        &self,
        buffer: &Buffer,
        offset: usize,
        size: usize,
        src: GpuAddr,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        if src.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        let dst = buffer.address_at(offset, size)?;
        let prefer_copy = self.selector().transfer();
        self.record(prefer_copy, false, wait, |native, list, deps| {
            native.append_memory_copy(list, dst, src, size, deps)
        })
    }

    /// Record a rectangular write from host memory at `src` into `buffer`
    pub fn append_buffer_write_rect(
        &self,
        buffer: &Buffer,
        rect: &BufferRect,
        src: GpuAddr,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        if src.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        let region = copy_region(
            &rect.host_origin,
            rect.host_row_pitch,
            rect.host_slice_pitch,
            &rect.buffer_origin,
            rect.buffer_row_pitch,
            rect.buffer_slice_pitch,
            &rect.region,
        )?;
        let dst = buffer.device_address(AccessMode::WriteOnly);
        let prefer_copy = self.selector().transfer();
        self.record(prefer_copy, false, wait, |native, list, deps| {
            native.append_memory_copy_region(list, dst, src, &region, deps)
        })
    }

    /// Record a read of `size` bytes of `buffer` into host memory at `dst`
    pub fn append_buffer_read(
        &self,
        buffer: &Buffer,
        offset: usize,
        size: usize,
        dst: GpuAddr,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        if dst.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        let src = buffer.address_at(offset, size)?;
        let prefer_copy = self.selector().transfer();
        self.record(prefer_copy, false, wait, |native, list, deps| {
            native.append_memory_copy(list, dst, src, size, deps)
        })
    }

    /// Record a rectangular read of `buffer` into host memory at `dst`
    pub fn append_buffer_read_rect(
        &self,
        buffer: &Buffer,
        rect: &BufferRect,
        dst: GpuAddr,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        if dst.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        let region = copy_region(
            &rect.buffer_origin,
            rect.buffer_row_pitch,
            rect.buffer_slice_pitch,
            &rect.host_origin,
            rect.host_row_pitch,
            rect.host_slice_pitch,
            &rect.region,
        )?;
        let src = buffer.device_address(AccessMode::ReadOnly);
        let prefer_copy = self.selector().transfer();
        self.record(prefer_copy, false, wait, |native, list, deps| {
            native.append_memory_copy_region(list, dst, src, &region, deps)
        })
    }

    /// Record a fill of `size` bytes of `buffer` starting at `offset`
    pub fn append_buffer_fill(
        &self,
        buffer: &Buffer,
        pattern: &[u8],
        offset: usize,
        size: usize,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        let dst = buffer.address_at(offset, size)?;
        let prefer_copy = self.selector().fill(pattern.len())?;
        self.record(prefer_copy, true, wait, |native, list, deps| {
            native.append_memory_fill(list, dst, pattern, size, deps)
        })
    }

    /// Record a fill of `size` bytes at `ptr`
    pub fn append_usm_fill(
        &self,
        ptr: GpuAddr,
        pattern: &[u8],
        size: usize,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        if ptr.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        let prefer_copy = self.selector().fill(pattern.len())?;
        self.record(prefer_copy, true, wait, |native, list, deps| {
            native.append_memory_fill(list, ptr, pattern, size, deps)
        })
    }

    /// Record a migration of `size` bytes at `ptr` toward the device
    pub fn append_usm_prefetch(&self, ptr: GpuAddr, size: usize, wait: &[SyncPoint]) -> Result<Option<SyncPoint>> {
        if ptr.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        self.record(false, true, wait, |native, list, deps| {
            bracketed(native, list, deps, || native.append_memory_prefetch(list, ptr, size))
        })
    }

    /// Record placement advice for `size` bytes at `ptr`
    pub fn append_usm_advise(
        &self,
        ptr: GpuAddr,
        size: usize,
        advice: UsmAdvice,
        wait: &[SyncPoint],
    ) -> Result<Option<SyncPoint>> {
        if ptr.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        let native_advice = advice.to_native();
        log::debug!("advice {:?} recorded as {:?}", advice, native_advice);
        self.record(false, true, wait, |native, list, deps| {
            bracketed(native, list, deps, || native.append_mem_advise(list, ptr, size, native_advice))
        })
    }

    fn record<F>(&self, prefer_copy: bool, host_visible: bool, wait: &[SyncPoint], append: F) -> Result<Option<SyncPoint>>
    where
        F: FnOnce(&dyn NativeDevice, CommandListHandle, EventDeps<'_>) -> Result<()>,
    {
        let mut state = self.lock();
        self.record_locked(&mut state, prefer_copy, host_visible, wait, append)
    }

    /// Append one command under an already held graph lock
    ///
    /// The sync point is registered only once the native append succeeded,
    /// so a failed append never leaves an event the finalize barrier would
    /// wait on forever.
    fn record_locked<F>(
        &self,
        state: &mut GraphState,
        prefer_copy: bool,
        host_visible: bool,
        wait: &[SyncPoint],
        append: F,
    ) -> Result<Option<SyncPoint>>
    where
        F: FnOnce(&dyn NativeDevice, CommandListHandle, EventDeps<'_>) -> Result<()>,
    {
        if state.finalized {
            return Err(Error::InvalidOperation);
        }
        let native = self.device().native();

        if self.is_in_order() {
            append(native, self.compute_list, EventDeps::none())?;
            return Ok(None);
        }

        let deps = state.sync_points.resolve(wait)?;
        let event = self.context().create_event(host_visible, self.is_profiling_enabled())?;
        let sync_point = state.sync_points.next();
        let engine = self.selector().choose(prefer_copy, &mut state.copy_list_empty);
        let list = self.list_for(engine);

        append(native, list, EventDeps::new(Some(event.native()), &deps))?;
        state.sync_points.register(sync_point, event)?;
        log::trace!("{} recorded on {:?} after {} dependencies", sync_point, engine, deps.len());
        Ok(Some(sync_point))
    }
}

/// Wait, run `op`, then signal; for commands without native event slots
fn bracketed<F>(native: &dyn NativeDevice, list: CommandListHandle, deps: EventDeps<'_>, op: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    if !deps.wait.is_empty() {
        native.append_wait_on_events(list, deps.wait)?;
    }
    op()?;
    if let Some(signal) = deps.signal {
        native.append_signal_event(list, signal)?;
    }
    Ok(())
}

fn narrow(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::InvalidValue)
}

fn region3d(origin: &[u64; 3], row_pitch: u64, slice_pitch: u64, extent: &[u32; 3]) -> Result<Region3d> {
    let row_pitch = if row_pitch == 0 { extent[0] } else { narrow(row_pitch)? };
    let slice_pitch = if slice_pitch == 0 {
        extent[1].checked_mul(row_pitch).ok_or(Error::InvalidValue)?
    } else {
        narrow(slice_pitch)?
    };
    Ok(Region3d {
        origin: [narrow(origin[0])?, narrow(origin[1])?, narrow(origin[2])?],
        row_pitch,
        slice_pitch,
    })
}

fn copy_region(
    src_origin: &[u64; 3],
    src_row_pitch: u64,
    src_slice_pitch: u64,
    dst_origin: &[u64; 3],
    dst_row_pitch: u64,
    dst_slice_pitch: u64,
    region: &[u64; 3],
) -> Result<CopyRegion> {
    let extent = [narrow(region[0])?, narrow(region[1])?, narrow(region[2])?];
    Ok(CopyRegion {
        src: region3d(src_origin, src_row_pitch, src_slice_pitch, &extent)?,
        dst: region3d(dst_origin, dst_row_pitch, dst_slice_pitch, &extent)?,
        extent,
    })
}
