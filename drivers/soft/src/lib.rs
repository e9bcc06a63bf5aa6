//! # Replay Soft Device
//!
//! A host-side reference implementation of the native layer.
//!
//! Every physical queue is a worker thread. Command lists are recorded as
//! plain data, snapshotted when executed, and run strictly in order on their
//! queue, blocking on wait events and signaling completion events as they
//! go. Kernels are Rust closures registered by name.
//!
//! The device also counts live native objects, so callers can check that
//! everything they created was destroyed exactly once.
//!
//! ```text
//! execute_command_lists ──► snapshot ──► channel ──► worker thread
//!                                                     │ wait events
//!                                                     │ run work (memory arena)
//!                                                     │ signal event
//!                                                     └ retire fence
//! ```

#![warn(missing_docs)]

mod kernel;
mod list;
mod memory;
mod sync;
mod worker;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use replay_hal::{
    CommandListDesc, CommandListHandle, CommandListOps, CopyRegion, DeviceProperties, EngineKind, Error,
    EventDeps, EventDesc, EventHandle, EventOps, EventStatus, FenceHandle, GpuAddr, GroupCount, GroupSize,
    KernelHandle, KernelOps, KernelTimestamp, MemAdvice, MemoryKind, MemoryOps, MutableCommandFlags, Mutation,
    NativeDevice, QueueHandle, QueueOps, Result,
};

pub use kernel::{KernelFn, KernelInvocation, WorkItem};
pub use list::{CommandKind, LaunchInfo};

use list::{SoftList, Work};
use sync::{SoftEvent, SoftFence};
use worker::{ExecCommand, ExecWork, QueueWorker, Shared, Submission};

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for [`SoftDevice`]
#[derive(Debug, Clone, Default)]
pub struct SoftDeviceBuilder {
    props: DeviceProperties,
}

impl SoftDeviceBuilder {
    /// Defaults: one compute queue, one copy queue, every mutable capability
    pub fn new() -> Self {
        Self {
            props: DeviceProperties::default(),
        }
    }

    /// Number of physical compute queues
    pub fn compute_queues(mut self, count: u32) -> Self {
        self.props.compute_queue_count = count;
        self
    }

    /// Number of physical copy queues; zero removes the copy engine
    pub fn copy_queues(mut self, count: u32) -> Self {
        self.props.copy_queue_count = count;
        self
    }

    /// Expose or hide the copy engine
    pub fn copy_engine(self, enable: bool) -> Self {
        self.copy_queues(u32::from(enable))
    }

    /// Maximum fill pattern size per engine
    pub fn max_fill_pattern_size(mut self, compute: usize, copy: usize) -> Self {
        self.props.compute_max_fill_pattern_size = compute;
        self.props.copy_max_fill_pattern_size = copy;
        self
    }

    /// Mutable command list support
    pub fn mutable_command_lists(mut self, enable: bool) -> Self {
        self.props.supports_mutable_command_lists = enable;
        self
    }

    /// Mutable launch fields
    pub fn mutable_command_flags(mut self, flags: MutableCommandFlags) -> Self {
        self.props.mutable_command_flags = flags;
        self
    }

    /// Global offset support
    pub fn global_offset(mut self, enable: bool) -> Self {
        self.props.supports_global_offset = enable;
        self
    }

    /// In-order command list support
    pub fn in_order_lists(mut self, enable: bool) -> Self {
        self.props.supports_in_order_lists = enable;
        self
    }

    /// Report the copy engine as slow for shared allocations
    pub fn copy_engine_slow_for_shared(mut self, enable: bool) -> Self {
        self.props.copy_engine_slow_for_shared = enable;
        self
    }

    /// Spawn the queue workers
    pub fn build(self) -> Result<SoftDevice> {
        if self.props.compute_queue_count == 0 {
            return Err(Error::InvalidValue);
        }
        let shared = Arc::new(Shared::new());
        let next_id = AtomicU64::new(1);
        let mut queues = HashMap::new();
        let engines = [
            (EngineKind::Compute, self.props.compute_queue_count),
            (EngineKind::Copy, self.props.copy_queue_count),
        ];
        for (engine, count) in engines {
            for index in 0..count {
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                queues.insert(id, QueueWorker::spawn(engine, index, shared.clone())?);
            }
        }
        log::debug!("soft device up with {} queues", queues.len());

        Ok(SoftDevice {
            props: self.props,
            shared,
            next_id,
            queues,
            events: Mutex::new(HashMap::new()),
            lists: Mutex::new(HashMap::new()),
            fences: Mutex::new(HashMap::new()),
            kernels: Mutex::new(HashMap::new()),
            registry: RwLock::new(HashMap::new()),
            destroy_failures: AtomicUsize::new(0),
            submissions: AtomicU64::new(0),
        })
    }
}

// =============================================================================
// DEVICE
// =============================================================================

/// Software reference device
pub struct SoftDevice {
    props: DeviceProperties,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    queues: HashMap<u64, QueueWorker>,
    events: Mutex<HashMap<u64, Arc<SoftEvent>>>,
    lists: Mutex<HashMap<u64, SoftList>>,
    fences: Mutex<HashMap<u64, (u64, Arc<SoftFence>)>>,
    kernels: Mutex<HashMap<u64, kernel::SoftKernel>>,
    registry: RwLock<HashMap<String, KernelFn>>,
    destroy_failures: AtomicUsize,
    submissions: AtomicU64,
}

impl SoftDevice {
    /// Start building a device
    pub fn builder() -> SoftDeviceBuilder {
        SoftDeviceBuilder::new()
    }

    /// Register a kernel body under an entry-point name
    pub fn register_kernel<F>(&self, name: &str, body: F)
    where
        F: Fn(&mut KernelInvocation<'_>, WorkItem) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.write().insert(name.to_owned(), Arc::new(body));
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn with_list<T>(&self, list: CommandListHandle, f: impl FnOnce(&mut SoftList) -> Result<T>) -> Result<T> {
        let mut lists = self.lists.lock();
        let list = lists.get_mut(&list.id()).ok_or(Error::InvalidNullHandle)?;
        f(list)
    }

    fn record(&self, list: CommandListHandle, work: Work, deps: EventDeps<'_>) -> Result<()> {
        self.check_events(deps.signal.iter().chain(deps.wait))?;
        self.with_list(list, |l| l.push(work, deps))
    }

    fn check_events<'a>(&self, events: impl IntoIterator<Item = &'a EventHandle>) -> Result<()> {
        let known = self.events.lock();
        for event in events {
            if !known.contains_key(&event.id()) {
                return Err(Error::InvalidNullHandle);
            }
        }
        Ok(())
    }

    fn event(&self, event: EventHandle) -> Result<Arc<SoftEvent>> {
        self.events.lock().get(&event.id()).cloned().ok_or(Error::InvalidNullHandle)
    }

    fn fence(&self, fence: FenceHandle) -> Result<Arc<SoftFence>> {
        self.fences
            .lock()
            .get(&fence.id())
            .map(|(_, f)| f.clone())
            .ok_or(Error::InvalidNullHandle)
    }

    fn note_destroy_failure(&self) -> Error {
        self.destroy_failures.fetch_add(1, Ordering::Relaxed);
        Error::InvalidNullHandle
    }

    /// Resolve a closed list into executable commands
    fn snapshot(&self, list: &SoftList, out: &mut Vec<ExecCommand>) -> Result<()> {
        if !list.closed {
            return Err(Error::InvalidOperation);
        }
        let events = self.events.lock();
        let resolve = |e: &EventHandle| events.get(&e.id()).cloned().ok_or(Error::InvalidNullHandle);
        let registry = self.registry.read();
        let kernels = self.kernels.lock();

        for cmd in &list.commands {
            let work = match &cmd.work {
                Work::Barrier | Work::Signal | Work::WaitOnEvents => ExecWork::Nop,
                Work::Reset(event) => ExecWork::Reset(resolve(event)?),
                Work::Copy { dst, src, size } => ExecWork::Copy {
                    dst: *dst,
                    src: *src,
                    size: *size,
                },
                Work::CopyRegion { dst, src, region } => ExecWork::CopyRegion {
                    dst: *dst,
                    src: *src,
                    region: *region,
                },
                Work::Fill { dst, pattern, size } => ExecWork::Fill {
                    dst: *dst,
                    pattern: pattern.clone(),
                    size: *size,
                },
                Work::Prefetch { ptr, size } => ExecWork::Prefetch { ptr: *ptr, size: *size },
                Work::Advise { ptr, size, advice } => ExecWork::Advise {
                    ptr: *ptr,
                    size: *size,
                    advice: *advice,
                },
                Work::Launch { info, .. } => {
                    let kernel = kernels.get(&info.kernel.id()).ok_or(Error::InvalidNullHandle)?;
                    let body = registry.get(&kernel.name).cloned().unwrap_or_else(|| kernel.body.clone());
                    ExecWork::Launch {
                        body,
                        info: info.clone(),
                    }
                }
                Work::QueryTimestamps { events: queried, dst } => ExecWork::QueryTimestamps {
                    events: queried.iter().map(resolve).collect::<Result<_>>()?,
                    dst: *dst,
                },
            };
            out.push(ExecCommand {
                work,
                signal: cmd.signal.as_ref().map(resolve).transpose()?,
                wait: cmd.wait.iter().map(resolve).collect::<Result<_>>()?,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Native events not yet destroyed
    pub fn live_events(&self) -> usize {
        self.events.lock().len()
    }

    /// Command lists not yet destroyed
    pub fn live_command_lists(&self) -> usize {
        self.lists.lock().len()
    }

    /// Fences not yet destroyed
    pub fn live_fences(&self) -> usize {
        self.fences.lock().len()
    }

    /// Kernels not yet destroyed
    pub fn live_kernels(&self) -> usize {
        self.kernels.lock().len()
    }

    /// Allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.shared.memory.lock().live()
    }

    /// Destroy calls naming an object that no longer existed
    pub fn destroy_failures(&self) -> usize {
        self.destroy_failures.load(Ordering::Relaxed)
    }

    /// Commands that failed while executing
    pub fn faults(&self) -> u64 {
        self.shared.faults.load(Ordering::Relaxed)
    }

    /// `execute_command_lists` calls accepted
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    /// Submissions fully executed by the workers
    pub fn retired_submissions(&self) -> u64 {
        self.shared.retired.load(Ordering::Relaxed)
    }

    /// Creation parameters of a live event
    pub fn event_desc(&self, event: EventHandle) -> Option<EventDesc> {
        self.events.lock().get(&event.id()).map(|e| e.desc)
    }

    /// Creation parameters of a live list
    pub fn list_desc(&self, list: CommandListHandle) -> Option<CommandListDesc> {
        self.lists.lock().get(&list.id()).map(|l| l.desc)
    }

    /// Kinds of the commands recorded in a list
    pub fn recorded_commands(&self, list: CommandListHandle) -> Option<Vec<CommandKind>> {
        self.lists
            .lock()
            .get(&list.id())
            .map(|l| l.commands.iter().map(|c| c.work.kind()).collect())
    }

    /// Current parameters of a mutable launch
    pub fn mutable_launch(&self, list: CommandListHandle, command_id: u64) -> Option<LaunchInfo> {
        self.lists.lock().get(&list.id())?.launch(command_id).cloned()
    }

    /// Advice accumulated on the allocation containing `addr`
    pub fn memory_advice(&self, addr: GpuAddr) -> Option<MemAdvice> {
        self.shared.memory.lock().advice(addr)
    }

    /// Prefetches executed on the allocation containing `addr`
    pub fn prefetch_count(&self, addr: GpuAddr) -> Option<u32> {
        self.shared.memory.lock().prefetches(addr)
    }
}

impl fmt::Debug for SoftDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftDevice")
            .field("props", &self.props)
            .field("queues", &self.queues.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// NATIVE LAYER
// =============================================================================

impl EventOps for SoftDevice {
    fn create_event(&self, desc: &EventDesc) -> Result<EventHandle> {
        let id = self.next_id();
        self.events.lock().insert(id, Arc::new(SoftEvent::new(*desc)));
        Ok(EventHandle::new(id))
    }

    fn destroy_event(&self, event: EventHandle) -> Result<()> {
        self.events
            .lock()
            .remove(&event.id())
            .map(|_| ())
            .ok_or_else(|| self.note_destroy_failure())
    }

    fn host_signal_event(&self, event: EventHandle) -> Result<()> {
        self.event(event)?.signal(KernelTimestamp::default());
        Ok(())
    }

    fn host_reset_event(&self, event: EventHandle) -> Result<()> {
        self.event(event)?.reset();
        Ok(())
    }

    fn query_event_status(&self, event: EventHandle) -> Result<EventStatus> {
        Ok(if self.event(event)?.is_signaled() {
            EventStatus::Complete
        } else {
            EventStatus::Pending
        })
    }

    fn host_synchronize_event(&self, event: EventHandle, timeout_ns: u64) -> Result<()> {
        self.event(event)?.wait(timeout_ns)
    }

    fn event_timestamp(&self, event: EventHandle) -> Result<KernelTimestamp> {
        let event = self.event(event)?;
        if !event.is_signaled() {
            return Err(Error::NotReady);
        }
        Ok(event.timestamp())
    }
}

impl CommandListOps for SoftDevice {
    fn create_command_list(&self, desc: &CommandListDesc) -> Result<CommandListHandle> {
        if desc.mutable && !self.props.supports_mutable_command_lists {
            return Err(Error::UnsupportedFeature);
        }
        if desc.ordering == replay_hal::ListOrdering::InOrder && !self.props.supports_in_order_lists {
            return Err(Error::UnsupportedFeature);
        }
        if desc.engine == EngineKind::Copy && !self.props.has_copy_engine() {
            return Err(Error::UnsupportedFeature);
        }
        let id = self.next_id();
        self.lists.lock().insert(id, SoftList::new(*desc));
        Ok(CommandListHandle::new(id))
    }

    fn close_command_list(&self, list: CommandListHandle) -> Result<()> {
        self.with_list(list, |l| {
            l.closed = true;
            Ok(())
        })
    }

    fn reset_command_list(&self, list: CommandListHandle) -> Result<()> {
        self.with_list(list, |l| {
            l.reset();
            Ok(())
        })
    }

    fn destroy_command_list(&self, list: CommandListHandle) -> Result<()> {
        self.lists
            .lock()
            .remove(&list.id())
            .map(|_| ())
            .ok_or_else(|| self.note_destroy_failure())
    }

    fn append_barrier(&self, list: CommandListHandle, deps: EventDeps<'_>) -> Result<()> {
        self.record(list, Work::Barrier, deps)
    }

    fn append_signal_event(&self, list: CommandListHandle, event: EventHandle) -> Result<()> {
        self.record(list, Work::Signal, EventDeps::new(Some(event), &[]))
    }

    fn append_reset_event(&self, list: CommandListHandle, event: EventHandle) -> Result<()> {
        self.check_events([&event])?;
        self.with_list(list, |l| l.push(Work::Reset(event), EventDeps::none()))
    }

    fn append_wait_on_events(&self, list: CommandListHandle, events: &[EventHandle]) -> Result<()> {
        self.record(list, Work::WaitOnEvents, EventDeps::new(None, events))
    }

    fn append_memory_copy(
        &self,
        list: CommandListHandle,
        dst: GpuAddr,
        src: GpuAddr,
        size: usize,
        deps: EventDeps<'_>,
    ) -> Result<()> {
        if dst.is_null() || src.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        self.record(list, Work::Copy { dst, src, size }, deps)
    }

    fn append_memory_copy_region(
        &self,
        list: CommandListHandle,
        dst: GpuAddr,
        src: GpuAddr,
        region: &CopyRegion,
        deps: EventDeps<'_>,
    ) -> Result<()> {
        if dst.is_null() || src.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        let region = *region;
        self.record(list, Work::CopyRegion { dst, src, region }, deps)
    }

    fn append_memory_fill(
        &self,
        list: CommandListHandle,
        dst: GpuAddr,
        pattern: &[u8],
        size: usize,
        deps: EventDeps<'_>,
    ) -> Result<()> {
        if dst.is_null() {
            return Err(Error::InvalidNullPointer);
        }
        let engine = self.list_desc(list).ok_or(Error::InvalidNullHandle)?.engine;
        if pattern.is_empty() || pattern.len() > self.props.max_fill_pattern_size(engine) {
            return Err(Error::InvalidValue);
        }
        let pattern = pattern.to_vec();
        self.record(list, Work::Fill { dst, pattern, size }, deps)
    }

    fn append_memory_prefetch(&self, list: CommandListHandle, ptr: GpuAddr, size: usize) -> Result<()> {
        self.record(list, Work::Prefetch { ptr, size }, EventDeps::none())
    }

    fn append_mem_advise(
        &self,
        list: CommandListHandle,
        ptr: GpuAddr,
        size: usize,
        advice: MemAdvice,
    ) -> Result<()> {
        self.record(list, Work::Advise { ptr, size, advice }, EventDeps::none())
    }

    fn append_launch_kernel(
        &self,
        list: CommandListHandle,
        kernel: KernelHandle,
        group_count: GroupCount,
        deps: EventDeps<'_>,
    ) -> Result<()> {
        self.check_events(deps.signal.iter().chain(deps.wait))?;
        let (args, group_size, offset) = {
            let kernels = self.kernels.lock();
            let k = kernels.get(&kernel.id()).ok_or(Error::InvalidNullHandle)?;
            (k.args.clone(), k.group_size, k.offset)
        };
        self.with_list(list, |l| {
            let (command_id, flags) = l.take_reserved();
            let info = LaunchInfo {
                kernel,
                command_id,
                args,
                group_size,
                group_count,
                offset,
            };
            l.push(Work::Launch { info, flags }, deps)
        })
    }

    fn append_query_kernel_timestamps(
        &self,
        list: CommandListHandle,
        events: &[EventHandle],
        dst: GpuAddr,
        deps: EventDeps<'_>,
    ) -> Result<()> {
        self.check_events(events)?;
        let events = events.to_vec();
        self.record(list, Work::QueryTimestamps { events, dst }, deps)
    }

    fn next_command_id(&self, list: CommandListHandle, flags: MutableCommandFlags) -> Result<u64> {
        self.with_list(list, |l| l.reserve_command_id(flags))
    }

    fn update_mutable_commands(&self, list: CommandListHandle, mutations: &[Mutation]) -> Result<()> {
        self.with_list(list, |l| l.apply(mutations))
    }
}

impl KernelOps for SoftDevice {
    fn create_kernel(&self, name: &str) -> Result<KernelHandle> {
        let body = self.registry.read().get(name).cloned().ok_or(Error::InvalidValue)?;
        let id = self.next_id();
        self.kernels.lock().insert(id, kernel::SoftKernel::new(name, body));
        Ok(KernelHandle::new(id))
    }

    fn destroy_kernel(&self, kernel: KernelHandle) -> Result<()> {
        self.kernels
            .lock()
            .remove(&kernel.id())
            .map(|_| ())
            .ok_or_else(|| self.note_destroy_failure())
    }

    fn set_kernel_argument(&self, kernel: KernelHandle, index: u32, value: Option<&[u8]>) -> Result<()> {
        let mut kernels = self.kernels.lock();
        let k = kernels.get_mut(&kernel.id()).ok_or(Error::InvalidNullHandle)?;
        k.set_argument(index, value)
    }

    fn set_group_size(&self, kernel: KernelHandle, size: GroupSize) -> Result<()> {
        if size.x == 0 || size.y == 0 || size.z == 0 {
            return Err(Error::InvalidValue);
        }
        let mut kernels = self.kernels.lock();
        kernels.get_mut(&kernel.id()).ok_or(Error::InvalidNullHandle)?.group_size = size;
        Ok(())
    }

    fn set_global_offset(&self, kernel: KernelHandle, offset: [u32; 3]) -> Result<()> {
        if !self.props.supports_global_offset {
            return Err(Error::UnsupportedFeature);
        }
        let mut kernels = self.kernels.lock();
        kernels.get_mut(&kernel.id()).ok_or(Error::InvalidNullHandle)?.offset = offset;
        Ok(())
    }

    fn suggest_group_size(&self, kernel: KernelHandle, global: [u32; 3]) -> Result<GroupSize> {
        if !self.kernels.lock().contains_key(&kernel.id()) {
            return Err(Error::InvalidNullHandle);
        }
        Ok(kernel::suggest_group_size(global))
    }
}

impl QueueOps for SoftDevice {
    fn queue(&self, engine: EngineKind, index: u32) -> Result<QueueHandle> {
        self.queues
            .iter()
            .find(|(_, q)| q.engine == engine && q.index == index)
            .map(|(id, _)| QueueHandle::new(*id))
            .ok_or(Error::InvalidValue)
    }

    fn create_fence(&self, queue: QueueHandle) -> Result<FenceHandle> {
        if !self.queues.contains_key(&queue.id()) {
            return Err(Error::InvalidNullHandle);
        }
        let id = self.next_id();
        self.fences.lock().insert(id, (queue.id(), Arc::new(SoftFence::new())));
        Ok(FenceHandle::new(id))
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        self.fence(fence)?.reset();
        Ok(())
    }

    fn query_fence_status(&self, fence: FenceHandle) -> Result<bool> {
        Ok(self.fence(fence)?.is_signaled())
    }

    fn host_synchronize_fence(&self, fence: FenceHandle, timeout_ns: u64) -> Result<()> {
        self.fence(fence)?.wait(timeout_ns)
    }

    fn destroy_fence(&self, fence: FenceHandle) -> Result<()> {
        self.fences
            .lock()
            .remove(&fence.id())
            .map(|_| ())
            .ok_or_else(|| self.note_destroy_failure())
    }

    fn execute_command_lists(
        &self,
        queue: QueueHandle,
        lists: &[CommandListHandle],
        fence: Option<FenceHandle>,
    ) -> Result<()> {
        let worker = self.queues.get(&queue.id()).ok_or(Error::InvalidNullHandle)?;
        let fence = match fence {
            Some(handle) => {
                let fences = self.fences.lock();
                let (owner, fence) = fences.get(&handle.id()).ok_or(Error::InvalidNullHandle)?;
                if *owner != queue.id() {
                    return Err(Error::InvalidArgument);
                }
                Some(fence.clone())
            }
            None => None,
        };

        let mut commands = Vec::new();
        {
            let recorded = self.lists.lock();
            for handle in lists {
                let list = recorded.get(&handle.id()).ok_or(Error::InvalidNullHandle)?;
                if list.desc.engine != worker.engine {
                    return Err(Error::InvalidArgument);
                }
                self.snapshot(list, &mut commands)?;
            }
        }

        if let Some(fence) = &fence {
            fence.arm();
        }
        let submitted = worker.submit(Submission {
            commands,
            fence: fence.clone(),
        });
        if submitted.is_err() {
            if let Some(fence) = &fence {
                fence.retire();
            }
        }
        submitted?;
        self.submissions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl MemoryOps for SoftDevice {
    fn allocate(&self, kind: MemoryKind, size: usize, alignment: usize) -> Result<GpuAddr> {
        self.shared.memory.lock().allocate(kind, size, alignment)
    }

    fn free(&self, addr: GpuAddr) -> Result<()> {
        self.shared.memory.lock().free(addr)
    }

    fn memory_kind(&self, addr: GpuAddr) -> MemoryKind {
        self.shared.memory.lock().kind(addr)
    }

    fn read_memory(&self, addr: GpuAddr, dst: &mut [u8]) -> Result<()> {
        self.shared.memory.lock().read(addr, dst)
    }

    fn write_memory(&self, addr: GpuAddr, src: &[u8]) -> Result<()> {
        self.shared.memory.lock().write(addr, src)
    }
}

impl NativeDevice for SoftDevice {
    fn properties(&self) -> &DeviceProperties {
        &self.props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_hal::ListOrdering;

    fn compute_list(dev: &SoftDevice) -> CommandListHandle {
        dev.create_command_list(&CommandListDesc::relaxed(EngineKind::Compute))
            .unwrap()
    }

    #[test]
    fn test_fill_copy_executes_in_order() {
        let dev = SoftDevice::builder().build().unwrap();
        let src = dev.allocate(MemoryKind::Device, 16, 16).unwrap();
        let dst = dev.allocate(MemoryKind::Host, 16, 16).unwrap();
        let done = dev.create_event(&EventDesc::default()).unwrap();

        let list = compute_list(&dev);
        dev.append_memory_fill(list, src, &[0xab, 0xcd], 16, EventDeps::none())
            .unwrap();
        dev.append_memory_copy(list, dst, src, 16, EventDeps::new(Some(done), &[]))
            .unwrap();
        dev.close_command_list(list).unwrap();

        let queue = dev.queue(EngineKind::Compute, 0).unwrap();
        dev.execute_command_lists(queue, &[list], None).unwrap();
        dev.host_synchronize_event(done, u64::MAX).unwrap();

        let mut out = [0u8; 16];
        dev.read_memory(dst, &mut out).unwrap();
        assert!(out.chunks(2).all(|c| c == [0xab, 0xcd]));
    }

    #[test]
    fn test_open_list_cannot_execute() {
        let dev = SoftDevice::builder().build().unwrap();
        let list = compute_list(&dev);
        let queue = dev.queue(EngineKind::Compute, 0).unwrap();
        assert_eq!(
            dev.execute_command_lists(queue, &[list], None),
            Err(Error::InvalidOperation)
        );
    }

    #[test]
    fn test_cross_queue_wait() {
        let dev = SoftDevice::builder().build().unwrap();
        let gate = dev.create_event(&EventDesc::default()).unwrap();
        let done = dev.create_event(&EventDesc::default()).unwrap();

        let copy = dev
            .create_command_list(&CommandListDesc::relaxed(EngineKind::Copy))
            .unwrap();
        dev.append_barrier(copy, EventDeps::new(Some(done), &[gate])).unwrap();
        dev.close_command_list(copy).unwrap();
        let copy_queue = dev.queue(EngineKind::Copy, 0).unwrap();
        dev.execute_command_lists(copy_queue, &[copy], None).unwrap();
        assert_eq!(dev.query_event_status(done).unwrap(), EventStatus::Pending);

        dev.host_signal_event(gate).unwrap();
        dev.host_synchronize_event(done, u64::MAX).unwrap();
    }

    #[test]
    fn test_fence_signals_after_submission() {
        let dev = SoftDevice::builder().build().unwrap();
        let queue = dev.queue(EngineKind::Compute, 0).unwrap();
        let fence = dev.create_fence(queue).unwrap();
        let list = compute_list(&dev);
        dev.close_command_list(list).unwrap();
        dev.execute_command_lists(queue, &[list], Some(fence)).unwrap();
        dev.host_synchronize_fence(fence, u64::MAX).unwrap();
        assert!(dev.query_fence_status(fence).unwrap());
        dev.reset_fence(fence).unwrap();
        assert!(!dev.query_fence_status(fence).unwrap());
    }

    #[test]
    fn test_launch_uses_recorded_arguments() {
        let dev = SoftDevice::builder().build().unwrap();
        dev.register_kernel("store", |inv, item| {
            let out = inv.arg_addr(0)?;
            let value = inv.arg_u32(1)?;
            inv.write_u32(out + item.global_id[0] * 4, value)
        });
        let out = dev.allocate(MemoryKind::Device, 16, 16).unwrap();
        let kernel = dev.create_kernel("store").unwrap();
        dev.set_kernel_argument(kernel, 0, Some(out.to_arg_bytes().as_slice())).unwrap();
        dev.set_kernel_argument(kernel, 1, Some(7u32.to_le_bytes().as_slice())).unwrap();
        dev.set_group_size(kernel, GroupSize::new(2, 1, 1)).unwrap();

        let list = compute_list(&dev);
        dev.append_launch_kernel(list, kernel, GroupCount::new(2, 1, 1), EventDeps::none())
            .unwrap();
        dev.close_command_list(list).unwrap();
        // Changes after recording do not affect the recorded launch.
        dev.set_kernel_argument(kernel, 1, Some(9u32.to_le_bytes().as_slice())).unwrap();

        let queue = dev.queue(EngineKind::Compute, 0).unwrap();
        let fence = dev.create_fence(queue).unwrap();
        dev.execute_command_lists(queue, &[list], Some(fence)).unwrap();
        dev.host_synchronize_fence(fence, u64::MAX).unwrap();

        let mut raw = [0u8; 16];
        dev.read_memory(out, &mut raw).unwrap();
        assert!(raw.chunks(4).all(|c| c == 7u32.to_le_bytes()));
        assert_eq!(dev.faults(), 0);
    }

    #[test]
    fn test_capability_checks_on_list_creation() {
        let dev = SoftDevice::builder()
            .copy_engine(false)
            .mutable_command_lists(false)
            .in_order_lists(false)
            .build()
            .unwrap();
        let mutable = CommandListDesc {
            engine: EngineKind::Compute,
            ordering: ListOrdering::Relaxed,
            mutable: true,
        };
        let in_order = CommandListDesc {
            engine: EngineKind::Compute,
            ordering: ListOrdering::InOrder,
            mutable: false,
        };
        assert_eq!(dev.create_command_list(&mutable), Err(Error::UnsupportedFeature));
        assert_eq!(dev.create_command_list(&in_order), Err(Error::UnsupportedFeature));
        assert_eq!(
            dev.create_command_list(&CommandListDesc::relaxed(EngineKind::Copy)),
            Err(Error::UnsupportedFeature)
        );
        assert_eq!(dev.queue(EngineKind::Copy, 0), Err(Error::InvalidValue));
    }

    #[test]
    fn test_double_destroy_is_counted() {
        let dev = SoftDevice::builder().build().unwrap();
        let event = dev.create_event(&EventDesc::default()).unwrap();
        dev.destroy_event(event).unwrap();
        assert_eq!(dev.destroy_event(event), Err(Error::InvalidNullHandle));
        assert_eq!(dev.destroy_failures(), 1);
        assert_eq!(dev.live_events(), 0);
    }
}
