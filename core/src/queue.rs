//! # Queues
//!
//! A queue fronts the device's physical engine queues. Submissions are
//! spread over physical queues round-robin. Short-lived auxiliary command
//! lists are drawn from a per-queue pool and recycled once the fence they
//! were submitted with has signaled.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use replay_hal::{
    CommandListDesc, CommandListHandle, EngineKind, Error, FenceHandle, NativeDevice, QueueHandle, Result,
};

use crate::context::Context;
use crate::event::Event;

/// Queue creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueDesc {
    /// Collect per-command timestamps for graph submissions
    pub profiling: bool,
}

/// An auxiliary list bound to one physical queue
#[derive(Debug)]
struct AuxList {
    queue: QueueHandle,
    list: CommandListHandle,
    fence: FenceHandle,
    keep_alive: Vec<Arc<Event>>,
}

/// State guarded by the queue lock
#[derive(Debug, Default)]
pub struct QueueState {
    free: Vec<AuxList>,
    acquired: Vec<AuxList>,
    in_flight: Vec<AuxList>,
}

impl QueueState {
    /// Take an open auxiliary list for `queue`, whose physical engine is `engine`
    pub fn acquire_list(
        &mut self,
        native: &dyn NativeDevice,
        queue: QueueHandle,
        engine: EngineKind,
    ) -> Result<CommandListHandle> {
        self.reclaim(native)?;
        self.acquired.try_reserve(1)?;
        if let Some(pos) = self.free.iter().position(|aux| aux.queue == queue) {
            let aux = self.free.swap_remove(pos);
            let list = aux.list;
            self.acquired.push(aux);
            return Ok(list);
        }

        let list = native.create_command_list(&CommandListDesc::relaxed(engine))?;
        let fence = match native.create_fence(queue) {
            Ok(fence) => fence,
            Err(e) => {
                if let Err(destroy) = native.destroy_command_list(list) {
                    log::error!("failed to destroy auxiliary list {:?}: {}", list, destroy);
                }
                return Err(e);
            }
        };
        self.acquired.push(AuxList {
            queue,
            list,
            fence,
            keep_alive: Vec::new(),
        });
        Ok(list)
    }

    /// Close and execute an acquired list
    ///
    /// `keep_alive` events stay referenced until the list has executed.
    pub fn submit_list(
        &mut self,
        native: &dyn NativeDevice,
        list: CommandListHandle,
        keep_alive: Vec<Arc<Event>>,
    ) -> Result<()> {
        let mut aux = self.take_acquired(list)?;
        aux.keep_alive = keep_alive;

        let submitted = native
            .close_command_list(aux.list)
            .and_then(|()| native.execute_command_lists(aux.queue, &[aux.list], Some(aux.fence)));
        match submitted {
            Ok(()) => {
                self.in_flight.try_reserve(1)?;
                self.in_flight.push(aux);
                Ok(())
            }
            Err(e) => {
                Self::destroy(native, aux);
                Err(e)
            }
        }
    }

    /// Return an acquired list without executing it
    pub fn discard_list(&mut self, native: &dyn NativeDevice, list: CommandListHandle) -> Result<()> {
        let aux = self.take_acquired(list)?;
        match native.reset_command_list(aux.list) {
            Ok(()) => {
                self.free.try_reserve(1)?;
                self.free.push(aux);
                Ok(())
            }
            Err(e) => {
                Self::destroy(native, aux);
                Err(e)
            }
        }
    }

    /// Block until every submitted auxiliary list has executed
    pub fn synchronize(&mut self, native: &dyn NativeDevice) -> Result<()> {
        for aux in &self.in_flight {
            native.host_synchronize_fence(aux.fence, u64::MAX)?;
        }
        self.reclaim(native)
    }

    /// Submitted lists not yet recycled
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Lists ready for reuse
    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    fn take_acquired(&mut self, list: CommandListHandle) -> Result<AuxList> {
        let pos = self
            .acquired
            .iter()
            .position(|aux| aux.list == list)
            .ok_or(Error::InvalidNullHandle)?;
        Ok(self.acquired.swap_remove(pos))
    }

    fn reclaim(&mut self, native: &dyn NativeDevice) -> Result<()> {
        let mut i = 0;
        while i < self.in_flight.len() {
            if native.query_fence_status(self.in_flight[i].fence)? {
                let mut aux = self.in_flight.swap_remove(i);
                aux.keep_alive.clear();
                native.reset_command_list(aux.list)?;
                native.reset_fence(aux.fence)?;
                self.free.try_reserve(1)?;
                self.free.push(aux);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    fn destroy(native: &dyn NativeDevice, aux: AuxList) {
        if let Err(e) = native.destroy_command_list(aux.list) {
            log::error!("failed to destroy auxiliary list {:?}: {}", aux.list, e);
        }
        if let Err(e) = native.destroy_fence(aux.fence) {
            log::error!("failed to destroy auxiliary fence {:?}: {}", aux.fence, e);
        }
    }
}

/// A submission queue
pub struct Queue {
    context: Arc<Context>,
    desc: QueueDesc,
    compute: Vec<QueueHandle>,
    copy: Vec<QueueHandle>,
    next_compute: AtomicUsize,
    next_copy: AtomicUsize,
    state: spin::Mutex<QueueState>,
}

impl Queue {
    /// Create a queue over every physical queue of the device
    pub fn new(context: Arc<Context>, desc: QueueDesc) -> Result<Arc<Self>> {
        let device = context.device().clone();
        let props = device.properties();
        let native = device.native();

        let compute = (0..props.compute_queue_count)
            .map(|i| native.queue(EngineKind::Compute, i))
            .collect::<Result<Vec<_>>>()?;
        if compute.is_empty() {
            return Err(Error::InvalidValue);
        }
        let copy = (0..props.copy_queue_count)
            .map(|i| native.queue(EngineKind::Copy, i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Arc::new(Self {
            context,
            desc,
            compute,
            copy,
            next_compute: AtomicUsize::new(0),
            next_copy: AtomicUsize::new(0),
            state: spin::Mutex::new(QueueState::default()),
        }))
    }

    /// Owning context
    #[inline]
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Per-command timestamps requested
    #[inline]
    pub fn profiling_enabled(&self) -> bool {
        self.desc.profiling
    }

    /// Queue lock
    #[inline]
    pub fn lock(&self) -> spin::MutexGuard<'_, QueueState> {
        self.state.lock()
    }

    /// Next physical compute queue
    pub fn compute_queue(&self) -> QueueHandle {
        let i = self.next_compute.fetch_add(1, Ordering::Relaxed) % self.compute.len();
        self.compute[i]
    }

    /// Next physical copy queue, if the device has a copy engine
    pub fn copy_queue(&self) -> Option<QueueHandle> {
        if self.copy.is_empty() {
            return None;
        }
        let i = self.next_copy.fetch_add(1, Ordering::Relaxed) % self.copy.len();
        Some(self.copy[i])
    }

    /// Block until every auxiliary submission made through this queue has executed
    pub fn finish(&self) -> Result<()> {
        let native = self.context.device().native();
        self.state.lock().synchronize(native)
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        let device = self.context.device().clone();
        let native = device.native();
        let state = self.state.get_mut();
        for aux in state.in_flight.drain(..) {
            if let Err(e) = native.host_synchronize_fence(aux.fence, u64::MAX) {
                log::warn!("auxiliary fence {:?} did not settle: {}", aux.fence, e);
            }
            QueueState::destroy(native, aux);
        }
        for aux in state.free.drain(..).chain(state.acquired.drain(..)) {
            QueueState::destroy(native, aux);
        }
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("profiling", &self.desc.profiling)
            .field("compute", &self.compute)
            .field("copy", &self.copy)
            .finish_non_exhaustive()
    }
}
