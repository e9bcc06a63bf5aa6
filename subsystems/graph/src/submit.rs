//! # Submission
//!
//! One enqueue of a finalized graph executes, on a physical compute queue:
//!
//! ```text
//!   [wait list]    barrier(deps) → wait          (or a host signal of wait)
//!   reset list     reset(signal, sp events) → all-reset
//!   compute list   barrier(wait, all-reset) ... → signal        + fence
//!   [signal list]  reset(wait, all-reset), barrier(signal) → done
//! ```
//!
//! and, when anything was recorded on it, the copy list on a physical copy
//! queue. The bracketed lists are auxiliary lists drawn from the queue's
//! pool.
//!
//! While an earlier submission of the same graph is still running, the new
//! one stays on that submission's physical compute queue, so the queue's
//! own ordering keeps the two apart. The copy list cannot rely on that and
//! is gated behind the earlier submission's `done` event instead; until the
//! earlier signal list has run, *wait* and *all-reset* still carry their old
//! signaled state.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use replay_core::{Event, Queue, QueueState};
use replay_hal::{
    CommandListHandle, EngineKind, Error, EventDeps, EventHandle, KernelTimestamp, MemoryKind, NativeDevice,
    QueueHandle, Result,
};

use crate::graph::{CommandGraph, GraphState, LastSubmission};
use crate::lock::{self, SubmitGuard};

impl CommandGraph {
    /// Submit the graph to `queue` after every event in `wait_events`
    ///
    /// Returns an event signaled once the submission has completed when
    /// `want_event` is set. Never blocks on the device.
    pub fn enqueue(&self, queue: &Queue, wait_events: &[Arc<Event>], want_event: bool) -> Result<Option<Arc<Event>>> {
        let SubmitGuard {
            queue: mut queue_state,
            graph: mut state,
        } = lock::lock_submit(queue, self);
        if !state.finalized {
            return Err(Error::InvalidOperation);
        }
        let native = self.device().native();

        let previous = match &state.last_submission {
            Some(last) if !last.done.is_complete()? => Some((last.queue, last.done.clone())),
            _ => None,
        };
        let compute = match &previous {
            Some((queue, _)) => *queue,
            None => queue.compute_queue(),
        };

        self.signal_wait_event(&mut queue_state, &mut state, native, compute, wait_events, previous.is_some())?;

        let fence = state.fences.acquire(native, compute)?;
        let executed = native
            .execute_command_lists(compute, &[self.reset_list], None)
            .and_then(|()| native.execute_command_lists(compute, &[self.compute_list], Some(fence)));
        if let Err(e) = executed {
            state.fences.deactivate();
            return Err(e);
        }

        if let (false, Some(copy_list)) = (state.copy_list_empty, self.copy_list) {
            let copy = queue.copy_queue().ok_or(Error::UnsupportedFeature)?;
            if let Some((_, done)) = &previous {
                let gate = queue_state.acquire_list(native, copy, EngineKind::Copy)?;
                let waits = [done.native()];
                if let Err(e) = native.append_barrier(gate, EventDeps::new(None, &waits)) {
                    discard(&mut queue_state, native, gate);
                    return Err(e);
                }
                queue_state.submit_list(native, gate, vec![done.clone()])?;
            }
            native.execute_command_lists(copy, &[copy_list], None)?;
        }

        let signal_list = queue_state.acquire_list(native, compute, EngineKind::Compute)?;
        let done = match self.record_signal_list(queue, &state, native, signal_list, want_event) {
            Ok(done) => done,
            Err(e) => {
                discard(&mut queue_state, native, signal_list);
                return Err(e);
            }
        };
        let keep_alive = vec![
            self.wait_event.clone(),
            self.all_reset_event.clone(),
            self.signal_event.clone(),
            done.clone(),
        ];
        queue_state.submit_list(native, signal_list, keep_alive)?;

        state.last_submission = Some(LastSubmission {
            queue: compute,
            done: done.clone(),
        });
        log::trace!(
            "graph submitted to {:?} after {} external dependencies",
            compute,
            wait_events.len()
        );
        Ok(want_event.then_some(done))
    }

    /// Arrange for *wait* to be signaled once the submission may start
    fn signal_wait_event(
        &self,
        queue_state: &mut QueueState,
        state: &mut GraphState,
        native: &dyn NativeDevice,
        compute: QueueHandle,
        wait_events: &[Arc<Event>],
        previous_pending: bool,
    ) -> Result<()> {
        let mut pruned = Vec::new();
        pruned.try_reserve(state.wait_deps.len() + wait_events.len())?;
        for dep in &state.wait_deps {
            if !dep.is_complete()? {
                pruned.push(dep.clone());
            }
        }
        for event in wait_events {
            if !pruned.iter().any(|dep| Arc::ptr_eq(dep, event)) {
                pruned.push(event.clone());
            }
        }
        state.wait_deps = pruned;

        if wait_events.is_empty() && !previous_pending {
            return self.wait_event.host_signal();
        }

        let deps: Vec<EventHandle> = state.wait_deps.iter().map(|dep| dep.native()).collect();
        let list = queue_state.acquire_list(native, compute, EngineKind::Compute)?;
        if let Err(e) = native.append_barrier(list, EventDeps::new(Some(self.wait_event.native()), &deps)) {
            discard(queue_state, native, list);
            return Err(e);
        }
        let mut keep_alive = Vec::new();
        keep_alive.try_reserve(state.wait_deps.len() + 1)?;
        keep_alive.extend(state.wait_deps.iter().cloned());
        keep_alive.push(self.wait_event.clone());
        queue_state.submit_list(native, list, keep_alive)
    }

    /// Record the tail list that resets *wait* and *all-reset* and signals `done`
    fn record_signal_list(
        &self,
        queue: &Queue,
        state: &GraphState,
        native: &dyn NativeDevice,
        list: CommandListHandle,
        want_event: bool,
    ) -> Result<Arc<Event>> {
        native.append_reset_event(list, self.wait_event.native())?;
        native.append_reset_event(list, self.all_reset_event.native())?;

        let context = self.context();
        let signal = [self.signal_event.native()];
        if !want_event {
            let done = context.create_event(false, false)?;
            native.append_barrier(list, EventDeps::new(Some(done.native()), &signal))?;
            return Ok(done);
        }

        let done = context.create_event(true, queue.profiling_enabled())?;
        if queue.profiling_enabled() && self.is_profiling_enabled() && !self.is_in_order() {
            let tracked = state.sync_points.tracked();
            let slots = tracked.len().max(1);
            let size = slots.checked_mul(KernelTimestamp::SIZE).ok_or(Error::OutOfHostMemory)?;
            let buffer = context.usm_alloc(MemoryKind::Host, size)?;
            done.attach_timestamps(buffer, tracked.len());
            native.append_query_kernel_timestamps(list, tracked, buffer, EventDeps::new(Some(done.native()), &signal))?;
        } else {
            native.append_barrier(list, EventDeps::new(Some(done.native()), &signal))?;
        }
        Ok(done)
    }
}

fn discard(queue_state: &mut QueueState, native: &dyn NativeDevice, list: CommandListHandle) {
    if let Err(e) = queue_state.discard_list(native, list) {
        log::error!("failed to return auxiliary list {:?}: {}", list, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphDesc;
    use crate::recorder::LaunchDesc;
    use crate::testing::Fixture;
    use replay_core::QueueDesc;
    use replay_soft::SoftDevice;

    #[test]
    fn test_enqueue_requires_finalize() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc::default());
        assert_eq!(graph.enqueue(&fx.queue, &[], true).unwrap_err(), Error::InvalidOperation);
    }

    #[test]
    fn test_empty_graph_completes() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc::default());
        graph.finalize().unwrap();
        let done = graph.enqueue(&fx.queue, &[], true).unwrap().unwrap();
        done.wait().unwrap();
        assert!(graph.is_idle().unwrap());
        assert_eq!(graph.enqueue(&fx.queue, &[], false).unwrap().map(|_| ()), None);
    }

    #[test]
    fn test_external_dependency_gates_execution() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc::default());
        let (counter, _) = fx.counter_launch(&graph, 1);
        graph.finalize().unwrap();

        let gate = fx.context.create_event(true, false).unwrap();
        let done = graph.enqueue(&fx.queue, &[gate.clone()], true).unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!done.is_complete().unwrap());
        assert_eq!(fx.read_u32(counter), 0);
        assert_eq!(graph.lock().wait_dependencies().len(), 1);

        gate.host_signal().unwrap();
        done.wait().unwrap();
        assert_eq!(fx.read_u32(counter), 1);
    }

    #[test]
    fn test_completed_dependencies_are_pruned() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc::default());
        graph.finalize().unwrap();

        let first = fx.context.create_event(true, false).unwrap();
        first.host_signal().unwrap();
        let done = graph.enqueue(&fx.queue, &[first.clone(), first.clone()], true).unwrap().unwrap();
        done.wait().unwrap();
        assert_eq!(graph.lock().wait_dependencies().len(), 1);

        let second = fx.context.create_event(true, false).unwrap();
        second.host_signal().unwrap();
        graph.enqueue(&fx.queue, &[second], true).unwrap().unwrap().wait().unwrap();
        let state = graph.lock();
        assert_eq!(state.wait_dependencies().len(), 1);
        assert!(!Arc::ptr_eq(&state.wait_dependencies()[0], &first));
    }

    #[test]
    fn test_copy_list_runs_on_copy_queue() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc::default());
        let host = fx.context.usm_alloc(MemoryKind::Host, 16).unwrap();
        let dev = fx.context.usm_alloc(MemoryKind::Device, 16).unwrap();
        fx.context.write(host, &[9u8; 16]).unwrap();
        graph.append_usm_memcpy(dev, host, 16, &[]).unwrap();
        graph.finalize().unwrap();
        assert!(!graph.lock().copy_list_empty());

        graph.enqueue(&fx.queue, &[], true).unwrap().unwrap().wait().unwrap();
        let mut out = [0u8; 16];
        fx.context.read(dev, &mut out).unwrap();
        assert_eq!(out, [9u8; 16]);
    }

    #[test]
    fn test_profiling_captures_one_timestamp_per_command() {
        let fx = Fixture::new();
        let queue = Queue::new(fx.context.clone(), QueueDesc { profiling: true }).unwrap();
        let graph = fx.graph(GraphDesc {
            enable_profiling: true,
            ..GraphDesc::default()
        });
        let (_, sp) = fx.counter_launch(&graph, 1);
        let ptr = fx.context.usm_alloc(MemoryKind::Device, 16).unwrap();
        graph.append_usm_fill(ptr, &[1], 16, &[sp.unwrap()]).unwrap();
        graph.finalize().unwrap();

        let done = graph.enqueue(&queue, &[], true).unwrap().unwrap();
        done.wait().unwrap();
        let stamps = done.command_timestamps().unwrap().unwrap();
        assert_eq!(stamps.len(), 2);
        assert!(stamps.iter().all(|ts| ts.end >= ts.start));

        let plain = graph.enqueue(&fx.queue, &[], true).unwrap().unwrap();
        plain.wait().unwrap();
        assert_eq!(plain.command_timestamps().unwrap(), None);
    }

    #[test]
    fn test_back_to_back_submissions_all_run() {
        let fx = Fixture::with(SoftDevice::builder().compute_queues(2));
        let graph = fx.graph(GraphDesc::default());
        let (counter, _) = fx.counter_launch(&graph, 4);
        graph.finalize().unwrap();

        let mut events = Vec::new();
        for _ in 0..5 {
            events.push(graph.enqueue(&fx.queue, &[], true).unwrap().unwrap());
        }
        for event in &events {
            event.wait().unwrap();
        }
        fx.queue.finish().unwrap();
        assert_eq!(fx.read_u32(counter), 20);
        assert!(graph.is_idle().unwrap());
    }

    #[test]
    fn test_graph_release_waits_for_submission() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc::default());
        let kernel = fx.kernel("slow_store");
        let out = fx.context.usm_alloc(MemoryKind::Device, 4).unwrap();
        kernel.set_arg_pointer(0, out).unwrap();
        graph.append_kernel_launch(&kernel, &LaunchDesc::linear(1), &[]).unwrap();
        graph.finalize().unwrap();

        graph.enqueue(&fx.queue, &[], false).unwrap();
        drop(graph);
        assert_eq!(fx.read_u32(out), 1);
        assert_eq!(fx.soft.destroy_failures(), 0);
    }
}
