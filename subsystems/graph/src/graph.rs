//! # Command Graphs
//!
//! A command graph owns three native command lists and three lifecycle
//! events:
//!
//! ```text
//!   reset list    reset(signal) ─ reset(sp events...) ─ signal(all-reset)
//!   compute list  barrier(wait, all-reset) ─ commands... ─ barrier(sp events) → signal
//!   copy list     barrier(wait, all-reset) ─ copy commands...
//! ```
//!
//! - *wait* is signaled once a submission's external dependencies are met
//! - *all-reset* is signaled once every sync-point event has been reset
//! - *signal* is signaled once every recorded command has completed
//!
//! Keeping the resets on their own list lets them run ahead of, and apart
//! from, the work that depends on the events being reset.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use replay_core::{Context, Device, EngineConfig, Event, Kernel};
use replay_hal::{
    CommandListDesc, CommandListHandle, EngineKind, Error, EventDeps, ListOrdering, NativeDevice, QueueHandle, Result,
};

use crate::engine::EngineSelector;
use crate::fence::FenceTable;
use crate::sync_point::SyncPointRegistry;

// =============================================================================
// DESCRIPTOR
// =============================================================================

/// Graph creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphDesc {
    /// Record onto in-order lists and skip sync-point bookkeeping
    pub in_order: bool,
    /// Allow kernel launches to be updated after finalization
    pub updatable: bool,
    /// Capture per-command timestamps when submitted to a profiling queue
    pub enable_profiling: bool,
}

// =============================================================================
// STATE
// =============================================================================

/// Most recent submission of a graph
#[derive(Debug)]
pub(crate) struct LastSubmission {
    /// Physical compute queue it ran on
    pub(crate) queue: QueueHandle,
    /// Signaled once its signal list has executed
    pub(crate) done: Arc<Event>,
}

/// Graph bookkeeping guarded by the graph lock
#[derive(Debug)]
pub struct GraphState {
    pub(crate) finalized: bool,
    pub(crate) copy_list_empty: bool,
    pub(crate) sync_points: SyncPointRegistry,
    pub(crate) fences: FenceTable,
    pub(crate) kernels: Vec<Arc<Kernel>>,
    pub(crate) wait_deps: Vec<Arc<Event>>,
    pub(crate) last_submission: Option<LastSubmission>,
}

impl GraphState {
    fn new() -> Self {
        Self {
            finalized: false,
            copy_list_empty: true,
            sync_points: SyncPointRegistry::new(),
            fences: FenceTable::new(),
            kernels: Vec::new(),
            wait_deps: Vec::new(),
            last_submission: None,
        }
    }

    /// Finalized already
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Nothing has been recorded on the copy list
    #[inline]
    pub fn copy_list_empty(&self) -> bool {
        self.copy_list_empty
    }

    /// Sync points handed out so far
    #[inline]
    pub fn sync_points(&self) -> &SyncPointRegistry {
        &self.sync_points
    }

    /// Fences created for submissions
    #[inline]
    pub fn fences(&self) -> &FenceTable {
        &self.fences
    }

    /// Kernels referenced by recorded launches, one entry per launch
    #[inline]
    pub fn kernels(&self) -> &[Arc<Kernel>] {
        &self.kernels
    }

    /// External dependencies merged into the wait event so far
    #[inline]
    pub fn wait_dependencies(&self) -> &[Arc<Event>] {
        &self.wait_deps
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// A recorded, replayable graph of device commands
pub struct CommandGraph {
    context: Arc<Context>,
    device: Arc<Device>,
    selector: EngineSelector,
    in_order: bool,
    updatable: bool,
    profiling: bool,
    pub(crate) compute_list: CommandListHandle,
    pub(crate) copy_list: Option<CommandListHandle>,
    pub(crate) reset_list: CommandListHandle,
    pub(crate) signal_event: Arc<Event>,
    pub(crate) wait_event: Arc<Event>,
    pub(crate) all_reset_event: Arc<Event>,
    state: spin::Mutex<GraphState>,
}

impl CommandGraph {
    /// Create an empty graph
    ///
    /// An in-order request is downgraded when the device has no in-order
    /// lists. An updatable graph needs mutable command-list support.
    pub fn create(
        context: &Arc<Context>,
        device: &Arc<Device>,
        desc: &GraphDesc,
        config: EngineConfig,
    ) -> Result<Arc<Self>> {
        let props = *device.properties();
        let in_order = desc.in_order && props.supports_in_order_lists;
        if desc.in_order && !in_order {
            log::debug!("in-order lists unsupported, recording a relaxed graph");
        }
        if desc.updatable && !props.supports_mutable_command_lists {
            log::warn!("updatable graph requested on a device without mutable command lists");
            return Err(Error::UnsupportedFeature);
        }
        let profiling = desc.enable_profiling;

        let signal_event = context.create_event(false, profiling)?;
        let wait_event = context.create_event(false, profiling)?;
        let all_reset_event = context.create_event(false, profiling)?;
        let preconditions = [wait_event.native(), all_reset_event.native()];

        let native = device.native();
        let compute_desc = CommandListDesc {
            engine: EngineKind::Compute,
            ordering: if in_order {
                ListOrdering::InOrder
            } else {
                ListOrdering::Relaxed
            },
            mutable: desc.updatable,
        };
        let compute_list = create_list(native, &compute_desc, |list| {
            native.append_barrier(list, EventDeps::new(None, &preconditions))
        })?;

        let reset_desc = CommandListDesc::relaxed(EngineKind::Compute);
        let reset_list = match create_list(native, &reset_desc, |list| {
            native.append_reset_event(list, signal_event.native())
        }) {
            Ok(list) => list,
            Err(e) => {
                destroy_lists(native, &[compute_list]);
                return Err(e);
            }
        };

        let copy_list = if device.has_copy_engine() {
            let copy_desc = CommandListDesc::relaxed(EngineKind::Copy);
            match create_list(native, &copy_desc, |list| {
                native.append_barrier(list, EventDeps::new(None, &preconditions))
            }) {
                Ok(list) => Some(list),
                Err(e) => {
                    destroy_lists(native, &[compute_list, reset_list]);
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::debug!(
            "graph created: in_order={} updatable={} profiling={} copy_list={}",
            in_order,
            desc.updatable,
            profiling,
            copy_list.is_some()
        );

        Ok(Arc::new(Self {
            context: context.clone(),
            device: device.clone(),
            selector: EngineSelector::new(&props, config, in_order),
            in_order,
            updatable: desc.updatable,
            profiling,
            compute_list,
            copy_list,
            reset_list,
            signal_event,
            wait_event,
            all_reset_event,
            state: spin::Mutex::new(GraphState::new()),
        }))
    }

    /// Owning context
    #[inline]
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Device the graph records for
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Recorded onto in-order lists
    #[inline]
    pub fn is_in_order(&self) -> bool {
        self.in_order
    }

    /// Launches can be updated after finalization
    #[inline]
    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    /// Per-command timestamps requested
    #[inline]
    pub fn is_profiling_enabled(&self) -> bool {
        self.profiling
    }

    /// Engine policy in effect
    #[inline]
    pub fn selector(&self) -> &EngineSelector {
        &self.selector
    }

    /// Native compute list
    #[inline]
    pub fn compute_list(&self) -> CommandListHandle {
        self.compute_list
    }

    /// Native copy list, when the device has a copy engine
    #[inline]
    pub fn copy_list(&self) -> Option<CommandListHandle> {
        self.copy_list
    }

    /// Native reset list
    #[inline]
    pub fn reset_list(&self) -> CommandListHandle {
        self.reset_list
    }

    /// Finalized already
    pub fn is_finalized(&self) -> bool {
        self.state.lock().finalized
    }

    /// No submission of this graph is executing
    pub fn is_idle(&self) -> Result<bool> {
        self.state.lock().fences.is_idle(self.device.native())
    }

    /// Strong references held on the graph, command handles included
    pub fn reference_count(self: &Arc<Self>) -> u32 {
        u32::try_from(Arc::strong_count(self)).unwrap_or(u32::MAX)
    }

    /// Graph lock
    #[inline]
    pub(crate) fn lock(&self) -> spin::MutexGuard<'_, GraphState> {
        self.state.lock()
    }

    /// Native list for `engine`
    pub(crate) fn list_for(&self, engine: EngineKind) -> CommandListHandle {
        match (engine, self.copy_list) {
            (EngineKind::Copy, Some(list)) => list,
            _ => self.compute_list,
        }
    }
}

fn create_list<F>(native: &dyn NativeDevice, desc: &CommandListDesc, prologue: F) -> Result<CommandListHandle>
where
    F: FnOnce(CommandListHandle) -> Result<()>,
{
    let list = native.create_command_list(desc)?;
    if let Err(e) = prologue(list) {
        destroy_lists(native, &[list]);
        return Err(e);
    }
    Ok(list)
}

fn destroy_lists(native: &dyn NativeDevice, lists: &[CommandListHandle]) {
    for &list in lists {
        if let Err(e) = native.destroy_command_list(list) {
            log::error!("failed to destroy command list {:?}: {}", list, e);
        }
    }
}

impl Drop for CommandGraph {
    fn drop(&mut self) {
        let device = &self.device;
        let native = device.native();
        let state = self.state.get_mut();

        if let Err(e) = state.fences.wait_active(native) {
            log::warn!("graph fence did not settle before release: {}", e);
        }
        if let Some(last) = state.last_submission.take() {
            if let Err(e) = last.done.wait() {
                log::warn!("graph signal list did not settle before release: {}", e);
            }
        }

        destroy_lists(native, &[self.compute_list, self.reset_list]);
        if let Some(copy) = self.copy_list {
            destroy_lists(native, &[copy]);
        }
        state.fences.destroy(native);

        for kernel in state.kernels.drain(..) {
            kernel.lock().release_submission(device);
        }
        log::trace!("graph released {} sync points", state.sync_points.len());
    }
}

impl fmt::Debug for CommandGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandGraph")
            .field("in_order", &self.in_order)
            .field("updatable", &self.updatable)
            .field("profiling", &self.profiling)
            .field("compute_list", &self.compute_list)
            .field("copy_list", &self.copy_list)
            .field("reset_list", &self.reset_list)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use replay_hal::MutableCommandFlags;
    use replay_soft::{CommandKind, SoftDevice};

    #[test]
    fn test_create_records_prologues() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc::default());
        let soft = &fx.soft;

        assert_eq!(
            soft.recorded_commands(graph.compute_list()).unwrap(),
            [CommandKind::Barrier]
        );
        assert_eq!(
            soft.recorded_commands(graph.reset_list()).unwrap(),
            [CommandKind::Reset]
        );
        let copy = graph.copy_list().unwrap();
        assert_eq!(soft.recorded_commands(copy).unwrap(), [CommandKind::Barrier]);
        assert!(graph.lock().copy_list_empty());
        assert!(graph.is_idle().unwrap());
        assert_eq!(graph.reference_count(), 1);
    }

    #[test]
    fn test_in_order_downgraded_without_support() {
        let fx = Fixture::with(SoftDevice::builder().in_order_lists(false));
        let graph = fx.graph(GraphDesc {
            in_order: true,
            ..GraphDesc::default()
        });
        assert!(!graph.is_in_order());
        let desc = fx.soft.list_desc(graph.compute_list()).unwrap();
        assert_eq!(desc.ordering, ListOrdering::Relaxed);
    }

    #[test]
    fn test_in_order_graph_never_uses_copy_engine() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc {
            in_order: true,
            ..GraphDesc::default()
        });
        assert!(graph.is_in_order());
        assert!(!graph.selector().copy_available());
        assert_eq!(
            fx.soft.list_desc(graph.compute_list()).unwrap().ordering,
            ListOrdering::InOrder
        );
    }

    #[test]
    fn test_updatable_needs_mutable_lists() {
        let fx = Fixture::with(SoftDevice::builder().mutable_command_lists(false));
        let desc = GraphDesc {
            updatable: true,
            ..GraphDesc::default()
        };
        let err = CommandGraph::create(&fx.context, &fx.device, &desc, EngineConfig::default()).unwrap_err();
        assert_eq!(err, Error::UnsupportedFeature);
        assert_eq!(fx.soft.live_command_lists(), 0);
    }

    #[test]
    fn test_updatable_graph_has_mutable_compute_list() {
        let fx = Fixture::with(SoftDevice::builder().mutable_command_flags(MutableCommandFlags::all()));
        let graph = fx.graph(GraphDesc {
            updatable: true,
            ..GraphDesc::default()
        });
        assert!(fx.soft.list_desc(graph.compute_list()).unwrap().mutable);
        assert!(!fx.soft.list_desc(graph.reset_list()).unwrap().mutable);
    }

    #[test]
    fn test_release_destroys_everything_once() {
        let fx = Fixture::with(SoftDevice::builder().copy_engine(false));
        let events = fx.soft.live_events();
        let graph = fx.graph(GraphDesc::default());
        assert!(graph.copy_list().is_none());
        assert_eq!(fx.soft.live_command_lists(), 2);
        assert_eq!(fx.soft.live_events(), events + 3);

        drop(graph);
        assert_eq!(fx.soft.live_command_lists(), 0);
        assert_eq!(fx.soft.live_events(), events);
        assert_eq!(fx.soft.destroy_failures(), 0);
    }
}
