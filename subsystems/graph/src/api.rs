//! # Public Entry Points
//!
//! Flat functions over the graph engine that report failures as
//! [`ResultCode`]s. Retain and release are `Arc` clone and drop; the last
//! release of a graph tears it down.

use alloc::sync::Arc;

use replay_core::{Buffer, Context, Device, EngineConfig, Event, Kernel, Queue};
use replay_hal::{Error, GpuAddr, Result, ResultCode};

use crate::command::CommandHandle;
use crate::graph::{CommandGraph, GraphDesc};
use crate::recorder::{BufferRect, LaunchDesc, LaunchOutcome, RectCopy, UsmAdvice};
use crate::sync_point::SyncPoint;
use crate::update::UpdateKernelLaunchDesc;

/// Result of an entry point
pub type ApiResult<T> = core::result::Result<T, ResultCode>;

/// Queryable command-graph properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphInfo {
    /// Strong references held on the graph
    ReferenceCount,
}

/// Queryable command properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandInfo {
    /// Strong references held on the command
    ReferenceCount,
}

#[inline]
fn code<T>(result: Result<T>) -> ApiResult<T> {
    result.map_err(|e| {
        log::debug!("entry point failed: {}", e);
        Error::code(e)
    })
}

fn engine_config() -> EngineConfig {
    #[cfg(feature = "std")]
    {
        EngineConfig::from_env()
    }
    #[cfg(not(feature = "std"))]
    {
        EngineConfig::default()
    }
}

// =============================================================================
// LIFETIME
// =============================================================================

/// Create a command graph, reading engine switches from the environment when available
pub fn command_graph_create(
    context: &Arc<Context>,
    device: &Arc<Device>,
    desc: &GraphDesc,
) -> ApiResult<Arc<CommandGraph>> {
    code(CommandGraph::create(context, device, desc, engine_config()))
}

/// Take another reference on a graph
pub fn command_graph_retain(graph: &Arc<CommandGraph>) -> Arc<CommandGraph> {
    Arc::clone(graph)
}

/// Drop a reference on a graph
pub fn command_graph_release(graph: Arc<CommandGraph>) {
    drop(graph);
}

/// Take another reference on a command
pub fn command_retain(command: &Arc<CommandHandle>) -> Arc<CommandHandle> {
    Arc::clone(command)
}

/// Drop a reference on a command
pub fn command_release(command: Arc<CommandHandle>) {
    drop(command);
}

/// Query a graph property
pub fn command_graph_get_info(graph: &Arc<CommandGraph>, info: GraphInfo) -> ApiResult<u32> {
    match info {
        GraphInfo::ReferenceCount => Ok(graph.reference_count()),
    }
}

/// Query a command property
pub fn command_get_info(command: &Arc<CommandHandle>, info: CommandInfo) -> ApiResult<u32> {
    match info {
        CommandInfo::ReferenceCount => Ok(command.reference_count()),
    }
}

// =============================================================================
// RECORDING
// =============================================================================

/// Record a kernel launch
pub fn append_kernel_launch(
    graph: &Arc<CommandGraph>,
    kernel: &Arc<Kernel>,
    desc: &LaunchDesc,
    wait: &[SyncPoint],
) -> ApiResult<LaunchOutcome> {
    code(graph.append_kernel_launch(kernel, desc, wait))
}

/// Record a USM copy
pub fn append_usm_memcpy(
    graph: &CommandGraph,
    dst: GpuAddr,
    src: GpuAddr,
    size: usize,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_usm_memcpy(dst, src, size, wait))
}

/// Record a buffer copy
pub fn append_buffer_copy(
    graph: &CommandGraph,
    src: &Buffer,
    dst: &Buffer,
    src_offset: usize,
    dst_offset: usize,
    size: usize,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_buffer_copy(src, dst, src_offset, dst_offset, size, wait))
}

/// Record a rectangular buffer copy
pub fn append_buffer_copy_rect(
    graph: &CommandGraph,
    src: &Buffer,
    dst: &Buffer,
    rect: &RectCopy,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_buffer_copy_rect(src, dst, rect, wait))
}

/// Record a buffer write from host memory
pub fn append_buffer_write(
    graph: &CommandGraph,
    buffer: &Buffer,
    offset: usize,
    size: usize,
    src: GpuAddr,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_buffer_write(buffer, offset, size, src, wait))
}

/// Record a rectangular buffer write from host memory
pub fn append_buffer_write_rect(
    graph: &CommandGraph,
    buffer: &Buffer,
    rect: &BufferRect,
    src: GpuAddr,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_buffer_write_rect(buffer, rect, src, wait))
}

/// Record a buffer read into host memory
pub fn append_buffer_read(
    graph: &CommandGraph,
    buffer: &Buffer,
    offset: usize,
    size: usize,
    dst: GpuAddr,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_buffer_read(buffer, offset, size, dst, wait))
}

/// Record a rectangular buffer read into host memory
pub fn append_buffer_read_rect(
    graph: &CommandGraph,
    buffer: &Buffer,
    rect: &BufferRect,
    dst: GpuAddr,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_buffer_read_rect(buffer, rect, dst, wait))
}

/// Record a buffer fill
pub fn append_buffer_fill(
    graph: &CommandGraph,
    buffer: &Buffer,
    pattern: &[u8],
    offset: usize,
    size: usize,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_buffer_fill(buffer, pattern, offset, size, wait))
}

/// Record a USM fill
pub fn append_usm_fill(
    graph: &CommandGraph,
    ptr: GpuAddr,
    pattern: &[u8],
    size: usize,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_usm_fill(ptr, pattern, size, wait))
}

/// Record a USM prefetch
pub fn append_usm_prefetch(
    graph: &CommandGraph,
    ptr: GpuAddr,
    size: usize,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_usm_prefetch(ptr, size, wait))
}

/// Record USM placement advice
pub fn append_usm_advise(
    graph: &CommandGraph,
    ptr: GpuAddr,
    size: usize,
    advice: UsmAdvice,
    wait: &[SyncPoint],
) -> ApiResult<Option<SyncPoint>> {
    code(graph.append_usm_advise(ptr, size, advice, wait))
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Finalize a graph
pub fn command_graph_finalize(graph: &CommandGraph) -> ApiResult<()> {
    code(graph.finalize())
}

/// Submit a finalized graph
pub fn command_graph_enqueue(
    graph: &CommandGraph,
    queue: &Queue,
    wait_events: &[Arc<Event>],
    want_event: bool,
) -> ApiResult<Option<Arc<Event>>> {
    code(graph.enqueue(queue, wait_events, want_event))
}

/// Update a recorded kernel launch
pub fn command_update_kernel_launch(command: &CommandHandle, desc: &UpdateKernelLaunchDesc) -> ApiResult<()> {
    code(command.update_kernel_launch(desc))
}
