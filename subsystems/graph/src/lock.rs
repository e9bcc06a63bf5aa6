//! # Lock Ordering
//!
//! Every path that holds more than one lock takes them here, in one order:
//!
//! ```text
//!   command config → kernel → program → graph
//!   queue → graph
//! ```
//!
//! Nothing else in the crate holds a second lock while the graph lock is
//! held.

use replay_core::{Kernel, KernelState, Program, ProgramState, Queue, QueueState};
use spin::MutexGuard;

use crate::command::{CommandHandle, LaunchConfig};
use crate::graph::{CommandGraph, GraphState};

/// Locks held while recording a kernel launch
pub(crate) struct LaunchGuard<'a> {
    pub(crate) kernel: MutexGuard<'a, KernelState>,
    #[allow(dead_code)]
    pub(crate) program: MutexGuard<'a, ProgramState>,
    pub(crate) graph: MutexGuard<'a, GraphState>,
}

/// Locks held while updating a recorded launch
pub(crate) struct UpdateGuard<'a> {
    pub(crate) config: MutexGuard<'a, LaunchConfig>,
    #[allow(dead_code)]
    pub(crate) kernel: MutexGuard<'a, KernelState>,
    #[allow(dead_code)]
    pub(crate) program: Option<MutexGuard<'a, ProgramState>>,
    pub(crate) graph: MutexGuard<'a, GraphState>,
}

/// Locks held while submitting a graph
pub(crate) struct SubmitGuard<'a> {
    pub(crate) queue: MutexGuard<'a, QueueState>,
    pub(crate) graph: MutexGuard<'a, GraphState>,
}

pub(crate) fn lock_launch<'a>(kernel: &'a Kernel, program: &'a Program, graph: &'a CommandGraph) -> LaunchGuard<'a> {
    let kernel = kernel.lock();
    let program = program.lock();
    let graph = graph.lock();
    LaunchGuard {
        kernel,
        program,
        graph,
    }
}

pub(crate) fn lock_update(command: &CommandHandle) -> UpdateGuard<'_> {
    let config = command.config.lock();
    let kernel = command.kernel().lock();
    let program = command.kernel().program().map(|p| p.lock());
    let graph = command.graph().lock();
    UpdateGuard {
        config,
        kernel,
        program,
        graph,
    }
}

pub(crate) fn lock_submit<'a>(queue: &'a Queue, graph: &'a CommandGraph) -> SubmitGuard<'a> {
    let queue = queue.lock();
    let graph = graph.lock();
    SubmitGuard { queue, graph }
}
