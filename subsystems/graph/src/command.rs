//! Mutable kernel-launch commands.

use alloc::sync::Arc;
use core::fmt;

use replay_core::Kernel;
use replay_hal::{GroupCount, GroupSize};

use crate::graph::CommandGraph;

/// Launch parameters a command currently carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Global offset, zero when none was given
    pub global_offset: [u64; 3],
    /// Global work size
    pub global_size: [u64; 3],
    /// Group size the launch runs with
    pub group_size: GroupSize,
    /// Group count the launch runs with
    pub group_count: GroupCount,
}

/// Handle to one kernel launch recorded into an updatable graph
///
/// Holds its graph alive. The work dimension is fixed at recording time.
pub struct CommandHandle {
    graph: Arc<CommandGraph>,
    kernel: Arc<Kernel>,
    command_id: u64,
    work_dim: u32,
    user_local_size: bool,
    pub(crate) config: spin::Mutex<LaunchConfig>,
}

impl CommandHandle {
    pub(crate) fn new(
        graph: Arc<CommandGraph>,
        kernel: Arc<Kernel>,
        command_id: u64,
        work_dim: u32,
        user_local_size: bool,
        config: LaunchConfig,
    ) -> Self {
        Self {
            graph,
            kernel,
            command_id,
            work_dim,
            user_local_size,
            config: spin::Mutex::new(config),
        }
    }

    /// Graph the command was recorded into
    #[inline]
    pub fn graph(&self) -> &Arc<CommandGraph> {
        &self.graph
    }

    /// Kernel the command launches
    #[inline]
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Native mutable-command id
    #[inline]
    pub fn command_id(&self) -> u64 {
        self.command_id
    }

    /// Work dimension
    #[inline]
    pub fn work_dim(&self) -> u32 {
        self.work_dim
    }

    /// A local size was given at recording time
    #[inline]
    pub fn has_user_local_size(&self) -> bool {
        self.user_local_size
    }

    /// Current launch parameters
    pub fn launch_config(&self) -> LaunchConfig {
        *self.config.lock()
    }

    /// Strong references held on the command
    pub fn reference_count(self: &Arc<Self>) -> u32 {
        u32::try_from(Arc::strong_count(self)).unwrap_or(u32::MAX)
    }
}

impl fmt::Debug for CommandHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandle")
            .field("kernel", &self.kernel.name())
            .field("command_id", &self.command_id)
            .field("work_dim", &self.work_dim)
            .field("user_local_size", &self.user_local_size)
            .finish_non_exhaustive()
    }
}
