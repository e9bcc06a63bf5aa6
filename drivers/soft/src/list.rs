//! Recorded command lists.

use replay_hal::{
    CommandListDesc, CopyRegion, EngineKind, Error, EventDeps, EventHandle, GpuAddr, GroupCount, GroupSize,
    KernelHandle, MemAdvice, MutableCommandFlags, Mutation, Result,
};

use crate::kernel::MAX_KERNEL_ARGS;

/// Kind of a recorded command, for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Barrier
    Barrier,
    /// Event signal
    Signal,
    /// Event reset
    Reset,
    /// Wait on events
    WaitOnEvents,
    /// Linear copy
    Copy,
    /// Rectangular copy
    CopyRegion,
    /// Pattern fill
    Fill,
    /// Prefetch
    Prefetch,
    /// Memory advice
    Advise,
    /// Kernel launch
    Launch,
    /// Timestamp query
    QueryTimestamps,
}

/// Launch parameters captured at append time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchInfo {
    /// Kernel launched
    pub kernel: KernelHandle,
    /// Mutable command id, if any
    pub command_id: Option<u64>,
    /// Argument bytes; `None` is a null argument
    pub args: Vec<Option<Vec<u8>>>,
    /// Group size
    pub group_size: GroupSize,
    /// Group count
    pub group_count: GroupCount,
    /// Global offset
    pub offset: [u32; 3],
}

#[derive(Debug, Clone)]
pub(crate) enum Work {
    Barrier,
    Signal,
    Reset(EventHandle),
    WaitOnEvents,
    Copy {
        dst: GpuAddr,
        src: GpuAddr,
        size: usize,
    },
    CopyRegion {
        dst: GpuAddr,
        src: GpuAddr,
        region: CopyRegion,
    },
    Fill {
        dst: GpuAddr,
        pattern: Vec<u8>,
        size: usize,
    },
    Prefetch {
        ptr: GpuAddr,
        size: usize,
    },
    Advise {
        ptr: GpuAddr,
        size: usize,
        advice: MemAdvice,
    },
    Launch {
        info: LaunchInfo,
        flags: MutableCommandFlags,
    },
    QueryTimestamps {
        events: Vec<EventHandle>,
        dst: GpuAddr,
    },
}

impl Work {
    pub(crate) fn kind(&self) -> CommandKind {
        match self {
            Self::Barrier => CommandKind::Barrier,
            Self::Signal => CommandKind::Signal,
            Self::Reset(_) => CommandKind::Reset,
            Self::WaitOnEvents => CommandKind::WaitOnEvents,
            Self::Copy { .. } => CommandKind::Copy,
            Self::CopyRegion { .. } => CommandKind::CopyRegion,
            Self::Fill { .. } => CommandKind::Fill,
            Self::Prefetch { .. } => CommandKind::Prefetch,
            Self::Advise { .. } => CommandKind::Advise,
            Self::Launch { .. } => CommandKind::Launch,
            Self::QueryTimestamps { .. } => CommandKind::QueryTimestamps,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub(crate) work: Work,
    pub(crate) signal: Option<EventHandle>,
    pub(crate) wait: Vec<EventHandle>,
}

/// A native command list
#[derive(Debug)]
pub(crate) struct SoftList {
    pub(crate) desc: CommandListDesc,
    pub(crate) closed: bool,
    pub(crate) commands: Vec<Command>,
    next_command_id: u64,
    reserved: Option<(u64, MutableCommandFlags)>,
}

impl SoftList {
    pub(crate) fn new(desc: CommandListDesc) -> Self {
        Self {
            desc,
            closed: false,
            commands: Vec::new(),
            next_command_id: 1,
            reserved: None,
        }
    }

    pub(crate) fn push(&mut self, work: Work, deps: EventDeps<'_>) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidOperation);
        }
        if self.desc.engine == EngineKind::Copy && matches!(work, Work::Launch { .. }) {
            return Err(Error::InvalidOperation);
        }
        self.commands.try_reserve(1)?;
        self.commands.push(Command {
            work,
            signal: deps.signal,
            wait: deps.wait.to_vec(),
        });
        Ok(())
    }

    /// Attach the reserved command id, if any, to a launch about to be pushed
    pub(crate) fn take_reserved(&mut self) -> (Option<u64>, MutableCommandFlags) {
        match self.reserved.take() {
            Some((id, flags)) => (Some(id), flags),
            None => (None, MutableCommandFlags::empty()),
        }
    }

    pub(crate) fn reserve_command_id(&mut self, flags: MutableCommandFlags) -> Result<u64> {
        if !self.desc.mutable {
            return Err(Error::UnsupportedFeature);
        }
        if self.closed {
            return Err(Error::InvalidOperation);
        }
        let id = self.next_command_id;
        self.next_command_id += 1;
        self.reserved = Some((id, flags));
        Ok(id)
    }

    pub(crate) fn reset(&mut self) {
        self.closed = false;
        self.commands.clear();
        self.reserved = None;
    }

    pub(crate) fn launch(&self, command_id: u64) -> Option<&LaunchInfo> {
        self.commands.iter().find_map(|cmd| match &cmd.work {
            Work::Launch { info, .. } if info.command_id == Some(command_id) => Some(info),
            _ => None,
        })
    }

    /// Validate every mutation, then apply them all
    pub(crate) fn apply(&mut self, mutations: &[Mutation]) -> Result<()> {
        if !self.desc.mutable {
            return Err(Error::UnsupportedFeature);
        }
        for mutation in mutations {
            let flags = self
                .commands
                .iter()
                .find_map(|cmd| match &cmd.work {
                    Work::Launch { info, flags } if info.command_id == Some(mutation.command_id()) => Some(*flags),
                    _ => None,
                })
                .ok_or(Error::InvalidValue)?;
            if !flags.contains(mutation.required_flag()) {
                return Err(Error::UnsupportedFeature);
            }
            if let Mutation::KernelArgument { index, .. } = mutation {
                if *index >= MAX_KERNEL_ARGS {
                    return Err(Error::InvalidArgument);
                }
            }
        }

        for mutation in mutations {
            let id = mutation.command_id();
            let Some(info) = self.commands.iter_mut().find_map(|cmd| match &mut cmd.work {
                Work::Launch { info, .. } if info.command_id == Some(id) => Some(info),
                _ => None,
            }) else {
                continue;
            };
            match mutation {
                Mutation::GlobalOffset { offset, .. } => info.offset = *offset,
                Mutation::GroupSize { size, .. } => info.group_size = *size,
                Mutation::GroupCount { count, .. } => info.group_count = *count,
                Mutation::KernelArgument { index, value, .. } => {
                    let index = *index as usize;
                    if info.args.len() <= index {
                        info.args.resize(index + 1, None);
                    }
                    info.args[index] = value.clone();
                }
            }
        }
        Ok(())
    }
}
