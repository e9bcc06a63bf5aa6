//! # Command Descriptors
//!
//! Plain data passed to the native command-list primitives.

use alloc::vec::Vec;

use crate::types::{EngineKind, EventHandle, GroupCount, GroupSize};

// =============================================================================
// OBJECT DESCRIPTORS
// =============================================================================

/// Event creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventDesc {
    /// Completion can be observed from the host
    pub host_visible: bool,
    /// Capture device timestamps when signaled
    pub profiling: bool,
}

/// Execution ordering of a command list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrdering {
    /// Commands execute strictly in append order
    InOrder,
    /// Commands may overlap unless ordered by events or barriers
    Relaxed,
}

/// Command list creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandListDesc {
    /// Engine the list will be executed on
    pub engine: EngineKind,
    /// Ordering mode
    pub ordering: ListOrdering,
    /// Recorded launches can be mutated after close
    pub mutable: bool,
}

impl CommandListDesc {
    /// Relaxed, immutable list for an engine
    pub const fn relaxed(engine: EngineKind) -> Self {
        Self {
            engine,
            ordering: ListOrdering::Relaxed,
            mutable: false,
        }
    }
}

/// Signal/wait wiring of a single appended command
#[derive(Debug, Clone, Copy, Default)]
pub struct EventDeps<'a> {
    /// Event signaled when the command completes
    pub signal: Option<EventHandle>,
    /// Events that must be signaled before the command starts
    pub wait: &'a [EventHandle],
}

impl<'a> EventDeps<'a> {
    /// No signal, no waits
    pub const fn none() -> Self {
        Self {
            signal: None,
            wait: &[],
        }
    }

    /// Signal `signal` after waiting on `wait`
    pub const fn new(signal: Option<EventHandle>, wait: &'a [EventHandle]) -> Self {
        Self { signal, wait }
    }
}

// =============================================================================
// COPY REGIONS
// =============================================================================

/// A 3D byte region inside a linear allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region3d {
    /// Byte origin (x) and row/slice origin (y, z)
    pub origin: [u32; 3],
    /// Row pitch in bytes
    pub row_pitch: u32,
    /// Slice pitch in bytes
    pub slice_pitch: u32,
}

impl Region3d {
    /// Byte offset of `(x, y, z)` relative to the allocation base
    pub const fn offset_of(&self, x: u64, y: u64, z: u64) -> u64 {
        (self.origin[0] as u64 + x)
            + (self.origin[1] as u64 + y) * self.row_pitch as u64
            + (self.origin[2] as u64 + z) * self.slice_pitch as u64
    }
}

/// Rectangular copy between two linear allocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyRegion {
    /// Source layout
    pub src: Region3d,
    /// Destination layout
    pub dst: Region3d,
    /// Width in bytes, height in rows, depth in slices
    pub extent: [u32; 3],
}

// =============================================================================
// MEMORY ADVICE
// =============================================================================

bitflags::bitflags! {
    /// Native memory advice bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemAdvice: u32 {
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
        /// Prefer system (host) placement
        const SET_SYSTEM_PREFERRED_LOCATION = 1 << 8;
        /// Clear system placement preference
        const CLEAR_SYSTEM_PREFERRED_LOCATION = 1 << 9;
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// One in-place edit of a recorded kernel launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Replace the global offset
    GlobalOffset {
        /// Native command id
        command_id: u64,
        /// New offset
        offset: [u32; 3],
    },
    /// Replace the group size
    GroupSize {
        /// Native command id
        command_id: u64,
        /// New group size
        size: GroupSize,
    },
    /// Replace the group count
    GroupCount {
        /// Native command id
        command_id: u64,
        /// New group count
        count: GroupCount,
    },
    /// Replace one argument; `None` is a null argument
    KernelArgument {
        /// Native command id
        command_id: u64,
        /// Argument index
        index: u32,
        /// Argument bytes
        value: Option<Vec<u8>>,
    },
}

impl Mutation {
    /// Command the mutation targets
    pub const fn command_id(&self) -> u64 {
        match self {
            Self::GlobalOffset { command_id, .. }
            | Self::GroupSize { command_id, .. }
            | Self::GroupCount { command_id, .. }
            | Self::KernelArgument { command_id, .. } => *command_id,
        }
    }

    /// Capability required to apply this mutation
    pub const fn required_flag(&self) -> crate::MutableCommandFlags {
        match self {
            Self::GlobalOffset { .. } => crate::MutableCommandFlags::GLOBAL_OFFSET,
            Self::GroupSize { .. } => crate::MutableCommandFlags::GROUP_SIZE,
            Self::GroupCount { .. } => crate::MutableCommandFlags::GROUP_COUNT,
            Self::KernelArgument { .. } => crate::MutableCommandFlags::KERNEL_ARGUMENTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_offset() {
        let region = Region3d {
            origin: [4, 2, 1],
            row_pitch: 16,
            slice_pitch: 64,
        };
        assert_eq!(region.offset_of(0, 0, 0), 4 + 32 + 64);
        assert_eq!(region.offset_of(1, 1, 0), 5 + 48 + 64);
    }

    #[test]
    fn test_mutation_flags() {
        let m = Mutation::KernelArgument {
            command_id: 3,
            index: 0,
            value: None,
        };
        assert_eq!(m.command_id(), 3);
        assert_eq!(m.required_flag(), crate::MutableCommandFlags::KERNEL_ARGUMENTS);
    }
}
