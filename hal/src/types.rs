//! # Core Types
//!
//! Fundamental type definitions shared by the native layer and the runtime.
//!
//! These types provide:
//! - Strong typing for device addresses
//! - Type-safe native object handles
//! - Launch geometry and timestamp records

use core::fmt;
use core::ops::Add;

// =============================================================================
// GPU ADDRESS
// =============================================================================

/// Device-visible virtual address
///
/// Every unified allocation (host, device or shared) is named by one of
/// these. It is NOT a CPU pointer and cannot be dereferenced directly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct GpuAddr(u64);

impl GpuAddr {
    /// Create a new GPU address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create a null GPU address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check alignment
    #[inline]
    pub const fn is_aligned(self, alignment: u64) -> bool {
        self.0 & (alignment - 1) == 0
    }

    /// Align up to boundary
    #[inline]
    pub const fn align_up(self, alignment: u64) -> Self {
        let mask = alignment - 1;
        Self((self.0 + mask) & !mask)
    }

    /// Offset by bytes
    #[inline]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }

    /// Little-endian bytes, as passed in a pointer-sized kernel argument
    #[inline]
    pub const fn to_arg_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl Add<u64> for GpuAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl fmt::Debug for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuAddr(0x{:016x})", self.0)
    }
}

impl fmt::Display for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

// =============================================================================
// HANDLES
// =============================================================================

/// Generic native object handle
///
/// Handles are type-safe wrappers that prevent mixing different object types.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Handle<T> {
    id: u64,
    _marker: core::marker::PhantomData<T>,
}

impl<T> Handle<T> {
    /// Create a new handle
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            _marker: core::marker::PhantomData,
        }
    }

    /// Create a null handle
    #[inline]
    pub const fn null() -> Self {
        Self::new(0)
    }

    /// Get the raw ID
    #[inline]
    pub const fn id(self) -> u64 {
        self.id
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.id == 0
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = core::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "Handle<{}>(0x{:x})", short, self.id)
    }
}

// Marker types for handles
/// Marker for event handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventMarker;
/// Marker for command list handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandListMarker;
/// Marker for fence handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceMarker;
/// Marker for physical queue handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueMarker;
/// Marker for kernel handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelMarker;

/// Handle to a native completion event
pub type EventHandle = Handle<EventMarker>;
/// Handle to a native command list
pub type CommandListHandle = Handle<CommandListMarker>;
/// Handle to a per-queue fence
pub type FenceHandle = Handle<FenceMarker>;
/// Handle to a physical engine queue
pub type QueueHandle = Handle<QueueMarker>;
/// Handle to a native kernel object
pub type KernelHandle = Handle<KernelMarker>;

static_assertions::assert_eq_size!(EventHandle, u64);
static_assertions::assert_eq_size!(GpuAddr, u64);

// =============================================================================
// ENGINES AND MEMORY
// =============================================================================

/// Hardware engine class a command list or queue belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Compute engine
    Compute,
    /// Copy engine (DMA)
    Copy,
}

/// Placement of a unified allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// Host memory accessible by the device
    Host,
    /// Device-resident memory
    Device,
    /// Migratable shared memory
    Shared,
    /// Not an allocation known to the device
    Unknown,
}

impl MemoryKind {
    /// Device-resident allocation
    #[inline]
    pub const fn is_device(self) -> bool {
        matches!(self, Self::Device)
    }
}

/// Host-observed state of a native event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Not yet signaled
    Pending,
    /// Signaled
    Complete,
}

// =============================================================================
// LAUNCH GEOMETRY
// =============================================================================

/// Number of work-groups per dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupCount {
    /// X dimension
    pub x: u32,
    /// Y dimension
    pub y: u32,
    /// Z dimension
    pub z: u32,
}

impl GroupCount {
    /// Create a group count
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// Work-items per group per dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupSize {
    /// X dimension
    pub x: u32,
    /// Y dimension
    pub y: u32,
    /// Z dimension
    pub z: u32,
}

impl GroupSize {
    /// Create a group size
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// As an array
    pub const fn to_array(self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Default for GroupSize {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

/// Device timestamps captured for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct KernelTimestamp {
    /// Start, in device ticks
    pub start: u64,
    /// End, in device ticks
    pub end: u64,
}

impl KernelTimestamp {
    /// Encoded size in a timestamp buffer
    pub const SIZE: usize = 16;

    /// Decode from a timestamp buffer slot
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut start = [0u8; 8];
        let mut end = [0u8; 8];
        start.copy_from_slice(&bytes[..8]);
        end.copy_from_slice(&bytes[8..]);
        Self {
            start: u64::from_le_bytes(start),
            end: u64::from_le_bytes(end),
        }
    }

    /// Encode into a timestamp buffer slot
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..8].copy_from_slice(&self.start.to_le_bytes());
        out[8..].copy_from_slice(&self.end.to_le_bytes());
        out
    }
}

static_assertions::const_assert_eq!(core::mem::size_of::<KernelTimestamp>(), KernelTimestamp::SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_addr_alignment() {
        let addr = GpuAddr::new(0x1003);
        assert!(!addr.is_aligned(8));
        assert_eq!(addr.align_up(8).raw(), 0x1008);
        assert_eq!((addr + 5).raw(), 0x1008);
    }

    #[test]
    fn test_handle_null() {
        let h = EventHandle::null();
        assert!(h.is_null());
        assert_eq!(EventHandle::new(7).id(), 7);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = KernelTimestamp { start: 10, end: 25 };
        assert_eq!(KernelTimestamp::from_bytes(&ts.to_bytes()), ts);
    }
}
