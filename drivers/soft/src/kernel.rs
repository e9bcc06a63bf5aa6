//! Host-executed kernels.
//!
//! A kernel is a Rust closure registered under an entry-point name. A launch
//! calls it once per work-item with the arguments, geometry and memory
//! captured when the launch was recorded.

use std::fmt;
use std::sync::Arc;

use replay_hal::{Error, GpuAddr, GroupCount, GroupSize, Result};

use crate::memory::Memory;

/// Work-item body
pub type KernelFn = Arc<dyn Fn(&mut KernelInvocation<'_>, WorkItem) -> Result<()> + Send + Sync>;

/// Per-dimension limits used when suggesting a group size
const SUGGESTED_GROUP_LIMIT: [u32; 3] = [64, 4, 4];

/// Argument slots per kernel
pub(crate) const MAX_KERNEL_ARGS: u32 = 256;

/// Identity of one work-item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    /// Global id, including the global offset
    pub global_id: [u64; 3],
    /// Id inside the group
    pub local_id: [u32; 3],
    /// Group id
    pub group_id: [u32; 3],
}

/// What a work-item can see
pub struct KernelInvocation<'a> {
    pub(crate) args: &'a [Option<Vec<u8>>],
    pub(crate) memory: &'a mut Memory,
    pub(crate) group_size: GroupSize,
    pub(crate) group_count: GroupCount,
    pub(crate) offset: [u32; 3],
}

impl KernelInvocation<'_> {
    /// Raw argument bytes; `None` for a null argument
    pub fn arg(&self, index: u32) -> Result<Option<&[u8]>> {
        self.args
            .get(index as usize)
            .map(Option::as_deref)
            .ok_or(Error::InvalidArgument)
    }

    /// Pointer-sized argument; a null argument reads as the null address
    pub fn arg_addr(&self, index: u32) -> Result<GpuAddr> {
        match self.arg(index)? {
            None => Ok(GpuAddr::null()),
            Some(bytes) => {
                let raw: [u8; 8] = bytes.try_into().map_err(|_| Error::InvalidArgument)?;
                Ok(GpuAddr::new(u64::from_le_bytes(raw)))
            }
        }
    }

    /// 32-bit by-value argument
    pub fn arg_u32(&self, index: u32) -> Result<u32> {
        let bytes = self.arg(index)?.ok_or(Error::InvalidArgument)?;
        let raw: [u8; 4] = bytes.try_into().map_err(|_| Error::InvalidArgument)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Work-items per group
    pub fn group_size(&self) -> GroupSize {
        self.group_size
    }

    /// Groups per dimension
    pub fn group_count(&self) -> GroupCount {
        self.group_count
    }

    /// Global offset
    pub fn global_offset(&self) -> [u32; 3] {
        self.offset
    }

    /// Work-items per dimension
    pub fn global_size(&self) -> [u64; 3] {
        [
            self.group_size.x as u64 * self.group_count.x as u64,
            self.group_size.y as u64 * self.group_count.y as u64,
            self.group_size.z as u64 * self.group_count.z as u64,
        ]
    }

    /// Read device memory
    pub fn read(&self, addr: GpuAddr, dst: &mut [u8]) -> Result<()> {
        self.memory.read(addr, dst)
    }

    /// Write device memory
    pub fn write(&mut self, addr: GpuAddr, src: &[u8]) -> Result<()> {
        self.memory.write(addr, src)
    }

    /// Read a little-endian `u32`
    pub fn read_u32(&self, addr: GpuAddr) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.memory.read(addr, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Write a little-endian `u32`
    pub fn write_u32(&mut self, addr: GpuAddr, value: u32) -> Result<()> {
        self.memory.write(addr, &value.to_le_bytes())
    }
}

impl fmt::Debug for KernelInvocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelInvocation")
            .field("args", &self.args.len())
            .field("group_size", &self.group_size)
            .field("group_count", &self.group_count)
            .field("offset", &self.offset)
            .finish()
    }
}

/// Native kernel object
pub(crate) struct SoftKernel {
    pub(crate) name: String,
    pub(crate) body: KernelFn,
    pub(crate) args: Vec<Option<Vec<u8>>>,
    pub(crate) group_size: GroupSize,
    pub(crate) offset: [u32; 3],
}

impl SoftKernel {
    pub(crate) fn new(name: &str, body: KernelFn) -> Self {
        Self {
            name: name.to_owned(),
            body,
            args: Vec::new(),
            group_size: GroupSize::default(),
            offset: [0; 3],
        }
    }

    pub(crate) fn set_argument(&mut self, index: u32, value: Option<&[u8]>) -> Result<()> {
        if index >= MAX_KERNEL_ARGS {
            return Err(Error::InvalidArgument);
        }
        let index = index as usize;
        if self.args.len() <= index {
            self.args.resize(index + 1, None);
        }
        self.args[index] = value.map(<[u8]>::to_vec);
        Ok(())
    }
}

impl fmt::Debug for SoftKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftKernel")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("group_size", &self.group_size)
            .finish_non_exhaustive()
    }
}

/// Largest divisor of each global extent within the per-dimension limit
pub(crate) fn suggest_group_size(global: [u32; 3]) -> GroupSize {
    let pick = |extent: u32, limit: u32| (1..=limit.min(extent.max(1))).rev().find(|d| extent % d == 0).unwrap_or(1);
    GroupSize::new(
        pick(global[0], SUGGESTED_GROUP_LIMIT[0]),
        pick(global[1], SUGGESTED_GROUP_LIMIT[1]),
        pick(global[2], SUGGESTED_GROUP_LIMIT[2]),
    )
}

/// Run `body` over every work-item of a launch
pub(crate) fn dispatch(body: &KernelFn, invocation: &mut KernelInvocation<'_>) -> Result<()> {
    let size = invocation.group_size;
    let count = invocation.group_count;
    let offset = invocation.offset;
    for gz in 0..count.z {
        for gy in 0..count.y {
            for gx in 0..count.x {
                for lz in 0..size.z {
                    for ly in 0..size.y {
                        for lx in 0..size.x {
                            let item = WorkItem {
                                global_id: [
                                    offset[0] as u64 + gx as u64 * size.x as u64 + lx as u64,
                                    offset[1] as u64 + gy as u64 * size.y as u64 + ly as u64,
                                    offset[2] as u64 + gz as u64 * size.z as u64 + lz as u64,
                                ],
                                local_id: [lx, ly, lz],
                                group_id: [gx, gy, gz],
                            };
                            body(&mut *invocation, item)?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_group_size_divides_global() {
        assert_eq!(suggest_group_size([128, 1, 1]), GroupSize::new(64, 1, 1));
        assert_eq!(suggest_group_size([96, 6, 7]), GroupSize::new(48, 3, 1));
        assert_eq!(suggest_group_size([7, 0, 1]), GroupSize::new(7, 1, 1));
    }

    #[test]
    fn test_argument_index_is_bounded() {
        let body: KernelFn = Arc::new(|_: &mut KernelInvocation<'_>, _: WorkItem| Ok(()));
        let mut kernel = SoftKernel::new("noop", body);
        assert_eq!(kernel.set_argument(u32::MAX, None), Err(Error::InvalidArgument));
        assert_eq!(kernel.set_argument(MAX_KERNEL_ARGS, Some(&[1])), Err(Error::InvalidArgument));
        assert!(kernel.args.is_empty());
        kernel.set_argument(2, Some(&[1])).unwrap();
        assert_eq!(kernel.args.len(), 3);
    }

    #[test]
    fn test_dispatch_visits_every_item_once() {
        let mut memory = Memory::new();
        let out = memory
            .allocate(replay_hal::MemoryKind::Device, 4 * 12, 4)
            .unwrap();
        let args = vec![Some(out.to_arg_bytes().to_vec())];
        let body: KernelFn = Arc::new(|inv: &mut KernelInvocation<'_>, item: WorkItem| {
            let addr = inv.arg_addr(0)? + (item.global_id[0] - 2) * 4;
            let seen = inv.read_u32(addr)?;
            inv.write_u32(addr, seen + 1)
        });
        let mut inv = KernelInvocation {
            args: &args,
            memory: &mut memory,
            group_size: GroupSize::new(4, 1, 1),
            group_count: GroupCount::new(3, 1, 1),
            offset: [2, 0, 0],
        };
        dispatch(&body, &mut inv).unwrap();
        let mut raw = [0u8; 48];
        memory.read(out, &mut raw).unwrap();
        assert!(raw.chunks(4).all(|c| c == [1, 0, 0, 0]));
    }
}
