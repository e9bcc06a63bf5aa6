//! Unified memory arena.
//!
//! Allocations are plain host vectors keyed by a synthetic device address.
//! Addresses are handed out from a bump pointer and never reused, so a stale
//! address always resolves to "unknown" instead of aliasing a new allocation.

use std::collections::BTreeMap;

use replay_hal::{CopyRegion, Error, GpuAddr, MemAdvice, MemoryKind, Result};

const ARENA_BASE: u64 = 0x0001_0000_0000;

#[derive(Debug)]
struct Allocation {
    kind: MemoryKind,
    data: Vec<u8>,
    advice: MemAdvice,
    prefetches: u32,
}

/// The arena
#[derive(Debug)]
pub(crate) struct Memory {
    next: u64,
    allocations: BTreeMap<u64, Allocation>,
}

impl Memory {
    pub(crate) fn new() -> Self {
        Self {
            next: ARENA_BASE,
            allocations: BTreeMap::new(),
        }
    }

    pub(crate) fn allocate(&mut self, kind: MemoryKind, size: usize, alignment: usize) -> Result<GpuAddr> {
        if size == 0 || kind == MemoryKind::Unknown {
            return Err(Error::InvalidValue);
        }
        let alignment = alignment.max(1).next_power_of_two() as u64;
        let base = GpuAddr::new(self.next).align_up(alignment);
        // Leave a guard gap so off-by-one accesses never hit a neighbour.
        self.next = base.raw() + size as u64 + alignment;
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| Error::OutOfDeviceMemory)?;
        data.resize(size, 0);
        self.allocations.insert(
            base.raw(),
            Allocation {
                kind,
                data,
                advice: MemAdvice::empty(),
                prefetches: 0,
            },
        );
        Ok(base)
    }

    pub(crate) fn free(&mut self, addr: GpuAddr) -> Result<()> {
        self.allocations
            .remove(&addr.raw())
            .map(|_| ())
            .ok_or(Error::InvalidValue)
    }

    pub(crate) fn live(&self) -> usize {
        self.allocations.len()
    }

    pub(crate) fn kind(&self, addr: GpuAddr) -> MemoryKind {
        self.locate(addr).map_or(MemoryKind::Unknown, |(base, _)| self.allocations[&base].kind)
    }

    pub(crate) fn advice(&self, addr: GpuAddr) -> Option<MemAdvice> {
        self.locate(addr).map(|(base, _)| self.allocations[&base].advice)
    }

    pub(crate) fn prefetches(&self, addr: GpuAddr) -> Option<u32> {
        self.locate(addr).map(|(base, _)| self.allocations[&base].prefetches)
    }

    fn locate(&self, addr: GpuAddr) -> Option<(u64, usize)> {
        let (base, alloc) = self.allocations.range(..=addr.raw()).next_back()?;
        let offset = (addr.raw() - base) as usize;
        (offset < alloc.data.len()).then_some((*base, offset))
    }

    fn span(&self, addr: GpuAddr, len: usize) -> Result<(u64, usize)> {
        let (base, offset) = self.locate(addr).ok_or(Error::InvalidValue)?;
        let end = offset.checked_add(len).ok_or(Error::InvalidValue)?;
        if end > self.allocations[&base].data.len() {
            return Err(Error::InvalidValue);
        }
        Ok((base, offset))
    }

    pub(crate) fn read(&self, addr: GpuAddr, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        let (base, offset) = self.span(addr, dst.len())?;
        dst.copy_from_slice(&self.allocations[&base].data[offset..offset + dst.len()]);
        Ok(())
    }

    pub(crate) fn write(&mut self, addr: GpuAddr, src: &[u8]) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        let (base, offset) = self.span(addr, src.len())?;
        let alloc = self.allocations.get_mut(&base).ok_or(Error::InvalidValue)?;
        alloc.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    pub(crate) fn copy(&mut self, dst: GpuAddr, src: GpuAddr, size: usize) -> Result<()> {
        let mut staging = vec![0u8; size];
        self.read(src, &mut staging)?;
        self.write(dst, &staging)
    }

    pub(crate) fn copy_region(&mut self, dst: GpuAddr, src: GpuAddr, region: &CopyRegion) -> Result<()> {
        let [width, height, depth] = region.extent;
        let mut row = vec![0u8; width as usize];
        for z in 0..depth as u64 {
            for y in 0..height as u64 {
                self.read(src + region.src.offset_of(0, y, z), &mut row)?;
                self.write(dst + region.dst.offset_of(0, y, z), &row)?;
            }
        }
        Ok(())
    }

    pub(crate) fn fill(&mut self, dst: GpuAddr, pattern: &[u8], size: usize) -> Result<()> {
        if pattern.is_empty() {
            return Err(Error::InvalidValue);
        }
        let bytes: Vec<u8> = pattern.iter().copied().cycle().take(size).collect();
        self.write(dst, &bytes)
    }

    pub(crate) fn advise(&mut self, addr: GpuAddr, size: usize, advice: MemAdvice) -> Result<()> {
        let (base, _) = self.span(addr, size)?;
        if let Some(alloc) = self.allocations.get_mut(&base) {
            alloc.advice |= advice;
        }
        Ok(())
    }

    pub(crate) fn prefetch(&mut self, addr: GpuAddr, size: usize) -> Result<()> {
        let (base, _) = self.span(addr, size)?;
        if let Some(alloc) = self.allocations.get_mut(&base) {
            alloc.prefetches += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_hal::Region3d;

    #[test]
    fn test_allocate_resolve_free() {
        let mut mem = Memory::new();
        let a = mem.allocate(MemoryKind::Device, 64, 64).unwrap();
        let b = mem.allocate(MemoryKind::Host, 64, 64).unwrap();
        assert!(a.is_aligned(64));
        assert_eq!(mem.kind(a + 63), MemoryKind::Device);
        assert_eq!(mem.kind(b), MemoryKind::Host);
        assert_eq!(mem.kind(a + 64), MemoryKind::Unknown);
        mem.free(a).unwrap();
        assert_eq!(mem.kind(a), MemoryKind::Unknown);
        assert_eq!(mem.free(a), Err(Error::InvalidValue));
    }

    #[test]
    fn test_out_of_bounds_access_is_rejected() {
        let mut mem = Memory::new();
        let a = mem.allocate(MemoryKind::Device, 8, 8).unwrap();
        assert_eq!(mem.write(a + 4, &[0; 8]), Err(Error::InvalidValue));
    }

    #[test]
    fn test_fill_repeats_pattern() {
        let mut mem = Memory::new();
        let a = mem.allocate(MemoryKind::Device, 8, 8).unwrap();
        mem.fill(a, &[1, 2, 3, 4], 8).unwrap();
        let mut out = [0u8; 8];
        mem.read(a, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_region() {
        let mut mem = Memory::new();
        let src = mem.allocate(MemoryKind::Host, 16, 8).unwrap();
        let dst = mem.allocate(MemoryKind::Device, 16, 8).unwrap();
        mem.write(src, &(0u8..16).collect::<Vec<_>>()).unwrap();
        // 2x2 block starting at (1, 1) of a 4x4 byte matrix.
        let region = CopyRegion {
            src: Region3d {
                origin: [1, 1, 0],
                row_pitch: 4,
                slice_pitch: 16,
            },
            dst: Region3d {
                origin: [0, 0, 0],
                row_pitch: 2,
                slice_pitch: 4,
            },
            extent: [2, 2, 1],
        };
        mem.copy_region(dst, src, &region).unwrap();
        let mut out = [0u8; 4];
        mem.read(dst, &mut out).unwrap();
        assert_eq!(out, [5, 6, 9, 10]);
    }
}
