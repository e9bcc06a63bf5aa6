//! Per-physical-queue fences of one graph.

use hashbrown::HashMap;

use replay_hal::{FenceHandle, NativeDevice, QueueHandle, Result};

/// Fences a graph has created, one per physical queue
#[derive(Debug, Default)]
pub struct FenceTable {
    fences: HashMap<QueueHandle, FenceHandle>,
    active: Option<FenceHandle>,
}

impl FenceTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Fence for a submission to `queue`
    ///
    /// Created on first use and reset on every later one. The returned fence
    /// becomes the active fence.
    pub fn acquire(&mut self, native: &dyn NativeDevice, queue: QueueHandle) -> Result<FenceHandle> {
        let fence = match self.fences.get(&queue) {
            Some(&fence) => {
                native.reset_fence(fence)?;
                fence
            }
            None => {
                self.fences.try_reserve(1).map_err(|_| replay_hal::Error::OutOfHostMemory)?;
                let fence = native.create_fence(queue)?;
                log::trace!("fence {:?} created for {:?}", fence, queue);
                self.fences.insert(queue, fence);
                fence
            }
        };
        self.active = Some(fence);
        Ok(fence)
    }

    /// Fence of the most recent submission
    #[inline]
    pub fn active(&self) -> Option<FenceHandle> {
        self.active
    }

    /// Forget the active fence after a submission that never reached the device
    pub fn deactivate(&mut self) {
        self.active = None;
    }

    /// Block until the most recent submission has executed
    pub fn wait_active(&self, native: &dyn NativeDevice) -> Result<()> {
        match self.active {
            Some(fence) => native.host_synchronize_fence(fence, u64::MAX),
            None => Ok(()),
        }
    }

    /// No submission in flight
    pub fn is_idle(&self, native: &dyn NativeDevice) -> Result<bool> {
        match self.active {
            Some(fence) => native.query_fence_status(fence),
            None => Ok(true),
        }
    }

    /// Number of fences created
    #[inline]
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    /// No fence created yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Destroy every fence
    pub fn destroy(&mut self, native: &dyn NativeDevice) {
        self.active = None;
        for (_, fence) in self.fences.drain() {
            if let Err(e) = native.destroy_fence(fence) {
                log::error!("failed to destroy fence {:?}: {}", fence, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_hal::{EngineKind, QueueOps};
    use replay_soft::SoftDevice;

    #[test]
    fn test_fence_created_once_per_queue() {
        let soft = SoftDevice::builder().compute_queues(2).build().unwrap();
        let q0 = soft.queue(EngineKind::Compute, 0).unwrap();
        let q1 = soft.queue(EngineKind::Compute, 1).unwrap();
        let mut table = FenceTable::new();
        assert!(table.is_idle(&soft).unwrap());

        let first = table.acquire(&soft, q0).unwrap();
        assert_eq!(table.acquire(&soft, q0).unwrap(), first);
        let other = table.acquire(&soft, q1).unwrap();
        assert_ne!(other, first);
        assert_eq!(table.active(), Some(other));
        assert_eq!(table.len(), 2);
        assert_eq!(soft.live_fences(), 2);

        table.deactivate();
        assert!(table.is_idle(&soft).unwrap());
        table.destroy(&soft);
        assert_eq!(soft.live_fences(), 0);
        assert!(table.is_empty());
        assert_eq!(soft.destroy_failures(), 0);
    }
}
