//! Events and fences backed by `parking_lot` condition variables.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use replay_hal::{Error, EventDesc, KernelTimestamp, Result};

// =============================================================================
// EVENT
// =============================================================================

#[derive(Debug, Default)]
struct EventState {
    signaled: bool,
    timestamp: KernelTimestamp,
}

/// A software completion event
#[derive(Debug)]
pub(crate) struct SoftEvent {
    pub(crate) desc: EventDesc,
    state: Mutex<EventState>,
    cond: Condvar,
}

impl SoftEvent {
    pub(crate) fn new(desc: EventDesc) -> Self {
        Self {
            desc,
            state: Mutex::new(EventState::default()),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn signal(&self, timestamp: KernelTimestamp) {
        let mut state = self.state.lock();
        state.signaled = true;
        if self.desc.profiling {
            state.timestamp = timestamp;
        }
        self.cond.notify_all();
    }

    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.signaled = false;
        state.timestamp = KernelTimestamp::default();
    }

    pub(crate) fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    pub(crate) fn timestamp(&self) -> KernelTimestamp {
        self.state.lock().timestamp
    }

    /// Block until signaled
    pub(crate) fn wait(&self, timeout_ns: u64) -> Result<()> {
        let mut state = self.state.lock();
        let deadline = deadline(timeout_ns);
        while !state.signaled {
            match deadline {
                None => self.cond.wait(&mut state),
                Some(at) => {
                    if self.cond.wait_until(&mut state, at).timed_out() && !state.signaled {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// FENCE
// =============================================================================

#[derive(Debug, Default)]
struct FenceState {
    outstanding: u32,
    signaled: bool,
}

/// A software fence
///
/// Signals once every submission carrying it has retired, so resetting a
/// fence that still covers an earlier submission cannot signal early.
#[derive(Debug)]
pub(crate) struct SoftFence {
    state: Mutex<FenceState>,
    cond: Condvar,
}

impl SoftFence {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FenceState::default()),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn arm(&self) {
        let mut state = self.state.lock();
        state.outstanding += 1;
        state.signaled = false;
    }

    pub(crate) fn retire(&self) {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        if state.outstanding == 0 {
            state.signaled = true;
            self.cond.notify_all();
        }
    }

    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        if state.outstanding == 0 {
            state.signaled = false;
        }
    }

    pub(crate) fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    pub(crate) fn wait(&self, timeout_ns: u64) -> Result<()> {
        let mut state = self.state.lock();
        let deadline = deadline(timeout_ns);
        while !state.signaled {
            match deadline {
                None => self.cond.wait(&mut state),
                Some(at) => {
                    if self.cond.wait_until(&mut state, at).timed_out() && !state.signaled {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
        Ok(())
    }
}

fn deadline(timeout_ns: u64) -> Option<Instant> {
    if timeout_ns == u64::MAX {
        None
    } else {
        Instant::now().checked_add(Duration::from_nanos(timeout_ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_event_wait_times_out() {
        let event = SoftEvent::new(EventDesc::default());
        assert_eq!(event.wait(1_000), Err(Error::Timeout));
    }

    #[test]
    fn test_event_wakes_waiter() {
        let event = Arc::new(SoftEvent::new(EventDesc::default()));
        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait(u64::MAX))
        };
        event.signal(KernelTimestamp::default());
        assert_eq!(waiter.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_profiling_timestamp_only_when_enabled() {
        let plain = SoftEvent::new(EventDesc::default());
        let timed = SoftEvent::new(EventDesc {
            host_visible: false,
            profiling: true,
        });
        let ts = KernelTimestamp { start: 3, end: 9 };
        plain.signal(ts);
        timed.signal(ts);
        assert_eq!(plain.timestamp(), KernelTimestamp::default());
        assert_eq!(timed.timestamp(), ts);
    }

    #[test]
    fn test_fence_reset_does_not_lose_outstanding_submission() {
        let fence = SoftFence::new();
        fence.arm();
        fence.reset();
        fence.arm();
        fence.retire();
        assert!(!fence.is_signaled());
        fence.retire();
        assert!(fence.is_signaled());
        fence.reset();
        assert!(!fence.is_signaled());
    }
}
