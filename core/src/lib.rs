//! # Replay Core
//!
//! The runtime object model the command-graph engine is built on.
//!
//! ## Objects
//!
//! | Object    | Role                                                   |
//! |-----------|--------------------------------------------------------|
//! | `Device`  | A native backend and its cached capabilities           |
//! | `Context` | Allocates events, buffers and unified memory           |
//! | `Queue`   | Round-robins physical queues, pools auxiliary lists    |
//! | `Event`   | Shared completion event, destroyed once on last drop   |
//! | `Program` | Source of kernels                                      |
//! | `Kernel`  | Arguments, submission counting, pinned allocations     |
//! | `Buffer`  | Linear memory object                                   |
//!
//! Every object is shared through `Arc`. Mutable state sits behind a
//! `spin::Mutex` owned by the object.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod buffer;
pub mod config;
pub mod context;
pub mod device;
pub mod event;
pub mod kernel;
pub mod queue;

// Re-exports for convenience
pub use buffer::{AccessMode, Buffer, MemFlags};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use context::Context;
pub use device::Device;
pub use event::Event;
pub use kernel::{Kernel, KernelState, Program, ProgramState};
pub use queue::{Queue, QueueDesc, QueueState};

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use replay_hal::{EngineKind, MemoryKind, NativeDevice};
    use replay_soft::SoftDevice;

    fn setup() -> (Arc<SoftDevice>, Arc<Context>) {
        let soft = Arc::new(SoftDevice::builder().build().expect("soft device"));
        let native: Arc<dyn NativeDevice> = soft.clone();
        (soft, Context::new(Device::new(native)))
    }

    #[test]
    fn test_event_destroyed_once_on_last_drop() {
        let (soft, context) = setup();
        let before = soft.live_events();
        let event = context.create_event(true, false).unwrap();
        let shared = event.clone();
        assert_eq!(soft.live_events(), before + 1);
        drop(event);
        assert_eq!(soft.live_events(), before + 1);
        drop(shared);
        assert_eq!(soft.live_events(), before);
        assert_eq!(soft.destroy_failures(), 0);
    }

    #[test]
    fn test_event_host_signal_and_reset() {
        let (_soft, context) = setup();
        let event = context.create_event(true, false).unwrap();
        assert!(!event.is_complete().unwrap());
        event.host_signal().unwrap();
        assert!(event.is_complete().unwrap());
        event.wait().unwrap();
        event.host_reset().unwrap();
        assert!(!event.is_complete().unwrap());
    }

    #[test]
    fn test_buffer_placement_and_bounds() {
        let (_soft, context) = setup();
        let host = context.create_buffer(MemFlags::READ_WRITE | MemFlags::ALLOC_HOST, 64).unwrap();
        let dev = context.create_buffer(MemFlags::READ_WRITE, 64).unwrap();
        assert!(host.is_on_host());
        assert!(!dev.is_on_host());
        let addr = dev.device_address(AccessMode::ReadWrite);
        assert_eq!(context.memory_kind(addr), MemoryKind::Device);
        assert!(dev.address_at(60, 4).is_ok());
        assert_eq!(dev.address_at(60, 5), Err(replay_hal::Error::InvalidValue));
    }

    #[test]
    fn test_pending_mem_args_flush_once() {
        let (soft, context) = setup();
        soft.register_kernel("noop", |_, _| Ok(()));
        let program = Program::new(context.clone());
        let kernel = program.create_kernel("noop").unwrap();
        let buffer = context.create_buffer(MemFlags::READ_WRITE, 16).unwrap();
        kernel.set_arg_mem_obj(0, Some(buffer), AccessMode::ReadWrite).unwrap();
        kernel.set_arg_mem_obj(1, None, AccessMode::ReadOnly).unwrap();

        let device = context.device().clone();
        let mut state = kernel.lock();
        assert_eq!(state.pending_arguments(), 2);
        state.flush_pending_arguments(&device, kernel.native()).unwrap();
        assert_eq!(state.pending_arguments(), 0);
        assert_eq!(program.lock().kernel_names(), ["noop"]);
    }

    #[test]
    fn test_kernel_allocations_freed_at_last_submission() {
        let (soft, context) = setup();
        soft.register_kernel("noop", |_, _| Ok(()));
        let program = Program::new(context.clone());
        let kernel = program.create_kernel("noop").unwrap();
        let scratch = context.usm_alloc(MemoryKind::Device, 32).unwrap();
        kernel.attach_allocation(scratch).unwrap();

        let device = context.device().clone();
        let mut state = kernel.lock();
        state.add_submission();
        state.add_submission();
        state.release_submission(&device);
        assert_eq!(state.allocations(), [scratch]);
        state.release_submission(&device);
        assert!(state.allocations().is_empty());
        assert_eq!(context.memory_kind(scratch), MemoryKind::Unknown);
    }

    #[test]
    fn test_queue_round_robin_and_aux_recycling() {
        let soft = Arc::new(SoftDevice::builder().compute_queues(2).build().unwrap());
        let native: Arc<dyn NativeDevice> = soft.clone();
        let context = Context::new(Device::new(native));
        let queue = Queue::new(context.clone(), QueueDesc::default()).unwrap();

        let a = queue.compute_queue();
        let b = queue.compute_queue();
        assert_ne!(a, b);
        assert_eq!(queue.compute_queue(), a);

        let event = context.create_event(true, false).unwrap();
        let device = context.device().clone();
        {
            let mut state = queue.lock();
            let list = state.acquire_list(device.native(), a, EngineKind::Compute).unwrap();
            device.native().append_signal_event(list, event.native()).unwrap();
            state.submit_list(device.native(), list, alloc::vec![event.clone()]).unwrap();
        }
        event.wait().unwrap();
        queue.finish().unwrap();
        let state = queue.lock();
        assert_eq!(state.in_flight(), 0);
        assert_eq!(state.pooled(), 1);
    }

    #[test]
    fn test_aux_list_released_when_fence_creation_fails() {
        let (soft, context) = setup();
        let queue = Queue::new(context.clone(), QueueDesc::default()).unwrap();
        let lists = soft.live_command_lists();

        let mut state = queue.lock();
        let bogus = replay_hal::QueueHandle::new(u64::MAX);
        assert_eq!(
            state.acquire_list(context.device().native(), bogus, EngineKind::Compute),
            Err(replay_hal::Error::InvalidNullHandle)
        );
        assert_eq!(soft.live_command_lists(), lists);
        assert_eq!(soft.destroy_failures(), 0);
        assert_eq!(state.pooled(), 0);
    }
}
