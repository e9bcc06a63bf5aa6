//! # Replay Graph
//!
//! Record a graph of device operations once, then submit it many times.
//!
//! ## Lifecycle
//!
//! ```text
//!   create ──► append* ──► finalize ──► enqueue* ──┐
//!                                         ▲        │
//!                                         └─ update┘
//! ```
//!
//! Commands are recorded into native command lists. A relaxed graph ties
//! commands together with [`SyncPoint`]s, each backed by an event that is
//! reset on a separate list before every replay. An in-order graph relies
//! on list order alone.
//!
//! ## Modules
//!
//! - [`sync_point`]: dependency tokens and their events
//! - [`engine`]: compute versus copy engine policy
//! - [`recorder`]: the append operations
//! - [`finalize`]: sealing a graph
//! - [`submit`]: enqueue and per-queue fences
//! - [`update`]: in-place mutation of recorded kernel launches
//! - [`api`]: the same operations reporting result codes

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod api;
pub mod command;
pub mod engine;
pub mod fence;
pub mod finalize;
pub mod graph;
mod lock;
pub mod recorder;
pub mod submit;
pub mod sync_point;
pub mod update;
pub mod work_dims;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use command::{CommandHandle, LaunchConfig};
pub use engine::EngineSelector;
pub use fence::FenceTable;
pub use graph::{CommandGraph, GraphDesc, GraphState};
pub use recorder::{BufferRect, LaunchDesc, LaunchOutcome, RectCopy, UsmAdvice};
pub use sync_point::{SyncPoint, SyncPointRegistry};
pub use update::{MemObjArg, PointerArg, UpdateKernelLaunchDesc, ValueArg};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use replay_core::EngineConfig;
    use replay_hal::{Error, MemoryKind};
    use replay_soft::SoftDevice;

    fn relaxed() -> GraphDesc {
        GraphDesc::default()
    }

    fn read_bytes(fx: &Fixture, addr: replay_hal::GpuAddr, len: usize) -> std::vec::Vec<u8> {
        let mut out = alloc::vec![0u8; len];
        fx.context.read(addr, &mut out).unwrap();
        out
    }

    #[test]
    fn test_in_order_graph_runs_in_append_order() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc {
            in_order: true,
            ..GraphDesc::default()
        });
        let flag = fx.context.usm_alloc(MemoryKind::Device, 4).unwrap();
        let seen = fx.context.usm_alloc(MemoryKind::Host, 4).unwrap();
        fx.context.write(flag, &0u32.to_le_bytes()).unwrap();

        let slow = fx.kernel("slow_store");
        slow.set_arg_pointer(0, flag).unwrap();
        let outcome = graph.append_kernel_launch(&slow, &LaunchDesc::linear(1), &[]).unwrap();
        assert_eq!(outcome.sync_point, None);
        assert_eq!(graph.append_usm_memcpy(seen, flag, 4, &[]).unwrap(), None);
        graph.finalize().unwrap();

        graph.enqueue(&fx.queue, &[], true).unwrap().unwrap().wait().unwrap();
        assert_eq!(fx.read_u32(seen), 1);
    }

    #[test]
    fn test_wait_on_sync_point_orders_across_engines() {
        let fx = Fixture::new();
        let graph = fx.graph(relaxed());
        let flag = fx.context.usm_alloc(MemoryKind::Device, 4).unwrap();
        let seen = fx.context.usm_alloc(MemoryKind::Host, 4).unwrap();
        fx.context.write(flag, &0u32.to_le_bytes()).unwrap();

        let slow = fx.kernel("slow_store");
        slow.set_arg_pointer(0, flag).unwrap();
        let produced = graph
            .append_kernel_launch(&slow, &LaunchDesc::linear(1), &[])
            .unwrap()
            .sync_point
            .unwrap();
        graph.append_usm_memcpy(seen, flag, 4, &[produced]).unwrap();
        graph.finalize().unwrap();
        assert!(!graph.lock().copy_list_empty());

        graph.enqueue(&fx.queue, &[], true).unwrap().unwrap().wait().unwrap();
        assert_eq!(fx.read_u32(seen), 1);
    }

    #[test]
    fn test_sequential_replays_never_see_stale_events() {
        let fx = Fixture::new();
        let graph = fx.graph(relaxed());
        let (counter, sp) = fx.counter_launch(&graph, 4);
        let mirror = fx.context.usm_alloc(MemoryKind::Host, 4).unwrap();
        graph.append_usm_memcpy(mirror, counter, 4, &[sp.unwrap()]).unwrap();
        graph.finalize().unwrap();

        for round in 1..=5u32 {
            let done = graph.enqueue(&fx.queue, &[], true).unwrap().unwrap();
            done.wait().unwrap();
            assert_eq!(fx.read_u32(counter), round * 4);
            assert_eq!(fx.read_u32(mirror), round * 4);
        }
        assert!(graph.is_idle().unwrap());
    }

    #[test]
    fn test_global_update_keeps_untouched_arguments() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc {
            updatable: true,
            ..GraphDesc::default()
        });
        let out = fx.context.usm_alloc(MemoryKind::Device, 64).unwrap();
        fx.context.write(out, &[0xffu8; 64]).unwrap();
        let kernel = fx.kernel("store_id");
        kernel.set_arg_pointer(0, out).unwrap();
        let command = graph
            .append_kernel_launch(&kernel, &LaunchDesc::linear(4), &[])
            .unwrap()
            .command
            .unwrap();
        graph.finalize().unwrap();
        graph.enqueue(&fx.queue, &[], true).unwrap().unwrap().wait().unwrap();

        command
            .update_kernel_launch(&UpdateKernelLaunchDesc {
                new_work_dim: 1,
                global_size: Some([16, 1, 1]),
                ..UpdateKernelLaunchDesc::default()
            })
            .unwrap();
        let config = command.launch_config();
        assert_eq!(u64::from(config.group_size.x) * u64::from(config.group_count.x), 16);

        graph.enqueue(&fx.queue, &[], true).unwrap().unwrap().wait().unwrap();
        for gid in 0..16u64 {
            assert_eq!(fx.read_u32(out + gid * 4), gid as u32);
        }
    }

    #[test]
    fn test_update_refusals() {
        let fx = Fixture::with(SoftDevice::builder().global_offset(false));
        let fixed = fx.graph(relaxed());
        let kernel = fx.kernel("store_id");
        let out = fx.context.usm_alloc(MemoryKind::Device, 64).unwrap();
        kernel.set_arg_pointer(0, out).unwrap();
        assert!(fixed
            .append_kernel_launch(&kernel, &LaunchDesc::linear(4), &[])
            .unwrap()
            .command
            .is_none());

        let graph = fx.graph(GraphDesc {
            updatable: true,
            ..GraphDesc::default()
        });
        let command = graph
            .append_kernel_launch(&kernel, &LaunchDesc::linear(4), &[])
            .unwrap()
            .command
            .unwrap();
        graph.finalize().unwrap();
        let before = command.launch_config();
        let offset = UpdateKernelLaunchDesc {
            new_work_dim: 1,
            global_offset: Some([2, 0, 0]),
            global_size: Some([8, 1, 1]),
            ..UpdateKernelLaunchDesc::default()
        };
        assert!(command.update_kernel_launch(&offset).is_err());
        assert_eq!(command.launch_config(), before);
    }

    #[test]
    fn test_fill_then_dependent_copy() {
        let fx = Fixture::new();
        let config = EngineConfig::builder().use_copy_engine_for_fill(true).build();
        let graph = fx.graph_with(
            GraphDesc {
                updatable: true,
                ..GraphDesc::default()
            },
            config,
        );
        let src = fx.context.usm_alloc(MemoryKind::Device, 4096).unwrap();
        let dst = fx.context.usm_alloc(MemoryKind::Device, 4096).unwrap();

        let pattern = [0xde, 0xad, 0xbe, 0xef];
        let p0 = graph.append_usm_fill(src, &pattern, 4096, &[]).unwrap().unwrap();
        graph.append_usm_memcpy(dst, src, 4096, &[p0]).unwrap();
        graph.finalize().unwrap();
        assert!(!graph.lock().copy_list_empty());

        let done = graph.enqueue(&fx.queue, &[], true).unwrap().unwrap();
        done.wait().unwrap();
        let expected: std::vec::Vec<u8> = pattern.iter().copied().cycle().take(4096).collect();
        assert_eq!(read_bytes(&fx, dst, 4096), expected);
    }

    #[test]
    fn test_local_size_update_takes_effect() {
        let fx = Fixture::new();
        let graph = fx.graph(GraphDesc {
            updatable: true,
            ..GraphDesc::default()
        });
        let out = fx.context.usm_alloc(MemoryKind::Device, 12).unwrap();
        let kernel = fx.kernel("record_size");
        kernel.set_arg_pointer(0, out).unwrap();
        let command = graph
            .append_kernel_launch(&kernel, &LaunchDesc::linear(8).with_local_size([4, 1, 1]), &[])
            .unwrap()
            .command
            .unwrap();
        graph.finalize().unwrap();

        graph.enqueue(&fx.queue, &[], true).unwrap().unwrap().wait().unwrap();
        assert_eq!(fx.read_u32(out), 4);

        command
            .update_kernel_launch(&UpdateKernelLaunchDesc {
                new_work_dim: 1,
                global_size: Some([8, 1, 1]),
                local_size: Some([2, 1, 1]),
                ..UpdateKernelLaunchDesc::default()
            })
            .unwrap();
        graph.enqueue(&fx.queue, &[], true).unwrap().unwrap().wait().unwrap();
        assert_eq!(fx.read_u32(out), 2);
        assert_eq!(fx.read_u32(out + 4), 1);
        assert_eq!(command.launch_config().group_count.x, 4);
    }

    #[test]
    fn test_user_event_destroyed_once() {
        let fx = Fixture::new();
        let events = fx.soft.live_events();
        let graph = fx.graph(relaxed());
        fx.counter_launch(&graph, 1);
        graph.finalize().unwrap();

        let done = graph.enqueue(&fx.queue, &[], true).unwrap().unwrap();
        done.wait().unwrap();
        fx.queue.finish().unwrap();
        let shared = done.clone();
        drop(graph);
        assert!(fx.soft.live_events() > events);
        drop(done);
        assert!(fx.soft.live_events() > events);
        drop(shared);
        assert_eq!(fx.soft.live_events(), events);
        assert_eq!(fx.soft.destroy_failures(), 0);
    }

    #[test]
    fn test_errors_keep_their_kind() {
        let fx = Fixture::new();
        let graph = fx.graph(relaxed());
        let ptr = fx.context.usm_alloc(MemoryKind::Device, 16).unwrap();
        assert_eq!(graph.append_usm_fill(ptr, &[1, 2, 3], 12, &[]), Err(Error::InvalidValue));
    }
}
