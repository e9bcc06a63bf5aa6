//! Shared test fixture: a software device with a handful of kernels.

use alloc::sync::Arc;
use std::time::Duration;

use replay_core::{Context, Device, EngineConfig, Kernel, Program, Queue, QueueDesc};
use replay_hal::{GpuAddr, MemoryKind, NativeDevice};
use replay_soft::{KernelInvocation, SoftDevice, SoftDeviceBuilder, WorkItem};

use crate::graph::{CommandGraph, GraphDesc};
use crate::recorder::LaunchDesc;
use crate::sync_point::SyncPoint;

pub(crate) struct Fixture {
    pub(crate) soft: Arc<SoftDevice>,
    pub(crate) device: Arc<Device>,
    pub(crate) context: Arc<Context>,
    pub(crate) program: Arc<Program>,
    pub(crate) queue: Arc<Queue>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with(SoftDevice::builder())
    }

    pub(crate) fn with(builder: SoftDeviceBuilder) -> Self {
        let soft = Arc::new(builder.build().expect("soft device"));
        register_kernels(&soft);
        let native: Arc<dyn NativeDevice> = soft.clone();
        let device = Device::new(native);
        let context = Context::new(device.clone());
        let program = Program::new(context.clone());
        let queue = Queue::new(context.clone(), QueueDesc::default()).expect("queue");
        Self {
            soft,
            device,
            context,
            program,
            queue,
        }
    }

    pub(crate) fn graph(&self, desc: GraphDesc) -> Arc<CommandGraph> {
        self.graph_with(desc, EngineConfig::default())
    }

    pub(crate) fn graph_with(&self, desc: GraphDesc, config: EngineConfig) -> Arc<CommandGraph> {
        CommandGraph::create(&self.context, &self.device, &desc, config).expect("graph")
    }

    pub(crate) fn kernel(&self, name: &str) -> Arc<Kernel> {
        self.program.create_kernel(name).expect("kernel")
    }

    /// Zeroed device counter bumped once per work-item of an `items`-wide launch
    pub(crate) fn counter_launch(&self, graph: &Arc<CommandGraph>, items: u64) -> (GpuAddr, Option<SyncPoint>) {
        let counter = self.context.usm_alloc(MemoryKind::Device, 4).expect("counter");
        self.context.write(counter, &0u32.to_le_bytes()).expect("zero counter");
        let kernel = self.kernel("increment");
        kernel.set_arg_pointer(0, counter).expect("counter arg");
        let outcome = graph
            .append_kernel_launch(&kernel, &LaunchDesc::linear(items), &[])
            .expect("launch");
        (counter, outcome.sync_point)
    }

    pub(crate) fn read_u32(&self, addr: GpuAddr) -> u32 {
        let mut raw = [0u8; 4];
        self.context.read(addr, &mut raw).expect("read");
        u32::from_le_bytes(raw)
    }
}

fn register_kernels(soft: &SoftDevice) {
    // out[0] += 1
    soft.register_kernel("increment", |inv: &mut KernelInvocation<'_>, _item: WorkItem| {
        let out = inv.arg_addr(0)?;
        let value = inv.read_u32(out)?;
        inv.write_u32(out, value + 1)
    });
    // out[gid] = gid
    soft.register_kernel("store_id", |inv: &mut KernelInvocation<'_>, item: WorkItem| {
        let out = inv.arg_addr(0)?;
        let gid = item.global_id[0];
        inv.write_u32(out + gid * 4, gid as u32)
    });
    // out[0..3] = group size
    soft.register_kernel("record_size", |inv: &mut KernelInvocation<'_>, _item: WorkItem| {
        let out = inv.arg_addr(0)?;
        let size = inv.group_size().to_array();
        for (i, dim) in size.iter().enumerate() {
            inv.write_u32(out + i as u64 * 4, *dim)?;
        }
        Ok(())
    });
    soft.register_kernel("slow_store", |inv: &mut KernelInvocation<'_>, _item: WorkItem| {
        std::thread::sleep(Duration::from_millis(50));
        let out = inv.arg_addr(0)?;
        inv.write_u32(out, 1)
    });
}
