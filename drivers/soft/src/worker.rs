//! Physical queue workers.
//!
//! Each physical queue is a thread draining a channel of submissions. A
//! submission is a snapshot taken at execute time: later edits to the
//! source command lists never reach work already queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use replay_hal::{CopyRegion, EngineKind, Error, GpuAddr, KernelTimestamp, MemAdvice, Result};

use crate::kernel::{dispatch, KernelFn, KernelInvocation};
use crate::list::LaunchInfo;
use crate::memory::Memory;
use crate::sync::{SoftEvent, SoftFence};

/// State shared between the device and its workers
#[derive(Debug)]
pub(crate) struct Shared {
    epoch: Instant,
    pub(crate) memory: Mutex<Memory>,
    pub(crate) faults: AtomicU64,
    pub(crate) retired: AtomicU64,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
            memory: Mutex::new(Memory::new()),
            faults: AtomicU64::new(0),
            retired: AtomicU64::new(0),
        }
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

pub(crate) enum ExecWork {
    Nop,
    Reset(Arc<SoftEvent>),
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
        body: KernelFn,
        info: LaunchInfo,
    },
    QueryTimestamps {
        events: Vec<Arc<SoftEvent>>,
        dst: GpuAddr,
    },
}

pub(crate) struct ExecCommand {
    pub(crate) work: ExecWork,
    pub(crate) signal: Option<Arc<SoftEvent>>,
    pub(crate) wait: Vec<Arc<SoftEvent>>,
}

pub(crate) struct Submission {
    pub(crate) commands: Vec<ExecCommand>,
    pub(crate) fence: Option<Arc<SoftFence>>,
}

/// Sending half of one physical queue
#[derive(Debug)]
pub(crate) struct QueueWorker {
    pub(crate) engine: EngineKind,
    pub(crate) index: u32,
    sender: Sender<Submission>,
}

impl QueueWorker {
    pub(crate) fn spawn(engine: EngineKind, index: u32, shared: Arc<Shared>) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let name = format!("replay-soft-{:?}-{}", engine, index).to_lowercase();
        thread::Builder::new()
            .name(name)
            .spawn(move || run(&receiver, &shared))
            .map_err(|e| {
                log::error!("failed to spawn queue worker: {}", e);
                Error::Unknown
            })?;
        Ok(Self { engine, index, sender })
    }

    pub(crate) fn submit(&self, submission: Submission) -> Result<()> {
        self.sender.send(submission).map_err(|_| Error::DeviceLost)
    }
}

fn run(receiver: &Receiver<Submission>, shared: &Shared) {
    // Ends when the device drops its sender.
    while let Ok(submission) = receiver.recv() {
        for command in submission.commands {
            for event in &command.wait {
                if let Err(e) = event.wait(u64::MAX) {
                    log::error!("wait failed on queue worker: {}", e);
                }
            }
            let start = shared.now();
            if let Err(e) = execute(&command.work, shared) {
                log::error!("command faulted: {}", e);
                shared.faults.fetch_add(1, Ordering::Relaxed);
            }
            if let Some(event) = &command.signal {
                event.signal(KernelTimestamp {
                    start,
                    end: shared.now(),
                });
            }
        }
        if let Some(fence) = &submission.fence {
            fence.retire();
        }
        shared.retired.fetch_add(1, Ordering::Relaxed);
    }
}

fn execute(work: &ExecWork, shared: &Shared) -> Result<()> {
    match work {
        ExecWork::Nop => Ok(()),
        ExecWork::Reset(event) => {
            event.reset();
            Ok(())
        }
        ExecWork::Copy { dst, src, size } => shared.memory.lock().copy(*dst, *src, *size),
        ExecWork::CopyRegion { dst, src, region } => shared.memory.lock().copy_region(*dst, *src, region),
        ExecWork::Fill { dst, pattern, size } => shared.memory.lock().fill(*dst, pattern, *size),
        ExecWork::Prefetch { ptr, size } => shared.memory.lock().prefetch(*ptr, *size),
        ExecWork::Advise { ptr, size, advice } => shared.memory.lock().advise(*ptr, *size, *advice),
        ExecWork::Launch { body, info } => {
            let mut memory = shared.memory.lock();
            let mut invocation = KernelInvocation {
                args: info.args.as_slice(),
                memory: &mut *memory,
                group_size: info.group_size,
                group_count: info.group_count,
                offset: info.offset,
            };
            dispatch(body, &mut invocation)
        }
        ExecWork::QueryTimestamps { events, dst } => {
            let mut memory = shared.memory.lock();
            for (i, event) in events.iter().enumerate() {
                let ts = if event.is_signaled() {
                    event.timestamp()
                } else {
                    KernelTimestamp::default()
                };
                memory.write(*dst + (i * KernelTimestamp::SIZE) as u64, &ts.to_bytes())?;
            }
            Ok(())
        }
    }
}
