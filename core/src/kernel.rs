//! # Programs and Kernels
//!
//! Kernel objects carry their own lock. Memory-object arguments are held
//! pending until the kernel is first used by a recording, then resolved to
//! device addresses and flushed into the native kernel in one pass.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use replay_hal::{GpuAddr, KernelHandle, Result};

use crate::buffer::{AccessMode, Buffer};
use crate::context::Context;
use crate::device::Device;

// =============================================================================
// PROGRAM
// =============================================================================

/// Program-level bookkeeping guarded by the program lock
#[derive(Debug, Default)]
pub struct ProgramState {
    kernels: Vec<String>,
}

impl ProgramState {
    /// Entry points created from this program so far
    pub fn kernel_names(&self) -> &[String] {
        &self.kernels
    }
}

/// A built program kernels are created from
pub struct Program {
    context: Arc<Context>,
    state: spin::Mutex<ProgramState>,
}

impl Program {
    /// Wrap a built program
    pub fn new(context: Arc<Context>) -> Arc<Self> {
        Arc::new(Self {
            context,
            state: spin::Mutex::new(ProgramState::default()),
        })
    }

    /// Program lock
    #[inline]
    pub fn lock(&self) -> spin::MutexGuard<'_, ProgramState> {
        self.state.lock()
    }

    /// Create a kernel for entry point `name`
    pub fn create_kernel(self: &Arc<Self>, name: &str) -> Result<Arc<Kernel>> {
        let device = self.context.device().clone();
        let native = device.native().create_kernel(name)?;
        let mut state = self.state.lock();
        state.kernels.try_reserve(1)?;
        state.kernels.push(String::from(name));
        drop(state);
        log::trace!("kernel {} created as {:?}", name, native);
        Ok(Arc::new(Kernel::new(device, native, String::from(name), Some(self.clone()))))
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program").finish_non_exhaustive()
    }
}

// =============================================================================
// KERNEL
// =============================================================================

#[derive(Debug)]
struct PendingMemArg {
    index: u32,
    buffer: Option<Arc<Buffer>>,
    access: AccessMode,
}

/// Kernel bookkeeping guarded by the kernel lock
#[derive(Debug, Default)]
pub struct KernelState {
    pending: Vec<PendingMemArg>,
    bound: Vec<(u32, Arc<Buffer>)>,
    submissions: u32,
    allocations: Vec<GpuAddr>,
}

impl KernelState {
    /// Resolve pending memory-object arguments into the native kernel
    pub fn flush_pending_arguments(&mut self, device: &Device, kernel: KernelHandle) -> Result<()> {
        for arg in self.pending.drain(..) {
            match &arg.buffer {
                Some(buffer) => {
                    let addr = buffer.device_address(arg.access).to_arg_bytes();
                    device.native().set_kernel_argument(kernel, arg.index, Some(&addr))?;
                    self.bound.retain(|(index, _)| *index != arg.index);
                    self.bound.push((arg.index, buffer.clone()));
                }
                None => {
                    device.native().set_kernel_argument(kernel, arg.index, None)?;
                    self.bound.retain(|(index, _)| *index != arg.index);
                }
            }
        }
        Ok(())
    }

    /// Arguments still waiting to be flushed
    pub fn pending_arguments(&self) -> usize {
        self.pending.len()
    }

    /// Graphs currently referencing the kernel
    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    /// One more graph references the kernel
    pub fn add_submission(&mut self) {
        self.submissions += 1;
    }

    /// A referencing graph went away; pinned allocations are freed at zero
    pub fn release_submission(&mut self, device: &Device) {
        self.submissions = self.submissions.saturating_sub(1);
        if self.submissions == 0 {
            for addr in self.allocations.drain(..) {
                if let Err(e) = device.native().free(addr) {
                    log::error!("failed to free kernel allocation {}: {}", addr, e);
                }
            }
        }
    }

    /// Allocations pinned by the kernel
    pub fn allocations(&self) -> &[GpuAddr] {
        &self.allocations
    }
}

/// A kernel object
pub struct Kernel {
    device: Arc<Device>,
    native: KernelHandle,
    name: String,
    program: Option<Arc<Program>>,
    state: spin::Mutex<KernelState>,
}

impl Kernel {
    fn new(device: Arc<Device>, native: KernelHandle, name: String, program: Option<Arc<Program>>) -> Self {
        Self {
            device,
            native,
            name,
            program,
            state: spin::Mutex::new(KernelState::default()),
        }
    }

    /// Adopt a native kernel that has no backing program
    pub fn from_native(device: Arc<Device>, native: KernelHandle, name: &str) -> Arc<Self> {
        Arc::new(Self::new(device, native, String::from(name), None))
    }

    /// Native handle
    #[inline]
    pub fn native(&self) -> KernelHandle {
        self.native
    }

    /// Entry point name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing program
    #[inline]
    pub fn program(&self) -> Option<&Arc<Program>> {
        self.program.as_ref()
    }

    /// Kernel lock
    #[inline]
    pub fn lock(&self) -> spin::MutexGuard<'_, KernelState> {
        self.state.lock()
    }

    /// Set a by-value argument immediately
    pub fn set_arg_value(&self, index: u32, value: &[u8]) -> Result<()> {
        let _state = self.state.lock();
        self.device.native().set_kernel_argument(self.native, index, Some(value))
    }

    /// Set a unified-pointer argument immediately
    pub fn set_arg_pointer(&self, index: u32, ptr: GpuAddr) -> Result<()> {
        let _state = self.state.lock();
        let bytes = ptr.to_arg_bytes();
        self.device.native().set_kernel_argument(self.native, index, Some(&bytes))
    }

    /// Queue a memory-object argument; `None` binds a null pointer
    pub fn set_arg_mem_obj(&self, index: u32, buffer: Option<Arc<Buffer>>, access: AccessMode) -> Result<()> {
        let mut state = self.state.lock();
        state.pending.retain(|arg| arg.index != index);
        state.pending.try_reserve(1)?;
        state.pending.push(PendingMemArg { index, buffer, access });
        Ok(())
    }

    /// Pin an allocation until no graph references the kernel
    pub fn attach_allocation(&self, addr: GpuAddr) -> Result<()> {
        let mut state = self.state.lock();
        state.allocations.try_reserve(1)?;
        state.allocations.push(addr);
        Ok(())
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for addr in state.allocations.drain(..) {
            if let Err(e) = self.device.native().free(addr) {
                log::error!("failed to free kernel allocation {}: {}", addr, e);
            }
        }
        if let Err(e) = self.device.native().destroy_kernel(self.native) {
            log::error!("failed to destroy kernel {}: {}", self.name, e);
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("native", &self.native)
            .field("has_program", &self.program.is_some())
            .finish()
    }
}
