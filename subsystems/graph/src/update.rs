//! # Launch Updates
//!
//! Rewrites a recorded kernel launch of a finalized, updatable graph in
//! place. The whole update is validated against the command and the
//! device's mutable-command capabilities first, then applied to the native
//! list in a single call once the graph's last submission has drained.
//!
//! | Update field      | Capability            |
//! |-------------------|-----------------------|
//! | global offset     | `GLOBAL_OFFSET`       |
//! | local size        | `GROUP_SIZE`          |
//! | global size       | `GROUP_COUNT`, plus `GROUP_SIZE` without a local size |
//! | any argument      | `KERNEL_ARGUMENTS`    |

use alloc::sync::Arc;
use alloc::vec::Vec;

use replay_core::{AccessMode, Buffer, MemFlags};
use replay_hal::{DeviceProperties, Error, GpuAddr, GroupSize, MutableCommandFlags, Mutation, Result};

use crate::command::{CommandHandle, LaunchConfig};
use crate::lock;
use crate::work_dims;

/// Replacement buffer argument
#[derive(Debug, Clone)]
pub struct MemObjArg {
    /// Argument index
    pub index: u32,
    /// Access flags; read-write when absent
    pub access: Option<MemFlags>,
    /// New buffer; a null argument when absent
    pub buffer: Option<Arc<Buffer>>,
}

/// Replacement pointer argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerArg {
    /// Argument index
    pub index: u32,
    /// New pointer
    pub pointer: GpuAddr,
}

/// Replacement by-value argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueArg {
    /// Argument index
    pub index: u32,
    /// New argument bytes
    pub value: Vec<u8>,
}

/// New parameters for a recorded kernel launch
///
/// Geometry fields only take effect when `new_work_dim` is non-zero, and
/// it must then match the dimension the launch was recorded with.
#[derive(Debug, Clone, Default)]
pub struct UpdateKernelLaunchDesc {
    /// Work dimension, or 0 to leave the geometry alone
    pub new_work_dim: u32,
    /// New global offset
    pub global_offset: Option<[u64; 3]>,
    /// New global work size
    pub global_size: Option<[u64; 3]>,
    /// New work-group size
    pub local_size: Option<[u64; 3]>,
    /// Buffer arguments to replace
    pub mem_obj_args: Vec<MemObjArg>,
    /// Pointer arguments to replace
    pub pointer_args: Vec<PointerArg>,
    /// By-value arguments to replace
    pub value_args: Vec<ValueArg>,
}

impl UpdateKernelLaunchDesc {
    fn has_arguments(&self) -> bool {
        !self.mem_obj_args.is_empty() || !self.pointer_args.is_empty() || !self.value_args.is_empty()
    }
}

impl CommandHandle {
    /// Update the recorded launch
    ///
    /// Blocks until the graph's last submission has finished with the
    /// compute list. On failure the launch keeps its previous parameters.
    ///
    /// The wait happens with the command, kernel, program and graph locks
    /// held. Those are spin locks, so a concurrent append, enqueue or
    /// kernel argument change on the same objects spins until the
    /// submission drains rather than parking.
    pub fn update_kernel_launch(&self, desc: &UpdateKernelLaunchDesc) -> Result<()> {
        if desc.new_work_dim > 3 {
            return Err(Error::InvalidWorkDimension);
        }

        let graph = self.graph();
        let mut guard = lock::lock_update(self);
        if !graph.is_updatable() || !guard.graph.finalized {
            return Err(Error::InvalidOperation);
        }

        let device = graph.device();
        let props = device.properties();
        log::debug!("mutable features supported by device: {:?}", props.mutable_command_flags);
        self.validate(desc, props)?;

        let native = device.native();
        guard.graph.fences.wait_active(native)?;

        let mut config = *guard.config;
        let mut mutations = Vec::new();
        self.geometry_mutations(desc, &mut config, &mut mutations)?;
        self.argument_mutations(desc, graph.selector().config().null_value_args_as_null_pointers, &mut mutations)?;

        for mutation in &mutations {
            log::debug!("command {}: {:?}", self.command_id(), mutation);
        }
        native.update_mutable_commands(graph.compute_list(), &mutations)?;
        native.close_command_list(graph.compute_list())?;

        *guard.config = config;
        Ok(())
    }

    fn validate(&self, desc: &UpdateKernelLaunchDesc, props: &DeviceProperties) -> Result<()> {
        let dim = desc.new_work_dim;
        if dim != 0 {
            if dim != self.work_dim() {
                return Err(Error::InvalidOperation);
            }
            if desc.local_size.is_some() && desc.global_size.is_none() {
                return Err(Error::InvalidOperation);
            }
            if desc.local_size.is_some() != self.has_user_local_size() {
                return Err(Error::InvalidOperation);
            }
        }

        let supported = props.mutable_command_flags;
        let require = |flag: MutableCommandFlags| {
            if supported.contains(flag) {
                Ok(())
            } else {
                log::warn!("update needs {:?}, device supports {:?}", flag, supported);
                Err(Error::UnsupportedFeature)
            }
        };

        if desc.global_offset.is_some() {
            require(MutableCommandFlags::GLOBAL_OFFSET)?;
            if dim > 0 && !props.supports_global_offset {
                log::error!("global offset update on a device without offset support");
                return Err(Error::InvalidValue);
            }
        }
        if desc.local_size.is_some() {
            require(MutableCommandFlags::GROUP_SIZE)?;
        }
        if desc.global_size.is_some() {
            require(MutableCommandFlags::GROUP_COUNT)?;
            if desc.local_size.is_none() {
                require(MutableCommandFlags::GROUP_SIZE)?;
            }
        }
        if desc.has_arguments() {
            require(MutableCommandFlags::KERNEL_ARGUMENTS)?;
        }
        Ok(())
    }

    fn geometry_mutations(
        &self,
        desc: &UpdateKernelLaunchDesc,
        config: &mut LaunchConfig,
        mutations: &mut Vec<Mutation>,
    ) -> Result<()> {
        let dim = desc.new_work_dim;
        if dim == 0 {
            return Ok(());
        }
        let command_id = self.command_id();

        if let Some(offset) = desc.global_offset {
            let offset = [
                offset[0],
                if dim >= 2 { offset[1] } else { 0 },
                if dim == 3 { offset[2] } else { 0 },
            ];
            let mut narrowed = [0u32; 3];
            for (slot, &value) in narrowed.iter_mut().zip(&offset) {
                *slot = u32::try_from(value).map_err(|_| Error::InvalidValue)?;
            }
            mutations.try_reserve(1)?;
            mutations.push(Mutation::GlobalOffset {
                command_id,
                offset: narrowed,
            });
            config.global_offset = offset;
        }

        if let Some(local) = desc.local_size {
            let size = [
                local[0],
                if dim >= 2 { local[1] } else { 1 },
                if dim == 3 { local[2] } else { 1 },
            ];
            let mut narrowed = [1u32; 3];
            for (slot, &value) in narrowed.iter_mut().zip(&size) {
                *slot = u32::try_from(value).map_err(|_| Error::InvalidWorkGroupSize)?;
            }
            let size = GroupSize::new(narrowed[0], narrowed[1], narrowed[2]);
            mutations.try_reserve(1)?;
            mutations.push(Mutation::GroupSize { command_id, size });
            config.group_size = size;
        }

        if let Some(global) = desc.global_size {
            let native = self.graph().device().native();
            let (count, size) =
                work_dims::calculate(native, self.kernel().native(), dim, &global, desc.local_size.as_ref())?;
            mutations.try_reserve(2)?;
            mutations.push(Mutation::GroupCount { command_id, count });
            if desc.local_size.is_none() {
                mutations.push(Mutation::GroupSize { command_id, size });
            }
            config.global_size = global;
            config.group_count = count;
            config.group_size = size;
        }
        Ok(())
    }

    fn argument_mutations(
        &self,
        desc: &UpdateKernelLaunchDesc,
        null_zero_values: bool,
        mutations: &mut Vec<Mutation>,
    ) -> Result<()> {
        let command_id = self.command_id();
        mutations.try_reserve(desc.mem_obj_args.len() + desc.pointer_args.len() + desc.value_args.len())?;

        for arg in &desc.mem_obj_args {
            let access = match arg.access {
                None => AccessMode::ReadWrite,
                Some(flags) => AccessMode::from_flags(flags)?,
            };
            let value = arg
                .buffer
                .as_ref()
                .map(|buffer| buffer.device_address(access).to_arg_bytes().to_vec());
            mutations.push(Mutation::KernelArgument {
                command_id,
                index: arg.index,
                value,
            });
        }

        for arg in &desc.pointer_args {
            mutations.push(Mutation::KernelArgument {
                command_id,
                index: arg.index,
                value: Some(arg.pointer.to_arg_bytes().to_vec()),
            });
        }

        for arg in &desc.value_args {
            // A pointer-sized run of zeros reads as a null pointer argument
            let null = null_zero_values
                && arg.value.len() == core::mem::size_of::<u64>()
                && arg.value.iter().all(|&b| b == 0);
            let value = if null { None } else { Some(arg.value.clone()) };
            mutations.push(Mutation::KernelArgument {
                command_id,
                index: arg.index,
                value,
            });
        }
        Ok(())
    }
}
