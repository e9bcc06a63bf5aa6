//! # Engine Selection
//!
//! Every recorded command lands on either the compute list or the copy
//! list. The selector turns a command's kind and data placement into a
//! preference, and `choose` turns the preference into a list, falling back
//! to compute whenever the graph cannot use the copy engine.
//!
//! | Command                        | Preference                                  |
//! |--------------------------------|---------------------------------------------|
//! | kernel launch, prefetch, advise| compute                                     |
//! | fill                           | copy if allowed and the pattern fits        |
//! | USM copy                       | copy unless device to device                |
//! | buffer copy                    | copy if either side lives on the host       |
//! | buffer read / write            | copy                                        |

use replay_core::EngineConfig;
use replay_hal::{DeviceProperties, EngineKind, Error, MemoryKind, Result};

/// Per-graph engine policy
#[derive(Debug, Clone, Copy)]
pub struct EngineSelector {
    copy_available: bool,
    compute_max_fill: usize,
    copy_max_fill: usize,
    copy_slow_for_shared: bool,
    config: EngineConfig,
}

impl EngineSelector {
    /// Policy for a graph on a device with `props`
    ///
    /// In-order graphs never use the copy engine.
    pub fn new(props: &DeviceProperties, config: EngineConfig, in_order: bool) -> Self {
        Self {
            copy_available: props.has_copy_engine() && !in_order,
            compute_max_fill: props.compute_max_fill_pattern_size,
            copy_max_fill: props.copy_max_fill_pattern_size,
            copy_slow_for_shared: props.copy_engine_slow_for_shared,
            config,
        }
    }

    /// Whether any command can reach the copy list
    #[inline]
    pub fn copy_available(&self) -> bool {
        self.copy_available
    }

    /// Preference for a fill with a `pattern_size`-byte pattern
    pub fn fill(&self, pattern_size: usize) -> Result<bool> {
        if !pattern_size.is_power_of_two() {
            return Err(Error::InvalidValue);
        }
        let prefer_copy =
            self.copy_available && pattern_size <= self.copy_max_fill && self.config.use_copy_engine_for_fill;
        if !prefer_copy && pattern_size > self.compute_max_fill {
            log::warn!(
                "fill pattern of {} bytes exceeds the compute engine limit of {}",
                pattern_size,
                self.compute_max_fill
            );
            return Err(Error::InvalidValue);
        }
        Ok(prefer_copy)
    }

    /// Preference for a USM copy between allocations of the given kinds
    pub fn usm_copy(&self, src: MemoryKind, dst: MemoryKind) -> bool {
        let mut prefer_copy = !src.is_device() || !dst.is_device();
        if self.copy_slow_for_shared && (src == MemoryKind::Shared || dst == MemoryKind::Shared) {
            prefer_copy = false;
        }
        prefer_copy || self.config.use_copy_engine_for_d2d_copy
    }

    /// Preference for a buffer to buffer copy
    pub fn buffer_copy(&self, src_on_host: bool, dst_on_host: bool) -> bool {
        src_on_host || dst_on_host || self.config.use_copy_engine_for_d2d_copy
    }

    /// Preference for a buffer read or write
    #[inline]
    pub fn transfer(&self) -> bool {
        true
    }

    /// Engine a command with `prefer_copy` is recorded on
    ///
    /// Clears `copy_list_empty` the first time the copy list is picked.
    pub fn choose(&self, prefer_copy: bool, copy_list_empty: &mut bool) -> EngineKind {
        if prefer_copy && self.copy_available {
            *copy_list_empty = false;
            EngineKind::Copy
        } else {
            EngineKind::Compute
        }
    }

    /// Configuration this policy was built with
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
