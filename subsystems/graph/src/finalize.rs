//! Graph finalization.

use replay_hal::{Error, EventDeps, Result};

use crate::graph::CommandGraph;

impl CommandGraph {
    /// Seal the graph for submission
    ///
    /// Closes every list. A relaxed graph gets its sync-point events reset
    /// on the reset list and a closing barrier on the compute list that
    /// waits on all of them and signals the graph's signal event. An
    /// in-order graph just signals at the tail of the compute list.
    pub fn finalize(&self) -> Result<()> {
        let mut state = self.lock();
        if state.finalized {
            return Err(Error::InvalidOperation);
        }
        let native = self.device().native();
        let signal = self.signal_event.native();

        if self.is_in_order() {
            native.append_signal_event(self.compute_list, signal)?;
        } else {
            let tracked = state.sync_points.tracked();
            for &event in tracked {
                native.append_reset_event(self.reset_list, event)?;
            }
            native.append_barrier(self.compute_list, EventDeps::new(Some(signal), tracked))?;
        }
        native.append_signal_event(self.reset_list, self.all_reset_event.native())?;

        native.close_command_list(self.compute_list)?;
        native.close_command_list(self.reset_list)?;
        if let Some(copy) = self.copy_list {
            native.close_command_list(copy)?;
        }

        state.finalized = true;
        log::debug!(
            "graph finalized with {} sync points, copy list {}",
            state.sync_points.len(),
            if state.copy_list_empty { "empty" } else { "in use" }
        );
        Ok(())
    }
}
