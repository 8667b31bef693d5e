//! Pinning the engine worker thread to a CPU core.
//!
//! The matching path runs on one dedicated thread. Replays that need stable
//! timing can keep that thread on a fixed core; see `engine.cpu_core` in the
//! config.

use tracing::{info, warn};

/// Pin the calling thread to `core_id`. Returns `false` if the core does not
/// exist or the OS refused.
pub fn pin_current_thread(core_id: usize) -> bool {
    let cores = core_affinity::get_core_ids().unwrap_or_default();
    let Some(core) = cores.get(core_id) else {
        warn!("cpu core {core_id} not available ({} cores)", cores.len());
        return false;
    };
    let pinned = core_affinity::set_for_current(*core);
    if pinned {
        info!("thread pinned to cpu core {core_id}");
    } else {
        warn!("could not pin thread to cpu core {core_id}");
    }
    pinned
}

/// Pin only when a core is configured.
pub fn pin_if_configured(core_id: Option<usize>) -> bool {
    core_id.is_some_and(pin_current_thread)
}
