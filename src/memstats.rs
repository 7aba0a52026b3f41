//! Allocator statistics for debugging long-lived streams.

use log::{debug, log_enabled, Level};
use tikv_jemalloc_ctl::{epoch, stats};

/// Log jemalloc's view of the heap along with the number of live tokio
/// tasks. Only runs with debug logging enabled.
pub fn log_allocator_stats() {
    if !log_enabled!(Level::Debug) {
        return;
    }
    // Statistics are cached until the epoch is advanced.
    if let Err(e) = epoch::advance() {
        debug!("Unable to refresh allocator stats: {}", e);
        return;
    }

    let tasks = tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_alive_tasks())
        .unwrap_or(0);

    match (stats::allocated::read(), stats::resident::read()) {
        (Ok(allocated), Ok(resident)) => debug!(
            "Allocator stats: allocated={} resident={} tasks={}",
            allocated, resident, tasks
        ),
        (Err(e), _) | (_, Err(e)) => debug!("Unable to read allocator stats: {}", e),
    }
}
