//! Downstream rescan signal.
//!
//! One repository-wide signal per orchestrator pass, however many
//! jobs were staged, so the indexer rescans once. A missing pidfile
//! or a dead indexer process is not an error; the indexer picks the
//! work up on its own schedule.

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::Path;
use tracing::{debug, info, warn};

/// Ask the repository indexer to rescan the staging tree.
pub fn rescan(pidfile: Option<&Path>) {
    let Some(pidfile) = pidfile else {
        debug!("no indexer pidfile configured");
        return;
    };

    let pid = match std::fs::read_to_string(pidfile) {
        Ok(text) => match text.trim().parse::<i32>() {
            Ok(pid) => pid,
            Err(_) => {
                warn!(pidfile = %pidfile.display(), "indexer pidfile is not a pid");
                return;
            }
        },
        Err(_) => {
            debug!(pidfile = %pidfile.display(), "indexer pidfile not present");
            return;
        }
    };

    match kill(Pid::from_raw(pid), Signal::SIGUSR1) {
        Ok(()) => info!(pid, "signalled indexer to rescan the staging tree"),
        Err(nix::errno::Errno::ESRCH) => debug!(pid, "indexer process not running"),
        Err(e) => warn!(pid, error = %e, "cannot signal indexer"),
    }
}
