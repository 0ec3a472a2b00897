//! Cross-process dispatch lock.
//!
//! GitHub run discovery works by diffing "most recent run" listings,
//! so at most one GitHub dispatch may be in flight system-wide. Every
//! dispatching process takes an exclusive lock on one well-known file
//! for the record-prior → trigger → poll window. The lock is scoped
//! to dispatch only; fetch and deploy have no such race.

use nix::fcntl::{Flock, FlockArg};
use std::fs::OpenOptions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::info;

use crate::error::{DispatchError, DispatchResult};

/// Held for the duration of one GitHub dispatch. Unlocks on drop.
pub struct DispatchLock {
    _lock: Flock<std::fs::File>,
}

impl DispatchLock {
    /// Block until the exclusive lock is acquired.
    pub async fn acquire(path: &Path) -> DispatchResult<Self> {
        let path = path.to_path_buf();
        let lock = tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| DispatchError::Lock(format!("{}: {e}", path.display())))?;
            // dispatches come from many different users; all of them
            // must be able to lock the same file
            let _ = file.set_permissions(std::fs::Permissions::from_mode(0o666));
            Flock::lock(file, FlockArg::LockExclusive)
                .map_err(|(_, errno)| DispatchError::Lock(errno.to_string()))
        })
        .await
        .map_err(|e| DispatchError::Lock(format!("lock task failed: {e}")))??;

        info!("acquired dispatch lock");
        Ok(Self { _lock: lock })
    }
}

impl Drop for DispatchLock {
    fn drop(&mut self) {
        info!("released dispatch lock");
    }
}
