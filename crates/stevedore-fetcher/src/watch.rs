//! Store-file change notification.
//!
//! The orchestrator wakes when the job database file is written by
//! another process (the dispatcher, the event receiver). The watch is
//! created fresh for each wait and dropped afterwards, so the
//! orchestrator's own writes never wake it.

use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::Path;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

struct InotifyFd(Inotify);

impl AsRawFd for InotifyFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_fd().as_raw_fd()
    }
}

/// Wait until `path` sees a close-after-write.
pub async fn store_written(path: &Path) -> std::io::Result<()> {
    let inotify = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)?;
    inotify.add_watch(path, AddWatchFlags::IN_CLOSE_WRITE)?;
    let fd = AsyncFd::with_interest(InotifyFd(inotify), Interest::READABLE)?;

    loop {
        let mut guard = fd.readable().await?;
        match guard.get_inner().0.read_events() {
            Ok(events) => {
                if events
                    .iter()
                    .any(|e| e.mask.contains(AddWatchFlags::IN_CLOSE_WRITE))
                {
                    return Ok(());
                }
                guard.clear_ready();
            }
            Err(nix::errno::Errno::EAGAIN) => {
                guard.clear_ready();
            }
            Err(e) => return Err(e.into()),
        }
    }
}
