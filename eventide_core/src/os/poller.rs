//! Common contract implemented by each platform's readiness facility.

use std::io::Result;
use std::os::unix::io::RawFd;

/// One readiness report for a registered descriptor.
#[derive(Clone, Copy, Debug, Default)]
pub struct Event {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
}

/// Thin interface over an OS readiness-notification facility.
///
/// `add` registers a descriptor that had no prior subscription, `modify`
/// replaces the subscribed mask of an already-registered descriptor, and
/// `delete` drops the descriptor entirely.  The caller is responsible for
/// choosing between them based on its own registry state; implementations do
/// not track which descriptors are present.
pub trait Poller {
    fn add(&self, fd: RawFd, readable: bool, writable: bool) -> Result<()>;
    fn modify(&self, fd: RawFd, readable: bool, writable: bool) -> Result<()>;
    fn delete(&self, fd: RawFd) -> Result<()>;

    /// Blocks up to `timeout_ms` (must be positive), filling `events` from
    /// the front.  Returns the number of ready entries.
    fn wait(&self, events: &mut [Event], timeout_ms: i32) -> Result<usize>;
}
