//! Single-threaded event reactor.
//!
//! One control thread alternates a Wait phase (a bounded block on the OS
//! readiness facility, its timeout derived from the nearest scheduled timer)
//! with a Process phase (synchronous dispatch of the ready file events and
//! due time events collected by Wait).  There are no per-connection threads
//! and no locks: every registry mutation and every callback runs on the loop
//! thread itself.
//!
//! The crate owns no protocol logic.  Callers register callbacks for
//! descriptor readiness and for one-shot or repeating timers, then drive the
//! loop with [`EventLoop::run`] until [`EventLoop::stop`] is requested.
//!
//! Unix only (epoll on Linux, kqueue on the BSD family).

pub mod error;
pub mod event_loop;
pub mod os;
pub mod timer;

pub use error::Error;
pub use event_loop::{Direction, EventLoop, FileProc};
pub use os::{Event, Poller};
pub use timer::{FireMode, TimeEventId, TimeProc};
