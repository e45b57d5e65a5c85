//! OS-specific readiness-notification layer (epoll/kqueue)。
//! プラットフォーム毎の実装はコンパイル時に選択され再エクスポートされる。
//!
//! The backend implementation is selected per platform at compile time and
//! re-exported as `OsPoller`.  Linux → epoll, BSD/macOS → kqueue.

mod poller;
pub use poller::{Event, Poller};

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "linux")]
pub use epoll::Epoll as OsPoller;

#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
mod kqueue;
#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
pub use kqueue::Kqueue as OsPoller;
