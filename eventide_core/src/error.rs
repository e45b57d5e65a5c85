//! Fatal-tier errors.
//!
//! Only loop construction can fail hard: if the OS refuses to hand out a
//! readiness-notification handle there is nothing to fall back to.  Every
//! later poller failure (subscribe, unsubscribe, wait) is logged and the
//! operation abandoned; the loop keeps running.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The readiness-notification handle could not be created.
    #[error("failed to create readiness poller: {0}")]
    PollerCreate(#[source] io::Error),
}
