//! Reactor demo driver.
//!
//! Stands in for the server that would normally own the loop: echoes stdin
//! lines through a readable file event, logs a periodic housekeeping tick,
//! and shuts down cleanly on SIGINT/SIGTERM or stdin EOF.
//!
//! Run with `RUST_LOG=debug` to watch registrations and dispatch counts.

use std::io::{self, Write};
use std::rc::Rc;

use anyhow::Result;
use log::{debug, info};

use eventide_core::{Direction, EventLoop, FireMode};

mod signals;

fn main() -> Result<()> {
    env_logger::init();
    signals::init_term_signals();

    let mut el = EventLoop::new()?;

    el.add_file_event(
        libc::STDIN_FILENO,
        Direction::Readable,
        Rc::new(|l: &mut EventLoop, fd| {
            let mut buf = [0u8; 4096];
            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n > 0 {
                print!("echo: {}", String::from_utf8_lossy(&buf[..n as usize]));
                let _ = io::stdout().flush();
            } else {
                info!("stdin closed, shutting down");
                l.remove_file_event(fd, Direction::Readable);
                l.stop();
            }
        }),
    );

    // Housekeeping tick.
    el.add_time_event(
        FireMode::Repeating,
        1000,
        Rc::new(|l: &mut EventLoop, id| {
            debug!(
                "tick {}: {} file events, {} time events",
                id,
                l.registered_file_events(),
                l.pending_time_events()
            );
        }),
    );

    // Signal delivery happens on an arbitrary stack; the loop observes it
    // here, on its own thread, and stops itself.
    el.add_time_event(
        FireMode::Repeating,
        100,
        Rc::new(|l: &mut EventLoop, _id| {
            if signals::should_terminate() {
                info!("termination signal received, stopping loop");
                l.stop();
            }
        }),
    );

    info!("echo reactor ready, type lines or press Ctrl-C");
    el.run();
    info!("loop exited");
    Ok(())
}
