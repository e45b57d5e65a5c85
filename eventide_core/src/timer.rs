//! Time-event registry: an unordered collection of scheduled callbacks.
//!
//! Insertion is O(1); removal and the nearest-fire query are linear scans.
//! That is deliberate — a reactor of this scale carries a handful of timers,
//! and the flat layout keeps the due-scan a single pass with no ordering to
//! maintain.

use std::rc::Rc;
use std::sync::OnceLock;
use std::time::Instant;

use crate::event_loop::EventLoop;

/// Identifier handed out by [`EventLoop::add_time_event`].  Monotonically
/// assigned from 1 within one loop's lifetime and never reused, even after
/// removal.
pub type TimeEventId = u64;

/// Callback invoked when a time event comes due.  State travels by closure
/// capture; the loop reference allows further (de)registration from inside
/// the callback.
pub type TimeProc = Rc<dyn Fn(&mut EventLoop, TimeEventId)>;

/// Whether a time event retires after one firing or re-arms itself with its
/// interval, measured from dispatch time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireMode {
    Once,
    Repeating,
}

/// Wake-up ceiling when nothing is scheduled, so an idle loop still cycles.
pub(crate) const IDLE_WAKE_MS: u64 = 1000;

pub(crate) struct TimeEvent {
    pub id: TimeEventId,
    pub mode: FireMode,
    /// Next fire timestamp, in [`now_ms`] milliseconds.
    pub when_ms: u64,
    pub interval_ms: u64,
    pub proc: TimeProc,
}

/// Detached snapshot entry produced by the Wait phase.
pub(crate) struct DueTimer {
    pub id: TimeEventId,
    pub proc: TimeProc,
}

/// Milliseconds since a process-local monotonic epoch (first clock query).
/// Monotonic rather than wall-clock so scheduled timers are immune to
/// wall-clock steps.
pub(crate) fn now_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

pub(crate) struct TimerList {
    events: Vec<TimeEvent>,
    next_id: TimeEventId,
}

impl TimerList {
    pub fn new() -> Self {
        TimerList { events: Vec::new(), next_id: 1 }
    }

    /// Schedules a callback `interval_ms` from `now` and returns its id.
    pub fn add(&mut self, mode: FireMode, interval_ms: u64, proc: TimeProc, now: u64) -> TimeEventId {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push(TimeEvent {
            id,
            mode,
            when_ms: now + interval_ms,
            interval_ms,
            proc,
        });
        id
    }

    /// Unlinks the matching entry; an absent id is a silent no-op.
    pub fn remove(&mut self, id: TimeEventId) {
        if let Some(pos) = self.events.iter().position(|te| te.id == id) {
            self.events.remove(pos);
        }
    }

    pub fn contains(&self, id: TimeEventId) -> bool {
        self.events.iter().any(|te| te.id == id)
    }

    pub fn get_mut(&mut self, id: TimeEventId) -> Option<&mut TimeEvent> {
        self.events.iter_mut().find(|te| te.id == id)
    }

    /// Earliest next-fire timestamp, or `now + IDLE_WAKE_MS` when the
    /// collection is empty.
    pub fn nearest(&self, now: u64) -> u64 {
        self.events
            .iter()
            .map(|te| te.when_ms)
            .min()
            .unwrap_or(now + IDLE_WAKE_MS)
    }

    /// Collects every entry due at `now`.  The whole collection is scanned:
    /// several timers falling due in the same cycle are all dispatched in
    /// that cycle, in collection order.
    pub fn due(&self, now: u64) -> Vec<DueTimer> {
        self.events
            .iter()
            .filter(|te| te.when_ms <= now)
            .map(|te| DueTimer { id: te.id, proc: te.proc.clone() })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
