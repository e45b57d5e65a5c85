//! The reactor core: file/time event registries and the Wait/Process cycle.
//!
//! A single `EventLoop` value owns the poller handle, the file-event
//! registry, and the timer collection.  `run` alternates two phases until
//! stopped: Wait blocks on the poller (bounded by the nearest timer) and
//! collects detached snapshots of ready file events and due time events;
//! Process dispatches those snapshots in order.  Because dispatch works on
//! snapshots, callbacks are free to add or remove events — including the
//! ones still queued in the current batch, which are then skipped.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use log::{debug, warn};

use crate::error::Error;
use crate::os::{Event, OsPoller, Poller};
use crate::timer::{self, DueTimer, FireMode, TimeEventId, TimeProc, TimerList};

/// I/O direction a file event subscribes to.  Together with the descriptor
/// it forms the registry key: at most one callback per (fd, direction).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Readable,
    Writable,
}

/// Callback invoked when a descriptor becomes ready.  State travels by
/// closure capture; the loop reference allows further (de)registration from
/// inside the callback.
pub type FileProc = Rc<dyn Fn(&mut EventLoop, RawFd)>;

/// Capacity of one wait batch.
const EVENT_BATCH: usize = 128;

/// Minimum positive wait when a timer is already due or overdue.  Never 0:
/// a zero timeout would degenerate into a busy spin.
const MIN_WAIT_MS: i32 = 10;

/// Detached snapshot entry produced by the Wait phase.
struct ReadyFile {
    fd: RawFd,
    dir: Direction,
    proc: FileProc,
}

pub struct EventLoop {
    poller: Box<dyn Poller>,
    file_events: HashMap<(RawFd, Direction), FileProc>,
    timers: TimerList,
    /// Reusable wait buffer.
    events: Vec<Event>,
    stop: bool,
}

impl EventLoop {
    /// Creates a loop on the platform's readiness facility.  This is the
    /// only fatal failure point: if the OS refuses the handle there is no
    /// degraded mode.
    pub fn new() -> Result<Self, Error> {
        let poller = OsPoller::new().map_err(Error::PollerCreate)?;
        Ok(Self::with_poller(Box::new(poller)))
    }

    /// Builds a loop on a caller-supplied readiness facility.
    pub fn with_poller(poller: Box<dyn Poller>) -> Self {
        EventLoop {
            poller,
            file_events: HashMap::new(),
            timers: TimerList::new(),
            events: vec![Event::default(); EVENT_BATCH],
            stop: false,
        }
    }

    /// Subscribed mask for `fd`, derived from registry state.
    fn mask(&self, fd: RawFd) -> (bool, bool) {
        (
            self.file_events.contains_key(&(fd, Direction::Readable)),
            self.file_events.contains_key(&(fd, Direction::Writable)),
        )
    }

    /// Registers a readiness callback for `(fd, dir)`.
    ///
    /// Idempotent: a duplicate registration returns immediately without
    /// touching the poller.  A first subscription on the descriptor issues a
    /// register call, widening an existing one issues a modify.  If the
    /// poller refuses, the failure is logged and no entry is stored.
    pub fn add_file_event(&mut self, fd: RawFd, dir: Direction, proc: FileProc) {
        if self.file_events.contains_key(&(fd, dir)) {
            return;
        }
        let (mut readable, mut writable) = self.mask(fd);
        let had_any = readable || writable;
        match dir {
            Direction::Readable => readable = true,
            Direction::Writable => writable = true,
        }
        let res = if had_any {
            self.poller.modify(fd, readable, writable)
        } else {
            self.poller.add(fd, readable, writable)
        };
        if let Err(e) = res {
            warn!("poller subscribe failed for fd {}: {}", fd, e);
            return;
        }
        self.file_events.insert((fd, dir), proc);
        debug!("registered {:?} file event on fd {}", dir, fd);
    }

    /// Drops the `(fd, dir)` registration.
    ///
    /// The poller is updated unconditionally: a modify with the reduced mask
    /// while the other direction is still subscribed, a full delete once
    /// nothing remains.  Poller failures are logged and ignored; removing an
    /// absent entry is a no-op for the registry.
    pub fn remove_file_event(&mut self, fd: RawFd, dir: Direction) {
        self.file_events.remove(&(fd, dir));
        let (readable, writable) = self.mask(fd);
        let res = if readable || writable {
            self.poller.modify(fd, readable, writable)
        } else {
            self.poller.delete(fd)
        };
        if let Err(e) = res {
            warn!("poller unsubscribe failed for fd {}: {}", fd, e);
        }
        debug!("removed {:?} file event on fd {}", dir, fd);
    }

    /// Schedules a callback `interval_ms` from now.  `Once` events fire a
    /// single time and retire; `Repeating` events re-arm with the same
    /// interval measured from each dispatch.  Returns the event's id,
    /// assigned from 1 and never reused within this loop's lifetime.
    pub fn add_time_event(&mut self, mode: FireMode, interval_ms: u64, proc: TimeProc) -> TimeEventId {
        let id = self.timers.add(mode, interval_ms, proc, timer::now_ms());
        debug!("scheduled time event {} ({:?}, {}ms)", id, mode, interval_ms);
        id
    }

    /// Cancels a scheduled time event; an absent id is a silent no-op.
    /// Cancellation is observed at the next iteration, not during an
    /// in-flight wait.
    pub fn remove_time_event(&mut self, id: TimeEventId) {
        self.timers.remove(id);
    }

    /// Number of live file-event registrations.
    pub fn registered_file_events(&self) -> usize {
        self.file_events.len()
    }

    /// Number of scheduled time events.
    pub fn pending_time_events(&self) -> usize {
        self.timers.len()
    }

    /// Wait phase: blocks on the poller, bounded by the nearest timer, and
    /// collects the two detached dispatch lists.  No registry mutation
    /// happens here — the lists are snapshots, safe to iterate even if a
    /// callback later mutates the live registries.
    fn wait(&mut self) -> (Vec<DueTimer>, Vec<ReadyFile>) {
        let now = timer::now_ms();
        let delta = self.timers.nearest(now).saturating_sub(now);
        let timeout_ms = if delta == 0 {
            MIN_WAIT_MS
        } else {
            i32::try_from(delta).unwrap_or(i32::MAX)
        };

        let n = match self.poller.wait(&mut self.events, timeout_ms) {
            Ok(n) => n,
            Err(e) => {
                warn!("poller wait failed: {}", e);
                0
            }
        };
        if n > 0 {
            debug!("{} descriptors ready", n);
        }

        // A descriptor may be ready in both directions at once; each
        // direction's registration is collected independently, preserving
        // the poller's report order across descriptors.
        let mut ready = Vec::new();
        for ev in self.events.iter().take(n) {
            if ev.readable {
                if let Some(proc) = self.file_events.get(&(ev.fd, Direction::Readable)) {
                    ready.push(ReadyFile { fd: ev.fd, dir: Direction::Readable, proc: proc.clone() });
                }
            }
            if ev.writable {
                if let Some(proc) = self.file_events.get(&(ev.fd, Direction::Writable)) {
                    ready.push(ReadyFile { fd: ev.fd, dir: Direction::Writable, proc: proc.clone() });
                }
            }
        }

        let due = self.timers.due(timer::now_ms());
        (due, ready)
    }

    /// Process phase: due timers first, then ready file events, each in
    /// collected order.  An entry removed by an earlier callback in the same
    /// batch is skipped — liveness is re-checked against the registry
    /// immediately before every dispatch.
    fn process(&mut self, due: Vec<DueTimer>, ready: Vec<ReadyFile>) {
        for t in due {
            if !self.timers.contains(t.id) {
                continue;
            }
            (t.proc)(self, t.id);
            let retire = match self.timers.get_mut(t.id) {
                Some(te) if te.mode == FireMode::Repeating => {
                    // Re-armed from dispatch time, not the original
                    // schedule: drift under load is accepted.
                    te.when_ms = timer::now_ms() + te.interval_ms;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if retire {
                self.timers.remove(t.id);
            }
        }
        for f in ready {
            if !self.file_events.contains_key(&(f.fd, f.dir)) {
                continue;
            }
            (f.proc)(self, f.fd);
        }
    }

    /// Blocking main driver: alternates Wait and Process until the stop flag
    /// is observed at the top of an iteration.  Stop is terminal; a stopped
    /// loop is never re-entered (construct a new one instead).
    pub fn run(&mut self) {
        debug!("event loop running");
        while !self.stop {
            let (due, ready) = self.wait();
            self.process(due, ready);
        }
        debug!("event loop stopped");
    }

    /// Requests orderly termination.  Observed at the top of the next
    /// iteration, not preemptively: an in-flight wait still runs out its
    /// bounded timeout.
    pub fn stop(&mut self) {
        self.stop = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Add(RawFd, bool, bool),
        Modify(RawFd, bool, bool),
        Delete(RawFd),
        Wait(i32),
    }

    /// Records every poller call and replays scripted readiness batches.
    #[derive(Default)]
    struct FakePoller {
        ops: RefCell<Vec<Op>>,
        batches: RefCell<VecDeque<Vec<Event>>>,
        fail_subscribe: Cell<bool>,
    }

    impl FakePoller {
        fn ops(&self) -> Vec<Op> {
            self.ops.borrow().clone()
        }

        fn push_batch(&self, batch: Vec<Event>) {
            self.batches.borrow_mut().push_back(batch);
        }
    }

    impl Poller for Rc<FakePoller> {
        fn add(&self, fd: RawFd, readable: bool, writable: bool) -> io::Result<()> {
            self.ops.borrow_mut().push(Op::Add(fd, readable, writable));
            if self.fail_subscribe.get() {
                return Err(io::Error::new(io::ErrorKind::Other, "subscribe refused"));
            }
            Ok(())
        }

        fn modify(&self, fd: RawFd, readable: bool, writable: bool) -> io::Result<()> {
            self.ops.borrow_mut().push(Op::Modify(fd, readable, writable));
            if self.fail_subscribe.get() {
                return Err(io::Error::new(io::ErrorKind::Other, "subscribe refused"));
            }
            Ok(())
        }

        fn delete(&self, fd: RawFd) -> io::Result<()> {
            self.ops.borrow_mut().push(Op::Delete(fd));
            Ok(())
        }

        fn wait(&self, events: &mut [Event], timeout_ms: i32) -> io::Result<usize> {
            self.ops.borrow_mut().push(Op::Wait(timeout_ms));
            match self.batches.borrow_mut().pop_front() {
                Some(batch) => {
                    let n = batch.len().min(events.len());
                    events[..n].copy_from_slice(&batch[..n]);
                    Ok(n)
                }
                None => Ok(0),
            }
        }
    }

    fn fake_loop() -> (EventLoop, Rc<FakePoller>) {
        let fake = Rc::new(FakePoller::default());
        (EventLoop::with_poller(Box::new(fake.clone())), fake)
    }

    fn noop_file() -> FileProc {
        Rc::new(|_loop, _fd| {})
    }

    #[test]
    fn duplicate_file_event_is_idempotent() {
        let (mut el, fake) = fake_loop();
        el.add_file_event(5, Direction::Readable, noop_file());
        el.add_file_event(5, Direction::Readable, noop_file());
        assert_eq!(fake.ops(), vec![Op::Add(5, true, false)]);
        assert_eq!(el.registered_file_events(), 1);
    }

    #[test]
    fn mask_widens_with_modify_and_shrinks_to_delete() {
        let (mut el, fake) = fake_loop();
        el.add_file_event(5, Direction::Readable, noop_file());
        el.add_file_event(5, Direction::Writable, noop_file());
        el.remove_file_event(5, Direction::Readable);
        el.remove_file_event(5, Direction::Writable);
        assert_eq!(
            fake.ops(),
            vec![
                Op::Add(5, true, false),
                Op::Modify(5, true, true),
                Op::Modify(5, false, true),
                Op::Delete(5),
            ]
        );
        assert_eq!(el.registered_file_events(), 0);
    }

    #[test]
    fn failed_subscribe_stores_no_entry() {
        let (mut el, fake) = fake_loop();
        fake.fail_subscribe.set(true);
        el.add_file_event(5, Direction::Readable, noop_file());
        assert_eq!(el.registered_file_events(), 0);
        assert_eq!(fake.ops(), vec![Op::Add(5, true, false)]);
    }

    #[test]
    fn removing_an_absent_file_event_is_harmless() {
        let (mut el, fake) = fake_loop();
        el.remove_file_event(9, Direction::Readable);
        assert_eq!(el.registered_file_events(), 0);
        // The unsubscribe is still issued unconditionally.
        assert_eq!(fake.ops(), vec![Op::Delete(9)]);
    }

    #[test]
    fn overdue_timer_clamps_wait_to_the_floor() {
        let (mut el, fake) = fake_loop();
        el.add_time_event(FireMode::Once, 0, Rc::new(|_l, _id| {}));
        let _ = el.wait();
        assert_eq!(fake.ops().last(), Some(&Op::Wait(MIN_WAIT_MS)));
    }

    #[test]
    fn empty_timer_registry_waits_the_idle_ceiling() {
        let (mut el, fake) = fake_loop();
        let _ = el.wait();
        assert_eq!(fake.ops(), vec![Op::Wait(timer::IDLE_WAKE_MS as i32)]);
    }

    #[test]
    fn both_directions_of_one_descriptor_dispatch() {
        let (mut el, fake) = fake_loop();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        el.add_file_event(7, Direction::Readable, Rc::new(move |_l, fd| {
            o.borrow_mut().push(("r", fd));
        }));
        let o = order.clone();
        el.add_file_event(7, Direction::Writable, Rc::new(move |_l, fd| {
            o.borrow_mut().push(("w", fd));
        }));

        fake.push_batch(vec![Event { fd: 7, readable: true, writable: true }]);
        let (due, ready) = el.wait();
        el.process(due, ready);
        assert_eq!(*order.borrow(), vec![("r", 7), ("w", 7)]);
    }

    #[test]
    fn callback_removing_a_queued_entry_suppresses_its_dispatch() {
        let (mut el, fake) = fake_loop();
        let fired = Rc::new(RefCell::new(Vec::new()));

        let f = fired.clone();
        el.add_file_event(3, Direction::Readable, Rc::new(move |l: &mut EventLoop, fd| {
            f.borrow_mut().push(fd);
            l.remove_file_event(4, Direction::Readable);
        }));
        let f = fired.clone();
        el.add_file_event(4, Direction::Readable, Rc::new(move |_l, fd| {
            f.borrow_mut().push(fd);
        }));

        fake.push_batch(vec![
            Event { fd: 3, readable: true, writable: false },
            Event { fd: 4, readable: true, writable: false },
        ]);
        let (due, ready) = el.wait();
        el.process(due, ready);
        assert_eq!(*fired.borrow(), vec![3]);
    }

    #[test]
    fn once_timer_fires_then_retires() {
        let (mut el, _fake) = fake_loop();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        el.add_time_event(FireMode::Once, 0, Rc::new(move |_l, _id| {
            c.set(c.get() + 1);
        }));

        let (due, ready) = el.wait();
        el.process(due, ready);
        assert_eq!(count.get(), 1);
        assert_eq!(el.pending_time_events(), 0);

        let (due, ready) = el.wait();
        el.process(due, ready);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn repeating_timer_rearms_from_dispatch_time() {
        let (mut el, _fake) = fake_loop();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = el.add_time_event(FireMode::Repeating, 30, Rc::new(move |_l, _id| {
            c.set(c.get() + 1);
        }));

        // Force the event due without waiting out the interval.
        el.timers.get_mut(id).unwrap().when_ms = 0;
        let before = timer::now_ms();
        let (due, ready) = el.wait();
        el.process(due, ready);

        assert_eq!(count.get(), 1);
        assert_eq!(el.pending_time_events(), 1);
        // Rescheduled relative to dispatch, not the (long past) fire time.
        assert!(el.timers.get_mut(id).unwrap().when_ms >= before + 30);
    }

    #[test]
    fn timer_callback_can_cancel_another_due_timer() {
        let (mut el, _fake) = fake_loop();
        let fired = Rc::new(RefCell::new(Vec::new()));

        // Both are due in the same pass; the first cancels the second.
        let f = fired.clone();
        let victim = Rc::new(Cell::new(0));
        let v = victim.clone();
        let first = el.add_time_event(FireMode::Once, 0, Rc::new(move |l: &mut EventLoop, id| {
            f.borrow_mut().push(id);
            l.remove_time_event(v.get());
        }));
        let f = fired.clone();
        let second = el.add_time_event(FireMode::Once, 0, Rc::new(move |_l, id| {
            f.borrow_mut().push(id);
        }));
        victim.set(second);

        let (due, ready) = el.wait();
        assert_eq!(due.len(), 2);
        el.process(due, ready);
        assert_eq!(*fired.borrow(), vec![first]);
        assert_eq!(el.pending_time_events(), 0);
    }

    #[test]
    fn timer_callback_can_schedule_new_events() {
        let (mut el, _fake) = fake_loop();
        el.add_time_event(FireMode::Once, 0, Rc::new(|l: &mut EventLoop, _id| {
            l.add_time_event(FireMode::Once, 500, Rc::new(|_l, _id| {}));
        }));

        let (due, ready) = el.wait();
        el.process(due, ready);
        // The original retired, the newly scheduled one remains.
        assert_eq!(el.pending_time_events(), 1);
    }

    #[test]
    fn stop_from_a_callback_terminates_run() {
        let (mut el, _fake) = fake_loop();
        el.add_time_event(FireMode::Once, 0, Rc::new(|l: &mut EventLoop, _id| {
            l.stop();
        }));
        el.run();
        assert!(el.is_stopped());
    }

    #[test]
    fn independent_loops_assign_independent_ids() {
        let (mut a, _) = fake_loop();
        let (mut b, _) = fake_loop();
        assert_eq!(a.add_time_event(FireMode::Once, 10, Rc::new(|_l, _id| {})), 1);
        assert_eq!(b.add_time_event(FireMode::Once, 10, Rc::new(|_l, _id| {})), 1);
    }
}
