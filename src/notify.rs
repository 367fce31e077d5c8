// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Playback notification delivery (spec.md §3, §9 redesign flag
//! "Notification callbacks under locks").
//!
//! The original delivers `CPNF_START`/`CPNF_STOP`/`CPNF_ADVANCE`
//! synchronously from inside the playback lock
//! (`original_source/src/buffer/ifusionsoundstream.c`'s `React`). Here
//! callers accumulate [`Notification`]s into a plain `Vec` while their
//! state lock is held, then hand the batch to a [`NotificationHub`] to
//! dispatch to observers once the lock has been released — observers
//! may safely signal a condition variable from `notify()` without risk
//! of deadlocking against the lock that produced the event.

use std::sync::Arc;

use parking_lot::Mutex;

/// One playback lifecycle event, carrying `(pos, stop, num)` per
/// spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Start { pos: i64 },
    Stop { pos: i64 },
    Advance { pos: i64, stop: i64, num: usize },
}

/// An observer of a single Playback's notification stream. Implementors
/// MUST NOT call back into mutating operations on that Playback from
/// `notify` (spec.md §4.C) — the `Stream` observer instead wakes its
/// own condition variable.
pub trait Observer: Send + Sync {
    fn notify(&self, event: Notification);
}

/// Per-Playback fan-out list plus queued dispatch.
#[derive(Default)]
pub struct NotificationHub {
    observers: Mutex<Vec<Arc<dyn Observer>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.observers.lock().push(observer);
    }

    /// Deliver a batch of events, in order, to every observer. Callers
    /// MUST invoke this after releasing their own state lock.
    pub fn dispatch(&self, pending: Vec<Notification>) {
        if pending.is_empty() {
            return;
        }
        let observers = self.observers.lock().clone();
        for event in pending {
            for observer in &observers {
                observer.notify(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl Observer for Counter {
        fn notify(&self, _event: Notification) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatch_reaches_all_subscribers_in_order() {
        let hub = NotificationHub::new();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        hub.subscribe(a.clone());
        hub.subscribe(b.clone());

        hub.dispatch(vec![
            Notification::Start { pos: 0 },
            Notification::Advance { pos: 10, stop: -1, num: 10 },
        ]);

        assert_eq!(a.0.load(Ordering::SeqCst), 2);
        assert_eq!(b.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let hub = NotificationHub::new();
        let counted = Arc::new(Counter(AtomicUsize::new(0)));
        hub.subscribe(counted.clone());
        hub.dispatch(vec![]);
        assert_eq!(counted.0.load(Ordering::SeqCst), 0);
    }
}
