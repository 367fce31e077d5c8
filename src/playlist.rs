// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `Playlist` (spec.md §3): the set of running [`Playback`]s the Mixer
//! walks each tick. A `Mutex` + `Condvar` pair so the mixer thread can
//! block when the list is empty instead of busy-spinning.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::playback::Playback;

#[derive(Default)]
pub struct Playlist {
    entries: Mutex<Vec<Arc<Playback>>>,
    not_empty: Condvar,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, playback: Arc<Playback>) {
        let mut entries = self.entries.lock();
        entries.push(playback);
        self.not_empty.notify_all();
    }

    pub fn remove(&self, playback: &Arc<Playback>) {
        let mut entries = self.entries.lock();
        entries.retain(|p| !Arc::ptr_eq(p, playback));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot the current entries for one mixer tick.
    pub fn snapshot(&self) -> Vec<Arc<Playback>> {
        self.entries.lock().clone()
    }

    /// Wait until the list is non-empty or `timeout` elapses, whichever
    /// comes first. `timeout = Duration::ZERO` polls without blocking.
    pub fn wait_not_empty(&self, timeout: Duration) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() || timeout.is_zero() {
            return;
        }
        self.not_empty.wait_for(&mut entries, timeout);
    }
}
