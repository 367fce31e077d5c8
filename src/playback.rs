// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `Playback` (spec.md §4.C): per-source mixing state bound to one
//! [`SoundBuffer`]. Grounded in `original_source/src/core/playback.c`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use crate::buffer::SoundBuffer;
use crate::error::{FsError, FsResult};
use crate::format::{ChannelMode, NUM_CANONICAL_CHANNELS};
use crate::notify::{Notification, NotificationHub, Observer};
use crate::playlist::Playlist;
use crate::sample::Sample;

/// `-3dB`, the default downmix attenuation (`DOWNMIX_LEVEL_3DB` in
/// `original_source/src/core/playback.c`).
pub const DOWNMIX_LEVEL_3DB: f32 = 0.70794578438413791;

/// Identifies the client that created a Playback/Stream, for
/// per-creator local volume (`fs_core_get_local_volume`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreatorId(pub Uuid);

impl CreatorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CreatorId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub running: bool,
    pub position: i64,
    pub looping: bool,
}

struct State {
    position: i64,
    stop: i64,
    pitch: f32,
    direction: f32,
    levels: [Sample; NUM_CANONICAL_CHANNELS],
    center: Sample,
    rear: Sample,
    local_volume: Sample,
    running: bool,
    disabled: bool,
}

/// One mixing source. Every observable state change is serialised by
/// `state`; the Mixer additionally holds the playlist lock while it
/// calls `mix_tick`.
pub struct Playback {
    pub buffer: Arc<SoundBuffer>,
    pub creator: CreatorId,
    state: Mutex<State>,
    end_cv: Condvar,
    notify: NotificationHub,
    /// The playlist this Playback adds/removes itself to/from on
    /// `start`/`stop` (spec.md §4.C: "add to playlist" is part of
    /// `start`, not a separate caller-driven step). `None` until bound
    /// by `Engine::create_playback`/`create_stream`.
    playlist: Mutex<Option<Arc<Playlist>>>,
    /// Lets `start`/`stop` add/remove an `Arc<Self>` without requiring
    /// callers to pass one in.
    self_ref: Weak<Playback>,
}

impl Playback {
    pub fn new(buffer: Arc<SoundBuffer>, creator: CreatorId, local_volume: Sample) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            buffer,
            creator,
            state: Mutex::new(State {
                position: 0,
                stop: 0,
                pitch: 1.0,
                direction: 1.0,
                levels: [Sample::ONE; NUM_CANONICAL_CHANNELS],
                center: Sample::from_f32(DOWNMIX_LEVEL_3DB),
                rear: Sample::from_f32(DOWNMIX_LEVEL_3DB),
                local_volume,
                running: false,
                disabled: false,
            }),
            end_cv: Condvar::new(),
            notify: NotificationHub::new(),
            playlist: Mutex::new(None),
            self_ref: weak.clone(),
        })
    }

    /// Binds the playlist this Playback will add/remove itself to/from.
    /// Called once by the Engine at creation time; a Playback never
    /// bound to a playlist (e.g. the bare unit tests below) simply
    /// never appears in one, which is harmless for callers that drive
    /// `mix_tick` directly.
    pub fn bind_playlist(&self, playlist: Arc<Playlist>) {
        *self.playlist.lock() = Some(playlist);
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.notify.subscribe(observer);
    }

    pub fn enable(&self) {
        self.state.lock().disabled = false;
    }

    pub fn disable(&self) {
        self.state.lock().disabled = true;
    }

    pub fn is_disabled(&self) -> bool {
        self.state.lock().disabled
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Marks this Playback running, adds it to its bound playlist (if
    /// any) and returns the START notification dispatched to observers.
    pub fn start(&self, with_enable: bool) -> FsResult<Option<Notification>> {
        let mut state = self.state.lock();
        if state.disabled && !with_enable {
            return Err(FsError::TemporarilyUnavailable);
        }
        if with_enable {
            state.disabled = false;
        }
        if state.running {
            return Ok(None);
        }
        state.running = true;
        let pos = state.position;
        drop(state);
        self.add_to_bound_playlist();
        self.notify.dispatch(vec![Notification::Start { pos }]);
        Ok(Some(Notification::Start { pos }))
    }

    pub fn stop(&self, with_disable: bool) -> bool {
        let mut state = self.state.lock();
        let was_running = state.running;
        if was_running {
            state.running = false;
        }
        if with_disable {
            state.disabled = true;
        }
        let pos = state.position;
        drop(state);
        if was_running {
            self.remove_from_bound_playlist();
            self.end_cv.notify_all();
            self.notify.dispatch(vec![Notification::Stop { pos }]);
        }
        was_running
    }

    fn add_to_bound_playlist(&self) {
        if let Some(playlist) = self.playlist.lock().clone() {
            if let Some(arc_self) = self.self_ref.upgrade() {
                playlist.add(arc_self);
            }
        }
    }

    fn remove_from_bound_playlist(&self) {
        if let Some(playlist) = self.playlist.lock().clone() {
            if let Some(arc_self) = self.self_ref.upgrade() {
                playlist.remove(&arc_self);
            }
        }
    }

    /// Blocks until this Playback stops running, or `timeout` elapses
    /// (`None` waits forever). A looping Playback (no stop position)
    /// never stops on its own, so waiting on one is `Unsupported`
    /// rather than blocking forever.
    pub fn wait_end(&self, timeout: Option<Duration>) -> FsResult<()> {
        let mut state = self.state.lock();
        if state.stop < 0 {
            return Err(FsError::Unsupported("wait_end on a looping playback".into()));
        }
        while state.running {
            match timeout {
                Some(d) => {
                    if self.end_cv.wait_for(&mut state, d).timed_out() {
                        return Err(FsError::Timeout);
                    }
                }
                None => self.end_cv.wait(&mut state),
            }
        }
        Ok(())
    }

    pub fn set_position(&self, position: i64) -> FsResult<()> {
        let mut state = self.state.lock();
        let length = self.buffer.length() as i64;
        if position < 0 || position >= length {
            return Err(FsError::InvalidArgument(format!(
                "position {position} out of range [0, {length})"
            )));
        }
        state.position = position;
        Ok(())
    }

    pub fn set_stop(&self, stop: i64) {
        self.state.lock().stop = stop;
    }

    /// Pitch magnitude, range documented in spec.md §6 (`±64x`).
    pub fn set_pitch(&self, pitch: f32) -> FsResult<()> {
        if !(0.0..=64.0).contains(&pitch) {
            return Err(FsError::InvalidArgument(format!(
                "pitch {pitch} out of range [0, 64]"
            )));
        }
        self.state.lock().pitch = pitch;
        Ok(())
    }

    pub fn set_direction(&self, forward: bool) {
        self.state.lock().direction = if forward { 1.0 } else { -1.0 };
    }

    pub fn set_volume(&self, levels: [Sample; NUM_CANONICAL_CHANNELS]) {
        self.state.lock().levels = levels;
    }

    pub fn set_downmix(&self, center: Sample, rear: Sample) {
        self.state.lock().center = center;
        self.state.lock().rear = rear;
    }

    pub fn set_local_volume(&self, volume: Sample) {
        self.state.lock().local_volume = volume;
    }

    pub fn status(&self) -> PlaybackStatus {
        let state = self.state.lock();
        PlaybackStatus {
            running: state.running,
            position: state.position,
            looping: state.stop < 0,
        }
    }

    /// Mix one tick into `dest` at `(dest_rate, dest_mode)`, advancing
    /// `position` and delivering `ADVANCE`/`STOP` notifications.
    pub fn mix_tick(
        &self,
        dest: &mut [Sample],
        dest_rate: u32,
        dest_mode: ChannelMode,
        max_frames: usize,
        soft_volume: Sample,
    ) -> FsResult<(usize, bool)> {
        let (pos, stop, pitch, levels, center, rear, volume) = {
            let state = self.state.lock();
            if !state.running || state.disabled {
                return Ok((0, false));
            }
            let combined_volume = state.local_volume.mul(soft_volume);
            (
                state.position,
                state.stop,
                state.pitch * state.direction,
                state.levels,
                state.center,
                state.rear,
                combined_volume,
            )
        };

        let result = self.buffer.mix_into(
            dest, dest_rate, dest_mode, max_frames, pos, stop, levels, center, rear, pitch, volume,
        )?;

        let mut pending = Vec::new();
        {
            let mut state = self.state.lock();
            if result.written_frames > 0 {
                state.position = result.new_pos;
                pending.push(Notification::Advance {
                    pos: result.new_pos,
                    stop: state.stop,
                    num: result.written_frames,
                });
            }
            if result.done {
                state.running = false;
                pending.push(Notification::Stop { pos: result.new_pos });
            }
        }
        if result.done {
            self.end_cv.notify_all();
        }
        self.notify.dispatch(pending);

        Ok((result.written_frames, result.done))
    }
}
