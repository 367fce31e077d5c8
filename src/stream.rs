// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `Stream` (spec.md §4.D): the ring-buffer producer/consumer protocol
//! backing music decoders and other PCM producers. Grounded in
//! `original_source/src/buffer/ifusionsoundstream.c`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::buffer::SoundBuffer;
use crate::error::{FsError, FsResult};
use crate::format::{ChannelMode, SampleFormat};
use crate::notify::{Notification, Observer};
use crate::playback::{CreatorId, Playback};

struct State {
    pos_write: usize,
    pos_read: usize,
    filled: usize,
    pending: usize,
    playing: bool,
    /// Set by `drop()` to unstick a blocked writer without touching
    /// read/write cursors.
    dropped_pending: bool,
}

/// A ring buffer of `buffersize` frames with a dedicated backing
/// [`Playback`] that drives the consumer side.
pub struct Stream {
    buffer: Arc<SoundBuffer>,
    playback: Arc<Playback>,
    buffersize: usize,
    prebuffer: i64,
    state: Mutex<State>,
    not_full: Condvar,
    wait_cv: Condvar,
}

impl Stream {
    pub fn new(
        format: SampleFormat,
        mode: ChannelMode,
        sample_rate: u32,
        buffersize: usize,
        prebuffer: i64,
        creator: CreatorId,
    ) -> Arc<Self> {
        let buffer = Arc::new(SoundBuffer::new(format, mode, sample_rate, buffersize));
        let playback = Playback::new(buffer.clone(), creator, crate::sample::Sample::ONE);
        playback.disable();
        Arc::new(Self {
            buffer,
            playback,
            buffersize,
            prebuffer,
            state: Mutex::new(State {
                pos_write: 0,
                pos_read: 0,
                filled: 0,
                pending: 0,
                playing: false,
                dropped_pending: false,
            }),
            not_full: Condvar::new(),
            wait_cv: Condvar::new(),
        })
    }

    pub fn playback(&self) -> &Arc<Playback> {
        &self.playback
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    /// Registers this Stream as an observer of its own backing Playback.
    /// Must be called once, after construction, with a clone of the
    /// `Arc<Stream>` that owns `self`.
    pub fn attach(self: &Arc<Self>) {
        self.playback.subscribe(self.clone() as Arc<dyn Observer>);
    }

    /// Blocking writer: copies `data` (raw bytes for `len` frames) into
    /// the ring, waiting while full, re-enabling playback and
    /// triggering prebuffered auto-start as it goes.
    pub fn write(&self, mut data: &[u8], mut len: usize) -> FsResult<()> {
        let frame_bytes = self.buffer.format().bytes_per_sample() * self.buffer.mode().channels();
        {
            let mut state = self.state.lock();
            state.pending = len;
            state.dropped_pending = false;
        }

        while len > 0 {
            let mut state = self.state.lock();
            if state.filled == self.buffersize {
                self.not_full.wait(&mut state);
                if state.dropped_pending {
                    state.pending = 0;
                    return Ok(());
                }
                continue;
            }
            let contiguous = self.buffersize - state.pos_write;
            let n = (self.buffersize - state.filled).min(len).min(contiguous);
            let pos_write = state.pos_write;
            drop(state);

            {
                let mut guard = self.buffer.lock(pos_write, n)?;
                let bytes = n * frame_bytes;
                guard.bytes_mut().copy_from_slice(&data[..bytes]);
            }
            data = &data[n * frame_bytes..];

            let mut state = self.state.lock();
            state.pos_write = (state.pos_write + n) % self.buffersize;
            state.filled += n;
            state.pending = state.pending.saturating_sub(n);
            len -= n;

            self.playback.set_stop(state.pos_write as i64);
            self.playback.enable();

            let should_start = !state.playing && self.prebuffer >= 0 && state.filled >= self.prebuffer as usize;
            drop(state);
            if should_start {
                self.playback.start(true)?;
            }
        }
        Ok(())
    }

    /// Zero-copy variant: blocks until at least one frame is free,
    /// returning a guard over the writable region (without wrap) and
    /// its frame count. Caller MUST call `commit` afterwards and MUST
    /// NOT write past a single contiguous run.
    pub fn access(&self) -> FsResult<(crate::buffer::BufferGuard<'_>, usize)> {
        let (pos_write, n) = {
            let mut state = self.state.lock();
            while state.filled == self.buffersize {
                self.not_full.wait(&mut state);
            }
            let contiguous = self.buffersize - state.pos_write;
            let n = (self.buffersize - state.filled).min(contiguous);
            (state.pos_write, n)
        };
        let guard = self.buffer.lock(pos_write, n)?;
        Ok((guard, n))
    }

    pub fn commit(&self, n: usize) -> FsResult<()> {
        let mut state = self.state.lock();
        state.pos_write = (state.pos_write + n) % self.buffersize;
        state.filled += n;
        state.pending = state.pending.saturating_sub(n);
        let pos_write = state.pos_write;
        let should_start =
            !state.playing && self.prebuffer >= 0 && state.filled >= self.prebuffer as usize;
        drop(state);

        self.playback.set_stop(pos_write as i64);
        self.playback.enable();
        if should_start {
            self.playback.start(true)?;
        }
        Ok(())
    }

    /// Returns when `k == 0 && !playing`, or `k > 0 && (buffersize -
    /// filled) >= k`.
    pub fn wait(&self, k: usize) {
        let mut state = self.state.lock();
        loop {
            let satisfied = if k == 0 {
                !state.playing
            } else {
                (self.buffersize - state.filled) >= k
            };
            if satisfied {
                return;
            }
            self.wait_cv.wait(&mut state);
        }
    }

    pub fn flush(&self) {
        self.playback.stop(false);
        let mut state = self.state.lock();
        while state.playing {
            self.wait_cv.wait(&mut state);
        }
        state.pos_write = state.pos_read;
        state.filled = 0;
    }

    /// Unsticks a blocked writer without touching read/write cursors.
    pub fn drop_pending(&self) {
        let mut state = self.state.lock();
        state.pending = 0;
        state.dropped_pending = true;
        self.not_full.notify_all();
    }

    pub fn presentation_delay_ms(&self, device_output_delay_ms: u32) -> u32 {
        let state = self.state.lock();
        let frames = (state.filled + state.pending) as u64;
        device_output_delay_ms + (frames * 1000 / self.buffer.sample_rate() as u64) as u32
    }

    pub fn filled(&self) -> usize {
        self.state.lock().filled
    }
}

impl Observer for Stream {
    fn notify(&self, event: Notification) {
        let mut state = self.state.lock();
        match event {
            Notification::Start { .. } => {
                state.playing = true;
            }
            Notification::Advance { pos, num, .. } => {
                state.filled = state.filled.saturating_sub(num);
                state.pos_read = pos as usize;
            }
            Notification::Stop { .. } => {
                state.playing = false;
            }
        }
        drop(state);
        self.not_full.notify_all();
        self.wait_cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_stream(buffersize: usize, prebuffer: i64) -> Arc<Stream> {
        let stream = Stream::new(
            SampleFormat::S16,
            ChannelMode::Stereo,
            48_000,
            buffersize,
            prebuffer,
            CreatorId::new(),
        );
        stream.attach();
        stream
    }

    #[test]
    fn write_fills_and_enables_playback() {
        let stream = make_stream(100, -1);
        let frame = vec![0u8; 2 * 2 * 10];
        stream.write(&frame, 10).unwrap();
        assert_eq!(stream.filled(), 10);
        assert!(!stream.playback().is_disabled());
    }

    #[test]
    fn prebuffer_auto_starts_playback() {
        let stream = make_stream(100, 5);
        let frame = vec![0u8; 2 * 2 * 10];
        stream.write(&frame, 10).unwrap();
        assert!(stream.playback().is_running());
    }

    #[test]
    fn flush_resets_filled_and_positions() {
        let stream = make_stream(100, -1);
        let frame = vec![0u8; 2 * 2 * 10];
        stream.write(&frame, 10).unwrap();
        stream.flush();
        assert_eq!(stream.filled(), 0);
    }

    #[test]
    fn presentation_delay_scales_with_filled_frames() {
        let stream = make_stream(48_000, -1);
        let frame = vec![0u8; 2 * 2 * 4800];
        stream.write(&frame, 4800).unwrap();
        let delay = stream.presentation_delay_ms(0);
        assert_eq!(delay, 100);
    }
}
