// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `MusicProvider` (spec.md §4.G): external decoder contract. A
//! concrete implementation runs its own decode thread and writes into
//! a destination via the public [`crate::stream::Stream`] API; no
//! other coupling to the engine exists.

use std::sync::Arc;
use std::time::Duration;

use crate::buffer::SoundBuffer;
use crate::config::TrackDescriptor;
use crate::error::FsResult;
use crate::format::{ChannelMode, SampleFormat};
use crate::stream::Stream;

/// Decoder capability bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProviderCapabilities {
    pub basic: bool,
    pub seek: bool,
    pub resample: bool,
    pub half_rate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Unknown,
    Playing,
    Stopped,
    Finished,
}

/// Best-matching descriptors a provider offers for a given source.
#[derive(Debug, Clone, Copy)]
pub struct ProviderFormat {
    pub channel_mode: ChannelMode,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
}

/// When `play_to_buffer`'s per-write callback returns `Break`, decoding
/// stops after the current write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackControl {
    Continue,
    Break,
}

/// A decoder producer (spec.md §4.G). Implementations are boundary
/// contracts only — no concrete decoder ships in this crate beyond the
/// `providers::wave` reference fixture.
pub trait MusicProvider: Send {
    /// Whether this provider can decode a source, given its first 64
    /// bytes, filename, and (optional) MIME type.
    fn probe(first_bytes: &[u8], filename: Option<&str>, mime: Option<&str>) -> bool
    where
        Self: Sized;

    fn capabilities(&self) -> ProviderCapabilities;

    fn track(&self) -> TrackDescriptor;

    fn preferred_format(&self) -> ProviderFormat;

    /// Decode into `dest`, running until EOF, `stop()`, or the callback
    /// requests `Break`. Spawns/uses its own decode thread.
    fn play_to_stream(&mut self, dest: Arc<Stream>) -> FsResult<()>;

    /// Decode into `dest` (a fixed buffer), invoking `on_write` after
    /// each internal write.
    fn play_to_buffer(
        &mut self,
        dest: Arc<SoundBuffer>,
        on_write: Box<dyn FnMut(usize) -> PlaybackControl + Send>,
    ) -> FsResult<()>;

    fn stop(&mut self) -> FsResult<()>;

    fn status(&self) -> ProviderStatus;

    fn seek_to(&mut self, seconds: f64) -> FsResult<()>;

    fn get_pos(&self) -> FsResult<f64>;

    fn get_length(&self) -> FsResult<f64>;

    /// `looping = true` requests the provider restart from position 0
    /// on reaching EOF instead of transitioning to `FINISHED`.
    fn set_playback_flags(&mut self, looping: bool) -> FsResult<()>;

    /// Blocks until `status()` is a member of `mask`, or `timeout`
    /// elapses (`None` waits forever). Returns `Timeout` on deadline.
    fn wait_status(&self, mask: &[ProviderStatus], timeout: Option<Duration>) -> FsResult<ProviderStatus>;
}
