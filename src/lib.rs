// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! FusionSound: a multi-channel real-time sound mixing engine.
//!
//! The hard core is the mixing engine and playback/stream runtime: a
//! real-time [`mixer`] thread, per-source [`playback`] state machines
//! carrying sample data out of [`buffer`]s, a ring-buffered [`stream`]
//! protocol for streaming producers, and the [`engine`] that ties
//! device, playlist and volume state together. Concrete output
//! back-ends and file decoders are boundary traits ([`device`],
//! [`music`]) implemented outside this crate — except for the
//! reference WAVE [`providers::wave`] fixture kept for testing.

pub mod buffer;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod format;
pub mod mixer;
pub mod music;
pub mod notify;
pub mod playback;
pub mod playlist;
pub mod providers;
pub mod realtime;
pub mod sample;
pub mod stream;

pub use buffer::{BufferGuard, MixResult, SoundBuffer};
pub use config::{
    BufferDescriptor, ConfigOverrides, EngineConfig, PresentFlags, StreamDescriptor, TrackDescriptor,
};
pub use device::{DeviceCapabilities, DeviceConfig, DeviceInfo, OutputDevice};
pub use engine::Engine;
pub use error::{FsError, FsResult};
pub use format::{Canonical, ChannelMode, SampleFormat, MAX_CHANNELS, MAX_FRAMES, NUM_CANONICAL_CHANNELS};
pub use music::{MusicProvider, PlaybackControl, ProviderCapabilities, ProviderFormat, ProviderStatus};
pub use notify::{Notification, NotificationHub, Observer};
pub use playback::{CreatorId, Playback, PlaybackStatus};
pub use playlist::Playlist;
pub use sample::Sample;
pub use stream::Stream;
