// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `OutputDevice` (spec.md §4.H): the boundary interface the Mixer
//! drives. Concrete back-ends (ALSA, PulseAudio, ...) are deliberately
//! out of scope; this module specifies only the contract.

use crate::error::FsResult;
use crate::format::{ChannelMode, SampleFormat};
use crate::sample::Sample;

/// Device capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    pub hardware_volume: bool,
    pub suspend_resume: bool,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub capabilities: DeviceCapabilities,
}

/// Device open configuration. `buffer_frames` is capped at 65,535 by
/// the Engine before calling `open`.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    pub channel_mode: ChannelMode,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub buffer_frames: u32,
}

pub const MAX_DEVICE_BUFFER_FRAMES: u32 = 65_535;

/// The boundary the Mixer drives each tick. Implementations own the
/// real hardware/backend handle; `get_buffer`/`commit` form an
/// access-session pair (spec.md §9's "typed access session" design
/// note): the Mixer always pairs a `get_buffer` call with either a
/// `commit` of the frames it actually wrote or an early return on
/// error, so no frames are ever committed without having been written.
pub trait OutputDevice: Send {
    fn open(&mut self, config: DeviceConfig) -> FsResult<DeviceInfo>;

    /// Borrow a writable region of at least one frame, blocking if
    /// necessary. Returns the region and how many frames it holds.
    fn get_buffer(&mut self) -> FsResult<(&mut [u8], usize)>;

    fn commit(&mut self, frames: usize) -> FsResult<()>;

    /// Measured output latency, in frames, at the device's sample rate.
    fn get_output_delay(&self) -> FsResult<u32>;

    fn get_volume(&self) -> FsResult<Sample> {
        Err(crate::error::FsError::Unsupported("hardware volume".into()))
    }

    fn set_volume(&mut self, _volume: Sample) -> FsResult<()> {
        Err(crate::error::FsError::Unsupported("hardware volume".into()))
    }

    fn suspend(&mut self) -> FsResult<()>;
    fn resume(&mut self) -> FsResult<()>;
    fn close(&mut self) -> FsResult<()>;
}
