// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `Mixer` (spec.md §4.E): the real-time thread. Grounded in
//! `original_source/src/core/core_sound.c`'s `fs_sound_thread`.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::device::OutputDevice;
use crate::format::{Canonical, ChannelMode, SampleFormat, NUM_CANONICAL_CHANNELS};
use crate::playlist::Playlist;
use crate::realtime::{AtomicBool, AtomicF32, AtomicI32};
use crate::sample::{encode_sample, DitherState, Sample};

/// State shared between the Engine and its Mixer thread.
pub struct MixerShared {
    pub device: Mutex<Box<dyn OutputDevice>>,
    pub playlist: Arc<Playlist>,
    pub channel_mode: ChannelMode,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub buffer_frames: usize,
    pub soft_master_volume: AtomicF32,
    pub feedback_left: AtomicF32,
    pub feedback_right: AtomicF32,
    pub output_delay_ms: AtomicI32,
    pub dither: bool,
}

/// Owns the mixer thread's lifetime: `stop()` cancels and joins it.
pub struct MixerHandle {
    cancel: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl MixerHandle {
    pub fn spawn(shared: Arc<MixerShared>) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = cancel.clone();
        let join = std::thread::Builder::new()
            .name("fusionsound-mixer".into())
            .spawn(move || run(shared, thread_cancel))
            .expect("failed to spawn mixer thread");
        Self {
            cancel,
            join: Some(join),
        }
    }

    /// Cancel the mixer thread and wait for it to exit (spec.md §4.E
    /// suspend/resume).
    pub fn stop(mut self) {
        self.cancel.set(true);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run(shared: Arc<MixerShared>, cancel: Arc<AtomicBool>) {
    let mut dither_states = vec![DitherState::default(); NUM_CANONICAL_CHANNELS];

    while !cancel.get() {
        if let Ok(delay_frames) = shared.device.lock().get_output_delay() {
            let delay_ms = (delay_frames as u64 * 1000 / shared.sample_rate.max(1) as u64) as i32;
            shared.output_delay_ms.set(delay_ms);
        }

        let mut accum = vec![Sample::ZERO; shared.buffer_frames * NUM_CANONICAL_CHANNELS];

        if shared.playlist.is_empty() {
            shared.playlist.wait_not_empty(Duration::from_millis(5));
            continue;
        }

        let snapshot = shared.playlist.snapshot();
        let mut length = 0usize;
        for playback in &snapshot {
            match playback.mix_tick(
                &mut accum,
                shared.sample_rate,
                shared.channel_mode,
                shared.buffer_frames,
                Sample::from_f32(shared.soft_master_volume.get()),
            ) {
                Ok((written, done)) => {
                    length = length.max(written);
                    if done {
                        shared.playlist.remove(playback);
                    }
                }
                Err(err) => {
                    warn!(?err, "playback mix_tick failed, dropping from playlist");
                    shared.playlist.remove(playback);
                }
            }
        }

        publish_feedback(&shared, &accum, length);

        let mut remaining = length;
        let mut offset = 0usize;
        while remaining > 0 {
            let mut device = shared.device.lock();
            let (bytes, avail_frames) = match device.get_buffer() {
                Ok(v) => v,
                Err(err) => {
                    error!(?err, "device buffer acquisition failed, halting mixer");
                    return;
                }
            };
            let n = avail_frames.min(remaining);
            write_device_frames(
                &shared,
                bytes,
                n,
                &accum[offset * NUM_CANONICAL_CHANNELS..],
                &mut dither_states,
            );
            if let Err(err) = device.commit(n) {
                error!(?err, "device commit failed, halting mixer");
                return;
            }
            remaining -= n;
            offset += n;
        }
    }
    debug!("mixer thread exiting");
}

fn publish_feedback(shared: &MixerShared, accum: &[Sample], length: usize) {
    if length == 0 {
        return;
    }
    let (mut min_l, mut max_l) = (f32::MAX, f32::MIN);
    let (mut min_r, mut max_r) = (f32::MAX, f32::MIN);
    for frame in 0..length {
        let l = accum[frame * NUM_CANONICAL_CHANNELS + Canonical::L as usize].to_f32();
        let r = accum[frame * NUM_CANONICAL_CHANNELS + Canonical::R as usize].to_f32();
        min_l = min_l.min(l);
        max_l = max_l.max(l);
        min_r = min_r.min(r);
        max_r = max_r.max(r);
    }
    shared.feedback_left.set(max_l - min_l);
    shared.feedback_right.set(max_r - min_r);
}

fn write_device_frames(
    shared: &MixerShared,
    bytes: &mut [u8],
    n: usize,
    accum: &[Sample],
    dither_states: &mut [DitherState],
) {
    let lanes = shared.channel_mode.output_channels();
    let dest_channels = lanes.len();
    let target_bits = shared.sample_format.depth_bits();
    let ditherable = shared.dither
        && matches!(shared.sample_format, SampleFormat::U8 | SampleFormat::S16);

    for frame in 0..n {
        for (ch, canon) in lanes.iter().enumerate() {
            let mut value = accum[frame * NUM_CANONICAL_CHANNELS + *canon as usize];
            if ditherable {
                value = value.dither(target_bits, &mut dither_states[*canon as usize]);
            }
            value = value.clip();
            encode_sample(bytes, shared.sample_format, frame, ch, dest_channels, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCapabilities, DeviceConfig, DeviceInfo};
    use crate::error::FsResult;

    struct SilentDevice {
        buf: Vec<u8>,
    }

    impl OutputDevice for SilentDevice {
        fn open(&mut self, _config: DeviceConfig) -> FsResult<DeviceInfo> {
            Ok(DeviceInfo {
                name: "silent".into(),
                capabilities: DeviceCapabilities::default(),
            })
        }
        fn get_buffer(&mut self) -> FsResult<(&mut [u8], usize)> {
            let frames = self.buf.len() / 4;
            Ok((&mut self.buf[..], frames))
        }
        fn commit(&mut self, _frames: usize) -> FsResult<()> {
            Ok(())
        }
        fn get_output_delay(&self) -> FsResult<u32> {
            Ok(0)
        }
        fn suspend(&mut self) -> FsResult<()> {
            Ok(())
        }
        fn resume(&mut self) -> FsResult<()> {
            Ok(())
        }
        fn close(&mut self) -> FsResult<()> {
            Ok(())
        }
    }

    #[test]
    fn write_device_frames_round_trips_silence() {
        let shared = MixerShared {
            device: Mutex::new(Box::new(SilentDevice { buf: vec![0u8; 256] })),
            playlist: Arc::new(Playlist::new()),
            channel_mode: ChannelMode::Stereo,
            sample_format: SampleFormat::S16,
            sample_rate: 48_000,
            buffer_frames: 64,
            soft_master_volume: AtomicF32::new(1.0),
            feedback_left: AtomicF32::new(0.0),
            feedback_right: AtomicF32::new(0.0),
            output_delay_ms: AtomicI32::new(0),
            dither: false,
        };
        let accum = vec![Sample::ZERO; 64 * NUM_CANONICAL_CHANNELS];
        let mut states = vec![DitherState::default(); NUM_CANONICAL_CHANNELS];
        let mut bytes = vec![0u8; 64 * 4];
        write_device_frames(&shared, &mut bytes, 64, &accum, &mut states);
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn publish_feedback_reports_zero_for_silence() {
        let shared = MixerShared {
            device: Mutex::new(Box::new(SilentDevice { buf: vec![0u8; 256] })),
            playlist: Arc::new(Playlist::new()),
            channel_mode: ChannelMode::Stereo,
            sample_format: SampleFormat::S16,
            sample_rate: 48_000,
            buffer_frames: 64,
            soft_master_volume: AtomicF32::new(1.0),
            feedback_left: AtomicF32::new(0.0),
            feedback_right: AtomicF32::new(0.0),
            output_delay_ms: AtomicI32::new(0),
            dither: false,
        };
        let accum = vec![Sample::ZERO; 64 * NUM_CANONICAL_CHANNELS];
        publish_feedback(&shared, &accum, 64);
        assert_eq!(shared.feedback_left.get(), 0.0);
        assert_eq!(shared.feedback_right.get(), 0.0);
    }
}
