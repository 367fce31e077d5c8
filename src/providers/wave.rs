// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reference `MusicProvider` for uncompressed WAVE/PCM (spec.md §4.G,
//! Testable Property S6). A demonstration/test fixture, not part of
//! the hard-core mixing engine; grounded in
//! `original_source/interfaces/IFusionSoundMusicProvider/ifusionsoundmusicprovider_wave.c`
//! but written from scratch in this crate's idiom rather than
//! transliterated.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::config::TrackDescriptor;
use crate::error::{FsError, FsResult};
use crate::format::{ChannelMode, SampleFormat};
use crate::music::{MusicProvider, PlaybackControl, ProviderCapabilities, ProviderFormat, ProviderStatus};
use crate::stream::Stream;

const WRITE_CHUNK_FRAMES: usize = 4096;

struct ParsedWave {
    data: Vec<u8>,
    data_offset: usize,
    data_len_bytes: usize,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Checks `first_bytes` for the RIFF/WAVE/fmt signature spec.md §6
/// specifies, without requiring the whole file.
pub fn probe(first_bytes: &[u8]) -> bool {
    if first_bytes.len() < 12 {
        return false;
    }
    if &first_bytes[0..4] != b"RIFF" || &first_bytes[8..12] != b"WAVE" {
        return false;
    }
    first_bytes
        .windows(4)
        .skip(12)
        .any(|w| w == b"fmt ")
}

/// WAVE header fields are packed little-endian regardless of host
/// endianness; `pod_read_unaligned` reinterprets the bytes natively, so
/// the result is normalized with `from_le` to stay correct on a
/// big-endian host.
fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le(bytemuck::pod_read_unaligned(bytes))
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le(bytemuck::pod_read_unaligned(bytes))
}

fn parse(data: Vec<u8>) -> FsResult<ParsedWave> {
    if !probe(&data[..data.len().min(64)]) {
        return Err(FsError::Unsupported("not a RIFF/WAVE stream".into()));
    }

    let mut offset = 12usize;
    let mut channels = None;
    let mut sample_rate = None;
    let mut bits_per_sample = None;
    let mut data_offset = None;
    let mut data_len = None;

    while offset + 8 <= data.len() {
        let chunk_id = &data[offset..offset + 4];
        let chunk_size = read_u32_le(&data[offset + 4..offset + 8]) as usize;
        let body = offset + 8;

        if chunk_id == b"fmt " {
            if body + 16 > data.len() {
                return Err(FsError::IoFailure("truncated fmt chunk".into()));
            }
            let audio_format = read_u16_le(&data[body..body + 2]);
            if audio_format != 1 {
                return Err(FsError::Unsupported(format!(
                    "WAVE audio format {audio_format} is not PCM"
                )));
            }
            channels = Some(read_u16_le(&data[body + 2..body + 4]));
            sample_rate = Some(read_u32_le(&data[body + 4..body + 8]));
            bits_per_sample = Some(read_u16_le(&data[body + 14..body + 16]));
        } else if chunk_id == b"data" {
            data_offset = Some(body);
            data_len = Some(chunk_size.min(data.len().saturating_sub(body)));
        }

        offset = body + chunk_size + (chunk_size & 1);
    }

    let channels = channels.ok_or_else(|| FsError::IoFailure("missing fmt chunk".into()))?;
    let sample_rate = sample_rate.ok_or_else(|| FsError::IoFailure("missing fmt chunk".into()))?;
    let bits_per_sample = bits_per_sample.ok_or_else(|| FsError::IoFailure("missing fmt chunk".into()))?;
    let data_offset = data_offset.ok_or_else(|| FsError::IoFailure("missing data chunk".into()))?;
    let data_len_bytes = data_len.ok_or_else(|| FsError::IoFailure("missing data chunk".into()))?;

    if !matches!(bits_per_sample, 8 | 16 | 24 | 32) {
        return Err(FsError::Unsupported(format!(
            "unsupported bit depth {bits_per_sample}"
        )));
    }

    Ok(ParsedWave {
        data,
        data_offset,
        data_len_bytes,
        channels,
        sample_rate,
        bits_per_sample,
    })
}

fn channel_mode_for(channels: u16) -> FsResult<ChannelMode> {
    match channels {
        1 => Ok(ChannelMode::Mono),
        2 => Ok(ChannelMode::Stereo),
        _ => Err(FsError::Unsupported(format!(
            "{channels}-channel WAVE files are not supported"
        ))),
    }
}

fn sample_format_for(bits: u16) -> FsResult<SampleFormat> {
    match bits {
        8 => Ok(SampleFormat::U8),
        16 => Ok(SampleFormat::S16),
        24 => Ok(SampleFormat::S24),
        32 => Ok(SampleFormat::S32),
        _ => Err(FsError::Unsupported(format!("unsupported bit depth {bits}"))),
    }
}

struct Shared {
    status: Mutex<ProviderStatus>,
    status_changed: Condvar,
    looping: AtomicBool,
    pos_frames: AtomicU64,
    cancel: AtomicBool,
}

pub struct WaveMusicProvider {
    data: Arc<Vec<u8>>,
    data_offset: usize,
    total_frames: u64,
    frame_bytes: usize,
    channel_mode: ChannelMode,
    sample_format: SampleFormat,
    sample_rate: u32,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl WaveMusicProvider {
    pub fn open(bytes: Vec<u8>) -> FsResult<Self> {
        let parsed = parse(bytes)?;
        let channel_mode = channel_mode_for(parsed.channels)?;
        let sample_format = sample_format_for(parsed.bits_per_sample)?;
        let frame_bytes = sample_format.bytes_per_sample() * parsed.channels as usize;
        let total_frames = (parsed.data_len_bytes / frame_bytes) as u64;

        info!(
            channels = parsed.channels,
            sample_rate = parsed.sample_rate,
            bits = parsed.bits_per_sample,
            total_frames,
            "opened WAVE source"
        );

        Ok(Self {
            data: Arc::new(parsed.data),
            data_offset: parsed.data_offset,
            total_frames,
            frame_bytes,
            channel_mode,
            sample_format,
            sample_rate: parsed.sample_rate,
            shared: Arc::new(Shared {
                status: Mutex::new(ProviderStatus::Unknown),
                status_changed: Condvar::new(),
                looping: AtomicBool::new(false),
                pos_frames: AtomicU64::new(0),
                cancel: AtomicBool::new(false),
            }),
            thread: None,
        })
    }

    fn set_status(&self, status: ProviderStatus) {
        let mut guard = self.shared.status.lock();
        *guard = status;
        self.shared.status_changed.notify_all();
    }
}

impl MusicProvider for WaveMusicProvider {
    fn probe(first_bytes: &[u8], _filename: Option<&str>, _mime: Option<&str>) -> bool {
        probe(first_bytes)
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            basic: true,
            seek: true,
            resample: false,
            half_rate: false,
        }
    }

    fn track(&self) -> TrackDescriptor {
        TrackDescriptor {
            encoding: Some("PCM".into()),
            ..Default::default()
        }
    }

    fn preferred_format(&self) -> ProviderFormat {
        ProviderFormat {
            channel_mode: self.channel_mode,
            sample_format: self.sample_format,
            sample_rate: self.sample_rate,
        }
    }

    fn play_to_stream(&mut self, dest: Arc<Stream>) -> FsResult<()> {
        if self.thread.is_some() {
            return Err(FsError::Busy);
        }
        self.set_status(ProviderStatus::Playing);

        let data = self.data.clone();
        let data_offset = self.data_offset;
        let frame_bytes = self.frame_bytes;
        let total_frames = self.total_frames;
        let shared = self.shared.clone();

        let handle = std::thread::Builder::new()
            .name("fusionsound-wave-decode".into())
            .spawn(move || {
                while !shared.cancel.load(Ordering::SeqCst) {
                    let pos = shared.pos_frames.load(Ordering::SeqCst);
                    if pos >= total_frames {
                        if shared.looping.load(Ordering::SeqCst) {
                            shared.pos_frames.store(0, Ordering::SeqCst);
                            continue;
                        }
                        *shared.status.lock() = ProviderStatus::Finished;
                        shared.status_changed.notify_all();
                        break;
                    }
                    let remaining = (total_frames - pos) as usize;
                    let n = remaining.min(WRITE_CHUNK_FRAMES);
                    let start = data_offset + pos as usize * frame_bytes;
                    let end = start + n * frame_bytes;
                    if dest.write(&data[start..end], n).is_err() {
                        break;
                    }
                    shared.pos_frames.fetch_add(n as u64, Ordering::SeqCst);
                }
                debug!("WAVE decode thread exiting");
            })
            .expect("failed to spawn WAVE decode thread");

        self.thread = Some(handle);
        Ok(())
    }

    fn play_to_buffer(
        &mut self,
        dest: Arc<crate::buffer::SoundBuffer>,
        mut on_write: Box<dyn FnMut(usize) -> PlaybackControl + Send>,
    ) -> FsResult<()> {
        self.set_status(ProviderStatus::Playing);
        let mut pos = self.shared.pos_frames.load(Ordering::SeqCst) as usize;
        loop {
            if pos >= self.total_frames as usize {
                let status = if self.shared.looping.load(Ordering::SeqCst) {
                    pos = 0;
                    continue;
                } else {
                    ProviderStatus::Finished
                };
                self.set_status(status);
                break;
            }
            let n = (self.total_frames as usize - pos).min(dest.length());
            let start = self.data_offset + pos * self.frame_bytes;
            let end = start + n * self.frame_bytes;
            {
                let mut guard = dest.lock(0, n)?;
                guard.bytes_mut().copy_from_slice(&self.data[start..end]);
            }
            pos += n;
            self.shared.pos_frames.store(pos as u64, Ordering::SeqCst);
            if on_write(n) == PlaybackControl::Break {
                break;
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> FsResult<()> {
        self.shared.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.shared.cancel.store(false, Ordering::SeqCst);
        self.set_status(ProviderStatus::Stopped);
        Ok(())
    }

    fn status(&self) -> ProviderStatus {
        *self.shared.status.lock()
    }

    fn seek_to(&mut self, seconds: f64) -> FsResult<()> {
        if seconds < 0.0 {
            return Err(FsError::InvalidArgument("seek position must be >= 0".into()));
        }
        let frame = ((seconds * self.sample_rate as f64).round() as u64).min(self.total_frames);
        self.shared.pos_frames.store(frame, Ordering::SeqCst);
        Ok(())
    }

    fn get_pos(&self) -> FsResult<f64> {
        Ok(self.shared.pos_frames.load(Ordering::SeqCst) as f64 / self.sample_rate as f64)
    }

    fn get_length(&self) -> FsResult<f64> {
        Ok(self.total_frames as f64 / self.sample_rate as f64)
    }

    fn set_playback_flags(&mut self, looping: bool) -> FsResult<()> {
        self.shared.looping.store(looping, Ordering::SeqCst);
        Ok(())
    }

    fn wait_status(&self, mask: &[ProviderStatus], timeout: Option<Duration>) -> FsResult<ProviderStatus> {
        let mut guard = self.shared.status.lock();
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if mask.contains(&*guard) {
                return Ok(*guard);
            }
            match deadline {
                None => self.shared.status_changed.wait(&mut guard),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(FsError::Timeout);
                    }
                    self.shared.status_changed.wait_for(&mut guard, deadline - now);
                }
            }
        }
    }
}

impl Drop for WaveMusicProvider {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
