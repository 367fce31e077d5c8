// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `Engine` (spec.md §4.F): singleton-scoped owner of the device,
//! playlist, pools, and master/local volume. Grounded in
//! `original_source/src/core/core_sound.c`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::buffer::SoundBuffer;
use crate::config::{BufferDescriptor, EngineConfig, StreamDescriptor};
use crate::device::{DeviceConfig, DeviceInfo, OutputDevice, MAX_DEVICE_BUFFER_FRAMES};
use crate::error::{FsError, FsResult};
use crate::mixer::{MixerHandle, MixerShared};
use crate::playback::{CreatorId, Playback};
use crate::playlist::Playlist;
use crate::realtime::AtomicF32;
use crate::sample::Sample;
use crate::stream::Stream;

/// Serialises master-volume / suspend / resume (spec.md §5 "Engine call
/// lock").
struct CallLock;

pub struct Engine {
    config: EngineConfig,
    playlist: Arc<Playlist>,
    shared: Arc<MixerShared>,
    mixer: Mutex<Option<MixerHandle>>,
    call_lock: Mutex<CallLock>,
    local_volumes: Mutex<HashMap<CreatorId, Sample>>,
    hardware_volume: bool,
    device_info: DeviceInfo,
}

impl Engine {
    /// Opens `device` with the engine's configured format and spawns
    /// the mixer thread.
    pub fn create(config: EngineConfig, mut device: Box<dyn OutputDevice>) -> FsResult<Self> {
        let buffer_frames = config.buffer_frames().min(MAX_DEVICE_BUFFER_FRAMES);
        let device_config = DeviceConfig {
            channel_mode: config.channel_mode,
            sample_format: config.sample_format,
            sample_rate: config.sample_rate,
            buffer_frames,
        };
        let info = device.open(device_config)?;
        info!(device = %info.name, "engine device opened");

        let playlist = Arc::new(Playlist::new());
        let shared = Arc::new(MixerShared {
            device: Mutex::new(device),
            playlist: playlist.clone(),
            channel_mode: config.channel_mode,
            sample_format: config.sample_format,
            sample_rate: config.sample_rate,
            buffer_frames: buffer_frames as usize,
            soft_master_volume: AtomicF32::new(1.0),
            feedback_left: AtomicF32::new(0.0),
            feedback_right: AtomicF32::new(0.0),
            output_delay_ms: crate::realtime::AtomicI32::new(0),
            dither: config.dither,
        });
        let mixer = MixerHandle::spawn(shared.clone());

        Ok(Self {
            config,
            playlist,
            shared,
            mixer: Mutex::new(Some(mixer)),
            call_lock: Mutex::new(CallLock),
            local_volumes: Mutex::new(HashMap::new()),
            hardware_volume: info.capabilities.hardware_volume,
            device_info: info,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The opened device's name and capabilities (spec.md §4.F).
    pub fn get_device_description(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn create_buffer(&self, desc: BufferDescriptor) -> FsResult<Arc<SoundBuffer>> {
        let desc = desc.with_defaults(&self.config);
        if desc.length_frames == 0 || desc.length_frames > crate::format::MAX_FRAMES {
            return Err(FsError::InvalidArgument(format!(
                "length_frames {} out of range",
                desc.length_frames
            )));
        }
        Ok(Arc::new(SoundBuffer::new(
            desc.sample_format,
            desc.channel_mode,
            desc.sample_rate,
            desc.length_frames,
        )))
    }

    pub fn create_playback(&self, buffer: Arc<SoundBuffer>, creator: CreatorId) -> Arc<Playback> {
        let local_volume = self.local_volume_for(creator);
        let playback = Playback::new(buffer, creator, local_volume);
        playback.bind_playlist(self.playlist.clone());
        playback
    }

    pub fn create_stream(&self, desc: StreamDescriptor, creator: CreatorId) -> FsResult<Arc<Stream>> {
        let desc = desc.with_defaults(&self.config);
        if desc.buffersize_frames > 5 * desc.sample_rate as usize {
            return Err(FsError::InvalidArgument(format!(
                "buffersize_frames {} exceeds 5x sample_rate",
                desc.buffersize_frames
            )));
        }
        let stream = Stream::new(
            desc.sample_format,
            desc.channel_mode,
            desc.sample_rate,
            desc.buffersize_frames,
            desc.prebuffer,
            creator,
        );
        stream.attach();
        stream.playback().bind_playlist(self.playlist.clone());
        Ok(stream)
    }

    pub fn get_master_feedback(&self) -> (f32, f32) {
        (
            self.shared.feedback_left.get(),
            self.shared.feedback_right.get(),
        )
    }

    pub fn get_output_delay_ms(&self) -> i32 {
        self.shared.output_delay_ms.get()
    }

    /// Dispatches to hardware volume if the device advertises the
    /// capability, else the soft master volume the mixer applies.
    pub fn set_master_volume(&self, volume: f32) -> FsResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(FsError::InvalidArgument(format!(
                "master volume {volume} out of range [0, 1]"
            )));
        }
        let _guard = self.call_lock.lock();
        if self.hardware_volume {
            self.shared.device.lock().set_volume(Sample::from_f32(volume))
        } else {
            self.shared.soft_master_volume.set(volume);
            Ok(())
        }
    }

    pub fn get_master_volume(&self) -> FsResult<f32> {
        if self.hardware_volume {
            Ok(self.shared.device.lock().get_volume()?.to_f32())
        } else {
            Ok(self.shared.soft_master_volume.get())
        }
    }

    pub fn get_local_volume(&self, creator: CreatorId) -> f32 {
        self.local_volume_for(creator).to_f32()
    }

    /// Updates the stored local volume for `creator` and propagates it
    /// to every Playback whose creator matches, per spec.md §4.F.
    pub fn set_local_volume(&self, creator: CreatorId, volume: f32, playbacks: &[Arc<Playback>]) -> FsResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(FsError::InvalidArgument(format!(
                "local volume {volume} out of range [0, 1]"
            )));
        }
        self.local_volumes.lock().insert(creator, Sample::from_f32(volume));
        for playback in playbacks.iter().filter(|p| p.creator == creator) {
            playback.set_local_volume(Sample::from_f32(volume));
        }
        Ok(())
    }

    fn local_volume_for(&self, creator: CreatorId) -> Sample {
        self.local_volumes
            .lock()
            .get(&creator)
            .copied()
            .unwrap_or(Sample::ONE)
    }

    /// Cancels the mixer thread, waits for it to exit, then suspends
    /// the device (spec.md §4.E).
    pub fn suspend(&self) -> FsResult<()> {
        let _guard = self.call_lock.lock();
        let mut slot = self.mixer.lock();
        let mixer = slot.take().ok_or(FsError::Busy)?;
        mixer.stop();
        self.shared.device.lock().suspend()?;
        info!("engine suspended");
        Ok(())
    }

    /// Resumes the device then respawns the mixer thread.
    pub fn resume(&self) -> FsResult<()> {
        let _guard = self.call_lock.lock();
        let mut slot = self.mixer.lock();
        if slot.is_some() {
            return Err(FsError::Busy);
        }
        self.shared.device.lock().resume()?;
        *slot = Some(MixerHandle::spawn(self.shared.clone()));
        info!("engine resumed");
        Ok(())
    }

    /// Lifetime ordering on destroy (spec.md §4.F): stop mixer thread,
    /// close device, drain playlist, release engine state.
    pub fn destroy(self) -> FsResult<()> {
        if let Some(mixer) = self.mixer.lock().take() {
            mixer.stop();
        }
        self.shared.device.lock().close()?;
        info!("engine destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCapabilities, DeviceInfo};
    use crate::format::{ChannelMode, SampleFormat};

    struct TestDevice {
        capabilities: DeviceCapabilities,
        buf: Vec<u8>,
    }

    impl OutputDevice for TestDevice {
        fn open(&mut self, _config: DeviceConfig) -> FsResult<DeviceInfo> {
            Ok(DeviceInfo {
                name: "test".into(),
                capabilities: self.capabilities,
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

    fn make_engine() -> Engine {
        let device = Box::new(TestDevice {
            capabilities: DeviceCapabilities::default(),
            buf: vec![0u8; 1024],
        });
        Engine::create(EngineConfig::default(), device).unwrap()
    }

    #[test]
    fn soft_volume_used_without_hardware_capability() {
        let engine = make_engine();
        engine.set_master_volume(0.5).unwrap();
        assert!((engine.get_master_volume().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_master_volume_out_of_range() {
        let engine = make_engine();
        assert!(engine.set_master_volume(1.5).is_err());
    }

    #[test]
    fn create_buffer_applies_config_defaults() {
        let engine = make_engine();
        let buffer = engine
            .create_buffer(BufferDescriptor {
                length_frames: 100,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(buffer.sample_rate(), engine.config().sample_rate);
        assert_eq!(buffer.mode(), ChannelMode::Stereo);
        assert_eq!(buffer.format(), SampleFormat::S16);
    }

    #[test]
    fn suspend_then_resume_round_trips() {
        let engine = make_engine();
        engine.suspend().unwrap();
        assert!(matches!(engine.suspend(), Err(FsError::Busy)));
        engine.resume().unwrap();
    }

    #[test]
    fn local_volume_propagates_to_matching_playbacks() {
        let engine = make_engine();
        let creator = CreatorId::new();
        let buffer = engine
            .create_buffer(BufferDescriptor {
                length_frames: 10,
                ..Default::default()
            })
            .unwrap();
        let playback = engine.create_playback(buffer, creator);
        engine.set_local_volume(creator, 0.25, &[playback.clone()]).unwrap();
        assert!((engine.get_local_volume(creator) - 0.25).abs() < 1e-6);
    }
}
