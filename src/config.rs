// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Configuration structs (spec.md §6, SPEC_FULL.md §0). Serde/toml
//! merge pattern adapted from the teacher's
//! `crates/sootmix-daemon/src/config.rs` `ConfigManager`; defaults
//! mirror `original_source/src/misc/sound_conf.c`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};
use crate::format::{ChannelMode, SampleFormat};

/// System and user config file locations, in override order (spec.md
/// §6's "Sources": system file, user file, per-program system file,
/// per-program user file). Locating these is the extent of this
/// crate's config-path involvement; reading and parsing a chosen path
/// is the host's job.
pub fn config_search_paths(qualifier: &str, organization: &str, application: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dirs) = directories::ProjectDirs::from(qualifier, organization, application) {
        paths.push(dirs.config_dir().join("fusionsound.toml"));
        paths.push(dirs.config_dir().join(format!("{application}.toml")));
    }
    paths
}

/// Device/mixer-wide configuration. Defaults match
/// `fs_conf_init`/`fs_config`'s defaults: stereo, S16, 48kHz, 25ms
/// buffers, dither disabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub channel_mode: ChannelMode,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    /// Nominal device buffer size, in milliseconds (`buffertime`).
    pub buffer_time_ms: u32,
    pub dither: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_mode: ChannelMode::Stereo,
            sample_format: SampleFormat::S16,
            sample_rate: 48_000,
            buffer_time_ms: 25,
            dither: false,
        }
    }
}

impl EngineConfig {
    pub fn buffer_frames(&self) -> u32 {
        (self.sample_rate as u64 * self.buffer_time_ms as u64 / 1000) as u32
    }

    /// Merge the recognised key set from spec.md §6
    /// (`channels`/`channelmode`, `sampleformat`, `samplerate`,
    /// `buffertime`, `dither`) parsed by the host into this config.
    /// Parsing the raw key/value strings themselves remains the host's
    /// job per spec.md §1's Non-goals.
    pub fn apply_overrides(mut self, overrides: &ConfigOverrides) -> FsResult<Self> {
        if let Some(mode) = overrides.channel_mode {
            self.channel_mode = mode;
        }
        if let Some(format) = overrides.sample_format {
            self.sample_format = format;
        }
        if let Some(rate) = overrides.sample_rate {
            if rate == 0 {
                return Err(FsError::InvalidArgument("samplerate must be >= 1".into()));
            }
            self.sample_rate = rate;
        }
        if let Some(buffertime) = overrides.buffer_time_ms {
            if !(1..=5000).contains(&buffertime) {
                return Err(FsError::InvalidArgument(
                    "buffertime must be in [1, 5000] ms".into(),
                ));
            }
            self.buffer_time_ms = buffertime;
        }
        if let Some(dither) = overrides.dither {
            self.dither = dither;
        }
        Ok(self)
    }
}

/// Toml-deserializable overlay over [`EngineConfig`]; absent fields
/// leave the base config's value untouched. One source among several
/// the host may apply in order (system file, user file, per-program
/// files, environment, CLI flags per spec.md §6) — the crate only
/// exposes the merge step, not the parsing of any particular source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    pub channel_mode: Option<ChannelMode>,
    pub sample_format: Option<SampleFormat>,
    pub sample_rate: Option<u32>,
    pub buffer_time_ms: Option<u32>,
    pub dither: Option<bool>,
}

impl ConfigOverrides {
    pub fn from_toml_str(s: &str) -> FsResult<Self> {
        toml::from_str(s).map_err(|e| FsError::InvalidArgument(e.to_string()))
    }
}

/// Bitmask of which `BufferDescriptor` fields the caller set
/// explicitly; absent fields default from `EngineConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PresentFlags {
    pub channel_mode: bool,
    pub sample_format: bool,
    pub sample_rate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferDescriptor {
    pub length_frames: usize,
    pub channel_mode: ChannelMode,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub present: PresentFlags,
}

impl Default for BufferDescriptor {
    fn default() -> Self {
        Self {
            length_frames: 0,
            channel_mode: ChannelMode::Stereo,
            sample_format: SampleFormat::S16,
            sample_rate: 48_000,
            present: PresentFlags::default(),
        }
    }
}

impl BufferDescriptor {
    pub fn with_defaults(mut self, config: &EngineConfig) -> Self {
        if !self.present.channel_mode {
            self.channel_mode = config.channel_mode;
        }
        if !self.present.sample_format {
            self.sample_format = config.sample_format;
        }
        if !self.present.sample_rate {
            self.sample_rate = config.sample_rate;
        }
        self
    }
}

/// Stream descriptor (spec.md §6). Defaults: `buffersize =
/// sample_rate / 5`, `prebuffer = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub buffersize_frames: usize,
    pub channel_mode: ChannelMode,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub prebuffer: i64,
    pub present: PresentFlags,
}

impl Default for StreamDescriptor {
    fn default() -> Self {
        Self {
            buffersize_frames: 0,
            channel_mode: ChannelMode::Stereo,
            sample_format: SampleFormat::S16,
            sample_rate: 48_000,
            prebuffer: 0,
            present: PresentFlags::default(),
        }
    }
}

impl StreamDescriptor {
    pub fn with_defaults(mut self, config: &EngineConfig) -> Self {
        if !self.present.channel_mode {
            self.channel_mode = config.channel_mode;
        }
        if !self.present.sample_format {
            self.sample_format = config.sample_format;
        }
        if !self.present.sample_rate {
            self.sample_rate = config.sample_rate;
        }
        if self.buffersize_frames == 0 {
            self.buffersize_frames = (self.sample_rate / 5) as usize;
        }
        self
    }
}

/// Music provider track metadata (spec.md §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub encoding: Option<String>,
    pub bitrate: Option<u32>,
    pub replaygain: Option<f32>,
    pub replaygain_album: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_config_matches_original_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.channel_mode, ChannelMode::Stereo);
        assert_eq!(config.sample_format, SampleFormat::S16);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.buffer_time_ms, 25);
        assert!(!config.dither);
        assert_eq!(config.buffer_frames(), 1200);
    }

    #[test]
    fn config_search_paths_names_both_candidate_files() {
        let paths = config_search_paths("org", "fusionsound", "fusionsound");
        if !paths.is_empty() {
            assert!(paths.iter().any(|p| p.ends_with("fusionsound.toml")));
        }
    }

    #[test]
    fn apply_overrides_rejects_out_of_range_buffertime() {
        let config = EngineConfig::default();
        let overrides = ConfigOverrides {
            buffer_time_ms: Some(6000),
            ..Default::default()
        };
        assert!(config.apply_overrides(&overrides).is_err());
    }

    #[test]
    fn stream_descriptor_defaults_buffersize_from_sample_rate() {
        let desc = StreamDescriptor {
            sample_rate: 44_100,
            present: PresentFlags {
                sample_rate: true,
                ..Default::default()
            },
            ..Default::default()
        }
        .with_defaults(&EngineConfig::default());
        assert_eq!(desc.buffersize_frames, 44_100 / 5);
    }

    #[test]
    fn overrides_round_trip_through_toml() {
        let toml = "sample_rate = 44100\ndither = true\n";
        let overrides = ConfigOverrides::from_toml_str(toml).unwrap();
        assert_eq!(overrides.sample_rate, Some(44_100));
        assert_eq!(overrides.dither, Some(true));
    }
}
