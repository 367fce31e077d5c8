// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `SoundBuffer` (spec.md §4.B): fixed-length sample storage plus the
//! mixing kernel, the hottest path in the engine. Grounded in
//! `original_source/src/core/sound_buffer.c`'s `fs_buffer_create` /
//! `fs_buffer_lock` / `fs_buffer_mixto`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FsError, FsResult};
use crate::format::{Canonical, ChannelMode, SampleFormat, NUM_CANONICAL_CHANNELS};
use crate::sample::{decode_sample, Sample};

/// Q14 fixed-point pitch/cursor scale, matching `FS_PITCH_BITS` in
/// `original_source/src/core/playback.h`.
pub const PITCH_BITS: u32 = 14;
pub const PITCH_ONE: i64 = 1 << PITCH_BITS;

/// Result of one `mix_into` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixResult {
    /// Source frame position to resume from on the next tick.
    pub new_pos: i64,
    /// Source frames the cursor stepped across this call.
    pub mixed_frames: usize,
    /// Destination frames actually accumulated.
    pub written_frames: usize,
    /// Whether the configured `stop` position was reached.
    pub done: bool,
}

/// Raw sample storage for one buffer: fixed format, channel layout,
/// sample rate and frame length, owned for the buffer's lifetime.
pub struct SoundBuffer {
    format: SampleFormat,
    mode: ChannelMode,
    sample_rate: u32,
    length: usize,
    data: Mutex<Vec<u8>>,
    /// Single-lock discipline flag for the public `lock`/`unlock` contract;
    /// `mix_into` bypasses it and locks `data` directly.
    locked: AtomicBool,
}

impl SoundBuffer {
    pub fn new(format: SampleFormat, mode: ChannelMode, sample_rate: u32, length: usize) -> Self {
        let bytes = length * mode.channels() * format.bytes_per_sample();
        Self {
            format,
            mode,
            sample_rate,
            length,
            data: Mutex::new(vec![0u8; bytes]),
            locked: AtomicBool::new(false),
        }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn length(&self) -> usize {
        self.length
    }

    fn frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * self.mode.channels()
    }

    /// Lock `[pos, pos+len)` frames for direct access. `len == 0` means
    /// "to end of buffer".
    pub fn lock(&self, pos: usize, len: usize) -> FsResult<BufferGuard<'_>> {
        if pos > self.length {
            return Err(FsError::InvalidArgument(format!(
                "lock position {pos} exceeds buffer length {}",
                self.length
            )));
        }
        let len = if len == 0 { self.length - pos } else { len };
        if pos + len > self.length {
            return Err(FsError::InvalidArgument(format!(
                "lock range [{pos}, {}) exceeds buffer length {}",
                pos + len,
                self.length
            )));
        }
        if self.locked.swap(true, Ordering::Acquire) {
            return Err(FsError::Locked);
        }
        Ok(BufferGuard {
            buffer: self,
            guard: self.data.lock(),
            pos,
            len,
        })
    }

    /// Structural no-op beyond what `BufferGuard`'s `Drop` already does;
    /// kept so callers can release the discipline flag explicitly.
    pub fn unlock(&self, guard: BufferGuard<'_>) {
        drop(guard);
    }

    /// The mixing kernel. Reads this buffer as the source, accumulating
    /// into `dest` (interleaved `NUM_CANONICAL_CHANNELS`-wide, at least
    /// `max_frames * NUM_CANONICAL_CHANNELS` long). `center`/`rear` are
    /// the Playback's downmix attenuation scalars, applied only to the
    /// excess center/rear energy this buffer carries that `dest_mode`
    /// has nowhere to put (spec.md §4.B/§4.C).
    #[allow(clippy::too_many_arguments)]
    pub fn mix_into(
        &self,
        dest: &mut [Sample],
        dest_rate: u32,
        dest_mode: ChannelMode,
        max_frames: usize,
        pos: i64,
        stop: i64,
        levels: [Sample; NUM_CANONICAL_CHANNELS],
        center: Sample,
        rear: Sample,
        pitch: f32,
        volume: Sample,
    ) -> FsResult<MixResult> {
        if self.length == 0 || max_frames == 0 || dest_rate == 0 {
            return Ok(MixResult {
                new_pos: pos,
                mixed_frames: 0,
                written_frames: 0,
                done: false,
            });
        }

        let combined: [Sample; NUM_CANONICAL_CHANNELS] =
            std::array::from_fn(|i| levels[i].mul(volume));

        let pitch_q14 = (pitch as f64 * PITCH_ONE as f64).round() as i64;
        let inc = (self.sample_rate as i64 * pitch_q14) / dest_rate as i64;

        // Stop-position clamp, ported literally from `fs_buffer_mixto`: a
        // `stop` on the "wrong side" of `pos` for the current direction
        // of motion is first wrapped a full buffer length ahead (forward)
        // or behind (reverse) so "stop == pos" at the start of playback
        // means "run once around the whole buffer", not "stop instantly"
        // (spec.md §3 "interpreted with wrap-around in the direction of
        // motion"; ungrounded literal-distance arithmetic would stop a
        // freshly started effect on its very first tick).
        let mut max_q14 = (max_frames as i64) * inc;
        let mut done = false;
        if stop >= 0 && inc != 0 {
            let mut stop_adj = stop;
            if inc < 0 {
                if pos <= stop_adj {
                    stop_adj -= self.length as i64;
                }
            } else if pos >= stop_adj {
                stop_adj += self.length as i64;
            }
            let tmp = (stop_adj - pos) << PITCH_BITS;
            if inc < 0 {
                if max_q14 <= tmp {
                    max_q14 = tmp;
                    done = true;
                }
            } else if max_q14 >= tmp {
                max_q14 = tmp;
                done = true;
            }
        }

        let n = if inc == 0 {
            max_frames
        } else {
            ((max_q14.unsigned_abs()) / (inc.unsigned_abs())) as usize
        };

        let length_q14 = (self.length as i64) << PITCH_BITS;
        let mut cursor = pos << PITCH_BITS;
        let guard = self.data.lock();

        for i in 0..n {
            cursor = cursor.rem_euclid(length_q14);
            let frame_idx = (cursor >> PITCH_BITS) as usize;

            let src = self.expand_frame(&guard, frame_idx);
            let downmixed = downmix(&src, self.mode, dest_mode, center, rear);

            for (slot, value) in downmixed.into_iter().enumerate() {
                if levels[slot].is_zero() {
                    continue;
                }
                let out = value.mul(combined[slot]);
                let idx = i * NUM_CANONICAL_CHANNELS + slot;
                dest[idx] = dest[idx] + out;
            }

            cursor += inc;
        }
        drop(guard);

        cursor = cursor.rem_euclid(length_q14);
        let new_pos = cursor >> PITCH_BITS;
        let done = done && n > 0;

        Ok(MixResult {
            new_pos,
            mixed_frames: n,
            written_frames: n,
            done,
        })
    }

    /// Step 1 of the kernel: decode one source frame and expand it into
    /// the canonical six-channel intermediate, zero-filling absent
    /// channels. Mono replicates L into R.
    fn expand_frame(&self, bytes: &[u8], frame_idx: usize) -> [Sample; NUM_CANONICAL_CHANNELS] {
        let mut out = [Sample::ZERO; NUM_CANONICAL_CHANNELS];
        let channels = self.mode.channels();
        for (ch, canon) in self.mode.output_channels().iter().enumerate() {
            out[*canon as usize] =
                decode_sample(bytes, self.format, frame_idx, ch, channels);
        }
        if self.mode == ChannelMode::Mono {
            out[Canonical::R as usize] = out[Canonical::L as usize];
        }
        out
    }
}

/// Step 2 of the kernel: fold a canonical source frame down (or up) to
/// `dest_mode`'s channels, per spec.md §4.B's matrix. A source channel
/// that `dest_mode` has no slot for (center, or any rear) folds into
/// L/R scaled by the Playback's `center`/`rear` downmix attenuation —
/// grounded in `original_source/src/core/playback.c`'s
/// `fs_playback_set_downmix`, which only moves that scalar away from
/// unity when "buffer has the channel and the device config lacks it".
/// A channel dest_mode *does* have (center passed straight through, a
/// wide source's rear pair narrowed to dest's single rear slot) is never
/// folded into L/R — doing so would double-count it.
fn downmix(
    src: &[Sample; NUM_CANONICAL_CHANNELS],
    src_mode: ChannelMode,
    dest_mode: ChannelMode,
    center: Sample,
    rear: Sample,
) -> [Sample; NUM_CANONICAL_CHANNELS] {
    use Canonical::*;

    let l = src[L as usize];
    let r = src[R as usize];
    let c = src[C as usize];
    let rl = src[Rl as usize];
    let rr = src[Rr as usize];
    let lfe = src[Lfe as usize];

    let mut out = [Sample::ZERO; NUM_CANONICAL_CHANNELS];

    let mut out_l = l;
    let mut out_r = r;

    if src_mode.has_center() && !dest_mode.has_center() {
        out_l = out_l + c.mul(center);
        out_r = out_r + c.mul(center);
    }

    if src_mode.num_rears() > 0 && dest_mode.num_rears() == 0 {
        let single_rear = if src_mode.num_rears() == 2 { (rl + rr) * 0.5 } else { rl };
        out_l = out_l + single_rear.mul(rear);
        out_r = out_r + single_rear.mul(rear);
    }

    out[L as usize] = out_l;
    out[R as usize] = out_r;

    if dest_mode.has_center() {
        out[C as usize] = if src_mode.has_center() {
            c
        } else {
            (l + r) * 0.5
        };
    }

    match dest_mode.num_rears() {
        2 => {
            let (dl, dr) = match src_mode.num_rears() {
                2 => (rl, rr),
                1 => (rl, rl),
                _ => (Sample::ZERO, Sample::ZERO),
            };
            out[Rl as usize] = dl;
            out[Rr as usize] = dr;
        }
        1 => {
            let single = match src_mode.num_rears() {
                2 => (rl + rr) * 0.5,
                1 => rl,
                _ => Sample::ZERO,
            };
            out[Rl as usize] = single;
        }
        _ => {}
    }

    if dest_mode.has_lfe() {
        out[Lfe as usize] = lfe;
    }

    out
}

/// A held lock over `[pos, pos+len)` frames of a [`SoundBuffer`].
/// Releases the single-lock discipline flag on drop.
pub struct BufferGuard<'a> {
    buffer: &'a SoundBuffer,
    guard: parking_lot::MutexGuard<'a, Vec<u8>>,
    pos: usize,
    len: usize,
}

impl<'a> BufferGuard<'a> {
    pub fn frames(&self) -> usize {
        self.len
    }

    pub fn bytes(&self) -> &[u8] {
        let stride = self.buffer.frame_bytes();
        &self.guard[self.pos * stride..(self.pos + self.len) * stride]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let stride = self.buffer.frame_bytes();
        &mut self.guard[self.pos * stride..(self.pos + self.len) * stride]
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        self.buffer.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_buffer(mode: ChannelMode, length: usize) -> SoundBuffer {
        SoundBuffer::new(SampleFormat::S16, mode, 48_000, length)
    }

    #[test]
    fn lock_rejects_out_of_range() {
        let buf = silent_buffer(ChannelMode::Stereo, 100);
        assert!(buf.lock(90, 20).is_err());
        assert!(buf.lock(101, 0).is_err());
    }

    #[test]
    fn lock_is_exclusive() {
        let buf = silent_buffer(ChannelMode::Stereo, 100);
        let first = buf.lock(0, 10).unwrap();
        assert!(matches!(buf.lock(10, 10), Err(FsError::Locked)));
        drop(first);
        assert!(buf.lock(10, 10).is_ok());
    }

    #[test]
    fn mix_into_silence_produces_silence() {
        let buf = silent_buffer(ChannelMode::Stereo, 480);
        let mut dest = vec![Sample::ZERO; 128 * NUM_CANONICAL_CHANNELS];
        let levels = [Sample::ONE; NUM_CANONICAL_CHANNELS];
        let result = buf
            .mix_into(
                &mut dest,
                48_000,
                ChannelMode::Stereo,
                128,
                0,
                -1,
                levels,
                Sample::ONE,
                Sample::ONE,
                1.0,
                Sample::ONE,
            )
            .unwrap();
        assert_eq!(result.written_frames, 128);
        assert!(!result.done);
        assert!(dest.iter().all(|s| s.to_f32() == 0.0));
    }

    #[test]
    fn mix_into_respects_stop_position() {
        let buf = silent_buffer(ChannelMode::Mono, 1000);
        let mut dest = vec![Sample::ZERO; 200 * NUM_CANONICAL_CHANNELS];
        let levels = [Sample::ONE; NUM_CANONICAL_CHANNELS];
        let result = buf
            .mix_into(
                &mut dest,
                48_000,
                ChannelMode::Mono,
                200,
                0,
                50,
                levels,
                Sample::ONE,
                Sample::ONE,
                1.0,
                Sample::ONE,
            )
            .unwrap();
        assert!(result.done);
        assert_eq!(result.written_frames, 50);
    }

    #[test]
    fn mono_replicates_into_right_channel() {
        let buf = silent_buffer(ChannelMode::Mono, 10);
        {
            let mut guard = buf.lock(0, 10).unwrap();
            let bytes = guard.bytes_mut();
            for frame in bytes.chunks_mut(2) {
                frame.copy_from_slice(&16000i16.to_ne_bytes());
            }
        }
        let mut dest = vec![Sample::ZERO; 4 * NUM_CANONICAL_CHANNELS];
        let levels = [Sample::ONE; NUM_CANONICAL_CHANNELS];
        buf.mix_into(
            &mut dest,
            48_000,
            ChannelMode::Stereo,
            4,
            0,
            -1,
            levels,
            Sample::ONE,
            Sample::ONE,
            1.0,
            Sample::ONE,
        )
        .unwrap();
        let l = dest[Canonical::L as usize].to_f32();
        let r = dest[Canonical::R as usize].to_f32();
        assert!((l - r).abs() < 1e-4);
        assert!(l > 0.0);
    }

    /// Testable Property S5: a 5.1 source carrying only center at
    /// -6dBFS, downmixed to stereo, lands in L/R scaled by the default
    /// -3dB downmix attenuation (no extra 0.75 stacking).
    #[test]
    fn downmix_center_into_stereo_uses_attenuation_not_fixed_coefficient() {
        let buf = silent_buffer(ChannelMode::Surround51, 10);
        let minus_6db = 0.5011872336272722_f32; // 10^(-6/20)
        {
            let mut guard = buf.lock(0, 10).unwrap();
            let bytes = guard.bytes_mut();
            let sample = (minus_6db * i16::MAX as f32) as i16;
            for frame in bytes.chunks_mut(2 * 6) {
                // Surround51 interleave order: L, C, R, Rl, Rr, LFE.
                let c_off = 2 * 1;
                frame[c_off..c_off + 2].copy_from_slice(&sample.to_ne_bytes());
            }
        }
        let mut dest = vec![Sample::ZERO; 4 * NUM_CANONICAL_CHANNELS];
        let levels = [Sample::ONE; NUM_CANONICAL_CHANNELS];
        let attn = Sample::from_f32(crate::playback::DOWNMIX_LEVEL_3DB);
        buf.mix_into(
            &mut dest,
            48_000,
            ChannelMode::Stereo,
            4,
            0,
            -1,
            levels,
            attn,
            attn,
            1.0,
            Sample::ONE,
        )
        .unwrap();
        let l = dest[Canonical::L as usize].to_f32();
        let r = dest[Canonical::R as usize].to_f32();
        let expected = minus_6db * crate::playback::DOWNMIX_LEVEL_3DB;
        assert!((l - r).abs() < 1e-3);
        assert!((l - expected).abs() < 5e-3, "l={l} expected={expected}");
    }

    /// A destination that already has its own center/rear slots must
    /// not also receive the folded-into-L/R contribution (no
    /// double-counting when src and dest both carry the channel).
    #[test]
    fn passthrough_surround_does_not_bleed_center_into_front() {
        let buf = silent_buffer(ChannelMode::Surround51, 10);
        {
            let mut guard = buf.lock(0, 10).unwrap();
            let bytes = guard.bytes_mut();
            let sample = i16::MAX;
            for frame in bytes.chunks_mut(2 * 6) {
                let c_off = 2 * 1;
                frame[c_off..c_off + 2].copy_from_slice(&sample.to_ne_bytes());
            }
        }
        let mut dest = vec![Sample::ZERO; 4 * NUM_CANONICAL_CHANNELS];
        let levels = [Sample::ONE; NUM_CANONICAL_CHANNELS];
        let attn = Sample::from_f32(crate::playback::DOWNMIX_LEVEL_3DB);
        buf.mix_into(
            &mut dest,
            48_000,
            ChannelMode::Surround51,
            4,
            0,
            -1,
            levels,
            attn,
            attn,
            1.0,
            Sample::ONE,
        )
        .unwrap();
        let l = dest[Canonical::L as usize].to_f32();
        let r = dest[Canonical::R as usize].to_f32();
        let c = dest[Canonical::C as usize].to_f32();
        assert_eq!(l, 0.0);
        assert_eq!(r, 0.0);
        assert!(c > 0.0);
    }
}
