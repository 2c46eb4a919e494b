//! Master-clock mixer and resampler
//!
//! Channels never render PCM themselves. They report amplitude *changes*
//! stamped with the CPU cycle at which they occur, and the mixer collects
//! those deltas on a cycle-indexed timeline. At the end of an audio frame,
//! `finish_buffer` integrates the timeline back into an amplitude signal,
//! band-limits it, resamples it to the host rate with linear interpolation
//! and produces signed 16-bit PCM.
//!
//! Each delta is deposited through a short raised-cosine step kernel rather
//! than as a bare impulse, which spreads waveform edges over a few master
//! clocks and keeps the resampled output free of harsh stair-stepping.

pub mod channels;

pub use channels::{Chip, SoundChannel};

use crate::apu::constants::{BASE_FREQ_NTSC, FRAME_RATE_PAL};

/// Raised-cosine step kernel; entries sum to 1.0
const STEP_KERNEL: [f32; 8] = [
    0.03806, 0.10839, 0.16221, 0.19134, 0.19134, 0.16221, 0.10839, 0.03806,
];

/// Timeline slack past the frame end so a kernel deposited on the last cycle
/// never writes out of bounds
const TIMELINE_SLACK: usize = STEP_KERNEL.len() + 8;

/// Default mixer settings, hardware-flat
pub const DEFAULT_LOW_CUT: u32 = 40;
pub const DEFAULT_HIGH_CUT: u32 = 12_000;
pub const DEFAULT_HIGH_DAMP: u32 = 0;
pub const DEFAULT_VOLUME: u32 = 100;

/// Delta-accumulating mixer shared by every channel
pub struct Mixer {
    /// Per-cycle amplitude deltas for the frame in progress
    timeline: Vec<f32>,
    /// Running integral of the timeline across frames
    integrator: f32,
    /// High-cut (low-pass) filter state, at master clock rate
    lowpass: f32,
    lowpass_alpha: f32,
    /// Low-cut (high-pass) filter state, at output sample rate
    highpass_in: f32,
    highpass_out: f32,
    highpass_coeff: f32,

    /// Last absolute amplitude per logical channel, for VU readouts
    chan_levels: [i32; SoundChannel::COUNT],
    /// Per-chip gain multiplier
    chip_gain: [f32; Chip::COUNT],

    low_cut: u32,
    high_cut: u32,
    high_damp: u32,
    volume: f32,

    clock_rate: u32,
    sample_rate: u32,
    /// Master clocks per output sample
    cycles_per_sample: f64,
    /// Clocks consumed toward the next output sample (fractional resampler)
    sample_gap: f64,

    /// Finished PCM, mono, waiting for `read_buffer`
    pcm: Vec<i16>,
    /// Host-rate samples handed over by chips that bypass the delta
    /// timeline (VRC7), consumed one per emitted sample
    external: Vec<i16>,
    external_pos: usize,
}

impl Mixer {
    pub fn new() -> Self {
        let mut mixer = Self {
            timeline: Vec::new(),
            integrator: 0.0,
            lowpass: 0.0,
            lowpass_alpha: 0.0,
            highpass_in: 0.0,
            highpass_out: 0.0,
            highpass_coeff: 0.0,
            chan_levels: [0; SoundChannel::COUNT],
            chip_gain: [1.0; Chip::COUNT],
            low_cut: DEFAULT_LOW_CUT,
            high_cut: DEFAULT_HIGH_CUT,
            high_damp: DEFAULT_HIGH_DAMP,
            volume: DEFAULT_VOLUME as f32 / 100.0,
            clock_rate: BASE_FREQ_NTSC,
            sample_rate: 44_100,
            cycles_per_sample: BASE_FREQ_NTSC as f64 / 44_100.0,
            sample_gap: 0.0,
            pcm: Vec::new(),
            external: Vec::new(),
            external_pos: 0,
        };
        mixer.set_clock_rate(BASE_FREQ_NTSC);
        mixer
    }

    /// Size the output for `samples_per_frame` frames at `sample_rate`
    ///
    /// Returns false when the parameters cannot describe a usable buffer.
    pub fn allocate_buffer(
        &mut self,
        samples_per_frame: usize,
        sample_rate: u32,
        channels: u32,
    ) -> bool {
        if samples_per_frame == 0 || sample_rate == 0 || !(1..=2).contains(&channels) {
            return false;
        }
        self.sample_rate = sample_rate;
        self.cycles_per_sample = self.clock_rate as f64 / sample_rate as f64;
        self.pcm = Vec::with_capacity(samples_per_frame + TIMELINE_SLACK);
        self.external = Vec::with_capacity(samples_per_frame + TIMELINE_SLACK);
        self.recompute_filters();
        true
    }

    /// Fix the master clock rate the channel timestamps are expressed in
    pub fn set_clock_rate(&mut self, clock_rate: u32) {
        self.clock_rate = clock_rate;
        self.cycles_per_sample = clock_rate as f64 / self.sample_rate as f64;
        // One PAL frame is the longest span finish_buffer will see. Resize
        // keeps deltas already deposited when the rate changes mid-stream.
        let frame_cycles = (clock_rate / FRAME_RATE_PAL) as usize;
        self.timeline.resize(frame_cycles + TIMELINE_SLACK, 0.0);
        self.recompute_filters();
    }

    /// Apply low-cut/high-cut/damping/volume settings
    ///
    /// `low_cut` and `high_cut` are cutoff frequencies in Hz, `high_damp` a
    /// percentage that pulls the high cutoff further down, `volume` a
    /// percentage where 100 is unity.
    pub fn update_settings(&mut self, low_cut: u32, high_cut: u32, high_damp: u32, volume: u32) {
        self.low_cut = low_cut;
        self.high_cut = high_cut.max(1);
        self.high_damp = high_damp.min(100);
        self.volume = volume as f32 / 100.0;
        self.recompute_filters();
    }

    /// Set the gain multiplier applied to every delta of a chip
    pub fn set_chip_level(&mut self, chip: Chip, gain: f32) {
        self.chip_gain[chip.index()] = gain;
    }

    pub fn chip_level(&self, chip: Chip) -> f32 {
        self.chip_gain[chip.index()]
    }

    fn recompute_filters(&mut self) {
        use std::f32::consts::PI;
        // Damping narrows the high cutoff: 100% damp leaves 10% of it.
        let damp = 1.0 - 0.009 * self.high_damp as f32;
        let cutoff = (self.high_cut as f32 * damp).max(100.0);
        self.lowpass_alpha = 1.0 - (-2.0 * PI * cutoff / self.clock_rate as f32).exp();
        self.highpass_coeff = (-2.0 * PI * self.low_cut as f32 / self.sample_rate as f32).exp();
    }

    /// Record an amplitude change on a channel line
    ///
    /// `time` is the frame-relative master clock of the change, `delta` the
    /// signed amplitude step and `value` the channel's new absolute level
    /// (kept only for VU readouts).
    pub fn add_value(&mut self, chan: SoundChannel, time: u32, delta: i32, value: i32) {
        self.chan_levels[chan.index()] = value;

        let gain = self.chip_gain[chan.chip().index()] * chan.level_scale();
        let amplitude = delta as f32 * gain;

        let start = (time as usize).min(self.timeline.len() - STEP_KERNEL.len());
        for (offset, weight) in STEP_KERNEL.iter().enumerate() {
            self.timeline[start + offset] += amplitude * weight;
        }
    }

    /// Current absolute output level of a channel
    pub fn chan_output(&self, chan: SoundChannel) -> i32 {
        self.chan_levels[chan.index()]
    }

    /// Hand over host-rate samples rendered outside the delta timeline
    ///
    /// They are summed into the output one sample per emitted PCM frame and
    /// dropped at the end of `finish_buffer`.
    pub fn mix_external_samples(&mut self, samples: &[i16]) {
        self.external.extend_from_slice(samples);
    }

    /// Integrate and resample `cycles` of timeline into PCM
    ///
    /// Returns the number of mono frames available for `read_buffer`.
    pub fn finish_buffer(&mut self, cycles: u32) -> usize {
        let span = (cycles as usize).min(self.timeline.len() - STEP_KERNEL.len());

        for t in 0..span {
            self.integrator += self.timeline[t];

            let previous = self.lowpass;
            self.lowpass += (self.integrator - self.lowpass) * self.lowpass_alpha;

            self.sample_gap += 1.0;
            if self.sample_gap >= self.cycles_per_sample {
                // The exact sample instant fell inside this clock; interpolate
                // between the filter output before and after it.
                let overshoot = self.sample_gap - self.cycles_per_sample;
                self.sample_gap = overshoot;
                let level = previous + (self.lowpass - previous) * (1.0 - overshoot as f32);
                self.emit(level);
            }
        }

        // Carry kernel spill past the frame end into the next frame.
        for k in 0..STEP_KERNEL.len() {
            self.timeline[k] = self.timeline[span + k];
        }
        for value in &mut self.timeline[STEP_KERNEL.len()..] {
            *value = 0.0;
        }
        self.external.clear();
        self.external_pos = 0;

        self.pcm.len()
    }

    fn emit(&mut self, level: f32) {
        // Low-cut (DC removal) at the output rate.
        let filtered = self.highpass_coeff * (self.highpass_out + level - self.highpass_in);
        self.highpass_in = level;
        self.highpass_out = filtered;

        let mut sample = filtered * self.volume;
        if let Some(&ext) = self.external.get(self.external_pos) {
            sample += ext as f32;
        }
        self.external_pos += 1;

        self.pcm.push(sample.clamp(-32767.0, 32767.0) as i16);
    }

    /// Drain up to `frames` finished frames into `dst`
    ///
    /// Mono output writes one sample per frame; stereo duplicates it into
    /// interleaved L/R pairs. Returns the number of frames written, which may
    /// be less than requested when fewer were produced upstream or `dst` is
    /// short.
    pub fn read_buffer(&mut self, frames: usize, dst: &mut [i16], stereo: bool) -> usize {
        let width = if stereo { 2 } else { 1 };
        let count = frames.min(self.pcm.len()).min(dst.len() / width);

        for (i, &sample) in self.pcm.iter().take(count).enumerate() {
            if stereo {
                dst[i * 2] = sample;
                dst[i * 2 + 1] = sample;
            } else {
                dst[i] = sample;
            }
        }
        self.pcm.drain(..count);
        count
    }

    /// Drop all accumulated timeline, filter and PCM state
    ///
    /// Settings (clock rate, sample rate, filters, gains) are kept.
    pub fn clear_buffer(&mut self) {
        self.timeline.iter_mut().for_each(|v| *v = 0.0);
        self.integrator = 0.0;
        self.lowpass = 0.0;
        self.highpass_in = 0.0;
        self.highpass_out = 0.0;
        self.sample_gap = 0.0;
        self.chan_levels = [0; SoundChannel::COUNT];
        self.pcm.clear();
        self.external.clear();
        self.external_pos = 0;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mixer() -> Mixer {
        let mut mixer = Mixer::new();
        assert!(mixer.allocate_buffer(44_100 / 50, 44_100, 1));
        mixer.set_clock_rate(BASE_FREQ_NTSC);
        mixer
    }

    #[test]
    fn allocate_rejects_bad_parameters() {
        let mut mixer = Mixer::new();
        assert!(!mixer.allocate_buffer(0, 44_100, 1));
        assert!(!mixer.allocate_buffer(882, 0, 1));
        assert!(!mixer.allocate_buffer(882, 44_100, 3));
    }

    #[test]
    fn frame_of_silence_produces_zero_samples() {
        let mut mixer = test_mixer();
        let avail = mixer.finish_buffer(BASE_FREQ_NTSC / 60);
        assert!(avail > 0);

        let mut out = vec![0i16; avail];
        let read = mixer.read_buffer(avail, &mut out, false);
        assert_eq!(read, avail);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn sample_count_tracks_resampling_ratio() {
        let mut mixer = test_mixer();
        let cycles = BASE_FREQ_NTSC / 60;
        let avail = mixer.finish_buffer(cycles);

        let expected = cycles as f64 / (BASE_FREQ_NTSC as f64 / 44_100.0);
        assert!((avail as f64 - expected).abs() < 2.0);
    }

    #[test]
    fn delta_shows_up_in_output() {
        let mut mixer = test_mixer();
        mixer.add_value(SoundChannel::Pulse1, 100, 15, 15);
        let avail = mixer.finish_buffer(BASE_FREQ_NTSC / 60);

        let mut out = vec![0i16; avail];
        mixer.read_buffer(avail, &mut out, false);
        assert!(out.iter().any(|&s| s != 0));
    }

    #[test]
    fn chip_gain_scales_deltas() {
        let mut loud = test_mixer();
        let mut quiet = test_mixer();
        quiet.set_chip_level(Chip::Apu, 0.5);

        for mixer in [&mut loud, &mut quiet] {
            mixer.add_value(SoundChannel::Pulse1, 0, 15, 15);
        }
        let frames = loud.finish_buffer(10_000).min(quiet.finish_buffer(10_000));

        let mut a = vec![0i16; frames];
        let mut b = vec![0i16; frames];
        loud.read_buffer(frames, &mut a, false);
        quiet.read_buffer(frames, &mut b, false);

        let peak_a = a.iter().map(|s| s.unsigned_abs() as u32).max().unwrap();
        let peak_b = b.iter().map(|s| s.unsigned_abs() as u32).max().unwrap();
        assert!(peak_a > peak_b);
        assert!(peak_b > 0);
    }

    #[test]
    fn stereo_read_duplicates_mono() {
        let mut mixer = Mixer::new();
        assert!(mixer.allocate_buffer(44_100 / 50, 44_100, 2));
        mixer.add_value(SoundChannel::Triangle, 50, 12, 12);
        let avail = mixer.finish_buffer(20_000);

        let mut out = vec![0i16; avail * 2];
        let read = mixer.read_buffer(avail, &mut out, true);
        assert_eq!(read, avail);
        for frame in out.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn read_buffer_respects_destination_size() {
        let mut mixer = test_mixer();
        mixer.add_value(SoundChannel::Pulse1, 0, 10, 10);
        let avail = mixer.finish_buffer(BASE_FREQ_NTSC / 60);
        assert!(avail > 8);

        let mut out = vec![0i16; 8];
        let read = mixer.read_buffer(avail, &mut out, false);
        assert_eq!(read, 8);
    }

    #[test]
    fn external_samples_are_summed_in() {
        let mut mixer = test_mixer();
        let ext = vec![1000i16; 800];
        mixer.mix_external_samples(&ext);
        let avail = mixer.finish_buffer(BASE_FREQ_NTSC / 60);

        let mut out = vec![0i16; avail];
        mixer.read_buffer(avail, &mut out, false);
        assert!(out.iter().filter(|&&s| s == 1000).count() > avail / 2);
    }

    #[test]
    fn clear_buffer_discards_pending_audio() {
        let mut mixer = test_mixer();
        mixer.add_value(SoundChannel::Noise, 0, 15, 15);
        mixer.finish_buffer(10_000);
        mixer.clear_buffer();

        let avail = mixer.finish_buffer(10_000);
        let mut out = vec![0i16; avail.max(1)];
        let read = mixer.read_buffer(avail, &mut out, false);
        assert!(out[..read].iter().all(|&s| s == 0));
        assert_eq!(mixer.chan_output(SoundChannel::Noise), 0);
    }

    #[test]
    fn step_kernel_is_normalized() {
        let sum: f32 = STEP_KERNEL.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }
}
