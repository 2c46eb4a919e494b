//! Konami VRC7 expansion sound
//!
//! A six-channel, two-operator FM synthesizer derived from the YM2413, with
//! fifteen fixed instrument patches in ROM plus one custom patch. Unlike
//! every other chip in this crate, the VRC7 does not write deltas onto the
//! master clock timeline: it renders PCM at the host sample rate during
//! `process` and hands the finished frame to the mixer at `end_frame`, so it
//! carries its own output gain.
//!
//! The synthesis is a behavioral model, not a gate-level one: sine phase
//! accumulation and envelopes run in floating point, with attack/decay rates
//! mapped to dB-per-second ramps, and the AM/FM LFOs are not modeled. The
//! patch set, register interface and channel topology follow the hardware.

use crate::apu::expansion::ExpansionChip;
use crate::mixer::Mixer;
use std::f64::consts::TAU;

/// VRC7 internal patch set (instruments $1-$F), per nesdev
const ROM_PATCHES: [[u8; 8]; 15] = [
    [0x03, 0x21, 0x05, 0x06, 0xE8, 0x81, 0x42, 0x27], // $01 Buzzy bell
    [0x13, 0x41, 0x14, 0x0D, 0xD8, 0xF6, 0x23, 0x12], // $02 Guitar
    [0x11, 0x11, 0x08, 0x08, 0xFA, 0xB2, 0x20, 0x12], // $03 Wurly
    [0x31, 0x61, 0x0C, 0x07, 0xA8, 0x64, 0x61, 0x27], // $04 Flute
    [0x32, 0x21, 0x1E, 0x06, 0xE1, 0x76, 0x01, 0x28], // $05 Clarinet
    [0x02, 0x01, 0x06, 0x00, 0xA3, 0xE2, 0xF4, 0xF4], // $06 Synth
    [0x21, 0x61, 0x1D, 0x07, 0x82, 0x81, 0x11, 0x07], // $07 Trumpet
    [0x23, 0x21, 0x22, 0x17, 0xA2, 0x72, 0x01, 0x17], // $08 Organ
    [0x35, 0x11, 0x25, 0x00, 0x40, 0x73, 0x72, 0x01], // $09 Bells
    [0xB5, 0x01, 0x0F, 0x0F, 0xA8, 0xA5, 0x51, 0x02], // $0A Vibes
    [0x17, 0xC1, 0x24, 0x07, 0xF8, 0xF8, 0x22, 0x12], // $0B Vibraphone
    [0x71, 0x23, 0x11, 0x06, 0x65, 0x74, 0x18, 0x16], // $0C Tutti
    [0x01, 0x02, 0xD3, 0x05, 0xC9, 0x95, 0x03, 0x02], // $0D Fretless
    [0x61, 0x63, 0x0C, 0x00, 0x94, 0xC0, 0x33, 0xF6], // $0E Synth bass
    [0x21, 0x72, 0x0D, 0x00, 0xC1, 0xD5, 0x56, 0x06], // $0F Sweep
];

/// Frequency multipliers (register values 0-15, hardware doubles them)
const MULTIPLIERS: [f64; 16] = [
    0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 10.0, 12.0, 12.0, 15.0, 15.0,
];

/// Modulator feedback depth per 3-bit feedback value
const FEEDBACK: [f64; 8] = [0.0, 0.008, 0.015, 0.03, 0.06, 0.12, 0.25, 0.5];

/// YM2413 internal sample rate at the stock 3.58 MHz crystal
const FM_INTERNAL_RATE: f64 = 49_716.0;

/// Attenuation treated as silence
const SILENT_DB: f32 = 96.0;

/// Phase-modulation depth applied by the modulator, in radians
const MOD_DEPTH: f64 = 8.0;

#[derive(Debug, Clone, Copy, Default)]
struct OperatorPatch {
    multiplier: f64,
    /// Envelope holds at the sustain level while the key is down
    sustained: bool,
    /// Negative half-waves are clipped to zero
    rectified: bool,
    attack: u8,
    decay: u8,
    /// Sustain level in 3 dB steps
    sustain: u8,
    release: u8,
    /// Modulator-only attenuation in dB
    total_level: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Patch {
    modulator: OperatorPatch,
    carrier: OperatorPatch,
    feedback: u8,
}

impl Patch {
    fn decode(bytes: &[u8; 8]) -> Self {
        let operator = |flags: u8, rates: u8, sus_rel: u8| OperatorPatch {
            multiplier: MULTIPLIERS[(flags & 0x0F) as usize],
            sustained: (flags & 0x20) != 0,
            rectified: false,
            attack: rates >> 4,
            decay: rates & 0x0F,
            sustain: sus_rel >> 4,
            release: sus_rel & 0x0F,
            total_level: 0.0,
        };

        let mut modulator = operator(bytes[0], bytes[4], bytes[6]);
        let mut carrier = operator(bytes[1], bytes[5], bytes[7]);
        modulator.total_level = (bytes[2] & 0x3F) as f32 * 0.75;
        modulator.rectified = (bytes[3] & 0x08) != 0;
        carrier.rectified = (bytes[3] & 0x10) != 0;

        Self {
            modulator,
            carrier,
            feedback: bytes[3] & 0x07,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvPhase {
    Attack,
    Decay,
    Sustain,
    Release,
    Idle,
}

#[derive(Debug, Clone)]
struct Operator {
    phase: f64,
    env: EnvPhase,
    attenuation: f32,
    output: f64,
}

impl Operator {
    fn new() -> Self {
        Self {
            phase: 0.0,
            env: EnvPhase::Idle,
            attenuation: SILENT_DB,
            output: 0.0,
        }
    }

    /// dB-per-sample ramp for a 4-bit envelope rate
    fn rate_step(rate: u8, sample_rate: f64) -> f32 {
        if rate == 0 {
            0.0
        } else {
            (1.5 * (1u32 << rate) as f64 / sample_rate) as f32
        }
    }

    fn tick_envelope(&mut self, patch: &OperatorPatch, sustain_key: bool, sample_rate: f64) {
        match self.env {
            EnvPhase::Attack => {
                self.attenuation -= 4.0 * Self::rate_step(patch.attack, sample_rate);
                if self.attenuation <= 0.0 || patch.attack == 15 {
                    self.attenuation = 0.0;
                    self.env = EnvPhase::Decay;
                }
            }
            EnvPhase::Decay => {
                self.attenuation += Self::rate_step(patch.decay, sample_rate);
                if self.attenuation >= patch.sustain as f32 * 3.0 {
                    self.attenuation = patch.sustain as f32 * 3.0;
                    self.env = EnvPhase::Sustain;
                }
            }
            EnvPhase::Sustain => {
                if !patch.sustained {
                    // Percussive tones keep decaying at the release rate.
                    self.attenuation += Self::rate_step(patch.release, sample_rate);
                }
            }
            EnvPhase::Release => {
                let rate = if sustain_key { 5 } else { patch.release };
                self.attenuation += Self::rate_step(rate, sample_rate);
            }
            EnvPhase::Idle => {}
        }

        if self.attenuation >= SILENT_DB {
            self.attenuation = SILENT_DB;
            if self.env != EnvPhase::Attack {
                self.env = EnvPhase::Idle;
            }
        }
    }

    fn gain(&self, extra_db: f32) -> f64 {
        let total = self.attenuation + extra_db;
        if total >= SILENT_DB {
            0.0
        } else {
            10f64.powf(-(total as f64) / 20.0)
        }
    }
}

#[derive(Debug, Clone)]
struct FmChannel {
    fnum: u16,
    block: u8,
    key_on: bool,
    sustain: bool,
    instrument: u8,
    volume: u8,
    patch: Patch,
    modulator: Operator,
    carrier: Operator,
}

impl FmChannel {
    fn new() -> Self {
        Self {
            fnum: 0,
            block: 0,
            key_on: false,
            sustain: false,
            instrument: 0,
            volume: 0,
            patch: Patch::default(),
            modulator: Operator::new(),
            carrier: Operator::new(),
        }
    }

    fn set_key(&mut self, key_on: bool) {
        if key_on && !self.key_on {
            self.modulator.phase = 0.0;
            self.carrier.phase = 0.0;
            self.modulator.env = EnvPhase::Attack;
            self.carrier.env = EnvPhase::Attack;
        } else if !key_on && self.key_on {
            self.modulator.env = EnvPhase::Release;
            self.carrier.env = EnvPhase::Release;
        }
        self.key_on = key_on;
    }

    /// Channel base frequency in Hz
    fn frequency(&self) -> f64 {
        FM_INTERNAL_RATE * self.fnum as f64 / (1u32 << (19 - self.block.min(7))) as f64
    }

    fn render(&mut self, sample_rate: f64) -> f64 {
        if self.carrier.env == EnvPhase::Idle {
            return 0.0;
        }

        let base = self.frequency();
        let patch = self.patch;

        self.modulator
            .tick_envelope(&patch.modulator, self.sustain, sample_rate);
        self.carrier
            .tick_envelope(&patch.carrier, self.sustain, sample_rate);

        // Modulator with self-feedback.
        self.modulator.phase += base * patch.modulator.multiplier / sample_rate;
        let feedback = self.modulator.output * FEEDBACK[patch.feedback as usize];
        let mut mod_wave = (TAU * (self.modulator.phase + feedback)).sin();
        if patch.modulator.rectified {
            mod_wave = mod_wave.max(0.0);
        }
        let mod_out = mod_wave * self.modulator.gain(patch.modulator.total_level);
        self.modulator.output = mod_out;

        // Carrier phase-modulated by the modulator output.
        self.carrier.phase += base * patch.carrier.multiplier / sample_rate;
        let mut wave = (TAU * self.carrier.phase + MOD_DEPTH * mod_out).sin();
        if patch.carrier.rectified {
            wave = wave.max(0.0);
        }
        wave * self.carrier.gain(self.volume as f32 * 3.0)
    }
}

/// Konami VRC7 FM synthesizer
///
/// Register interface: address latch at $9010, data at $9030. Registers
/// $00-$07 are the custom patch, $10-$15/$20-$25/$30-$35 the per-channel
/// frequency, control and instrument/volume registers.
pub struct Vrc7 {
    reg_addr: u8,
    custom_patch: [u8; 8],
    channels: [FmChannel; 6],
    /// Output gain scalar; replaces the mixer's per-chip gain since this
    /// chip bypasses the delta timeline
    volume: f32,
    sample_rate: f64,
    cycles_per_sample: f64,
    cycle_acc: f64,
    buffer: Vec<i16>,
}

impl Vrc7 {
    pub fn new() -> Self {
        Self {
            reg_addr: 0,
            custom_patch: [0; 8],
            channels: [
                FmChannel::new(),
                FmChannel::new(),
                FmChannel::new(),
                FmChannel::new(),
                FmChannel::new(),
                FmChannel::new(),
            ],
            volume: 1.0,
            sample_rate: 44_100.0,
            cycles_per_sample: 1_789_773.0 / 44_100.0,
            cycle_acc: 0.0,
            buffer: Vec::new(),
        }
    }

    /// Configure host-rate rendering; called from `Apu::setup_sound`
    pub fn set_sample_speed(&mut self, sample_rate: u32, clock_rate: u32, frame_rate: u32) {
        self.sample_rate = sample_rate as f64;
        self.cycles_per_sample = clock_rate as f64 / sample_rate as f64;
        self.cycle_acc = 0.0;
        self.buffer = Vec::with_capacity((sample_rate / frame_rate + 16) as usize);
    }

    /// Set the chip output gain
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.max(0.0);
    }

    fn patch_for(&self, instrument: u8) -> Patch {
        if instrument == 0 {
            Patch::decode(&self.custom_patch)
        } else {
            Patch::decode(&ROM_PATCHES[(instrument - 1) as usize])
        }
    }

    fn write_reg(&mut self, reg: u8, value: u8) {
        match reg {
            0x00..=0x07 => {
                self.custom_patch[reg as usize] = value;
                let patch = Patch::decode(&self.custom_patch);
                for channel in self.channels.iter_mut().filter(|c| c.instrument == 0) {
                    channel.patch = patch;
                }
            }
            0x10..=0x15 => {
                let channel = &mut self.channels[(reg & 0x07) as usize];
                channel.fnum = (channel.fnum & 0x100) | value as u16;
            }
            0x20..=0x25 => {
                let channel = &mut self.channels[(reg & 0x07) as usize];
                channel.fnum = (channel.fnum & 0x0FF) | ((value as u16 & 0x01) << 8);
                channel.block = (value >> 1) & 0x07;
                channel.sustain = (value & 0x20) != 0;
                channel.set_key((value & 0x10) != 0);
            }
            0x30..=0x35 => {
                let index = (reg & 0x07) as usize;
                let instrument = value >> 4;
                let patch = self.patch_for(instrument);
                let channel = &mut self.channels[index];
                channel.instrument = instrument;
                channel.volume = value & 0x0F;
                channel.patch = patch;
            }
            _ => {}
        }
    }

    fn render_sample(&mut self) -> i16 {
        let mut sum = 0.0;
        for channel in &mut self.channels {
            sum += channel.render(self.sample_rate);
        }
        let sample = sum * 2_600.0 * self.volume as f64;
        sample.clamp(-32_767.0, 32_767.0) as i16
    }
}

impl Default for Vrc7 {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpansionChip for Vrc7 {
    fn reset(&mut self) {
        self.reg_addr = 0;
        self.custom_patch = [0; 8];
        for channel in &mut self.channels {
            *channel = FmChannel::new();
        }
        self.cycle_acc = 0.0;
        self.buffer.clear();
    }

    fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x9010 => self.reg_addr = value & 0x3F,
            0x9030 => self.write_reg(self.reg_addr, value),
            _ => {}
        }
    }

    fn read(&mut self, _addr: u16) -> Option<u8> {
        None
    }

    fn process(&mut self, cycles: u32, _mixer: &mut Mixer) {
        self.cycle_acc += cycles as f64;
        while self.cycle_acc >= self.cycles_per_sample {
            self.cycle_acc -= self.cycles_per_sample;
            let sample = self.render_sample();
            self.buffer.push(sample);
        }
    }

    fn end_frame(&mut self, mixer: &mut Mixer) {
        mixer.mix_external_samples(&self.buffer);
        self.buffer.clear();
    }
}
