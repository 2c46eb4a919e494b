//! APU module - the 2A03 sound core and its expansion chips
//!
//! The `Apu` owns the five built-in channels, one instance of every
//! expansion chip and the mixer. Clients drive it with register writes and
//! cycle advances in simulated CPU time:
//!
//! - `add_cycles` banks CPU cycles without emulating anything.
//! - `process` drains the banked cycles, running every channel up to the
//!   next internal event (frame sequencer tick or audio frame end).
//! - `write`/`read` first run `process`, so the access lands on chip state
//!   that is exact to the advertised cycle.
//!
//! At each audio frame boundary the mixer resamples the accumulated
//! timeline into 16-bit PCM and the sink callback is invoked synchronously
//! with the finished buffer.
//!
//! # Register Map
//!
//! | Address       | Description                           |
//! |---------------|---------------------------------------|
//! | $4000-$4003   | Pulse 1                               |
//! | $4004-$4007   | Pulse 2                               |
//! | $4008-$400B   | Triangle                              |
//! | $400C-$400F   | Noise                                 |
//! | $4010-$4013   | DPCM                                  |
//! | $4015         | Channel enable / status (R/W)         |
//! | $4017         | Frame sequencer mode (W)              |
//!
//! Expansion chips live at their published cartridge addresses and are
//! reached through `external_write`/`external_read`.

pub mod channels;
pub mod components;
pub mod constants;
pub mod expansion;

#[cfg(test)]
mod tests;

pub use channels::{DpcmChannel, NoiseChannel, PulseChannel, SampleMem, TriangleChannel};
pub use expansion::{
    ExpansionChip, Fds, Mmc5, Vrc6, Vrc7, N106, SNDCHIP_FDS, SNDCHIP_MMC5, SNDCHIP_N106,
    SNDCHIP_S5B, SNDCHIP_VRC6, SNDCHIP_VRC7,
};

use crate::mixer::{Chip, Mixer, SoundChannel};
use constants::*;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Console variant, selecting clock rate, frame rate and period tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Machine {
    Ntsc,
    Pal,
}

impl Machine {
    pub fn base_freq(self) -> u32 {
        match self {
            Machine::Ntsc => BASE_FREQ_NTSC,
            Machine::Pal => BASE_FREQ_PAL,
        }
    }

    pub fn frame_rate(self) -> u32 {
        match self {
            Machine::Ntsc => FRAME_RATE_NTSC,
            Machine::Pal => FRAME_RATE_PAL,
        }
    }
}

/// Errors from sound setup
///
/// The steady-state surface is total; only configuration can fail.
#[derive(Debug)]
pub enum SoundError {
    /// Sample rate of zero or otherwise unusable
    InvalidSampleRate(u32),
    /// Channel count other than 1 (mono) or 2 (stereo)
    InvalidChannelCount(u32),
    /// The mixer rejected the buffer parameters
    BufferAllocation,
}

impl fmt::Display for SoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundError::InvalidSampleRate(rate) => write!(f, "invalid sample rate: {}", rate),
            SoundError::InvalidChannelCount(n) => {
                write!(f, "invalid channel count: {} (expected 1 or 2)", n)
            }
            SoundError::BufferAllocation => write!(f, "sound buffer allocation failed"),
        }
    }
}

impl std::error::Error for SoundError {}

/// PCM sink invoked at every frame boundary with the finished buffer
pub type SoundSink = Box<dyn FnMut(&[i16])>;

/// The NES Audio Processing Unit with optional expansion chips
pub struct Apu {
    pulse1: PulseChannel,
    pulse2: PulseChannel,
    triangle: TriangleChannel,
    noise: NoiseChannel,
    dpcm: DpcmChannel,

    vrc6: Vrc6,
    vrc7: Vrc7,
    fds: Fds,
    mmc5: Mmc5,
    n106: N106,
    /// Active expansion chips, a SNDCHIP_* bitmask
    external_chips: u8,

    mixer: Mixer,
    sample_mem: Box<dyn SampleMem>,
    sink: Option<SoundSink>,
    sound_buffer: Vec<i16>,
    stereo: bool,

    machine: Machine,
    /// Banked CPU cycles not yet emulated; may transiently go negative in
    /// the drain arithmetic but never accumulates below zero
    cycles_to_run: i32,
    /// Cycles emulated since the last frame boundary
    frame_cycles: u32,
    /// Cycles until the next frame sequencer tick
    sequencer_clock: u32,
    /// Cycles until the next audio frame boundary
    frame_clock: u32,
    /// Audio frame length in cycles (clock rate / frame rate)
    frame_cycle_count: u32,
    /// Frame sequencer step index
    frame_sequence: u8,
    /// True in 5-step mode
    five_step_mode: bool,

    /// VRC7 chip level; kept separately because that chip applies its own
    /// gain instead of routing through the mixer
    level_vrc7: f32,
    /// Master volume percentage last given to `setup_mixer`
    mixer_volume: u32,

    /// Shadow register files for `get_reg`
    regs: [u8; 0x20],
    regs_vrc6: [u8; 9],
    regs_fds: [u8; 16],
}

impl Apu {
    /// Create an APU bound to a DPCM sample memory provider
    pub fn new(sample_mem: Box<dyn SampleMem>) -> Self {
        let mut apu = Self {
            pulse1: PulseChannel::new(SoundChannel::Pulse1, true),
            pulse2: PulseChannel::new(SoundChannel::Pulse2, false),
            triangle: TriangleChannel::new(),
            noise: NoiseChannel::new(),
            dpcm: DpcmChannel::new(),
            vrc6: Vrc6::new(),
            vrc7: Vrc7::new(),
            fds: Fds::new(),
            mmc5: Mmc5::new(),
            n106: N106::new(),
            external_chips: 0,
            mixer: Mixer::new(),
            sample_mem,
            sink: None,
            sound_buffer: Vec::new(),
            stereo: false,
            machine: Machine::Ntsc,
            cycles_to_run: 0,
            frame_cycles: 0,
            sequencer_clock: SEQUENCER_PERIOD,
            frame_clock: BASE_FREQ_NTSC / FRAME_RATE_NTSC,
            frame_cycle_count: BASE_FREQ_NTSC / FRAME_RATE_NTSC,
            frame_sequence: 0,
            five_step_mode: false,
            level_vrc7: 1.0,
            mixer_volume: 100,
            regs: [0; 0x20],
            regs_vrc6: [0; 9],
            regs_fds: [0; 16],
        };
        apu.reset();
        apu
    }

    /// Install the PCM sink invoked at every frame boundary
    pub fn set_sink<F: FnMut(&[i16]) + 'static>(&mut self, sink: F) {
        self.sink = Some(Box::new(sink));
    }

    /// Allocate the PCM buffer and program machine-dependent tables
    ///
    /// The buffer is sized for one PAL frame, the larger of the two, so the
    /// machine can be switched later without reallocation.
    pub fn setup_sound(
        &mut self,
        sample_rate: u32,
        channels: u32,
        machine: Machine,
    ) -> Result<(), SoundError> {
        if sample_rate == 0 {
            return Err(SoundError::InvalidSampleRate(sample_rate));
        }
        if !(1..=2).contains(&channels) {
            return Err(SoundError::InvalidChannelCount(channels));
        }

        let samples_per_frame = (sample_rate / FRAME_RATE_PAL) as usize;
        self.stereo = channels == 2;
        self.sound_buffer = vec![0; (samples_per_frame + 16) * channels as usize];

        if !self
            .mixer
            .allocate_buffer(samples_per_frame, sample_rate, channels)
        {
            return Err(SoundError::BufferAllocation);
        }

        self.change_machine(machine);

        // The VRC7 renders on its own at the host rate.
        self.vrc7
            .set_sample_speed(sample_rate, machine.base_freq(), machine.frame_rate());

        debug!(
            "sound setup: {} Hz, {} channel(s), {:?}",
            sample_rate, channels, machine
        );
        Ok(())
    }

    /// Switch between NTSC and PAL, allowed during playback
    ///
    /// Swaps the noise and DPCM period tables, re-clocks the mixer and
    /// updates the frame length so the next frame renders at the new rate.
    pub fn change_machine(&mut self, machine: Machine) {
        match machine {
            Machine::Ntsc => {
                self.noise.set_period_table(&NOISE_PERIODS_NTSC);
                self.dpcm.set_period_table(&DMC_PERIODS_NTSC);
            }
            Machine::Pal => {
                self.noise.set_period_table(&NOISE_PERIODS_PAL);
                self.dpcm.set_period_table(&DMC_PERIODS_PAL);
            }
        }
        self.mixer.set_clock_rate(machine.base_freq());
        self.machine = machine;
        self.frame_cycle_count = machine.base_freq() / machine.frame_rate();
        // Realign immediately when switching on a frame boundary.
        if self.frame_cycles == 0 {
            self.frame_clock = self.frame_cycle_count;
        }
    }

    /// Select the active expansion chips and reset the whole APU
    pub fn set_external_sound(&mut self, chips: u8) {
        self.external_chips = chips;
        if chips & SNDCHIP_VRC7 != 0 {
            self.apply_vrc7_volume();
        }
        debug!("external sound mask: {:#04x}", chips);
        self.reset();
    }

    /// Apply mixer filter and volume settings
    pub fn setup_mixer(&mut self, low_cut: u32, high_cut: u32, high_damp: u32, volume: u32) {
        self.mixer
            .update_settings(low_cut, high_cut, high_damp, volume);
        self.mixer_volume = volume;
        self.apply_vrc7_volume();
    }

    /// Per-chip level in dB; converted to a gain via `exp(dB / 20)`
    pub fn set_chip_level(&mut self, chip: Chip, level_db: f32) {
        let gain = (level_db / 20.0).exp();
        if chip == Chip::Vrc7 {
            self.level_vrc7 = gain;
            self.apply_vrc7_volume();
        } else {
            self.mixer.set_chip_level(chip, gain);
        }
    }

    fn apply_vrc7_volume(&mut self) {
        self.vrc7
            .set_volume(self.mixer_volume as f32 / 100.0 * self.level_vrc7);
    }

    /// Return every channel and chip to power-on state
    pub fn reset(&mut self) {
        self.cycles_to_run = 0;
        self.frame_cycles = 0;
        self.sequencer_clock = SEQUENCER_PERIOD;
        self.frame_sequence = 0;
        self.five_step_mode = false;
        self.frame_clock = self.frame_cycle_count;

        self.mixer.clear_buffer();

        self.pulse1.reset();
        self.pulse2.reset();
        self.triangle.reset();
        self.noise.reset();
        self.dpcm.reset();

        self.vrc6.reset();
        self.vrc7.reset();
        self.fds.reset();
        self.mmc5.reset();
        self.n106.reset();

        self.regs = [0; 0x20];
        self.regs_vrc6 = [0; 9];
        self.regs_fds = [0; 16];

        debug!("apu reset");
    }

    /// Bank CPU cycles for the next `process`; negative values are ignored
    pub fn add_cycles(&mut self, cycles: i32) {
        if cycles < 0 {
            return;
        }
        self.cycles_to_run += cycles;
    }

    /// Emulate all banked cycles
    ///
    /// The budget is drained in spans bounded by the next sequencer tick
    /// and the next frame boundary. Within a span, channels advance in
    /// chunks no longer than the shortest channel period (floored at 7
    /// cycles) so that duty edges of fast channels never collapse onto one
    /// mixer timestamp.
    pub fn process(&mut self) {
        while self.cycles_to_run > 0 {
            let time = (self.cycles_to_run as u32)
                .min(self.sequencer_clock)
                .min(self.frame_clock);

            // Pulse pair, bounded by the shorter pulse period.
            let mut remaining = time;
            while remaining > 0 {
                let bound = self.pulse1.period().min(self.pulse2.period());
                let chunk = bound.max(7).min(remaining);
                self.pulse1.process(chunk, &mut self.mixer);
                self.pulse2.process(chunk, &mut self.mixer);
                remaining -= chunk;
            }

            // Triangle/noise/DPCM, bounded by their shortest period.
            let mut remaining = time;
            while remaining > 0 {
                let bound = self
                    .triangle
                    .period()
                    .min(self.noise.period())
                    .min(self.dpcm.period());
                let chunk = bound.max(7).min(remaining);
                self.triangle.process(chunk, &mut self.mixer);
                self.noise.process(chunk, &mut self.mixer);
                self.dpcm
                    .process(chunk, &mut self.mixer, self.sample_mem.as_ref());
                remaining -= chunk;
            }

            self.process_external(time);

            self.frame_cycles += time;
            self.sequencer_clock -= time;
            self.frame_clock -= time;
            self.cycles_to_run -= time as i32;

            if self.sequencer_clock == 0 {
                self.clock_sequence();
            }
            if self.frame_clock == 0 {
                self.end_frame();
            }
        }
    }

    fn process_external(&mut self, cycles: u32) {
        if self.external_chips & SNDCHIP_VRC6 != 0 {
            self.vrc6.process(cycles, &mut self.mixer);
        }
        if self.external_chips & SNDCHIP_VRC7 != 0 {
            self.vrc7.process(cycles, &mut self.mixer);
        }
        if self.external_chips & SNDCHIP_FDS != 0 {
            self.fds.process(cycles, &mut self.mixer);
        }
        if self.external_chips & SNDCHIP_MMC5 != 0 {
            self.mmc5.process(cycles, &mut self.mixer);
        }
        if self.external_chips & SNDCHIP_N106 != 0 {
            self.n106.process(cycles, &mut self.mixer);
        }
    }

    /// 240 Hz rate group: envelopes and the triangle linear counter
    fn clock_240hz(&mut self) {
        self.pulse1.envelope_tick();
        self.pulse2.envelope_tick();
        self.noise.envelope_tick();
        self.triangle.linear_tick();
    }

    /// 120 Hz rate group: sweeps and length counters
    fn clock_120hz(&mut self) {
        self.pulse1.sweep_tick();
        self.pulse2.sweep_tick();

        self.pulse1.length_tick();
        self.pulse2.length_tick();
        self.triangle.length_tick();
        self.noise.length_tick();
    }

    /// 60 Hz rate group: frame IRQ, intentionally suppressed for playback
    fn clock_60hz(&mut self) {}

    fn clock_sequence(&mut self) {
        // Reload by adding so sequencer slip never accumulates.
        self.sequencer_clock += SEQUENCER_PERIOD;

        if !self.five_step_mode {
            self.frame_sequence = (self.frame_sequence + 1) % 4;
            match self.frame_sequence {
                0 | 2 => self.clock_240hz(),
                1 => {
                    self.clock_240hz();
                    self.clock_120hz();
                }
                _ => {
                    self.clock_240hz();
                    self.clock_120hz();
                    self.clock_60hz();
                }
            }
        } else {
            self.frame_sequence = (self.frame_sequence + 1) % 5;
            match self.frame_sequence {
                0 | 2 => {
                    self.clock_240hz();
                    self.clock_120hz();
                }
                1 | 3 => self.clock_240hz(),
                _ => {}
            }
        }
    }

    /// Audio frame boundary: flush channel deltas, resample, invoke the sink
    fn end_frame(&mut self) {
        self.pulse1.end_frame();
        self.pulse2.end_frame();
        self.triangle.end_frame();
        self.noise.end_frame();
        self.dpcm.end_frame();

        if self.external_chips & SNDCHIP_VRC6 != 0 {
            self.vrc6.end_frame(&mut self.mixer);
        }
        if self.external_chips & SNDCHIP_VRC7 != 0 {
            self.vrc7.end_frame(&mut self.mixer);
        }
        if self.external_chips & SNDCHIP_FDS != 0 {
            self.fds.end_frame(&mut self.mixer);
        }
        if self.external_chips & SNDCHIP_MMC5 != 0 {
            self.mmc5.end_frame(&mut self.mixer);
        }
        if self.external_chips & SNDCHIP_N106 != 0 {
            self.n106.end_frame(&mut self.mixer);
        }

        let available = self.mixer.finish_buffer(self.frame_cycles);
        let read = self
            .mixer
            .read_buffer(available, &mut self.sound_buffer, self.stereo);

        if let Some(sink) = self.sink.as_mut() {
            let width = if self.stereo { 2 } else { 1 };
            sink(&self.sound_buffer[..read * width]);
        }

        self.frame_clock += self.frame_cycle_count;
        self.frame_cycles = 0;
    }

    /// Write to a 2A03 register; runs `process` first so the write lands on
    /// up-to-date chip state
    pub fn write(&mut self, addr: u16, value: u8) {
        self.process();
        trace!("write {:#06x} = {:#04x}", addr, value);

        match addr {
            0x4015 => {
                self.write_4015(value);
                return;
            }
            0x4017 => {
                self.write_4017(value);
                return;
            }
            0x4000..=0x4013 => {
                let reg = (addr & 0x03) as u8;
                match addr & 0x1C {
                    0x00 => self.pulse1.write(reg, value),
                    0x04 => self.pulse2.write(reg, value),
                    0x08 => self.triangle.write(reg, value),
                    0x0C => self.noise.write(reg, value),
                    0x10 => self.dpcm.write(reg, value),
                    _ => {}
                }
                self.regs[(addr & 0x1F) as usize] = value;
            }
            _ => {}
        }
    }

    /// $4015: channel enables
    fn write_4015(&mut self, value: u8) {
        self.pulse1.write_control(value & 0x01 != 0);
        self.pulse2.write_control(value & 0x02 != 0);
        self.triangle.write_control(value & 0x04 != 0);
        self.noise.write_control(value & 0x08 != 0);
        self.dpcm.write_control(value & 0x10 != 0);
    }

    /// $4017: frame sequencer mode
    ///
    /// Resets the step index; bit 7 selects 5-step mode and immediately
    /// clocks all three rate groups.
    fn write_4017(&mut self, value: u8) {
        self.frame_sequence = 0;

        if value & 0x80 != 0 {
            self.five_step_mode = true;
            self.clock_240hz();
            self.clock_120hz();
            self.clock_60hz();
        } else {
            self.five_step_mode = false;
        }
        // IRQ inhibit (bit 6) is irrelevant: IRQs are never delivered.
    }

    /// Read a 2A03 register; only $4015 is readable
    pub fn read(&mut self, addr: u16) -> u8 {
        self.process();
        if addr == 0x4015 {
            self.read_4015()
        } else {
            0
        }
    }

    /// $4015 status: length counters, DPCM activity and latched DPCM IRQ
    fn read_4015(&mut self) -> u8 {
        let mut status = self.pulse1.read_control();
        status |= self.pulse2.read_control() << 1;
        status |= self.triangle.read_control() << 2;
        status |= self.noise.read_control() << 3;
        status |= self.dpcm.read_control() << 4;
        status |= self.dpcm.did_irq() << 7;
        status
    }

    /// Write to an expansion chip register; every active chip sees it
    pub fn external_write(&mut self, addr: u16, value: u8) {
        self.process();
        trace!("external write {:#06x} = {:#04x}", addr, value);

        if self.external_chips & SNDCHIP_VRC6 != 0 {
            self.vrc6.write(addr, value);
        }
        if self.external_chips & SNDCHIP_VRC7 != 0 {
            self.vrc7.write(addr, value);
        }
        if self.external_chips & SNDCHIP_FDS != 0 {
            self.fds.write(addr, value);
        }
        if self.external_chips & SNDCHIP_MMC5 != 0 {
            self.mmc5.write(addr, value);
        }
        if self.external_chips & SNDCHIP_N106 != 0 {
            self.n106.write(addr, value);
        }

        self.log_external_write(addr, value);
    }

    /// Read from an expansion chip; the first chip claiming the address
    /// wins, otherwise the open-bus value `addr >> 8`
    pub fn external_read(&mut self, addr: u16) -> u8 {
        self.process();

        let mut value = None;
        if self.external_chips & SNDCHIP_VRC6 != 0 {
            value = value.or_else(|| self.vrc6.read(addr));
        }
        if self.external_chips & SNDCHIP_VRC7 != 0 {
            value = value.or_else(|| self.vrc7.read(addr));
        }
        if self.external_chips & SNDCHIP_FDS != 0 {
            value = value.or_else(|| self.fds.read(addr));
        }
        if self.external_chips & SNDCHIP_MMC5 != 0 {
            value = value.or_else(|| self.mmc5.read(addr));
        }
        if self.external_chips & SNDCHIP_N106 != 0 {
            value = value.or_else(|| self.n106.read(addr));
        }

        value.unwrap_or((addr >> 8) as u8)
    }

    fn log_external_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x9000..=0x9002 => self.regs_vrc6[(addr - 0x9000) as usize] = value,
            0xA000..=0xA002 => self.regs_vrc6[(addr - 0xA000 + 3) as usize] = value,
            0xB000..=0xB002 => self.regs_vrc6[(addr - 0xB000 + 6) as usize] = value,
            0x4080..=0x408F => self.regs_fds[(addr - 0x4080) as usize] = value,
            _ => {}
        }
    }

    /// Last value written to a shadowed register, for tracker UIs
    pub fn get_reg(&self, chip: Chip, reg: usize) -> u8 {
        match chip {
            Chip::Apu => self.regs[reg & 0x1F],
            Chip::Vrc6 => {
                if reg < self.regs_vrc6.len() {
                    self.regs_vrc6[reg]
                } else {
                    0
                }
            }
            Chip::Fds => self.regs_fds[reg & 0x0F],
            _ => 0,
        }
    }

    /// Current absolute output level of a mixer channel, for VU meters
    pub fn get_vol(&self, chan: SoundChannel) -> i32 {
        self.mixer.chan_output(chan)
    }

    /// Whether the DPCM channel is still fetching sample bytes
    pub fn dpcm_playing(&self) -> bool {
        self.dpcm.is_playing()
    }

    /// DPCM playback position in 64-byte units
    pub fn get_sample_pos(&self) -> u8 {
        self.dpcm.sample_pos()
    }

    /// DPCM DAC level (0-127)
    pub fn get_delta_counter(&self) -> u8 {
        self.dpcm.delta_counter()
    }

    pub fn machine(&self) -> Machine {
        self.machine
    }
}
