//! APU scenario tests
//!
//! These drive the full pipeline through the public surface: register
//! writes, cycle advances and the PCM sink.

mod dpcm_tests;
mod triangle_tests;

use crate::apu::{Apu, Machine, SampleMem};
use std::cell::RefCell;
use std::rc::Rc;

/// Sample memory backed by a flat $8000-$FFFF image
pub struct RamMem {
    data: Vec<u8>,
}

impl RamMem {
    pub fn new() -> Self {
        Self {
            data: vec![0; 0x8000],
        }
    }

    pub fn filled(value: u8) -> Self {
        Self {
            data: vec![value; 0x8000],
        }
    }

    pub fn set(&mut self, addr: u16, value: u8) {
        self.data[(addr as usize) & 0x7FFF] = value;
    }
}

impl SampleMem for RamMem {
    fn read_sample(&self, addr: u16) -> u8 {
        self.data[(addr as usize) & 0x7FFF]
    }
}

/// Everything a sink observed: samples plus per-callback frame counts
#[derive(Default)]
pub struct SinkLog {
    pub samples: Vec<i16>,
    pub frame_counts: Vec<usize>,
}

/// An APU wired to a collecting sink
pub fn collecting_apu(
    sample_rate: u32,
    channels: u32,
    machine: Machine,
    mem: RamMem,
) -> (Apu, Rc<RefCell<SinkLog>>) {
    let log = Rc::new(RefCell::new(SinkLog::default()));
    let mut apu = Apu::new(Box::new(mem));
    apu.setup_sound(sample_rate, channels, machine)
        .expect("sound setup");

    let width = channels as usize;
    let sink_log = Rc::clone(&log);
    apu.set_sink(move |pcm: &[i16]| {
        let mut log = sink_log.borrow_mut();
        log.frame_counts.push(pcm.len() / width);
        log.samples.extend_from_slice(pcm);
    });
    apu.reset();
    (apu, log)
}

/// Run `frames` audio frames worth of cycles through the APU
pub fn run_frames(apu: &mut Apu, machine: Machine, frames: u32) {
    let cycles_per_frame = machine.base_freq() / machine.frame_rate();
    for _ in 0..frames {
        apu.add_cycles(cycles_per_frame as i32);
        apu.process();
    }
}

/// Count sign flips, ignoring wobble inside `threshold` of zero
pub fn zero_crossings(samples: &[i16], threshold: i16) -> usize {
    let mut crossings = 0;
    let mut last_sign = 0i8;
    for &sample in samples {
        let sign = if sample > threshold {
            1
        } else if sample < -threshold {
            -1
        } else {
            0
        };
        if sign != 0 {
            if last_sign != 0 && sign != last_sign {
                crossings += 1;
            }
            last_sign = sign;
        }
    }
    crossings
}
