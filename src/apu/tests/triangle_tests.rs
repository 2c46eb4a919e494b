//! Triangle channel scenario tests

use super::{collecting_apu, run_frames, zero_crossings, RamMem};
use crate::apu::Machine;
use crate::mixer::SoundChannel;

/// With a zero linear-counter reload the triangle gate never opens; the
/// output must stay DC only.
#[test]
fn triangle_is_silent_when_linear_gate_is_closed() {
    let (mut apu, log) = collecting_apu(44_100, 1, Machine::Ntsc, RamMem::new());

    apu.write(0x4008, 0x80); // control/halt, linear reload 0
    apu.write(0x400A, 0x00);
    apu.write(0x400B, 0x00); // length index 0, but linear stays 0

    run_frames(&mut apu, Machine::Ntsc, 60);

    let log = log.borrow();
    assert_eq!(zero_crossings(&log.samples, 50), 0);
}

/// A running triangle produces a tone with the expected pitch.
#[test]
fn triangle_renders_a_tone() {
    let (mut apu, log) = collecting_apu(44_100, 1, Machine::Ntsc, RamMem::new());

    apu.write(0x4015, 0x04);
    apu.write(0x4008, 0xFF); // control set, linear reload 127
    apu.write(0x400A, 0x7E);
    apu.write(0x400B, 0x08); // period 0x07E: 1789773 / (32 * 127) = 440 Hz

    run_frames(&mut apu, Machine::Ntsc, 60);

    let log = log.borrow();
    let crossings = zero_crossings(&log.samples, 100);
    // One second of a ~440 Hz triangle.
    assert!(
        (860..=900).contains(&crossings),
        "zero crossings {crossings}"
    );
}

/// Gating the channel must not reset its sequence position.
#[test]
fn triangle_resumes_from_held_phase() {
    let (mut apu, _log) = collecting_apu(44_100, 1, Machine::Ntsc, RamMem::new());

    apu.write(0x4015, 0x04);
    apu.write(0x4008, 0xFF);
    apu.write(0x400A, 0x80);
    apu.write(0x400B, 0x08);

    run_frames(&mut apu, Machine::Ntsc, 3);
    apu.write(0x4015, 0x00); // close the length gate
    let held = apu.get_vol(SoundChannel::Triangle);

    run_frames(&mut apu, Machine::Ntsc, 10);
    // Output held, not snapped to zero.
    assert_eq!(apu.get_vol(SoundChannel::Triangle), held);

    // Reopen; the sequencer continues from where it stopped, so the level
    // moves to a neighbor of the held value on the 0..15..0 staircase.
    apu.write(0x4015, 0x04);
    apu.write(0x400B, 0x08);
    apu.add_cycles(0x81 * 2);
    apu.process();
    let resumed = apu.get_vol(SoundChannel::Triangle);
    assert!((resumed - held).abs() <= 2, "jumped from {held} to {resumed}");
}
