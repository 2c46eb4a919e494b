//! Cartridge expansion sound chips
//!
//! Each chip is a self-contained state machine sharing the APU's mixer. The
//! set is closed: the APU owns one instance of each and consults its active
//! mask instead of keeping a dynamic chip list, so several APU instances can
//! coexist in one process.

pub mod fds;
pub mod mmc5;
pub mod n106;
pub mod vrc6;
pub mod vrc7;

pub use fds::Fds;
pub use mmc5::Mmc5;
pub use n106::N106;
pub use vrc6::Vrc6;
pub use vrc7::Vrc7;

use crate::mixer::Mixer;

/// Expansion chip selection bits for `Apu::set_external_sound`
pub const SNDCHIP_VRC6: u8 = 0x01;
pub const SNDCHIP_VRC7: u8 = 0x02;
pub const SNDCHIP_FDS: u8 = 0x04;
pub const SNDCHIP_MMC5: u8 = 0x08;
pub const SNDCHIP_N106: u8 = 0x10;
/// Reserved; the Sunsoft 5B is not implemented
pub const SNDCHIP_S5B: u8 = 0x20;

/// The narrow interface every expansion chip implements
pub trait ExpansionChip {
    /// Return to power-on state
    fn reset(&mut self);

    /// Register write; addresses outside the chip's range are ignored
    fn write(&mut self, addr: u16, value: u8);

    /// Register read; `None` when the chip does not map the address
    fn read(&mut self, addr: u16) -> Option<u8>;

    /// Advance the chip by `cycles` CPU cycles
    fn process(&mut self, cycles: u32, mixer: &mut Mixer);

    /// Frame boundary: flush pending output and rewind time cursors
    fn end_frame(&mut self, mixer: &mut Mixer);
}
