// NES APU emulation core
// Cycle-accurate 2A03 sound synthesis with expansion chip support

// Public modules
pub mod apu;
#[cfg(feature = "audio")]
pub mod audio;
pub mod config;
pub mod mixer;

// Re-export main types for convenience
pub use apu::{
    Apu, DpcmChannel, ExpansionChip, Fds, Machine, Mmc5, NoiseChannel, PulseChannel, SampleMem,
    SoundError, SoundSink, TriangleChannel, Vrc6, Vrc7, N106, SNDCHIP_FDS, SNDCHIP_MMC5,
    SNDCHIP_N106, SNDCHIP_S5B, SNDCHIP_VRC6, SNDCHIP_VRC7,
};
#[cfg(feature = "audio")]
pub use audio::{AudioConfig, AudioOutput};
pub use config::{ChipLevelConfig, ConfigError, MixerConfig, SoundConfig};
pub use mixer::{Chip, Mixer, SoundChannel};
