//! Configuration management
//!
//! Serializable sound settings with TOML persistence, so host applications
//! can keep mixer and chip-balance preferences across runs.

use crate::apu::{Apu, Machine, SoundError};
use crate::mixer::{Chip, DEFAULT_HIGH_CUT, DEFAULT_HIGH_DAMP, DEFAULT_LOW_CUT, DEFAULT_VOLUME};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Errors that can occur while loading or saving a configuration
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error
    Io(io::Error),
    /// TOML parse error
    Parse(toml::de::Error),
    /// TOML serialization error
    Serialize(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "TOML parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "TOML serialization error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Serialize(e)
    }
}

/// Complete sound core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channels: 1 (mono) or 2 (stereo)
    pub channels: u32,

    /// Console variant
    pub machine: Machine,

    /// Mixer filter settings
    pub mixer: MixerConfig,

    /// Expansion chip balance
    pub chip_levels: ChipLevelConfig,
}

/// Mixer filter and volume settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerConfig {
    /// High-pass cutoff in Hz
    pub low_cut: u32,

    /// Low-pass cutoff in Hz
    pub high_cut: u32,

    /// Extra treble damping in percent (0-100)
    pub high_damp: u32,

    /// Master volume in percent (100 = unity)
    pub volume: u32,
}

/// Per-chip levels in dB; 0 is unity gain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChipLevelConfig {
    pub apu: f32,
    pub vrc6: f32,
    pub vrc7: f32,
    pub fds: f32,
    pub mmc5: f32,
    pub n106: f32,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            machine: Machine::Ntsc,
            mixer: MixerConfig::default(),
            chip_levels: ChipLevelConfig::default(),
        }
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            low_cut: DEFAULT_LOW_CUT,
            high_cut: DEFAULT_HIGH_CUT,
            high_damp: DEFAULT_HIGH_DAMP,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl Default for ChipLevelConfig {
    fn default() -> Self {
        Self {
            apu: 0.0,
            vrc6: 0.0,
            vrc7: 0.0,
            fds: 0.0,
            mmc5: 0.0,
            n106: 0.0,
        }
    }
}

impl SoundConfig {
    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Save the configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Apply every setting to an APU in one go
    pub fn apply(&self, apu: &mut Apu) -> Result<(), SoundError> {
        apu.setup_sound(self.sample_rate, self.channels, self.machine)?;
        apu.setup_mixer(
            self.mixer.low_cut,
            self.mixer.high_cut,
            self.mixer.high_damp,
            self.mixer.volume,
        );
        apu.set_chip_level(Chip::Apu, self.chip_levels.apu);
        apu.set_chip_level(Chip::Vrc6, self.chip_levels.vrc6);
        apu.set_chip_level(Chip::Vrc7, self.chip_levels.vrc7);
        apu.set_chip_level(Chip::Fds, self.chip_levels.fds);
        apu.set_chip_level(Chip::Mmc5, self.chip_levels.mmc5);
        apu.set_chip_level(Chip::N106, self.chip_levels.n106);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_flat() {
        let config = SoundConfig::default();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.mixer.volume, 100);
        assert_eq!(config.chip_levels.vrc6, 0.0);
    }

    #[test]
    fn toml_round_trip_is_lossless() {
        let mut config = SoundConfig::default();
        config.sample_rate = 48_000;
        config.channels = 2;
        config.machine = Machine::Pal;
        config.mixer.high_damp = 25;
        config.chip_levels.fds = -6.0;

        let text = toml::to_string_pretty(&config).unwrap();
        let back: SoundConfig = toml::from_str(&text).unwrap();

        assert_eq!(back.sample_rate, 48_000);
        assert_eq!(back.channels, 2);
        assert_eq!(back.machine, Machine::Pal);
        assert_eq!(back.mixer.high_damp, 25);
        assert_eq!(back.chip_levels.fds, -6.0);
    }

    #[test]
    fn unknown_sample_rate_is_rejected_on_apply() {
        struct NoMem;
        impl crate::apu::SampleMem for NoMem {
            fn read_sample(&self, _addr: u16) -> u8 {
                0
            }
        }

        let mut config = SoundConfig::default();
        config.sample_rate = 0;
        let mut apu = Apu::new(Box::new(NoMem));
        assert!(config.apply(&mut apu).is_err());
    }
}
