//! Logical mixer channel and chip identifiers

/// Sound chips whose output routes through the mixer
///
/// `Apu` is the built-in 2A03; the rest are cartridge expansion chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip {
    Apu,
    Vrc6,
    Vrc7,
    Fds,
    Mmc5,
    N106,
}

impl Chip {
    pub const COUNT: usize = 6;

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// One logical output line per channel
///
/// Every delta written to the mixer is tagged with its channel, which selects
/// the per-chip gain and the channel's amplitude scale. VRC7 is absent here
/// on purpose: it renders host-rate PCM and bypasses the delta timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundChannel {
    Pulse1,
    Pulse2,
    Triangle,
    Noise,
    Dpcm,
    Vrc6Pulse1,
    Vrc6Pulse2,
    Vrc6Sawtooth,
    Fds,
    Mmc5Pulse1,
    Mmc5Pulse2,
    Mmc5Pcm,
    N106Ch1,
    N106Ch2,
    N106Ch3,
    N106Ch4,
    N106Ch5,
    N106Ch6,
    N106Ch7,
    N106Ch8,
}

impl SoundChannel {
    pub const COUNT: usize = 20;

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// The chip this channel belongs to
    pub fn chip(self) -> Chip {
        use SoundChannel::*;
        match self {
            Pulse1 | Pulse2 | Triangle | Noise | Dpcm => Chip::Apu,
            Vrc6Pulse1 | Vrc6Pulse2 | Vrc6Sawtooth => Chip::Vrc6,
            Fds => Chip::Fds,
            Mmc5Pulse1 | Mmc5Pulse2 | Mmc5Pcm => Chip::Mmc5,
            N106Ch1 | N106Ch2 | N106Ch3 | N106Ch4 | N106Ch5 | N106Ch6 | N106Ch7 | N106Ch8 => {
                Chip::N106
            }
        }
    }

    /// The n-th N106 wave channel (0-7)
    pub(crate) fn n106(index: usize) -> SoundChannel {
        use SoundChannel::*;
        const CHANNELS: [SoundChannel; 8] = [
            N106Ch1, N106Ch2, N106Ch3, N106Ch4, N106Ch5, N106Ch6, N106Ch7, N106Ch8,
        ];
        CHANNELS[index & 7]
    }

    /// Amplitude scale applied to this channel's deltas
    ///
    /// The 2A03 weights approximate the console's non-linear DAC around
    /// typical playing levels (triangle ~2.75x and noise ~1.85x a pulse
    /// step); expansion weights are chosen to balance against the 2A03 at
    /// 0 dB chip level.
    pub(crate) fn level_scale(self) -> f32 {
        use SoundChannel::*;
        match self {
            Pulse1 | Pulse2 => 88.0,
            Triangle => 242.0,
            Noise => 163.0,
            Dpcm => 29.0,
            Vrc6Pulse1 | Vrc6Pulse2 => 88.0,
            Vrc6Sawtooth => 44.0,
            Fds => 28.0,
            Mmc5Pulse1 | Mmc5Pulse2 => 88.0,
            Mmc5Pcm => 7.0,
            N106Ch1 | N106Ch2 | N106Ch3 | N106Ch4 | N106Ch5 | N106Ch6 | N106Ch7 | N106Ch8 => 9.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_chip_mapping() {
        assert_eq!(SoundChannel::Pulse1.chip(), Chip::Apu);
        assert_eq!(SoundChannel::Vrc6Sawtooth.chip(), Chip::Vrc6);
        assert_eq!(SoundChannel::Mmc5Pcm.chip(), Chip::Mmc5);
        assert_eq!(SoundChannel::N106Ch8.chip(), Chip::N106);
    }

    #[test]
    fn channel_indices_are_dense() {
        assert_eq!(SoundChannel::Pulse1.index(), 0);
        assert_eq!(SoundChannel::N106Ch8.index(), SoundChannel::COUNT - 1);
    }
}
