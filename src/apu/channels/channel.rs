//! Per-channel mixer cursor

use crate::mixer::{Mixer, SoundChannel};

/// A channel's position on the mixer timeline
///
/// Tracks the frame-relative master clock the channel has been emulated up
/// to, and the last amplitude it emitted. `mix` turns absolute amplitudes
/// into the deltas the mixer consumes, so callers only ever state "the
/// output is now X".
#[derive(Debug, Clone)]
pub(crate) struct ChannelMix {
    chan: SoundChannel,
    time: u32,
    last_output: i32,
}

impl ChannelMix {
    pub fn new(chan: SoundChannel) -> Self {
        Self {
            chan,
            time: 0,
            last_output: 0,
        }
    }

    /// Move the cursor forward without a level change
    pub fn advance(&mut self, cycles: u32) {
        self.time += cycles;
    }

    /// Emit the channel's new absolute amplitude at the current cursor
    pub fn mix(&mut self, value: i32, mixer: &mut Mixer) {
        if value != self.last_output {
            mixer.add_value(self.chan, self.time, value - self.last_output, value);
            self.last_output = value;
        }
    }

    /// Rewind the cursor for the next frame
    pub fn end_frame(&mut self) {
        self.time = 0;
    }

    pub fn reset(&mut self) {
        self.time = 0;
        self.last_output = 0;
    }

    #[cfg(test)]
    pub fn last_output(&self) -> i32 {
        self.last_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_emits_only_changes() {
        let mut mixer = Mixer::new();
        let mut mix = ChannelMix::new(SoundChannel::Pulse1);

        mix.mix(10, &mut mixer);
        assert_eq!(mixer.chan_output(SoundChannel::Pulse1), 10);
        assert_eq!(mix.last_output(), 10);

        mix.advance(100);
        mix.mix(10, &mut mixer); // no change, no delta
        mix.mix(4, &mut mixer);
        assert_eq!(mixer.chan_output(SoundChannel::Pulse1), 4);
    }

    #[test]
    fn end_frame_rewinds_cursor_but_keeps_level() {
        let mut mixer = Mixer::new();
        let mut mix = ChannelMix::new(SoundChannel::Noise);

        mix.advance(500);
        mix.mix(7, &mut mixer);
        mix.end_frame();
        assert_eq!(mix.last_output(), 7);
    }
}
