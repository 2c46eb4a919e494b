//! 2A03 channel state machines

pub mod channel;
pub mod dpcm;
pub mod noise;
pub mod pulse;
pub mod triangle;

pub(crate) use channel::ChannelMix;
pub use dpcm::{DpcmChannel, SampleMem};
pub use noise::NoiseChannel;
pub use pulse::PulseChannel;
pub use triangle::TriangleChannel;
