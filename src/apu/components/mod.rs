//! Counter units shared between channels

pub mod envelope;
pub mod length_counter;
pub mod linear_counter;
pub mod sweep;

pub use envelope::Envelope;
pub use length_counter::LengthCounter;
pub use linear_counter::LinearCounter;
pub use sweep::Sweep;
