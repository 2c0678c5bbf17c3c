//! Compact storage layouts shared by the encoder and the synth.

pub mod ring;
pub mod super_array;

pub use ring::DelayRing;
pub use super_array::find_super_array;
