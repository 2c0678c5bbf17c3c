// Purpose - external interfaces: audio export, song files

pub mod audio;
#[cfg(feature = "serde")]
pub mod song_file;

pub use audio::{Container, SampleFormat};
