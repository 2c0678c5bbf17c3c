//! Stereo output at the engine rate: sample conversion, raw little-endian
//! streams and WAV files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use hound::{WavSpec, WavWriter};

use crate::error::AudioError;
use crate::SAMPLE_RATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Float32,
    Int16,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Float32 => 4,
            SampleFormat::Int16 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// RIFF/WAVE with a single data chunk.
    Wav,
    /// Interleaved samples with no header.
    Raw,
}

/// Full scale is ±32767, so the range stays symmetric. The cast truncates
/// toward zero and saturates out-of-range values.
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0) as i16
}

fn wav_spec(format: SampleFormat) -> WavSpec {
    match format {
        SampleFormat::Float32 => WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
        SampleFormat::Int16 => WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        },
    }
}

/// Writes `frames` as headerless interleaved little-endian samples.
pub fn write_raw<W: Write>(
    mut out: W,
    frames: &[[f32; 2]],
    format: SampleFormat,
) -> Result<(), AudioError> {
    for &sample in frames.iter().flatten() {
        match format {
            SampleFormat::Float32 => out.write_all(&sample.to_le_bytes())?,
            SampleFormat::Int16 => out.write_all(&to_i16(sample).to_le_bytes())?,
        }
    }
    out.flush()?;
    Ok(())
}

/// Writes `frames` as a WAV stream.
pub fn write_wav<W: Write + std::io::Seek>(
    out: W,
    frames: &[[f32; 2]],
    format: SampleFormat,
) -> Result<(), AudioError> {
    let mut writer = WavWriter::new(out, wav_spec(format))?;
    for &sample in frames.iter().flatten() {
        match format {
            SampleFormat::Float32 => writer.write_sample(sample)?,
            SampleFormat::Int16 => writer.write_sample(to_i16(sample))?,
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Saves `frames` to `path` in the given container and sample format.
pub fn save(
    path: &Path,
    frames: &[[f32; 2]],
    container: Container,
    format: SampleFormat,
) -> Result<(), AudioError> {
    let file = BufWriter::new(File::create(path)?);
    match container {
        Container::Wav => write_wav(file, frames, format),
        Container::Raw => write_raw(file, frames, format),
    }?;
    log::info!("wrote {} frames to {}", frames.len(), path.display());
    Ok(())
}

/// Reads headerless little-endian 32-bit float stereo. A trailing partial
/// frame is ignored.
pub fn read_raw_f32(bytes: &[u8]) -> Vec<[f32; 2]> {
    bytes
        .chunks_exact(8)
        .map(|frame| {
            let left = f32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
            let right = f32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
            [left, right]
        })
        .collect()
}
