//! Songs as YAML or JSON. Both formats share one schema; field names are
//! lower case on output and accepted in either case on input.

use std::fs;
use std::path::Path;

use crate::error::SongFileError;
use crate::Song;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongFormat {
    Yaml,
    Json,
}

impl SongFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, SongFileError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "yml" | "yaml" => Ok(SongFormat::Yaml),
            "json" => Ok(SongFormat::Json),
            _ => Err(SongFileError::UnknownFormat { extension }),
        }
    }
}

pub fn parse(text: &str, format: SongFormat) -> Result<Song, SongFileError> {
    Ok(match format {
        SongFormat::Yaml => serde_yaml::from_str(text)?,
        SongFormat::Json => serde_json::from_str(text)?,
    })
}

pub fn to_text(song: &Song, format: SongFormat) -> Result<String, SongFileError> {
    Ok(match format {
        SongFormat::Yaml => serde_yaml::to_string(song)?,
        SongFormat::Json => serde_json::to_string_pretty(song)?,
    })
}

pub fn load(path: &Path) -> Result<Song, SongFileError> {
    let format = SongFormat::from_path(path)?;
    let song = parse(&fs::read_to_string(path)?, format)?;
    log::debug!(
        "loaded {}: {} instruments, {} tracks",
        path.display(),
        song.patch.len(),
        song.score.tracks.len()
    );
    Ok(song)
}

pub fn save(path: &Path, song: &Song) -> Result<(), SongFileError> {
    let format = SongFormat::from_path(path)?;
    fs::write(path, to_text(song, format)?)?;
    Ok(())
}
