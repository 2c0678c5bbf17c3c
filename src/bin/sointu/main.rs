//! sointu - render or play a song
//!
//! Run with: cargo run -- song.yml --play

mod playback;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{Result as EyreResult, WrapErr};

use sointu::io::{audio, song_file, Container, SampleFormat};
use sointu::player::{play, RenderOptions};
use sointu::SAMPLE_RATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    WavF32,
    WavI16,
    RawF32,
    RawI16,
}

impl Format {
    fn container(self) -> Container {
        match self {
            Format::WavF32 | Format::WavI16 => Container::Wav,
            Format::RawF32 | Format::RawI16 => Container::Raw,
        }
    }

    fn sample_format(self) -> SampleFormat {
        match self {
            Format::WavF32 | Format::RawF32 => SampleFormat::Float32,
            Format::WavI16 | Format::RawI16 => SampleFormat::Int16,
        }
    }

    fn extension(self) -> &'static str {
        match self.container() {
            Container::Wav => "wav",
            Container::Raw => "raw",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "sointu", version, about = "Render or play a sointu song")]
struct Cli {
    /// Song file, YAML or JSON by extension
    input: PathBuf,

    /// Where to write the rendered audio; defaults to the input name with
    /// the format's extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Format::WavF32)]
    format: Format,

    /// Play through the default audio device instead of writing a file
    #[arg(short, long)]
    play: bool,

    /// Seconds to keep rendering after the last row
    #[arg(short, long, default_value_t = 1.0)]
    tail: f32,

    /// Repeat the song until interrupted (playback only)
    #[arg(short = 'l', long = "loop")]
    repeat: bool,
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let song = song_file::load(&cli.input)
        .wrap_err_with(|| format!("failed to load {}", cli.input.display()))?;
    let tail_samples = (cli.tail.max(0.0) * SAMPLE_RATE as f32) as usize;

    if cli.play {
        return playback::run(&song, tail_samples, cli.repeat);
    }
    if cli.repeat {
        log::warn!("--loop only applies to --play");
    }

    let options = RenderOptions::default()
        .release_at_end(true)
        .tail_samples(tail_samples);
    let audio = play(&song, options).wrap_err("failed to render the song")?;
    log::info!(
        "rendered {:.2} s, {} sync values",
        audio.frames.len() as f32 / SAMPLE_RATE as f32,
        audio.syncs.len()
    );

    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension(cli.format.extension()));
    audio::save(
        &output,
        &audio.frames,
        cli.format.container(),
        cli.format.sample_format(),
    )
    .wrap_err_with(|| format!("failed to write {}", output.display()))?;
    Ok(())
}
