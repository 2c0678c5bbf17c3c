//! Realtime playback through the default output device.

use std::time::Duration;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use sointu::player::{AlertPriority, Player, PlayerConfig, PlayerEvent};
use sointu::score::SongPos;
use sointu::{Song, SAMPLE_RATE};

/// Frames rendered per player call inside the audio callback.
const CHUNK: usize = 1024;

pub fn run(song: &Song, tail_samples: usize, repeat: bool) -> EyreResult<()> {
    song.validate().wrap_err("song is not playable")?;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| eyre!("no default output device available"))?;
    let channels = device
        .default_output_config()
        .wrap_err("failed to fetch default output config")?
        .channels()
        .max(1) as usize;
    let config = cpal::StreamConfig {
        channels: channels as u16,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let (player, mut handle) = Player::new(PlayerConfig::default().tail_samples(tail_samples));
    let mut player = player.with_repeat(repeat);
    player.load(song).wrap_err("failed to build the synth")?;
    if handle.play(SongPos::default()).is_err() {
        return Err(eyre!("player message queue is full"));
    }

    let mut scratch = vec![[0.0f32; 2]; CHUNK];
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _| {
            for out in data.chunks_mut(CHUNK * channels) {
                let frames = out.len() / channels;
                let block = &mut scratch[..frames];
                player.process(block);
                for (frame, samples) in block.iter().zip(out.chunks_mut(channels)) {
                    for (ch, sample) in samples.iter_mut().enumerate() {
                        *sample = frame[ch.min(1)];
                    }
                }
            }
        },
        |err| log::error!("audio stream error: {err}"),
        None,
    )?;
    stream.play()?;
    log::info!("playing at {SAMPLE_RATE} Hz, {channels} channels; press Ctrl+C to stop");

    loop {
        std::thread::sleep(Duration::from_millis(50));
        for event in handle.events() {
            match event {
                PlayerEvent::Alert(alert) if alert.priority() == AlertPriority::Error => {
                    return Err(eyre!("{alert}"));
                }
                PlayerEvent::Alert(alert) => log::warn!("{alert}"),
                PlayerEvent::Status(status) if status.finished => {
                    log::info!("song finished");
                    return Ok(());
                }
                PlayerEvent::Status(_) => {}
                // freed here rather than in the audio callback
                PlayerEvent::Retired(retired) => drop(retired),
            }
        }
    }
}
