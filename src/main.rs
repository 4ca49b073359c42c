use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tts_server::api::ApiServer;
use tts_server::audio::{
    AudioCaptureHub, AudioClip, CpalCaptureBackend, CpalSink, PlaybackDriver, device,
};
use tts_server::domain::{FrameSamples, StateChange};
use tts_server::{App, Config};

/// TTS Server - local text-to-speech with host audio playback and capture
#[derive(Parser)]
#[command(name = "tts-server", version, about)]
struct Cli {
    /// Path to a config file (default: ./config.toml, then ~/.config/tts-server/config.toml)
    #[arg(short, long, env = "TTS_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// List audio input and output devices
    Devices,
    /// Test microphone input through the capture hub
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the captured audio to this WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output with a 440Hz tone
    TestSpeaker,
    /// Play a WAV file on the speakers
    Play {
        /// Absolute or relative path to a .wav file
        file: PathBuf,
    },
    /// Synthesize text and play it on the speakers
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
        /// Language code
        #[arg(short, long, default_value = "en")]
        language: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,tts_server=info",
        1 => "info,tts_server=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Devices => list_devices(),
        Command::TestMic { duration, output } => {
            tokio::task::spawn_blocking(move || test_mic(&config, duration, output.as_deref()))
                .await?
        }
        Command::TestSpeaker => test_speaker(&config).await,
        Command::Play { file } => play(&config, &file).await,
        Command::Say { text, language } => say(&config, &text, &language).await,
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        addr = %config.server.bind_addr(),
        provider = ?config.tts.provider,
        audio = config.audio.enabled,
        "starting tts server"
    );

    let app = App::build(config)?;
    ApiServer::new(app.api_state(), config.server.bind_addr())
        .run()
        .await?;

    tracing::info!("tts server stopped");
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in device::list_input_devices()? {
        println!("  {name}");
    }
    println!("\nOutput devices:");
    for name in device::list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

fn to_f32(samples: &FrameSamples) -> Vec<f32> {
    match samples {
        FrameSamples::F32(s) => s.to_vec(),
        FrameSamples::I16(s) => s.iter().map(|&v| f32::from(v) / 32768.0).collect(),
    }
}

/// Capture through the hub for `duration` seconds, printing a level meter
fn test_mic(config: &Config, duration: u64, output: Option<&Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let backend = Arc::new(CpalCaptureBackend::new(config.capture.device_name.clone()));
    let hub = AudioCaptureHub::new(backend, config.capture.format, config.capture.drop_policy);
    let reader = hub.subscribe("test-mic", config.capture.max_frames);
    hub.start()?;

    let format = hub.format();
    println!(
        "Format: {} Hz, {} channel(s), {:?}",
        format.sample_rate, format.channels, format.sample_format
    );
    println!("---");

    let mut recorded = Vec::new();
    for i in 0..duration {
        let second_end = Instant::now() + Duration::from_secs(1);
        let mut window = Vec::new();
        while let Some(remaining) = second_end.checked_duration_since(Instant::now()) {
            if let Some(frame) = reader.read(Some(remaining)) {
                window.extend(to_f32(&frame.samples));
            }
        }

        let energy = calculate_rms(&window);
        let peak = window.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        if output.is_some() {
            recorded.extend(window);
        }
    }

    let dropped = reader.dropped();
    hub.stop();

    if let Some(path) = output {
        let clip = AudioClip {
            samples: recorded,
            sample_rate: format.sample_rate,
            channels: format.channels,
        };
        std::fs::write(path, clip.to_wav()?)?;
        println!("\nWrote {:.1}s to {}", clip.duration_seconds(), path.display());
    }

    println!("\n---");
    if dropped > 0 {
        println!("{dropped} frames were dropped (reader fell behind)");
    }
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: tts-server devices");
    println!("  3. Set [capture] device_name in config.toml");

    Ok(())
}

fn playback_driver(config: &Config) -> PlaybackDriver {
    PlaybackDriver::new(Arc::new(CpalSink::new(
        config.audio.device_index,
        config.audio.device_name.clone(),
        config.audio.buffer_size,
    )))
}

async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    // 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let status = playback_driver(config)
        .play_clip(AudioClip {
            samples,
            sample_rate,
            channels: 1,
        })
        .await?;

    println!("\n---");
    println!(
        "Played {:.1}s. If you heard the tone, your speakers are working!",
        status.duration_seconds.unwrap_or_default()
    );
    println!("If you didn't hear anything, check:");
    println!("  1. Run: tts-server devices");
    println!("  2. Set [audio] device_index or device_name in config.toml");

    Ok(())
}

async fn play(config: &Config, file: &Path) -> anyhow::Result<()> {
    let path = std::path::absolute(file)?;
    let status = playback_driver(config).play_file(&path).await?;
    println!(
        "Played {} ({:.1}s)",
        path.display(),
        status.duration_seconds.unwrap_or_default()
    );
    Ok(())
}

/// Synthesize through the configured engine and play on the speakers
async fn say(config: &Config, text: &str, language: &str) -> anyhow::Result<()> {
    println!("Speaking: \"{text}\"\n");

    let app = App::build(config)?;
    let (tx, mut rx) = tokio::sync::mpsc::channel::<StateChange>(8);
    let printer = tokio::spawn(async move {
        while let Some(change) = rx.recv().await {
            println!(
                "[{}] {}",
                change.state.as_str(),
                change.message.unwrap_or_default()
            );
        }
    });

    let result = app
        .synth_play
        .synthesize_and_play(text, language, None, Some(&tx))
        .await;
    drop(tx);
    printer.await?;

    result?;
    Ok(())
}
