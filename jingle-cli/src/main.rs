//! Jingle CLI: play the looping melody on a device, render it to WAV, or list
//! output devices.

mod control;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use log::{info, warn};

use jingle_engine::soft::{offline::BLOCK_FRAMES, output_device_names, DeviceOptions};
use jingle_engine::{OfflineRender, PlayerConfig, PlayerHandle, SoftBackend, Wave};

use control::{apply_to_handle, apply_to_player, parse_control, parse_scripted, Control, ScriptedChange};

#[derive(Parser)]
#[command(name = "jingle")]
#[command(about = "Looping toy synthesizer with live volume, pitch, reverb and tempo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play on an output device; control lines are read from stdin
    /// (`volume 30`, `tempo 90`, `pitch 523`, `reverb 60`, `start`, `stop`, `quit`)
    Play {
        #[command(flatten)]
        settings: Settings,

        /// Output device name (see `jingle devices`)
        #[arg(long)]
        device: Option<String>,

        /// Requested device sample rate
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Requested device channel count
        #[arg(long)]
        channels: Option<u16>,

        /// Quit after this many seconds
        #[arg(short, long)]
        seconds: Option<f64>,
    },

    /// Render to a WAV file faster than realtime
    Render {
        /// Output WAV file path
        output: PathBuf,

        #[command(flatten)]
        settings: Settings,

        /// Duration in seconds
        #[arg(short, long, default_value = "8.0")]
        seconds: f64,

        /// Sample rate in Hz
        #[arg(long, default_value = "48000")]
        sample_rate: u32,

        /// Scripted change, e.g. `3.0:tempo=180` (repeatable)
        #[arg(long = "at", value_parser = parse_scripted)]
        changes: Vec<ScriptedChange>,
    },

    /// List output devices
    Devices,
}

/// Config file plus per-run overrides.
#[derive(Args)]
struct Settings {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial volume, 0-100
    #[arg(long)]
    volume: Option<f32>,

    /// Initial tempo in BPM
    #[arg(long)]
    tempo: Option<f32>,

    /// Initial pitch base in Hz (the reference pitch leaves the melody as written)
    #[arg(long)]
    pitch: Option<f32>,

    /// Initial reverb amount, 0-100
    #[arg(long)]
    reverb: Option<f32>,

    /// Oscillator waveform: sine, tri or saw
    #[arg(long)]
    wave: Option<String>,
}

impl Settings {
    fn load(&self) -> Result<PlayerConfig> {
        let mut cfg = match &self.config {
            Some(path) => PlayerConfig::load(path)?,
            None => PlayerConfig::default(),
        };
        if let Some(v) = self.volume { cfg.volume = v; }
        if let Some(t) = self.tempo { cfg.tempo = t; }
        if let Some(p) = self.pitch { cfg.frequency = p; }
        if let Some(r) = self.reverb { cfg.reverb = r; }
        if let Some(w) = &self.wave {
            cfg.wave = match w.to_ascii_lowercase().as_str() {
                "sine" => Wave::Sine,
                "tri" | "triangle" => Wave::Tri,
                "saw" => Wave::Saw,
                other => anyhow::bail!("unknown wave `{other}` (sine, tri, saw)"),
            };
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn list_devices() -> Result<()> {
    println!("Available output devices:");
    for name in output_device_names()? {
        println!("- {name}");
    }
    Ok(())
}

fn play(cfg: PlayerConfig, options: DeviceOptions, seconds: Option<f64>) -> Result<()> {
    let handle = PlayerHandle::spawn(cfg, move || SoftBackend::device(options))?;
    handle.start()?;
    println!("Playing. Type `volume N`, `tempo N`, `pitch N`, `reverb N`, `start`, `stop` or `quit`.");

    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
    loop {
        let wait = deadline.map_or(Duration::from_secs(3600), |d| d.saturating_duration_since(Instant::now()));
        let line = match rx.recv_timeout(wait) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) if deadline.is_some_and(|d| Instant::now() >= d) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            // stdin closed: keep playing until the time limit, if there is one
            Err(RecvTimeoutError::Disconnected) => match deadline {
                Some(d) => {
                    std::thread::sleep(d.saturating_duration_since(Instant::now()));
                    break;
                }
                None => break,
            },
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_control(&line) {
            Ok(Control::Quit) => break,
            Ok(c) => {
                if let Err(e) = apply_to_handle(&handle, c) {
                    warn!("{e}");
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }
    handle.shutdown();
    Ok(())
}

fn render(cfg: PlayerConfig, output: &Path, seconds: f64, sample_rate: u32, mut changes: Vec<ScriptedChange>) -> Result<()> {
    changes.sort_by(|a, b| a.at.total_cmp(&b.at));
    let mut r = OfflineRender::new(cfg, sample_rate, 2)?;
    r.player_mut().start()?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: r.sample_rate(),
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(output, spec).with_context(|| format!("creating {}", output.display()))?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = (seconds.max(0.0) * f64::from(sample_rate)).round() as u64;
    let mut buf = vec![0.0f32; BLOCK_FRAMES * r.channels()];
    let mut done = 0u64;
    let mut next_change = 0;
    while done < total {
        while let Some(ch) = changes.get(next_change).filter(|c| c.at <= r.time()) {
            info!("{:.3} s: {:?}", r.time(), ch.control);
            apply_to_player(r.player_mut(), ch.control)?;
            next_change += 1;
        }
        #[allow(clippy::cast_possible_truncation)]
        let frames = (total - done).min(BLOCK_FRAMES as u64) as usize;
        let block = &mut buf[..frames * r.channels()];
        r.render(block);
        for s in block.iter() {
            writer.write_sample(*s)?;
        }
        done += frames as u64;
    }
    writer.finalize()?;
    println!("Wrote {seconds} s at {sample_rate} Hz to {}", output.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Play { settings, device, sample_rate, channels, seconds } => {
            let options = DeviceOptions { device_name: device, sample_rate, channels };
            play(settings.load()?, options, seconds)
        }
        Commands::Render { output, settings, seconds, sample_rate, changes } => {
            render(settings.load()?, &output, seconds, sample_rate, changes)
        }
    }
}
