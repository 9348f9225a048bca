//! narrator_client - capture, upload and speak
//!
//! Captures a frame every interval (or when a key or button asks for one),
//! uploads it to the gateway and speaks the reply. A failed upload ends the
//! process with a non-zero status so a supervisor can restart it.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use frame_narrator::capture::{open_camera, CaptureGuard};
use frame_narrator::config::ClientConfig;
use frame_narrator::trigger::{spawn_pin_reader, ChannelInput, TriggerMultiplexer};
use frame_narrator::{ClientSession, SpeechSink, UploadClient};

/// Pin events waiting for a capture worker before new ones are dropped.
const PIN_QUEUE_CAPACITY: usize = 8;

#[derive(Parser, Debug)]
#[command(author, version, about = "Narrate what the camera sees")]
struct Args {
    /// Gateway base URL.
    #[arg(long, env = "NARRATOR_SERVER_URL")]
    server: Option<String>,

    /// Camera index, /dev/videoN, file://<image> or stub://<name>.
    #[arg(long, env = "NARRATOR_CAMERA")]
    camera: Option<String>,

    /// Milliseconds between timer captures.
    #[arg(long, env = "NARRATOR_INTERVAL_MS")]
    interval_ms: Option<u64>,

    /// Output language code or name (en, hi, telugu, ...).
    #[arg(long, env = "NARRATOR_LANGUAGE")]
    language: Option<String>,

    /// Line-oriented pin event device (one BCM pin number per line).
    #[arg(long, env = "NARRATOR_PIN_DEVICE")]
    pin_device: Option<PathBuf>,

    /// Capture workers for pin events.
    #[arg(long, env = "NARRATOR_WORKERS")]
    workers: Option<usize>,

    /// Print results instead of using text-to-speech.
    #[arg(long)]
    print_only: bool,
}

impl Args {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(camera) = &self.camera {
            config.camera = camera.clone();
        }
        if let Some(ms) = self.interval_ms {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if let Some(path) = &self.pin_device {
            config.pin_device = Some(path.clone());
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = ClientConfig::load()?;
    args.apply(&mut config);
    config.validate()?;

    let camera = open_camera(&config.camera)
        .with_context(|| format!("open camera '{}'", config.camera))?;
    let camera = CaptureGuard::new(camera);
    log::info!(
        "narrator_client: camera {}, server {}, language {}, every {:?}",
        camera.label(),
        config.server_url,
        config.language,
        config.interval
    );

    let uploader = UploadClient::new(&config.server_url, config.upload_timeout)?;
    let speech = if args.print_only {
        SpeechSink::silent(&config.language)
    } else {
        SpeechSink::system(&config.language)
    };
    let session = Arc::new(ClientSession::new(
        camera,
        Box::new(uploader),
        speech,
        &config.language,
    ));

    let multiplexer = TriggerMultiplexer::new(session.clone(), config.interval);
    let shutdown = multiplexer.shutdown_flag();
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let _workers = match &config.pin_device {
        Some(path) => {
            let (dispatcher, workers) =
                multiplexer.interrupt_handler(config.workers, PIN_QUEUE_CAPACITY);
            spawn_pin_reader(path, dispatcher, multiplexer.shutdown_flag())?;
            Some(workers)
        }
        None => None,
    };

    #[cfg(unix)]
    let _raw_terminal = frame_narrator::trigger::RawTerminal::enable();
    let mut input = ChannelInput::stdin();
    println!("Keys: 1 = read text, 2 = traffic, 3 = search, q = quit");

    let result = multiplexer.run(&mut input);
    session.shutdown();
    let stats = session.stats();
    log::info!(
        "narrator_client: {} cycles, {} spoken, {} silent, {} capture failures",
        stats.cycles,
        stats.spoken,
        stats.silent,
        stats.capture_failures
    );

    match result {
        Ok(exit) => {
            log::info!("narrator_client stopped ({:?})", exit);
            Ok(())
        }
        Err(err) => Err(anyhow::Error::new(err).context("narrator_client terminated")),
    }
}
