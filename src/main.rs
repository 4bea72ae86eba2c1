use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use beacon_live::screen::CommandScreenSource;
use beacon_live::session::{GeminiTransport, LiveTransport};
use beacon_live::tools::SystemOpener;
use beacon_live::voice::{
    AudioBuffer, AudioPipeline, CpalMicrophone, CpalOutput, EnergyWakeDetector, FrameSink,
    Microphone, PipelineConfig, WakeWordEngine, list_input_devices, rms,
};
use beacon_live::{Backends, Config, LogSource, SessionController, SessionEvent};

/// Beacon Live - realtime voice assistant
#[derive(Parser)]
#[command(name = "beacon-live", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Connect immediately instead of waiting for the wake word
    #[arg(long)]
    connect: bool,

    /// Disable the wake word gate
    #[arg(long, env = "BEACON_LIVE_NO_WAKE_WORD")]
    no_wake_word: bool,

    /// Input device name (see `beacon-live devices`)
    #[arg(long, env = "BEACON_LIVE_INPUT_DEVICE")]
    input_device: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output through the playback scheduler
    TestSpeaker,
    /// List input devices
    Devices,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,beacon_live=info",
        1 => "info,beacon_live=debug",
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
    let mut config = Config::load()?;
    if cli.input_device.is_some() {
        config.input_device.clone_from(&cli.input_device);
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration, config.input_device).await,
            Command::TestSpeaker => test_speaker(config.session.output_sample_rate).await,
            Command::Devices => {
                list_devices();
                Ok(())
            }
            Command::Config => {
                show_config(&config);
                Ok(())
            }
        };
    }

    let microphone: Arc<dyn Microphone> = Arc::new(CpalMicrophone::new(config.input_device.clone()));

    let transport = config.api_key.take().map(|key| {
        Arc::new(GeminiTransport::new(config.session.endpoint.clone(), key)) as Arc<dyn LiveTransport>
    });
    if transport.is_none() {
        tracing::warn!("no realtime API key configured; set GEMINI_API_KEY");
    }

    let wake_word = (config.wake_word.is_active() && !cli.no_wake_word).then(|| {
        Box::new(EnergyWakeDetector::new(
            Arc::clone(&microphone),
            &config.wake_word.keyword,
            config.wake_word.threshold,
        )) as Box<dyn WakeWordEngine>
    });
    let wake_enabled = wake_word.is_some();

    let output = CpalOutput::new(config.session.output_sample_rate)?;

    let backends = Backends {
        transport,
        microphone,
        output: Box::new(output),
        wake_word,
        screen: Some(Arc::new(CommandScreenSource)),
        opener: Arc::new(SystemOpener),
    };

    let (mut controller, rx) = SessionController::new(config.session, backends);
    let events = controller.sender();

    spawn_log_printer(controller.log_mut().subscribe());
    spawn_stdin_reader(events.clone());

    let shutdown = events.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(SessionEvent::Shutdown);
        }
    });

    controller.start();
    if cli.connect {
        let _ = events.send(SessionEvent::Connect);
    }

    if wake_enabled {
        println!("beacon live ready - say \"{}\"", config.wake_word.keyword);
    } else {
        println!("beacon live ready - type `connect` to start a session");
    }
    println!("commands: connect, disconnect, screen, screen off, quit; anything else is sent as text");

    controller.run(rx).await;
    Ok(())
}

/// Print conversation entries as they are logged
fn spawn_log_printer(mut entries: mpsc::UnboundedReceiver<beacon_live::LogEntry>) {
    tokio::spawn(async move {
        while let Some(entry) = entries.recv().await {
            let who = match entry.source {
                LogSource::User => "you",
                LogSource::Assistant => "beacon",
                LogSource::System => "system",
            };
            match entry.link {
                Some(link) => println!("[{who}] {} <{link}>", entry.message),
                None => println!("[{who}] {}", entry.message),
            }
        }
    });
}

/// Translate stdin lines into session events
fn spawn_stdin_reader(events: mpsc::UnboundedSender<SessionEvent>) {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = match line.trim() {
                "" => continue,
                "connect" => SessionEvent::Connect,
                "disconnect" => SessionEvent::Disconnect,
                "screen" => SessionEvent::StartScreenShare,
                "screen off" => SessionEvent::StopScreenShare,
                "quit" | "exit" => SessionEvent::Shutdown,
                text => SessionEvent::SendText(text.to_string()),
            };
            if events.send(event).is_err() {
                break;
            }
        }
    });
}

/// Test microphone input
async fn test_mic(duration: u64, device: Option<String>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let frames: Arc<Mutex<(Vec<f32>, u32)>> = Arc::new(Mutex::new((Vec::new(), 0)));
    let sink_frames = Arc::clone(&frames);
    let sink: FrameSink = Arc::new(move |samples, rate| {
        if let Ok(mut guard) = sink_frames.lock() {
            guard.0.extend_from_slice(&samples);
            guard.1 = rate;
        }
    });

    let mut capture = CpalMicrophone::new(device).open(sink).await?;
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let (samples, rate) = frames
            .lock()
            .map(|mut guard| (std::mem::take(&mut guard.0), guard.1))
            .unwrap_or_default();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] {rate} Hz | RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]",
            i + 1
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: beacon-live devices");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave queued as consecutive units
async fn test_speaker(sample_rate: u32) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let output = CpalOutput::new(sample_rate)?;
    let mut pipeline = AudioPipeline::new(PipelineConfig::default(), Box::new(output));

    let frequency = 440.0_f32;
    let unit_samples = usize::try_from(sample_rate / 2)?;
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    // Four half-second units; phase carries across so the joins are seamless
    for unit in 0..4 {
        #[allow(clippy::cast_precision_loss)]
        let samples: Vec<f32> = (0..unit_samples)
            .map(|i| {
                let t = (unit * unit_samples + i) as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
            })
            .collect();
        let tx = done_tx.clone();
        let scheduled = pipeline.schedule_buffer(AudioBuffer::mono(samples, sample_rate), move |id| {
            let _ = tx.send(id);
        })?;
        println!(
            "unit {} starts at {:.2}s for {:.2}s",
            scheduled.id, scheduled.start_at, scheduled.duration
        );
    }

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(id) = done_rx.recv().await {
            if pipeline.finish_unit(id) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    pipeline.teardown();

    println!("\n---");
    if drained {
        println!("If you heard the tone, your speakers are working!");
    } else {
        println!("Playback did not finish; the output device may be stalled.");
    }
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

fn list_devices() {
    let devices = list_input_devices();
    if devices.is_empty() {
        println!("No input devices found");
        return;
    }
    for name in devices {
        println!("{name}");
    }
}

fn show_config(config: &Config) {
    let session = &config.session;
    let path = beacon_live::config::config_file_path(|key| std::env::var(key).ok());
    println!(
        "config file:        {}",
        path.map_or_else(|| "none".to_string(), |p| p.display().to_string())
    );
    println!("endpoint:           {}", session.endpoint);
    println!("model:              {}", session.model);
    println!("voice:              {}", session.voice);
    println!("api key:            {}", if config.has_api_key() { "set" } else { "missing" });
    println!(
        "wake word:          {} ({})",
        config.wake_word.keyword,
        if config.wake_word.is_active() { "enabled" } else { "disabled" }
    );
    println!("input device:       {}", config.input_device.as_deref().unwrap_or("default"));
    println!("input rate:         {} Hz", session.input_sample_rate);
    println!("output rate:        {} Hz", session.output_sample_rate);
    println!("chunk samples:      {}", session.chunk_samples);
    println!("reconnect backoff:  {:?}", session.reconnect_backoff);
    println!("wake restart delay: {:?}", session.wake_word_restart_delay);
    println!("screen interval:    {:?}", session.screen_frame_interval);
}
