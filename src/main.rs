use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use ferris::events::{EngineEvent, TICK_INTERVAL};
use ferris::grammar::{AnyWord, CompileContext, WarnedWords};
use ferris::voice::{
    AudioCapture, ProcessSpeaker, SAMPLE_RATE, SilentSpeaker, Speaker, samples_to_wav,
};
use ferris::{Catalog, Config, Engine, NoiseLevel, Reply};

/// Ferris - voice-command engine for pluggable skills
///
/// Without a subcommand, runs an interactive console: each typed line is
/// dispatched as a command, awake or not. The binary bundles no speech
/// decoder or wake-word detector, so the microphone is not listened to;
/// spoken input needs an embedding program that provides a `Decoder` and
/// sends audio and wake events to the engine.
#[derive(Parser)]
#[command(name = "ferris", version, about)]
struct Cli {
    /// Directory containing one sub-directory per skill
    #[arg(short, long, env = "FERRIS_SKILLS_DIR")]
    skills: Option<PathBuf>,

    /// Wake phrase (empty for always awake)
    #[arg(short, long, env = "FERRIS_WAKE_PHRASE")]
    wake_phrase: Option<String>,

    /// Run without a wake phrase
    #[arg(long, conflicts_with = "wake_phrase")]
    no_wake: bool,

    /// Speech synthesis command, text is appended
    #[arg(long, env = "FERRIS_SPEECH_COMMAND")]
    speech_command: Option<String>,

    /// Disable speech output
    #[arg(long)]
    mute: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List loaded skills, intents, utterances and slots
    Skills,
    /// Print the compiled grammar
    Grammar {
        /// Compile as if this skill were active
        #[arg(short, long)]
        active: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the recording to this WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Speak text with the configured speech command
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the speech output.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,ferris=info",
        1 => "info,ferris=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli);
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Skills => {
                let catalog = Catalog::load_dir(&config.skills_dir, config.handler_timeout)?;
                print!("{}", catalog.listing());
                Ok(())
            }
            Command::Grammar { active } => print_grammar(&config, active.as_deref()),
            Command::TestMic { duration, output } => test_mic(duration, output.as_deref()).await,
            Command::Say { text } => say(&config, &text).await,
        };
    }

    console(config, cli.mute).await
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config::load();
    if let Some(dir) = &cli.skills {
        config.skills_dir.clone_from(dir);
    }
    if let Some(phrase) = &cli.wake_phrase {
        let phrase = phrase.trim();
        config.wake.phrase = (!phrase.is_empty()).then(|| phrase.to_string());
    }
    if cli.no_wake {
        config.wake.phrase = None;
    }
    if let Some(command) = &cli.speech_command {
        config.set_speech_command(command);
    }
    config
}

/// Open the configured speech command, falling back to muted output
fn speaker(config: &Config, mute: bool) -> Box<dyn Speaker> {
    if mute {
        return Box::new(SilentSpeaker);
    }
    match ProcessSpeaker::new(&config.speech) {
        Ok(speaker) => Box::new(speaker),
        Err(e) => {
            tracing::warn!(error = %e, "speech output unavailable, continuing muted");
            Box::new(SilentSpeaker)
        }
    }
}

/// Interactive console: typed lines go through the engine's event queue
async fn console(config: Config, mute: bool) -> anyhow::Result<()> {
    let catalog = Catalog::load_dir(&config.skills_dir, config.handler_timeout)?;
    if catalog.is_empty() {
        tracing::warn!(path = %config.skills_dir.display(), "no skills loaded");
    }

    let speaker = speaker(&config, mute);
    let engine = Engine::new(config, catalog).with_speaker(speaker);
    tracing::info!("no speech decoder bundled, reading commands from stdin");

    let (tx, rx) = mpsc::channel(64);

    let lines = tx.clone();
    tokio::spawn(async move {
        let mut reader = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    if lines.send(EngineEvent::Line(line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = lines.send(EngineEvent::Shutdown).await;
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read stdin");
                    let _ = lines.send(EngineEvent::Shutdown).await;
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            if tx.send(EngineEvent::Tick).await.is_err() {
                break;
            }
        }
    });

    ferris::run(engine, rx, |reply| match reply {
        Reply::Text(text) => println!("{}", text.trim_end()),
        Reply::Unrecognised => println!("Command unrecognised"),
        Reply::Done | Reply::Exit => {}
    })
    .await;

    Ok(())
}

fn print_grammar(config: &Config, active: Option<&str>) -> anyhow::Result<()> {
    let catalog = Catalog::load_dir(&config.skills_dir, config.handler_timeout)?;
    if let Some(name) = active {
        if catalog.get(name).is_none() {
            anyhow::bail!("no such skill: {name}");
        }
    }

    let ctx = CompileContext {
        active_skill: active,
        enable_builtins: config.enable_builtins,
    };
    print!(
        "{}",
        ferris::compile(&catalog, ctx, &AnyWord, &mut WarnedWords::new())
    );
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: Option<&Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut rx) = mpsc::channel::<Vec<i16>>(128);
    let mut capture = AudioCapture::new()?;
    capture.start(move |chunk| {
        let _ = tx.try_send(chunk);
    })?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    let mut recording = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut noise = NoiseLevel::default();
        while let Ok(chunk) = rx.try_recv() {
            noise.update(&chunk);
            recording.extend_from_slice(&chunk);
        }

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (noise.average() / 20.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] Noise: {:7.1} | Samples: {:6} | [{}]",
            i + 1,
            noise.average(),
            noise.samples(),
            meter
        );
    }

    capture.stop();

    if let Some(path) = output {
        let wav = samples_to_wav(&recording, SAMPLE_RATE)?;
        std::fs::write(path, wav)?;
        println!("\nWrote {} samples to {}", recording.len(), path.display());
    }

    println!("\n---");
    println!("Speech should read well above the noise threshold (default 100).");
    println!("If the level stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Speak text and wait for it to finish
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let mut speaker = ProcessSpeaker::new(&config.speech)?;
    speaker.say(text)?;
    while speaker.is_speaking() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}
