use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use presence_client::{VerificationClient, Verifier};
use presence_core::{DrawList, Status, VerificationResult};
use presence_hw::{MediaDevices, SyntheticDevices, V4lDevices};
use presence_live::{FullscreenController, HeadlessPresentation, LivePoller, Phase, Presentation};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "presence", about = "Presence live face verification client")]
struct Cli {
    /// TOML config file; PRESENCE_* environment variables take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in test-pattern camera instead of /dev/video*
    #[arg(long, global = true)]
    synthetic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List video capture devices
    Devices,
    /// Capture one frame and verify it
    Check {
        /// Also request emotion, gaze and face box
        #[arg(long)]
        analysis: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify continuously until interrupted
    Live {
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
        /// Present in fullscreen mode
        #[arg(long)]
        fullscreen: bool,
    },
    /// Register a new identity from the camera
    Register {
        /// Name to register
        #[arg(short, long)]
        name: String,
    },
    /// Check that the verification service is reachable
    Health,
    /// Check that the verification service can take requests
    Ready,
}

/// Keyboard commands accepted on stdin during `live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiveCommand {
    SwitchCamera,
    NextDevice,
    ToggleFullscreen,
    Quit,
}

impl LiveCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "s" | "switch" => Some(Self::SwitchCamera),
            "n" | "next" => Some(Self::NextDevice),
            "f" | "fullscreen" => Some(Self::ToggleFullscreen),
            "q" | "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

const LIVE_HELP: &str = "commands: s switch camera, n next device, f fullscreen, q quit";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration");

    if cli.synthetic {
        let media = SyntheticDevices::webcam();
        media.grant_permission();
        run(media, &config, cli.command).await
    } else {
        run(V4lDevices, &config, cli.command).await
    }
}

async fn run<D: MediaDevices + 'static>(
    media: D,
    config: &Config,
    command: Commands,
) -> Result<()> {
    let client = Arc::new(
        VerificationClient::new(config.client_config()).context("failed to build HTTP client")?,
    );
    let new_poller = |media: D| {
        LivePoller::new(media, client.clone(), DrawList::new(0, 0), config.live_config())
    };

    match command {
        Commands::Devices => {
            let devices = media.enumerate().await?;
            if devices.is_empty() {
                println!("No video devices found");
            }
            for device in devices {
                println!("{}  {}  ({:?})", device.id, device.label, device.facing);
            }
        }
        Commands::Health => {
            if client.health().await {
                println!("{}: healthy", client.base_url());
            } else {
                bail!("{} is not reachable", client.base_url());
            }
        }
        Commands::Ready => {
            if client.ready().await {
                println!("{}: ready", client.base_url());
            } else {
                bail!("{} is not ready", client.base_url());
            }
        }
        Commands::Check { analysis, json } => {
            let poller = new_poller(media);
            let outcome = poller.check_once(analysis).await;
            poller.stop_camera().await;

            let result = outcome?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Commands::Register { name } => {
            let poller = new_poller(media);
            poller.start_camera().await?;
            let outcome = poller.register(&client, &name).await;
            poller.stop_camera().await;

            outcome?;
            println!("{}", status_line(&poller.status()));
        }
        Commands::Live { duration, fullscreen } => {
            let poller = new_poller(media);
            run_live(&poller, duration.map(Duration::from_secs), fullscreen).await?;
        }
    }

    Ok(())
}

async fn run_live<D: MediaDevices + 'static>(
    poller: &LivePoller<D, Arc<VerificationClient>>,
    duration: Option<Duration>,
    fullscreen: bool,
) -> Result<()> {
    let presentation = FullscreenController::new(HeadlessPresentation::default());
    if fullscreen {
        if let Err(e) = presentation.enter().await {
            tracing::warn!(error = %e, "staying windowed");
        }
    }

    let mut updates = poller.subscribe();
    poller.start().await?;
    let layout = presentation.layout(true);
    tracing::info!(
        mode = ?presentation.mode(),
        secondary_panels = layout.secondary_panels,
        control_bar = layout.control_bar,
        "presentation"
    );
    println!("Live verification running; {LIVE_HELP} (Ctrl-C also stops)");

    let mut commands = stdin_lines();
    let deadline = duration.map(|d| Instant::now() + d);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = wait_until(deadline) => break,
            Some(line) = commands.recv() => match LiveCommand::parse(&line) {
                Some(command) => {
                    if !apply_command(poller, &presentation, command).await {
                        break;
                    }
                }
                None => println!("{LIVE_HELP}"),
            },
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = updates.borrow_and_update().clone();
                let stats = poller.stats();
                println!(
                    "{}  [attention {:.1}% of {} frames]",
                    status_line(&status),
                    stats.percentage(),
                    stats.total_frames
                );
            }
        }
    }

    poller.stop().await;
    presentation.exit().await?;

    let stats = poller.stats();
    println!(
        "Attention: {:.1}% ({}/{} frames), {} requests, {} ticks skipped",
        stats.percentage(),
        stats.attention_frames,
        stats.total_frames,
        poller.requests_issued(),
        poller.ticks_skipped()
    );
    Ok(())
}

/// Run one live keyboard command. Returns false when the loop should end.
async fn apply_command<D, V, P>(
    poller: &LivePoller<D, V>,
    presentation: &FullscreenController<P>,
    command: LiveCommand,
) -> bool
where
    D: MediaDevices + 'static,
    V: Verifier + 'static,
    P: Presentation,
{
    // Camera failures already land on the status channel.
    match command {
        LiveCommand::SwitchCamera => {
            let _ = poller.switch_camera().await;
        }
        LiveCommand::NextDevice => {
            let _ = poller.next_device().await;
        }
        LiveCommand::ToggleFullscreen => match presentation.toggle().await {
            Ok(mode) => {
                let layout = presentation.layout(poller.phase() == Phase::Running);
                println!("Presentation: {mode:?} (side panels: {})", layout.secondary_panels);
            }
            Err(e) => println!("Fullscreen unavailable: {e}"),
        },
        LiveCommand::Quit => return false,
    }
    true
}

/// Lines typed on stdin, read on a plain thread so a pending read never
/// holds up runtime shutdown.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn status_line(status: &Status) -> String {
    format!("[{:?}] {}", status.kind, status.message)
}

fn print_result(result: &VerificationResult) {
    println!("{}", result.summary());
    if let Some(emotion) = &result.emotion {
        println!("  emotion: {} ({:.0}%)", emotion.label, emotion.confidence * 100.0);
    }
    if let Some(gaze) = result.gaze {
        let looking = if gaze.is_looking_at_camera { "yes" } else { "no" };
        println!("  looking at camera: {looking}");
    }
    if let Some(bbox) = result.face_bbox {
        println!(
            "  face: {:.0},{:.0} {:.0}x{:.0}",
            bbox.x, bbox.y, bbox.width, bbox.height
        );
    }
}
