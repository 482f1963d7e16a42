use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use blinkgate::capture::{FrameSource, ImageDirSource, TestPatternSource};
use blinkgate::client::HttpDetectionClient;
use blinkgate::config::Settings;
use blinkgate::polling::DetectionController;
use blinkgate::session::presenter::ear_meter_percent;
use blinkgate::session::ViewFrame;

#[derive(Parser, Debug)]
#[command(
    name = "blinkgate",
    version,
    about = "Polling client for a blink-based liveness detection service"
)]
struct Args {
    /// Detection service base URL.
    #[arg(long)]
    server: Option<String>,

    /// Polling cadence in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Directory of frames to cycle through instead of the synthetic test
    /// pattern.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Settings file (JSON); command-line flags override it.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Show the EAR debug readout from the start.
    #[arg(long)]
    debug: bool,

    /// Begin detection immediately instead of waiting for `start`.
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(server) = args.server {
        settings.server_url = server;
    }
    if let Some(interval) = args.interval_ms {
        settings.poll_interval_ms = interval;
    }

    info!("blinkgate starting up (service: {})", settings.server_url);

    let client = Arc::new(HttpDetectionClient::new(settings.server_url.clone()));
    let controller = DetectionController::new(client, &settings);

    let source: Box<dyn FrameSource> = match &args.frames {
        Some(dir) => Box::new(ImageDirSource::new(dir)?),
        None => Box::new(TestPatternSource::new(640, 480)),
    };
    controller.attach_source(source).await?;

    if args.debug {
        controller.toggle_debug().await;
    }

    // Renderer: one status line per published view frame.
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while events.changed().await.is_ok() {
            let frame = events.borrow_and_update().clone();
            println!("{}", format_frame(&frame));
        }
    });

    if args.autostart {
        controller.start().await?;
    } else {
        println!("Commands: start | stop | debug | quit");
    }

    run_command_loop(&controller).await?;

    controller.stop().await?;
    info!("blinkgate shut down");
    Ok(())
}

async fn run_command_loop(controller: &DetectionController) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "start" => {
                        if let Err(err) = controller.start().await {
                            warn!("start failed: {err:#}");
                        }
                    }
                    "stop" => controller.stop().await?,
                    "debug" => {
                        controller.toggle_debug().await;
                    }
                    "quit" | "q" => break,
                    "" => {}
                    other => println!("unknown command: {other}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }
    Ok(())
}

fn format_frame(frame: &ViewFrame) -> String {
    let mut line = format!(
        "[{}] [{}] {}  blinks={} score={}",
        frame.timestamp.format("%H:%M:%S"),
        frame.status.category(),
        frame.status.message(),
        frame.metrics.blink_count,
        frame.metrics.liveness_score,
    );
    if frame.blink_pulse {
        line.push_str("  *blink*");
    }
    if frame.guide_highlight {
        line.push_str("  [guide]");
    }
    if frame.debug_visible {
        match frame.metrics.ear {
            Some(ear) => line.push_str(&format!(
                "  EAR={ear:.3} ({:.0}%)",
                ear_meter_percent(Some(ear))
            )),
            None => line.push_str("  EAR=-"),
        }
    }
    line
}
