//! CardScanner - replay tool
//!
//! Feeds recorded recognition engine output through a scan session, as if
//! each dump had been produced for one camera frame, and prints the decoded
//! cards as JSON.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use card_scanner::capture::ReplayCapture;
use card_scanner::config::{self, ScannerConfig};
use card_scanner::engine::ReplayEngine;
use card_scanner::{OwnedFrame, ScanEvent, ScanKind, ScannerApp};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Identity,
    Bank,
}

impl From<KindArg> for ScanKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Identity => ScanKind::Identity,
            KindArg::Bank => ScanKind::Bank,
        }
    }
}

/// CardScanner - decode recorded engine output
#[derive(Parser, Debug)]
#[command(name = "card-scanner")]
#[command(about = "Replay recorded card recognition output through a scan session")]
struct Args {
    /// Engine output dumps, one per frame, replayed in order
    #[arg(required_unless_present = "init_config")]
    dumps: Vec<PathBuf>,

    /// Card kind (overrides the config file)
    #[arg(short, long, value_enum)]
    kind: Option<KindArg>,

    /// Frame image the dumps were recognized from
    #[arg(short, long)]
    frame: Option<PathBuf>,

    /// Blank frame size used when no frame image is given
    #[arg(long, default_value = "1280x720", value_parser = parse_size)]
    size: (u32, u32),

    /// Write the bank card crop to this image file
    #[arg(long)]
    crop_out: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", s))?;
    let w = w.trim().parse().map_err(|e| format!("bad width: {}", e))?;
    let h = h.trim().parse().map_err(|e| format!("bad height: {}", e))?;
    Ok((w, h))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    if args.init_config {
        config::save_config(&ScannerConfig::default(), &config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let config = config::load_or_default(&config_path)?;
    init_logging(if args.verbose { "debug" } else { config.general.log_level.as_str() })?;
    info!("Using configuration from {:?}", config_path);

    let kind = args.kind.map(ScanKind::from).unwrap_or(config.scan.kind);
    let frame = match &args.frame {
        Some(path) => {
            let image = image::open(path)
                .with_context(|| format!("Failed to open frame {:?}", path))?
                .to_luma8();
            OwnedFrame::from_gray(&image)
        }
        None => OwnedFrame::blank(args.size.0, args.size.1),
    };

    let mut engine = ReplayEngine::new();
    for path in &args.dumps {
        let dump = std::fs::read(path).with_context(|| format!("Failed to read dump {:?}", path))?;
        engine = match kind {
            ScanKind::Identity => engine.with_identity(dump),
            ScanKind::Bank => engine.with_bank(dump),
        };
    }

    let app = ScannerApp::new(config, engine);
    let capture = ReplayCapture::new(vec![frame; args.dumps.len()]);
    let session = app.create_session(kind, Box::new(capture.control()));

    session.start()?;
    let stats = capture.run(|frame| session.on_frame(frame));
    session.stop();
    info!(
        "Replayed {} of {} dumps, {} accepted",
        stats.delivered,
        args.dumps.len(),
        stats.accepted
    );

    let mut found = 0;
    for event in app.events().try_iter() {
        found += 1;
        print_event(&event, args.crop_out.as_ref())?;
    }
    if found == 0 {
        warn!("No card recognized");
    }

    app.shutdown();
    Ok(())
}

/// Install the global tracing subscriber; `RUST_LOG` wins over `level`
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn print_event(event: &ScanEvent, crop_out: Option<&PathBuf>) -> Result<()> {
    let json = match event {
        ScanEvent::Identity { record, .. } => serde_json::json!({
            "kind": "identity",
            "record": record,
        }),
        ScanEvent::Bank { record, crop, image } => {
            if let (Some(path), Some(image)) = (crop_out, image) {
                image
                    .save(path)
                    .with_context(|| format!("Failed to write crop {:?}", path))?;
                info!("Wrote crop to {:?}", path);
            }
            serde_json::json!({
                "kind": "bank",
                "record": record,
                "crop": crop.rect(),
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
