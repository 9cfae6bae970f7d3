//! masksync - headless front end for the mask panel.
//!
//! Binds a panel to an image on the server, then either segments it from
//! points given on the command line or publishes an empty mask, and prints
//! the resulting storage handle.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use web_time::Instant;

use masksync::{
    AppConfig, EditorContext, HttpMaskService, ImageRecord, MaskPanel, PanelMode,
    PersistedMaskState, Point, PointLabel, ThreadedTransport, Transport,
};

/// How often the tick loop polls while waiting on the service.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser, Debug)]
#[command(name = "masksync")]
#[command(about = "Segment and store image masks on a remote service", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server base URL, overriding the config file
    #[arg(short, long)]
    server: Option<String>,

    /// JSON file holding the node's persisted mask state; read before and
    /// written after the run
    #[arg(long)]
    state: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect a mask from points and store it
    Segment(SegmentArgs),
    /// Store an explicit empty mask
    Clear(ImageArgs),
}

#[derive(clap::Args, Debug)]
struct ImageArgs {
    /// Image filename on the server
    #[arg(short, long)]
    image: String,

    #[arg(long, default_value = "")]
    subfolder: String,

    /// Storage type of the image (input, output, temp)
    #[arg(long = "type", default_value = "input")]
    kind: String,

    /// Seconds to wait for the service before giving up
    #[arg(long, default_value = "120")]
    wait: u64,
}

#[derive(clap::Args, Debug)]
struct SegmentArgs {
    #[command(flatten)]
    image: ImageArgs,

    /// Point as `X,Y` or `X,Y,-` for a negative point; repeatable
    #[arg(short, long = "point", value_parser = parse_point, required = true)]
    points: Vec<Point>,

    /// Detection threshold in [0, 1]
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Model selector sent with prepare
    #[arg(short, long)]
    model: Option<String>,
}

fn parse_point(arg: &str) -> Result<Point, String> {
    let parts: Vec<&str> = arg.split(',').map(str::trim).collect();
    let (x, y, label) = match parts.as_slice() {
        [x, y] => (x, y, PointLabel::Positive),
        [x, y, "+"] => (x, y, PointLabel::Positive),
        [x, y, "-"] => (x, y, PointLabel::Negative),
        _ => return Err(format!("expected X,Y or X,Y,+|-, got {:?}", arg)),
    };
    let x = x.parse().map_err(|e| format!("bad x in {:?}: {}", arg, e))?;
    let y = y.parse().map_err(|e| format!("bad y in {:?}: {}", arg, e))?;
    Ok(Point::new(x, y, label))
}

fn init_logging(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        config.log_level.to_level_filter()
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Tick until `done` holds or `timeout` passes. Returns whether `done` held.
fn drive<T: Transport>(
    panel: &mut MaskPanel<T>,
    timeout: Duration,
    done: impl Fn(&MaskPanel<T>) -> bool,
) -> bool {
    let start = Instant::now();
    loop {
        panel.tick(Instant::now());
        if done(panel) {
            return true;
        }
        if start.elapsed() >= timeout {
            log::warn!("Timed out after {} s ({})", timeout.as_secs(), panel.status());
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn run(cli: Cli) -> masksync::Result<bool> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    if let Some(server) = cli.server {
        config.server.base_url = server;
    }
    if let Commands::Segment(args) = &cli.command {
        if let Some(model) = &args.model {
            config.panel.model = model.clone();
        }
        if let Some(threshold) = args.threshold {
            config.panel.threshold = threshold.clamp(0.0, 1.0);
        }
    }

    let service = HttpMaskService::new(
        &config.server.base_url,
        Duration::from_secs(config.server.timeout_secs),
    )?;
    log::info!("Using server {}", service.base_url());
    let transport = ThreadedTransport::spawn(service)?;

    let ctx = EditorContext::new(config.panel.clone());
    let mut panel = MaskPanel::new(&ctx, PanelMode::Points, transport)?;
    if let Some(path) = &cli.state {
        panel.restore(PersistedMaskState::load(path)?);
    }

    let image = match &cli.command {
        Commands::Segment(args) => &args.image,
        Commands::Clear(args) => args,
    };
    let timeout = Duration::from_secs(image.wait);
    panel.set_source(
        ImageRecord::new(&image.image, &image.subfolder, &image.kind),
        Instant::now(),
    );
    if !drive(&mut panel, timeout, |p| p.is_loaded()) {
        return Ok(false);
    }

    let before = panel.mask_handle().to_string();
    match &cli.command {
        Commands::Segment(args) => {
            for &point in &args.points {
                panel.add_point(point, Instant::now());
            }
        }
        Commands::Clear(_) => panel.clear_mask(Instant::now()),
    }

    let stored = drive(&mut panel, timeout, |p| {
        p.is_idle() && p.mask_handle() != before
    });
    if !stored {
        return Ok(false);
    }

    println!("{}", panel.mask_handle());
    if let Some(path) = &cli.state {
        panel.persisted_state().save(path)?;
    }
    panel.teardown();
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
