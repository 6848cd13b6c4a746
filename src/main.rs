use facegate::{
    access::{DecisionLoop, Headless, LoopSettings, LoopState, Presenter, StopSignal},
    camera::{Camera, FrameSource},
    channel::{ActuatorCommand, CommandChannel, SerialChannel, TimedChannel},
    cli::{AsciiPreview, AsciiRenderer, SnapshotPresenter},
    common::{Config, DevMode, DispatchMode},
    core::OnnxFaceMatcher,
    storage::GalleryCache,
};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Face-recognition door access controller")]
struct Cli {
    /// Enable development mode (saves snapshots and cache locally)
    #[arg(long, global = true)]
    dev: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the access controller until interrupted
    Run {
        /// Identity allowed to open the door
        #[arg(short, long)]
        authorized: Option<String>,
        /// Camera index, /dev/video* path or "auto"
        #[arg(long)]
        camera: Option<String>,
        /// Serial port of the actuator controller
        #[arg(short, long)]
        port: Option<String>,
        /// Directory of reference images
        #[arg(short, long)]
        images: Option<PathBuf>,
        /// per_detection or per_frame
        #[arg(long)]
        dispatch: Option<DispatchMode>,
        /// Show a live ASCII preview in the terminal
        #[arg(long)]
        preview: bool,
    },
    /// Capture a single frame and save it
    TestCamera,
    /// List cameras and show which one auto-detection picks
    DetectCamera,
    /// Load the reference gallery and list known identities
    Identities,
    /// Send one command to the actuator controller
    Send {
        /// open or close
        command: ActuatorCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;

    match cli.command {
        Commands::Run { authorized, camera, port, images, dispatch, preview } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(authorized) = authorized {
                config.access.authorized_identity = authorized;
            }
            if let Some(camera) = camera {
                config.camera.source = camera;
            }
            if let Some(port) = port {
                config.channel.port = port;
            }
            if let Some(images) = images {
                config.gallery.images_dir = images;
            }
            if let Some(dispatch) = dispatch {
                config.access.dispatch = dispatch;
            }
            config.preview.enabled |= preview;
            config.validate()?;

            run_controller(&config, &dev_mode)?;
        }
        Commands::TestCamera => {
            let config = load_config(cli.config.as_deref())?;
            println!("Testing camera {}...", config.camera.source);

            let mut camera = Camera::open(&config.camera)?;
            let frame = camera.capture();
            camera.release();

            let save_path = dev_mode.get_capture_path("test_capture");
            frame?.save(&save_path)?;
            println!("Saved test image to {:?}", save_path);
        }
        Commands::DetectCamera => {
            detect_camera()?;
        }
        Commands::Identities => {
            let config = load_config(cli.config.as_deref())?;
            let cache = gallery_cache(&config, &dev_mode);
            let matcher = OnnxFaceMatcher::new(&config, cache.as_ref())?;

            let gallery = matcher.gallery();
            println!("{} reference face(s) in {}:", gallery.len(), config.gallery.images_dir.display());
            for label in gallery.labels() {
                let marker = if label == config.access.authorized_identity { " (authorized)" } else { "" };
                println!("  - {}{}", label, marker);
            }
        }
        Commands::Send { command } => {
            let config = load_config(cli.config.as_deref())?;
            let serial = SerialChannel::open(&config.channel)?;
            let mut channel = TimedChannel::spawn(serial, config.channel.send_timeout())?;

            let sent = channel.send(command);
            channel.close()?;
            sent.with_context(|| format!("Failed to send {} to {}", command, config.channel.port))?;
            println!("Sent {} to {}", command, config.channel.port);
        }
    }

    Ok(())
}

fn run_controller(config: &Config, dev_mode: &DevMode) -> Result<()> {
    let stop = StopSignal::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.raise())
            .context("Failed to install signal handler")?;
    }

    let cache = gallery_cache(config, dev_mode);
    let state = LoopState::init(
        config.access.authorized_identity.clone(),
        || Camera::open(&config.camera),
        || OnnxFaceMatcher::new(config, cache.as_ref()),
        || {
            let serial = SerialChannel::open(&config.channel)?;
            let channel = TimedChannel::spawn(serial, config.channel.send_timeout())?
                .with_probe_timeout(config.channel.probe_timeout());
            Ok(channel)
        },
    )
    .map_err(|fault| anyhow::anyhow!("{}", fault))?;

    let mut presenters: Vec<Box<dyn Presenter>> = Vec::new();
    if dev_mode.is_enabled() {
        presenters.push(Box::new(SnapshotPresenter::new(dev_mode.clone(), Duration::from_secs(1))));
    }
    if config.preview.enabled {
        let renderer = AsciiRenderer::new(config.preview.ascii_width, config.preview.ascii_height);
        presenters.push(Box::new(AsciiPreview::new(renderer, stop.clone())?));
    }
    let presenter: Box<dyn Presenter> = if presenters.is_empty() {
        Box::new(Headless)
    } else {
        Box::new(presenters)
    };

    let summary = DecisionLoop::new(state, LoopSettings::from_config(config), stop)
        .with_presenter(presenter)
        .run();

    println!("Stopped: {}", summary);
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn gallery_cache(config: &Config, dev_mode: &DevMode) -> Option<GalleryCache> {
    if !config.gallery.use_cache {
        return None;
    }
    dev_mode.cache_dir().map(|dir| GalleryCache::in_dir(&dir))
}

fn detect_camera() -> Result<()> {
    println!("🔍 Detecting available cameras...\n");

    let cameras = Camera::list_all_cameras()?;
    if cameras.is_empty() {
        println!("❌ No cameras found!");
        println!("\nTroubleshooting:");
        println!("  1. Check if cameras are connected");
        println!("  2. Ensure you have permission to access /dev/video*");
        println!("  3. Try adding your user to the 'video' group");
        return Ok(());
    }

    for camera in &cameras {
        println!("📷 /dev/video{}: {}", camera.index, camera.name);
        for feature in &camera.features {
            println!("   - {}", feature);
        }
        println!();
    }

    println!("═══════════════════════════════════════════════════════");
    let picked = Camera::auto_detect()?;
    println!("✅ Auto-detection picks /dev/video{}", picked);
    println!("\n📝 To pin a camera, edit the configuration:");
    println!("   [camera]");
    println!("   source = \"<NUMBER>\"  # or \"auto\"");
    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}
