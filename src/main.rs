use anyhow::{Context, Result};
use boothcam::{
    BoothConfig, BoothEvent, CameraController, EventBusError, EventFilter, EventReceiver,
    KeyboardTrigger,
};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "boothcam")]
#[command(about = "Photo booth controller driving an Android phone camera over adb")]
#[command(version)]
#[command(long_about = "Drives an Android phone as a photo booth camera: wakes and unlocks \
the device, opens the camera, fires the shutter at the end of a countdown, and publishes new \
pictures into numbered folders for a slideshow.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "boothcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this folder
    #[arg(long, value_name = "DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the booth until `q`, ctrl-c or SIGTERM (default)
    Run {
        /// Don't read trigger keys from the terminal
        #[arg(long)]
        no_keyboard: bool,
    },
    /// Take one photo and download it
    Photo,
    /// Wake, unlock and open the camera app
    OpenCamera,
    /// Wake and unlock the device
    Unlock,
    /// Lock the device
    Lock,
    /// Run one download pass
    Download,
    /// Print device and session state as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting boothcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match BoothConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let controller = CameraController::with_adb(config).context("Failed to create controller")?;

    match args.command.unwrap_or(Command::Run { no_keyboard: false }) {
        Command::Run { no_keyboard } => run_booth(controller.clone(), !no_keyboard).await?,
        Command::Photo => {
            let outcome = controller.take_photo().await?;
            info!("Shutter fired after {:?}", outcome.shutter_delay);
            // The process exits before the cascade would run, so wait for
            // the first attempt's delay and download once
            if let Some(delay) = controller.config().download.cascade().first() {
                tokio::time::sleep(*delay).await;
            }
            report_download(&controller).await?;
        }
        Command::OpenCamera => controller.open_camera().await?,
        Command::Unlock => controller.unlock().await?,
        Command::Lock => controller.lock_now().await?,
        Command::Download => report_download(&controller).await?,
        Command::Status => {
            let status = controller.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    controller.shutdown();
    Ok(())
}

async fn report_download(controller: &CameraController) -> Result<()> {
    if let Some(report) = controller.download_now().await? {
        for path in &report.published {
            println!("{}", path.display());
        }
        if report.failures > 0 {
            warn!("{} file(s) could not be downloaded", report.failures);
        }
    }
    Ok(())
}

/// Interactive booth: triggers become photos until a shutdown is requested
async fn run_booth(controller: CameraController, keyboard: bool) -> Result<()> {
    let mut receiver = EventReceiver::new(
        controller.event_bus().subscribe(),
        EventFilter::EventTypes(vec!["trigger_capture", "shutdown_requested"]),
        "booth".to_string(),
    );

    let trigger = keyboard.then(|| KeyboardTrigger::new(controller.event_bus().clone()));
    let keyboard_task = trigger.as_ref().map(KeyboardTrigger::start);

    controller.start_periodic_download();
    controller.start_focus_keepalive();
    info!("Booth is running");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            reason = &mut shutdown => {
                info!("Received {}", reason);
                break;
            }
            event = receiver.recv() => match event {
                Ok(BoothEvent::TriggerCapture) => {
                    let controller = controller.clone();
                    tokio::spawn(async move {
                        // Failures are recorded in the activity log
                        let _ = controller.take_photo().await;
                    });
                }
                Ok(BoothEvent::ShutdownRequested { reason }) => {
                    info!("Shutdown requested: {}", reason);
                    break;
                }
                Ok(_) => {}
                Err(EventBusError::Lagged { missed }) => {
                    warn!("Booth loop missed {} events", missed);
                }
                Err(e) => {
                    error!("Event bus failed: {}", e);
                    break;
                }
            }
        }
    }

    if let Some(trigger) = &trigger {
        trigger.stop().await;
    }
    controller.shutdown();
    if let Some(task) = keyboard_task {
        let _ = task.await;
    }

    info!("Booth stopped");
    Ok(())
}

/// Resolves with the name of the first termination signal received
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("boothcam={}", log_level)));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };
    layers.push(fmt_layer);

    let guard = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log folder {}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "boothcam.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Boothcam Configuration File");
    println!("# This is the default configuration with all available options.");
    println!("# Every key can be overridden with a BOOTHCAM_<SECTION>__<KEY> variable.");
    println!();
    println!("{}", toml::to_string_pretty(&BoothConfig::default())?);
    Ok(())
}
