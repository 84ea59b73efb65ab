use anyhow::Result;
use clap::Parser;
use sirenstrobe::{
    Activation, AppState, ConsoleAlerts, ConsoleTorch, EventBus, EventFilter, KeyCommand,
    KeyboardInputHandler, Platform, RecordingAlerts, RecordingTorch, SimulatedCamera,
    SirenConfig, SirenError, SirenSession, TapTrigger, TorchError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "sirenstrobe")]
#[command(about = "Phase-locked emergency strobe with siren session coordination")]
#[command(version)]
#[command(long_about = "Runs a simulated emergency siren screen: five rapid taps (SPACE) \
open the alarm, the torch strobes on a drift-free phase grid once the camera reports ready, \
and the session can be toggled, backgrounded, or closed from the keyboard.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "sirenstrobe.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Override the requested strobe frequency
    #[arg(long, value_name = "HZ", help = "Requested strobe frequency in Hz")]
    frequency: Option<f64>,

    /// Override the platform family used for clamping and warm-up
    #[arg(long, value_name = "PLATFORM", help = "Platform family: ios or android")]
    platform: Option<Platform>,

    /// Simulate a refused camera permission prompt
    #[arg(long, help = "Deny camera permission (exercises the screen flash fallback)")]
    deny_permission: bool,

    /// Delay before the simulated camera reports ready
    #[arg(long, value_name = "MS", default_value_t = 400, help = "Camera readiness delay in milliseconds")]
    ready_delay_ms: u64,

    /// Simulate a camera mount failure instead of readiness
    #[arg(long, help = "Report a camera mount error instead of readiness")]
    fail_mount: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, value_name = "DIR", help = "Directory for rolling log files")]
    log_dir: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Run one scripted session against recording drivers and exit
    #[arg(long, help = "Run a scripted session without keyboard input")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting sirenstrobe v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            if args.validate_config {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
            return Err(e.into());
        }
    };
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    if args.dry_run {
        return run_dry(config, &args).await;
    }

    run_interactive(config, &args).await
}

/// Load the file and environment layers, apply command line overrides, validate
fn load_config(args: &Args) -> sirenstrobe::Result<SirenConfig> {
    let mut config = SirenConfig::load_from_file(&args.config)?;
    if let Some(frequency) = args.frequency {
        config.strobe.frequency_hz = frequency;
    }
    if let Some(platform) = args.platform {
        config.strobe.platform = platform;
    }
    config.validate()?;
    Ok(config)
}

/// Interactive demo driven by the keyboard
async fn run_interactive(config: SirenConfig, args: &Args) -> Result<()> {
    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let trigger = TapTrigger::new(&config.trigger, &event_bus);
    let torch = Arc::new(ConsoleTorch::new());
    let session = Arc::new(SirenSession::new(
        config,
        Arc::clone(&event_bus),
        torch.clone(),
        Arc::new(SimulatedCamera::new(!args.deny_permission)),
        Arc::new(ConsoleAlerts),
    ));

    spawn_status_logger(&session);
    spawn_event_logger(&event_bus);

    let (commands_tx, mut commands) = mpsc::unbounded_channel();
    let keyboard = KeyboardInputHandler::new(commands_tx);
    keyboard.start().await?;

    let ready_delay = Duration::from_millis(args.ready_delay_ms);
    let mut foreground = true;

    loop {
        let command = tokio::select! {
            command = commands.recv() => command,
            _ = tokio::signal::ctrl_c() => Some(KeyCommand::Quit),
        };

        match command.unwrap_or(KeyCommand::Quit) {
            KeyCommand::Tap => {
                if let Some(Activation::Accepted) = trigger.register_tap(Instant::now()) {
                    session.open().await?;
                    simulate_camera(&session, ready_delay, args.fail_mount);
                }
            }
            KeyCommand::ToggleStrobe => {
                let engaged = session.toggle();
                info!("Strobe {}", if engaged { "requested" } else { "disabled" });
            }
            KeyCommand::ToggleForeground => {
                foreground = !foreground;
                session.on_app_state(if foreground {
                    AppState::Active
                } else {
                    AppState::Background
                });
            }
            KeyCommand::Close => session.close().await?,
            KeyCommand::Quit => break,
        }
    }

    session.close().await?;
    keyboard.stop().await?;
    info!("sirenstrobe exiting after {} torch toggles", torch.toggle_count());
    Ok(())
}

/// Scripted session: open, camera ready, run, close
async fn run_dry(config: SirenConfig, args: &Args) -> Result<()> {
    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let torch = Arc::new(RecordingTorch::new());
    let alerts = Arc::new(RecordingAlerts::new());
    let session = Arc::new(SirenSession::new(
        config,
        Arc::clone(&event_bus),
        torch.clone(),
        Arc::new(SimulatedCamera::new(!args.deny_permission)),
        alerts.clone(),
    ));

    session.open().await?;
    simulate_camera(&session, Duration::from_millis(args.ready_delay_ms), args.fail_mount);
    tokio::time::sleep(Duration::from_millis(args.ready_delay_ms) + Duration::from_secs(3)).await;

    let config_used = session.strobe_config();
    let status = session.status();
    session.close().await?;

    let summary = serde_json::json!({
        "frequency_hz": config_used.map(|c| c.frequency_hz),
        "period_ms": config_used.map(|c| c.period_ms()),
        "on_ms": config_used.map(|c| c.on_duration_ms()),
        "torch_calls": torch.call_count(),
        "torch_left_on": torch.last_state().unwrap_or(false),
        "screen_flash": status.screen_flash,
        "alert_calls": alerts.calls().len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Report readiness (or a mount failure) for the current session after `delay`
fn simulate_camera(session: &Arc<SirenSession>, delay: Duration, fail_mount: bool) {
    let session = Arc::clone(session);
    let Some(session_id) = session.session_id() else {
        return;
    };

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if session.session_id() != Some(session_id) {
            return;
        }
        if fail_mount {
            session.on_mount_error(SirenError::Hardware(TorchError::Io {
                details: "simulated camera mount failure".to_string(),
            }));
        } else {
            session.on_camera_ready();
        }
    });
}

fn spawn_status_logger(session: &Arc<SirenSession>) {
    let mut status = session.watch();
    tokio::spawn(async move {
        let mut last = status.borrow().clone();
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            if current.strobing != last.strobing
                || current.cover_visible != last.cover_visible
                || current.screen_flash != last.screen_flash
            {
                info!(
                    strobing = current.strobing,
                    cover_visible = current.cover_visible,
                    screen_flash = current.screen_flash,
                    "Siren status changed"
                );
            }
            last = current;
        }
    });
}

fn spawn_event_logger(event_bus: &Arc<EventBus>) {
    let mut receiver = event_bus.receiver(EventFilter::All, "cli");
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => info!("Bus event: {}", event.event_type()),
                Err(sirenstrobe::EventBusError::Lagged { skipped }) => {
                    warn!("Event logger skipped {} events", skipped);
                }
                Err(_) => break,
            }
        }
    });
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("sirenstrobe={}", log_level)));

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

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sirenstrobe.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Sirenstrobe Configuration File");
    println!("# This is the default configuration with all available options");
    println!();
    println!("{}", SirenConfig::default().to_toml()?);
    Ok(())
}
