//! authd - privileged operation broker for panel modules.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use authd::accounts::SystemDirectory;
use authd::config::Settings;
use authd::socket::{SocketListener, WorkerPool};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");
const DEFAULT_CONFIG: &str = "/etc/authd/authd.toml";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path = get_config_path(&args);

    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting {} v{}", NAME, VERSION);
    info!("Configuration loaded from: {}", config_path);
    info!("Socket path: {}", settings.socket.path.display());

    let listener = match SocketListener::bind(&settings, Arc::new(SystemDirectory::new())) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Failed to set up socket");
            return ExitCode::FAILURE;
        }
    };
    let pool = match listener.start() {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to start workers");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create signal runtime");
            pool.shutdown();
            return ExitCode::FAILURE;
        }
    };

    let status = match runtime.block_on(wait_for_signals(&pool)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Failed to install signal handlers");
            ExitCode::FAILURE
        }
    };

    let metrics = pool.metrics();
    pool.shutdown();
    metrics.log_summary();
    info!("Daemon stopped");
    status
}

/// Block until SIGTERM or SIGINT. SIGHUP drops the cached policies.
async fn wait_for_signals(pool: &WorkerPool) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = terminate.recv() => {
                info!("SIGTERM received, shutting down");
                return Ok(());
            }
            _ = interrupt.recv() => {
                info!("SIGINT received, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading module policies");
                pool.context().policies().invalidate();
            }
        }
    }
}

fn print_help() {
    println!(
        r#"{} {}
Privileged operation broker for panel modules.

USAGE:
    {} [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: {}]
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME, DEFAULT_CONFIG
    );
}

fn get_config_path(args: &[String]) -> String {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG.to_string()
}

fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.logging.level))?;

    match settings.logging.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .try_init()?,
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .try_init()?,
    }

    Ok(())
}
