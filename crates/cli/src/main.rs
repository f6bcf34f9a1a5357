mod daemon;
mod doctor;
mod instance;

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

const LOG_FILE: &str = "opsrelay.log";

#[derive(Parser)]
#[command(
    name = "opsrelay",
    version,
    about = "opsrelay: file-queue relay between an offline agent and HTTP services"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Data directory holding config, queue, responses and inbox (default ~/.opsrelay).
    #[arg(long, global = true, env = "OPSRELAY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay in the foreground (default when no subcommand is provided).
    Run,
    /// Validate the config and report which credentials resolve.
    Doctor,
}

fn init_telemetry(cli: &Cli, config_level: &str, log_file: Option<File>) {
    let level = cli.log_level.as_deref().unwrap_or(config_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Plain-text copy of everything for `<data_dir>/opsrelay.log`.
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(Mutex::new(file))
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn open_log_file(data_dir: &Path) -> anyhow::Result<File> {
    let path = data_dir.join(LOG_FILE);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open log file {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(opsrelay_config::default_data_dir);

    match cli.command {
        None | Some(Commands::Run) => {
            std::fs::create_dir_all(&data_dir)
                .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;
            opsrelay_config::load_dotenv(&data_dir)?;
            let (config, config_path) = opsrelay_config::load_or_init(&data_dir)?;

            init_telemetry(&cli, &config.log_level, Some(open_log_file(&data_dir)?));
            info!(
                version = env!("CARGO_PKG_VERSION"),
                config = %config_path.display(),
                "opsrelay starting"
            );

            daemon::run(&data_dir, config).await
        },
        Some(Commands::Doctor) => {
            init_telemetry(&cli, "warn", None);
            doctor::handle_doctor(&data_dir)
        },
    }
}
