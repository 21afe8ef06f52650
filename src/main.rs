use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use stepwise::{util, Config, Db, Listener, Recorder};

/// Receives trace events from traced programs and records them in a run store
#[derive(Parser, Debug)]
#[command(name = "stepwise-collector")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// Data directory holding config, logs and the default run store
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Endpoint to listen on, e.g. tcp://127.0.0.1:5556
    #[arg(short, long, value_name = "ENDPOINT")]
    endpoint: Option<String>,

    /// Run store to write into
    #[arg(short, long, value_name = "FILE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir);

    // Initialize logging to file (~/.stepwise/logs/stepwise.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    let mut config = Config::load();
    if let Some(endpoint) = cli.endpoint {
        config.transport.endpoint = endpoint;
    }
    if let Some(database) = cli.database {
        config.storage.database = database;
    }

    let db = Db::open(&config.storage.database)
        .with_context(|| format!("opening {}", config.storage.database.display()))?
        .with_batch_size(config.storage.commit_batch_size);
    let mut recorder = Recorder::new(db);

    let mut listener = Listener::bind(&config.transport.endpoint, config.transport.high_water_mark)
        .await
        .with_context(|| format!("binding {}", config.transport.endpoint))?;
    tracing::info!(
        endpoint = %listener.endpoint(),
        database = %config.storage.database.display(),
        "Collector started"
    );

    listener
        .poll_forever(
            |message| {
                let kind = message.kind;
                if let Err(e) = recorder.handle(message) {
                    tracing::error!(kind = %kind, error = %e, "Failed to record message");
                }
            },
            config.transport.poll_timeout,
        )
        .await;

    recorder.db().flush()?;
    tracing::info!("Collector stopped");
    Ok(())
}
