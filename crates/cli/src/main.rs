//! kappasync - download street-level trajectories and publish them to Mapillary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kappasync_core::{
    load_config, load_point_index, load_trajectory_catalog, validate_config, Aria2Fetcher,
    ArchivePayloadStager, Collaborators, Config, DownloadLease, ExiftoolTagger,
    GeodataPreparationClient, ImapReadinessOracle, MapillaryUploader, RecordUpdate,
    SanitizedConfig, Sensor, SqliteTrajectoryStore, StoreError, TrajectoryScheduler,
    TrajectoryStore,
};

/// kappasync - resumable trajectory download and upload
#[derive(Parser, Debug)]
#[command(name = "kappasync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "KAPPASYNC_CONFIG", default_value = "kappasync.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until every trajectory is published
    Run {
        /// Do not request new downloads; only use assigned download ids
        #[arg(long)]
        no_prepare: bool,
    },

    /// Show progress counters
    Status,

    /// Record a download id for a trajectory by hand
    Assign {
        /// Trajectory id
        trajectory_id: String,

        /// Download id from the notification mail
        download_id: String,

        /// Hours until the download id expires (at most one year)
        #[arg(
            long,
            default_value_t = 24,
            value_parser = clap::value_parser!(i64).range(1..=MAX_VALID_FOR_HOURS)
        )]
        valid_for_hours: i64,
    },

    /// Discard a trajectory's download id
    Reset {
        /// Trajectory id
        trajectory_id: String,
    },

    /// Print the effective configuration (secrets redacted)
    Config,
}

const MAX_VALID_FOR_HOURS: i64 = 24 * 365;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    info!("Loading configuration from {:?}", cli.config);
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    validate_config(&config).context("Configuration validation failed")?;

    match cli.command {
        Command::Run { no_prepare } => {
            if no_prepare {
                config.scheduler.preparation_enabled = false;
            }
            run_scheduler(config).await
        }
        Command::Status => print_status(&config),
        Command::Assign {
            trajectory_id,
            download_id,
            valid_for_hours,
        } => assign(&config, &trajectory_id, &download_id, valid_for_hours),
        Command::Reset { trajectory_id } => reset(&config, &trajectory_id),
        Command::Config => {
            let sanitized = SanitizedConfig::from(&config);
            println!("{}", serde_json::to_string_pretty(&sanitized)?);
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<SqliteTrajectoryStore> {
    SqliteTrajectoryStore::new(&config.database.path).with_context(|| {
        format!(
            "Failed to open state database {:?}",
            config.database.path
        )
    })
}

async fn run_scheduler(config: Config) -> Result<()> {
    let store: Arc<dyn TrajectoryStore> = Arc::new(open_store(&config)?);
    info!("State store initialized at {:?}", config.database.path);

    let catalog = load_trajectory_catalog(&config.catalog).with_context(|| {
        format!(
            "Failed to load trajectories from {:?}",
            config.catalog.trajectories_path
        )
    })?;
    let inserted = store
        .seed(catalog.ids())
        .context("Failed to seed state store")?;
    info!(
        trajectories = catalog.len(),
        inserted, "Trajectory catalog loaded"
    );

    let points = load_point_index(&config.catalog).with_context(|| {
        format!(
            "Failed to load image points from {:?}",
            config.catalog.points_path
        )
    })?;
    info!(points = points.len(), "Image point index loaded");

    let uploader = Arc::new(MapillaryUploader::new(config.uploader.clone()));
    uploader
        .authenticate()
        .await
        .context("Mapillary authentication failed")?;

    let oracle = ImapReadinessOracle::connect(
        config.mailbox.clone(),
        &config.fetcher.download_base_url,
    )
    .await
    .context("Failed to scan notification mailbox")?;

    let preparation = GeodataPreparationClient::new(config.preparation.clone())
        .context("Failed to create preparation client")?;

    let tagger = ExiftoolTagger::new(config.tagger.clone(), Arc::new(points));
    let stager = ArchivePayloadStager::new(config.scheduler.work_dir.clone(), Arc::new(tagger));

    if !config.scheduler.preparation_enabled {
        info!("Preparation disabled, only assigned download ids will be used");
    }

    let scheduler = TrajectoryScheduler::new(
        config.scheduler.clone(),
        store,
        Arc::new(catalog),
        Collaborators {
            oracle: Arc::new(oracle),
            preparation: Arc::new(preparation),
            fetcher: Arc::new(Aria2Fetcher::new(config.fetcher.clone())),
            stager: Arc::new(stager),
            uploader,
        },
    )
    .with_metrics_textfile(config.metrics.textfile_path.clone());

    scheduler.run().await.context("Scheduler halted")?;
    println!("All trajectories completed.");
    Ok(())
}

fn print_status(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let summary = store.summary()?;

    println!("Trajectories:   {}", summary.total);
    println!("Completed:      {}", summary.completed);
    println!("Uncompleted:    {}", summary.uncompleted());
    println!("Live downloads: {}", summary.with_download);
    for sensor in Sensor::ALL {
        println!(
            "  {} ({:>3}°):  {}",
            sensor,
            sensor.offset_degrees(),
            summary.sensors_completed[sensor.number() as usize - 1]
        );
    }
    Ok(())
}

fn assign(
    config: &Config,
    trajectory_id: &str,
    download_id: &str,
    valid_for_hours: i64,
) -> Result<()> {
    let store = open_store(config)?;
    let lease = DownloadLease::issued_now(
        download_id,
        None,
        chrono::Duration::hours(valid_for_hours),
    );
    let record = store
        .update(trajectory_id, RecordUpdate::Prepared(lease))
        .map_err(not_found_hint)?;

    if let Some(lease) = &record.download {
        println!(
            "Assigned {} to trajectory {} (expires {})",
            lease.download_id, record.trajectory_id, lease.expires_at
        );
    }
    Ok(())
}

fn reset(config: &Config, trajectory_id: &str) -> Result<()> {
    let store = open_store(config)?;
    store
        .update(trajectory_id, RecordUpdate::Reset)
        .map_err(not_found_hint)?;
    println!("Reset trajectory {}", trajectory_id);
    Ok(())
}

fn not_found_hint(e: StoreError) -> anyhow::Error {
    match e {
        StoreError::NotFound(id) => anyhow::anyhow!(
            "Trajectory {} is not in the state database (run the scheduler once to seed it)",
            id
        ),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["kappasync", "run", "--no-prepare"]).unwrap();
        assert!(matches!(cli.command, Command::Run { no_prepare: true }));
        assert_eq!(cli.config, PathBuf::from("kappasync.toml"));
        assert!(!cli.log_json);
    }

    #[test]
    fn test_parse_assign_defaults() {
        let cli = Cli::try_parse_from([
            "kappasync",
            "--config",
            "/etc/kappasync.toml",
            "assign",
            "17720",
            "5276d431-a054-4a84-a38c-6dfbccefdef0",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/kappasync.toml"));
        match cli.command {
            Command::Assign {
                trajectory_id,
                download_id,
                valid_for_hours,
            } => {
                assert_eq!(trajectory_id, "17720");
                assert_eq!(download_id, "5276d431-a054-4a84-a38c-6dfbccefdef0");
                assert_eq!(valid_for_hours, 24);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_assign_rejects_out_of_range_validity() {
        for hours in ["0", "-5", "8761", "9223372036854775807"] {
            let result = Cli::try_parse_from([
                "kappasync",
                "assign",
                "17720",
                "dl-1",
                "--valid-for-hours",
                hours,
            ]);
            assert!(result.is_err(), "accepted --valid-for-hours {}", hours);
        }

        let cli = Cli::try_parse_from([
            "kappasync",
            "assign",
            "17720",
            "dl-1",
            "--valid-for-hours",
            "8760",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Assign {
                valid_for_hours: 8760,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_requires_subcommand() {
        assert!(Cli::try_parse_from(["kappasync"]).is_err());
    }

    #[test]
    fn test_not_found_hint() {
        let err = not_found_hint(StoreError::NotFound("42".to_string()));
        assert!(err.to_string().contains("Trajectory 42 is not in the state database"));

        let err = not_found_hint(StoreError::Database("locked".to_string()));
        assert_eq!(err.to_string(), "Database error: locked");
    }
}
