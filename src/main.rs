//! CLI entry point for the transit snapshot service.
//!
//! Provides subcommands for running ingestion cycles, loading reference data,
//! folding the latest rail cycle into the punctuality statistics, and serving the
//! read API.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_snapshots::{
    api::{self, ApiState},
    config::Settings,
    error::SourceError,
    fetch::{BasicClient, HttpClient},
    ingest::{FailurePolicy, Ingestor},
    output::{append_summary, print_json, print_pretty},
    punctuality::{PunctualityAggregator, SqlitePunctualityLedger},
    reference::ReferenceLoader,
    sources::{
        BusAdapter, GtfsStaticAdapter, RailAdapter, Source, SourceAdapter, StationAdapter,
        TramAdapter,
    },
    store::{Database, SnapshotStore, SqliteSnapshotStore, Table},
};

#[derive(Parser)]
#[command(name = "transit_snapshots")]
#[command(about = "Snapshot live transit feeds and track rail punctuality", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the live feeds and append one snapshot per cycle
    Ingest {
        /// Feeds to poll
        #[arg(long, value_enum, value_delimiter = ',', default_values_t = Source::ALL)]
        sources: Vec<Source>,

        /// Write the feeds that succeeded even when others fail
        #[arg(long, default_value_t = false)]
        partial: bool,

        /// Print the merged records instead of writing them
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Seconds between cycles
        #[arg(short = 'r', long, default_value_t = 60)]
        interval: u64,

        /// Number of cycles to run (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 1)]
        cycles: usize,

        /// Optional: CSV file to append a summary row per cycle to
        #[arg(long)]
        report_csv: Option<String>,
    },
    /// Load stations, tram stops and the GTFS static archive into the permanent store
    LoadReference {
        /// Request stations per category so each carries its type
        #[arg(long, default_value_t = false)]
        station_types: bool,
    },
    /// Fold the latest rail snapshot into the punctuality statistics
    UpdatePunctuality,
    /// Serve the read API
    Serve,
}

struct Stores {
    transient: Arc<dyn SnapshotStore>,
    permanent: Arc<dyn SnapshotStore>,
    ledger: Arc<SqlitePunctualityLedger>,
}

impl Stores {
    fn open(settings: &Settings) -> Result<Self> {
        let db = Database::open(&settings.database_path)
            .with_context(|| format!("opening database {}", settings.database_path))?;
        Ok(Self {
            transient: Arc::new(SqliteSnapshotStore::new(
                db.clone(),
                Table::Transient,
                settings.scan_page_size,
            )),
            permanent: Arc::new(SqliteSnapshotStore::new(
                db.clone(),
                Table::Permanent,
                settings.scan_page_size,
            )),
            ledger: Arc::new(SqlitePunctualityLedger::new(db)),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/transit_snapshots.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_snapshots.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let stores = Stores::open(&settings)?;

    match cli.command {
        Commands::Ingest {
            sources,
            partial,
            dry_run,
            interval,
            cycles,
            report_csv,
        } => {
            let client = http_client(&settings)?;
            let adapters = live_adapters(&sources, &settings, &client)?;
            let policy = if partial {
                FailurePolicy::Partial
            } else {
                FailurePolicy::Abort
            };
            let ingestor = Ingestor::new(adapters, stores.transient, stores.permanent)
                .with_policy(policy);

            run_cycles(&ingestor, dry_run, interval, cycles, report_csv.as_deref()).await?;
        }
        Commands::LoadReference { station_types } => {
            let client = http_client(&settings)?;
            let loader = ReferenceLoader::new(
                Arc::new(StationAdapter::new(
                    client.clone(),
                    &settings.irishrail_api_url,
                    station_types,
                )),
                Arc::new(TramAdapter::stops_only(client.clone(), &settings.luas_stops_url)),
                Arc::new(GtfsStaticAdapter::new(client, &settings.gtfs_archive_url)),
                stores.permanent,
            );
            let report = loader.run().await?;
            info!("{}", serde_json::to_string(&report)?);
        }
        Commands::UpdatePunctuality => {
            let aggregator = PunctualityAggregator::new(stores.transient, stores.ledger);
            let report = aggregator.run().await?;
            info!("{}", serde_json::to_string(&report)?);
        }
        Commands::Serve => {
            let state = ApiState {
                transient: stores.transient,
                permanent: stores.permanent,
                ledger: stores.ledger,
            };
            info!(listen_address = %settings.listen_address, "Starting server");

            HttpServer::new(move || {
                App::new()
                    .wrap(Logger::default())
                    .app_data(web::Data::new(state.clone()))
                    .configure(api::configure)
            })
            .bind(&settings.listen_address)?
            .run()
            .await?;

            info!("Server stopped");
        }
    }

    Ok(())
}

fn http_client(settings: &Settings) -> Result<Arc<dyn HttpClient>> {
    let client = BasicClient::new(settings.http_timeout, settings.http_connect_timeout)?;
    Ok(Arc::new(client))
}

fn live_adapters(
    sources: &[Source],
    settings: &Settings,
    client: &Arc<dyn HttpClient>,
) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(sources.len());
    for source in sources {
        let adapter: Arc<dyn SourceAdapter> = match source {
            Source::Rail => Arc::new(RailAdapter::new(client.clone(), &settings.irishrail_api_url)),
            Source::Tram => Arc::new(TramAdapter::new(
                client.clone(),
                &settings.luas_stops_url,
                &settings.luas_forecast_url,
                settings.forecast_concurrency,
            )),
            Source::Bus => {
                let key = settings
                    .gtfs_key
                    .as_deref()
                    .ok_or(SourceError::Credential("GTFS_KEY"))?;
                Arc::new(BusAdapter::new(client.clone(), &settings.bus_vehicles_url, key)?)
            }
        };
        adapters.push(adapter);
    }
    info!(sources = ?sources, "Adapters ready");
    Ok(adapters)
}

/// Runs ingestion cycles at a fixed interval. A failed cycle is logged and the loop
/// continues, except when only one cycle was requested.
#[tracing::instrument(skip(ingestor, report_csv), fields(dry_run, interval, cycles))]
async fn run_cycles(
    ingestor: &Ingestor,
    dry_run: bool,
    interval: u64,
    cycles: usize,
    report_csv: Option<&str>,
) -> Result<()> {
    if cycles == 0 {
        info!(interval, "Ingesting indefinitely. Press Ctrl+C to stop.");
    }

    let mut cycle_count = 0;
    loop {
        if cycles > 0 && cycle_count >= cycles {
            break;
        }
        cycle_count += 1;
        info!(cycle = cycle_count, "Starting cycle");

        if dry_run {
            let prepared = ingestor.preview().await?;
            print_json(&prepared.records)?;
            print_pretty(&prepared.report);
        } else {
            match ingestor.run_cycle().await {
                Ok(report) => {
                    print_pretty(&report);
                    if let Some(path) = report_csv {
                        append_summary(path, &report)?;
                    }
                }
                Err(e) if cycles == 1 => return Err(e.into()),
                Err(e) => error!(error = %e, "Cycle failed"),
            }
        }

        if cycles == 0 || cycle_count < cycles {
            info!(interval, "Waiting before next cycle");
            tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
        }
    }

    info!(cycles = cycle_count, "Finished ingesting");
    Ok(())
}
