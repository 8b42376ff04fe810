//! RateWatch CLI
//!
//! Command-line interface for the RateWatch rate ingestion and alert engine.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use ratewatch::api::HttpServer;
use ratewatch::config::{Config, LoggingConfig, StorageBackend};
use ratewatch::models::{Corridor, SubscriptionRequest, ThresholdInput};
use ratewatch::store::PostgresPool;
use ratewatch::{Error, RateWatch};

/// RateWatch - remittance rate tracking and threshold alerts
#[derive(Parser)]
#[command(name = "ratewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "RATEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API with scheduled ingestion and evaluation
    Serve {
        /// HTTP API port
        #[arg(long, env = "RATEWATCH_HTTP_PORT")]
        http_port: Option<u16>,

        /// Prometheus exporter port
        #[arg(long, env = "RATEWATCH_METRICS_PORT")]
        metrics_port: Option<u16>,
    },

    /// Run one ingestion cycle
    Ingest,

    /// Run one evaluation pass
    Evaluate,

    /// Show the ranked rate table
    Rates {
        /// Corridor as COUNTRY:BASE/QUOTE (all corridors if omitted)
        corridor: Option<Corridor>,
    },

    /// Subscribe to a rate threshold alert
    Subscribe {
        /// E-mail address to notify
        #[arg(long)]
        recipient: String,

        /// Corridor as COUNTRY:BASE/QUOTE
        #[arg(long)]
        corridor: Corridor,

        /// above or below
        #[arg(long)]
        direction: String,

        /// Threshold rate
        #[arg(long)]
        threshold: String,
    },

    /// Deactivate a subscription
    Unsubscribe {
        /// Subscription ID
        id: Uuid,
    },

    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Serve {
            http_port,
            metrics_port,
        } => run_serve(config, http_port, metrics_port).await,
        Commands::Ingest => run_ingest(&config, cli.format).await,
        Commands::Evaluate => run_evaluate(&config, cli.format).await,
        Commands::Rates { corridor } => run_rates(&config, corridor, cli.format).await,
        Commands::Subscribe {
            recipient,
            corridor,
            direction,
            threshold,
        } => {
            let request = SubscriptionRequest {
                recipient,
                corridor,
                direction,
                threshold: ThresholdInput::Text(threshold),
            };
            run_subscribe(&config, request, cli.format).await
        }
        Commands::Unsubscribe { id } => run_unsubscribe(&config, id, cli.format).await,
        Commands::Migrate => run_migrate(&config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) {
    // stdout carries command output only
    log_subscriber(config, verbose, std::io::stderr).init();
}

fn log_subscriber<W>(
    config: &LoggingConfig,
    verbose: bool,
    writer: W,
) -> Box<dyn tracing::Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if config.format.eq_ignore_ascii_case("json") {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.finish())
    }
}

/// Commands that must outlive the process need a shared store
fn require_persistent(config: &Config, command: &str) -> anyhow::Result<()> {
    if config.storage.backend == StorageBackend::Memory {
        anyhow::bail!(
            "`{command}` requires the postgres storage backend; the in-memory store does not outlive this process"
        );
    }
    Ok(())
}

fn print_output<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

async fn run_serve(
    mut config: Config,
    http_port: Option<u16>,
    metrics_port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(port) = http_port {
        config.server.http_port = port;
    }
    if let Some(port) = metrics_port {
        config.server.metrics_port = port;
    }

    let metrics_addr: std::net::SocketAddr =
        format!("{}:{}", config.server.host, config.server.metrics_port)
            .parse()
            .context("invalid metrics listen address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;

    let engine = Arc::new(RateWatch::from_config(&config).await?);

    info!(
        http_port = config.server.http_port,
        metrics_port = config.server.metrics_port,
        ingestion_every = ?config.ingestion.interval,
        evaluation_every = ?config.alerting.interval,
        "Starting RateWatch"
    );

    let ingestion = {
        let engine = engine.clone();
        let mut ticker = tokio::time::interval(config.ingestion.interval);
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                if let Err(e) = engine.run_ingestion_cycle().await {
                    warn!(error = %e, "Scheduled ingestion skipped");
                }
            }
        })
    };

    let evaluation = {
        let engine = engine.clone();
        let mut ticker = tokio::time::interval(config.alerting.interval);
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                match engine.run_evaluation_pass().await {
                    Ok(_) => {}
                    Err(e @ Error::CycleInProgress(_)) => {
                        warn!(error = %e, "Scheduled evaluation skipped");
                    }
                    Err(e) => error!(error = %e, "Evaluation pass failed"),
                }
            }
        })
    };

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    let server = HttpServer::new(engine);

    let outcome = tokio::select! {
        result = server.serve(&addr) => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            signal.map_err(anyhow::Error::from)
        }
    };

    ingestion.abort();
    evaluation.abort();
    outcome
}

async fn run_ingest(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let engine = RateWatch::from_config(config).await?;
    let summary = engine.run_ingestion_cycle().await?;

    print_output(format, &summary, |s| {
        println!(
            "Ingestion: {} attempted, {} succeeded, {} failed",
            s.attempted, s.succeeded, s.failed
        );
        for failure in &s.failures {
            println!("  {} on {}: {}", failure.provider, failure.corridor, failure.reason);
        }
    })
}

async fn run_evaluate(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    require_persistent(config, "evaluate")?;
    let engine = RateWatch::from_config(config).await?;
    let report = engine.run_evaluation_pass().await?;

    print_output(format, &report, |r| {
        println!(
            "Evaluation: {} checked, {} notified, {} suppressed, {} delivery failures",
            r.subscriptions_checked,
            r.notifications_sent,
            r.suppressed_duplicates,
            r.delivery_failures
        );
    })
}

#[derive(Serialize)]
struct CorridorRates {
    corridor: Corridor,
    recommended: String,
    rates: Vec<ratewatch::models::RateView>,
}

async fn run_rates(
    config: &Config,
    corridor: Option<Corridor>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let engine = RateWatch::from_config(config).await?;
    if config.storage.backend == StorageBackend::Memory {
        // A fresh in-memory store has nothing to show until a cycle has run
        engine.run_ingestion_cycle().await?;
    }

    let corridors = match corridor {
        Some(corridor) => vec![corridor],
        None => engine.corridors().to_vec(),
    };

    let mut tables = Vec::with_capacity(corridors.len());
    for corridor in corridors {
        tables.push(CorridorRates {
            rates: engine.list_rates(&corridor).await?,
            recommended: engine.recommended(&corridor).await?,
            corridor,
        });
    }

    print_output(format, &tables, |tables| {
        for table in tables {
            println!("{} (recommended: {})", table.corridor, table.recommended);
            println!("  {:<15} {:>10} {:>8} {:>10}  {}", "Provider", "Rate", "Fee", "Net", "Arrives");
            for rate in &table.rates {
                println!(
                    "  {:<15} {:>10} {:>8} {:>10}  {}{}",
                    rate.provider,
                    rate.rate.round_dp(4),
                    rate.fee.round_dp(2),
                    rate.net_value.round_dp(4),
                    rate.eta,
                    if rate.is_recommended { "  *" } else { "" }
                );
            }
            println!();
        }
    })
}

async fn run_subscribe(
    config: &Config,
    request: SubscriptionRequest,
    format: OutputFormat,
) -> anyhow::Result<()> {
    require_persistent(config, "subscribe")?;
    let engine = RateWatch::from_config(config).await?;
    let subscription = engine.create_subscription(request).await?;

    print_output(format, &subscription, |s| {
        println!(
            "Subscribed {} to {} {} {} ({})",
            s.recipient, s.corridor, s.direction, s.threshold, s.id
        );
    })
}

async fn run_unsubscribe(config: &Config, id: Uuid, format: OutputFormat) -> anyhow::Result<()> {
    require_persistent(config, "unsubscribe")?;
    let engine = RateWatch::from_config(config).await?;
    let subscription = engine.deactivate_subscription(id).await?;

    print_output(format, &subscription, |s| {
        println!("Deactivated subscription {}", s.id);
    })
}

async fn run_migrate(config: &Config) -> anyhow::Result<()> {
    if config.storage.backend != StorageBackend::Postgres {
        anyhow::bail!("migrations only apply to the postgres storage backend");
    }

    let pool = PostgresPool::new(&config.storage.database).await?;
    pool.migrate().await?;
    println!("Migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn postgres_config() -> Config {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Postgres;
        config
    }

    #[test]
    fn test_memory_backend_rejects_stateful_commands() {
        let config = Config::default();
        for command in ["subscribe", "unsubscribe", "evaluate"] {
            let err = require_persistent(&config, command).unwrap_err();
            assert!(err.to_string().contains(command));
            assert!(err.to_string().contains("postgres"));
        }
        assert!(require_persistent(&postgres_config(), "subscribe").is_ok());
    }

    #[tokio::test]
    async fn test_stateful_commands_fail_on_memory_backend() {
        let request = SubscriptionRequest {
            recipient: "ana@example.com".to_string(),
            corridor: "USA:USD/BDT".parse().unwrap(),
            direction: "above".to_string(),
            threshold: ThresholdInput::Text("124".to_string()),
        };
        let config = Config::default();

        assert!(run_subscribe(&config, request, OutputFormat::Json).await.is_err());
        assert!(run_unsubscribe(&config, Uuid::new_v4(), OutputFormat::Json).await.is_err());
        assert!(run_evaluate(&config, OutputFormat::Json).await.is_err());
    }

    #[test]
    fn test_log_lines_go_to_the_log_writer() {
        let captured = Captured::default();
        let sink = captured.clone();
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "json".to_string(),
        };

        let subscriber = log_subscriber(&config, false, move || sink.clone());
        tracing::subscriber::with_default(subscriber, || {
            info!(corridor = "USA:USD/BDT", "Ingestion cycle finished");
        });

        let written = String::from_utf8(captured.0.lock().clone()).unwrap();
        let line: serde_json::Value =
            serde_json::from_str(written.lines().next().unwrap()).unwrap();
        assert_eq!(line["fields"]["message"], "Ingestion cycle finished");
        assert_eq!(line["fields"]["corridor"], "USA:USD/BDT");
    }
}
