use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use labwatch::alerts::default_rules;
use labwatch::config::Config;
use labwatch::events::HealthStatus;
use labwatch::registry::{ErrorContext, ErrorDetails};
use labwatch::{Monitor, RequestRecord};
use log::{error, info, warn};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Command-line arguments for labwatch
#[derive(Parser)]
#[command(
    name = "labwatch",
    about = "In-process observability core: structured logs, error reports, latency tracking, health probes and threshold alerts",
    long_about = "Collects structured events from a host application, aggregates them into rolling \
                  metrics, probes dependency health and evaluates threshold rules into a bounded \
                  alert history."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        global = true,
        help = "Enable verbose logging output (debug level)"
    )]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every health probe and print the aggregated result as JSON
    Health,
    /// Run only the data-store probe
    Ping,
    /// Print the default alert rule table as JSON
    Rules,
    /// Drive synthetic traffic and print the resulting metrics and alerts
    Simulate {
        /// Number of requests to generate
        #[arg(long, default_value_t = 200)]
        requests: usize,
        /// Make every Nth request fail with a server error (0 disables failures)
        #[arg(long, default_value_t = 10)]
        error_every: usize,
        /// Base request latency in milliseconds
        #[arg(long, default_value_t = 120.0)]
        latency_ms: f64,
    },
    /// Evaluate alert rules periodically until interrupted
    Watch {
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// Missing config files are allowed and fall back to defaults.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        if let Command::Watch { interval_secs: 0 } = self.command {
            return Err("--interval-secs must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

async fn simulate(
    monitor: &Monitor,
    requests: usize,
    error_every: usize,
    latency_ms: f64,
) -> Result<()> {
    const PATHS: [&str; 4] = ["/api/projects", "/api/news", "/api/events", "/api/users"];

    for i in 0..requests {
        let failed = error_every > 0 && (i + 1) % error_every == 0;
        let path = PATHS[i % PATHS.len()];
        // Deterministic spread so percentiles differ from the mean
        let latency = latency_ms * (1.0 + (i % 7) as f64 / 3.0);
        let status = if failed { 500 } else { 200 };

        monitor.record_request(
            RequestRecord::new("GET", path, status, latency)
                .with_user(format!("user-{}", i % 5))
                .with_request_id(format!("req-{}", i)),
        );

        if failed {
            monitor.record_exception(
                ErrorDetails::new("InternalError", format!("simulated failure on {}", path)),
                ErrorContext {
                    path: Some(path.to_string()),
                    method: Some("GET".to_string()),
                    ..Default::default()
                },
                Some(status),
            );
        }
    }

    let fired = monitor.evaluate_alerts().await;
    print_json(&json!({
        "performance": monitor.performance().report(),
        "performanceHealth": monitor.performance().health(),
        "logMetrics": monitor.events().metrics(),
        "errors": monitor.errors().stats(),
        "alerts": fired,
    }))
}

async fn watch(monitor: &Monitor, interval: Duration) -> Result<()> {
    let shutdown = Arc::new(Notify::new());
    let handler_shutdown = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        handler_shutdown.notify_one();
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    info!(
        "Evaluating alert rules every {}s. Press Ctrl+C to stop.",
        interval.as_secs()
    );

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for alert in monitor.evaluate_alerts().await {
                    print_json(&alert)?;
                }
            }
            _ = shutdown.notified() => break,
        }
    }

    info!("Watch stopped");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let monitor = Monitor::new(&config);

    match cli.command {
        Command::Health => {
            let health = monitor.force_health_check().await;
            print_json(&health)?;
            if health.status == HealthStatus::Critical {
                error!("System health is critical");
            }
        }
        Command::Ping => {
            let result = monitor.health().quick_check().await;
            print_json(&result)?;
        }
        Command::Rules => print_json(&default_rules())?,
        Command::Simulate {
            requests,
            error_every,
            latency_ms,
        } => simulate(&monitor, requests, error_every, latency_ms).await?,
        Command::Watch { interval_secs } => {
            watch(&monitor, Duration::from_secs(interval_secs)).await?
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{Builder, TempDir};

    fn cli(config: Option<PathBuf>, command: Command) -> Cli {
        Cli {
            config,
            verbose: false,
            command,
        }
    }

    #[test]
    fn test_cli_validation_with_existing_file() {
        let file = Builder::new().suffix(".toml").tempfile().unwrap();
        std::fs::write(file.path(), "[storage]\nmax_logs = 100\n").unwrap();

        let cli = cli(Some(file.path().to_path_buf()), Command::Health);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_missing_file() {
        let cli = cli(
            Some(PathBuf::from("/nonexistent/labwatch.toml")),
            Command::Rules,
        );
        // Missing files fall back to defaults
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_directory() {
        let dir = TempDir::new().unwrap();
        let cli = cli(Some(dir.path().to_path_buf()), Command::Ping);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_validation_rejects_zero_interval() {
        let cli = cli(None, Command::Watch { interval_secs: 0 });
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_parse_simulate_arguments() {
        let cli = Cli::try_parse_from([
            "labwatch",
            "simulate",
            "--requests",
            "50",
            "--error-every",
            "5",
            "--latency-ms",
            "250",
        ])
        .unwrap();

        match cli.command {
            Command::Simulate {
                requests,
                error_every,
                latency_ms,
            } => {
                assert_eq!(requests, 50);
                assert_eq!(error_every, 5);
                assert_eq!(latency_ms, 250.0);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["labwatch", "health", "--verbose", "-c", "x.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[tokio::test]
    async fn test_simulate_records_traffic() {
        let mut config = Config::default();
        config.console.enabled = false;
        let monitor = Monitor::new(&config);

        simulate(&monitor, 20, 10, 100.0).await.unwrap();

        assert_eq!(monitor.performance().report().total_requests, 20);
        assert_eq!(monitor.errors().len(), 2);
    }
}
