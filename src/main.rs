//! Drover CLI - Herds Your Rancher Clusters
//!
//! Run the Harvester import and RKE2 provisioning checks against a live
//! Rancher/Harvester pair.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use drover::checks::{registry::CHECKS, Check, CheckContext, CheckError};
use drover::config::Config;

/// Drover - herds your Rancher clusters
#[derive(Debug, Parser)]
#[command(name = "drover")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run checks against a Rancher/Harvester pair
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "drover.yaml")]
        config: String,

        /// Specific checks to run (comma-separated, in registry order)
        #[arg(short = 'C', long)]
        checks: Option<String>,

        /// Overall timeout for the whole run
        #[arg(short, long, default_value = "45m")]
        timeout: String,
    },

    /// Generate a default configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "drover.yaml")]
        output: String,
    },

    /// List available checks
    List,

    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "drover.yaml")]
        config: String,
    },

    /// Delete the clusters a previous run created
    Cleanup {
        /// Path to configuration file
        #[arg(short, long, default_value = "drover.yaml")]
        config: String,
    },
}

fn setup_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.json);

    match cli.command {
        Commands::Run {
            config: config_path,
            checks: check_filter,
            timeout,
        } => {
            let timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("invalid timeout: {timeout}"))?;
            run_checks(&config_path, check_filter.as_deref(), timeout).await
        }

        Commands::Init { output } => init_config(&output),

        Commands::List => {
            list_checks();
            Ok(())
        }

        Commands::Validate {
            config: config_path,
        } => validate_config(&config_path),

        Commands::Cleanup {
            config: config_path,
        } => cleanup(&config_path).await,
    }
}

/// Run the configured checks sequentially, in registry order
async fn run_checks(
    config_path: &str,
    check_filter: Option<&str>,
    overall_timeout: Duration,
) -> Result<()> {
    tracing::info!(config = %config_path, "Loading configuration");

    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    tracing::info!(
        rancher = %config.rancher.url,
        harvester = %config.harvester.url,
        unique_name = %config.run.unique_name,
        "Configuration loaded"
    );

    let ctx = config
        .to_check_context()
        .context("Failed to create check context")?;

    // Later checks consume what earlier checks created, so filtered runs
    // still execute in registry order.
    let checks_to_run: Vec<Arc<dyn Check>> = if let Some(filter) = check_filter {
        let wanted: Vec<&str> = filter.split(',').map(str::trim).collect();
        for name in &wanted {
            if !CHECKS.contains_key(*name) {
                tracing::warn!(check = name, "Unknown check, skipping");
            }
        }
        CHECKS
            .iter()
            .filter(|(name, _)| wanted.contains(name))
            .map(|(_, check)| check.clone())
            .collect()
    } else {
        CHECKS
            .iter()
            .filter(|(name, _)| config.is_check_enabled(name))
            .map(|(_, check)| check.clone())
            .collect()
    };

    if checks_to_run.is_empty() {
        tracing::warn!("No checks to run");
        return Ok(());
    }

    tracing::info!(
        count = checks_to_run.len(),
        checks = ?checks_to_run.iter().map(|c| c.name()).collect::<Vec<_>>(),
        timeout_secs = overall_timeout.as_secs(),
        "Running checks sequentially"
    );

    // Watchdog: past the overall budget, raise the cancel flag so the
    // current wait unwinds instead of running out its own timeout.
    let cancel = ctx.cancel.clone();
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(overall_timeout).await;
        tracing::error!("Overall timeout reached, cancelling run");
        cancel.store(true, Ordering::Relaxed);
    });

    let outcome = run_sequence(&ctx, &config, &checks_to_run).await;
    watchdog.abort();

    match outcome {
        RunOutcome::AllPassed => {
            tracing::info!("All checks PASSED");
            Ok(())
        }
        RunOutcome::Failed(name) => {
            tracing::error!(check = %name, "Run stopped at failed check");
            anyhow::bail!("check {name} FAILED")
        }
        RunOutcome::Cancelled(name) => {
            anyhow::bail!("run cancelled during check {name}")
        }
    }
}

enum RunOutcome {
    AllPassed,
    Failed(String),
    Cancelled(String),
}

async fn run_sequence(
    ctx: &CheckContext,
    config: &Config,
    checks: &[Arc<dyn Check>],
) -> RunOutcome {
    for check in checks {
        let check_name = check.name().to_string();

        let opts = config
            .check_config(&check_name)
            .map(|c| c.to_check_options(&check.default_options()))
            .unwrap_or_else(|| check.default_options());

        tracing::info!(check = %check_name, "Starting check");
        match check.run(ctx, &opts).await {
            Ok(result) => {
                if result.passed {
                    tracing::info!(
                        check = %check_name,
                        duration_ms = result.duration.as_millis(),
                        message = ?result.message,
                        "Check PASSED"
                    );
                    for step in &result.steps {
                        tracing::debug!(check = %check_name, step = %step.step, "Step passed");
                    }
                } else {
                    tracing::error!(
                        check = %check_name,
                        duration_ms = result.duration.as_millis(),
                        "Check FAILED"
                    );
                    for step in &result.steps {
                        if !step.passed {
                            tracing::error!(
                                check = %check_name,
                                step = %step.step,
                                error = ?step.error,
                                "Step failed"
                            );
                        }
                    }
                    return RunOutcome::Failed(check_name);
                }
            }
            Err(CheckError::Cancelled) => {
                tracing::error!(check = %check_name, "Check cancelled");
                return RunOutcome::Cancelled(check_name);
            }
            Err(e) => {
                tracing::error!(check = %check_name, error = %e, "Check error");
                return RunOutcome::Failed(check_name);
            }
        }
    }
    RunOutcome::AllPassed
}

/// Generate a default configuration file
fn init_config(output: &str) -> Result<()> {
    let config = Config::default_config();
    let yaml = config.to_yaml().context("Failed to serialize config")?;

    std::fs::write(output, &yaml).with_context(|| format!("Failed to write config to {output}"))?;

    tracing::info!(path = %output, "Configuration file created");
    println!("Created {output}");
    println!();
    println!("Edit the file to point at your Rancher and Harvester, then run:");
    println!("  drover run --config {output}");

    Ok(())
}

/// List available checks
fn list_checks() {
    println!("Available checks (in execution order):");
    println!();

    for (name, check) in CHECKS.iter() {
        println!("  {name:12} - {}", check.description());
    }

    println!();
    println!("Run specific checks with:");
    println!("  drover run --checks import,credential");
}

/// Validate a configuration file
fn validate_config(config_path: &str) -> Result<()> {
    tracing::info!(config = %config_path, "Validating configuration");

    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    println!("Configuration is valid!");
    println!();
    println!("Rancher:   {}", config.rancher.url);
    println!("Harvester: {}", config.harvester.url);
    println!("Unique name: {}", config.run.unique_name);
    println!("Kubernetes version: {}", config.run.kubernetes_version);

    println!();
    println!("Checks configured: {}", config.checks.len());

    for (name, check_config) in &config.checks {
        let status = if check_config.enabled {
            "enabled"
        } else {
            "disabled"
        };
        println!("  - {name}: {status}");
    }

    Ok(())
}

/// Delete the clusters a previous run created, guest cluster first so the
/// Harvester import is not torn down underneath it.
async fn cleanup(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    let ctx = config
        .to_check_context()
        .context("Failed to create check context")?;

    for name in [ctx.names.rke2_cluster(), ctx.names.harvester_cluster()] {
        tracing::info!(cluster = %name, "Deleting cluster");
        match ctx.rancher.mgmt_clusters().delete(&name).await {
            Ok(resp) if (200..300).contains(&resp.code) || resp.code == 404 => {
                tracing::info!(cluster = %name, status = resp.code, "Delete accepted");
            }
            Ok(resp) => {
                tracing::warn!(cluster = %name, status = resp.code, body = %resp.body, "Delete rejected");
            }
            Err(e) => {
                tracing::warn!(cluster = %name, error = %e, "Delete failed");
            }
        }
    }

    Ok(())
}
