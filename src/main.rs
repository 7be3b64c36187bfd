//! auto-healer entrypoint.
//!
//! One invocation runs one healing cycle (the CronJob schedules repetition),
//! pushes accumulated metrics to the pushgateway, and emits a JSON job
//! summary. Read-only subcommands expose the namespace rollup and the
//! deployment status/scale primitives.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use kube::Client;
use tracing::{error, info};

use auto_healer::cluster::{ClusterApi, KubeCluster};
use auto_healer::config::HealerConfig;
use auto_healer::cycle::{HealingCycle, JobStatus, JobSummary};
use auto_healer::metrics::{MetricsSink, NullSink, PushSink};
use auto_healer::namespace::NamespaceAggregator;
use auto_healer::ownership::DeploymentRef;
use auto_healer::remediation::RemediationExecutor;

/// Self-healing Kubernetes job - restarts deployments backing crash-looping pods
#[derive(Parser)]
#[command(name = "auto-healer")]
#[command(about = "Restart deployments whose pods exceed a container restart threshold")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Restart threshold override
    #[arg(long, global = true)]
    threshold: Option<u32>,

    /// Comma-separated namespace list override
    #[arg(long, global = true)]
    namespaces: Option<String>,

    /// Simulate remediations without mutating the cluster
    #[arg(long, global = true)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one healing cycle and push metrics
    Run,
    /// Print a health summary for a namespace
    Summary {
        /// Namespace to summarize
        #[arg(long)]
        namespace: String,
    },
    /// Set a deployment's replica count directly
    Scale {
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        deployment: String,
        #[arg(long)]
        replicas: i32,
    },
    /// Print replica and rollout status for a deployment
    Status {
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        deployment: String,
    },
    /// Print a health snapshot for a single pod
    PodHealth {
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        pod: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "auto_healer=debug"
    } else {
        "auto_healer=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = HealerConfig::from_env().context("Invalid configuration")?;
    if let Some(threshold) = cli.threshold {
        config.restart_threshold = threshold;
    }
    if let Some(raw) = &cli.namespaces {
        config.namespaces = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    config.validate().context("Invalid configuration")?;

    let client = Client::try_default()
        .await
        .context("Failed to load Kubernetes configuration")?;
    info!("Loaded Kubernetes configuration");

    let cluster = Arc::new(KubeCluster::new(
        client,
        Duration::from_secs(config.api_timeout_secs),
    ));

    match cli.command {
        Commands::Run => run_cycle(cluster, &config).await,
        Commands::Summary { namespace } => {
            let aggregator = NamespaceAggregator::new(cluster, config.restart_threshold);
            let summary = aggregator.summarize(&namespace).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Scale {
            namespace,
            deployment,
            replicas,
        } => {
            let executor = RemediationExecutor::new(cluster, Arc::new(NullSink), config.dry_run);
            let target = DeploymentRef {
                name: deployment,
                namespace,
            };
            let action = executor.scale(&target, replicas).await;
            println!("{}", serde_json::to_string_pretty(&action)?);
            anyhow::ensure!(action.succeeded(), "scale failed");
            Ok(())
        }
        Commands::Status {
            namespace,
            deployment,
        } => {
            let executor = RemediationExecutor::new(cluster, Arc::new(NullSink), config.dry_run);
            let target = DeploymentRef {
                name: deployment,
                namespace,
            };
            match executor.deployment_status(&target).await {
                Some(status) => {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                    Ok(())
                }
                None => anyhow::bail!("deployment status unavailable"),
            }
        }
        Commands::PodHealth { namespace, pod } => {
            let subject = cluster
                .get_pod(&pod, &namespace)
                .await
                .context("Failed to read pod")?;
            let observation = auto_healer::health::observe(&subject);
            println!("{}", serde_json::to_string_pretty(&observation)?);
            Ok(())
        }
    }
}

/// Run one healing cycle, push metrics, and emit the job summary.
///
/// The summary is emitted on both paths: a cycle that could not run still
/// produces a FAILURE record before the process exits non-zero.
async fn run_cycle(cluster: Arc<KubeCluster>, config: &HealerConfig) -> Result<()> {
    info!("Auto-healer starting");
    let started_at = Utc::now();

    let metrics: Arc<dyn MetricsSink> = Arc::new(
        PushSink::new(&config.prometheus_gateway).context("Failed to build metrics sink")?,
    );

    let cycle = HealingCycle::new(cluster, metrics.clone(), config);
    let summary = match cycle.run().await {
        Ok(report) => JobSummary::new(JobStatus::Success, &report, config),
        Err(e) => {
            error!(error = %e, "Healing cycle failed");
            // Flush failure is logged inside the sink, never fails the run.
            metrics.flush().await;
            let summary = JobSummary::failure(started_at, Utc::now(), config);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Err(e.into());
        }
    };

    metrics.flush().await;

    info!(
        status = ?summary.status,
        duration_seconds = summary.duration_seconds,
        "Auto-healer completed"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
