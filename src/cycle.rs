//! The healing cycle.
//!
//! One bounded pass: scan every configured namespace for pods over the
//! restart threshold, resolve each unhealthy pod to its owning Deployment,
//! trigger a rollout restart, and report totals. A failure on one pod never
//! blocks the rest; a cycle only fails when no namespace could be scanned
//! at all.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cluster::ClusterApi;
use crate::config::{HealerConfig, JOB_NAME};
use crate::error::HealerError;
use crate::health::{HealthInspector, UnhealthyPod};
use crate::metrics::{MetricsSink, ERRORS_TOTAL, UNHEALTHY_PODS};
use crate::ownership::{OwnershipResolver, Resolution};
use crate::remediation::RemediationExecutor;

/// Per-namespace outcome counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NamespaceOutcome {
    pub found: u32,
    pub healed: u32,
}

/// Report from one healing cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub total_unhealthy: u32,
    pub total_healed: u32,
    pub per_namespace: BTreeMap<String, NamespaceOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// End-of-run summary record for logging and forwarding.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job: &'static str,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub restart_threshold: u32,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Success,
    Failure,
}

impl JobSummary {
    #[must_use]
    pub fn new(status: JobStatus, report: &CycleReport, config: &HealerConfig) -> Self {
        Self {
            job: JOB_NAME,
            status,
            start_time: report.started_at,
            end_time: report.finished_at,
            duration_seconds: report.duration_seconds,
            restart_threshold: config.restart_threshold,
            dry_run: config.dry_run,
        }
    }

    /// Summary for a cycle that could not run at all. There is no report to
    /// draw timestamps from, so the caller supplies them; the summary is
    /// still emitted and forwarded like any other.
    #[must_use]
    pub fn failure(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        config: &HealerConfig,
    ) -> Self {
        Self {
            job: JOB_NAME,
            status: JobStatus::Failure,
            start_time: started_at,
            end_time: finished_at,
            duration_seconds: (finished_at - started_at).as_seconds_f64(),
            restart_threshold: config.restart_threshold,
            dry_run: config.dry_run,
        }
    }
}

/// Drives one full scan/remediate/report pass.
pub struct HealingCycle {
    inspector: HealthInspector,
    resolver: OwnershipResolver,
    executor: RemediationExecutor,
    cluster: Arc<dyn ClusterApi>,
    metrics: Arc<dyn MetricsSink>,
    namespaces: Vec<String>,
    heal_delay: Duration,
    threshold: u32,
}

impl HealingCycle {
    #[must_use]
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        metrics: Arc<dyn MetricsSink>,
        config: &HealerConfig,
    ) -> Self {
        Self {
            inspector: HealthInspector::new(cluster.clone(), config.restart_threshold),
            resolver: OwnershipResolver::new(cluster.clone()),
            executor: RemediationExecutor::new(cluster.clone(), metrics.clone(), config.dry_run),
            cluster,
            metrics,
            namespaces: config.namespaces.clone(),
            heal_delay: Duration::from_secs(config.heal_delay_secs),
            threshold: config.restart_threshold,
        }
    }

    /// Run one healing cycle.
    ///
    /// # Errors
    /// Fails only when every configured namespace scan errored, i.e. the
    /// cycle could not observe the cluster at all. Per-pod and per-namespace
    /// failures are contained and reported through counts.
    pub async fn run(&self) -> Result<CycleReport, HealerError> {
        let started_at = Utc::now();
        info!("Starting auto-healer cycle");

        let unhealthy = self.scan().await?;

        let total_unhealthy: u32 = unhealthy.values().map(|pods| pods.len() as u32).sum();
        self.metrics
            .set_gauge(UNHEALTHY_PODS, f64::from(total_unhealthy));

        let mut per_namespace: BTreeMap<String, NamespaceOutcome> = BTreeMap::new();
        let mut total_healed = 0;

        if total_unhealthy == 0 {
            info!("No unhealthy pods found");
        } else {
            info!(
                pods = total_unhealthy,
                namespaces = unhealthy.len(),
                "Found unhealthy pods"
            );

            for (namespace, pods) in &unhealthy {
                let outcome = per_namespace.entry(namespace.clone()).or_default();
                outcome.found = pods.len() as u32;

                for pod in pods {
                    info!(
                        pod = %pod.name,
                        namespace = %namespace,
                        restarts = pod.restart_count,
                        threshold = self.threshold,
                        "Pod over restart threshold"
                    );

                    if self.remediate(pod).await {
                        outcome.healed += 1;
                        total_healed += 1;
                        // Throttle consecutive rollouts against the control
                        // plane; skips and failures do not consume the delay.
                        tokio::time::sleep(self.heal_delay).await;
                    }
                }
            }
        }

        let finished_at = Utc::now();
        let duration_seconds = (finished_at - started_at).as_seconds_f64();
        info!(
            healed = total_healed,
            duration_seconds, "Healing cycle completed"
        );

        Ok(CycleReport {
            total_unhealthy,
            total_healed,
            per_namespace,
            started_at,
            finished_at,
            duration_seconds,
        })
    }

    /// Scan all configured namespaces, collecting unhealthy pods keyed by
    /// namespace. A namespace whose pod list fails is logged, counted, and
    /// skipped.
    async fn scan(&self) -> Result<BTreeMap<String, Vec<UnhealthyPod>>, HealerError> {
        let mut unhealthy = BTreeMap::new();
        let mut scan_failures = 0;

        for namespace in &self.namespaces {
            match self.inspector.scan_namespace(namespace).await {
                Ok(pods) => {
                    if !pods.is_empty() {
                        info!(
                            namespace = %namespace,
                            count = pods.len(),
                            "Found unhealthy pods in namespace"
                        );
                        unhealthy.insert(namespace.clone(), pods);
                    }
                }
                Err(e) => {
                    error!(namespace = %namespace, error = %e, "Failed to list pods");
                    self.metrics
                        .inc_counter(ERRORS_TOTAL, &[("error_type", e.error_type())]);
                    scan_failures += 1;
                }
            }
        }

        if scan_failures == self.namespaces.len() {
            return Err(HealerError::TransientApi(
                "all namespace scans failed; cannot observe the cluster".to_string(),
            ));
        }

        Ok(unhealthy)
    }

    /// Attempt to heal one pod: resolve its Deployment and trigger a restart.
    /// Returns true only for a successful (or dry-run) remediation.
    async fn remediate(&self, pod: &UnhealthyPod) -> bool {
        let subject = match self.cluster.get_pod(&pod.name, &pod.namespace).await {
            Ok(subject) => subject,
            Err(e) if e.is_not_found() => {
                // Pod vanished between scan and remediation; nothing to heal.
                warn!(pod = %pod.name, namespace = %pod.namespace, "Pod vanished mid-cycle, skipping");
                return false;
            }
            Err(e) => {
                error!(pod = %pod.name, namespace = %pod.namespace, error = %e, "Failed to read pod");
                self.metrics
                    .inc_counter(ERRORS_TOTAL, &[("error_type", e.error_type())]);
                return false;
            }
        };

        let resolution = match self.resolver.resolve_deployment(&subject).await {
            Ok(resolution) => resolution,
            Err(e) => {
                error!(pod = %pod.name, namespace = %pod.namespace, error = %e, "Failed to heal pod");
                self.metrics
                    .inc_counter(ERRORS_TOTAL, &[("error_type", e.error_type())]);
                return false;
            }
        };

        match resolution {
            Resolution::Deployment(target) => {
                info!(
                    deployment = %target.name,
                    namespace = %target.namespace,
                    "Healing deployment"
                );
                self.executor.restart(&target).await.succeeded()
            }
            Resolution::Skip(reason) => {
                warn!(
                    pod = %pod.name,
                    namespace = %pod.namespace,
                    reason = %reason,
                    "Skipping pod"
                );
                false
            }
        }
    }
}
