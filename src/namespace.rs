//! Namespace health rollup.
//!
//! Independent of the remediation path: lists pods and deployments in a
//! namespace and produces a summary of phase buckets, unhealthy pods, and
//! deployment readiness. Failures degrade to an error-tagged summary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use serde::Serialize;
use tracing::error;

use crate::cluster::ClusterApi;
use crate::health;

/// Pod counts for one namespace, bucketed by phase plus the unhealthy flag.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PodCounts {
    pub total: u32,
    pub running: u32,
    pub pending: u32,
    pub failed: u32,
    /// Pods in any other phase (Succeeded, Unknown).
    pub other: u32,
    /// Pods with any container at or over the restart threshold.
    pub unhealthy: u32,
}

/// Deployment counts for one namespace.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DeploymentCounts {
    pub total: u32,
    pub ready: u32,
}

/// Health summary for an entire namespace.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceHealthSummary {
    pub namespace: String,
    pub pods: PodCounts,
    pub deployments: DeploymentCounts,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-only rollup of pod and deployment health per namespace.
pub struct NamespaceAggregator {
    cluster: Arc<dyn ClusterApi>,
    restart_threshold: u32,
}

impl NamespaceAggregator {
    /// The aggregator shares the orchestrator's configured threshold so both
    /// views of "unhealthy" agree.
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>, restart_threshold: u32) -> Self {
        Self {
            cluster,
            restart_threshold,
        }
    }

    /// Summarize pod and deployment health for a namespace.
    ///
    /// Never fails: a list error produces a summary tagged with the error
    /// and whatever counts were gathered before it.
    pub async fn summarize(&self, namespace: &str) -> NamespaceHealthSummary {
        let mut summary = NamespaceHealthSummary {
            namespace: namespace.to_string(),
            pods: PodCounts::default(),
            deployments: DeploymentCounts::default(),
            timestamp: Utc::now(),
            error: None,
        };

        let pods = match self.cluster.list_pods(namespace).await {
            Ok(pods) => pods,
            Err(e) => {
                error!(namespace, error = %e, "Failed to list pods for health summary");
                summary.error = Some(e.to_string());
                return summary;
            }
        };

        for pod in &pods {
            summary.pods.total += 1;

            let phase = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .unwrap_or("");
            match phase {
                "Running" => summary.pods.running += 1,
                "Pending" => summary.pods.pending += 1,
                "Failed" => summary.pods.failed += 1,
                _ => summary.pods.other += 1,
            }

            if health::restart_count(pod) >= self.restart_threshold {
                summary.pods.unhealthy += 1;
            }
        }

        match self.cluster.list_deployments(namespace).await {
            Ok(deployments) => {
                for deployment in &deployments {
                    summary.deployments.total += 1;
                    if deployment_ready(deployment) {
                        summary.deployments.ready += 1;
                    }
                }
            }
            Err(e) => {
                error!(namespace, error = %e, "Failed to list deployments for health summary");
                summary.error = Some(e.to_string());
            }
        }

        summary
    }
}

/// A deployment is ready iff readyReplicas matches desired replicas.
/// Trivially true at zero replicas.
fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ready == desired
}
