//! Pod health inspection.
//!
//! Computes restart counts and readiness from raw pod state. Everything here
//! is read-only: API failures degrade to partial results or a zero count, and
//! never abort the calling cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use serde::Serialize;
use tracing::{debug, error};

use crate::cluster::ClusterApi;
use crate::error::HealerError;

/// Lifecycle state of a single container.
///
/// The Kubernetes API reports up to three populated state fields; selection
/// priority is running > waiting > terminated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ContainerLifecycle {
    Running { started_at: Option<DateTime<Utc>> },
    Waiting { reason: Option<String> },
    Terminated { reason: Option<String> },
    Unknown,
}

/// Observed state of one container at scan time.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerObservation {
    pub name: String,
    pub ready: bool,
    pub restart_count: u32,
    pub image: String,
    #[serde(flatten)]
    pub lifecycle: ContainerLifecycle,
}

/// Immutable snapshot of a pod, captured once per cycle.
#[derive(Debug, Clone, Serialize)]
pub struct PodObservation {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    /// True only when every container reports ready.
    pub ready: bool,
    /// Maximum restart count across containers, never the sum.
    pub max_restart_count: u32,
    pub containers: Vec<ContainerObservation>,
}

/// A pod whose restart count crossed the threshold, with the container that
/// triggered the classification.
#[derive(Debug, Clone, Serialize)]
pub struct UnhealthyPod {
    pub name: String,
    pub namespace: String,
    pub container: String,
    pub restart_count: u32,
    pub image: String,
    pub ready: bool,
}

/// Read-only pod health checks against a restart threshold.
pub struct HealthInspector {
    cluster: Arc<dyn ClusterApi>,
    threshold: u32,
}

impl HealthInspector {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>, threshold: u32) -> Self {
        Self { cluster, threshold }
    }

    /// Maximum restart count for a pod read by name. Read failures soft-fail
    /// to 0 with a log line; they never propagate.
    pub async fn pod_restart_count(&self, name: &str, namespace: &str) -> u32 {
        match self.cluster.get_pod(name, namespace).await {
            Ok(pod) => restart_count(&pod),
            Err(e) => {
                error!(pod = name, namespace, error = %e, "Failed to get restart count");
                0
            }
        }
    }

    /// List all pods in a namespace and collect those over the threshold.
    ///
    /// At most one record per pod: the container with the highest restart
    /// count is the triggering container.
    ///
    /// # Errors
    /// Returns an error only if the pod list itself fails.
    pub async fn scan_namespace(&self, namespace: &str) -> Result<Vec<UnhealthyPod>, HealerError> {
        let pods = self.cluster.list_pods(namespace).await?;
        debug!(namespace, pods = pods.len(), "Scanned namespace");

        let mut unhealthy = Vec::new();
        for pod in &pods {
            let Some(statuses) = container_statuses(pod) else {
                continue;
            };
            let Some(worst) = statuses.iter().max_by_key(|c| c.restart_count) else {
                continue;
            };
            let count = to_u32(worst.restart_count);
            if count >= self.threshold {
                unhealthy.push(UnhealthyPod {
                    name: pod.metadata.name.clone().unwrap_or_default(),
                    namespace: namespace.to_string(),
                    container: worst.name.clone(),
                    restart_count: count,
                    image: worst.image.clone(),
                    ready: worst.ready,
                });
            }
        }
        Ok(unhealthy)
    }
}

/// Maximum restart count across a pod's containers. 0 when the status list
/// is absent.
#[must_use]
pub fn restart_count(pod: &Pod) -> u32 {
    container_statuses(pod)
        .map(|statuses| {
            statuses
                .iter()
                .map(|c| to_u32(c.restart_count))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

/// Whether any container is at or over the threshold. A pod with no
/// container statuses is always healthy, regardless of threshold.
#[must_use]
pub fn is_unhealthy(pod: &Pod, threshold: u32) -> bool {
    container_statuses(pod).is_some_and(|statuses| {
        statuses
            .iter()
            .any(|c| to_u32(c.restart_count) >= threshold)
    })
}

/// Capture a full health snapshot of a pod.
#[must_use]
pub fn observe(pod: &Pod) -> PodObservation {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.clone())
        .unwrap_or_default();

    let mut containers = Vec::new();
    let mut all_ready = false;
    let mut max_restarts = 0;

    if let Some(statuses) = container_statuses(pod) {
        all_ready = !statuses.is_empty();
        for status in statuses {
            let count = to_u32(status.restart_count);
            if count > max_restarts {
                max_restarts = count;
            }
            if !status.ready {
                all_ready = false;
            }
            containers.push(ContainerObservation {
                name: status.name.clone(),
                ready: status.ready,
                restart_count: count,
                image: status.image.clone(),
                lifecycle: lifecycle_of(status),
            });
        }
    }

    PodObservation {
        name,
        namespace,
        phase,
        ready: all_ready,
        max_restart_count: max_restarts,
        containers,
    }
}

fn lifecycle_of(status: &ContainerStatus) -> ContainerLifecycle {
    let Some(state) = status.state.as_ref() else {
        return ContainerLifecycle::Unknown;
    };
    // Priority: running > waiting > terminated
    if let Some(running) = &state.running {
        ContainerLifecycle::Running {
            started_at: running.started_at.as_ref().map(|t| t.0),
        }
    } else if let Some(waiting) = &state.waiting {
        ContainerLifecycle::Waiting {
            reason: waiting.reason.clone(),
        }
    } else if let Some(terminated) = &state.terminated {
        ContainerLifecycle::Terminated {
            reason: terminated.reason.clone(),
        }
    } else {
        ContainerLifecycle::Unknown
    }
}

fn container_statuses(pod: &Pod) -> Option<&Vec<ContainerStatus>> {
    pod.status.as_ref().and_then(|s| s.container_statuses.as_ref())
}

fn to_u32(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}
