//! Deployment remediation.
//!
//! Restarting a deployment means merge-patching a restart timestamp onto the
//! pod template; the rollout machinery does the rest and makes the operation
//! idempotent (same timestamp is a no-op, new timestamp is a new rollout).
//! Dry-run is a hard gate checked before any patch body exists.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::cluster::ClusterApi;
use crate::metrics::{MetricsSink, ACTIONS_TOTAL, ERRORS_TOTAL};
use crate::ownership::DeploymentRef;

/// Annotation the kubectl rollout-restart machinery watches.
const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";
/// Healer-owned annotations recording when and why we triggered a rollout.
const HEALER_RESTARTED_AT: &str = "auto-healer/restarted-at";
const HEALER_REASON: &str = "auto-healer/reason";
const RESTART_REASON: &str = "high-restart-count";

/// Kind of remediation applied to a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Restart,
    Scale,
}

/// How a remediation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Mutation reached the cluster.
    Applied,
    /// Simulated only; zero mutating calls issued.
    DryRun,
    /// Mutation attempted and rejected or lost.
    Failed,
}

/// Record of a single remediation attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RemediationAction {
    pub target: DeploymentRef,
    pub kind: ActionKind,
    pub dry_run: bool,
    pub timestamp: chrono::DateTime<Utc>,
    pub outcome: ActionOutcome,
}

impl RemediationAction {
    /// Whether the attempt counts as a successful remediation. Dry-run does.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Applied | ActionOutcome::DryRun)
    }
}

/// Replica and rollout state of a deployment, for the status CLI view.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatus {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub updated_replicas: i32,
    pub available_replicas: i32,
    pub conditions: Vec<DeploymentCondition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentCondition {
    pub condition_type: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Applies restart and scale patches to deployments.
pub struct RemediationExecutor {
    cluster: Arc<dyn ClusterApi>,
    metrics: Arc<dyn MetricsSink>,
    dry_run: bool,
}

impl RemediationExecutor {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>, metrics: Arc<dyn MetricsSink>, dry_run: bool) -> Self {
        Self {
            cluster,
            metrics,
            dry_run,
        }
    }

    /// Trigger a rollout restart of a deployment.
    ///
    /// Errors from the patch are caught here: logged, counted, and folded
    /// into the returned action as a failure. They never reach the caller.
    pub async fn restart(&self, target: &DeploymentRef) -> RemediationAction {
        let now = Utc::now();

        // Dry-run gate: nothing below this point may run in dry-run mode.
        if self.dry_run {
            info!(
                deployment = %target.name,
                namespace = %target.namespace,
                "DRY RUN: would restart deployment"
            );
            self.record_action("dry_run_restart", target);
            return RemediationAction {
                target: target.clone(),
                kind: ActionKind::Restart,
                dry_run: true,
                timestamp: now,
                outcome: ActionOutcome::DryRun,
            };
        }

        let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            RESTARTED_AT_ANNOTATION: stamp,
                            HEALER_RESTARTED_AT: stamp,
                            HEALER_REASON: RESTART_REASON,
                        }
                    }
                }
            }
        });

        let outcome = match self
            .cluster
            .patch_deployment(&target.name, &target.namespace, &patch)
            .await
        {
            Ok(()) => {
                info!(
                    deployment = %target.name,
                    namespace = %target.namespace,
                    "Successfully triggered restart"
                );
                self.record_action("restart", target);
                ActionOutcome::Applied
            }
            Err(e) => {
                error!(
                    deployment = %target.name,
                    namespace = %target.namespace,
                    error = %e,
                    "Failed to patch deployment"
                );
                self.metrics
                    .inc_counter(ERRORS_TOTAL, &[("error_type", e.error_type())]);
                ActionOutcome::Failed
            }
        };

        RemediationAction {
            target: target.clone(),
            kind: ActionKind::Restart,
            dry_run: false,
            timestamp: now,
            outcome,
        }
    }

    /// Set a deployment's desired replica count directly.
    ///
    /// This is a standalone primitive exposed through the CLI; the auto-heal
    /// path never scales.
    pub async fn scale(&self, target: &DeploymentRef, replicas: i32) -> RemediationAction {
        let now = Utc::now();

        if self.dry_run {
            info!(
                deployment = %target.name,
                namespace = %target.namespace,
                replicas,
                "DRY RUN: would scale deployment"
            );
            self.record_action("dry_run_scale", target);
            return RemediationAction {
                target: target.clone(),
                kind: ActionKind::Scale,
                dry_run: true,
                timestamp: now,
                outcome: ActionOutcome::DryRun,
            };
        }

        let patch = json!({ "spec": { "replicas": replicas } });

        let outcome = match self
            .cluster
            .patch_deployment(&target.name, &target.namespace, &patch)
            .await
        {
            Ok(()) => {
                info!(
                    deployment = %target.name,
                    namespace = %target.namespace,
                    replicas,
                    "Successfully scaled deployment"
                );
                self.record_action("scale", target);
                ActionOutcome::Applied
            }
            Err(e) => {
                error!(
                    deployment = %target.name,
                    namespace = %target.namespace,
                    error = %e,
                    "Failed to scale deployment"
                );
                self.metrics
                    .inc_counter(ERRORS_TOTAL, &[("error_type", e.error_type())]);
                ActionOutcome::Failed
            }
        };

        RemediationAction {
            target: target.clone(),
            kind: ActionKind::Scale,
            dry_run: false,
            timestamp: now,
            outcome,
        }
    }

    /// Read a deployment's replica and condition state. Read failures are
    /// logged and collapse to `None`.
    pub async fn deployment_status(&self, target: &DeploymentRef) -> Option<DeploymentStatus> {
        let deployment = match self
            .cluster
            .get_deployment(&target.name, &target.namespace)
            .await
        {
            Ok(d) => d,
            Err(e) => {
                error!(
                    deployment = %target.name,
                    namespace = %target.namespace,
                    error = %e,
                    "Failed to get deployment status"
                );
                return None;
            }
        };

        let status = deployment.status.unwrap_or_default();
        let conditions = status
            .conditions
            .unwrap_or_default()
            .into_iter()
            .map(|c| DeploymentCondition {
                condition_type: c.type_,
                status: c.status,
                reason: c.reason,
                message: c.message,
            })
            .collect();

        Some(DeploymentStatus {
            name: target.name.clone(),
            namespace: target.namespace.clone(),
            replicas: deployment.spec.and_then(|s| s.replicas).unwrap_or(0),
            ready_replicas: status.ready_replicas.unwrap_or(0),
            updated_replicas: status.updated_replicas.unwrap_or(0),
            available_replicas: status.available_replicas.unwrap_or(0),
            conditions,
        })
    }

    fn record_action(&self, action_type: &str, target: &DeploymentRef) {
        self.metrics.inc_counter(
            ACTIONS_TOTAL,
            &[
                ("type", action_type),
                ("namespace", &target.namespace),
                ("resource", &target.name),
            ],
        );
    }
}
