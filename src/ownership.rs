//! Deployment ownership resolution.
//!
//! A pod created by a Deployment is owned by a ReplicaSet, which is in turn
//! owned by the Deployment. The walk is a fixed-depth, two-hop lookup: read
//! the pod's ReplicaSet owners, then each ReplicaSet's Deployment owners, and
//! return the first match. Namespaces are always inherited from the pod;
//! cross-namespace ownership does not exist in Kubernetes.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cluster::ClusterApi;
use crate::error::HealerError;

/// Why a pod was skipped rather than remediated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The pod has no owner references at all (bare pod).
    NoOwner,
    /// Owners exist, but none leads to a Deployment.
    NoDeploymentFound,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoOwner => write!(f, "no-owner"),
            Self::NoDeploymentFound => write!(f, "no-deployment-found"),
        }
    }
}

/// Remediation target resolved from a pod's owner chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentRef {
    pub name: String,
    pub namespace: String,
}

/// Outcome of an ownership walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Deployment(DeploymentRef),
    Skip(SkipReason),
}

/// Walks Pod -> ReplicaSet -> Deployment ownership.
pub struct OwnershipResolver {
    cluster: Arc<dyn ClusterApi>,
}

impl OwnershipResolver {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Resolve the Deployment owning a pod.
    ///
    /// Short-circuits on the first Deployment found. A ReplicaSet that
    /// vanished mid-cycle moves the walk on to the next owner reference.
    ///
    /// # Errors
    /// Returns an error for transient API failures during the walk; the
    /// caller treats it as that pod's remediation failure.
    pub async fn resolve_deployment(&self, pod: &Pod) -> Result<Resolution, HealerError> {
        let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();

        let Some(owners) = pod.metadata.owner_references.as_ref() else {
            return Ok(Resolution::Skip(SkipReason::NoOwner));
        };
        if owners.is_empty() {
            return Ok(Resolution::Skip(SkipReason::NoOwner));
        }

        let replica_set_owners: Vec<_> =
            owners.iter().filter(|o| o.kind == "ReplicaSet").collect();
        if replica_set_owners.len() > 1 {
            // Unusual: behavior under multiple ReplicaSet owners is first
            // match wins, so make the ambiguity visible.
            warn!(
                pod = pod_name,
                namespace,
                owners = replica_set_owners.len(),
                "Pod has multiple ReplicaSet owners; using first Deployment found"
            );
        }

        for owner in replica_set_owners {
            let replica_set = match self.cluster.get_replica_set(&owner.name, namespace).await {
                Ok(rs) => rs,
                Err(e) if e.is_not_found() => {
                    debug!(
                        pod = pod_name,
                        replica_set = %owner.name,
                        "ReplicaSet vanished mid-cycle, trying next owner"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(rs_owners) = replica_set.metadata.owner_references.as_ref() {
                if let Some(deploy) = rs_owners.iter().find(|o| o.kind == "Deployment") {
                    return Ok(Resolution::Deployment(DeploymentRef {
                        name: deploy.name.clone(),
                        namespace: namespace.to_string(),
                    }));
                }
            }
        }

        Ok(Resolution::Skip(SkipReason::NoDeploymentFound))
    }
}
