//! Cluster API access.
//!
//! Components talk to the cluster through the [`ClusterApi`] trait so tests
//! can inject an in-memory fake. The production implementation wraps
//! `kube::Api` with a per-call timeout; a timed-out call surfaces as a
//! transient error, never a panic or a hang.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;

use crate::error::{from_kube, HealerError};

/// Read/list/patch access to the cluster objects the healer touches.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, HealerError>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, HealerError>;

    async fn get_replica_set(&self, name: &str, namespace: &str)
        -> Result<ReplicaSet, HealerError>;

    async fn get_deployment(&self, name: &str, namespace: &str)
        -> Result<Deployment, HealerError>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, HealerError>;

    /// Apply a merge patch to a deployment. The only mutating call in the crate.
    async fn patch_deployment(
        &self,
        name: &str,
        namespace: &str,
        patch: &serde_json::Value,
    ) -> Result<(), HealerError>;
}

/// `kube`-backed implementation with a per-call timeout.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    call_timeout: Duration,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    async fn timed<T, F>(&self, kind: &str, name: &str, fut: F) -> Result<T, HealerError>
    where
        F: std::future::Future<Output = Result<T, kube::Error>> + Send,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(from_kube(kind, name, &err)),
            Err(_) => Err(HealerError::TransientApi(format!(
                "{kind} {name}: request timed out after {}s",
                self.call_timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, HealerError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        self.timed("Pod", name, pods.get(name)).await
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, HealerError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = self
            .timed("Pod", namespace, pods.list(&ListParams::default()))
            .await?;
        Ok(list.items)
    }

    async fn get_replica_set(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<ReplicaSet, HealerError> {
        let replica_sets: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        self.timed("ReplicaSet", name, replica_sets.get(name)).await
    }

    async fn get_deployment(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Deployment, HealerError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        self.timed("Deployment", name, deployments.get(name)).await
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, HealerError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = self
            .timed("Deployment", namespace, deployments.list(&ListParams::default()))
            .await?;
        Ok(list.items)
    }

    async fn patch_deployment(
        &self,
        name: &str,
        namespace: &str,
        patch: &serde_json::Value,
    ) -> Result<(), HealerError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        self.timed(
            "Deployment",
            name,
            deployments.patch(name, &PatchParams::default(), &Patch::Merge(patch)),
        )
        .await?;
        Ok(())
    }
}
