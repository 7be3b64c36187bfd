//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus, ReplicaSet};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use auto_healer::cluster::ClusterApi;
use auto_healer::error::HealerError;
use auto_healer::metrics::MetricsSink;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// In-memory cluster. Objects are keyed by (namespace, name); list order is
/// sorted by name so batch tests are deterministic.
#[derive(Default)]
pub struct FakeCluster {
    pods: Mutex<HashMap<Key, Pod>>,
    replica_sets: Mutex<HashMap<Key, ReplicaSet>>,
    deployments: Mutex<HashMap<Key, Deployment>>,
    /// Successful merge patches, as (namespace, deployment, body).
    pub patches: Mutex<Vec<(String, String, serde_json::Value)>>,
    reject_patch: Mutex<HashSet<String>>,
    fail_pod_list: Mutex<HashSet<String>>,
    fail_deployment_list: Mutex<HashSet<String>>,
    vanished_pods: Mutex<HashSet<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pod(&self, pod: Pod) {
        let ns = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods.lock().unwrap().insert((ns, name), pod);
    }

    pub fn add_replica_set(&self, rs: ReplicaSet) {
        let ns = rs.metadata.namespace.clone().unwrap_or_default();
        let name = rs.metadata.name.clone().unwrap_or_default();
        self.replica_sets.lock().unwrap().insert((ns, name), rs);
    }

    pub fn add_deployment(&self, deployment: Deployment) {
        let ns = deployment.metadata.namespace.clone().unwrap_or_default();
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.deployments.lock().unwrap().insert((ns, name), deployment);
    }

    /// Make patches against the named deployment fail with a conflict.
    pub fn reject_patches_for(&self, deployment: &str) {
        self.reject_patch.lock().unwrap().insert(deployment.to_string());
    }

    /// Make pod lists in the named namespace fail transiently.
    pub fn fail_pod_list_in(&self, namespace: &str) {
        self.fail_pod_list.lock().unwrap().insert(namespace.to_string());
    }

    /// Make deployment lists in the named namespace fail transiently.
    pub fn fail_deployment_list_in(&self, namespace: &str) {
        self.fail_deployment_list
            .lock()
            .unwrap()
            .insert(namespace.to_string());
    }

    /// The named pod still shows up in lists but reads as NotFound,
    /// simulating a pod deleted between scan and remediation.
    pub fn vanish_on_get(&self, pod: &str) {
        self.vanished_pods.lock().unwrap().insert(pod.to_string());
    }

    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }

    pub fn patched_deployments(&self) -> Vec<String> {
        self.patches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, HealerError> {
        if self.vanished_pods.lock().unwrap().contains(name) {
            return Err(HealerError::NotFound {
                kind: "Pod".to_string(),
                name: name.to_string(),
            });
        }
        self.pods
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| HealerError::NotFound {
                kind: "Pod".to_string(),
                name: name.to_string(),
            })
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, HealerError> {
        if self.fail_pod_list.lock().unwrap().contains(namespace) {
            return Err(HealerError::TransientApi(format!(
                "injected list failure in {namespace}"
            )));
        }
        let mut pods: Vec<Pod> = self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect();
        pods.sort_by_key(|p| p.metadata.name.clone());
        Ok(pods)
    }

    async fn get_replica_set(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<ReplicaSet, HealerError> {
        self.replica_sets
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| HealerError::NotFound {
                kind: "ReplicaSet".to_string(),
                name: name.to_string(),
            })
    }

    async fn get_deployment(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Deployment, HealerError> {
        self.deployments
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| HealerError::NotFound {
                kind: "Deployment".to_string(),
                name: name.to_string(),
            })
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, HealerError> {
        if self.fail_deployment_list.lock().unwrap().contains(namespace) {
            return Err(HealerError::TransientApi(format!(
                "injected list failure in {namespace}"
            )));
        }
        let mut deployments: Vec<Deployment> = self
            .deployments
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, d)| d.clone())
            .collect();
        deployments.sort_by_key(|d| d.metadata.name.clone());
        Ok(deployments)
    }

    async fn patch_deployment(
        &self,
        name: &str,
        namespace: &str,
        patch: &serde_json::Value,
    ) -> Result<(), HealerError> {
        if self.reject_patch.lock().unwrap().contains(name) {
            return Err(HealerError::PatchRejected(format!(
                "injected conflict on {name}"
            )));
        }
        self.patches.lock().unwrap().push((
            namespace.to_string(),
            name.to_string(),
            patch.clone(),
        ));
        Ok(())
    }
}

/// Metrics sink that records everything for assertions.
#[derive(Default)]
pub struct RecordingSink {
    counters: Mutex<HashMap<String, u64>>,
    gauges: Mutex<HashMap<String, f64>>,
    flushes: Mutex<u32>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter_key(name: &str, labels: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = labels.to_vec();
        sorted.sort_unstable();
        let labels = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{name}{{{labels}}}")
    }

    /// Current value of a counter for an exact label set.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(&Self::counter_key(name, labels))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of a counter across all label sets.
    pub fn counter_total(&self, name: &str) -> u64 {
        let prefix = format!("{name}{{");
        self.counters
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v)
            .sum()
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.lock().unwrap().get(name).copied()
    }

    pub fn flush_count(&self) -> u32 {
        *self.flushes.lock().unwrap()
    }
}

#[async_trait]
impl MetricsSink for RecordingSink {
    fn inc_counter(&self, name: &str, labels: &[(&str, &str)]) {
        *self
            .counters
            .lock()
            .unwrap()
            .entry(Self::counter_key(name, labels))
            .or_insert(0) += 1;
    }

    fn set_gauge(&self, name: &str, value: f64) {
        self.gauges.lock().unwrap().insert(name.to_string(), value);
    }

    async fn flush(&self) {
        *self.flushes.lock().unwrap() += 1;
    }
}

/// Build a pod with one container status per restart count, optionally owned
/// by a ReplicaSet.
pub fn pod(name: &str, namespace: &str, restarts: &[i32], owner_rs: Option<&str>) -> Pod {
    let statuses: Vec<ContainerStatus> = restarts
        .iter()
        .enumerate()
        .map(|(i, count)| ContainerStatus {
            name: format!("c{i}"),
            ready: true,
            restart_count: *count,
            image: "registry/app:1".to_string(),
            ..ContainerStatus::default()
        })
        .collect();

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: owner_rs.map(|rs| vec![owner_ref("ReplicaSet", rs)]),
            ..ObjectMeta::default()
        },
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            container_statuses: if restarts.is_empty() {
                None
            } else {
                Some(statuses)
            },
            ..PodStatus::default()
        }),
        ..Pod::default()
    }
}

/// Pod with an explicit phase and no container statuses.
pub fn bare_pod(name: &str, namespace: &str, phase: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..PodStatus::default()
        }),
        ..Pod::default()
    }
}

pub fn replica_set(name: &str, namespace: &str, owner_deployment: Option<&str>) -> ReplicaSet {
    ReplicaSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: owner_deployment.map(|d| vec![owner_ref("Deployment", d)]),
            ..ObjectMeta::default()
        },
        ..ReplicaSet::default()
    }
}

pub fn deployment(name: &str, namespace: &str, desired: i32, ready: Option<i32>) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(desired),
            ..DeploymentSpec::default()
        }),
        status: Some(DeploymentStatus {
            ready_replicas: ready,
            ..DeploymentStatus::default()
        }),
        ..Deployment::default()
    }
}

fn owner_ref(kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{name}"),
        ..OwnerReference::default()
    }
}
