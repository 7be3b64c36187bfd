//! Self-healing Kubernetes job.
//!
//! Detects pods whose container restart counts cross a threshold, resolves
//! the owning Deployment through the Pod -> ReplicaSet -> Deployment chain,
//! and triggers a rollout restart via a template-annotation merge patch.
//! Runs as discrete cycles (one per invocation, CronJob style), with a
//! separate per-namespace health rollup.
//!
//! # Architecture
//!
//! - [`health::HealthInspector`] computes restart counts and readiness.
//! - [`ownership::OwnershipResolver`] walks the two-hop owner chain.
//! - [`remediation::RemediationExecutor`] applies the restart patch, gated
//!   by dry-run.
//! - [`namespace::NamespaceAggregator`] rolls up namespace health,
//!   independent of the remediation path.
//! - [`cycle::HealingCycle`] drives Scan -> Remediate -> Report.
//!
//! Cluster access and metrics go through the [`cluster::ClusterApi`] and
//! [`metrics::MetricsSink`] traits so every component is testable against
//! in-memory fakes.

pub mod cluster;
pub mod config;
pub mod cycle;
pub mod error;
pub mod health;
pub mod metrics;
pub mod namespace;
pub mod ownership;
pub mod remediation;

pub use config::HealerConfig;
pub use cycle::{CycleReport, HealingCycle, JobStatus, JobSummary};
pub use error::HealerError;
