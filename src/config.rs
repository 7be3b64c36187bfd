//! Configuration for the healing job.
//!
//! Values come from environment variables (CronJob style) with CLI overrides
//! applied in `main`. Invalid values are fatal before any cycle runs.

use crate::error::HealerError;

/// Job name reported in summaries and used as the pushgateway grouping job.
pub const JOB_NAME: &str = "auto-healer";

/// Namespaces scanned when none are configured.
pub const DEFAULT_NAMESPACES: &[&str] = &["portal", "hrt-sre"];

/// Runtime configuration for one healing invocation.
#[derive(Debug, Clone)]
pub struct HealerConfig {
    /// Minimum per-container restart count at which a pod is unhealthy.
    pub restart_threshold: u32,
    /// Namespaces to scan each cycle.
    pub namespaces: Vec<String>,
    /// Simulate remediations without issuing mutating calls.
    pub dry_run: bool,
    /// Delay applied after each successful remediation, in seconds.
    pub heal_delay_secs: u64,
    /// Per-call timeout for cluster API requests, in seconds.
    pub api_timeout_secs: u64,
    /// Prometheus pushgateway address for the end-of-run flush.
    pub prometheus_gateway: String,
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            restart_threshold: 3,
            namespaces: DEFAULT_NAMESPACES.iter().map(|s| (*s).to_string()).collect(),
            dry_run: false,
            heal_delay_secs: 2,
            api_timeout_secs: 30,
            prometheus_gateway: "prometheus-pushgateway:9091".to_string(),
        }
    }
}

impl HealerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// # Errors
    /// Returns `HealerError::Config` for unparsable numeric values or an
    /// explicitly empty namespace list.
    pub fn from_env() -> Result<Self, HealerError> {
        let defaults = Self::default();

        let restart_threshold = parse_env("RESTART_THRESHOLD", defaults.restart_threshold)?;
        let heal_delay_secs = parse_env("HEAL_DELAY_SECS", defaults.heal_delay_secs)?;
        let api_timeout_secs = parse_env("API_TIMEOUT_SECS", defaults.api_timeout_secs)?;

        let namespaces = match std::env::var("NAMESPACES") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
            Err(_) => defaults.namespaces,
        };

        let dry_run = std::env::var("DRY_RUN")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let prometheus_gateway =
            std::env::var("PROMETHEUS_GATEWAY").unwrap_or(defaults.prometheus_gateway);

        let config = Self {
            restart_threshold,
            namespaces,
            dry_run,
            heal_delay_secs,
            api_timeout_secs,
            prometheus_gateway,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that must hold before a cycle may run.
    ///
    /// # Errors
    /// Returns `HealerError::Config` when the namespace list is empty.
    pub fn validate(&self) -> Result<(), HealerError> {
        if self.namespaces.is_empty() {
            return Err(HealerError::Config(
                "namespace list is empty; nothing to scan".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, HealerError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| HealerError::Config(format!("{key} is not a valid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}
