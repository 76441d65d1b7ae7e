//! Controller configuration.
//!
//! Everything the controller needs is loaded once at startup and passed down
//! explicitly; nothing is registered in process-wide state.

use crate::error::ControllerError;
use crds::Map;
use k8s_openapi::api::core::v1::Pod;
use kube::Resource;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default worker image (ships `socat` and `nc`)
pub const DEFAULT_WORKER_IMAGE: &str = "alpine/socat";

/// Identity of a resource kind as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindInfo {
    /// `apiVersion`, e.g. `forward.techsquad.rocks/v1beta1`
    pub api_version: String,
    /// `kind`, e.g. `Map`
    pub kind: String,
    /// Plural resource name, e.g. `maps`
    pub plural: String,
}

impl KindInfo {
    fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
        }
    }
}

/// The kinds this controller works with
///
/// Built at startup and handed to the reconciler; used to stamp owner
/// references on workers and to label log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindRegistry {
    /// The forward intent (`Map`)
    pub intent: KindInfo,
    /// The worker object (`Pod`)
    pub worker: KindInfo,
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self {
            intent: KindInfo::of::<Map>(),
            worker: KindInfo::of::<Pod>(),
        }
    }
}

/// Runtime configuration for the Forward Controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Container image for worker pods
    pub worker_image: String,
    /// Port of the metrics/probe server
    pub http_port: u16,
    /// Maximum number of concurrent reconciliations
    pub concurrency: u16,
    /// Quiet period before a burst of events is reconciled
    pub debounce: Duration,
    /// First retry delay after a failed reconciliation
    pub backoff_min: Duration,
    /// Upper bound of the retry delay
    pub backoff_max: Duration,
    /// Kind registry
    pub kinds: KindRegistry,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            worker_image: DEFAULT_WORKER_IMAGE.to_string(),
            http_port: 8080,
            concurrency: 3,
            debounce: Duration::from_secs(1),
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            kinds: KindRegistry::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            watch_namespace: var("WATCH_NAMESPACE"),
            worker_image: var("WORKER_IMAGE").unwrap_or(defaults.worker_image),
            http_port: parse_var(&var, "HTTP_PORT")?.unwrap_or(defaults.http_port),
            concurrency: parse_var(&var, "RECONCILE_CONCURRENCY")?.unwrap_or(defaults.concurrency),
            debounce: parse_var(&var, "RECONCILE_DEBOUNCE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.debounce),
            backoff_min: parse_var(&var, "BACKOFF_MIN_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_min),
            backoff_max: parse_var(&var, "BACKOFF_MAX_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_max),
            kinds: defaults.kinds,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ControllerError> {
        if self.concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.backoff_min.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "BACKOFF_MIN_SECS must be at least 1".to_string(),
            ));
        }
        if self.backoff_min > self.backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MIN_SECS ({}) exceeds BACKOFF_MAX_SECS ({})",
                self.backoff_min.as_secs(),
                self.backoff_max.as_secs()
            )));
        }
        Ok(())
    }
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>, ControllerError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                ControllerError::InvalidConfig(format!("{} has invalid value {:?}", name, raw))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.worker_image, "alpine/socat");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.backoff_min, Duration::from_secs(5));
        assert_eq!(config.backoff_max, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("WATCH_NAMESPACE", "edge"),
            ("WORKER_IMAGE", "registry.local/socat:1.7"),
            ("HTTP_PORT", "9000"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("RECONCILE_DEBOUNCE_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("edge"));
        assert_eq!(config.worker_image, "registry.local/socat:1.7");
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.debounce, Duration::ZERO);
    }

    #[test]
    fn test_blank_namespace_means_all_namespaces() {
        let config = load(&[("WATCH_NAMESPACE", "  ")]).unwrap();
        assert_eq!(config.watch_namespace, None);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = load(&[("HTTP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("HTTP_PORT")));
    }

    #[test]
    fn test_backoff_bounds_are_checked() {
        assert!(load(&[("BACKOFF_MIN_SECS", "0")]).is_err());
        assert!(load(&[("BACKOFF_MIN_SECS", "60"), ("BACKOFF_MAX_SECS", "30")]).is_err());
        assert!(load(&[("RECONCILE_CONCURRENCY", "0")]).is_err());
    }

    #[test]
    fn test_kind_registry() {
        let kinds = KindRegistry::default();
        assert_eq!(kinds.intent.api_version, "forward.techsquad.rocks/v1beta1");
        assert_eq!(kinds.intent.kind, "Map");
        assert_eq!(kinds.intent.plural, "maps");
        assert_eq!(kinds.worker.api_version, "v1");
        assert_eq!(kinds.worker.kind, "Pod");
    }
}
