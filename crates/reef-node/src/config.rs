//! Engine configuration and coordinator endpoints.

use std::time::Duration;

use reqwest::Url;

use crate::checkpoint::DEFAULT_CHECKPOINT_INTERVAL;
use crate::error::EngineError;

/// Path of the node control socket on the coordinator.
pub const NODE_CONNECT_PATH: &str = "/api/node/connect";

pub const DEFAULT_LABEL: &str = "node@native";
pub const DEFAULT_STEP_BUDGET: u32 = 10_000;
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Human-readable name sent in the handshake response.
    pub label: String,
    /// Step-count ceiling granted to the execution module per call.
    pub step_budget: u32,
    /// Yield between passes when the module suggests no pause.
    pub default_pause: Duration,
    pub checkpoint_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            step_budget: DEFAULT_STEP_BUDGET,
            default_pause: DEFAULT_PAUSE,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `REEF_NODE_LABEL`, `REEF_STEP_BUDGET`,
    /// `REEF_DEFAULT_PAUSE_MS` and `REEF_CHECKPOINT_INTERVAL_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let label = lookup("REEF_NODE_LABEL")
            .filter(|label| !label.trim().is_empty())
            .unwrap_or(defaults.label);
        let step_budget = parse_or("REEF_STEP_BUDGET", &lookup, defaults.step_budget).max(1);
        let default_pause = parse_or(
            "REEF_DEFAULT_PAUSE_MS",
            &lookup,
            defaults.default_pause.as_millis() as u64,
        );
        let checkpoint_interval = parse_or(
            "REEF_CHECKPOINT_INTERVAL_MS",
            &lookup,
            defaults.checkpoint_interval.as_millis() as u64,
        );

        Self {
            label,
            step_budget,
            default_pause: Duration::from_millis(default_pause),
            checkpoint_interval: Duration::from_millis(checkpoint_interval),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_step_budget(mut self, step_budget: u32) -> Self {
        self.step_budget = step_budget;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    default = %default,
                    "Invalid config value, using default"
                );
                default
            }
        },
        None => default,
    }
}

/// Control socket URL for a coordinator: `http → ws`, `https → wss`, fixed path.
pub fn connect_url(manager: &Url) -> Result<Url, EngineError> {
    let scheme = match manager.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(EngineError::config(format!(
                "unsupported coordinator scheme `{other}`"
            )));
        }
    };
    with_scheme(manager, scheme, NODE_CONNECT_PATH)
}

/// HTTP origin of a coordinator, for dataset fetches: `ws → http`, `wss → https`.
pub fn http_base_url(manager: &Url) -> Result<Url, EngineError> {
    let scheme = match manager.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        other => {
            return Err(EngineError::config(format!(
                "unsupported coordinator scheme `{other}`"
            )));
        }
    };
    with_scheme(manager, scheme, "/")
}

fn with_scheme(manager: &Url, scheme: &str, path: &str) -> Result<Url, EngineError> {
    let host = manager
        .host_str()
        .ok_or_else(|| EngineError::config(format!("coordinator url `{manager}` has no host")))?;
    let authority = match manager.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Url::parse(&format!("{scheme}://{authority}{path}"))
        .map_err(|e| EngineError::config(format!("invalid coordinator url: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn connect(s: &str) -> String {
        connect_url(&url(s)).unwrap().to_string()
    }

    #[test]
    fn connect_url_maps_schemes() {
        assert_eq!(
            connect("http://localhost:3000"),
            "ws://localhost:3000/api/node/connect"
        );
        assert_eq!(
            connect("https://reef.example.com/jobs?x=1"),
            "wss://reef.example.com/api/node/connect"
        );
        assert_eq!(
            connect("wss://reef.example.com"),
            "wss://reef.example.com/api/node/connect"
        );
    }

    #[test]
    fn connect_url_rejects_other_schemes() {
        let err = connect_url(&url("ftp://reef.example.com")).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn http_base_url_maps_back() {
        let base = |s: &str| http_base_url(&url(s)).unwrap().to_string();
        assert_eq!(
            base("ws://127.0.0.1:8080/api/node/connect"),
            "http://127.0.0.1:8080/"
        );
        assert_eq!(base("https://reef.example.com"), "https://reef.example.com/");
    }

    #[test]
    fn config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.label, "node@native");
        assert_eq!(config.step_budget, 10_000);
        assert_eq!(config.default_pause, Duration::from_millis(10));
        assert_eq!(config.checkpoint_interval, Duration::from_millis(1000));
    }

    #[test]
    fn config_from_lookup_overrides() {
        let env: HashMap<&str, &str> = [
            ("REEF_NODE_LABEL", "node@lab"),
            ("REEF_STEP_BUDGET", "500"),
            ("REEF_CHECKPOINT_INTERVAL_MS", "5000"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.label, "node@lab");
        assert_eq!(config.step_budget, 500);
        assert_eq!(config.checkpoint_interval, Duration::from_secs(5));
        assert_eq!(config.default_pause, DEFAULT_PAUSE);
    }

    #[test]
    fn config_ignores_invalid_values() {
        let config = EngineConfig::from_lookup(|key| match key {
            "REEF_STEP_BUDGET" => Some("lots".to_string()),
            "REEF_NODE_LABEL" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn zero_budget_is_raised_to_one() {
        let config = EngineConfig::from_lookup(|key| {
            (key == "REEF_STEP_BUDGET").then(|| "0".to_string())
        });
        assert_eq!(config.step_budget, 1);
    }
}
