//! Dispatcher Configuration
//!
//! Chooses the execution strategy and cache bound. Values come from JSON or
//! from `ASSET_GRAPH_*` environment variables; anything unset keeps its
//! default.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dispatch::{Dispatcher, GraphComputer, InlineComputer, ResultCache, WorkerComputer};
use crate::error::ConfigError;

const STRATEGY_VAR: &str = "ASSET_GRAPH_STRATEGY";
const CACHE_CAPACITY_VAR: &str = "ASSET_GRAPH_CACHE_CAPACITY";
const WORKER_NAME_VAR: &str = "ASSET_GRAPH_WORKER_NAME";

/// Where computations run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// On the calling thread.
    Inline,
    /// On a dedicated worker thread.
    #[default]
    Offloaded,
}

impl std::str::FromStr for Strategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Strategy::Inline),
            "offloaded" | "worker" => Ok(Strategy::Offloaded),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub strategy: Strategy,
    /// Maximum number of memoized results. `None` keeps everything.
    pub cache_capacity: Option<usize>,
    /// Thread name of the offloaded worker.
    pub worker_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            cache_capacity: None,
            worker_name: "asset-graph-worker".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read variables through `lookup`, starting from the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(STRATEGY_VAR) {
            config.strategy = value.parse().map_err(|_| ConfigError::InvalidVar {
                variable: STRATEGY_VAR,
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup(CACHE_CAPACITY_VAR) {
            let trimmed = value.trim();
            config.cache_capacity = if trimmed.is_empty() || trimmed == "0" {
                None
            } else {
                Some(trimmed.parse().map_err(|_| ConfigError::InvalidVar {
                    variable: CACHE_CAPACITY_VAR,
                    value: value.clone(),
                })?)
            };
        }

        if let Some(value) = lookup(WORKER_NAME_VAR) {
            if !value.trim().is_empty() {
                config.worker_name = value.trim().to_string();
            }
        }

        Ok(config)
    }

    /// Create the computer for the configured strategy.
    ///
    /// Falls back to inline computation if the worker thread cannot start.
    pub fn build_computer(&self) -> Arc<dyn GraphComputer> {
        match self.strategy {
            Strategy::Inline => Arc::new(InlineComputer),
            Strategy::Offloaded => match WorkerComputer::spawn(self.worker_name.clone()) {
                Ok(worker) => Arc::new(worker),
                Err(err) => {
                    warn!(worker = %self.worker_name, error = %err, "could not spawn worker, computing inline");
                    Arc::new(InlineComputer)
                }
            },
        }
    }

    /// A capacity of 0 means unbounded, as it does in the environment.
    pub fn build_cache(&self) -> ResultCache {
        match self.cache_capacity.filter(|capacity| *capacity > 0) {
            Some(capacity) => ResultCache::with_capacity(capacity),
            None => ResultCache::new(),
        }
    }

    pub fn build_dispatcher(&self) -> Dispatcher {
        let computer = self.build_computer();
        info!(
            computer = computer.name(),
            cache_capacity = ?self.cache_capacity,
            "configured dispatcher"
        );
        Dispatcher::new(computer, Arc::new(self.build_cache()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RequestKind;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_offload_with_unbounded_cache() {
        let config = DispatcherConfig::default();
        assert_eq!(config.strategy, Strategy::Offloaded);
        assert_eq!(config.cache_capacity, None);
        assert_eq!(config, DispatcherConfig::from_lookup(lookup(&[])).unwrap());
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = DispatcherConfig::from_json(r#"{"strategy": "inline", "cache_capacity": 16}"#).unwrap();
        assert_eq!(config.strategy, Strategy::Inline);
        assert_eq!(config.cache_capacity, Some(16));
        assert_eq!(config.worker_name, "asset-graph-worker");

        assert!(matches!(
            DispatcherConfig::from_json("{\"strategy\": 3}"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn zero_capacity_is_unbounded_from_either_source() {
        let from_json = DispatcherConfig::from_json(r#"{"cache_capacity": 0}"#).unwrap();
        let from_env = DispatcherConfig::from_lookup(lookup(&[("ASSET_GRAPH_CACHE_CAPACITY", "0")])).unwrap();

        for config in [from_json, from_env] {
            let cache = config.build_cache();
            for key in ["a", "b", "c"] {
                cache.insert(key.to_string(), RequestKind::BuildGraph.empty_result());
            }
            assert_eq!(cache.len(), 3);
        }
    }

    #[test]
    fn environment_overrides() {
        let config = DispatcherConfig::from_lookup(lookup(&[
            ("ASSET_GRAPH_STRATEGY", "Inline"),
            ("ASSET_GRAPH_CACHE_CAPACITY", "64"),
            ("ASSET_GRAPH_WORKER_NAME", "graph-bg"),
        ]))
        .unwrap();

        assert_eq!(config.strategy, Strategy::Inline);
        assert_eq!(config.cache_capacity, Some(64));
        assert_eq!(config.worker_name, "graph-bg");
    }

    #[test]
    fn malformed_environment_is_rejected() {
        let err = DispatcherConfig::from_lookup(lookup(&[("ASSET_GRAPH_CACHE_CAPACITY", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar { variable: "ASSET_GRAPH_CACHE_CAPACITY", .. }
        ));

        let err = DispatcherConfig::from_lookup(lookup(&[("ASSET_GRAPH_STRATEGY", "gpu")])).unwrap_err();
        assert!(err.to_string().contains("gpu"));
    }

    #[tokio::test]
    async fn inline_config_builds_inline_dispatcher() {
        let config = DispatcherConfig {
            strategy: Strategy::Inline,
            cache_capacity: Some(4),
            ..Default::default()
        };
        let dispatcher = config.build_dispatcher();
        assert_eq!(dispatcher.computer().name(), "inline");

        let outcome = dispatcher.build_graph(Vec::new()).await;
        assert!(outcome.delivered().unwrap().is_empty());
    }
}
