//! Tracer configuration.
//!
//! A [`TracerConfig`] can be built in code, loaded from a JSON or YAML file,
//! and overridden from the environment. Precedence (highest to lowest):
//!
//! 1. Environment variables (`ARVAK_TRACE_*`)
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{TraceError, TraceResult};
use crate::ids::{Duration, OpId};

/// Environment variable overriding the preferred layer duration.
pub const ENV_PREFERRED_DURATION: &str = "ARVAK_TRACE_PREFERRED_DURATION";

/// Construction parameters of a tracing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Minimum duration of every layer the tracer creates.
    #[serde(default = "default_preferred_layer_duration")]
    pub preferred_layer_duration: Duration,

    /// Display names for operation ids, used as report column headers.
    #[serde(default)]
    pub op_names: BTreeMap<OpId, String>,
}

fn default_preferred_layer_duration() -> Duration {
    1
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            preferred_layer_duration: default_preferred_layer_duration(),
            op_names: BTreeMap::new(),
        }
    }
}

impl TracerConfig {
    /// Create a configuration with the given preferred layer duration.
    pub fn new(preferred_layer_duration: Duration) -> Self {
        Self {
            preferred_layer_duration,
            op_names: BTreeMap::new(),
        }
    }

    /// Register a display name for an operation id.
    #[must_use]
    pub fn with_op_name(mut self, op: impl Into<OpId>, name: impl Into<String>) -> Self {
        self.op_names.insert(op.into(), name.into());
        self
    }

    /// Register several display names at once.
    #[must_use]
    pub fn with_op_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = (OpId, S)>,
        S: Into<String>,
    {
        self.op_names
            .extend(names.into_iter().map(|(op, name)| (op, name.into())));
        self
    }

    /// Set the preferred layer duration.
    #[must_use]
    pub fn with_preferred_layer_duration(mut self, duration: Duration) -> Self {
        self.preferred_layer_duration = duration;
        self
    }

    /// Parse a configuration from JSON text.
    pub fn from_json_str(source: &str) -> TraceResult<Self> {
        serde_json::from_str(source).map_err(|e| TraceError::Config(e.to_string()))
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(source: &str) -> TraceResult<Self> {
        serde_yaml_ng::from_str(source).map_err(|e| TraceError::Config(e.to_string()))
    }

    /// Load a configuration file. `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TraceResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TraceError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        if is_json(path) {
            Self::from_json_str(&contents)
        } else {
            Self::from_yaml_str(&contents)
        }
    }

    /// Apply `ARVAK_TRACE_*` environment overrides. Unset variables leave the
    /// current values untouched.
    pub fn merge_env(mut self) -> TraceResult<Self> {
        if let Ok(v) = std::env::var(ENV_PREFERRED_DURATION) {
            self.preferred_layer_duration = v.trim().parse().map_err(|_| {
                TraceError::Config(format!(
                    "{ENV_PREFERRED_DURATION} must be a non-negative integer, got '{v}'"
                ))
            })?;
        }
        Ok(self)
    }

    /// Display name of an operation: the registered name or the raw id.
    pub fn op_name(&self, op: OpId) -> String {
        self.op_names
            .get(&op)
            .cloned()
            .unwrap_or_else(|| op.to_string())
    }
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}
