//! Configuration loading, spec.md §6 "Configuration".
//!
//! Generalized from the teacher's `mofa-cli::config::loader` search-path
//! layering, but built on the `config` crate's builder rather than
//! hand-rolled YAML/JSON parsing: `orgkernel::RuntimeConfig`'s own doc
//! comment commits to "TOML + `AGENTMESH_`-prefixed environment
//! overrides", and `config` is the ecosystem's crate for exactly that
//! layering.

use crate::error::{CliError, CliResult};
use config::{Config, Environment, File};
use orgkernel::RuntimeConfig;
use std::path::Path;

/// Load a [`RuntimeConfig`], layering (lowest to highest precedence):
/// built-in defaults, an optional TOML file at `path` (or `agentmesh.toml`
/// in the current directory if `path` is `None` and that file exists),
/// then `AGENTMESH_*` environment variables (e.g. `AGENTMESH_MAX_CONCURRENT=8`,
/// `AGENTMESH_CONTEXT_LIMIT__MAX_TOKENS=64000`).
pub fn load(path: Option<&Path>) -> CliResult<RuntimeConfig> {
    let defaults = RuntimeConfig::default();
    let mut builder = Config::builder()
        .set_default("max_concurrent", defaults.max_concurrent as i64)
        .map_err(|e| CliError::Config(e.to_string()))?
        .set_default("max_tool_rounds", defaults.max_tool_rounds as i64)
        .map_err(|e| CliError::Config(e.to_string()))?
        .set_default("persist_debounce_ms", defaults.persist_debounce_ms as i64)
        .map_err(|e| CliError::Config(e.to_string()))?
        .set_default("runtime_dir", defaults.runtime_dir.to_string_lossy().to_string())
        .map_err(|e| CliError::Config(e.to_string()))?
        .set_default("artifacts_dir", defaults.artifacts_dir.to_string_lossy().to_string())
        .map_err(|e| CliError::Config(e.to_string()))?
        .set_default("context_limit.max_tokens", defaults.context_limit.max_tokens as i64)
        .map_err(|e| CliError::Config(e.to_string()))?
        .set_default("context_limit.warning_threshold", defaults.context_limit.warning_threshold as f64)
        .map_err(|e| CliError::Config(e.to_string()))?
        .set_default("context_limit.critical_threshold", defaults.context_limit.critical_threshold as f64)
        .map_err(|e| CliError::Config(e.to_string()))?
        .set_default("context_limit.hard_limit_threshold", defaults.context_limit.hard_limit_threshold as f64)
        .map_err(|e| CliError::Config(e.to_string()))?;

    let candidate = path.map(Path::to_path_buf).unwrap_or_else(|| Path::new("agentmesh.toml").to_path_buf());
    if candidate.exists() {
        builder = builder.add_source(File::from(candidate));
    } else if path.is_some() {
        return Err(CliError::Config(format!("config file not found: {}", candidate.display())));
    }

    let settings = builder
        .add_source(Environment::with_prefix("AGENTMESH").separator("__"))
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    settings.try_deserialize().map_err(|e| CliError::Config(e.to_string()))
}
