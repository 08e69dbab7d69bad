//! Runtime configuration, spec.md §6 "Configuration".
//!
//! Loaded by `orgcli` via the `config` crate (TOML + `AGENTMESH_`-prefixed
//! environment overrides), matching the layering `mofa-cli/src/config`
//! uses for `AgentConfig`. This type only carries the recognised options;
//! `orgcli` owns the file/env loading machinery.

use serde::{Deserialize, Serialize};

/// Token-budget thresholds used by `ConversationManager::getContextStatus`
/// (spec.md §4.6). Expressed as fractions of `max_tokens`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextLimitConfig {
    pub max_tokens: u32,
    pub warning_threshold: f32,
    pub critical_threshold: f32,
    pub hard_limit_threshold: f32,
}

impl Default for ContextLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: 128_000,
            warning_threshold: 0.7,
            critical_threshold: 0.9,
            hard_limit_threshold: 0.95,
        }
    }
}

/// One of the four bands `ConversationManager::getContextStatus` reports
/// (spec.md §4.3 step 1, §4.6, §8 scenario 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    Normal,
    Warning,
    Critical,
    Exceeded,
}

impl ContextLimitConfig {
    /// Classify `used_tokens` against `max_tokens` and the three
    /// thresholds. `>= hard_limit_threshold` is `Exceeded`: the LlmHandler
    /// must refuse to call the LLM until compression makes progress.
    pub fn status_for(&self, used_tokens: u32) -> ContextStatus {
        if self.max_tokens == 0 {
            return ContextStatus::Normal;
        }
        let fraction = used_tokens as f32 / self.max_tokens as f32;
        if fraction >= self.hard_limit_threshold {
            ContextStatus::Exceeded
        } else if fraction >= self.critical_threshold {
            ContextStatus::Critical
        } else if fraction >= self.warning_threshold {
            ContextStatus::Warning
        } else {
            ContextStatus::Normal
        }
    }
}

/// Recognised runtime configuration options (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Scheduler handler cap (spec.md §4.2).
    pub max_concurrent: usize,
    /// Tool-loop budget per turn (spec.md §4.3 step 8).
    pub max_tool_rounds: u32,
    pub context_limit: ContextLimitConfig,
    /// Debounce window for conversation/org persistence flushes, in ms.
    pub persist_debounce_ms: u64,
    pub runtime_dir: std::path::PathBuf,
    pub artifacts_dir: std::path::PathBuf,
    pub default_llm_service_id: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_tool_rounds: 200,
            context_limit: ContextLimitConfig::default(),
            persist_debounce_ms: 500,
            runtime_dir: std::path::PathBuf::from("./agentmesh-runtime"),
            artifacts_dir: std::path::PathBuf::from("./agentmesh-runtime/artifacts"),
            default_llm_service_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bands_match_default_thresholds() {
        let cfg = ContextLimitConfig::default();
        assert_eq!(cfg.status_for(1_000), ContextStatus::Normal);
        assert_eq!(cfg.status_for((128_000.0 * 0.8) as u32), ContextStatus::Warning);
        assert_eq!(cfg.status_for((128_000.0 * 0.92) as u32), ContextStatus::Critical);
        assert_eq!(cfg.status_for((128_000.0 * 0.96) as u32), ContextStatus::Exceeded);
    }

    #[test]
    fn scenario_6_exact_fraction_is_exceeded() {
        let cfg = ContextLimitConfig::default();
        let used = (128_000.0 * 0.96) as u32;
        assert_eq!(cfg.status_for(used), ContextStatus::Exceeded);
    }
}
