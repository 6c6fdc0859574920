//! Configuration
//!
//! Defaults live in a `serde_json::Value` tree. An optional YAML override is
//! merged over it (mappings recursively, everything else replaced) and the
//! merged tree is deserialized into typed settings. The raw tree is kept so
//! later overrides can be merged over the live configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::agent::Mode;
use crate::error::{AgentError, Result};
use crate::provider::GenerationOptions;

/// Default specialist pipeline
pub const DEFAULT_ROLES: [&str; 4] = ["researcher", "planner", "executor", "critic"];

/// The built-in configuration tree
pub fn default_config() -> Value {
    json!({
        "agent": {
            "name": "jafs",
            "mode": "single",
            "max_iterations": 10,
            "complexity_threshold": 7
        },
        "memory": {
            "short_term": {
                "capacity": 1000,
                "ttl": 3600
            },
            "long_term": {
                "enabled": true,
                "storage_path": null,
                "index_in_memory": true
            }
        },
        "models": {
            "default": {
                "provider": "ollama",
                "model": "llama3.2",
                "temperature": 0.0
            }
        },
        "tools": {
            "enabled": []
        },
        "specialized_agents": {
            "roles": DEFAULT_ROLES
        }
    })
}

/// Right-biased deep merge.
///
/// When both sides are mappings, keys are merged recursively: keys only in
/// `base` survive, keys only in `overlay` are added. Any other pairing takes
/// the overlay value.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                let next = match merged.get(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value)
                    }
                    _ => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub name: String,
    pub mode: Mode,
    pub max_iterations: usize,
    pub complexity_threshold: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShortTermSettings {
    pub capacity: usize,
    /// Seconds
    pub ttl: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LongTermSettings {
    pub enabled: bool,
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    pub index_in_memory: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemorySettings {
    pub short_term: ShortTermSettings,
    pub long_term: LongTermSettings,
}

/// Model selection for one provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Provider endpoint, e.g. `http://localhost:11434`
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelsSettings {
    pub default: ModelSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    pub enabled: Vec<String>,
}

/// `specialized_agents`: the role list plus per-role override blocks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecialistSettings {
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub overrides: BTreeMap<String, Value>,
}

/// Resolved settings for one specialized agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleSettings {
    pub name: String,
    pub max_iterations: usize,
    pub tools: Vec<String>,
}

/// Typed view of the merged configuration tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub agent: AgentSettings,
    pub memory: MemorySettings,
    pub models: ModelsSettings,
    pub tools: ToolSettings,
    pub specialized_agents: SpecialistSettings,
    #[serde(skip)]
    raw: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentSettings {
                name: "jafs".into(),
                mode: Mode::Single,
                max_iterations: 10,
                complexity_threshold: 7,
            },
            memory: MemorySettings {
                short_term: ShortTermSettings {
                    capacity: 1000,
                    ttl: 3600,
                },
                long_term: LongTermSettings {
                    enabled: true,
                    storage_path: None,
                    index_in_memory: true,
                },
            },
            models: ModelsSettings {
                default: ModelSettings {
                    provider: "ollama".into(),
                    model: "llama3.2".into(),
                    temperature: 0.0,
                    max_tokens: None,
                    base_url: None,
                },
            },
            tools: ToolSettings { enabled: vec![] },
            specialized_agents: SpecialistSettings {
                roles: DEFAULT_ROLES.iter().map(ToString::to_string).collect(),
                overrides: BTreeMap::new(),
            },
            raw: default_config(),
        }
    }
}

impl Config {
    /// Deserialize a complete configuration tree
    pub fn from_value(raw: Value) -> Result<Self> {
        let mut config: Self = serde_json::from_value(raw.clone())
            .map_err(|e| AgentError::Config(format!("invalid configuration: {e}")))?;
        config.raw = raw;
        Ok(config)
    }

    /// Merge `overlay` over the built-in defaults
    pub fn with_override(overlay: &Value) -> Result<Self> {
        Self::default().merged(overlay)
    }

    /// Merge `overlay` over this configuration, producing a new one
    pub fn merged(&self, overlay: &Value) -> Result<Self> {
        if !overlay.is_object() {
            return Err(AgentError::Config(
                "configuration override must be a mapping".into(),
            ));
        }
        Self::from_value(merge(&self.raw, overlay))
    }

    /// Read a YAML override file and merge it over the defaults
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let overlay: Value = serde_yaml::from_str(&text)?;
        Self::with_override(&overlay)
    }

    /// Like [`Config::try_load`], but any failure falls back to defaults
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using default configuration");
            return Self::default();
        }

        match Self::try_load(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Error loading config, using default configuration");
                Self::default()
            }
        }
    }

    /// The merged configuration tree
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    /// YAML rendering of the merged tree
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.raw)?)
    }

    /// Settings for a specialized role.
    ///
    /// The role default `{name: "<role>-agent", max_iterations, tools}` is
    /// derived from the primary agent's budget and the enabled tool list, and
    /// the `specialized_agents.<role>` block is merged over it.
    pub fn role_settings(&self, role: &str, primary_max_iterations: usize) -> Result<RoleSettings> {
        let defaults = json!({
            "name": format!("{role}-agent"),
            "max_iterations": primary_max_iterations,
            "tools": self.tools.enabled,
        });
        let merged = match self.specialized_agents.overrides.get(role) {
            Some(block) => merge(&defaults, block),
            None => defaults,
        };
        serde_json::from_value(merged)
            .map_err(|e| AgentError::Config(format!("invalid settings for role '{role}': {e}")))
    }

    /// Generation options for the default model
    pub fn generation_options(&self) -> GenerationOptions {
        let model = &self.models.default;
        GenerationOptions {
            model: model.model.clone(),
            temperature: model.temperature,
            max_tokens: model.max_tokens,
            ..GenerationOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tree_matches_typed_default() {
        assert_eq!(Config::from_value(default_config()).unwrap(), Config::default());
    }

    #[test]
    fn test_merge_is_right_biased_and_recursive() {
        let base = json!({"a": 1, "nested": {"x": 1, "y": 2}, "only_base": true});
        let overlay = json!({"a": 2, "nested": {"y": 3, "z": 4}, "only_overlay": "new"});

        let merged = merge(&base, &overlay);

        assert_eq!(
            merged,
            json!({
                "a": 2,
                "nested": {"x": 1, "y": 3, "z": 4},
                "only_base": true,
                "only_overlay": "new"
            })
        );
    }

    #[test]
    fn test_merge_replaces_non_mappings() {
        let base = json!({"tools": {"enabled": ["calculate"]}, "agent": {"name": "jafs"}});
        let overlay = json!({"tools": {"enabled": ["datetime"]}, "agent": "flat"});

        let merged = merge(&base, &overlay);

        assert_eq!(merged["tools"]["enabled"], json!(["datetime"]));
        assert_eq!(merged["agent"], json!("flat"));
    }

    #[test]
    fn test_override_keeps_unmentioned_defaults() {
        let config = Config::with_override(&json!({
            "agent": {"mode": "auto", "max_iterations": 4},
            "models": {"default": {"max_tokens": 512}}
        }))
        .unwrap();

        assert_eq!(config.agent.mode, Mode::Auto);
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(config.agent.name, "jafs");
        assert_eq!(config.agent.complexity_threshold, 7);
        assert_eq!(config.models.default.model, "llama3.2");
        assert_eq!(config.generation_options().max_tokens, Some(512));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/definitely/not/here/config.yaml");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "agent:\n  mode: multi\ntools:\n  enabled: [calculate, datetime]\n",
        )
        .unwrap();

        let config = Config::load(&path);

        assert_eq!(config.agent.mode, Mode::Multi);
        assert_eq!(config.tools.enabled, vec!["calculate", "datetime"]);
        assert_eq!(config.memory.short_term.capacity, 1000);
    }

    #[test]
    fn test_load_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "agent: [unclosed").unwrap();
        assert_eq!(Config::load(&path), Config::default());

        // A valid document that is not a mapping is rejected too
        std::fs::write(&path, "- just\n- a list\n").unwrap();
        assert!(Config::try_load(&path).is_err());
        assert_eq!(Config::load(&path), Config::default());
    }

    #[test]
    fn test_role_settings_merge_over_role_default() {
        let config = Config::with_override(&json!({
            "tools": {"enabled": ["calculate"]},
            "specialized_agents": {
                "critic": {"max_iterations": 2, "name": "reviewer"}
            }
        }))
        .unwrap();

        let critic = config.role_settings("critic", 10).unwrap();
        assert_eq!(critic.name, "reviewer");
        assert_eq!(critic.max_iterations, 2);
        assert_eq!(critic.tools, vec!["calculate"]);

        let planner = config.role_settings("planner", 10).unwrap();
        assert_eq!(planner.name, "planner-agent");
        assert_eq!(planner.max_iterations, 10);
    }

    #[test]
    fn test_merged_builds_on_live_config() {
        let first = Config::with_override(&json!({"agent": {"max_iterations": 3}})).unwrap();
        let second = first.merged(&json!({"agent": {"name": "other"}})).unwrap();

        assert_eq!(second.agent.max_iterations, 3);
        assert_eq!(second.agent.name, "other");
        assert!(first.merged(&json!(null)).is_err());
    }
}
