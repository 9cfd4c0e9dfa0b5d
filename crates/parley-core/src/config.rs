use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};
use crate::features::FeaturizerKind;

/// Top-level configuration for a parley agent.
///
/// Loaded from `~/.parley/config.toml` by default. Each section corresponds
/// to one stage of the message pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub online: OnlineConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would make the pipeline misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.policy.max_history == 0 {
            return Err(ParleyError::Config(
                "policy.max_history must be at least 1".into(),
            ));
        }
        if self.policy.policies.is_empty() {
            return Err(ParleyError::Config(
                "policy.policies must name at least one policy".into(),
            ));
        }
        if self.online.batch_size == 0 {
            return Err(ParleyError::Config(
                "online.batch_size must be at least 1".into(),
            ));
        }
        if self.online.epochs == 0 {
            return Err(ParleyError::Config(
                "online.epochs must be at least 1".into(),
            ));
        }
        if self.online.max_history == 0 {
            return Err(ParleyError::Config(
                "online.max_history must be at least 1".into(),
            ));
        }
        if self.agent.max_number_of_predictions == 0 {
            return Err(ParleyError::Config(
                "agent.max_number_of_predictions must be at least 1".into(),
            ));
        }
        if self.interpreter.kind == InterpreterKind::Http && self.interpreter.server.is_empty() {
            return Err(ParleyError::Config(
                "interpreter.server is required for the http interpreter".into(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Directory the trained dialogue model is persisted to.
    pub model_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            model_dir: "models/dialogue".to_string(),
        }
    }
}

/// Which interpreter turns user text into parse data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpreterKind {
    /// Deterministic `/intent{"entity": "value"}` parser.
    #[default]
    Regex,
    /// Remote NLU HTTP service.
    Http,
}

/// Interpreter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub kind: InterpreterKind,
    /// Base URL of the NLU server, e.g. `http://localhost:5000`.
    pub server: String,
    pub token: Option<String>,
    pub model: Option<String>,
    pub project: Option<String>,
    pub timeout_secs: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            kind: InterpreterKind::Regex,
            server: String::new(),
            token: None,
            model: None,
            project: None,
            timeout_secs: 10,
        }
    }
}

/// Policies that can take part in an ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Memoization,
    Fallback,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Memoization => "memoization",
            PolicyKind::Fallback => "fallback",
        }
    }
}

/// Policy ensemble settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Number of prior turns in each state slice.
    pub max_history: usize,
    pub featurizer: FeaturizerKind,
    /// Ensemble members in priority order.
    pub policies: Vec<PolicyKind>,
    /// NLU confidence below which the fallback policy takes over.
    pub nlu_threshold: f32,
    /// Core confidence below which the fallback policy takes over.
    pub core_threshold: f32,
    pub fallback_action: String,
    /// Extra training dialogues made by gluing random stories together.
    pub augmentation_factor: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_history: 3,
            featurizer: FeaturizerKind::Probabilistic,
            policies: vec![PolicyKind::Memoization, PolicyKind::Fallback],
            nlu_threshold: 0.3,
            core_threshold: 0.3,
            fallback_action: "action_listen".to_string(),
            augmentation_factor: 50,
        }
    }
}

/// Interactive training settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineConfig {
    /// Existing examples sampled alongside each correction.
    pub batch_size: usize,
    /// Incremental fits per correction.
    pub epochs: usize,
    /// Turns of history shown before each proposal.
    pub max_history: usize,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            epochs: 50,
            max_history: 3,
        }
    }
}

/// Message processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on actions executed in response to one message.
    pub max_number_of_predictions: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_number_of_predictions: 10,
        }
    }
}
