//! Configuration for generation, retries, and the Python interpreter.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables (a `.env` file in the working directory is loaded
//! first). The CLI applies its flags on top.

use crate::errors::BlockflowError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Which OpenAI-compatible endpoint the generation client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiMode {
    /// `POST {api_base}/chat/completions`.
    #[default]
    Chat,
    /// Legacy `POST {api_base}/completions`.
    Completion,
}

/// Backoff strategy between generation attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Settings for talking to the code-generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key, if the service needs one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Endpoint flavour.
    #[serde(default)]
    pub api_mode: ApiMode,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens in the completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_seconds: f64,
    /// How many blocks may be generated at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Substitute a pass-through stub when every attempt fails.
    #[serde(default)]
    pub stub_on_failure: bool,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_generation_timeout() -> f64 {
    60.0
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: default_model(),
            api_mode: ApiMode::default(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_generation_timeout(),
            max_concurrency: default_max_concurrency(),
            stub_on_failure: false,
        }
    }
}

impl GenerationSettings {
    /// Gets the request timeout as a `Duration`.
    ///
    /// Fails when `timeout_seconds` is not a positive, representable number.
    pub fn timeout(&self) -> Result<Duration, BlockflowError> {
        seconds_to_duration("generation.timeout_seconds", self.timeout_seconds)
    }
}

/// Bounded retry policy for code generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per block, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Randomize each delay between half and the full value.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffStrategy::default(),
            jitter: default_jitter(),
        }
    }
}

/// Settings for the Python interpreter that runs stored functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterSettings {
    /// Interpreter executable.
    #[serde(default = "default_python")]
    pub python: String,
    /// Per-call timeout in seconds; `None` waits indefinitely.
    #[serde(default = "default_interpreter_timeout")]
    pub timeout_seconds: Option<f64>,
    /// Working directory for block functions.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_python() -> String {
    "python3".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_interpreter_timeout() -> Option<f64> {
    Some(300.0)
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_seconds: default_interpreter_timeout(),
            working_dir: None,
        }
    }
}

impl InterpreterSettings {
    /// Gets the per-call timeout as a `Duration`; `None` waits indefinitely.
    pub fn timeout(&self) -> Result<Option<Duration>, BlockflowError> {
        self.timeout_seconds
            .map(|s| seconds_to_duration("interpreter.timeout_seconds", s))
            .transpose()
    }
}

fn seconds_to_duration(field: &str, seconds: f64) -> Result<Duration, BlockflowError> {
    if seconds > 0.0 {
        if let Ok(duration) = Duration::try_from_secs_f64(seconds) {
            return Ok(duration);
        }
    }
    Err(BlockflowError::Config(format!(
        "{field} must be a positive number of seconds, got {seconds}"
    )))
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Generation service settings.
    #[serde(default)]
    pub generation: GenerationSettings,
    /// Generation retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Interpreter settings.
    #[serde(default)]
    pub interpreter: InterpreterSettings,
    /// Directory generated functions are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("blocks")
}

impl Settings {
    /// Parses settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, BlockflowError> {
        toml::from_str(text).map_err(|e| BlockflowError::Config(e.to_string()))
    }

    /// Reads settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BlockflowError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BlockflowError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads settings: defaults or `path`, then `.env`, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, BlockflowError> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };

        match dotenvy::dotenv() {
            Ok(file) => debug!(path = %file.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(BlockflowError::Config(format!(".env: {e}"))),
        }

        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), BlockflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.generation.api_key = Some(key);
        }
        if let Some(base) = non_empty("OPENAI_API_BASE") {
            self.generation.api_base = base;
        }
        if let Some(model) = non_empty("LLM_MODEL") {
            self.generation.model = model;
        }
        if let Some(python) = non_empty("BLOCKFLOW_PYTHON") {
            self.interpreter.python = python;
        }
        if let Some(dir) = non_empty("BLOCKFLOW_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(attempts) = non_empty("BLOCKFLOW_MAX_ATTEMPTS") {
            self.retry.max_attempts = attempts.trim().parse().map_err(|_| {
                BlockflowError::Config(format!(
                    "BLOCKFLOW_MAX_ATTEMPTS must be a positive integer, got '{attempts}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Rejects settings that would hang or never make progress.
    pub fn validate(&self) -> Result<(), BlockflowError> {
        self.generation.timeout()?;
        if self.generation.max_concurrency == 0 {
            return Err(BlockflowError::Config(
                "generation.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(BlockflowError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        self.interpreter.timeout()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.generation.max_concurrency, 4);
        assert_eq!(settings.generation.api_mode, ApiMode::Chat);
        assert_eq!(settings.interpreter.python, "python3");
        assert_eq!(settings.output_dir, PathBuf::from("blocks"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
output_dir = "generated"

[generation]
model = "local-coder"
api_mode = "completion"

[retry]
max_attempts = 5
backoff = "linear"
"#,
        )
        .unwrap();

        assert_eq!(settings.output_dir, PathBuf::from("generated"));
        assert_eq!(settings.generation.model, "local-coder");
        assert_eq!(settings.generation.api_mode, ApiMode::Completion);
        assert_eq!(settings.generation.timeout_seconds, 60.0);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.backoff, BackoffStrategy::Linear);
        assert_eq!(settings.retry.base_delay_ms, 500);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Settings::from_toml_str("[generation\nmodel = 1").unwrap_err();
        assert!(matches!(err, BlockflowError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_API_BASE", "http://localhost:8080/v1"),
            ("LLM_MODEL", ""),
            ("BLOCKFLOW_MAX_ATTEMPTS", "7"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_env(|k| env.get(k).map(ToString::to_string))
            .unwrap();

        assert_eq!(settings.generation.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.generation.api_base, "http://localhost:8080/v1");
        // Empty values do not override.
        assert_eq!(settings.generation.model, "gpt-4o-mini");
        assert_eq!(settings.retry.max_attempts, 7);
    }

    #[test]
    fn test_bad_attempts_env_is_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(|k| (k == "BLOCKFLOW_MAX_ATTEMPTS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("BLOCKFLOW_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut settings = Settings::default();
        settings.generation.max_concurrency = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retry.max_attempts = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.generation.timeout_seconds = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_timeouts_are_config_errors() {
        for seconds in [1e30, -5.0, f64::NAN, f64::INFINITY] {
            let mut settings = Settings::default();
            settings.generation.timeout_seconds = seconds;
            assert!(
                matches!(settings.validate(), Err(BlockflowError::Config(_))),
                "generation timeout {seconds}"
            );
            assert!(settings.generation.timeout().is_err());

            let mut settings = Settings::default();
            settings.interpreter.timeout_seconds = Some(seconds);
            assert!(
                matches!(settings.validate(), Err(BlockflowError::Config(_))),
                "interpreter timeout {seconds}"
            );
        }
    }

    #[test]
    fn test_timeouts_from_toml() {
        let settings = Settings::from_toml_str(
            "[generation]\ntimeout_seconds = 1e30\n[interpreter]\ntimeout_seconds = 2.5\n",
        )
        .unwrap();
        assert!(settings.validate().is_err());
        assert_eq!(
            settings.interpreter.timeout().unwrap(),
            Some(Duration::from_millis(2500))
        );

        let unbounded = InterpreterSettings {
            timeout_seconds: None,
            ..InterpreterSettings::default()
        };
        assert_eq!(unbounded.timeout().unwrap(), None);
    }
}
