/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/config.rs
 * Responsibility: YAML configuration structure, loading, and environment overrides
 */
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub runtime: RuntimeConfig,
    pub toolchain: ToolchainConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub working_directory: PathBuf,
    pub system_prompt: PathBuf,
    pub history_file: PathBuf,
    pub audit_log: PathBuf,
    pub use_functions: bool,
    pub verbose: bool,
    pub allow_unsafe: bool,
    pub max_turns: usize,
    /// Upper bound on a single tool result handed back to the model (0 = unbounded).
    pub max_result_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            working_directory: PathBuf::from("test"),
            system_prompt: PathBuf::from("system_prompt.md"),
            history_file: PathBuf::from(".chat.history"),
            audit_log: PathBuf::from(".function_calls.log"),
            use_functions: true,
            verbose: false,
            allow_unsafe: false,
            max_turns: 25,
            max_result_bytes: 20_000,
        }
    }
}

/// External programs the actions spawn, and their limits.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ToolchainConfig {
    pub cc: String,
    /// Has its own default; never falls back to `cc`.
    pub cxx: String,
    pub python: String,
    pub cargo: String,
    pub command_timeout_secs: u64,
    pub max_file_chars: usize,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cc: "gcc".to_string(),
            cxx: "g++".to_string(),
            python: "python3".to_string(),
            cargo: "cargo".to_string(),
            command_timeout_secs: 30,
            max_file_chars: 10_000,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file at {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// Loads the file when present, otherwise starts from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Environment values win over file values. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("API_KEY") {
            self.llm.api_key = value;
        }
        if let Some(value) = get("BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = get("MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = get("CC") {
            self.toolchain.cc = value;
        }
        if let Some(value) = get("CXX") {
            self.toolchain.cxx = value;
        }
        if let Some(value) = get("PYTHON") {
            self.toolchain.python = value;
        }
        if let Some(value) = get("CARGO") {
            self.toolchain.cargo = value;
        }
        if let Some(value) = get("COMMAND_TIMEOUT") {
            self.toolchain.command_timeout_secs = value
                .trim()
                .parse()
                .with_context(|| format!("COMMAND_TIMEOUT must be a number of seconds, got {:?}", value))?;
        }
        Ok(())
    }

    /// Settings the session cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            bail!("No model configured. Set MODEL or llm.model in the config file.");
        }
        if self.llm.api_key.trim().is_empty() {
            bail!("No API key configured. Set API_KEY or llm.api_key in the config file.");
        }
        if self.toolchain.command_timeout_secs == 0 {
            bail!("toolchain.command_timeout_secs must be greater than zero.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiln.yml");
        fs::write(
            &path,
            "llm:\n  model: local-model\nruntime:\n  working_directory: sandbox\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.runtime.working_directory, PathBuf::from("sandbox"));
        assert_eq!(config.toolchain.cc, "gcc");
        assert!(!config.runtime.allow_unsafe);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = [
            ("CC", "clang"),
            ("COMMAND_TIMEOUT", "5"),
            ("MODEL", "gpt-test"),
            ("API_KEY", ""),
        ]
        .into_iter()
        .collect();

        config
            .apply_env(|key| env.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.toolchain.cc, "clang");
        assert_eq!(config.toolchain.command_timeout_secs, 5);
        assert_eq!(config.llm.model, "gpt-test");
        assert!(config.llm.api_key.is_empty());
    }

    #[test]
    fn test_cxx_does_not_follow_cc() {
        let mut config = Config::default();
        config
            .apply_env(|key| (key == "CC").then(|| "clang".to_string()))
            .unwrap();

        assert_eq!(config.toolchain.cc, "clang");
        assert_eq!(config.toolchain.cxx, "g++");
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "COMMAND_TIMEOUT").then(|| "soon".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_requires_model_and_key() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.llm.model = "m".to_string();
        assert!(config.validate().is_err());

        config.llm.api_key = "k".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(Some(dir.path().join("absent.yml").as_path())).unwrap();
        assert_eq!(config.runtime.max_turns, 25);
    }
}
