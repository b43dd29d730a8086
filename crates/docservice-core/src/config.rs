//! Service configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! `DOCSERVICE_*` environment variables, then whatever the caller sets
//! afterwards (the CLI applies its flags last and calls [`ServiceConfig::validate`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Result, ServiceError};
use crate::infer::InferenceConfig;
use crate::prompts::PromptSet;
use crate::retrieval::RetrievalConfig;
use crate::sandbox::SandboxConfig;

pub const ENV_OLLAMA_URL: &str = "DOCSERVICE_OLLAMA_URL";
pub const ENV_FAST_MODEL: &str = "DOCSERVICE_FAST_MODEL";
pub const ENV_SMART_MODEL: &str = "DOCSERVICE_SMART_MODEL";
pub const ENV_DATA_ROOT: &str = "DOCSERVICE_DATA_ROOT";
pub const ENV_PYTHON: &str = "DOCSERVICE_PYTHON";
pub const ENV_DEADLINE_SECS: &str = "DOCSERVICE_DEADLINE_SECS";
pub const ENV_PROMPTS: &str = "DOCSERVICE_PROMPTS";
pub const ENV_WEB_SEARCH: &str = "DOCSERVICE_WEB_SEARCH";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub inference: InferenceConfig,
    pub sandbox: SandboxConfig,
    pub retrieval: RetrievalConfig,
    /// TOML prompt set; the built-in templates are used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: ServiceConfig = toml::from_str(&raw)?;
        debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Apply `DOCSERVICE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_OLLAMA_URL) {
            self.inference.base_url = url;
        }
        if let Some(model) = get(ENV_FAST_MODEL) {
            self.inference.fast_model = model;
        }
        if let Some(model) = get(ENV_SMART_MODEL) {
            self.inference.smart_model = model;
        }
        if let Some(root) = get(ENV_DATA_ROOT) {
            self.sandbox.data_root = PathBuf::from(root);
        }
        if let Some(python) = get(ENV_PYTHON) {
            self.sandbox.interpreter = python;
        }
        if let Some(raw) = get(ENV_DEADLINE_SECS) {
            self.sandbox.deadline_secs = raw.trim().parse().map_err(|_| {
                ServiceError::Config(format!("{ENV_DEADLINE_SECS} must be a whole number, got '{raw}'"))
            })?;
        }
        if let Some(path) = get(ENV_PROMPTS) {
            self.prompts_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = get(ENV_WEB_SEARCH) {
            self.retrieval.web_enabled = parse_flag(&raw).ok_or_else(|| {
                ServiceError::Config(format!("{ENV_WEB_SEARCH} must be true or false, got '{raw}'"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.inference.base_url.trim().is_empty() {
            return Err(ServiceError::Config("inference.base_url cannot be empty".into()));
        }
        if self.inference.fast_model.trim().is_empty()
            || self.inference.smart_model.trim().is_empty()
        {
            return Err(ServiceError::Config("model names cannot be empty".into()));
        }
        if self.inference.request_timeout_secs == 0 {
            return Err(ServiceError::Config(
                "inference.request_timeout_secs must be greater than zero".into(),
            ));
        }
        self.sandbox
            .validate()
            .map_err(|e| ServiceError::Config(format!("sandbox: {e}")))?;
        self.retrieval.validate()
    }

    /// The configured prompt set, or the built-in one.
    pub fn prompt_set(&self) -> Result<PromptSet> {
        match &self.prompts_path {
            Some(path) => PromptSet::from_toml_file(path),
            None => Ok(PromptSet::builtin()),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.inference.base_url, "http://localhost:11434");
        assert_eq!(config.inference.long_prompt_threshold, 1500);
        assert_eq!(config.sandbox.deadline_secs, 30);
        assert_eq!(config.sandbox.max_concurrent, 1);
        assert_eq!(config.retrieval.max_results, 3);
        assert!(config.prompts_path.is_none());
    }

    #[test]
    fn test_web_search_on_unless_opted_out() {
        let mut config = ServiceConfig::default();
        assert!(config.retrieval.web_enabled);
        assert!(config.retrieval.local_enabled);

        config.apply_env(env(&[(ENV_WEB_SEARCH, "false")])).unwrap();
        assert!(!config.retrieval.web_enabled);

        config.apply_env(env(&[(ENV_WEB_SEARCH, "1")])).unwrap();
        assert!(config.retrieval.web_enabled);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docservice.toml");
        std::fs::write(
            &path,
            r#"
[inference]
smart_model = "qwen2.5-coder:7b"

[sandbox]
deadline_secs = 10
data_root = "/srv/data"
"#,
        )
        .unwrap();

        let config = ServiceConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.inference.smart_model, "qwen2.5-coder:7b");
        assert_eq!(config.inference.fast_model, "llama3.2:latest");
        assert_eq!(config.sandbox.deadline_secs, 10);
        assert_eq!(config.sandbox.data_root, PathBuf::from("/srv/data"));
        assert_eq!(config.sandbox.interpreter, "python3");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        config
            .apply_env(env(&[
                (ENV_OLLAMA_URL, "http://gpu-box:11434"),
                (ENV_DEADLINE_SECS, "5"),
                (ENV_WEB_SEARCH, "off"),
                (ENV_DATA_ROOT, "/tmp/data"),
                (ENV_FAST_MODEL, "   "),
            ]))
            .unwrap();
        assert_eq!(config.inference.base_url, "http://gpu-box:11434");
        assert_eq!(config.sandbox.deadline_secs, 5);
        assert!(!config.retrieval.web_enabled);
        assert_eq!(config.sandbox.data_root, PathBuf::from("/tmp/data"));
        // blank values are ignored
        assert_eq!(config.inference.fast_model, "llama3.2:latest");
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_env(env(&[(ENV_DEADLINE_SECS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_DEADLINE_SECS));

        let err = config
            .apply_env(env(&[(ENV_WEB_SEARCH, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn test_validation_rejects_zero_deadline_and_bad_overlap() {
        let mut config = ServiceConfig::default();
        config.sandbox.deadline_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.retrieval.chunk_overlap = config.retrieval.chunk_size;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.sandbox.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[sandbox\ndeadline_secs = ").unwrap();
        assert!(matches!(
            ServiceConfig::from_toml_file(&path),
            Err(ServiceError::Toml(_))
        ));
    }

    #[test]
    fn test_prompt_set_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.toml");
        let mut prompts = PromptSet::builtin();
        prompts.version = "custom-3".into();
        std::fs::write(&path, toml::to_string(&prompts).unwrap()).unwrap();

        let config = ServiceConfig {
            prompts_path: Some(path),
            ..Default::default()
        };
        assert_eq!(config.prompt_set().unwrap().version, "custom-3");
        assert_eq!(
            ServiceConfig::default().prompt_set().unwrap(),
            PromptSet::builtin()
        );
    }
}
