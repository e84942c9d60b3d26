//! Server configuration

use anyhow::Context;
use beruang_classifiers::{ArtifactSource, DeviceSpec, RoutingConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::cli::ServeArgs;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,

    /// Transaction (category/subcategory) model artifacts
    #[serde(default = "default_transaction_model")]
    pub transaction_model: ArtifactSource,

    /// Intent model artifacts
    #[serde(default = "default_intent_model")]
    pub intent_model: ArtifactSource,

    /// Inference device
    #[serde(default)]
    pub device: DeviceSpec,

    /// Decision thresholds, guardrail lists, and fallbacks
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, args: &ServeArgs) -> anyhow::Result<Self> {
        let mut config = Self::from_file_or_default(config_path)?;

        if let Some(listen) = &args.listen {
            config.listen = listen.clone();
        }

        if let Some(port) = args.port {
            config.port = port;
        }

        if let Some(path) = &args.transaction_model {
            config.transaction_model = ArtifactSource::local(path);
        }

        if let Some(path) = &args.intent_model {
            config.intent_model = ArtifactSource::local(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Read the YAML file when it exists, otherwise start from defaults
    pub fn from_file_or_default(config_path: &str) -> anyhow::Result<Self> {
        if !Path::new(config_path).exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid configuration in {}", config_path))
    }

    pub fn from_yaml(yaml: &str) -> beruang_core::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| {
            beruang_core::Error::config(format!("Failed to parse server config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> beruang_core::Result<()> {
        if self.body_limit == 0 {
            return Err(beruang_core::Error::config("body_limit must be positive"));
        }
        self.routing.validate()
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.listen, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.listen, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            body_limit: default_body_limit(),
            transaction_model: default_transaction_model(),
            intent_model: default_intent_model(),
            device: DeviceSpec::default(),
            routing: RoutingConfig::default(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    100 * 1024
}

fn default_transaction_model() -> ArtifactSource {
    ArtifactSource::local("models/transaction")
}

fn default_intent_model() -> ArtifactSource {
    ArtifactSource::local("models/intent")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ServerConfig::load("does-not-exist.yaml", &ServeArgs::default()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.routing.ood.escalation_label, "COMPLEX_ADVICE");
        assert!(matches!(config.device, DeviceSpec::Cpu));
    }

    #[test]
    fn test_yaml_and_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
port: 3000
intent_model:
  type: huggingface
  repo: beruang/intent
routing:
  ood:
    global_threshold: 0.9
    class_thresholds:
      NAV_HOME: 0.5
"#,
        )
        .unwrap();

        let args = ServeArgs {
            port: Some(9000),
            transaction_model: Some("/tmp/tx".into()),
            ..Default::default()
        };
        let config = ServerConfig::load(path.to_str().unwrap(), &args).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.routing.ood.global_threshold, 0.9);
        assert_eq!(config.routing.ood.threshold_for("NAV_HOME"), 0.5);
        assert!(matches!(
            &config.intent_model,
            ArtifactSource::HuggingFace { repo, revision } if repo == "beruang/intent" && revision == "main"
        ));
        assert!(matches!(&config.transaction_model, ArtifactSource::Local { .. }));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = ServerConfig::from_yaml("routing:\n  ood:\n    global_threshold: 1.5\n")
            .err()
            .unwrap();
        assert!(matches!(err, beruang_core::Error::Config(_)));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            listen: "127.0.0.1".to_string(),
            port: 8081,
            ..Default::default()
        };
        assert_eq!(config.socket_addr().unwrap().port(), 8081);
    }

    #[test]
    fn test_demo_config_parses() {
        let config = ServerConfig::from_yaml(include_str!("../../../demos/config.yaml")).unwrap();
        assert_eq!(config.routing.ood.threshold_for("COMPLEX_ADVICE"), 0.5);
        assert_eq!(config.routing.fallback.subcategory, "Others");
    }
}
