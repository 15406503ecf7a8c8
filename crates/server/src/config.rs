//! Server configuration

use anyhow::Result;
use serde::Deserialize;

/// Prediction server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name used in structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base directory of the model artifact store
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Maximum number of entries in the prediction cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Number of features per sample, fixed per deployment
    #[serde(default = "default_feature_dim")]
    pub feature_dim: usize,
}

fn default_instance_name() -> String {
    std::env::var("INSTANCE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_dir() -> String {
    "/var/lib/prediction/models".to_string()
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_feature_dim() -> usize {
    12
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SERVING"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| ServerConfig {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            model_dir: default_model_dir(),
            cache_capacity: default_cache_capacity(),
            feature_dim: default_feature_dim(),
        }))
    }
}
