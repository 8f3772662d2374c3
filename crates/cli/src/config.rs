//! Configuration management for the CLI
//!
//! Settings are layered, later sources winning:
//! - `<config dir>/optimize/config.json` when present
//! - `OPTIMIZE_*` environment variables
//! - command line flags

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Address of the optimization service when nothing else is configured
pub const DEFAULT_API_URL: &str = "https://api.stormforge.io/v1/";

const REDACTED: &str = "REDACTED";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Optimization service URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Bearer token sent to the optimization service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Namespace used when listing cluster experiments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_namespace: Option<String>,
}

impl Config {
    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a (possibly missing) file and the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("OPTIMIZE"))
            .build()
            .with_context(|| format!("Failed to read config file {}", path.display()))?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs_next::config_dir().context("Could not determine config directory")?;
        Ok(dir.join("optimize").join("config.json"))
    }

    /// The service URL, falling back to the public endpoint
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Apply command line overrides
    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        if api_url.is_some() {
            self.api_url = api_url;
        }
        self
    }

    /// A copy that is safe to print
    pub fn redacted(&self) -> Self {
        Self {
            token: self.token.as_ref().map(|_| REDACTED.to_string()),
            ..self.clone()
        }
    }
}

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Ok(PathBuf::from(path));
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".kube").join("config"))
}

/// Connect to the cluster named by the kubeconfig, or the in-cluster
/// service account when there is no kubeconfig file
pub async fn kube_client(override_path: Option<&str>) -> Result<kube::Client> {
    let path = kubeconfig_path(override_path)?;
    let config = if path.exists() {
        let kubeconfig = kube::config::Kubeconfig::read_from(&path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        kube::Config::from_custom_kubeconfig(kubeconfig, &kube::config::KubeConfigOptions::default())
            .await
            .context("Invalid kubeconfig")?
    } else {
        kube::Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?
    };
    kube::Client::try_from(config).context("Failed to create Kubernetes client")
}
