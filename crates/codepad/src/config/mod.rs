use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{FileExtension, Language, LanguageDescriptor};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../codepad.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for codepad
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Remote backend endpoints
    #[serde(default)]
    pub services: ServiceConfig,

    /// Virtual environment used for live dev-server previews
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Language selected when none is given explicitly
    #[serde(default)]
    pub default_language: Option<String>,

    /// Language catalog keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

/// Endpoints of the remote judge and compile services
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the remote judge (submissions are posted below it)
    #[serde(default = "default_judge_url")]
    pub judge_url: String,

    /// Base URL of the framework compile service
    #[serde(default = "default_compile_url")]
    pub compile_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            judge_url: default_judge_url(),
            compile_url: default_compile_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Settings for the live virtual environment
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// Host directory backing the local machine's filesystem
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// Dependency install command
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,

    /// Dev server start command
    #[serde(default = "default_start_command")]
    pub start_command: Vec<String>,

    /// Delay between the server-ready signal and binding the preview, in milliseconds.
    ///
    /// Dev servers report readiness slightly before they serve the first page.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl EnvironmentConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            install_command: default_install_command(),
            start_command: default_start_command(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl Config {
    /// Create a new config with the embedded language catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            services: ServiceConfig::default(),
            environment: EnvironmentConfig::default(),
            default_language: None,
            languages: HashMap::new(),
        }
    }

    /// Get a language by ID
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Get the router-facing descriptor for a language ID
    pub fn descriptor(&self, id: &str) -> Result<LanguageDescriptor, ConfigError> {
        self.get_language(id).map(|lang| lang.descriptor(id))
    }

    /// Descriptor for the configured default language, if any
    pub fn default_descriptor(&self) -> Option<LanguageDescriptor> {
        let id = self.default_language.as_deref()?;
        self.descriptor(id).ok()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_judge_url() -> String {
    "http://localhost/judge0".to_owned()
}

fn default_compile_url() -> String {
    "http://localhost/front-compiler".to_owned()
}

fn default_request_timeout() -> f64 {
    30.0
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".codepad/environment")
}

fn default_install_command() -> Vec<String> {
    vec!["npm".to_owned(), "install".to_owned()]
}

fn default_start_command() -> Vec<String> {
    vec!["npm".to_owned(), "run".to_owned(), "dev".to_owned()]
}

fn default_settle_delay_ms() -> u64 {
    1500
}
