//! Configuration file loading for codepad
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use url::Url;

use crate::config::{Config, ConfigError, EXAMPLE_CONFIG};

/// Prefix of environment variables overriding configuration values,
/// e.g. `CODEPAD__SERVICES__JUDGE_URL`.
const ENV_PREFIX: &str = "CODEPAD";

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration the way the CLI does.
    ///
    /// Uses the given file, or the embedded example when none is given, and
    /// applies `CODEPAD__*` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = match path {
            Some(path) => ConfigBuilder::builder().add_source(File::from(path)),
            None => {
                ConfigBuilder::builder().add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml))
            }
        };

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("judge_url", &self.services.judge_url),
            ("compile_url", &self.services.compile_url),
        ] {
            Url::parse(value).map_err(|e| {
                ConfigError::Invalid(format!("services.{name} '{value}' is not a valid URL: {e}"))
            })?;
        }

        if !(self.services.request_timeout.is_finite() && self.services.request_timeout > 0.0) {
            return Err(ConfigError::Invalid(
                "services.request_timeout must be a positive number of seconds".to_owned(),
            ));
        }

        if self.environment.install_command.is_empty() {
            return Err(ConfigError::Invalid(
                "environment.install_command is empty".to_owned(),
            ));
        }
        if self.environment.start_command.is_empty() {
            return Err(ConfigError::Invalid(
                "environment.start_command is empty".to_owned(),
            ));
        }

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
        }

        if let Some(ref id) = self.default_language
            && !self.languages.contains_key(id)
        {
            return Err(ConfigError::Invalid(format!(
                "default_language '{id}' is not in the language catalog"
            )));
        }

        Ok(())
    }
}
