use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::{ExecutionStrategy, Framework};

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Catalog entry for a language or framework
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name (e.g., "Python (3.8.1)")
    pub name: String,

    /// File extension used for the editor buffer
    pub extension: FileExtension,

    /// How runs of this language are executed
    pub strategy: ExecutionStrategy,

    /// Starter code shown when the language is selected
    #[serde(default)]
    pub template: String,
}

impl Language {
    /// Build the immutable descriptor the router works with
    pub fn descriptor(&self, id: &str) -> LanguageDescriptor {
        LanguageDescriptor {
            id: id.to_owned(),
            name: self.name.clone(),
            extension: self.extension.to_string(),
            strategy: self.strategy,
            template: self.template.clone(),
        }
    }
}

/// Immutable snapshot of a catalog entry, keyed by its catalog id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageDescriptor {
    pub id: String,
    pub name: String,
    pub extension: String,
    pub strategy: ExecutionStrategy,
    pub template: String,
}

impl LanguageDescriptor {
    /// Descriptor for ad-hoc use outside the catalog
    pub fn new(id: impl Into<String>, strategy: ExecutionStrategy) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            extension: String::new(),
            strategy,
            template: String::new(),
        }
    }

    pub fn framework(&self) -> Option<Framework> {
        self.strategy.framework()
    }
}

/// File extension without dot (e.g., "tsx")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
