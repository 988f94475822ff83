use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Front-end framework a component is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Angular,
    React,
    Vue,
}

impl Framework {
    /// Name used on the wire and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Angular => "angular",
            Framework::React => "react",
            Framework::Vue => "vue",
        }
    }

    /// Mount placeholder used when a bundle ships no `index.html`
    pub fn default_mount(&self) -> &'static str {
        match self {
            Framework::Angular => "<app-root></app-root>",
            Framework::React => r#"<div id="root"></div>"#,
            Framework::Vue => r#"<div id="app"></div>"#,
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a language is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Submitted to the remote judge service
    RemoteJudge { judge_id: u32 },

    /// Compiled by the compile service into a static bundle and previewed
    StaticCompile { framework: Framework },

    /// Run by a dev server inside the virtual environment
    LiveEnvironment { framework: Framework },
}

impl ExecutionStrategy {
    /// Framework targeted by this strategy, if any
    pub fn framework(&self) -> Option<Framework> {
        match self {
            ExecutionStrategy::RemoteJudge { .. } => None,
            ExecutionStrategy::StaticCompile { framework }
            | ExecutionStrategy::LiveEnvironment { framework } => Some(*framework),
        }
    }

    /// Whether runs produce a rendered preview rather than console output
    #[must_use]
    pub fn is_preview(&self) -> bool {
        self.framework().is_some()
    }

    /// Short label for listings
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionStrategy::RemoteJudge { .. } => "remote-judge",
            ExecutionStrategy::StaticCompile { .. } => "static-compile",
            ExecutionStrategy::LiveEnvironment { .. } => "live-environment",
        }
    }
}

/// Status reported by the remote judge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeStatus {
    pub id: u32,
    pub description: String,
}

impl JudgeStatus {
    pub const IN_QUEUE: u32 = 1;
    pub const PROCESSING: u32 = 2;
    pub const ACCEPTED: u32 = 3;
    pub const WRONG_ANSWER: u32 = 4;
    pub const TIME_LIMIT_EXCEEDED: u32 = 5;
    pub const COMPILATION_ERROR: u32 = 6;
    pub const INTERNAL_ERROR: u32 = 13;
    pub const EXEC_FORMAT_ERROR: u32 = 14;

    pub fn new(id: u32, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
        }
    }

    /// Status attached to results synthesized from transport failures
    pub fn internal_error() -> Self {
        Self::new(Self::INTERNAL_ERROR, "Internal Error")
    }

    /// Submission finished without any error
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.id == Self::ACCEPTED
    }

    /// Submission has not finished yet
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.id, Self::IN_QUEUE | Self::PROCESSING)
    }

    /// Program was killed or exited abnormally (ids 7 through 12)
    #[must_use]
    pub fn is_runtime_error(&self) -> bool {
        (7..=12).contains(&self.id)
    }

    #[must_use]
    pub fn is_compilation_error(&self) -> bool {
        self.id == Self::COMPILATION_ERROR
    }
}

impl Default for JudgeStatus {
    fn default() -> Self {
        Self::new(Self::ACCEPTED, "Accepted")
    }
}

/// Decoded result of a remote judge submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Standard output
    #[serde(default)]
    pub stdout: Option<String>,

    /// Standard error
    #[serde(default)]
    pub stderr: Option<String>,

    /// Compiler diagnostics (compiled languages only)
    #[serde(default)]
    pub compile_output: Option<String>,

    /// CPU time in seconds, as reported
    #[serde(default)]
    pub time: Option<String>,

    /// Peak memory in kilobytes
    #[serde(default)]
    pub memory: Option<u64>,

    #[serde(default)]
    pub status: JudgeStatus,
}

impl ExecutionResult {
    /// Result-shaped stand-in for a submission that never reached the judge
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            stderr: Some(message.into()),
            status: JudgeStatus::internal_error(),
            ..Default::default()
        }
    }

    /// Text shown to the user.
    ///
    /// Compile output wins over stderr, which wins over stdout. Empty fields
    /// count as absent.
    pub fn display_text(&self) -> String {
        fn present(field: &Option<String>) -> Option<&str> {
            field.as_deref().filter(|text| !text.is_empty())
        }

        if let Some(compile) = present(&self.compile_output) {
            format!("=== Compilation Error ===\n{compile}")
        } else if let Some(stderr) = present(&self.stderr) {
            format!("=== Error ===\n{stderr}")
        } else if let Some(stdout) = present(&self.stdout) {
            stdout.to_string()
        } else {
            "No output".to_string()
        }
    }
}

/// Files produced by the compile service, keyed by relative path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileBundle {
    files: BTreeMap<String, String>,
}

impl FileBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, replacing any previous content at the same path
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Iterate files in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<(String, String)> for FileBundle {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// A self-contained HTML document ready to be hosted in the sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewDocument {
    html: String,
}

impl PreviewDocument {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn into_html(self) -> String {
        self.html
    }

    pub fn len(&self) -> usize {
        self.html.len()
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty()
    }
}
