//! HTTP client for the framework compile service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ServiceConfig;
use crate::services::{CompilationError, CompileService, CompileServiceError};
use crate::types::{FileBundle, Framework};

/// Log reported when a failed response carries neither `logs` nor `error`
pub const UNKNOWN_COMPILATION_ERROR: &str = "Unknown Compilation Error";

/// Marker the service appends to its build log
const COMPLETION_MARKER: &str = "COMPILATION_COMPLETE";

/// Vite's clear-screen sequence
const CLEAR_SCREEN: &str = "\x1b[1;1H\x1b[0J";

#[derive(Debug, Serialize)]
struct CompileRequest<'a> {
    code: &'a str,
    framework: Framework,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompileResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    files: Option<FileBundle>,
    #[serde(default)]
    compilation_time: Option<f64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    logs: Option<String>,
}

impl CompileResponse {
    fn failure_log(self) -> String {
        self.logs
            .filter(|log| !log.is_empty())
            .or(self.error.filter(|err| !err.is_empty()))
            .unwrap_or_else(|| UNKNOWN_COMPILATION_ERROR.to_owned())
    }
}

/// Compile service reached over HTTP
#[derive(Debug, Clone)]
pub struct CompileClient {
    client: Client,
    endpoint: Url,
}

impl CompileClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CompileServiceError> {
        let endpoint = Url::parse(&format!("{}/compile", base_url.trim_end_matches('/')))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(services: &ServiceConfig) -> Result<Self, CompileServiceError> {
        Self::new(&services.compile_url, services.timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl CompileService for CompileClient {
    #[instrument(skip(self, source), fields(endpoint = %self.endpoint))]
    async fn submit(
        &self,
        source: &str,
        framework: Framework,
    ) -> Result<FileBundle, CompileServiceError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&CompileRequest {
                code: source,
                framework,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_response(status.is_success(), &body)
    }
}

/// Interpret a compile service body. Failed compilations are usually sent
/// with an error status, so the body is read either way.
fn parse_response(http_ok: bool, body: &str) -> Result<FileBundle, CompileServiceError> {
    let parsed: CompileResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) if http_ok => return Err(CompileServiceError::Malformed(e.to_string())),
        Err(_) => {
            warn!("compile service returned a non-JSON error body");
            let log = if body.trim().is_empty() {
                UNKNOWN_COMPILATION_ERROR
            } else {
                body
            };
            return Err(CompilationError::new(log).into());
        }
    };

    if !parsed.success {
        return Err(CompilationError::new(parsed.failure_log()).into());
    }

    let compilation_time = parsed.compilation_time;
    let files = parsed
        .files
        .ok_or_else(|| CompileServiceError::Malformed("success response without files".into()))?;

    debug!(files = files.len(), ?compilation_time, "compilation succeeded");
    Ok(files)
}

/// Strip terminal noise from a compiler log
pub fn clean_compiler_log(raw: &str) -> String {
    strip_ansi(&raw.replace(CLEAR_SCREEN, ""))
        .replace(COMPLETION_MARKER, "")
        .trim()
        .to_owned()
}

/// Reduce a compiler log to the error message.
///
/// Takes everything from the first `Error:` up to the first stack-frame line.
/// Logs without the marker are returned cleaned but otherwise whole.
pub fn summarize_compile_error(raw: &str) -> String {
    let cleaned = clean_compiler_log(raw);
    let Some(start) = cleaned.find("Error:") else {
        return cleaned;
    };

    let mut summary = String::new();
    for (idx, line) in cleaned[start..].lines().enumerate() {
        if idx > 0 && line.trim_start().starts_with("at ") {
            break;
        }
        summary.push_str(line);
        summary.push('\n');
    }

    format!("❌ {}", summary.trim_end())
}

fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' && c != '\u{9b}' {
            out.push(c);
            continue;
        }
        while chars.next_if(|c| "[()#;?".contains(*c)).is_some() {}
        while chars.next_if(|c| c.is_ascii_digit() || *c == ';').is_some() {}
        chars.next_if(|c| is_sequence_final(*c));
    }

    out
}

fn is_sequence_final(c: char) -> bool {
    matches!(c, '0'..='a' | 'c'..='p' | 'r'..='t')
}
