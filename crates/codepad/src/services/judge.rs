//! HTTP client for the remote judge
//!
//! Submissions are sent base64-encoded with `wait=true`, so one request
//! returns the finished result. Text fields in the response come back
//! base64-encoded as well.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::config::ServiceConfig;
use crate::services::{JudgeError, JudgeService};
use crate::types::{ExecutionResult, JudgeStatus};

#[derive(Debug, Serialize)]
struct SubmissionRequest {
    source_code: String,
    language_id: u32,
}

#[derive(Debug, Deserialize)]
struct SubmissionResponse {
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    compile_output: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    memory: Option<u64>,
    #[serde(default)]
    status: Option<JudgeStatus>,
}

impl SubmissionResponse {
    fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            stdout: self.stdout.as_deref().map(decode_base64_text),
            stderr: self.stderr.as_deref().map(decode_base64_text),
            compile_output: self.compile_output.as_deref().map(decode_base64_text),
            time: self.time,
            memory: self.memory,
            status: self.status.unwrap_or_default(),
        }
    }
}

/// Remote judge reached over HTTP
#[derive(Debug, Clone)]
pub struct JudgeClient {
    client: Client,
    endpoint: Url,
}

impl JudgeClient {
    /// Create a client for the judge rooted at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, JudgeError> {
        let mut endpoint = Url::parse(&format!(
            "{}/submissions",
            base_url.trim_end_matches('/')
        ))?;
        endpoint
            .query_pairs_mut()
            .append_pair("base64_encoded", "true")
            .append_pair("wait", "true");

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(services: &ServiceConfig) -> Result<Self, JudgeError> {
        Self::new(&services.judge_url, services.timeout())
    }

    /// Submission endpoint including query parameters
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl JudgeService for JudgeClient {
    #[instrument(skip(self, source), fields(endpoint = %self.endpoint))]
    async fn submit(&self, source: &str, language_id: u32) -> Result<ExecutionResult, JudgeError> {
        let request = SubmissionRequest {
            source_code: encode_base64_text(source),
            language_id,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(JudgeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SubmissionResponse =
            serde_json::from_str(&body).map_err(|e| JudgeError::Malformed(e.to_string()))?;
        let result = parsed.into_result();

        debug!(
            status_id = result.status.id,
            status = %result.status.description,
            time = ?result.time,
            memory = ?result.memory,
            "judge submission finished"
        );

        Ok(result)
    }
}

/// Encode UTF-8 source text for transmission
pub fn encode_base64_text(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode a base64 text field from the judge.
///
/// Line breaks inside the encoding are ignored. Invalid UTF-8 is replaced
/// lossily, and text that is not base64 at all is returned unchanged.
pub fn decode_base64_text(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
        Err(_) => raw.to_owned(),
    }
}
