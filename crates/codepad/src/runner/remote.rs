//! Console runs on the remote judge

use tracing::{debug, warn};

use crate::runner::{RunError, RunOutcome, Router};
use crate::types::ExecutionResult;

impl Router {
    /// Submit to the judge and publish the decoded result.
    ///
    /// Transport failures are shown as `Error: <message>` and kept as a
    /// synthetic result. Nothing is retried.
    pub(super) async fn run_remote(
        &self,
        ticket: u64,
        source: &str,
        judge_id: u32,
    ) -> Result<RunOutcome, RunError> {
        self.output.clear();
        let submitted = self.judge.submit(source, judge_id).await;

        let Some(mut state) = self.complete(ticket) else {
            return Ok(RunOutcome::Superseded);
        };

        match submitted {
            Ok(result) => {
                debug!(status = ?result.status, time = ?result.time, "judge run complete");
                self.output.set(result.display_text());
                state.artifacts.result = Some(result.clone());
                Ok(RunOutcome::Executed(result))
            }
            Err(err) => {
                warn!(%err, "judge submission failed");
                self.output.set(format!("Error: {err}"));
                state.artifacts.result = Some(ExecutionResult::transport_failure(err.to_string()));
                Err(err.into())
            }
        }
    }
}
