//! Live dev-server runs

use tracing::debug;

use crate::environment::LiveOutcome;
use crate::runner::{RunError, RunOutcome, Router};
use crate::types::Framework;

impl Router {
    /// Hand the run to the environment.
    ///
    /// The orchestrator streams its own progress and failures into the
    /// output; only the hot-update confirmation is added here.
    pub(super) async fn run_live(
        &self,
        ticket: u64,
        source: &str,
        framework: Framework,
    ) -> Result<RunOutcome, RunError> {
        let result = self.environment.run(framework, source).await;

        if self.complete(ticket).is_none() {
            return Ok(RunOutcome::Superseded);
        }

        let outcome = result?;
        match &outcome {
            LiveOutcome::Updated { path, rebound } => {
                debug!(path, rebound, "hot update written");
                self.output.append_chunk(&format!("✓ Updated {path}\n"));
            }
            LiveOutcome::Started { url } => debug!(%url, "live environment started"),
            LiveOutcome::InProgress => debug!("live environment still starting"),
        }
        Ok(RunOutcome::Live(outcome))
    }
}
