//! Static framework previews built by the compile service

use tracing::{debug, warn};

use crate::preview::assemble;
use crate::runner::{RunError, RunOutcome, Router};
use crate::services::CompileServiceError;
use crate::types::Framework;

impl Router {
    pub(super) async fn run_bundle(
        &self,
        ticket: u64,
        source: &str,
        framework: Framework,
    ) -> Result<RunOutcome, RunError> {
        self.output.set(format!("Compiling {framework}..."));
        let compiled = self.compiler.submit(source, framework).await;

        let Some(mut state) = self.complete(ticket) else {
            return Ok(RunOutcome::Superseded);
        };

        match compiled {
            Ok(bundle) => {
                let document = assemble(&bundle, framework);
                debug!(files = bundle.len(), bytes = document.len(), "assembled preview");
                let handle = self.sandbox.present(&document);
                self.output.set("✓ Rendered Successfully");
                state.artifacts.preview = Some(document);
                Ok(RunOutcome::Rendered { handle })
            }
            Err(CompileServiceError::Compilation(err)) => {
                debug!("component failed to compile");
                self.output.set(err.summary());
                state.artifacts.compile_error = Some(err.clone());
                Err(CompileServiceError::Compilation(err).into())
            }
            Err(err) => {
                warn!(%err, "compile service request failed");
                self.output.set(format!("Error: {err}"));
                Err(err.into())
            }
        }
    }
}
