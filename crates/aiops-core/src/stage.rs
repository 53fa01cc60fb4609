//! Stage helpers - retried, cancellable backend calls shared by the
//! planner, executor and verifier

use crate::error::{Error, Result};
use crate::utils::{retry_with_backoff, RetryConfig};
use aiops_llm::{complete_as, OutputSchema, Prompt, ReasoningBackend};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug)]
enum Attempt {
    Backend(aiops_llm::Error),
    Cancelled,
}

/// Ask the backend for a schema-conforming value
///
/// Transient backend errors are retried per `retry`; everything else,
/// including `MalformedOutput`, is returned as-is.
pub(crate) async fn complete<T: DeserializeOwned>(
    backend: &dyn ReasoningBackend,
    prompt: &Prompt,
    output: &OutputSchema,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<T> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let result = retry_with_backoff(
        retry,
        cancel,
        move || async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(Attempt::Cancelled),
                res = complete_as::<T>(backend, prompt, output) => res.map_err(Attempt::Backend),
            }
        },
        |e: &Attempt| matches!(e, Attempt::Backend(err) if err.is_transient()),
    )
    .await;

    match result {
        Ok(value) => Ok(value),
        Err(e) if e.cancelled => Err(Error::Cancelled),
        Err(e) => match e.last_error {
            Attempt::Cancelled => Err(Error::Cancelled),
            Attempt::Backend(err) => {
                warn!(
                    backend = backend.name(),
                    schema = %output.name,
                    attempts = e.attempts,
                    error = %err,
                    "Backend call failed"
                );
                Err(Error::Backend(err))
            }
        },
    }
}
