// Shared plumbing for the blocking HTTP clients used by the service adapters

use std::time::Duration;

use anyhow::anyhow;

use crate::{Result, StudioError};

/// Upper bound on response bodies; collection dumps with embeddings get large
const MAX_RESPONSE_BYTES: u64 = 512 * 1024 * 1024;

/// Build an agent that reports HTTP error statuses as responses instead of errors,
/// so callers can read the error body
pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Read a full response as `(status, body)`
pub(crate) fn read_response(
    mut response: ureq::http::Response<ureq::Body>,
) -> std::result::Result<(u16, String), ureq::Error> {
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .with_config()
        .limit(MAX_RESPONSE_BYTES)
        .read_to_string()?;
    Ok((status, body))
}

/// Run a blocking client call on the blocking thread pool
pub(crate) async fn run_blocking<T, F>(call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StudioError::Other(anyhow!("Blocking HTTP task failed: {}", e)))?
}

#[inline]
pub(crate) const fn is_success(status: u16) -> bool {
    200 <= status && status < 300
}
