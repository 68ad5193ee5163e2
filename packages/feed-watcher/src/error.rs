use thiserror::Error;

#[derive(Debug, Error)]
pub enum RendererError {
    /// The sidecar process could not be spawned or never began accepting
    /// connections. Fatal to the calling cycle only; the next cycle retries.
    #[error("failed to launch renderer process: {0}")]
    StartFailed(String),

    /// The sidecar was reachable at cycle start but its process or session
    /// went away mid-extraction. Forces a full restart on the next cycle.
    #[error("renderer session died: {0}")]
    SessionDied(String),

    /// The render endpoint answered with a non-success status.
    #[error("render API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure that does not indicate a dead process.
    #[error("render request error: {0}")]
    Network(String),
}
