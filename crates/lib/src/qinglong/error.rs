//! Error kinds raised by the QingLong client and session manager.

/// Failure of a QingLong operation. Callers match on the variant.
#[derive(Debug, thiserror::Error)]
pub enum QingLongError {
    #[error("qinglong configuration incomplete: url, client id and client secret are required")]
    Initialization,
    #[error("qinglong login failed: {0}")]
    Authentication(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("environment variable {0} not found")]
    EnvNotFound(String),
    #[error("qinglong api error: {0}")]
    Api(String),
    #[error("qinglong request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("qinglong response malformed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("qinglong server error: {status} {body}")]
    Server {
        status: reqwest::StatusCode,
        body: String,
    },
}
