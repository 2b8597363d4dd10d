use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("no CDS API key found (set CDSAPI_KEY, create ~/.cdsapirc, or pass key in ClientOptions)")]
    MissingCredentials,

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("request failed: {message} ({reason})")]
    TaskFailed { message: String, reason: String },

    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("download truncated: got {got} bytes, expected {expected}")]
    DownloadTruncated { got: u64, expected: u64 },
}
