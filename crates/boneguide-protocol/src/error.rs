use thiserror::Error;

/// Errors raised while building, sending or decoding pose-server traffic.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The captured frame carried no depth plane.
    #[error("frame has no depth data")]
    MissingDepthData,

    /// `PUT /sessions` succeeded but the session id was empty.
    #[error("server did not return a session id")]
    EmptySessionId,

    /// The id cannot be used as a URL segment or a directory name.
    #[error("unusable session id {0:?}")]
    InvalidSessionId(String),

    #[error("invalid server URL {0}")]
    InvalidUrl(String),

    /// The returned pose was not a 4x4 matrix.
    #[error("expected a 16-element transform, got {len} values")]
    InvalidTransform { len: usize },

    #[error("transform contains non-finite values")]
    NonFiniteTransform,

    /// Any status outside `200..=299`.
    #[error("server responded with status {status_code}: {body}")]
    ServerError { status_code: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("malformed response body: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// Pixel buffer length disagrees with the declared dimensions.
    #[error("image buffer mismatch: {0}")]
    Encode(String),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot: {0}")]
    Snapshot(String),
}

impl From<reqwest::Error> for ProtocolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProtocolError::Timeout
        } else {
            ProtocolError::Http(err)
        }
    }
}
