/// Errors produced while framing or parsing dispatch messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The byte stream violated framing (oversized frame, truncated stream, I/O).
    #[error("frame error: {0}")]
    Frame(#[from] std::io::Error),
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("payload is not a valid message: {0}")]
    Json(#[source] serde_json::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Returns `true` when the frame boundary was intact but its contents
    /// could not be decoded, so the stream itself is still usable.
    #[must_use]
    pub fn is_payload_error(&self) -> bool {
        matches!(self, Self::Utf8(_) | Self::Json(_))
    }
}
