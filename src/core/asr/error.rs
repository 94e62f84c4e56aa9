use thiserror::Error;

/// Error types for the ASR pipeline
#[derive(Debug, Clone, Error)]
pub enum AsrError {
    /// A required model file or configuration file is absent or unreadable.
    /// Produced at startup only.
    #[error("Configuration error: {0}")]
    ConfigMissing(String),

    /// The ONNX Runtime shared library could not be located or initialized.
    /// Produced at startup only.
    #[error("ONNX Runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The audio payload does not conform to the claimed container format.
    #[error("Malformed audio container: {0}")]
    MalformedContainer(String),

    /// The audio format code or bit depth is not in the supported set.
    #[error("Unsupported audio encoding: {0}")]
    UnsupportedEncoding(String),

    /// A tensor did not match the shape the model graph declares.
    #[error("Tensor shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A session run failed or produced unusable output.
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

impl AsrError {
    /// Whether the error was caused by the request payload rather than the
    /// server. Used by the HTTP layer to pick a status code.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AsrError::MalformedContainer(_) | AsrError::UnsupportedEncoding(_)
        )
    }
}
