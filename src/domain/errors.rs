use thiserror::Error;

/// Failure taxonomy for a single generation branch.
///
/// The aggregation layer never lets one of these abort the whole call: a
/// failed branch is logged and becomes an empty entry in the result set.
/// The variants exist so the retry loop can tell transient conditions from
/// terminal ones, and so logs name what actually went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The caller's request or the provider configuration cannot be used
    /// as given.
    #[error("invalid generation request: {message}")]
    InvalidRequest { message: String },
    /// The provider rejected the configured API credentials.
    #[error("provider rejected the configured API credentials")]
    CredentialsRejected,
    /// The provider throttled the request.
    #[error("provider throttled the request")]
    Throttled,
    /// The provider did not answer within the configured deadline.
    #[error("provider did not answer within the configured deadline")]
    DeadlineExceeded,
    /// The provider answered, but the payload did not match its documented
    /// shape.
    #[error("provider response was malformed: {message}")]
    MalformedResponse { message: String },
    /// The provider could not be reached at the transport level.
    #[error("provider unreachable: {message}")]
    Unreachable { message: String },
    /// A defect in this pipeline rather than in any provider.
    #[error("generation pipeline fault: {message}")]
    Fault { message: String },
}

impl GenerationError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
        }
    }

    /// Whether another attempt against the same provider could plausibly
    /// succeed. Credential and request problems stay broken until someone
    /// changes the input; a malformed payload from a deterministic endpoint
    /// is treated the same way.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled | Self::DeadlineExceeded | Self::Unreachable { .. }
        )
    }

    /// One-line remediation hint for whoever reads the response or the log,
    /// without the wire-level detail the `Display` impl carries.
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidRequest { message } => {
                format!("The generation request was rejected: {message}")
            }
            Self::CredentialsRejected => {
                "The provider refused the API key. Verify the key environment variables."
                    .to_string()
            }
            Self::Throttled => {
                "The provider is throttling requests right now. Try again shortly.".to_string()
            }
            Self::DeadlineExceeded => {
                "The provider ran past its deadline. Try again or raise the timeout.".to_string()
            }
            Self::MalformedResponse { .. } => {
                "The provider answered in an unexpected format, so no image could be read."
                    .to_string()
            }
            Self::Unreachable { message } => {
                format!("The provider could not be reached: {message}")
            }
            Self::Fault { .. } => {
                "Generation failed because of a problem on our side.".to_string()
            }
        }
    }
}
