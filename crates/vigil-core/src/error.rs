/// Errors that can occur across the Vigil platform.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to a `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use vigil_core::VigilError;
///
/// let err = VigilError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum VigilError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Repository host (GitHub) API failure.
    #[error("host error: {0}")]
    Host(String),

    /// The host rejected our credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A provider signalled rate limiting or quota exhaustion.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// LLM API or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Structured LLM output did not match the requested schema.
    #[error("schema validation failed: {0}")]
    Schema(String),

    /// Waiting for the content cache lock exceeded its deadline.
    #[error("content cache timeout: {0}")]
    CacheTimeout(String),

    /// Patch or reference parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

const RATE_LIMIT_HINTS: &[&str] = &[
    "rate limit",
    "ratelimit",
    "rate_limit",
    "too many requests",
    "quota",
    "429",
];

impl VigilError {
    /// Returns `true` if the error signals rate limiting or quota exhaustion.
    ///
    /// Besides the dedicated [`VigilError::RateLimited`] variant, provider and
    /// host messages are inspected for the usual hints (`429`, "quota", ...).
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_core::VigilError;
    ///
    /// assert!(VigilError::RateLimited("slow down".into()).is_rate_limited());
    /// assert!(VigilError::Llm("LLM API error 429 Too Many Requests".into()).is_rate_limited());
    /// assert!(!VigilError::Llm("connection reset".into()).is_rate_limited());
    /// ```
    pub fn is_rate_limited(&self) -> bool {
        match self {
            VigilError::RateLimited(_) => true,
            VigilError::Llm(msg) | VigilError::Host(msg) => {
                let msg = msg.to_ascii_lowercase();
                RATE_LIMIT_HINTS.iter().any(|h| msg.contains(h))
            }
            _ => false,
        }
    }

    /// Returns `true` if retrying the failed operation could plausibly succeed.
    ///
    /// Configuration and authentication failures are fatal; everything else
    /// is treated as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, VigilError::Config(_) | VigilError::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: VigilError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = VigilError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn rate_limit_detected_from_message() {
        assert!(VigilError::Host("API rate limit exceeded for user".into()).is_rate_limited());
        assert!(VigilError::Llm("insufficient_quota".into()).is_rate_limited());
        assert!(!VigilError::Schema("quota".into()).is_rate_limited());
    }

    #[test]
    fn auth_and_config_are_fatal() {
        assert!(!VigilError::Auth("bad credentials".into()).is_retryable());
        assert!(!VigilError::Config("no token".into()).is_retryable());
        assert!(VigilError::Llm("timeout".into()).is_retryable());
        assert!(VigilError::CacheTimeout("src/a.rs".into()).is_retryable());
    }
}
