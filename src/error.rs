//! Errors raised while generating code or probing a provider.
//!
//! Each variant maps to one failure class the CLI reports inline. None of
//! them touch persisted state, so callers can simply report and move on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Bad input caught before any request was sent: empty prompt, missing
    /// configuration, malformed API key, missing base URL.
    #[error("{0}")]
    Validation(String),

    /// Transport failure or non-2xx response.
    #[error("{0}")]
    Network(String),

    /// The provider answered, but not in the shape we expected.
    /// The detail is logged; users see the fixed message.
    #[error("Invalid response format from provider")]
    ResponseFormat(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
}

impl GenerationError {
    pub fn response_format(detail: impl Into<String>) -> Self {
        GenerationError::ResponseFormat(detail.into())
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Network(err.to_string())
    }
}

pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_format_hides_detail() {
        let err = GenerationError::response_format("missing choices[0]");
        assert_eq!(err.to_string(), "Invalid response format from provider");
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            GenerationError::Validation("Please enter a prompt".into()).to_string(),
            "Please enter a prompt"
        );
        assert_eq!(
            GenerationError::Network("HTTP error, status 500".into()).to_string(),
            "HTTP error, status 500"
        );
        assert_eq!(
            GenerationError::UnsupportedProvider("Cohere".into()).to_string(),
            "Unsupported provider: Cohere"
        );
    }
}
