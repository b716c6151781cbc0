//! Typed results for calls to the language-model provider.
//!
//! Provider trouble never propagates as an error out of the embedding or
//! analysis adapters. Instead every call yields a usable value plus an
//! [`Outcome`] telling the caller whether the value is real.

use serde::Serialize;
use thiserror::Error;

/// Errors raised inside the provider adapters before they are folded into
/// an [`Outcome`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("OPENAI_API_KEY is not configured")]
    MissingKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// The provider answered.
    Success,
    /// No API key: a placeholder was produced without calling out.
    Degraded,
    /// The call was attempted and failed; a placeholder was produced.
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl From<&ProviderError> for Outcome {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::MissingKey => Outcome::Degraded,
            other => Outcome::Failed(other.to_string()),
        }
    }
}

/// A provider-produced value with its provenance.
#[derive(Debug, Clone)]
pub struct Generated<T> {
    pub value: T,
    pub outcome: Outcome,
}

impl<T> Generated<T> {
    pub fn success(value: T) -> Self {
        Self {
            value,
            outcome: Outcome::Success,
        }
    }

    pub fn fallback(value: T, err: &ProviderError) -> Self {
        Self {
            value,
            outcome: Outcome::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_degraded() {
        let g = Generated::fallback(0u8, &ProviderError::MissingKey);
        assert_eq!(g.outcome, Outcome::Degraded);
        assert!(!g.outcome.is_success());
    }

    #[test]
    fn test_api_error_is_failed_with_reason() {
        let err = ProviderError::Api {
            status: 503,
            body: "overloaded".into(),
        };
        match Outcome::from(&err) {
            Outcome::Failed(reason) => assert!(reason.contains("503")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(Outcome::Failed("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "reason": "boom"}));
        let json = serde_json::to_value(Outcome::Success).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success"}));
    }
}
