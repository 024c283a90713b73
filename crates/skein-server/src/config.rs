//! Response configuration.

use serde::{Deserialize, Serialize};
use skein_core::codec::Headers;
use skein_core::framing::MAX_BODY_SIZE;

use crate::error::{ResponseError, Result};

/// Smallest body size that still leaves room for the call-response
/// preamble and an argument chunk.
pub const MIN_BODY_SIZE: usize = 64;

/// Settings for outbound call responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Upper bound on each frame's body; larger arguments are fragmented.
    pub max_body_size: usize,
    /// Transport headers placed on the first call-response frame.
    pub headers: Headers,
    /// Outbound frame credits; `None` disables flow control.
    pub initial_credits: Option<u32>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_body_size: MAX_BODY_SIZE,
            headers: Headers::new(),
            initial_credits: None,
        }
    }
}

impl ResponseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ResponseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn initial_credits(mut self, credits: u32) -> Self {
        self.initial_credits = Some(credits);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_BODY_SIZE..=MAX_BODY_SIZE).contains(&self.max_body_size) {
            return Err(ResponseError::Config(format!(
                "max_body_size must be within {MIN_BODY_SIZE}..={MAX_BODY_SIZE}, got {}",
                self.max_body_size
            )));
        }
        if self.headers.len() > u8::MAX as usize {
            return Err(ResponseError::Config(format!(
                "at most {} transport headers, got {}",
                u8::MAX,
                self.headers.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResponseConfig::default();
        assert_eq!(config.max_body_size, 65519);
        assert!(config.headers.is_empty());
        assert_eq!(config.initial_credits, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = ResponseConfig::from_json(r#"{"initial_credits": 4}"#).unwrap();
        assert_eq!(config.initial_credits, Some(4));
        assert_eq!(config.max_body_size, MAX_BODY_SIZE);
    }

    #[test]
    fn test_from_json_rejects_out_of_range_body_size() {
        let err = ResponseConfig::from_json(r#"{"max_body_size": 70000}"#).unwrap_err();
        assert!(matches!(err, ResponseError::Config(_)));
        assert!(ResponseConfig::new().max_body_size(16).validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = ResponseConfig::new()
            .max_body_size(128)
            .header("as", "raw")
            .initial_credits(2);
        assert_eq!(config.headers.get("as"), Some("raw"));
        assert!(config.validate().is_ok());
    }
}
