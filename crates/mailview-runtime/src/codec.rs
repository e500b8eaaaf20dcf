#![forbid(unsafe_code)]

//! Payload decoding for inbound channel messages.
//!
//! Payloads are JSON documents, one per message, optionally followed by a
//! newline. A [`JsonDecoder`] can carry a validator that rejects documents
//! which parse but make no sense for the stream (for example a page longer
//! than its requested limit).

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

/// Why an inbound payload was rejected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload rejected: {0}")]
    Validation(String),
}

/// Turns one raw text payload into a value.
pub trait Decoder<T>: Send + Sync {
    fn decode(&self, payload: &str) -> Result<T, DecodeError>;
}

type Validator<T> = Arc<dyn Fn(&T) -> Result<(), String> + Send + Sync>;

/// `serde_json` decoder with an optional validator.
pub struct JsonDecoder<T> {
    validator: Option<Validator<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonDecoder<T> {
    fn clone(&self) -> Self {
        Self {
            validator: self.validator.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonDecoder")
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

impl<T> JsonDecoder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            validator: None,
            _marker: PhantomData,
        }
    }

    /// Reject decoded values for which `validate` returns an error.
    #[must_use]
    pub fn with_validator(
        mut self,
        validate: impl Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validate));
        self
    }
}

impl<T: DeserializeOwned> Decoder<T> for JsonDecoder<T> {
    fn decode(&self, payload: &str) -> Result<T, DecodeError> {
        let value: T = serde_json::from_str(payload.trim_end_matches(['\n', '\r']))?;
        if let Some(validate) = &self.validator {
            validate(&value).map_err(DecodeError::Validation)?;
        }
        Ok(value)
    }
}

impl<T, D: Decoder<T> + ?Sized> Decoder<T> for Arc<D> {
    fn decode(&self, payload: &str) -> Result<T, DecodeError> {
        (**self).decode(payload)
    }
}
