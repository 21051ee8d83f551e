//! Wire envelope: `{service, data}` encoded as a MessagePack map.
//!
//! Envelopes are always written with named fields so peers written against
//! other MessagePack libraries see `{"service": ..., "data": ...}` rather
//! than a positional array.

use crate::error::{ClientError, Result};
use crate::protocol::CLOCK_KEY;
use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub service: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    service: &'a str,
    data: &'a Value,
}

impl Envelope {
    pub fn new(service: impl Into<String>, data: Value) -> Self {
        Self {
            service: service.into(),
            data,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&self.service, &self.data)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope =
            rmp_serde::from_slice(bytes).map_err(|e| ClientError::Decode(e.to_string()))?;
        if envelope.service.is_empty() {
            return Err(ClientError::Decode("empty service name".to_string()));
        }
        Ok(envelope)
    }

    /// Peer clock carried under the reserved `clock` key, if any.
    pub fn clock(&self) -> Option<i64> {
        self.data.get(CLOCK_KEY).and_then(Value::as_i64)
    }
}

/// Encode a `{service, data}` envelope.
pub fn encode(service: &str, data: &Value) -> Result<Vec<u8>> {
    if service.is_empty() {
        return Err(ClientError::Encode("empty service name".to_string()));
    }
    rmp_serde::to_vec_named(&EnvelopeRef { service, data })
        .map_err(|e| ClientError::Encode(e.to_string()))
}

/// Decode an envelope into its service name and payload.
pub fn decode(bytes: &[u8]) -> Result<(String, Value)> {
    let Envelope { service, data } = Envelope::decode(bytes)?;
    Ok((service, data))
}
