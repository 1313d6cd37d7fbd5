//! Versioned envelope for data crossing a process boundary.
//!
//! Every payload published to the job queue is wrapped in an envelope
//! carrying a format version, so consumers can reject or migrate payloads
//! written by a different release during a rolling deploy.

use serde::{Deserialize, Serialize};

/// The envelope format version this build writes.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned wrapper around a serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload at the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    /// Consumes the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Returns true if the envelope was written at the current version.
    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload fails to serialize.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: for<'de> Deserialize<'de>> Envelope<T> {
    /// Deserializes an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid envelope.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn envelope_roundtrip_keeps_version() {
        let envelope = Envelope::new(Payload { value: 9 });
        let bytes = envelope.to_json_bytes().expect("serialize");
        let parsed: Envelope<Payload> = Envelope::from_json_bytes(&bytes).expect("deserialize");

        assert!(parsed.is_current_version());
        assert_eq!(parsed.into_payload(), Payload { value: 9 });
    }

    #[test]
    fn version_sits_at_the_top_level() {
        let envelope = Envelope::new(Payload { value: 1 });
        let json = serde_json::to_value(&envelope).expect("to_value");
        assert_eq!(json["version"], CURRENT_VERSION);
        assert_eq!(json["payload"]["value"], 1);
    }
}
