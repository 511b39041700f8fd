//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding stored records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value to CBOR.
    #[error("encoding failed: {message}")]
    Encode {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes or a payload.
    #[error("decoding failed: {message}")]
    Decode {
        /// Description of the decoding error.
        message: String,
    },

    /// Stored bytes are not a `[version, payload]` pair.
    #[error("malformed envelope: {message}")]
    MalformedEnvelope {
        /// What was wrong with the envelope.
        message: String,
    },

    /// The stored version is not covered by the version chain.
    #[error("unsupported schema version {version} (current version is {current})")]
    UnsupportedVersion {
        /// Version found in the envelope.
        version: u64,
        /// The schema's current version.
        current: u64,
    },
}

impl CodecError {
    /// Creates an encoding error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a decoding error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a malformed envelope error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            message: message.into(),
        }
    }
}
