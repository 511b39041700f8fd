//! # SchemaStore Codec
//!
//! Key layout and versioned record encoding for SchemaStore.
//!
//! - [`KeyCodec`] derives the flat, ordered store keys of a schema
//! - [`encode_envelope`] / [`decode_envelope`] wrap records in a
//!   `[version, payload]` CBOR array
//! - [`VersionChain`] upgrades historical payloads to the current type
//!
//! ## Usage
//!
//! ```
//! use schemastore_codec::{decode_envelope, encode_envelope, KeyCodec, VersionChain};
//!
//! let keys = KeyCodec::new("Player");
//! assert_eq!(keys.data_key("alice"), "Player:data:alice");
//!
//! let bytes = encode_envelope(1, &"Alice".to_string()).unwrap();
//! let name: String = decode_envelope(&bytes, &VersionChain::new()).unwrap();
//! assert_eq!(name, "Alice");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod keys;
mod version;

pub use ciborium::Value;
pub use envelope::{decode_envelope, encode_envelope, peek_version};
pub use error::{CodecError, CodecResult};
pub use keys::{KeyCodec, SEPARATOR};
pub use version::{Upgrade, VersionChain};
