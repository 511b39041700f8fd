//! Versioned record envelopes.
//!
//! A stored record is the CBOR array `[version, payload]`. The version is
//! the schema's current version at write time; reads resolve it through the
//! schema's [`VersionChain`].

use crate::error::{CodecError, CodecResult};
use crate::version::VersionChain;
use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes `value` under `version`.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_envelope<T: Serialize>(version: u64, value: &T) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(&(version, value), &mut out)
        .map_err(|e| CodecError::encode(e.to_string()))?;
    Ok(out)
}

/// Decodes an envelope, upgrading older versions through `chain`.
///
/// # Errors
///
/// - [`CodecError::Decode`] if the bytes are not valid CBOR or the payload
///   does not match its version's representation
/// - [`CodecError::MalformedEnvelope`] if the structure is not a 2-element
///   array with an unsigned integer version
/// - [`CodecError::UnsupportedVersion`] if the chain does not cover the
///   version
pub fn decode_envelope<T: DeserializeOwned>(bytes: &[u8], chain: &VersionChain<T>) -> CodecResult<T> {
    let (version, payload) = split(read_value(bytes)?)?;
    chain.resolve(version, &payload)
}

/// Reads only the version of an envelope.
///
/// # Errors
///
/// Same structural errors as [`decode_envelope`].
pub fn peek_version(bytes: &[u8]) -> CodecResult<u64> {
    split(read_value(bytes)?).map(|(version, _)| version)
}

fn read_value(bytes: &[u8]) -> CodecResult<Value> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decode(e.to_string()))
}

fn split(value: Value) -> CodecResult<(u64, Value)> {
    let Value::Array(items) = value else {
        return Err(CodecError::malformed("expected a [version, payload] array"));
    };
    let [version, payload]: [Value; 2] = items
        .try_into()
        .map_err(|items: Vec<Value>| {
            CodecError::malformed(format!("expected 2 elements, found {}", items.len()))
        })?;
    let Value::Integer(version) = version else {
        return Err(CodecError::malformed("version is not an integer"));
    };
    let version = u64::try_from(version)
        .map_err(|_| CodecError::malformed("version is not an unsigned integer"))?;
    Ok((version, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Foo {
        bar: String,
        baz: u32,
    }

    fn to_cbor(value: &impl Serialize) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::into_writer(value, &mut out).unwrap();
        out
    }

    #[test]
    fn roundtrip_current_version() {
        let foo = Foo {
            bar: "Some Bar".into(),
            baz: 3,
        };
        let bytes = encode_envelope(1, &foo).unwrap();
        assert_eq!(peek_version(&bytes).unwrap(), 1);
        assert_eq!(decode_envelope::<Foo>(&bytes, &VersionChain::new()).unwrap(), foo);
    }

    #[test]
    fn envelope_is_two_element_array() {
        let bytes = encode_envelope(1, &"x").unwrap();
        // 0x82 = array(2), 0x01 = unsigned(1)
        assert_eq!(&bytes[..2], &[0x82, 0x01]);
    }

    #[test]
    fn newer_version_is_rejected() {
        let bytes = encode_envelope(
            2,
            &Foo {
                bar: String::new(),
                baz: 0,
            },
        )
        .unwrap();
        let err = decode_envelope::<Foo>(&bytes, &VersionChain::new()).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnsupportedVersion {
                version: 2,
                current: 1
            }
        );
    }

    #[test]
    fn malformed_structures() {
        let chain = VersionChain::<Foo>::new();

        let not_array = to_cbor(&"hello");
        assert!(matches!(
            decode_envelope(&not_array, &chain),
            Err(CodecError::MalformedEnvelope { .. })
        ));

        let three = to_cbor(&(1u64, 2u64, 3u64));
        assert!(matches!(
            decode_envelope(&three, &chain),
            Err(CodecError::MalformedEnvelope { .. })
        ));

        let negative = to_cbor(&(-1i64, "x"));
        assert!(matches!(
            decode_envelope(&negative, &chain),
            Err(CodecError::MalformedEnvelope { .. })
        ));

        let text_version = to_cbor(&("1", "x"));
        assert!(matches!(
            decode_envelope(&text_version, &chain),
            Err(CodecError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn garbage_is_decode_error() {
        let chain = VersionChain::<Foo>::new();
        assert!(matches!(
            decode_envelope(&[0xff, 0x00, 0x13], &chain),
            Err(CodecError::Decode { .. })
        ));
        assert!(matches!(
            decode_envelope(&[], &chain),
            Err(CodecError::Decode { .. })
        ));
    }

    #[test]
    fn wrong_payload_shape_is_decode_error() {
        let bytes = encode_envelope(1, &vec![1u8, 2, 3]).unwrap();
        assert!(matches!(
            decode_envelope::<Foo>(&bytes, &VersionChain::new()),
            Err(CodecError::Decode { .. })
        ));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(bar in ".{0,64}", baz in any::<u32>()) {
            let foo = Foo { bar, baz };
            let bytes = encode_envelope(1, &foo).unwrap();
            prop_assert_eq!(decode_envelope::<Foo>(&bytes, &VersionChain::new()).unwrap(), foo);
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_envelope::<Foo>(&bytes, &VersionChain::new());
            let _ = peek_version(&bytes);
        }
    }
}
