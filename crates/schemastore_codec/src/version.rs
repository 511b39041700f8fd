//! Schema version chains.

use crate::error::{CodecError, CodecResult};
use ciborium::Value;
use serde::de::DeserializeOwned;
use std::fmt;

/// Converts a stored historical payload into the current type.
pub type Upgrade<T> = fn(&Value) -> CodecResult<T>;

/// The ordered chain of historical representations of a schema.
///
/// Step `i` (zero based) decodes version `i + 1`. The current version is one
/// past the last historical step, so a chain with no steps has current
/// version 1.
///
/// ```rust
/// use schemastore_codec::VersionChain;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct ProfileV1 { name: String }
///
/// #[derive(Deserialize)]
/// struct Profile { name: String, bio: String }
///
/// impl From<ProfileV1> for Profile {
///     fn from(old: ProfileV1) -> Self {
///         Self { name: old.name, bio: String::new() }
///     }
/// }
///
/// let chain = VersionChain::<Profile>::new().historical::<ProfileV1>();
/// assert_eq!(chain.current_version(), 2);
/// ```
pub struct VersionChain<T> {
    steps: Vec<Upgrade<T>>,
}

impl<T> fmt::Debug for VersionChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionChain")
            .field("current_version", &self.current_version())
            .finish()
    }
}

impl<T> Clone for VersionChain<T> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<T: DeserializeOwned> Default for VersionChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> VersionChain<T> {
    /// The version written by new encodes.
    #[must_use]
    pub fn current_version(&self) -> u64 {
        self.steps.len() as u64 + 1
    }

    /// Returns `true` if `version` can be decoded by this chain.
    #[must_use]
    pub fn supports(&self, version: u64) -> bool {
        (1..=self.current_version()).contains(&version)
    }
}

impl<T: DeserializeOwned> VersionChain<T> {
    /// A chain whose only version is the current type.
    #[must_use]
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends the next historical version, decoded as `H` and converted
    /// with `From`.
    #[must_use]
    pub fn historical<H>(self) -> Self
    where
        H: DeserializeOwned,
        T: From<H>,
    {
        self.with_upgrade(upgrade_from::<H, T>)
    }

    /// Appends the next historical version with a custom conversion.
    #[must_use]
    pub fn with_upgrade(mut self, upgrade: Upgrade<T>) -> Self {
        self.steps.push(upgrade);
        self
    }

    /// Decodes `payload` stored under `version` into the current type.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedVersion`] for version 0 or versions
    /// newer than the current one, and [`CodecError::Decode`] if the payload
    /// does not match the representation of its version.
    pub fn resolve(&self, version: u64, payload: &Value) -> CodecResult<T> {
        let current = self.current_version();
        if version == current {
            return payload
                .deserialized::<T>()
                .map_err(|e| CodecError::decode(format!("version {version} payload: {e}")));
        }

        let step = version
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| self.steps.get(index))
            .ok_or(CodecError::UnsupportedVersion { version, current })?;
        step(payload)
    }
}

fn upgrade_from<H, T>(payload: &Value) -> CodecResult<T>
where
    H: DeserializeOwned,
    T: From<H>,
{
    payload
        .deserialized::<H>()
        .map(T::from)
        .map_err(|e| CodecError::decode(format!("historical payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct V1 {
        name: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct V2 {
        name: String,
        level: u32,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Current {
        name: String,
        level: u32,
        tags: Vec<String>,
    }

    impl From<V1> for Current {
        fn from(v: V1) -> Self {
            Self {
                name: v.name,
                level: 1,
                tags: Vec::new(),
            }
        }
    }

    impl From<V2> for Current {
        fn from(v: V2) -> Self {
            Self {
                name: v.name,
                level: v.level,
                tags: vec!["migrated".into()],
            }
        }
    }

    fn chain() -> VersionChain<Current> {
        VersionChain::new().historical::<V1>().historical::<V2>()
    }

    #[test]
    fn single_version_chain() {
        let chain = VersionChain::<V1>::new();
        assert_eq!(chain.current_version(), 1);
        assert!(chain.supports(1));
        assert!(!chain.supports(0));
        assert!(!chain.supports(2));
    }

    #[test]
    fn resolves_every_version() {
        let chain = chain();
        assert_eq!(chain.current_version(), 3);

        let v1 = Value::serialized(&V1 { name: "a".into() }).unwrap();
        assert_eq!(chain.resolve(1, &v1).unwrap().level, 1);

        let v2 = Value::serialized(&V2 {
            name: "b".into(),
            level: 7,
        })
        .unwrap();
        let up = chain.resolve(2, &v2).unwrap();
        assert_eq!(up.level, 7);
        assert_eq!(up.tags, vec!["migrated".to_string()]);

        let current = Current {
            name: "c".into(),
            level: 9,
            tags: vec![],
        };
        let v3 = Value::serialized(&current).unwrap();
        assert_eq!(chain.resolve(3, &v3).unwrap(), current);
    }

    #[test]
    fn rejects_out_of_range_versions() {
        let chain = chain();
        let payload = Value::Null;
        assert_eq!(
            chain.resolve(0, &payload).unwrap_err(),
            CodecError::UnsupportedVersion {
                version: 0,
                current: 3
            }
        );
        assert_eq!(
            chain.resolve(4, &payload).unwrap_err(),
            CodecError::UnsupportedVersion {
                version: 4,
                current: 3
            }
        );
    }

    #[test]
    fn mismatched_payload_is_decode_error() {
        let chain = chain();
        let wrong = Value::Text("not a struct".into());
        assert!(matches!(
            chain.resolve(1, &wrong).unwrap_err(),
            CodecError::Decode { .. }
        ));
    }
}
