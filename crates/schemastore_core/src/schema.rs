//! Schema declarations.

use schemastore_codec::VersionChain;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// A named, versioned record type.
///
/// ```rust
/// use schemastore_core::{Index, Schema};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Player {
///     name: String,
///     admin: bool,
/// }
///
/// impl Schema for Player {
///     const NAME: &'static str = "Player";
///
///     fn indexes() -> Vec<Index<Self>> {
///         vec![
///             Index::new("name", |p: &Player| p.name.clone()),
///             Index::display("admin", |p: &Player| p.admin),
///         ]
///     }
/// }
/// ```
pub trait Schema: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique schema name. Must be non-empty and must not contain `:`.
    const NAME: &'static str;

    /// The chain of historical representations. Defaults to a single
    /// version.
    #[must_use]
    fn versions() -> VersionChain<Self> {
        VersionChain::new()
    }

    /// Secondary indexes. Defaults to none.
    #[must_use]
    fn indexes() -> Vec<Index<Self>> {
        Vec::new()
    }
}

type Extractor<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

/// A secondary index: a stable name plus the value it indexes.
pub struct Index<T> {
    name: &'static str,
    extract: Extractor<T>,
}

impl<T: 'static> Index<T> {
    /// Declares an index whose value is computed by `extract`.
    pub fn new<F>(name: &'static str, extract: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            name,
            extract: Box::new(extract),
        }
    }

    /// Declares an index over a field rendered with `Display`.
    pub fn display<F, V>(name: &'static str, field: F) -> Self
    where
        F: Fn(&T) -> V + Send + Sync + 'static,
        V: fmt::Display + 'static,
    {
        Self::new(name, move |record: &T| field(record).to_string())
    }

    /// The index name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The indexed value of `record`.
    #[must_use]
    pub fn value(&self, record: &T) -> String {
        (self.extract)(record)
    }
}

impl<T> fmt::Debug for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        label: String,
        count: u32,
    }

    #[test]
    fn extractors() {
        let item = Item {
            label: "Hello".into(),
            count: 3,
        };
        let by_label = Index::new("label", |i: &Item| i.label.to_uppercase());
        let by_count = Index::display("count", |i: &Item| i.count);

        assert_eq!(by_label.name(), "label");
        assert_eq!(by_label.value(&item), "HELLO");
        assert_eq!(by_count.value(&item), "3");
    }
}
