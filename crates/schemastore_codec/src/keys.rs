//! Store key layout.
//!
//! ```text
//! <schema>:data:<key>                     -> envelope bytes
//! <schema>:index:<index>:<value>:<key>    -> data key
//! ```
//!
//! Logical keys and index values are written verbatim. Keys for one schema
//! therefore sort by logical key, and an index value prefix only matches
//! entries with exactly that value because of the trailing separator.

/// Separator between key segments.
pub const SEPARATOR: char = ':';

const DATA: &str = "data";
const INDEX: &str = "index";

/// Builds the store keys of one schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCodec<'a> {
    schema: &'a str,
}

impl<'a> KeyCodec<'a> {
    /// Creates a codec for the schema named `schema`.
    #[must_use]
    pub const fn new(schema: &'a str) -> Self {
        Self { schema }
    }

    /// The schema name.
    #[must_use]
    pub const fn schema(&self) -> &'a str {
        self.schema
    }

    /// `"<schema>:data:"`
    #[must_use]
    pub fn data_prefix(&self) -> String {
        format!("{}{SEPARATOR}{DATA}{SEPARATOR}", self.schema)
    }

    /// `"<schema>:data:<key>"`
    #[must_use]
    pub fn data_key(&self, key: &str) -> String {
        format!("{}{key}", self.data_prefix())
    }

    /// `"<schema>:index:"`, the root of every index of the schema.
    #[must_use]
    pub fn index_root(&self) -> String {
        format!("{}{SEPARATOR}{INDEX}{SEPARATOR}", self.schema)
    }

    /// `"<schema>:index:<index>:"`
    #[must_use]
    pub fn index_prefix(&self, index: &str) -> String {
        format!("{}{index}{SEPARATOR}", self.index_root())
    }

    /// `"<schema>:index:<index>:<value>:"`
    #[must_use]
    pub fn index_value_prefix(&self, index: &str, value: &str) -> String {
        format!("{}{value}{SEPARATOR}", self.index_prefix(index))
    }

    /// `"<schema>:index:<index>:<value>:<key>"`
    #[must_use]
    pub fn index_key(&self, index: &str, value: &str, key: &str) -> String {
        format!("{}{key}", self.index_value_prefix(index, value))
    }

    /// Recovers the logical key from a data key of this schema.
    ///
    /// Returns `None` if `data_key` belongs to another schema or is not a
    /// data key.
    #[must_use]
    pub fn strip_data_key<'k>(&self, data_key: &'k str) -> Option<&'k str> {
        data_key
            .strip_prefix(self.schema)?
            .strip_prefix(SEPARATOR)?
            .strip_prefix(DATA)?
            .strip_prefix(SEPARATOR)
    }
}
