//! Typed prefix iteration.

use super::ops::decode;
use crate::backend::RawIterator;
use crate::error::{CoreError, CoreResult};
use crate::registry::CompiledSchema;
use crate::schema::Schema;
use std::fmt;
use std::sync::Arc;

/// Iterator over `(logical key, record)` pairs of one schema.
///
/// Yields records in logical key order from a snapshot fixed when the
/// iterator was created. Decode failures are yielded as errors carrying the
/// record's key; iteration may continue past them.
pub struct SchemaIter<T, I> {
    raw: I,
    schema: Arc<CompiledSchema<T>>,
}

impl<T: Schema, I: RawIterator> SchemaIter<T, I> {
    pub(crate) fn new(raw: I, schema: Arc<CompiledSchema<T>>) -> Self {
        Self { raw, schema }
    }

    fn current(&self) -> CoreResult<(String, T)> {
        let data_key = self.raw.key_str()?;
        let key = self
            .schema
            .keys()
            .strip_data_key(data_key)
            .ok_or_else(|| CoreError::invalid_operation(format!("{data_key} is not a {} data key", T::NAME)))?;
        let value = decode(&self.schema, self.raw.value())
            .map_err(|e| CoreError::record("seek", T::NAME, key, e))?;
        Ok((key.to_string(), value))
    }
}

impl<T: Schema, I: RawIterator> Iterator for SchemaIter<T, I> {
    type Item = CoreResult<(String, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        if RawIterator::next(&mut self.raw) {
            Some(self.current())
        } else {
            None
        }
    }
}

impl<T: Schema, I> fmt::Debug for SchemaIter<T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaIter").field("schema", &T::NAME).finish()
    }
}
