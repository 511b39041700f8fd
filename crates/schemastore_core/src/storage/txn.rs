//! Typed access inside a transaction body.

use super::iter::SchemaIter;
use super::ops::{self, Context};
use super::Page;
use crate::backend::{KvRead, KvWrite, Transaction};
use crate::error::CoreResult;
use crate::schema::Schema;
use std::fmt::{self, Display};

/// Typed operations bound to one optimistic transaction.
///
/// Handed to the body of [`Storage::transaction`](super::Storage::transaction).
/// Reads see the transaction's own writes; writes become visible when the
/// body returns `Ok(true)` and the commit succeeds.
pub struct StorageTxn<'a, X> {
    txn: &'a X,
    cx: Context<'a>,
}

impl<X> fmt::Debug for StorageTxn<'_, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageTxn").finish_non_exhaustive()
    }
}

impl<'a, X: Transaction> StorageTxn<'a, X> {
    pub(crate) fn new(txn: &'a X, cx: Context<'a>) -> Self {
        Self { txn, cx }
    }

    /// The underlying backend transaction.
    #[must_use]
    pub fn raw(&self) -> &X {
        self.txn
    }

    /// Reads the record at `key`.
    ///
    /// # Errors
    ///
    /// Returns a record error if the read or decode fails.
    pub fn find<T: Schema>(&self, key: &str) -> CoreResult<Option<T>> {
        ops::find(self.cx, self.txn, key)
    }

    /// Reads the record at `key`, failing with `NotFound` if absent.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a record error.
    pub fn get<T: Schema>(&self, key: &str) -> CoreResult<T> {
        ops::get(self.cx, self.txn, key)
    }

    /// Reads the record at `key` and tracks it for conflicts.
    ///
    /// # Errors
    ///
    /// Returns a record error if the read or decode fails.
    pub fn get_for_update<T: Schema>(&self, key: &str) -> CoreResult<Option<T>> {
        ops::find_for_update(self.cx, self.txn, key)
    }

    /// Writes `value` at `key` and maintains its index entries.
    ///
    /// # Errors
    ///
    /// Returns a record error if encoding or a write fails.
    pub fn put<T: Schema>(&self, key: &str, value: &T) -> CoreResult<()> {
        ops::put_in_txn(self.cx, self.txn, key, value)
    }

    /// Removes the record at `key`. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a record error if a read or write fails.
    pub fn remove<T: Schema>(&self, key: &str) -> CoreResult<bool> {
        ops::remove_in_txn::<T, X>(self.cx, self.txn, key)
    }

    /// Reads several records, aligned with `keys`.
    ///
    /// # Errors
    ///
    /// Returns a record error for the first key that fails to decode.
    pub fn multi_get<T: Schema, K: AsRef<str>>(&self, keys: &[K]) -> CoreResult<Vec<Option<T>>> {
        ops::multi_get(self.cx, self.txn, keys)
    }

    /// Iterates records whose key starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot start.
    pub fn seek<T: Schema>(&self, prefix: &str, lower_bound: Option<&str>) -> CoreResult<SchemaIter<T, X::Iter>> {
        ops::seek(self.cx, self.txn, prefix, lower_bound)
    }

    /// Collects up to `max` records under `prefix`; `0` means all.
    ///
    /// # Errors
    ///
    /// Returns the first read or decode error.
    pub fn seek_all<T: Schema>(&self, prefix: &str, max: usize) -> CoreResult<Vec<T>> {
        ops::seek_all(self.cx, self.txn, prefix, max)
    }

    /// Removes every record under `prefix`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns the first read or write error.
    pub fn remove_by_prefix<T: Schema>(&self, prefix: &str) -> CoreResult<usize> {
        ops::remove_by_prefix_in_txn::<T, X>(self.cx, self.txn, prefix)
    }

    /// Reads one page of records after `start`.
    ///
    /// # Errors
    ///
    /// Returns the first read or decode error.
    pub fn next<T: Schema>(&self, prefix: &str, start: Option<&str>, max: usize) -> CoreResult<Page<T>> {
        ops::next(self.cx, self.txn, prefix, start, max)
    }

    /// Records whose `index` value equals `value`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndex`, `IndexInconsistency` or a read error.
    pub fn get_by_index<T: Schema>(&self, index: &str, value: &impl Display) -> CoreResult<Vec<T>> {
        ops::get_by_index(self.cx, self.txn, index, &value.to_string())
    }

    /// Reads a raw key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn get_raw(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        self.txn.get(key)
    }

    /// Writes a raw key, bypassing encoding and index maintenance.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn put_raw(&self, key: &str, value: &[u8]) -> CoreResult<()> {
        self.txn.put(key, value)
    }

    /// Removes a raw key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn remove_raw(&self, key: &str) -> CoreResult<()> {
        self.txn.remove(key)
    }
}
