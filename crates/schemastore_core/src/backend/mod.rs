//! The ordered key-value backend abstraction.
//!
//! Keys are strings built by [`KeyCodec`](schemastore_codec::KeyCodec);
//! values are opaque bytes. All methods take `&self` so a backend can be
//! shared between threads.

mod engine;

use crate::config::RetryPolicy;
use crate::error::{CoreError, CoreResult};
use schemastore_codec::CodecError;
use tracing::{debug, warn};

/// A forward cursor over a prefix range.
///
/// The cursor starts before the first entry; [`next`](Self::next) must be
/// called before reading.
pub trait RawIterator {
    /// Advances to the next entry. Returns `false` once exhausted.
    fn next(&mut self) -> bool;

    /// Key of the current entry.
    fn key(&self) -> &[u8];

    /// Value of the current entry.
    fn value(&self) -> &[u8];

    /// The current value as UTF-8, used for index back-references.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the value is not valid UTF-8.
    fn value_raw(&self) -> CoreResult<&str> {
        std::str::from_utf8(self.value())
            .map_err(|e| CodecError::decode(format!("value is not UTF-8: {e}")).into())
    }

    /// The current key as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the key is not valid UTF-8.
    fn key_str(&self) -> CoreResult<&str> {
        std::str::from_utf8(self.key())
            .map_err(|e| CodecError::decode(format!("key is not UTF-8: {e}")).into())
    }
}

/// Read operations shared by backends and transactions.
pub trait KvRead {
    /// Iterator returned by [`seek`](Self::seek).
    type Iter: RawIterator;

    /// Reads one key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;

    /// Reads several keys. The result has one slot per input key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn multi_get(&self, keys: &[String]) -> CoreResult<Vec<Option<Vec<u8>>>>;

    /// Iterates keys starting with `prefix`, from `max(prefix, lower_bound)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn seek(&self, prefix: &str, lower_bound: Option<&str>) -> CoreResult<Self::Iter>;
}

/// Write operations shared by backends and transactions.
pub trait KvWrite {
    /// Writes one key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn put(&self, key: &str, value: &[u8]) -> CoreResult<()>;

    /// Removes one key. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn remove(&self, key: &str) -> CoreResult<()>;
}

/// An optimistic transaction.
///
/// Reads observe the transaction's own pending writes. Writes and
/// [`get_for_update`](Self::get_for_update) reads are conflict tracked.
pub trait Transaction: KvRead + KvWrite {
    /// Reads `key` and adds it to the conflict set.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn get_for_update(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;

    /// Commits. `Ok(false)` reports an optimistic conflict.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn commit(self) -> CoreResult<bool>;

    /// Discards pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction was already finished.
    fn abort(self) -> CoreResult<()>;
}

/// An ordered key-value store with optimistic transactions.
pub trait Backend: KvRead + KvWrite + Send + Sync {
    /// Transaction type produced by [`begin`](Self::begin).
    type Txn: Transaction;

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    fn begin(&self) -> CoreResult<Self::Txn>;

    /// Runs `f` in a transaction, retrying on conflict when `retry` is set.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` and from the engine.
    fn transaction<F>(&self, retry: bool, f: F) -> CoreResult<bool>
    where
        F: FnMut(&Self::Txn) -> CoreResult<bool>,
    {
        let policy = if retry {
            RetryPolicy::Unbounded
        } else {
            RetryPolicy::none()
        };
        self.transaction_with(policy, f)
    }

    /// Runs `f` in a transaction under an explicit retry policy.
    ///
    /// `f` returning `Ok(true)` commits and `Ok(false)` aborts. An error
    /// aborts and is propagated. A conflicting commit re-runs `f` in a
    /// fresh transaction while `policy` allows; a run that is still
    /// conflicting when the budget is spent returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` and from the engine.
    fn transaction_with<F>(&self, policy: RetryPolicy, mut f: F) -> CoreResult<bool>
    where
        F: FnMut(&Self::Txn) -> CoreResult<bool>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let txn = self.begin()?;

            match f(&txn) {
                Ok(true) => {}
                Ok(false) => {
                    txn.abort()?;
                    return Ok(false);
                }
                Err(e) => {
                    if let Err(abort) = txn.abort() {
                        debug!(error = %abort, "abort after failed transaction body");
                    }
                    return Err(e);
                }
            }

            if txn.commit()? {
                if attempt > 1 {
                    debug!(attempt, "transaction committed after retry");
                }
                return Ok(true);
            }

            debug!(attempt, "optimistic commit conflict");
            if !policy.allows_retry(attempt) {
                warn!(attempts = attempt, "transaction retry budget exhausted");
                return Ok(false);
            }
        }
    }
}

/// Error for a conflict that outlived its retry budget.
pub(crate) fn conflict(schema: &str, key: &str, attempts: u32) -> CoreError {
    CoreError::TransactionConflict {
        schema: schema.to_string(),
        key: key.to_string(),
        attempts,
    }
}
