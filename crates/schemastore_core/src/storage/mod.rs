//! The schema-aware storage facade.

mod iter;
mod ops;
mod txn;

pub use iter::SchemaIter;
pub use txn::StorageTxn;

use crate::backend::{conflict, Backend, KvRead, KvWrite};
use crate::config::{RetryPolicy, StorageConfig};
use crate::error::CoreResult;
use crate::registry::SchemaRegistry;
use crate::schema::Schema;
use ops::Context;
use schemastore_engine::{Engine, EngineConfig};
use std::fmt::{self, Display};

/// One page of a paginated scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Records in key order.
    pub items: Vec<T>,
    /// Key of the last item when the page is full; pass it as `start` to
    /// fetch the next page. The empty logical key is a valid cursor.
    pub last_key: Option<String>,
}

/// Typed, schema-aware storage over a [`Backend`].
///
/// Records are addressed by `(schema, logical key)`. Every write of an
/// indexed schema keeps its index entries consistent by running inside an
/// optimistic transaction.
///
/// # Example
///
/// ```rust
/// use schemastore_core::{Schema, Storage};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Player {
///     name: String,
/// }
///
/// impl Schema for Player {
///     const NAME: &'static str = "Player";
/// }
///
/// let storage = Storage::in_memory();
/// storage.put("p1", &Player { name: "Alice".into() }).unwrap();
/// assert_eq!(
///     storage.find::<Player>("p1").unwrap(),
///     Some(Player { name: "Alice".into() })
/// );
/// ```
pub struct Storage<B: Backend = Engine> {
    backend: B,
    registry: SchemaRegistry,
    config: StorageConfig,
}

impl<B: Backend> fmt::Debug for Storage<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Storage<Engine> {
    /// Opens storage on an engine built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be opened.
    pub fn open(config: EngineConfig) -> CoreResult<Self> {
        Ok(Self::new(Engine::open(config)?))
    }

    /// Opens storage with explicit engine and storage configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be opened.
    pub fn open_with(engine: EngineConfig, storage: StorageConfig) -> CoreResult<Self> {
        Ok(Self::with_config(Engine::open(engine)?, storage))
    }

    /// Creates storage on a fresh in-memory engine.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Engine::in_memory())
    }

    /// Syncs the commit log.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        Ok(self.backend.sync()?)
    }

    /// Closes the engine and releases its directory lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> CoreResult<()> {
        Ok(self.backend.close()?)
    }
}

impl<B: Backend> Storage<B> {
    /// Creates storage over `backend` with default configuration.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StorageConfig::default())
    }

    /// Creates storage over `backend` with `config`.
    pub fn with_config(backend: B, config: StorageConfig) -> Self {
        Self {
            backend,
            registry: SchemaRegistry::new(),
            config,
        }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The storage configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn cx(&self) -> Context<'_> {
        Context {
            registry: &self.registry,
            auto_register: self.config.auto_register,
        }
    }

    /// Registers `T` explicitly.
    ///
    /// # Errors
    ///
    /// Returns a schema error for invalid or conflicting declarations.
    pub fn register<T: Schema>(&self) -> CoreResult<()> {
        self.registry.register::<T>()
    }

    /// Returns `true` if `T` declares an index named `index`.
    ///
    /// # Errors
    ///
    /// Returns a schema error if `T` cannot be resolved.
    pub fn has_index<T: Schema>(&self, index: &str) -> CoreResult<bool> {
        self.cx().schema::<T>()?;
        Ok(self.registry.has_index(T::NAME, index))
    }

    /// Reads the record at `key`. A missing key is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a record error if the read or decode fails.
    pub fn find<T: Schema>(&self, key: &str) -> CoreResult<Option<T>> {
        ops::find(self.cx(), &self.backend, key)
    }

    /// Reads the record at `key`, failing with `NotFound` if absent.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a record error.
    pub fn get<T: Schema>(&self, key: &str) -> CoreResult<T> {
        ops::get(self.cx(), &self.backend, key)
    }

    /// Writes `value` at `key`.
    ///
    /// For an indexed schema the prior value is read and stale index
    /// entries are replaced in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns a record error on encode or write failure, or
    /// `TransactionConflict` if a bounded retry policy runs out.
    pub fn put<T: Schema>(&self, key: &str, value: &T) -> CoreResult<()> {
        let cx = self.cx();
        let schema = cx.schema::<T>()?;
        if !schema.is_indexed() {
            return ops::put_plain(&schema, &self.backend, key, value);
        }
        self.write_atomically::<T, _>(key, |txn| ops::put_in_txn(cx, txn, key, value))
    }

    /// Removes the record at `key` and its index entries.
    ///
    /// Returns `false` if there was no record.
    ///
    /// # Errors
    ///
    /// Returns a record error on failure, or `TransactionConflict` if a
    /// bounded retry policy runs out.
    pub fn remove<T: Schema>(&self, key: &str) -> CoreResult<bool> {
        let cx = self.cx();
        let schema = cx.schema::<T>()?;
        if !schema.is_indexed() {
            return ops::remove_plain(&schema, &self.backend, key);
        }
        self.write_atomically::<T, _>(key, |txn| ops::remove_in_txn::<T, B::Txn>(cx, txn, key))
    }

    /// Reads several records. The result has one slot per key, in order.
    ///
    /// # Errors
    ///
    /// Returns a record error for the first key that fails to decode.
    pub fn multi_get<T: Schema, K: AsRef<str>>(&self, keys: &[K]) -> CoreResult<Vec<Option<T>>> {
        ops::multi_get(self.cx(), &self.backend, keys)
    }

    /// Iterates records whose key starts with `prefix`, beginning at
    /// `lower_bound` when it sorts after `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot start.
    pub fn seek<T: Schema>(&self, prefix: &str, lower_bound: Option<&str>) -> CoreResult<SchemaIter<T, B::Iter>> {
        ops::seek(self.cx(), &self.backend, prefix, lower_bound)
    }

    /// Collects up to `max` records under `prefix`; `0` means all.
    ///
    /// # Errors
    ///
    /// Returns the first read or decode error.
    pub fn seek_all<T: Schema>(&self, prefix: &str, max: usize) -> CoreResult<Vec<T>> {
        ops::seek_all(self.cx(), &self.backend, prefix, max)
    }

    /// Removes every record under `prefix` with its index entries.
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns the first read or write error, or `TransactionConflict` if a
    /// bounded retry policy runs out.
    pub fn remove_by_prefix<T: Schema>(&self, prefix: &str) -> CoreResult<usize> {
        let cx = self.cx();
        let schema = cx.schema::<T>()?;
        if !schema.is_indexed() {
            return ops::remove_by_prefix_plain(&schema, &self.backend, prefix);
        }
        self.write_atomically::<T, _>(prefix, |txn| {
            ops::remove_by_prefix_in_txn::<T, B::Txn>(cx, txn, prefix)
        })
    }

    /// Reads one page of at most `max` records under `prefix`, strictly
    /// after `start` (`None` starts at the beginning, `max == 0` reads
    /// everything).
    ///
    /// Pass the previous page's `last_key` as `start` to continue:
    ///
    /// ```rust,ignore
    /// let mut cursor = None;
    /// loop {
    ///     let page = storage.next::<Player>("", cursor.as_deref(), 100)?;
    ///     // ...
    ///     match page.last_key {
    ///         Some(key) => cursor = Some(key),
    ///         None => break,
    ///     }
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the first read or decode error.
    pub fn next<T: Schema>(&self, prefix: &str, start: Option<&str>, max: usize) -> CoreResult<Page<T>> {
        ops::next(self.cx(), &self.backend, prefix, start, max)
    }

    /// Records whose `index` value equals `value`, in index key order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndex` for an undeclared index, `IndexInconsistency`
    /// if an entry refers to a missing record, or a read error.
    pub fn get_by_index<T: Schema>(&self, index: &str, value: &impl Display) -> CoreResult<Vec<T>> {
        ops::get_by_index(self.cx(), &self.backend, index, &value.to_string())
    }

    /// Atomically replaces the record at `key` with `f(current)` and
    /// returns the value written.
    ///
    /// `f` re-runs after every conflict, so it must depend only on its
    /// argument.
    ///
    /// # Errors
    ///
    /// Returns a record error on failure, or `TransactionConflict` if a
    /// bounded retry policy runs out.
    pub fn update<T, F>(&self, key: &str, mut f: F) -> CoreResult<T>
    where
        T: Schema,
        F: FnMut(Option<T>) -> T,
    {
        let cx = self.cx();
        self.write_atomically::<T, _>(key, |txn| {
            let current = ops::find_for_update(cx, txn, key)?;
            let next = f(current);
            ops::put_in_txn(cx, txn, key, &next)?;
            Ok(next)
        })
    }

    /// Like [`update`](Self::update), but `f` may decline by returning
    /// `None`, which leaves the record untouched and returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a record error on failure, or `TransactionConflict` if a
    /// bounded retry policy runs out.
    pub fn try_update<T, F>(&self, key: &str, mut f: F) -> CoreResult<Option<T>>
    where
        T: Schema,
        F: FnMut(Option<T>) -> Option<T>,
    {
        let cx = self.cx();
        let mut attempts = 0u32;
        let mut declined = false;
        let mut written = None;

        let committed = self.backend.transaction_with(self.config.retry, |txn| {
            attempts += 1;
            written = None;
            let current = ops::find_for_update(cx, txn, key)?;
            match f(current) {
                None => {
                    declined = true;
                    Ok(false)
                }
                Some(next) => {
                    ops::put_in_txn(cx, txn, key, &next)?;
                    written = Some(next);
                    Ok(true)
                }
            }
        })?;

        if committed {
            Ok(written)
        } else if declined {
            Ok(None)
        } else {
            Err(conflict(T::NAME, key, attempts))
        }
    }

    /// Runs `f` in a transaction using the configured retry policy.
    ///
    /// `Ok(true)` from `f` commits, `Ok(false)` aborts; an error aborts and
    /// is returned. Returns whether the transaction committed.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` and from the engine.
    pub fn transaction<F>(&self, f: F) -> CoreResult<bool>
    where
        F: FnMut(&StorageTxn<'_, B::Txn>) -> CoreResult<bool>,
    {
        self.transaction_with(self.config.retry, f)
    }

    /// Runs `f` in a transaction under an explicit retry policy.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f` and from the engine.
    pub fn transaction_with<F>(&self, policy: RetryPolicy, mut f: F) -> CoreResult<bool>
    where
        F: FnMut(&StorageTxn<'_, B::Txn>) -> CoreResult<bool>,
    {
        let cx = self.cx();
        self.backend
            .transaction_with(policy, |txn| f(&StorageTxn::new(txn, cx)))
    }

    /// Drops every index entry of `T` and rebuilds them from live records.
    /// Returns the number of records indexed.
    ///
    /// # Errors
    ///
    /// Returns the first read, decode or write error.
    pub fn rebuild_indexes<T: Schema>(&self) -> CoreResult<usize> {
        let cx = self.cx();
        self.write_atomically::<T, _>("", |txn| ops::rebuild_indexes::<T, B::Txn>(cx, txn))
    }

    /// Reads a raw store key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn get_raw(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        self.backend.get(key)
    }

    /// Writes a raw store key, bypassing encoding and index maintenance.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn put_raw(&self, key: &str, value: &[u8]) -> CoreResult<()> {
        self.backend.put(key, value)
    }

    /// Removes a raw store key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn remove_raw(&self, key: &str) -> CoreResult<()> {
        self.backend.remove(key)
    }

    /// Iterates raw store keys under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn seek_raw(&self, prefix: &str, lower_bound: Option<&str>) -> CoreResult<B::Iter> {
        self.backend.seek(prefix, lower_bound)
    }

    /// Runs `body` in a retried transaction and returns its output.
    fn write_atomically<T, R>(
        &self,
        key: &str,
        mut body: impl FnMut(&B::Txn) -> CoreResult<R>,
    ) -> CoreResult<R>
    where
        T: Schema,
    {
        let mut attempts = 0u32;
        let mut output = None;

        let committed = self.backend.transaction_with(self.config.retry, |txn| {
            attempts += 1;
            output = Some(body(txn)?);
            Ok(true)
        })?;

        match output {
            Some(value) if committed => Ok(value),
            _ => Err(conflict(T::NAME, key, attempts)),
        }
    }
}
