//! Optimistic transactions.

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::iter::{start_key, EngineIter};
use crate::record::LogOp;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tracing::debug;

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and writes.
    Active,
    /// Committed successfully.
    Committed,
    /// Aborted explicitly or by a commit conflict.
    Aborted,
}

#[derive(Debug)]
struct TxnState {
    /// Pending writes; `None` is a delete.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Keys validated at commit, with the sequence they were first seen at.
    tracked: HashMap<Vec<u8>, u64>,
    status: TransactionStatus,
    registered: bool,
}

/// An optimistic transaction over an [`Engine`].
///
/// Writes are buffered and become visible atomically on commit. Reads see
/// the transaction's own pending writes layered over committed data.
///
/// Conflicts are detected at commit time: if any key read with
/// [`get_for_update`](Self::get_for_update) or written through this
/// transaction was changed by another commit in the meantime, the commit
/// reports `Ok(false)` and nothing is applied.
#[derive(Debug)]
pub struct EngineTransaction {
    engine: Engine,
    begin_seq: u64,
    state: Mutex<TxnState>,
}

impl EngineTransaction {
    pub(crate) fn new(engine: Engine, begin_seq: u64) -> Self {
        Self {
            engine,
            begin_seq,
            state: Mutex::new(TxnState {
                writes: BTreeMap::new(),
                tracked: HashMap::new(),
                status: TransactionStatus::Active,
                registered: true,
            }),
        }
    }

    /// Sequence of the last commit visible when the transaction began.
    #[must_use]
    pub fn begin_sequence(&self) -> u64 {
        self.begin_seq
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }

    /// Reads `key` without tracking it for conflicts.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is finished or the engine closed.
    pub fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        let state = self.state.lock();
        ensure_active(&state)?;
        if let Some(pending) = state.writes.get(key) {
            return Ok(pending.clone());
        }
        drop(state);
        self.engine.get(key)
    }

    /// Reads several keys without tracking them. Aligned with `keys`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is finished or the engine closed.
    pub fn multi_get<K: AsRef<[u8]>>(&self, keys: &[K]) -> EngineResult<Vec<Option<Vec<u8>>>> {
        let state = self.state.lock();
        ensure_active(&state)?;
        let mut values = self.engine.multi_get(keys)?;
        for (key, value) in keys.iter().zip(values.iter_mut()) {
            if let Some(pending) = state.writes.get(key.as_ref()) {
                value.clone_from(pending);
            }
        }
        Ok(values)
    }

    /// Reads `key` and tracks it, so the commit fails if another commit
    /// writes it first.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is finished or the engine closed.
    pub fn get_for_update(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        ensure_active(&state)?;
        if let Some(pending) = state.writes.get(key) {
            return Ok(pending.clone());
        }
        let (value, sequence) = self.engine.get_versioned(key)?;
        state.tracked.entry(key.to_vec()).or_insert(sequence);
        Ok(value)
    }

    /// Buffers a write of `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is finished or the engine closed.
    pub fn put(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.buffer(key, Some(value.to_vec()))
    }

    /// Buffers a removal of `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is finished or the engine closed.
    pub fn remove(&self, key: &[u8]) -> EngineResult<()> {
        self.buffer(key, None)
    }

    fn buffer(&self, key: &[u8], value: Option<Vec<u8>>) -> EngineResult<()> {
        let mut state = self.state.lock();
        ensure_active(&state)?;
        self.engine.ensure_open()?;
        if !state.tracked.contains_key(key) {
            let sequence = self.engine.sequence();
            state.tracked.insert(key.to_vec(), sequence);
        }
        state.writes.insert(key.to_vec(), value);
        Ok(())
    }

    /// Prefix scan over committed data merged with pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is finished or the engine closed.
    pub fn seek(&self, prefix: &[u8], lower_bound: Option<&[u8]>) -> EngineResult<EngineIter> {
        let state = self.state.lock();
        ensure_active(&state)?;
        let start = start_key(prefix, lower_bound);
        let range = (Bound::Included(start.as_slice()), Bound::Unbounded);

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.engine.read_state(|committed| {
            committed
                .data
                .range::<[u8], _>(range)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })?;

        for (key, pending) in state
            .writes
            .range::<[u8], _>(range)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match pending {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }

        Ok(EngineIter::new(merged.into_iter().collect()))
    }

    /// Number of buffered writes.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.state.lock().writes.len()
    }

    /// Validates and applies the buffered writes.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` on an optimistic
    /// conflict. Either way the transaction is finished afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction was already finished, the engine
    /// is closed, or the commit log write fails.
    pub fn commit(&self) -> EngineResult<bool> {
        let mut state = self.state.lock();
        ensure_active(&state)?;

        let ops: Vec<LogOp> = std::mem::take(&mut state.writes)
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => LogOp::Put { key, value },
                None => LogOp::Delete { key },
            })
            .collect();

        let result = self.engine.commit_tracked(&state.tracked, ops);
        self.finish(&mut state, match &result {
            Ok(Some(_)) => TransactionStatus::Committed,
            _ => TransactionStatus::Aborted,
        });

        match result? {
            Some(sequence) => {
                if self.engine.config().debug_logging {
                    debug!(begin = self.begin_seq, sequence, "transaction committed");
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Discards the buffered writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction was already finished.
    pub fn abort(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        ensure_active(&state)?;
        state.writes.clear();
        self.finish(&mut state, TransactionStatus::Aborted);
        Ok(())
    }

    fn finish(&self, state: &mut TxnState, status: TransactionStatus) {
        state.status = status;
        if state.registered {
            state.registered = false;
            self.engine.finish_transaction(self.begin_seq);
        }
    }
}

impl Drop for EngineTransaction {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.registered {
            state.registered = false;
            self.engine.finish_transaction(self.begin_seq);
        }
    }
}

fn ensure_active(state: &TxnState) -> EngineResult<()> {
    match state.status {
        TransactionStatus::Active => Ok(()),
        TransactionStatus::Committed => Err(EngineError::invalid_operation(
            "transaction already committed",
        )),
        TransactionStatus::Aborted => Err(EngineError::invalid_operation(
            "transaction already aborted",
        )),
    }
}
