//! The ordered key-value engine.

use crate::config::EngineConfig;
use crate::dir::DatabaseDir;
use crate::error::{EngineError, EngineResult};
use crate::iter::{collect_prefix, start_key, EngineIter};
use crate::log::{FileLog, LogDevice};
use crate::record::{scan, CommitRecord, LogOp};
use crate::transaction::EngineTransaction;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Commits between passes that drop version stamps no live transaction
/// can conflict with.
const PRUNE_INTERVAL: u32 = 1024;

/// Committed state visible to readers.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) data: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Sequence of the last commit that wrote each key, deletes included.
    versions: HashMap<Vec<u8>, u64>,
    pub(crate) sequence: u64,
}

struct CommitLog {
    device: Option<Box<dyn LogDevice>>,
    unflushed: usize,
    commits_since_prune: u32,
}

pub(crate) struct EngineInner {
    state: RwLock<State>,
    commit: Mutex<CommitLog>,
    /// Begin sequence of each live transaction, with a count per sequence.
    active: Mutex<BTreeMap<u64, usize>>,
    closed: AtomicBool,
    config: EngineConfig,
    dir: Mutex<Option<DatabaseDir>>,
}

/// An embedded ordered key-value engine with optimistic transactions.
///
/// Keys are kept in byte order. Every write, whether a direct
/// [`put`](Engine::put) or a transaction commit, is applied atomically
/// under a single commit sequence and appended to the commit log before it
/// becomes visible.
///
/// `Engine` is a cheap handle; clones share the same database.
///
/// # Lock order
///
/// `commit` → `active` → `state`. The state lock is never held while
/// acquiring `active`.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.inner.config.path)
            .field("sequence", &self.sequence())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Engine {
    /// Opens an engine according to `config`.
    ///
    /// Without a path this is equivalent to [`Engine::in_memory_with`].
    /// With a path the directory lock is taken and the commit log replayed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened or locked, or if
    /// the commit log is corrupted.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let Some(path) = config.path.clone() else {
            return Ok(Self::in_memory_with(config));
        };

        let dir = DatabaseDir::open(&path, config.create_if_missing, config.error_if_exists)?;
        let device = FileLog::open(&dir.log_path())?;
        let engine = Self::with_log(device, config)?;
        *engine.inner.dir.lock() = Some(dir);

        info!(path = %path.display(), sequence = engine.sequence(), "opened database");
        Ok(engine)
    }

    /// Creates an engine with no commit log.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::in_memory_with(EngineConfig::default())
    }

    /// Creates an engine with no commit log using `config`'s tuning.
    #[must_use]
    pub fn in_memory_with(config: EngineConfig) -> Self {
        Self::from_parts(State::default(), None, config)
    }

    /// Creates an engine on top of an existing log device, replaying it.
    ///
    /// A torn final record is dropped and the device truncated to the last
    /// complete record.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is corrupted or cannot be read.
    pub fn with_log(mut device: impl LogDevice + 'static, config: EngineConfig) -> EngineResult<Self> {
        let bytes = device.read_all()?;
        let replay = scan(&bytes)?;

        if replay.has_torn_tail(bytes.len() as u64) {
            warn!(
                valid = replay.valid_len,
                total = bytes.len(),
                "dropping torn record at end of commit log"
            );
            device.truncate(replay.valid_len)?;
        }

        let mut state = State::default();
        let records = replay.records.len();
        for record in replay.records {
            state.apply(record.sequence, record.ops);
        }
        debug!(records, sequence = state.sequence, "commit log replayed");

        Ok(Self::from_parts(state, Some(Box::new(device)), config))
    }

    fn from_parts(state: State, device: Option<Box<dyn LogDevice>>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: RwLock::new(state),
                commit: Mutex::new(CommitLog {
                    device,
                    unflushed: 0,
                    commits_since_prune: 0,
                }),
                active: Mutex::new(BTreeMap::new()),
                closed: AtomicBool::new(false),
                config,
                dir: Mutex::new(None),
            }),
        }
    }

    /// Returns the configuration this engine was opened with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Reads the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] after [`Engine::close`].
    pub fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.inner.state.read().data.get(key).cloned())
    }

    /// Reads several keys from one consistent snapshot.
    ///
    /// The result is aligned with `keys`: entry `i` is the value of `keys[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] after [`Engine::close`].
    pub fn multi_get<K: AsRef<[u8]>>(&self, keys: &[K]) -> EngineResult<Vec<Option<Vec<u8>>>> {
        self.ensure_open()?;
        let state = self.inner.state.read();
        Ok(keys
            .iter()
            .map(|k| state.data.get(k.as_ref()).cloned())
            .collect())
    }

    /// Writes a single key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the log write fails.
    pub fn put(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write_batch(vec![LogOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }])
        .map(|_| ())
    }

    /// Removes a single key. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the log write fails.
    pub fn remove(&self, key: &[u8]) -> EngineResult<()> {
        self.write_batch(vec![LogOp::Delete { key: key.to_vec() }])
            .map(|_| ())
    }

    /// Applies `ops` atomically and returns the commit sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the log write fails.
    pub fn write_batch(&self, ops: Vec<LogOp>) -> EngineResult<u64> {
        match self.commit_tracked(&HashMap::new(), ops)? {
            Some(sequence) => Ok(sequence),
            None => Err(EngineError::invalid_operation(
                "untracked batch reported a conflict",
            )),
        }
    }

    /// Returns an iterator over keys starting with `prefix`.
    ///
    /// Iteration starts at `lower_bound` when it sorts after `prefix`, and
    /// stops at the first key that no longer starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] after [`Engine::close`].
    pub fn seek(&self, prefix: &[u8], lower_bound: Option<&[u8]>) -> EngineResult<EngineIter> {
        self.ensure_open()?;
        let start = start_key(prefix, lower_bound);
        let state = self.inner.state.read();
        let entries = collect_prefix(
            state
                .data
                .range::<[u8], _>((Bound::Included(start.as_slice()), Bound::Unbounded)),
            prefix,
        );
        Ok(EngineIter::new(entries))
    }

    /// Begins an optimistic transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] after [`Engine::close`].
    pub fn begin(&self) -> EngineResult<EngineTransaction> {
        self.ensure_open()?;
        let begin_seq = {
            let mut active = self.inner.active.lock();
            let sequence = self.inner.state.read().sequence;
            *active.entry(sequence).or_insert(0) += 1;
            sequence
        };
        Ok(EngineTransaction::new(self.clone(), begin_seq))
    }

    /// Sequence of the most recent commit. Zero for a fresh database.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.inner.state.read().sequence
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.read().data.len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of transactions that have begun and not yet finished.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.inner.active.lock().values().sum()
    }

    /// Flushes buffered log writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&self) -> EngineResult<()> {
        let mut log = self.inner.commit.lock();
        if let Some(device) = log.device.as_mut() {
            device.flush()?;
        }
        Ok(())
    }

    /// Syncs the commit log to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> EngineResult<()> {
        let mut guard = self.inner.commit.lock();
        let log = &mut *guard;
        if let Some(device) = log.device.as_mut() {
            device.flush()?;
            device.sync()?;
        }
        log.unflushed = 0;
        Ok(())
    }

    /// Syncs and closes the engine, releasing the directory lock.
    ///
    /// Every handle sharing this engine observes the close. Closing twice
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> EngineResult<()> {
        let mut log = self.inner.commit.lock();
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut device) = log.device.take() {
            device.flush()?;
            device.sync()?;
        }
        self.inner.dir.lock().take();
        info!(sequence = self.sequence(), "engine closed");
        Ok(())
    }

    /// Returns `true` until [`Engine::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> EngineResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(EngineError::Closed)
        }
    }

    /// Reads `key` together with the sequence the read is consistent with.
    pub(crate) fn get_versioned(&self, key: &[u8]) -> EngineResult<(Option<Vec<u8>>, u64)> {
        self.ensure_open()?;
        let state = self.inner.state.read();
        Ok((state.data.get(key).cloned(), state.sequence))
    }

    pub(crate) fn read_state<R>(&self, f: impl FnOnce(&State) -> R) -> EngineResult<R> {
        self.ensure_open()?;
        Ok(f(&self.inner.state.read()))
    }

    /// Validates `tracked` and applies `ops` as one commit.
    ///
    /// A key conflicts when a commit newer than its tracked sequence wrote
    /// it. Returns `Ok(None)` on conflict and leaves the database untouched.
    pub(crate) fn commit_tracked(
        &self,
        tracked: &HashMap<Vec<u8>, u64>,
        ops: Vec<LogOp>,
    ) -> EngineResult<Option<u64>> {
        let mut guard = self.inner.commit.lock();
        self.ensure_open()?;
        let log = &mut *guard;

        let sequence = {
            let state = self.inner.state.read();
            let conflict = tracked.iter().find(|(key, seen)| {
                state
                    .versions
                    .get(key.as_slice())
                    .is_some_and(|written| written > *seen)
            });
            if let Some((key, _)) = conflict {
                if self.inner.config.debug_logging {
                    debug!(key = %String::from_utf8_lossy(key), "commit conflict");
                }
                return Ok(None);
            }
            if ops.is_empty() {
                return Ok(Some(state.sequence));
            }
            state.sequence + 1
        };

        let record = CommitRecord { sequence, ops };
        if let Some(device) = log.device.as_mut() {
            let bytes = record.encode()?;
            device.append(&bytes)?;
            if self.inner.config.sync_on_commit {
                device.sync()?;
            } else {
                log.unflushed += bytes.len();
                if log.unflushed >= self.inner.config.write_buffer_size {
                    device.flush()?;
                    device.sync()?;
                    log.unflushed = 0;
                }
            }
        }

        let op_count = record.ops.len();
        self.inner.state.write().apply(sequence, record.ops);
        if self.inner.config.debug_logging {
            debug!(sequence, ops = op_count, "commit applied");
        }

        log.commits_since_prune += 1;
        if log.commits_since_prune >= PRUNE_INTERVAL {
            log.commits_since_prune = 0;
            self.prune_versions();
        }

        Ok(Some(sequence))
    }

    pub(crate) fn finish_transaction(&self, begin_seq: u64) {
        let mut active = self.inner.active.lock();
        if let Some(count) = active.get_mut(&begin_seq) {
            *count -= 1;
            if *count == 0 {
                active.remove(&begin_seq);
            }
        }
    }

    /// Drops version stamps at or below the oldest live transaction's begin
    /// sequence. Tracked sequences are never older than their transaction's
    /// begin, so those stamps can no longer cause a conflict.
    fn prune_versions(&self) {
        let oldest = self.inner.active.lock().keys().next().copied();
        let mut state = self.inner.state.write();
        let floor = oldest.unwrap_or(state.sequence);
        let before = state.versions.len();
        state.versions.retain(|_, written| *written > floor);
        if self.inner.config.debug_logging {
            debug!(floor, pruned = before - state.versions.len(), "pruned version stamps");
        }
    }
}

impl State {
    fn apply(&mut self, sequence: u64, ops: Vec<LogOp>) {
        for op in ops {
            match op {
                LogOp::Put { key, value } => {
                    self.versions.insert(key.clone(), sequence);
                    self.data.insert(key, value);
                }
                LogOp::Delete { key } => {
                    self.data.remove(&key);
                    self.versions.insert(key, sequence);
                }
            }
        }
        self.sequence = self.sequence.max(sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use tempfile::tempdir;

    fn collect(mut iter: EngineIter) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        while iter.next() {
            keys.push(iter.key().to_vec());
        }
        keys
    }

    #[test]
    fn put_get_remove() {
        let engine = Engine::in_memory();
        engine.put(b"a", b"1").unwrap();
        assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
        engine.remove(b"a").unwrap();
        assert_eq!(engine.get(b"a").unwrap(), None);
        engine.remove(b"never-written").unwrap();
        assert_eq!(engine.sequence(), 3);
    }

    #[test]
    fn multi_get_is_aligned() {
        let engine = Engine::in_memory();
        engine.put(b"a", b"1").unwrap();
        engine.put(b"c", b"3").unwrap();

        let values = engine.multi_get(&[b"a".as_slice(), b"b", b"c"]).unwrap();
        assert_eq!(values, vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]);
    }

    #[test]
    fn seek_respects_prefix_and_bound() {
        let engine = Engine::in_memory();
        for key in ["p:a", "p:b", "p:c", "q:a"] {
            engine.put(key.as_bytes(), b"").unwrap();
        }

        assert_eq!(collect(engine.seek(b"p:", None).unwrap()).len(), 3);
        assert_eq!(
            collect(engine.seek(b"p:", Some(b"p:b")).unwrap()),
            vec![b"p:b".to_vec(), b"p:c".to_vec()]
        );
        assert!(collect(engine.seek(b"p:", Some(b"p:z")).unwrap()).is_empty());
        assert_eq!(collect(engine.seek(b"p:", Some(b"a")).unwrap()).len(), 3);
        assert!(collect(engine.seek(b"r:", None).unwrap()).is_empty());
    }

    #[test]
    fn write_batch_is_atomic() {
        let engine = Engine::in_memory();
        let seq = engine
            .write_batch(vec![
                LogOp::Put {
                    key: b"x".to_vec(),
                    value: b"1".to_vec(),
                },
                LogOp::Put {
                    key: b"y".to_vec(),
                    value: b"2".to_vec(),
                },
            ])
            .unwrap();
        assert_eq!(seq, 1);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn replays_memory_log() {
        let log = MemoryLog::new();
        {
            let engine = Engine::with_log(log.clone(), EngineConfig::default()).unwrap();
            engine.put(b"k1", b"v1").unwrap();
            engine.put(b"k2", b"v2").unwrap();
            engine.remove(b"k1").unwrap();
        }

        let engine = Engine::with_log(log, EngineConfig::default()).unwrap();
        assert_eq!(engine.get(b"k1").unwrap(), None);
        assert_eq!(engine.get(b"k2").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(engine.sequence(), 3);
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let log = MemoryLog::new();
        {
            let engine = Engine::with_log(log.clone(), EngineConfig::default()).unwrap();
            engine.put(b"k1", b"v1").unwrap();
        }
        let good_len = log.snapshot().len();
        let mut torn = log.clone();
        torn.append(b"SKVL\x01\x00\xff").unwrap();

        let engine = Engine::with_log(torn, EngineConfig::default()).unwrap();
        assert_eq!(engine.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(log.snapshot().len(), good_len);
    }

    #[test]
    fn file_engine_persists_and_locks() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::at(dir.path().join("db"));

        {
            let engine = Engine::open(config.clone()).unwrap();
            engine.put(b"key", b"value").unwrap();
            assert!(matches!(
                Engine::open(config.clone()).unwrap_err(),
                EngineError::Locked
            ));
            engine.close().unwrap();
        }

        let engine = Engine::open(config).unwrap();
        assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn closed_engine_rejects_operations() {
        let engine = Engine::in_memory();
        engine.close().unwrap();
        engine.close().unwrap();
        assert!(matches!(engine.get(b"a"), Err(EngineError::Closed)));
        assert!(matches!(engine.put(b"a", b"b"), Err(EngineError::Closed)));
        assert!(matches!(engine.begin(), Err(EngineError::Closed)));
    }

    #[test]
    fn buffered_log_defers_sync() {
        let log = MemoryLog::new();
        let config = EngineConfig::default()
            .sync_on_commit(false)
            .write_buffer_size(1 << 20);
        let engine = Engine::with_log(log.clone(), config).unwrap();
        engine.put(b"k", b"v").unwrap();
        engine.sync().unwrap();
        assert!(!log.snapshot().is_empty());
    }

    #[test]
    fn prune_keeps_conflict_detection() {
        let engine = Engine::in_memory();
        let txn = engine.begin().unwrap();
        assert_eq!(txn.get_for_update(b"hot").unwrap(), None);

        for i in 0..PRUNE_INTERVAL {
            engine.put(b"hot", &i.to_le_bytes()).unwrap();
        }

        txn.put(b"hot", b"late").unwrap();
        assert!(!txn.commit().unwrap());
    }
}
