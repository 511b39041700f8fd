//! [`Backend`] implementation for the embedded engine.

use super::{Backend, KvRead, KvWrite, RawIterator, Transaction};
use crate::error::CoreResult;
use schemastore_engine::{Engine, EngineIter, EngineTransaction};

impl RawIterator for EngineIter {
    fn next(&mut self) -> bool {
        EngineIter::next(self)
    }

    fn key(&self) -> &[u8] {
        EngineIter::key(self)
    }

    fn value(&self) -> &[u8] {
        EngineIter::value(self)
    }
}

impl KvRead for Engine {
    type Iter = EngineIter;

    fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(Engine::get(self, key.as_bytes())?)
    }

    fn multi_get(&self, keys: &[String]) -> CoreResult<Vec<Option<Vec<u8>>>> {
        Ok(Engine::multi_get(self, keys)?)
    }

    fn seek(&self, prefix: &str, lower_bound: Option<&str>) -> CoreResult<EngineIter> {
        Ok(Engine::seek(
            self,
            prefix.as_bytes(),
            lower_bound.map(str::as_bytes),
        )?)
    }
}

impl KvWrite for Engine {
    fn put(&self, key: &str, value: &[u8]) -> CoreResult<()> {
        Ok(Engine::put(self, key.as_bytes(), value)?)
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        Ok(Engine::remove(self, key.as_bytes())?)
    }
}

impl Backend for Engine {
    type Txn = EngineTransaction;

    fn begin(&self) -> CoreResult<EngineTransaction> {
        Ok(Engine::begin(self)?)
    }
}

impl KvRead for EngineTransaction {
    type Iter = EngineIter;

    fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(EngineTransaction::get(self, key.as_bytes())?)
    }

    fn multi_get(&self, keys: &[String]) -> CoreResult<Vec<Option<Vec<u8>>>> {
        Ok(EngineTransaction::multi_get(self, keys)?)
    }

    fn seek(&self, prefix: &str, lower_bound: Option<&str>) -> CoreResult<EngineIter> {
        Ok(EngineTransaction::seek(
            self,
            prefix.as_bytes(),
            lower_bound.map(str::as_bytes),
        )?)
    }
}

impl KvWrite for EngineTransaction {
    fn put(&self, key: &str, value: &[u8]) -> CoreResult<()> {
        Ok(EngineTransaction::put(self, key.as_bytes(), value)?)
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        Ok(EngineTransaction::remove(self, key.as_bytes())?)
    }
}

impl Transaction for EngineTransaction {
    fn get_for_update(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(EngineTransaction::get_for_update(self, key.as_bytes())?)
    }

    fn commit(self) -> CoreResult<bool> {
        Ok(EngineTransaction::commit(&self)?)
    }

    fn abort(self) -> CoreResult<()> {
        Ok(EngineTransaction::abort(&self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use std::cell::Cell;

    fn collect(mut iter: impl RawIterator) -> Vec<String> {
        let mut keys = Vec::new();
        while iter.next() {
            keys.push(iter.key_str().unwrap().to_string());
        }
        keys
    }

    #[test]
    fn seek_bounds_prefix() {
        let engine = Engine::in_memory();
        KvWrite::put(&engine, "a:1", b"x").unwrap();
        KvWrite::put(&engine, "a:2", b"y").unwrap();
        KvWrite::put(&engine, "b:1", b"z").unwrap();

        assert_eq!(collect(KvRead::seek(&engine, "a:", None).unwrap()), ["a:1", "a:2"]);
        assert_eq!(collect(KvRead::seek(&engine, "a:", Some("a:2")).unwrap()), ["a:2"]);
    }

    #[test]
    fn value_raw_reads_utf8() {
        let engine = Engine::in_memory();
        KvWrite::put(&engine, "i", b"S:data:k").unwrap();
        KvWrite::put(&engine, "j", &[0xff, 0xfe]).unwrap();

        let mut iter = KvRead::seek(&engine, "", None).unwrap();
        assert!(RawIterator::next(&mut iter));
        assert_eq!(iter.value_raw().unwrap(), "S:data:k");
        assert!(RawIterator::next(&mut iter));
        assert!(iter.value_raw().is_err());
    }

    #[test]
    fn body_false_aborts() {
        let engine = Engine::in_memory();
        let committed = engine
            .transaction(true, |txn| {
                KvWrite::put(txn, "k", b"v")?;
                Ok(false)
            })
            .unwrap();
        assert!(!committed);
        assert_eq!(KvRead::get(&engine, "k").unwrap(), None);
    }

    #[test]
    fn body_error_aborts_and_propagates() {
        let engine = Engine::in_memory();
        let result = engine.transaction(true, |txn| {
            KvWrite::put(txn, "k", b"v")?;
            Err(crate::CoreError::invalid_operation("boom"))
        });
        assert!(result.is_err());
        assert_eq!(KvRead::get(&engine, "k").unwrap(), None);
        assert_eq!(engine.active_transactions(), 0);
    }

    #[test]
    fn conflict_reruns_body() {
        let engine = Engine::in_memory();
        let runs = Cell::new(0);

        let committed = engine
            .transaction(true, |txn| {
                runs.set(runs.get() + 1);
                Transaction::get_for_update(txn, "counter")?;
                if runs.get() == 1 {
                    KvWrite::put(&engine, "counter", b"outside")?;
                }
                KvWrite::put(txn, "counter", b"inside")?;
                Ok(true)
            })
            .unwrap();

        assert!(committed);
        assert_eq!(runs.get(), 2);
        assert_eq!(KvRead::get(&engine, "counter").unwrap(), Some(b"inside".to_vec()));
    }

    #[test]
    fn no_retry_reports_conflict() {
        let engine = Engine::in_memory();
        let runs = Cell::new(0);

        let committed = engine
            .transaction_with(RetryPolicy::none(), |txn| {
                runs.set(runs.get() + 1);
                Transaction::get_for_update(txn, "k")?;
                KvWrite::put(&engine, "k", b"outside")?;
                KvWrite::put(txn, "k", b"inside")?;
                Ok(true)
            })
            .unwrap();

        assert!(!committed);
        assert_eq!(runs.get(), 1);
        assert_eq!(KvRead::get(&engine, "k").unwrap(), Some(b"outside".to_vec()));
    }

    #[test]
    fn failed_abort_keeps_body_error() {
        let engine = Engine::in_memory();

        let err = engine
            .transaction(true, |txn| {
                KvWrite::put(txn, "k", b"v")?;
                EngineTransaction::abort(txn)?;
                Err(crate::error::CoreError::invalid_operation("body failed"))
            })
            .unwrap_err();

        assert!(err.to_string().contains("body failed"));
        assert_eq!(KvRead::get(&engine, "k").unwrap(), None);
        assert_eq!(engine.active_transactions(), 0);
    }
}
