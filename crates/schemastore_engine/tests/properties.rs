//! Model-based and recovery tests for the engine.

use proptest::prelude::*;
use schemastore_engine::{Engine, EngineConfig, LogOp, MemoryLog};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Put(u8, Vec<u8>),
    Remove(u8),
    Batch(Vec<(u8, Option<Vec<u8>>)>),
}

fn key(k: u8) -> Vec<u8> {
    format!("k{:02}", k % 16).into_bytes()
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let value = prop::collection::vec(any::<u8>(), 0..16);
    prop_oneof![
        3 => (any::<u8>(), value.clone()).prop_map(|(k, v)| Op::Put(k, v)),
        1 => any::<u8>().prop_map(Op::Remove),
        1 => prop::collection::vec((any::<u8>(), prop::option::of(value)), 1..4)
            .prop_map(Op::Batch),
    ]
}

fn apply(engine: &Engine, model: &mut BTreeMap<Vec<u8>, Vec<u8>>, op: &Op) {
    match op {
        Op::Put(k, v) => {
            engine.put(&key(*k), v).unwrap();
            model.insert(key(*k), v.clone());
        }
        Op::Remove(k) => {
            engine.remove(&key(*k)).unwrap();
            model.remove(&key(*k));
        }
        Op::Batch(entries) => {
            let ops = entries
                .iter()
                .map(|(k, v)| match v {
                    Some(v) => LogOp::Put {
                        key: key(*k),
                        value: v.clone(),
                    },
                    None => LogOp::Delete { key: key(*k) },
                })
                .collect();
            engine.write_batch(ops).unwrap();
            for (k, v) in entries {
                match v {
                    Some(v) => model.insert(key(*k), v.clone()),
                    None => model.remove(&key(*k)),
                };
            }
        }
    }
}

fn contents(engine: &Engine) -> BTreeMap<Vec<u8>, Vec<u8>> {
    let mut iter = engine.seek(b"", None).unwrap();
    let mut out = BTreeMap::new();
    while iter.next() {
        out.insert(iter.key().to_vec(), iter.value().to_vec());
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engine_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let engine = Engine::in_memory();
        let mut model = BTreeMap::new();
        for op in &ops {
            apply(&engine, &mut model, op);
        }
        prop_assert_eq!(contents(&engine), model);
    }

    #[test]
    fn replay_reproduces_state(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let log = MemoryLog::new();
        let mut model = BTreeMap::new();
        {
            let engine = Engine::with_log(log.clone(), EngineConfig::default()).unwrap();
            for op in &ops {
                apply(&engine, &mut model, op);
            }
        }
        let engine = Engine::with_log(log, EngineConfig::default()).unwrap();
        prop_assert_eq!(contents(&engine), model);
    }

    #[test]
    fn seek_yields_sorted_prefix_matches(ops in prop::collection::vec(op_strategy(), 1..40), p in 0u8..16) {
        let engine = Engine::in_memory();
        let mut model = BTreeMap::new();
        for op in &ops {
            apply(&engine, &mut model, op);
        }
        let prefix = format!("k{}", p % 2).into_bytes();
        let mut iter = engine.seek(&prefix, None).unwrap();
        let mut seen = Vec::new();
        while iter.next() {
            seen.push(iter.key().to_vec());
        }
        let expected: Vec<_> = model.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
        prop_assert_eq!(seen, expected);
    }
}

#[test]
fn torn_tail_on_disk_is_dropped() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::at(dir.path().join("db"));

    {
        let engine = Engine::open(config.clone()).unwrap();
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        engine.close().unwrap();
    }

    let log_path = dir.path().join("db").join("commit.log");
    let clean_len = std::fs::metadata(&log_path).unwrap().len();
    {
        let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
        file.write_all(b"SKVL\x01\x00\x40\x00").unwrap();
    }

    let engine = Engine::open(config.clone()).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    engine.put(b"c", b"3").unwrap();
    engine.close().unwrap();
    drop(engine);

    assert!(std::fs::metadata(&log_path).unwrap().len() > clean_len);
    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.len(), 3);
}

#[test]
fn concurrent_transactions_on_one_key_serialize() {
    let engine = Engine::in_memory();
    engine.put(b"n", &0u64.to_le_bytes()).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..25 {
                    loop {
                        let txn = engine.begin().unwrap();
                        let bytes = txn.get_for_update(b"n").unwrap().unwrap();
                        let n = u64::from_le_bytes(bytes.try_into().unwrap());
                        txn.put(b"n", &(n + 1).to_le_bytes()).unwrap();
                        if txn.commit().unwrap() {
                            break;
                        }
                    }
                }
            });
        }
    });

    let bytes = engine.get(b"n").unwrap().unwrap();
    assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), 100);
    assert_eq!(engine.active_transactions(), 0);
}
