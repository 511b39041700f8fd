//! Typed operations shared by [`Storage`](super::Storage) and
//! [`StorageTxn`](super::StorageTxn).

use super::iter::SchemaIter;
use super::Page;
use crate::backend::{KvRead, KvWrite, RawIterator, Transaction};
use crate::error::{CoreError, CoreResult};
use crate::registry::{CompiledSchema, SchemaRegistry};
use crate::schema::{Index, Schema};
use schemastore_codec::{decode_envelope, encode_envelope, SEPARATOR};
use std::sync::Arc;
use tracing::warn;

/// Registry access for a typed operation.
#[derive(Clone, Copy)]
pub(crate) struct Context<'a> {
    pub(crate) registry: &'a SchemaRegistry,
    pub(crate) auto_register: bool,
}

impl Context<'_> {
    pub(crate) fn schema<T: Schema>(&self) -> CoreResult<Arc<CompiledSchema<T>>> {
        self.registry.resolve::<T>(self.auto_register)
    }
}

pub(crate) fn encode<T: Schema>(schema: &CompiledSchema<T>, value: &T) -> CoreResult<Vec<u8>> {
    Ok(encode_envelope(schema.version(), value)?)
}

pub(crate) fn decode<T: Schema>(schema: &CompiledSchema<T>, bytes: &[u8]) -> CoreResult<T> {
    Ok(decode_envelope(bytes, &schema.chain)?)
}

/// Index values are embedded in index keys, so they may not contain the
/// separator. Logical keys may: the value always ends at the first `:`
/// after the index prefix.
fn check_index_value<T: Schema>(index: &str, value: &str) -> CoreResult<()> {
    if value.contains(SEPARATOR) {
        return Err(CoreError::InvalidIndexValue {
            schema: T::NAME.to_string(),
            index: index.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn index_value<T: Schema>(index: &Index<T>, record: &T) -> CoreResult<String> {
    let value = index.value(record);
    check_index_value::<T>(index.name(), &value)?;
    Ok(value)
}

fn decode_opt<T: Schema>(schema: &CompiledSchema<T>, bytes: Option<Vec<u8>>) -> CoreResult<Option<T>> {
    bytes.map(|b| decode(schema, &b)).transpose()
}

pub(crate) fn find<T: Schema, R: KvRead>(cx: Context<'_>, kv: &R, key: &str) -> CoreResult<Option<T>> {
    let wrap = |e: CoreError| CoreError::record("find", T::NAME, key, e);
    let schema = cx.schema::<T>()?;
    let bytes = kv.get(&schema.keys().data_key(key)).map_err(wrap)?;
    decode_opt(&schema, bytes).map_err(wrap)
}

pub(crate) fn get<T: Schema, R: KvRead>(cx: Context<'_>, kv: &R, key: &str) -> CoreResult<T> {
    find(cx, kv, key)?.ok_or_else(|| CoreError::not_found(T::NAME, key))
}

pub(crate) fn find_for_update<T: Schema, X: Transaction>(
    cx: Context<'_>,
    txn: &X,
    key: &str,
) -> CoreResult<Option<T>> {
    let wrap = |e: CoreError| CoreError::record("get_for_update", T::NAME, key, e);
    let schema = cx.schema::<T>()?;
    let bytes = txn.get_for_update(&schema.keys().data_key(key)).map_err(wrap)?;
    decode_opt(&schema, bytes).map_err(wrap)
}

pub(crate) fn multi_get<T: Schema, R: KvRead, K: AsRef<str>>(
    cx: Context<'_>,
    kv: &R,
    keys: &[K],
) -> CoreResult<Vec<Option<T>>> {
    let schema = cx.schema::<T>()?;
    let codec = schema.keys();
    let data_keys: Vec<String> = keys.iter().map(|k| codec.data_key(k.as_ref())).collect();
    let values = kv.multi_get(&data_keys)?;

    keys.iter()
        .zip(values)
        .map(|(key, bytes)| {
            decode_opt(&schema, bytes)
                .map_err(|e| CoreError::record("multi_get", T::NAME, key.as_ref(), e))
        })
        .collect()
}

/// Writes a record of a schema without indexes.
pub(crate) fn put_plain<T: Schema, W: KvWrite>(
    schema: &CompiledSchema<T>,
    kv: &W,
    key: &str,
    value: &T,
) -> CoreResult<()> {
    let wrap = |e: CoreError| CoreError::record("put", T::NAME, key, e);
    let bytes = encode(schema, value).map_err(wrap)?;
    kv.put(&schema.keys().data_key(key), &bytes).map_err(wrap)
}

/// Writes a record and brings its index entries up to date.
pub(crate) fn put_in_txn<T: Schema, X: Transaction>(
    cx: Context<'_>,
    txn: &X,
    key: &str,
    value: &T,
) -> CoreResult<()> {
    let schema = cx.schema::<T>()?;
    if !schema.is_indexed() {
        return put_plain(&schema, txn, key, value);
    }

    let wrap = |e: CoreError| CoreError::record("put", T::NAME, key, e);
    let codec = schema.keys();
    let data_key = codec.data_key(key);
    let bytes = encode(&schema, value).map_err(wrap)?;
    let fresh_values = schema
        .indexes
        .iter()
        .map(|index| index_value(index, value))
        .collect::<CoreResult<Vec<_>>>()
        .map_err(wrap)?;
    let prior = decode_opt(&schema, txn.get_for_update(&data_key).map_err(wrap)?).map_err(wrap)?;

    for (index, fresh) in schema.indexes.iter().zip(fresh_values) {
        if let Some(old) = prior.as_ref().map(|old| index.value(old)) {
            if old != fresh {
                txn.remove(&codec.index_key(index.name(), &old, key)).map_err(wrap)?;
            }
        }
        txn.put(&codec.index_key(index.name(), &fresh, key), data_key.as_bytes())
            .map_err(wrap)?;
    }

    txn.put(&data_key, &bytes).map_err(wrap)
}

/// Removes a record of a schema without indexes. Returns `false` if absent.
pub(crate) fn remove_plain<T: Schema, K: KvRead + KvWrite>(
    schema: &CompiledSchema<T>,
    kv: &K,
    key: &str,
) -> CoreResult<bool> {
    let wrap = |e: CoreError| CoreError::record("remove", T::NAME, key, e);
    let data_key = schema.keys().data_key(key);
    if kv.get(&data_key).map_err(wrap)?.is_none() {
        return Ok(false);
    }
    kv.remove(&data_key).map_err(wrap)?;
    Ok(true)
}

/// Removes a record and every index entry derived from it.
pub(crate) fn remove_in_txn<T: Schema, X: Transaction>(
    cx: Context<'_>,
    txn: &X,
    key: &str,
) -> CoreResult<bool> {
    let schema = cx.schema::<T>()?;
    if !schema.is_indexed() {
        return remove_plain(&schema, txn, key);
    }

    let wrap = |e: CoreError| CoreError::record("remove", T::NAME, key, e);
    let codec = schema.keys();
    let data_key = codec.data_key(key);
    let Some(old) = decode_opt(&schema, txn.get_for_update(&data_key).map_err(wrap)?).map_err(wrap)? else {
        return Ok(false);
    };

    for index in &schema.indexes {
        txn.remove(&codec.index_key(index.name(), &index.value(&old), key))
            .map_err(wrap)?;
    }
    txn.remove(&data_key).map_err(wrap)?;
    Ok(true)
}

/// Logical keys of every row under `prefix`.
pub(crate) fn logical_keys<T: Schema, R: KvRead>(
    schema: &CompiledSchema<T>,
    kv: &R,
    prefix: &str,
) -> CoreResult<Vec<String>> {
    let codec = schema.keys();
    let mut iter = kv.seek(&codec.data_key(prefix), None)?;
    let mut keys = Vec::new();
    while iter.next() {
        let data_key = iter.key_str()?;
        if let Some(key) = codec.strip_data_key(data_key) {
            keys.push(key.to_string());
        }
    }
    Ok(keys)
}

pub(crate) fn remove_by_prefix_plain<T: Schema, K: KvRead + KvWrite>(
    schema: &CompiledSchema<T>,
    kv: &K,
    prefix: &str,
) -> CoreResult<usize> {
    let codec = schema.keys();
    let keys = logical_keys(schema, kv, prefix)?;
    for key in &keys {
        kv.remove(&codec.data_key(key))
            .map_err(|e| CoreError::record("remove_by_prefix", T::NAME, key.as_str(), e))?;
    }
    Ok(keys.len())
}

pub(crate) fn remove_by_prefix_in_txn<T: Schema, X: Transaction>(
    cx: Context<'_>,
    txn: &X,
    prefix: &str,
) -> CoreResult<usize> {
    let schema = cx.schema::<T>()?;
    if !schema.is_indexed() {
        return remove_by_prefix_plain(&schema, txn, prefix);
    }

    let mut removed = 0;
    for key in logical_keys(&schema, txn, prefix)? {
        if remove_in_txn::<T, X>(cx, txn, &key)? {
            removed += 1;
        }
    }
    Ok(removed)
}

pub(crate) fn seek<T: Schema, R: KvRead>(
    cx: Context<'_>,
    kv: &R,
    prefix: &str,
    lower_bound: Option<&str>,
) -> CoreResult<SchemaIter<T, R::Iter>> {
    let schema = cx.schema::<T>()?;
    let codec = schema.keys();
    let bound = lower_bound.map(|b| codec.data_key(b));
    let raw = kv.seek(&codec.data_key(prefix), bound.as_deref())?;
    Ok(SchemaIter::new(raw, schema))
}

pub(crate) fn seek_all<T: Schema, R: KvRead>(
    cx: Context<'_>,
    kv: &R,
    prefix: &str,
    max: usize,
) -> CoreResult<Vec<T>> {
    let iter = seek::<T, R>(cx, kv, prefix, None)?;
    let limit = if max == 0 { usize::MAX } else { max };
    iter.take(limit).map(|item| item.map(|(_, value)| value)).collect()
}

pub(crate) fn next<T: Schema, R: KvRead>(
    cx: Context<'_>,
    kv: &R,
    prefix: &str,
    start: Option<&str>,
    max: usize,
) -> CoreResult<Page<T>> {
    let iter = seek::<T, R>(cx, kv, prefix, start)?;

    let mut items = Vec::new();
    let mut last_key = None;
    for item in iter {
        let (key, value) = item?;
        if start == Some(key.as_str()) {
            continue;
        }
        items.push(value);
        last_key = Some(key);
        if max != 0 && items.len() == max {
            break;
        }
    }

    let full = max != 0 && items.len() == max;
    Ok(Page {
        items,
        last_key: if full { last_key } else { None },
    })
}

pub(crate) fn get_by_index<T: Schema, R: KvRead>(
    cx: Context<'_>,
    kv: &R,
    index: &str,
    value: &str,
) -> CoreResult<Vec<T>> {
    let schema = cx.schema::<T>()?;
    let descriptor = schema.index(index)?;
    check_index_value::<T>(index, value)?;
    let codec = schema.keys();

    let mut entries = Vec::new();
    let mut iter = kv.seek(&codec.index_value_prefix(index, value), None)?;
    while iter.next() {
        entries.push((iter.key_str()?.to_string(), iter.value_raw()?.to_string()));
    }

    let data_keys: Vec<String> = entries.iter().map(|(_, data_key)| data_key.clone()).collect();
    let rows = kv.multi_get(&data_keys)?;

    let mut records = Vec::with_capacity(rows.len());
    for ((index_key, data_key), row) in entries.into_iter().zip(rows) {
        let key = codec.strip_data_key(&data_key).unwrap_or(&data_key);
        let bytes = match row {
            Some(bytes) => bytes,
            None => {
                // Writers change an entry and its row in one commit, so one
                // multi_get over both tells a concurrent write from a
                // dangling entry.
                let mut pair = kv.multi_get(&[index_key.clone(), data_key.clone()])?.into_iter();
                match (pair.next().flatten(), pair.next().flatten()) {
                    (None, _) => continue,
                    (Some(_), Some(bytes)) => bytes,
                    (Some(_), None) => {
                        warn!(schema = T::NAME, index, %index_key, %data_key, "index entry refers to a missing record");
                        return Err(CoreError::IndexInconsistency {
                            schema: T::NAME.to_string(),
                            index: index.to_string(),
                            index_key,
                            data_key,
                        });
                    }
                }
            }
        };
        let record = decode(&schema, &bytes)
            .map_err(|e| CoreError::record("get_by_index", T::NAME, key, e))?;
        if descriptor.value(&record) == value {
            records.push(record);
        }
    }
    Ok(records)
}

/// Drops every index entry of `T` and re-derives entries from live rows.
pub(crate) fn rebuild_indexes<T: Schema, X: Transaction>(cx: Context<'_>, txn: &X) -> CoreResult<usize> {
    let schema = cx.schema::<T>()?;
    let codec = schema.keys();

    let mut stale = Vec::new();
    let mut iter = txn.seek(&codec.index_root(), None)?;
    while iter.next() {
        stale.push(iter.key_str()?.to_string());
    }
    for index_key in &stale {
        txn.remove(index_key)?;
    }

    let mut rows = 0;
    for item in SchemaIter::<T, X::Iter>::new(txn.seek(&codec.data_prefix(), None)?, Arc::clone(&schema)) {
        let (key, record) = item?;
        let data_key = codec.data_key(&key);
        for index in &schema.indexes {
            let value = index_value(index, &record)
                .map_err(|e| CoreError::record("rebuild_indexes", T::NAME, key.as_str(), e))?;
            txn.put(&codec.index_key(index.name(), &value, &key), data_key.as_bytes())?;
        }
        rows += 1;
    }
    Ok(rows)
}
