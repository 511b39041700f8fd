//! # SchemaStore Core
//!
//! Schema-typed persistence over an embedded ordered key-value engine.
//!
//! This crate provides:
//! - The [`Schema`] trait: a named record type with a version chain and
//!   secondary indexes
//! - The [`Backend`] abstraction over the ordered engine, with optimistic
//!   transactions and a retry loop
//! - The [`Storage`] facade: typed find/get/put/remove, prefix scans,
//!   pagination, index lookups and atomic read-modify-write
//!
//! Index entries are always consistent with the records they point at:
//! every write of an indexed schema runs inside an optimistic transaction.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod registry;
mod schema;
mod storage;

pub use backend::{Backend, KvRead, KvWrite, RawIterator, Transaction};
pub use config::{RetryPolicy, StorageConfig};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use registry::{SchemaInfo, SchemaRegistry};
pub use schema::{Index, Schema};
pub use storage::{Page, SchemaIter, Storage, StorageTxn};

pub use schemastore_codec::{CodecError, KeyCodec, VersionChain};
pub use schemastore_engine::{Engine, EngineConfig, EngineError};
