//! # SchemaStore Engine
//!
//! Embedded ordered key-value engine with optimistic transactions.
//!
//! The engine keeps every key resident in a byte-ordered map and makes
//! writes durable through an append-only commit log. It knows nothing about
//! schemas or encodings; keys and values are opaque bytes.
//!
//! ## Guarantees
//!
//! - Each commit is applied atomically under one sequence number
//! - Prefix scans return keys in ascending byte order
//! - Optimistic commits fail (`Ok(false)`) when a tracked key changed
//! - A torn final log record is dropped on open
//!
//! ## Example
//!
//! ```rust
//! use schemastore_engine::Engine;
//!
//! let engine = Engine::in_memory();
//! engine.put(b"user:data:alice", b"...").unwrap();
//!
//! let txn = engine.begin().unwrap();
//! let current = txn.get_for_update(b"user:data:alice").unwrap();
//! assert!(current.is_some());
//! txn.put(b"user:data:alice", b"updated").unwrap();
//! assert!(txn.commit().unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod engine;
mod error;
mod iter;
mod log;
mod record;
mod transaction;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use iter::EngineIter;
pub use log::{FileLog, LogDevice, MemoryLog};
pub use record::{compute_crc32, CommitRecord, LogOp, RECORD_MAGIC, RECORD_VERSION};
pub use transaction::{EngineTransaction, TransactionStatus};
