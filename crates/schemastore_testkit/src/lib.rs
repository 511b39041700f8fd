//! # SchemaStore Testkit
//!
//! Test utilities for SchemaStore.
//!
//! This crate provides:
//! - Fixture schemas and storage helpers
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use schemastore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_storage() {
//!     with_temp_storage(|storage| {
//!         storage.put("k", &Player::new("a")).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
