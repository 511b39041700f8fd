//! Schema registration and introspection.

use crate::error::{CoreError, CoreResult};
use crate::schema::{Index, Schema};
use parking_lot::RwLock;
use schemastore_codec::{KeyCodec, VersionChain, SEPARATOR};
use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Description of a registered schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    /// Schema name.
    pub name: &'static str,
    /// Current version.
    pub version: u64,
    /// Declared index names, in declaration order.
    pub indexes: Vec<&'static str>,
    /// Rust type registered under this name.
    pub type_name: &'static str,
}

/// A schema's version chain and indexes, resolved once at registration.
pub(crate) struct CompiledSchema<T> {
    pub(crate) chain: VersionChain<T>,
    pub(crate) indexes: Vec<Index<T>>,
}

impl<T: Schema> CompiledSchema<T> {
    pub(crate) fn keys(&self) -> KeyCodec<'static> {
        KeyCodec::new(T::NAME)
    }

    pub(crate) fn version(&self) -> u64 {
        self.chain.current_version()
    }

    pub(crate) fn is_indexed(&self) -> bool {
        !self.indexes.is_empty()
    }

    pub(crate) fn index(&self, name: &str) -> CoreResult<&Index<T>> {
        self.indexes
            .iter()
            .find(|index| index.name() == name)
            .ok_or_else(|| CoreError::UnknownIndex {
                schema: T::NAME.to_string(),
                index: name.to_string(),
            })
    }
}

struct Registered {
    type_id: TypeId,
    info: SchemaInfo,
    compiled: Arc<dyn Any + Send + Sync>,
}

/// The set of schemas known to a storage instance.
///
/// Names are unique: registering a second type under a taken name fails
/// with [`CoreError::SchemaConflict`]. Registering the same type again is
/// a no-op.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<&'static str, Registered>>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("schemas", &self.schemas.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, validating its name and index declarations.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidSchema`] for an empty name, a name or index
    ///   name containing `:`, or duplicate index names
    /// - [`CoreError::SchemaConflict`] if another type holds the name
    pub fn register<T: Schema>(&self) -> CoreResult<()> {
        self.compile::<T>().map(|_| ())
    }

    /// Returns `true` if `T` is registered.
    #[must_use]
    pub fn is_registered<T: Schema>(&self) -> bool {
        self.schemas
            .read()
            .get(T::NAME)
            .is_some_and(|entry| entry.type_id == TypeId::of::<T>())
    }

    /// Returns `true` if the schema named `schema` declares `index`.
    #[must_use]
    pub fn has_index(&self, schema: &str, index: &str) -> bool {
        self.schemas
            .read()
            .get(schema)
            .is_some_and(|entry| entry.info.indexes.contains(&index))
    }

    /// Describes the schema registered under `name`.
    #[must_use]
    pub fn describe(&self, name: &str) -> Option<SchemaInfo> {
        self.schemas.read().get(name).map(|entry| entry.info.clone())
    }

    /// All registered schemas, sorted by name.
    #[must_use]
    pub fn schemas(&self) -> Vec<SchemaInfo> {
        let mut all: Vec<SchemaInfo> = self
            .schemas
            .read()
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(b.name));
        all
    }

    /// Looks up `T`, registering it first when `auto_register` is set.
    pub(crate) fn resolve<T: Schema>(&self, auto_register: bool) -> CoreResult<Arc<CompiledSchema<T>>> {
        if let Some(compiled) = self.lookup::<T>()? {
            return Ok(compiled);
        }
        if !auto_register {
            return Err(CoreError::SchemaNotRegistered {
                schema: T::NAME.to_string(),
            });
        }
        self.compile::<T>()
    }

    fn lookup<T: Schema>(&self) -> CoreResult<Option<Arc<CompiledSchema<T>>>> {
        let schemas = self.schemas.read();
        let Some(entry) = schemas.get(T::NAME) else {
            return Ok(None);
        };
        if entry.type_id != TypeId::of::<T>() {
            return Err(CoreError::SchemaConflict {
                schema: T::NAME.to_string(),
                existing: entry.info.type_name,
            });
        }
        Arc::clone(&entry.compiled)
            .downcast::<CompiledSchema<T>>()
            .map(Some)
            .map_err(|_| CoreError::invalid_operation(format!("registry entry for {} has the wrong type", T::NAME)))
    }

    fn compile<T: Schema>(&self) -> CoreResult<Arc<CompiledSchema<T>>> {
        validate_name(T::NAME, T::NAME, "schema name")?;

        let indexes = T::indexes();
        let mut seen = HashSet::new();
        for index in &indexes {
            validate_name(T::NAME, index.name(), "index name")?;
            if !seen.insert(index.name()) {
                return Err(CoreError::invalid_schema(
                    T::NAME,
                    format!("duplicate index name {}", index.name()),
                ));
            }
        }

        let compiled = Arc::new(CompiledSchema {
            chain: T::versions(),
            indexes,
        });

        let mut schemas = self.schemas.write();
        if let Some(entry) = schemas.get(T::NAME) {
            if entry.type_id != TypeId::of::<T>() {
                return Err(CoreError::SchemaConflict {
                    schema: T::NAME.to_string(),
                    existing: entry.info.type_name,
                });
            }
            drop(schemas);
            return self
                .lookup::<T>()?
                .ok_or_else(|| CoreError::invalid_operation("schema vanished during registration"));
        }

        let info = SchemaInfo {
            name: T::NAME,
            version: compiled.version(),
            indexes: compiled.indexes.iter().map(Index::name).collect(),
            type_name: type_name::<T>(),
        };
        debug!(schema = T::NAME, version = info.version, indexes = ?info.indexes, "registered schema");

        schemas.insert(
            T::NAME,
            Registered {
                type_id: TypeId::of::<T>(),
                info,
                compiled: Arc::clone(&compiled) as Arc<dyn Any + Send + Sync>,
            },
        );
        Ok(compiled)
    }
}

fn validate_name(schema: &str, name: &str, what: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_schema(schema, format!("{what} is empty")));
    }
    if name.contains(SEPARATOR) {
        return Err(CoreError::invalid_schema(
            schema,
            format!("{what} {name:?} contains {SEPARATOR:?}"),
        ));
    }
    Ok(())
}
