//! Fixture schemas and storage helpers.

use schemastore_core::{Engine, EngineConfig, Index, Schema, Storage, StorageConfig, VersionChain};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tempfile::TempDir;

/// Two plain string fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFoo {
    /// First field.
    pub bar: String,
    /// Second field.
    pub baz: String,
}

impl Schema for SchemaFoo {
    const NAME: &'static str = "SchemaFoo";
}

/// A player with a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Display name.
    pub name: String,
}

impl Player {
    /// Creates a player.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Schema for Player {
    const NAME: &'static str = "Player";
}

/// A record stored under hierarchical keys such as `"Parent/Foo A"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexKey {
    /// Identifier, usually equal to the logical key.
    pub id: String,
}

impl Schema for ComplexKey {
    const NAME: &'static str = "SchemaComplexKey";
}

/// A player indexed by `name` and `admin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedPlayer {
    /// Unique id, used as the logical key.
    pub uid: String,
    /// Display name.
    pub name: String,
    /// Administrator flag.
    pub admin: bool,
}

impl IndexedPlayer {
    /// Creates an indexed player.
    pub fn new(uid: impl Into<String>, name: impl Into<String>, admin: bool) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            admin,
        }
    }
}

impl Schema for IndexedPlayer {
    const NAME: &'static str = "SchemaIndexedPlayer";

    fn indexes() -> Vec<Index<Self>> {
        vec![
            Index::new("name", |p: &IndexedPlayer| p.name.clone()),
            Index::display("admin", |p: &IndexedPlayer| p.admin),
        ]
    }
}

/// A counter for read-modify-write tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counter {
    /// Current value.
    pub value: u64,
}

impl Schema for Counter {
    const NAME: &'static str = "Counter";
}

/// Version 1 of [`Profile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileV1 {
    /// Display name.
    pub name: String,
}

/// Version 2 of [`Profile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileV2 {
    /// Display name.
    pub name: String,
    /// Player level.
    pub level: u32,
}

/// A profile at version 3, upgradable from [`ProfileV1`] and [`ProfileV2`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name.
    pub display_name: String,
    /// Player level.
    pub level: u32,
    /// Free-form tags.
    pub tags: Vec<String>,
}

impl From<ProfileV1> for Profile {
    fn from(old: ProfileV1) -> Self {
        Self {
            display_name: old.name,
            level: 1,
            tags: Vec::new(),
        }
    }
}

impl From<ProfileV2> for Profile {
    fn from(old: ProfileV2) -> Self {
        Self {
            display_name: old.name,
            level: old.level,
            tags: Vec::new(),
        }
    }
}

impl Schema for Profile {
    const NAME: &'static str = "Profile";

    fn versions() -> VersionChain<Self> {
        VersionChain::new()
            .historical::<ProfileV1>()
            .historical::<ProfileV2>()
    }
}

/// Storage with automatic cleanup of its directory.
pub struct TestStorage {
    /// The storage instance.
    pub storage: Storage,
    temp_dir: Option<TempDir>,
}

impl TestStorage {
    /// Creates in-memory storage.
    pub fn memory() -> Self {
        Self {
            storage: Storage::in_memory(),
            temp_dir: None,
        }
    }

    /// Creates in-memory storage with `config`.
    pub fn memory_with(config: StorageConfig) -> Self {
        Self {
            storage: Storage::with_config(Engine::in_memory(), config),
            temp_dir: None,
        }
    }

    /// Creates storage in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = Storage::open(EngineConfig::at(temp_dir.path().join("db")))
            .expect("Failed to open file storage");
        Self {
            storage,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("db"))
    }

    /// Closes and reopens file storage on the same directory.
    ///
    /// In-memory storage is returned unchanged.
    pub fn reopen(self) -> Self {
        let Some(path) = self.path() else {
            return self;
        };
        self.storage.close().expect("Failed to close storage");
        let Self { storage, temp_dir } = self;
        drop(storage);

        Self {
            storage: Storage::open(EngineConfig::at(path)).expect("Failed to reopen storage"),
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestStorage {
    type Target = Storage;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

/// Runs a test with temporary in-memory storage.
pub fn with_temp_storage<F, R>(f: F) -> R
where
    F: FnOnce(&Storage) -> R,
{
    let test_storage = TestStorage::memory();
    f(&test_storage.storage)
}

/// Populated data sets.
pub mod scenarios {
    use super::*;

    /// Ten players: `"Some Name 0".."Some Name 4"` and
    /// `"Some Other Name 5".."Some Other Name 9"`, keyed by name.
    pub fn players(storage: &Storage) {
        for i in 0..10 {
            let name = if i < 5 {
                format!("Some Name {i}")
            } else {
                format!("Some Other Name {i}")
            };
            storage
                .put(&name, &Player::new(name.clone()))
                .expect("Failed to put player");
        }
    }

    /// `ComplexKey` records at `"Parent/Foo A"` through `"Parent/Foo J"`.
    pub fn complex_keys(storage: &Storage) -> Vec<String> {
        ('A'..='J')
            .map(|c| {
                let key = format!("Parent/Foo {c}");
                storage
                    .put(&key, &ComplexKey { id: key.clone() })
                    .expect("Failed to put record");
                key
            })
            .collect()
    }

    /// Three indexed players: two admins, one named "Hello World".
    pub fn indexed_players(storage: &Storage) {
        for player in [
            IndexedPlayer::new("123", "Hello World", true),
            IndexedPlayer::new("456", "Another Player", true),
            IndexedPlayer::new("789", "Regular", false),
        ] {
            storage
                .put(&player.uid.clone(), &player)
                .expect("Failed to put indexed player");
        }
    }
}
