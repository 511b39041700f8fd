//! Property-based test generators using proptest.

use crate::fixtures::{IndexedPlayer, Player};
use proptest::prelude::*;

/// Strategy for logical keys, including the empty key and `/` separators.
pub fn logical_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 /_-]{0,16}").expect("Invalid regex")
}

/// Strategy for keys drawn from a small pool, so operations collide.
pub fn colliding_key_strategy() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|i| format!("key-{i}"))
}

/// Strategy for players.
pub fn player_strategy() -> impl Strategy<Value = Player> {
    prop::string::string_regex("[A-Za-z ]{0,24}")
        .expect("Invalid regex")
        .prop_map(Player::new)
}

/// Strategy for indexed players. Names come from a small pool so that
/// index values are shared between records.
pub fn indexed_player_strategy(uid: String) -> impl Strategy<Value = IndexedPlayer> {
    (prop::sample::select(vec!["Ann", "Bob", "Cy", "Dee"]), any::<bool>())
        .prop_map(move |(name, admin)| IndexedPlayer::new(uid.clone(), name, admin))
}

/// An operation against a single schema.
#[derive(Debug, Clone)]
pub enum StorageOp {
    /// Write a player.
    Put {
        /// Logical key
        key: String,
        /// Player name
        name: String,
        /// Admin flag
        admin: bool,
    },
    /// Remove a key.
    Remove {
        /// Logical key
        key: String,
    },
    /// Read a key.
    Find {
        /// Logical key
        key: String,
    },
}

impl StorageOp {
    /// The key this operation touches.
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Remove { key } | Self::Find { key } => key,
        }
    }
}

/// Strategy for storage operations over colliding keys.
pub fn storage_op_strategy() -> impl Strategy<Value = StorageOp> {
    prop_oneof![
        3 => (
            colliding_key_strategy(),
            prop::sample::select(vec!["Ann", "Bob", "Cy", "Dee"]),
            any::<bool>(),
        )
            .prop_map(|(key, name, admin)| StorageOp::Put {
                key,
                name: name.to_string(),
                admin,
            }),
        1 => colliding_key_strategy().prop_map(|key| StorageOp::Remove { key }),
        2 => colliding_key_strategy().prop_map(|key| StorageOp::Find { key }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StorageOp>> {
    prop::collection::vec(storage_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
