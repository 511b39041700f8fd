//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::distributions::Alphanumeric;
use rand::Rng;
use schemastore_testkit::{IndexedPlayer, Player};

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a random alphanumeric string.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate `count` keyed players with random names.
pub fn generate_players(count: usize) -> Vec<(String, Player)> {
    (0..count)
        .map(|i| (format!("player/{i:08}"), Player::new(random_string(16))))
        .collect()
}

/// Generate `count` indexed players spread over `names` distinct names.
pub fn generate_indexed_players(count: usize, names: usize) -> Vec<IndexedPlayer> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let name = format!("name-{}", rng.gen_range(0..names.max(1)));
            IndexedPlayer::new(format!("{i:08}"), name, rng.gen_bool(0.1))
        })
        .collect()
}
