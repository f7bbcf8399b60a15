//! Persistent round and player records, stored as JSON values.

use crate::{
    errors::StorageError,
    games::{round::Round, types::{BettorEntry, PlayerAccount}},
    storage::KvBackend,
};
use serde::{Deserialize, Serialize};

const ROUND_KEY: &[u8] = b"round:current";
const PLAYER_PREFIX: &str = "player:";

/// Stored form of the current round: the record plus its open bets
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: Round,
    #[serde(default)]
    pub bets: Vec<BettorEntry>,
}

fn player_key(user_id: &str) -> Vec<u8> {
    format!("{}{}", PLAYER_PREFIX, user_id).into_bytes()
}

fn encode<T: Serialize>(what: &str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e)))
}

fn decode<'a, T: Deserialize<'a>>(what: &str, bytes: &'a [u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::CorruptedData(format!("Failed to decode {}: {}", what, e)))
}

pub fn load_round(storage: &dyn KvBackend) -> Result<Option<RoundRecord>, StorageError> {
    let Some(bytes) = storage.get(ROUND_KEY)? else {
        return Ok(None);
    };
    decode("round record", &bytes).map(Some)
}

pub fn store_round(storage: &dyn KvBackend, record: &RoundRecord) -> Result<(), StorageError> {
    let bytes = encode("round record", record)?;
    storage.put(ROUND_KEY, &bytes)
}

pub fn load_player(storage: &dyn KvBackend, user_id: &str) -> Result<Option<PlayerAccount>, StorageError> {
    let Some(bytes) = storage.get(&player_key(user_id))? else {
        return Ok(None);
    };
    decode(&format!("player {}", user_id), &bytes).map(Some)
}

pub fn store_player(storage: &dyn KvBackend, player: &PlayerAccount) -> Result<(), StorageError> {
    let bytes = encode(&format!("player {}", player.user_id), player)?;
    storage.put(&player_key(&player.user_id), &bytes)
}

/// Write players and the round record in one atomic batch
pub fn store_round_with_players(
    storage: &dyn KvBackend,
    record: &RoundRecord,
    players: &[PlayerAccount],
) -> Result<(), StorageError> {
    let mut items = Vec::with_capacity(players.len() + 1);
    for player in players {
        items.push((
            player_key(&player.user_id),
            encode(&format!("player {}", player.user_id), player)?,
        ));
    }
    items.push((ROUND_KEY.to_vec(), encode("round record", record)?));

    storage.batch_write(&items)?;

    tracing::debug!(
        round = record.round.round_number,
        phase = %record.round.phase,
        players = players.len(),
        "Persisted round record"
    );
    Ok(())
}

/// Create the account with `balance` unless it already exists
pub fn ensure_player(
    storage: &dyn KvBackend,
    user_id: &str,
    username: &str,
    balance: f64,
) -> Result<PlayerAccount, StorageError> {
    if let Some(existing) = load_player(storage, user_id)? {
        return Ok(existing);
    }

    let player = PlayerAccount {
        user_id: user_id.to_string(),
        username: username.to_string(),
        balance,
    };
    store_player(storage, &player)?;
    tracing::info!(user_id, balance, "Seeded player account");
    Ok(player)
}
