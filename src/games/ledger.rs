use crate::errors::{EngineError, EngineResult};
use crate::games::types::{BettorEntry, LiveBettorRow};
use std::collections::HashMap;

/// Check bet fields before anything else is looked at
pub fn validate_bet(bet_amount: f64, payout_multiplier: f64) -> EngineResult<()> {
    if !bet_amount.is_finite() || bet_amount <= 0.0 {
        return Err(EngineError::Validation(format!(
            "bet_amount must be a positive number, got {}",
            bet_amount
        )));
    }
    if !payout_multiplier.is_finite() || payout_multiplier <= 0.0 {
        return Err(EngineError::Validation(format!(
            "payout_multiplier must be a positive number, got {}",
            payout_multiplier
        )));
    }
    Ok(())
}

/// Bets admitted in the current round, in admission order
#[derive(Debug, Clone, Default)]
pub struct BetLedger {
    entries: Vec<BettorEntry>,
    /// user_id -> position in `entries`
    index: HashMap<String, usize>,
}

impl BetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, keeping the first bet per player
    pub fn from_entries(entries: Vec<BettorEntry>) -> Self {
        let mut ledger = Self::new();
        for entry in entries {
            if ledger.admit(entry).is_err() {
                tracing::warn!("Dropping duplicate persisted bet");
            }
        }
        ledger
    }

    pub fn admit(&mut self, entry: BettorEntry) -> EngineResult<()> {
        if self.index.contains_key(&entry.user_id) {
            return Err(EngineError::DuplicateBet(entry.user_id));
        }
        self.index.insert(entry.user_id.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Undo the most recent admission (used when persisting it failed)
    pub fn revoke_last(&mut self, user_id: &str) -> Option<BettorEntry> {
        match self.entries.last() {
            Some(last) if last.user_id == user_id => {
                self.index.remove(user_id);
                self.entries.pop()
            }
            _ => None,
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.index.contains_key(user_id)
    }

    pub fn get(&self, user_id: &str) -> Option<&BettorEntry> {
        self.index.get(user_id).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut BettorEntry> {
        self.index.get(user_id).map(|&i| &mut self.entries[i])
    }

    /// Entry a cashout would apply to, or the reason it cannot
    pub fn cashable(&self, user_id: &str) -> EngineResult<&BettorEntry> {
        let entry = self
            .get(user_id)
            .ok_or_else(|| EngineError::NotFound(format!("no bet for {} this round", user_id)))?;
        if entry.settled {
            return Err(EngineError::AlreadySettled(user_id.to_string()));
        }
        Ok(entry)
    }

    /// Mark an entry paid at `multiplier`
    pub fn record_cashout(&mut self, user_id: &str, multiplier: f64) -> EngineResult<&BettorEntry> {
        self.cashable(user_id)?;
        let entry = self
            .get_mut(user_id)
            .ok_or_else(|| EngineError::NotFound(format!("no bet for {} this round", user_id)))?;
        entry.settled = true;
        entry.cashout_multiplier = Some(multiplier);
        entry.payout = Some(entry.bet_amount * multiplier);
        Ok(entry)
    }

    pub fn entries(&self) -> &[BettorEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut BettorEntry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Broadcast view, rebuilt from the entries every time
    pub fn live_table(&self) -> Vec<LiveBettorRow> {
        self.entries.iter().map(LiveBettorRow::from).collect()
    }
}
