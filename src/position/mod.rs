// =============================================================================
// Position store
// =============================================================================
//
// In-process store for the `positions` table described in the persistence
// section — a `parking_lot::RwLock`-guarded map, mirroring the lock-guarded
// shared-state idiom used throughout this codebase rather than a real
// database. Enforces (I4): at most one `{open, breakeven}` Position per
// `(chain, token)`.

pub mod monitor;

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::model::{Chain, Position, PositionStatus};

pub struct PositionStore {
    positions: RwLock<HashMap<String, Position>>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a freshly-opened Position. Fails (I4) if one is already open
    /// or in breakeven for the same `(chain, token)`.
    pub fn insert(&self, position: Position) -> Result<(), &'static str> {
        let mut positions = self.positions.write();
        let collides = positions.values().any(|p| {
            p.chain == position.chain
                && p.token == position.token
                && matches!(p.status, PositionStatus::Open | PositionStatus::Breakeven)
        });
        if collides {
            return Err("a position is already open for this (chain, token)");
        }
        positions.insert(position.id.clone(), position);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Position> {
        self.positions.read().get(id).cloned()
    }

    pub fn open_and_breakeven(&self) -> Vec<Position> {
        self.positions
            .read()
            .values()
            .filter(|p| matches!(p.status, PositionStatus::Open | PositionStatus::Breakeven))
            .cloned()
            .collect()
    }

    pub fn open_count_for_chain(&self, chain: Chain) -> usize {
        self.positions
            .read()
            .values()
            .filter(|p| p.chain == chain && matches!(p.status, PositionStatus::Open | PositionStatus::Breakeven))
            .count()
    }

    pub fn total_open_count(&self) -> usize {
        self.positions
            .read()
            .values()
            .filter(|p| matches!(p.status, PositionStatus::Open | PositionStatus::Breakeven))
            .count()
    }

    pub fn history(&self) -> Vec<Position> {
        self.positions
            .read()
            .values()
            .filter(|p| p.status == PositionStatus::Closed)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Position> {
        self.positions.read().values().cloned().collect()
    }

    /// Apply an in-place mutation under the write lock, e.g. after the
    /// monitor computes an exit action.
    pub fn update<F: FnOnce(&mut Position)>(&self, id: &str, f: F) {
        if let Some(position) = self.positions.write().get_mut(id) {
            f(position);
        }
    }
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntrySnapshot;

    fn entry_snapshot() -> EntrySnapshot {
        EntrySnapshot {
            top10_percent: Some(20.0),
            top1_percent: Some(8.0),
            liquidity_usd: Some(50_000.0),
            liquidity_native: Some(100.0),
            heat: 5.0,
        }
    }

    #[test]
    fn rejects_second_open_position_for_same_token() {
        let store = PositionStore::new();
        let a = Position::new(Chain::Sol, "TOK", 1.0, 1.0, entry_snapshot(), true);
        let b = Position::new(Chain::Sol, "TOK", 1.0, 1.0, entry_snapshot(), true);
        assert!(store.insert(a).is_ok());
        assert!(store.insert(b).is_err());
    }

    #[test]
    fn allows_reopen_after_close() {
        let store = PositionStore::new();
        let mut a = Position::new(Chain::Sol, "TOK", 1.0, 1.0, entry_snapshot(), true);
        let id = a.id.clone();
        a.status = PositionStatus::Closed;
        store.insert(a).unwrap();
        store.update(&id, |p| p.status = PositionStatus::Closed);

        let b = Position::new(Chain::Sol, "TOK", 1.0, 1.0, entry_snapshot(), true);
        assert!(store.insert(b).is_ok());
    }
}
