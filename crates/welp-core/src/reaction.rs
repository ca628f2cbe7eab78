//! # Reaction Ledger
//!
//! Per-review record of who reacted how. Toggling flips an entry instead of
//! deleting it, so cleared reactions stay on record.
//!
//! The ledger does not know who may react; that rule lives in the engine.

use crate::models::{ContentId, ReactionKind, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionEntry {
    pub user_id: UserId,
    pub kind: ReactionKind,
    pub present: bool,
    pub toggled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionCounts {
    pub like: u64,
    pub funny: u64,
    pub oh_no: u64,
}

impl ReactionCounts {
    pub fn get(&self, kind: ReactionKind) -> u64 {
        match kind {
            ReactionKind::Like => self.like,
            ReactionKind::Funny => self.funny,
            ReactionKind::OhNo => self.oh_no,
        }
    }

    fn bump(&mut self, kind: ReactionKind) {
        match kind {
            ReactionKind::Like => self.like += 1,
            ReactionKind::Funny => self.funny += 1,
            ReactionKind::OhNo => self.oh_no += 1,
        }
    }
}

/// Outcome of a toggle: whether the reaction is now present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionLedger {
    pub content_id: ContentId,
    #[serde(default)]
    pub entries: Vec<ReactionEntry>,
}

impl ReactionLedger {
    pub fn empty(content_id: ContentId) -> Self {
        Self { content_id, entries: Vec::new() }
    }

    pub fn toggle(&mut self, user: UserId, kind: ReactionKind, now: DateTime<Utc>) -> ToggleOutcome {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.user_id == user && e.kind == kind) {
            entry.present = !entry.present;
            entry.toggled_at = now;
            return ToggleOutcome { present: entry.present };
        }

        self.entries.push(ReactionEntry { user_id: user, kind, present: true, toggled_at: now });
        ToggleOutcome { present: true }
    }

    pub fn has_reacted(&self, user: UserId, kind: ReactionKind) -> bool {
        self.entries.iter().any(|e| e.user_id == user && e.kind == kind && e.present)
    }

    pub fn counts(&self) -> ReactionCounts {
        let mut counts = ReactionCounts::default();
        for entry in self.entries.iter().filter(|e| e.present) {
            counts.bump(entry.kind);
        }
        counts
    }

    /// The logically present reactions, ignoring retained cleared entries.
    pub fn active(&self) -> BTreeSet<(UserId, ReactionKind)> {
        self.entries.iter().filter(|e| e.present).map(|e| (e.user_id, e.kind)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_toggle_adds_second_clears() {
        let mut ledger = ReactionLedger::empty(ContentId::new());
        let user = UserId::new();

        assert!(ledger.toggle(user, ReactionKind::Like, Utc::now()).present);
        assert!(ledger.has_reacted(user, ReactionKind::Like));
        assert!(!ledger.toggle(user, ReactionKind::Like, Utc::now()).present);
        assert!(!ledger.has_reacted(user, ReactionKind::Like));

        // Cleared entry is retained for audit.
        assert_eq!(ledger.entries.len(), 1);
        assert!(ledger.active().is_empty());
    }

    #[test]
    fn kinds_are_independent() {
        let mut ledger = ReactionLedger::empty(ContentId::new());
        let user = UserId::new();
        ledger.toggle(user, ReactionKind::Like, Utc::now());
        ledger.toggle(user, ReactionKind::OhNo, Utc::now());

        assert!(ledger.has_reacted(user, ReactionKind::Like));
        assert!(!ledger.has_reacted(user, ReactionKind::Funny));
        assert_eq!(ledger.counts(), ReactionCounts { like: 1, funny: 0, oh_no: 1 });
    }

    #[test]
    fn counts_only_present_entries() {
        let mut ledger = ReactionLedger::empty(ContentId::new());
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        for user in [a, b, c] {
            ledger.toggle(user, ReactionKind::Funny, Utc::now());
        }
        ledger.toggle(b, ReactionKind::Funny, Utc::now());
        assert_eq!(ledger.counts().get(ReactionKind::Funny), 2);
    }

    fn kind() -> impl Strategy<Value = ReactionKind> {
        prop_oneof![Just(ReactionKind::Like), Just(ReactionKind::Funny), Just(ReactionKind::OhNo)]
    }

    proptest! {
        #[test]
        fn double_toggle_is_identity(
            history in proptest::collection::vec((0usize..4, kind()), 0..30),
            who in 0usize..4,
            target in kind(),
        ) {
            let users: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();
            let mut ledger = ReactionLedger::empty(ContentId::new());
            for (idx, k) in history {
                ledger.toggle(users[idx], k, Utc::now());
            }

            let before = ledger.active();
            let counts = ledger.counts();
            ledger.toggle(users[who], target, Utc::now());
            ledger.toggle(users[who], target, Utc::now());

            prop_assert_eq!(ledger.active(), before);
            prop_assert_eq!(ledger.counts(), counts);
        }
    }
}
