//! JSON snapshot of a whole `MemoryStore`, used to seed it and to persist it
//! between CLI invocations. Versions are not part of the snapshot; imported
//! aggregates start over at version 1.

use crate::{GuestTokenRecord, MemoryStore};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use welp_core::{
    ArchivedThread, EntitlementGrant, ReactionLedger, ResponseThread, Review, User, UserId, Versioned,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub user_id: UserId,
    pub archive: ArchivedThread,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub grants: Vec<EntitlementGrant>,
    #[serde(default)]
    pub threads: Vec<ResponseThread>,
    #[serde(default)]
    pub archives: Vec<ArchiveRecord>,
    #[serde(default)]
    pub reactions: Vec<ReactionLedger>,
}

impl Seed {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading seed file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing seed file {}", path.display()))
    }
}

impl MemoryStore {
    pub fn from_seed(seed: Seed) -> Self {
        let store = MemoryStore::new();
        for user in seed.users {
            store.insert_user(user);
        }
        for review in seed.reviews {
            store.insert_review(review);
        }
        for grant in seed.grants {
            store.grant(grant);
        }
        for thread in seed.threads {
            store.threads.insert(thread.content_id, Versioned::new(1, thread));
        }
        for record in seed.archives {
            store.archives.insert((record.archive.content_id, record.user_id), record.archive);
        }
        for ledger in seed.reactions {
            store.reactions.insert(ledger.content_id, Versioned::new(1, ledger));
        }
        store
    }

    /// Exports the current state, sorted by ID so repeated exports diff cleanly.
    pub fn to_seed(&self) -> Seed {
        let mut users: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by_key(|u| u.id);

        let mut reviews: Vec<Review> = self.reviews.iter().map(|r| r.value.clone()).collect();
        reviews.sort_by_key(|r| r.id);

        let mut grants = Vec::new();
        let mut subscriptions: Vec<_> = self.subscriptions.iter().map(|e| (*e.key(), *e.value())).collect();
        subscriptions.sort();
        grants.extend(
            subscriptions
                .into_iter()
                .map(|(user_id, active)| EntitlementGrant::Subscription { user_id, active }),
        );

        let mut unlocks: Vec<_> = self
            .unlocks
            .iter()
            .flat_map(|e| e.value().iter().map(|c| (*e.key(), *c)).collect::<Vec<_>>())
            .collect();
        unlocks.sort();
        grants.extend(
            unlocks
                .into_iter()
                .map(|(user_id, content_id)| EntitlementGrant::OneTimeUnlock { user_id, content_id }),
        );

        let mut tokens: Vec<_> = self
            .guest_tokens
            .iter()
            .flat_map(|e| e.value().iter().map(|t| (*e.key(), t.clone())).collect::<Vec<_>>())
            .collect();
        tokens.sort_by(|a, b| (a.0, &a.1.token).cmp(&(b.0, &b.1.token)));
        grants.extend(tokens.into_iter().map(|(content_id, GuestTokenRecord { token, expires_at })| {
            EntitlementGrant::GuestToken { content_id, token, expires_at }
        }));

        let mut threads: Vec<ResponseThread> = self
            .threads
            .iter()
            .filter(|t| !t.value.is_empty())
            .map(|t| t.value.clone())
            .collect();
        threads.sort_by_key(|t| t.content_id);

        let mut archives: Vec<ArchiveRecord> = self
            .archives
            .iter()
            .map(|e| ArchiveRecord { user_id: e.key().1, archive: e.value().clone() })
            .collect();
        archives.sort_by_key(|a| (a.archive.content_id, a.user_id));

        let mut reactions: Vec<ReactionLedger> = self.reactions.iter().map(|l| l.value.clone()).collect();
        reactions.sort_by_key(|l| l.content_id);

        Seed { users, reviews, grants, threads, archives, reactions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use welp_core::{ContentId, EntitlementLookup, ReviewRepo, Role};

    #[tokio::test]
    async fn exported_seed_restores_the_same_state() {
        let business = User::new(Role::Business);
        let customer = User::new(Role::Customer);
        let review = Review::new(business.id, customer.id);
        let mut thread = ResponseThread::empty(review.id);
        thread.append(business.id, "Thanks for stopping by", Utc::now()).unwrap();

        let seed = Seed {
            users: vec![business.clone(), customer.clone()],
            reviews: vec![review.clone()],
            grants: vec![
                EntitlementGrant::Subscription { user_id: customer.id, active: true },
                EntitlementGrant::OneTimeUnlock { user_id: business.id, content_id: review.id },
                EntitlementGrant::GuestToken { content_id: review.id, token: "abc".into(), expires_at: None },
            ],
            threads: vec![thread.clone()],
            ..Seed::default()
        };

        let store = MemoryStore::from_seed(seed);
        assert_eq!(store.load_thread(review.id).await.unwrap(), Versioned::new(1, thread));
        assert!(store.subscription_status(customer.id).await.unwrap());
        assert!(store.lookup_guest_token(review.id, "abc").await.unwrap());

        let restored = MemoryStore::from_seed(store.to_seed());
        assert_eq!(restored.to_seed(), store.to_seed());
        assert_eq!(restored.user(customer.id), Some(customer));
        assert!(restored.one_time_unlocks(business.id).await.unwrap().contains(&review.id));
        assert!(restored.load_review(ContentId::new()).await.is_err());
    }

    #[test]
    fn seed_file_round_trip() {
        let path = std::env::temp_dir().join(format!("welp-seed-{}.json", UserId::new()));
        let seed = Seed { users: vec![User::new(Role::Admin)], ..Seed::default() };
        seed.write(&path).unwrap();
        assert_eq!(Seed::read(&path).unwrap(), seed);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn partial_seed_files_are_accepted() {
        let seed: Seed = serde_json::from_str(r#"{ "users": [] }"#).unwrap();
        assert!(seed.reviews.is_empty() && seed.grants.is_empty());
    }
}
