//! # welp-store-memory
//!
//! In-process implementation of `ReviewRepo` and `EntitlementLookup`.
//! Every conditional write holds the key's shard lock while it compares and
//! swaps the version, so concurrent writers see exactly one winner.

mod notify;
mod seed;

pub use notify::OutboxNotifier;
pub use seed::{ArchiveRecord, Seed};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;
use welp_core::{
    ArchivedThread, ClaimState, ContentId, EntitlementGrant, EntitlementLookup, ReactionLedger, ResponseId,
    ResponseThread, Review, ReviewRepo, StoreError, StoreResult, ThreadPrecondition, User, UserId, Versioned,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct GuestTokenRecord {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl GuestTokenRecord {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, User>,
    reviews: DashMap<ContentId, Versioned<Review>>,
    threads: DashMap<ContentId, Versioned<ResponseThread>>,
    /// Unconsumed archive per (review, participant).
    archives: DashMap<(ContentId, UserId), ArchivedThread>,
    reactions: DashMap<ContentId, Versioned<ReactionLedger>>,
    subscriptions: DashMap<UserId, bool>,
    unlocks: DashMap<UserId, HashSet<ContentId>>,
    guest_tokens: DashMap<ContentId, Vec<GuestTokenRecord>>,
}

fn conflict(expected: u64, found: u64) -> StoreError {
    debug!(expected, found, "version check failed");
    StoreError::Conflict { expected, found }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    /// Registers a review at version 1, replacing any previous one.
    pub fn insert_review(&self, review: Review) {
        self.reviews.insert(review.id, Versioned::new(1, review));
    }

    /// Applies a grant handed over by billing or guest-access collaborators.
    pub fn grant(&self, grant: EntitlementGrant) {
        match grant {
            EntitlementGrant::Subscription { user_id, active } => {
                self.subscriptions.insert(user_id, active);
            }
            EntitlementGrant::OneTimeUnlock { user_id, content_id } => {
                self.unlocks.entry(user_id).or_default().insert(content_id);
            }
            EntitlementGrant::GuestToken { content_id, token, expires_at } => {
                let mut tokens = self.guest_tokens.entry(content_id).or_default();
                tokens.retain(|t| t.token != token);
                tokens.push(GuestTokenRecord { token, expires_at });
            }
        }
    }

    fn guest_token_live(&self, content: ContentId, token: &str, now: DateTime<Utc>) -> bool {
        self.guest_tokens
            .get(&content)
            .is_some_and(|tokens| tokens.iter().any(|t| t.token == token && t.is_live(now)))
    }
}

#[async_trait]
impl EntitlementLookup for MemoryStore {
    async fn subscription_status(&self, user: UserId) -> StoreResult<bool> {
        Ok(self.subscriptions.get(&user).is_some_and(|active| *active))
    }

    async fn one_time_unlocks(&self, user: UserId) -> StoreResult<HashSet<ContentId>> {
        Ok(self.unlocks.get(&user).map(|set| set.clone()).unwrap_or_default())
    }

    /// Expired tokens are treated as unknown.
    async fn lookup_guest_token(&self, content: ContentId, token: &str) -> StoreResult<bool> {
        Ok(self.guest_token_live(content, token, Utc::now()))
    }
}

#[async_trait]
impl ReviewRepo for MemoryStore {
    async fn load_review(&self, id: ContentId) -> StoreResult<Versioned<Review>> {
        self.reviews
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::NotFound("Review".into(), id.to_string()))
    }

    async fn cas_write_claim_state(&self, id: ContentId, expected_version: u64, claim: ClaimState) -> StoreResult<u64> {
        let mut review = self
            .reviews
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Review".into(), id.to_string()))?;
        if review.version != expected_version {
            return Err(conflict(expected_version, review.version));
        }
        review.value.claim = claim;
        review.version += 1;
        Ok(review.version)
    }

    async fn load_thread(&self, content: ContentId) -> StoreResult<Versioned<ResponseThread>> {
        Ok(self
            .threads
            .get(&content)
            .map(|t| t.clone())
            .unwrap_or_else(|| Versioned::initial(ResponseThread::empty(content))))
    }

    async fn cas_write_thread(
        &self,
        content: ContentId,
        expected: ThreadPrecondition,
        thread: ResponseThread,
        consume_archive_of: Option<UserId>,
    ) -> StoreResult<u64> {
        // Lock order: review, then thread, then archives. The review read guard
        // keeps claim writes out until the thread write is done.
        let review = self
            .reviews
            .get(&content)
            .ok_or_else(|| StoreError::NotFound("Review".into(), content.to_string()))?;
        if review.version != expected.review_version {
            return Err(conflict(expected.review_version, review.version));
        }

        let mut slot = self
            .threads
            .entry(content)
            .or_insert_with(|| Versioned::initial(ResponseThread::empty(content)));
        if slot.version != expected.thread_version {
            return Err(conflict(expected.thread_version, slot.version));
        }
        let version = slot.version + 1;
        *slot = Versioned::new(version, thread);

        if let Some(user) = consume_archive_of {
            if self.archives.remove(&(content, user)).is_some() {
                debug!(%content, %user, "archive consumed by new response");
            }
        }
        Ok(version)
    }

    async fn cas_reset_thread(
        &self,
        content: ContentId,
        expected_version: u64,
        archive: ArchivedThread,
    ) -> StoreResult<u64> {
        // Hold the thread slot while archives are written so the reset is atomic
        // with respect to other thread writers.
        let mut slot = match self.threads.entry(content) {
            Entry::Occupied(slot) => slot,
            Entry::Vacant(_) => return Err(conflict(expected_version, 0)),
        };
        let current = slot.get().version;
        if current != expected_version {
            return Err(conflict(expected_version, current));
        }

        for participant in archive.participants() {
            self.archives.insert((content, participant), archive.clone());
        }
        slot.insert(Versioned::new(current + 1, ResponseThread::empty(content)));
        Ok(current + 1)
    }

    async fn load_archive(&self, content: ContentId, user: UserId) -> StoreResult<Option<ArchivedThread>> {
        Ok(self.archives.get(&(content, user)).map(|a| a.clone()))
    }

    async fn clear_archive(&self, content: ContentId, user: UserId, trigger: ResponseId) -> StoreResult<bool> {
        Ok(self
            .archives
            .remove_if(&(content, user), |_, archive| archive.reset_trigger_response_id == trigger)
            .is_some())
    }

    async fn load_reactions(&self, content: ContentId) -> StoreResult<Versioned<ReactionLedger>> {
        Ok(self
            .reactions
            .get(&content)
            .map(|l| l.clone())
            .unwrap_or_else(|| Versioned::initial(ReactionLedger::empty(content))))
    }

    async fn cas_write_reactions(
        &self,
        content: ContentId,
        expected_version: u64,
        ledger: ReactionLedger,
    ) -> StoreResult<u64> {
        match self.reactions.entry(content) {
            Entry::Occupied(mut slot) => {
                let current = slot.get().version;
                if current != expected_version {
                    return Err(conflict(expected_version, current));
                }
                slot.insert(Versioned::new(current + 1, ledger));
                Ok(current + 1)
            }
            Entry::Vacant(slot) => {
                if expected_version != 0 {
                    return Err(conflict(expected_version, 0));
                }
                slot.insert(Versioned::new(1, ledger));
                Ok(1)
            }
        }
    }
}
