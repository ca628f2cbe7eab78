//! # Core Traits (Ports)
//!
//! Collaborators the policy engine calls into. Any adapter must implement
//! these to be wired into the binary.
//!
//! Every write is conditioned on the version the caller read: if the stored
//! version moved on, the adapter must refuse with [`StoreError::Conflict`]
//! and leave state untouched.

use crate::error::StoreResult;
use crate::models::{
    ArchivedThread, ClaimState, ContentId, ResponseId, ResponseThread, Review, ThreadPrecondition, UserId,
    Versioned,
};
use crate::reaction::ReactionLedger;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Billing and guest-access facts. Expired grants must already be filtered out.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait EntitlementLookup: Send + Sync {
    async fn subscription_status(&self, user: UserId) -> StoreResult<bool>;
    async fn one_time_unlocks(&self, user: UserId) -> StoreResult<HashSet<ContentId>>;
    /// Whether `token` is a live guest token for `content`.
    async fn lookup_guest_token(&self, content: ContentId, token: &str) -> StoreResult<bool>;
}

/// Persistence contract for reviews, threads, archives and reactions.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ReviewRepo: Send + Sync {
    // Review Operations
    async fn load_review(&self, id: ContentId) -> StoreResult<Versioned<Review>>;
    async fn cas_write_claim_state(
        &self,
        id: ContentId,
        expected_version: u64,
        claim: ClaimState,
    ) -> StoreResult<u64>;

    // Thread Operations
    /// A thread nobody has written to yet is returned empty at version 0.
    async fn load_thread(&self, content: ContentId) -> StoreResult<Versioned<ResponseThread>>;
    /// Writes `thread` only if neither the review nor the thread moved past
    /// `expected`. When `consume_archive_of` is set, that user's archive is
    /// dropped in the same write. Returns the new thread version.
    async fn cas_write_thread(
        &self,
        content: ContentId,
        expected: ThreadPrecondition,
        thread: ResponseThread,
        consume_archive_of: Option<UserId>,
    ) -> StoreResult<u64>;
    /// Stores `archive` for each of its participants (replacing any unconsumed
    /// one) and empties the live thread, as one conditional write.
    async fn cas_reset_thread(
        &self,
        content: ContentId,
        expected_version: u64,
        archive: ArchivedThread,
    ) -> StoreResult<u64>;

    // Archive Operations
    async fn load_archive(&self, content: ContentId, user: UserId) -> StoreResult<Option<ArchivedThread>>;
    /// Drops the user's archive if it is still the one left by the reset
    /// `trigger`. Returns whether it was dropped; a newer archive stays.
    async fn clear_archive(&self, content: ContentId, user: UserId, trigger: ResponseId) -> StoreResult<bool>;

    // Reaction Operations
    async fn load_reactions(&self, content: ContentId) -> StoreResult<Versioned<ReactionLedger>>;
    async fn cas_write_reactions(
        &self,
        content: ContentId,
        expected_version: u64,
        ledger: ReactionLedger,
    ) -> StoreResult<u64>;
}

/// Events worth telling the other party about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    ResponseAppended {
        content_id: ContentId,
        response_id: ResponseId,
        author_id: UserId,
        recipient_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    ReviewClaimed {
        content_id: ContentId,
        claimant_id: UserId,
        recipient_id: UserId,
    },
}

/// Outbound notification dispatch. Failures are logged, never propagated.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, notification: Notification) -> StoreResult<()>;
}
