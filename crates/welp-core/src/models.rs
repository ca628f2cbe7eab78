//! # Domain Models
//!
//! These structs represent the core entities the policy engine reasons about.
//! We use UUID v7 for time-ordered, globally unique identification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Identifies a customer, business or admin account.
    UserId
);
id_type!(
    /// Identifies a review (the only kind of content item).
    ContentId
);
id_type!(ResponseId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Business,
    Admin,
}

/// An authenticated account. Role never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
}

impl User {
    pub fn new(role: Role) -> Self {
        Self { id: UserId::new(), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// How the subject came to claim a review. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimKind {
    #[default]
    DirectClaim,
    CreditUnlock,
    SubscriptionResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ClaimState {
    #[default]
    Unclaimed,
    #[serde(rename_all = "camelCase")]
    Claimed {
        claimant: UserId,
        claimed_at: DateTime<Utc>,
        kind: ClaimKind,
    },
}

impl ClaimState {
    pub fn claimant(&self) -> Option<UserId> {
        match self {
            ClaimState::Unclaimed => None,
            ClaimState::Claimed { claimant, .. } => Some(*claimant),
        }
    }

    pub fn is_claimed_by(&self, user: UserId) -> bool {
        self.claimant() == Some(user)
    }
}

/// A review written by `author_id` about `subject_id`.
///
/// Author and subject are fixed at creation; only `claim` mutates afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ContentId,
    pub author_id: UserId,
    pub subject_id: UserId,
    #[serde(default)]
    pub claim: ClaimState,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(author_id: UserId, subject_id: UserId) -> Self {
        Self {
            id: ContentId::new(),
            author_id,
            subject_id,
            claim: ClaimState::Unclaimed,
            created_at: Utc::now(),
        }
    }

    /// Authors and subjects are the only parties to a review.
    pub fn is_party(&self, user: UserId) -> bool {
        user == self.author_id || user == self.subject_id
    }

    /// The other party, if `user` is a party at all.
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        if user == self.author_id {
            Some(self.subject_id)
        } else if user == self.subject_id {
            Some(self.author_id)
        } else {
            None
        }
    }
}

/// One entry in a response thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: ResponseId,
    pub content_id: ContentId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

/// The live responses on a review, ascending by `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseThread {
    pub content_id: ContentId,
    #[serde(default)]
    pub responses: Vec<Response>,
}

/// A frozen copy of a thread taken at the moment it was reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedThread {
    pub content_id: ContentId,
    pub responses: Vec<Response>,
    pub archived_at: DateTime<Utc>,
    pub reset_trigger_response_id: ResponseId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReactionKind {
    Like,
    Funny,
    OhNo,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 3] = [ReactionKind::Like, ReactionKind::Funny, ReactionKind::OhNo];
}

/// A single access grant, as handed to the engine by billing/guest collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntitlementGrant {
    #[serde(rename_all = "camelCase")]
    Subscription { user_id: UserId, active: bool },
    #[serde(rename_all = "camelCase")]
    OneTimeUnlock { user_id: UserId, content_id: ContentId },
    #[serde(rename_all = "camelCase")]
    GuestToken {
        content_id: ContentId,
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
}

/// A stored value together with the version its optimistic writes are conditioned on.
///
/// Version 0 means "never written".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, value: T) -> Self {
        Self { version, value }
    }

    pub fn initial(value: T) -> Self {
        Self { version: 0, value }
    }
}

/// Versions a thread write depends on. The review is included because the
/// respond gates read its claim state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPrecondition {
    pub review_version: u64,
    pub thread_version: u64,
}
