//! # PolicyError
//!
//! Centralized error handling for the Welp policy engine.
//! Policy violations are terminal and reported verbatim to the caller;
//! `Conflict` and `Unavailable` are the only outcomes worth retrying.

use serde::Serialize;
use thiserror::Error;

/// The primary error type for all welp-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// No authenticated user behind the request.
    #[error("authentication required")]
    Unauthenticated,

    /// Entitlement insufficient for full content access.
    #[error("access denied: no entitlement covers this review")]
    AccessDenied,

    /// Caller is neither the author nor the subject of the review.
    #[error("only the review author or its subject may do this")]
    NotEligibleParty,

    /// Attempted double-post, or a chain edit that would break alternation.
    #[error("it is not your turn to respond")]
    ChainOrderViolation,

    /// Subject attempting to respond before claiming the review.
    #[error("the review must be claimed before its subject can respond")]
    NotClaimed,

    #[error("review is already claimed")]
    AlreadyClaimed,

    #[error("only the claimant may unclaim this review")]
    NotClaimant,

    /// Only the reviewed party may claim a review.
    #[error("only the subject of the review may claim it")]
    NotSubject,

    /// Parties to a review may not react to it.
    #[error("cannot react to a review you are party to")]
    SelfReaction,

    /// Resource not found (e.g., Review, Response)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., empty response body)
    #[error("validation error: {0}")]
    Validation(String),

    /// Optimistic-concurrency race lost; re-fetch and retry once.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Collaborator timed out or failed.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// How a caller should react to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryHint {
    Never,
    RefetchOnce,
    Backoff,
}

impl PolicyError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        Self::NotFound(kind.to_string(), id.to_string())
    }

    /// True for errors that describe a rule the caller broke, as opposed to
    /// infrastructure failures.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated
                | Self::AccessDenied
                | Self::NotEligibleParty
                | Self::ChainOrderViolation
                | Self::NotClaimed
                | Self::AlreadyClaimed
                | Self::NotClaimant
                | Self::NotSubject
                | Self::SelfReaction
        )
    }

    pub fn retry_hint(&self) -> RetryHint {
        match self {
            Self::Conflict(_) => RetryHint::RefetchOnce,
            Self::Unavailable(_) => RetryHint::Backoff,
            _ => RetryHint::Never,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_hint() != RetryHint::Never
    }

    /// Stable machine-readable code, used when a denial is serialized.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AccessDenied => "access-denied",
            Self::NotEligibleParty => "not-eligible-party",
            Self::ChainOrderViolation => "chain-order-violation",
            Self::NotClaimed => "not-claimed",
            Self::AlreadyClaimed => "already-claimed",
            Self::NotClaimant => "not-claimant",
            Self::NotSubject => "not-subject",
            Self::SelfReaction => "self-reaction",
            Self::NotFound(..) => "not-found",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Failures reported by persistence and lookup collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The conditional write saw a different version than the caller read.
    #[error("version mismatch: expected {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },

    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Backend failure (e.g., DB down, network error)
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for PolicyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => {
                PolicyError::Conflict(format!("{err}; re-fetch and retry the action once"))
            }
            StoreError::NotFound(kind, id) => PolicyError::NotFound(kind, id),
            StoreError::Backend(msg) => PolicyError::Unavailable(msg),
        }
    }
}

/// A specialized Result type for Welp policy logic.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Result type used at the port boundary.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
