//! # Claim State Machine
//!
//! `Unclaimed --claim(subject)--> Claimed --unclaim(claimant)--> Unclaimed`.
//!
//! Transitions are pure: they validate against the review as read and return
//! the next state. Persisting it is the engine's job.

use crate::error::{PolicyError, Result};
use crate::models::{ClaimKind, ClaimState, Review, UserId};
use chrono::{DateTime, Utc};

/// A claimed review reports `AlreadyClaimed` to everyone, subject or not.
pub fn check_claim(user: UserId, review: &Review) -> Result<()> {
    if let ClaimState::Claimed { .. } = review.claim {
        return Err(PolicyError::AlreadyClaimed);
    }
    if review.subject_id != user {
        return Err(PolicyError::NotSubject);
    }
    Ok(())
}

pub fn check_unclaim(user: UserId, review: &Review) -> Result<()> {
    if review.claim.is_claimed_by(user) {
        Ok(())
    } else {
        Err(PolicyError::NotClaimant)
    }
}

pub fn claim(user: UserId, review: &Review, kind: ClaimKind, at: DateTime<Utc>) -> Result<ClaimState> {
    check_claim(user, review)?;
    Ok(ClaimState::Claimed { claimant: user, claimed_at: at, kind })
}

pub fn unclaim(user: UserId, review: &Review) -> Result<ClaimState> {
    check_unclaim(user, review)?;
    Ok(ClaimState::Unclaimed)
}
