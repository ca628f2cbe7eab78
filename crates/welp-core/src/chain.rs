//! # Response Chain Manager
//!
//! A review's response thread is a two-party conversation between the review's
//! author and its subject. Once non-empty, authorship must strictly alternate;
//! the manager rejects double-posts rather than relying on storage to do so.
//!
//! Resetting a thread freezes it into an [`ArchivedThread`] first, so each
//! participant can later recover their last response.

use crate::entitlement::AccessDecision;
use crate::error::{PolicyError, Result};
use crate::models::{ArchivedThread, ContentId, Response, ResponseId, ResponseThread, Review, User, UserId};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// The full `canRespond` gate: identity, party, access, claim, then turn.
pub fn check_respond(
    user: Option<&User>,
    review: &Review,
    access: &AccessDecision,
    thread: &ResponseThread,
) -> Result<()> {
    let user = user.ok_or(PolicyError::Unauthenticated)?;
    check_participation(user.id, review, access)?;
    thread.check_turn(user.id)
}

/// Everything `check_respond` requires except the turn rule. Editing one's own
/// response is gated by this alone.
pub fn check_participation(user: UserId, review: &Review, access: &AccessDecision) -> Result<()> {
    if !review.is_party(user) {
        return Err(PolicyError::NotEligibleParty);
    }
    if !access.full_access {
        return Err(PolicyError::AccessDenied);
    }
    if user == review.subject_id && !review.claim.is_claimed_by(user) {
        return Err(PolicyError::NotClaimed);
    }
    Ok(())
}

/// Trims a response body, rejecting blank ones.
pub fn normalize_body(body: &str) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(PolicyError::Validation("response body cannot be empty".into()));
    }
    Ok(trimmed.to_string())
}

impl ResponseThread {
    pub fn empty(content_id: ContentId) -> Self {
        Self { content_id, responses: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn last(&self) -> Option<&Response> {
        self.responses.last()
    }

    pub fn get(&self, id: ResponseId) -> Option<&Response> {
        self.responses.iter().find(|r| r.id == id)
    }

    /// Strict alternation: nobody answers their own last response.
    pub fn check_turn(&self, author: UserId) -> Result<()> {
        match self.last() {
            Some(last) if last.author_id == author => Err(PolicyError::ChainOrderViolation),
            _ => Ok(()),
        }
    }

    /// Appends a response after checking the turn rule. Party and access gates
    /// are the caller's concern (see [`check_respond`]).
    pub fn append(&mut self, author: UserId, body: &str, now: DateTime<Utc>) -> Result<Response> {
        self.check_turn(author)?;
        let body = normalize_body(body)?;

        // Keep ascending order even if the caller's clock lags the last writer's.
        let created_at = match self.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };

        let response = Response {
            id: ResponseId::new(),
            content_id: self.content_id,
            author_id: author,
            body,
            created_at,
            edited_at: None,
        };
        self.responses.push(response.clone());
        Ok(response)
    }

    pub fn edit(&mut self, author: UserId, id: ResponseId, body: &str, now: DateTime<Utc>) -> Result<Response> {
        let body = normalize_body(body)?;
        let response = self
            .responses
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PolicyError::not_found("Response", id))?;

        if response.author_id != author {
            return Err(PolicyError::NotEligibleParty);
        }
        response.body = body;
        response.edited_at = Some(now);
        Ok(response.clone())
    }

    /// Removes the caller's own response. Only the last one may go, otherwise
    /// the remaining chain would stop alternating.
    pub fn withdraw(&mut self, author: UserId, id: ResponseId) -> Result<Response> {
        let index = self
            .responses
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| PolicyError::not_found("Response", id))?;

        if self.responses[index].author_id != author {
            return Err(PolicyError::NotEligibleParty);
        }
        if index + 1 != self.responses.len() {
            return Err(PolicyError::ChainOrderViolation);
        }
        Ok(self.responses.remove(index))
    }

    /// Freezes the thread ahead of a reset triggered by `trigger`.
    pub fn archive(&self, trigger: ResponseId, now: DateTime<Utc>) -> Result<ArchivedThread> {
        if self.get(trigger).is_none() {
            return Err(PolicyError::not_found("Response", trigger));
        }
        Ok(ArchivedThread {
            content_id: self.content_id,
            responses: self.responses.clone(),
            archived_at: now,
            reset_trigger_response_id: trigger,
        })
    }

    /// True when no two consecutive responses share an author.
    pub fn alternates(&self) -> bool {
        self.responses.windows(2).all(|w| w[0].author_id != w[1].author_id)
    }
}

impl ArchivedThread {
    /// The most recent response `user` wrote before the reset.
    pub fn last_by(&self, user: UserId) -> Option<&Response> {
        self.responses.iter().rev().find(|r| r.author_id == user)
    }

    pub fn participants(&self) -> BTreeSet<UserId> {
        self.responses.iter().map(|r| r.author_id).collect()
    }
}
