//! # Entitlement Resolver
//!
//! Decides whether a caller may see a review in full. The grants themselves
//! live in [`Entitlements`], a request-scoped snapshot of what the billing and
//! guest-access collaborators reported; resolution is a pure function of it.

use crate::models::{ContentId, Review, User};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Snapshot of one user's access grants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entitlements {
    pub subscription_active: bool,
    pub one_time_unlocks: HashSet<ContentId>,
    /// Content IDs for which the presented guest token matched a stored one.
    pub guest_access: HashSet<ContentId>,
}

impl Entitlements {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn subscribed() -> Self {
        Self { subscription_active: true, ..Self::default() }
    }

    pub fn with_unlock(mut self, content: ContentId) -> Self {
        self.one_time_unlocks.insert(content);
        self
    }

    pub fn with_guest_access(mut self, content: ContentId) -> Self {
        self.guest_access.insert(content);
        self
    }
}

/// Why the resolver granted or refused full access. First matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessReason {
    Unauthenticated,
    PartyToContent,
    Subscription,
    OneTimeUnlock,
    GuestToken,
    Locked,
}

impl fmt::Display for AccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessReason::Unauthenticated => "unauthenticated",
            AccessReason::PartyToContent => "party-to-content",
            AccessReason::Subscription => "subscription",
            AccessReason::OneTimeUnlock => "one-time-unlock",
            AccessReason::GuestToken => "guest-token",
            AccessReason::Locked => "locked",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub full_access: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn grant(reason: AccessReason) -> Self {
        Self { full_access: true, reason }
    }

    fn deny(reason: AccessReason) -> Self {
        Self { full_access: false, reason }
    }
}

/// Whether the resolver needs any grant lookups to decide for this caller.
///
/// Anonymous callers and parties to the review are decided on identity alone.
pub fn needs_grants(user: Option<&User>, review: &Review) -> bool {
    matches!(user, Some(u) if !review.is_party(u.id))
}

pub fn resolve_access(user: Option<&User>, review: &Review, grants: &Entitlements) -> AccessDecision {
    let Some(user) = user else {
        return AccessDecision::deny(AccessReason::Unauthenticated);
    };

    if review.is_party(user.id) {
        return AccessDecision::grant(AccessReason::PartyToContent);
    }
    if grants.subscription_active {
        return AccessDecision::grant(AccessReason::Subscription);
    }
    if grants.one_time_unlocks.contains(&review.id) {
        return AccessDecision::grant(AccessReason::OneTimeUnlock);
    }
    if grants.guest_access.contains(&review.id) {
        return AccessDecision::grant(AccessReason::GuestToken);
    }

    AccessDecision::deny(AccessReason::Locked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn fixture() -> (User, User, User, Review) {
        let business = User::new(Role::Business);
        let customer = User::new(Role::Customer);
        let stranger = User::new(Role::Business);
        let review = Review::new(business.id, customer.id);
        (business, customer, stranger, review)
    }

    #[test]
    fn anonymous_is_unauthenticated_even_with_grants() {
        let (_, _, _, review) = fixture();
        let grants = Entitlements::subscribed().with_guest_access(review.id);
        let decision = resolve_access(None, &review, &grants);
        assert!(!decision.full_access);
        assert_eq!(decision.reason, AccessReason::Unauthenticated);
    }

    #[test]
    fn parties_always_see_their_review() {
        let (business, customer, _, review) = fixture();
        for party in [&business, &customer] {
            let decision = resolve_access(Some(party), &review, &Entitlements::none());
            assert_eq!(decision, AccessDecision::grant(AccessReason::PartyToContent));
        }
    }

    #[test]
    fn party_rule_outranks_subscription() {
        let (business, _, _, review) = fixture();
        let decision = resolve_access(Some(&business), &review, &Entitlements::subscribed());
        assert_eq!(decision.reason, AccessReason::PartyToContent);
    }

    #[test]
    fn grants_resolve_in_priority_order() {
        let (_, _, stranger, review) = fixture();

        let all = Entitlements::subscribed()
            .with_unlock(review.id)
            .with_guest_access(review.id);
        assert_eq!(resolve_access(Some(&stranger), &review, &all).reason, AccessReason::Subscription);

        let unlock_and_guest = Entitlements::none().with_unlock(review.id).with_guest_access(review.id);
        assert_eq!(
            resolve_access(Some(&stranger), &review, &unlock_and_guest).reason,
            AccessReason::OneTimeUnlock
        );

        let guest = Entitlements::none().with_guest_access(review.id);
        assert_eq!(resolve_access(Some(&stranger), &review, &guest).reason, AccessReason::GuestToken);
    }

    #[test]
    fn unlock_for_another_review_does_not_leak() {
        let (_, _, stranger, review) = fixture();
        let grants = Entitlements::none()
            .with_unlock(ContentId::new())
            .with_guest_access(ContentId::new());
        let decision = resolve_access(Some(&stranger), &review, &grants);
        assert_eq!(decision, AccessDecision::deny(AccessReason::Locked));
    }

    #[test]
    fn needs_grants_only_for_authenticated_outsiders() {
        let (business, _, stranger, review) = fixture();
        assert!(!needs_grants(None, &review));
        assert!(!needs_grants(Some(&business), &review));
        assert!(needs_grants(Some(&stranger), &review));
    }

    #[test]
    fn reason_renders_kebab_case() {
        assert_eq!(AccessReason::OneTimeUnlock.to_string(), "one-time-unlock");
        assert_eq!(AccessReason::PartyToContent.to_string(), "party-to-content");
    }
}
