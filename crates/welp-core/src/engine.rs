//! # Policy Engine
//!
//! The single entry point presentation code talks to. Queries answer "may this
//! caller view / respond / react / claim" from one consistent snapshot;
//! mutations re-read and re-validate the same predicates, then write with an
//! optimistic version check. A lost race surfaces as `Conflict` and is never
//! retried here.
//!
//! The engine keeps no mutable state of its own. Every collaborator call is
//! bounded by [`EngineConfig::collaborator_timeout`].

use crate::chain::{check_participation, check_respond};
use crate::claim;
use crate::entitlement::{needs_grants, resolve_access, AccessDecision, AccessReason, Entitlements};
use crate::error::{PolicyError, Result, StoreResult};
use crate::models::{
    ArchivedThread, ClaimKind, ClaimState, ContentId, ReactionKind, Response, ResponseId, ResponseThread,
    Review, ThreadPrecondition, User, UserId, Versioned,
};
use crate::reaction::{ReactionCounts, ToggleOutcome};
use crate::traits::{EntitlementLookup, Notification, Notifier, ReviewRepo};
use chrono::Utc;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on any single persistence, lookup or notification call.
    pub collaborator_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT }
    }
}

/// Who is asking: an optional signed-in user plus an optional guest token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub user: Option<User>,
    pub guest_token: Option<String>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user: User) -> Self {
        Self { user: Some(user), guest_token: None }
    }

    pub fn with_guest_token(mut self, token: impl Into<String>) -> Self {
        self.guest_token = Some(token.into());
        self
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }

    fn require_user(&self) -> Result<&User> {
        self.user.as_ref().ok_or(PolicyError::Unauthenticated)
    }
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        Principal::user(user)
    }
}

/// Answer to a permission query. A denial carries the same error the
/// corresponding mutation would fail with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub denial: Option<PolicyError>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self { allowed: true, denial: None }
    }

    pub fn deny(reason: PolicyError) -> Self {
        Self { allowed: false, denial: Some(reason) }
    }

    pub fn into_result(self) -> Result<()> {
        match self.denial {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl From<Result<()>> for Verdict {
    fn from(check: Result<()>) -> Self {
        match check {
            Ok(()) => Verdict::allow(),
            Err(err) => Verdict::deny(err),
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Verdict", 3)?;
        state.serialize_field("allowed", &self.allowed)?;
        state.serialize_field("denial", &self.denial.as_ref().map(PolicyError::code))?;
        state.serialize_field("message", &self.denial.as_ref().map(ToString::to_string))?;
        state.end()
    }
}

/// Every decision for one (caller, review) pair, taken from a single snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionDecision {
    pub content_id: ContentId,
    pub view: AccessDecision,
    pub respond: Verdict,
    pub react: Verdict,
    pub claim: Verdict,
    pub unclaim: Verdict,
}

/// Self-reaction is the only restriction; entitlement tier does not matter.
pub fn check_react(user: Option<&User>, review: &Review) -> Result<()> {
    let user = user.ok_or(PolicyError::Unauthenticated)?;
    if review.is_party(user.id) {
        return Err(PolicyError::SelfReaction);
    }
    Ok(())
}

fn check_claim(user: Option<&User>, review: &Review) -> Result<()> {
    claim::check_claim(user.ok_or(PolicyError::Unauthenticated)?.id, review)
}

fn check_unclaim(user: Option<&User>, review: &Review) -> Result<()> {
    claim::check_unclaim(user.ok_or(PolicyError::Unauthenticated)?.id, review)
}

struct Snapshot {
    review: Versioned<Review>,
    thread: Versioned<ResponseThread>,
    access: AccessDecision,
}

impl Snapshot {
    /// A thread write built from this snapshot is valid only while both
    /// versions still hold.
    fn precondition(&self) -> ThreadPrecondition {
        ThreadPrecondition { review_version: self.review.version, thread_version: self.thread.version }
    }
}

#[derive(Clone)]
pub struct PolicyEngine {
    reviews: Arc<dyn ReviewRepo>,
    entitlements: Arc<dyn EntitlementLookup>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl PolicyEngine {
    pub fn new(
        reviews: Arc<dyn ReviewRepo>,
        entitlements: Arc<dyn EntitlementLookup>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self { reviews, entitlements, notifier, config }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.collaborator_timeout = timeout;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub async fn can_view(&self, principal: &Principal, content: ContentId) -> Result<AccessDecision> {
        let review = self.load_review(content).await?;
        let access = self.resolve(principal, &review.value).await?;
        debug!(%content, reason = %access.reason, full_access = access.full_access, "view decision");
        Ok(access)
    }

    pub async fn can_respond(&self, principal: &Principal, content: ContentId) -> Result<Verdict> {
        let snap = self.snapshot(principal, content).await?;
        Ok(check_respond(principal.user.as_ref(), &snap.review.value, &snap.access, &snap.thread.value).into())
    }

    pub async fn can_react(&self, principal: &Principal, content: ContentId) -> Result<Verdict> {
        let review = self.load_review(content).await?;
        Ok(check_react(principal.user.as_ref(), &review.value).into())
    }

    pub async fn can_claim(&self, principal: &Principal, content: ContentId) -> Result<Verdict> {
        let review = self.load_review(content).await?;
        Ok(check_claim(principal.user.as_ref(), &review.value).into())
    }

    pub async fn can_unclaim(&self, principal: &Principal, content: ContentId) -> Result<Verdict> {
        let review = self.load_review(content).await?;
        Ok(check_unclaim(principal.user.as_ref(), &review.value).into())
    }

    pub async fn decide(&self, principal: &Principal, content: ContentId) -> Result<InteractionDecision> {
        let snap = self.snapshot(principal, content).await?;
        let user = principal.user.as_ref();
        let review = &snap.review.value;
        Ok(InteractionDecision {
            content_id: content,
            view: snap.access,
            respond: check_respond(user, review, &snap.access, &snap.thread.value).into(),
            react: check_react(user, review).into(),
            claim: check_claim(user, review).into(),
            unclaim: check_unclaim(user, review).into(),
        })
    }

    /// The live thread, for callers with full access to the review.
    pub async fn thread(&self, principal: &Principal, content: ContentId) -> Result<ResponseThread> {
        let snap = self.snapshot(principal, content).await?;
        if !snap.access.full_access {
            return Err(match snap.access.reason {
                AccessReason::Unauthenticated => PolicyError::Unauthenticated,
                _ => PolicyError::AccessDenied,
            });
        }
        Ok(snap.thread.value)
    }

    pub async fn reaction_counts(&self, content: ContentId) -> Result<ReactionCounts> {
        let ledger = self.call("load_reactions", self.reviews.load_reactions(content)).await?;
        Ok(ledger.value.counts())
    }

    /// The caller's last response from before the most recent reset, if any.
    pub async fn get_archived_response(&self, principal: &Principal, content: ContentId) -> Result<Option<Response>> {
        let user = principal.require_user()?;
        let archive = self.call("load_archive", self.reviews.load_archive(content, user.id)).await?;
        Ok(archive.and_then(|a| a.last_by(user.id).cloned()))
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(%content, user = ?principal.user_id()))]
    pub async fn append_response(&self, principal: &Principal, content: ContentId, body: &str) -> Result<Response> {
        let user = principal.require_user()?;
        let snap = self.snapshot(principal, content).await?;
        let expected = snap.precondition();
        let review = snap.review.value;
        check_respond(Some(user), &review, &snap.access, &snap.thread.value)?;

        // Posting again consumes the author's archive, in the same write.
        let mut thread = snap.thread.value;
        let response = thread.append(user.id, body, Utc::now())?;
        let version = self
            .call("cas_write_thread", self.reviews.cas_write_thread(content, expected, thread, Some(user.id)))
            .await
            .inspect_err(|err| log_conflict(err, "append_response"))?;
        info!(response = %response.id, version, "response appended");

        if let Some(recipient) = review.counterpart(user.id) {
            self.notify(Notification::ResponseAppended {
                content_id: content,
                response_id: response.id,
                author_id: user.id,
                recipient_id: recipient,
            })
            .await;
        }
        Ok(response)
    }

    #[instrument(skip_all, fields(%content, %response_id, user = ?principal.user_id()))]
    pub async fn edit_response(
        &self,
        principal: &Principal,
        content: ContentId,
        response_id: ResponseId,
        body: &str,
    ) -> Result<Response> {
        let user = principal.require_user()?;
        let snap = self.snapshot(principal, content).await?;
        check_participation(user.id, &snap.review.value, &snap.access)?;

        let expected = snap.precondition();
        let mut thread = snap.thread.value;
        let edited = thread.edit(user.id, response_id, body, Utc::now())?;
        self.call("cas_write_thread", self.reviews.cas_write_thread(content, expected, thread, None))
            .await
            .inspect_err(|err| log_conflict(err, "edit_response"))?;
        info!("response edited");
        Ok(edited)
    }

    #[instrument(skip_all, fields(%content, %response_id, user = ?principal.user_id()))]
    pub async fn withdraw_response(
        &self,
        principal: &Principal,
        content: ContentId,
        response_id: ResponseId,
    ) -> Result<Response> {
        let user = principal.require_user()?;
        let snap = self.snapshot(principal, content).await?;
        check_participation(user.id, &snap.review.value, &snap.access)?;

        let expected = snap.precondition();
        let mut thread = snap.thread.value;
        let removed = thread.withdraw(user.id, response_id)?;
        self.call("cas_write_thread", self.reviews.cas_write_thread(content, expected, thread, None))
            .await
            .inspect_err(|err| log_conflict(err, "withdraw_response"))?;
        info!("response withdrawn");
        Ok(removed)
    }

    /// Moderation reset: archive the thread, then empty it, in one write.
    #[instrument(skip_all, fields(%content, %trigger, user = ?principal.user_id()))]
    pub async fn reset_thread(
        &self,
        principal: &Principal,
        content: ContentId,
        trigger: ResponseId,
    ) -> Result<ArchivedThread> {
        let user = principal.require_user()?;
        if !user.is_admin() {
            return Err(PolicyError::AccessDenied);
        }

        let thread = self.call("load_thread", self.reviews.load_thread(content)).await?;
        let archive = thread.value.archive(trigger, Utc::now())?;
        let version = self
            .call("cas_reset_thread", self.reviews.cas_reset_thread(content, thread.version, archive.clone()))
            .await
            .inspect_err(|err| log_conflict(err, "reset_thread"))?;
        info!(archived = archive.responses.len(), version, "thread reset");
        Ok(archive)
    }

    /// Drops the caller's unconsumed archive. Returns whether one was dropped;
    /// an archive left by a reset that raced this call is kept.
    #[instrument(skip_all, fields(%content, user = ?principal.user_id()))]
    pub async fn acknowledge_archive(&self, principal: &Principal, content: ContentId) -> Result<bool> {
        let user = principal.require_user()?;
        let Some(archive) = self.call("load_archive", self.reviews.load_archive(content, user.id)).await? else {
            return Ok(false);
        };

        let trigger = archive.reset_trigger_response_id;
        let cleared = self.call("clear_archive", self.reviews.clear_archive(content, user.id, trigger)).await?;
        if !cleared {
            debug!(%trigger, "archive replaced by a newer reset; kept");
        }
        Ok(cleared)
    }

    #[instrument(skip_all, fields(%content, ?kind, user = ?principal.user_id()))]
    pub async fn claim(&self, principal: &Principal, content: ContentId, kind: ClaimKind) -> Result<ClaimState> {
        let user = principal.require_user()?;
        let review = self.load_review(content).await?;
        let next = claim::claim(user.id, &review.value, kind, Utc::now())?;

        self.call(
            "cas_write_claim_state",
            self.reviews.cas_write_claim_state(content, review.version, next.clone()),
        )
        .await
        .inspect_err(|err| log_conflict(err, "claim"))?;
        info!("review claimed");

        self.notify(Notification::ReviewClaimed {
            content_id: content,
            claimant_id: user.id,
            recipient_id: review.value.author_id,
        })
        .await;
        Ok(next)
    }

    #[instrument(skip_all, fields(%content, user = ?principal.user_id()))]
    pub async fn unclaim(&self, principal: &Principal, content: ContentId) -> Result<()> {
        let user = principal.require_user()?;
        let review = self.load_review(content).await?;
        let next = claim::unclaim(user.id, &review.value)?;

        self.call("cas_write_claim_state", self.reviews.cas_write_claim_state(content, review.version, next))
            .await
            .inspect_err(|err| log_conflict(err, "unclaim"))?;
        info!("review unclaimed");
        Ok(())
    }

    #[instrument(skip_all, fields(%content, ?kind, user = ?principal.user_id()))]
    pub async fn toggle_reaction(
        &self,
        principal: &Principal,
        content: ContentId,
        kind: ReactionKind,
    ) -> Result<ToggleOutcome> {
        let user = principal.require_user()?;
        let review = self.load_review(content).await?;
        check_react(Some(user), &review.value)?;

        let ledger = self.call("load_reactions", self.reviews.load_reactions(content)).await?;
        let mut next = ledger.value;
        let outcome = next.toggle(user.id, kind, Utc::now());
        self.call("cas_write_reactions", self.reviews.cas_write_reactions(content, ledger.version, next))
            .await
            .inspect_err(|err| log_conflict(err, "toggle_reaction"))?;
        debug!(present = outcome.present, "reaction toggled");
        Ok(outcome)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn call<T, F>(&self, collaborator: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let timeout = self.config.collaborator_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(PolicyError::from),
            Err(_) => {
                warn!(collaborator, timeout_ms = timeout.as_millis() as u64, "collaborator timed out");
                Err(PolicyError::Unavailable(format!(
                    "{collaborator} did not answer within {} ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    async fn load_review(&self, content: ContentId) -> Result<Versioned<Review>> {
        self.call("load_review", self.reviews.load_review(content)).await
    }

    async fn grants(&self, principal: &Principal, review: &Review) -> Result<Entitlements> {
        let user = match principal.user.as_ref() {
            Some(user) if needs_grants(Some(user), review) => user,
            _ => return Ok(Entitlements::none()),
        };

        let guest = async {
            match principal.guest_token.as_deref() {
                Some(token) => {
                    self.call("lookup_guest_token", self.entitlements.lookup_guest_token(review.id, token))
                        .await
                }
                None => Ok(false),
            }
        };
        let (subscription_active, one_time_unlocks, guest_ok) = tokio::try_join!(
            self.call("subscription_status", self.entitlements.subscription_status(user.id)),
            self.call("one_time_unlocks", self.entitlements.one_time_unlocks(user.id)),
            guest,
        )?;

        let mut grants = Entitlements { subscription_active, one_time_unlocks, ..Entitlements::none() };
        if guest_ok {
            grants.guest_access.insert(review.id);
        }
        Ok(grants)
    }

    async fn resolve(&self, principal: &Principal, review: &Review) -> Result<AccessDecision> {
        let grants = self.grants(principal, review).await?;
        Ok(resolve_access(principal.user.as_ref(), review, &grants))
    }

    async fn snapshot(&self, principal: &Principal, content: ContentId) -> Result<Snapshot> {
        let review = self.load_review(content).await?;
        let (thread, access) = tokio::try_join!(
            self.call("load_thread", self.reviews.load_thread(content)),
            self.resolve(principal, &review.value),
        )?;
        Ok(Snapshot { review, thread, access })
    }

    async fn notify(&self, notification: Notification) {
        if let Err(err) = self.call("notifier", self.notifier.dispatch(notification)).await {
            warn!(error = %err, "notification dispatch failed; mutation already committed");
        }
    }
}

fn log_conflict(err: &PolicyError, operation: &'static str) {
    if matches!(err, PolicyError::Conflict(_)) {
        warn!(operation, "optimistic write lost a race");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::Role;
    use crate::reaction::ReactionLedger;
    use crate::traits::{MockEntitlementLookup, MockNotifier, MockReviewRepo};
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct Fixture {
        business: User,
        customer: User,
        review: Review,
    }

    fn fixture() -> Fixture {
        let business = User::new(Role::Business);
        let customer = User::new(Role::Customer);
        let review = Review::new(business.id, customer.id);
        Fixture { business, customer, review }
    }

    fn repo_serving(review: Review) -> MockReviewRepo {
        let mut repo = MockReviewRepo::new();
        let content = review.id;
        repo.expect_load_review().returning(move |_| Ok(Versioned::new(1, review.clone())));
        repo.expect_load_thread()
            .returning(move |_| Ok(Versioned::initial(ResponseThread::empty(content))));
        repo
    }

    fn no_lookups() -> MockEntitlementLookup {
        let mut lookup = MockEntitlementLookup::new();
        lookup.expect_subscription_status().never();
        lookup.expect_one_time_unlocks().never();
        lookup.expect_lookup_guest_token().never();
        lookup
    }

    fn engine(repo: MockReviewRepo, lookup: impl EntitlementLookup + 'static, notifier: MockNotifier) -> PolicyEngine {
        PolicyEngine::new(Arc::new(repo), Arc::new(lookup), Arc::new(notifier), EngineConfig::default())
    }

    #[tokio::test]
    async fn party_view_skips_entitlement_lookups() {
        let f = fixture();
        let engine = engine(repo_serving(f.review.clone()), no_lookups(), MockNotifier::new());

        let decision = engine.can_view(&Principal::user(f.business), f.review.id).await.unwrap();
        assert!(decision.full_access);
    }

    #[tokio::test]
    async fn lookup_failure_is_unavailable_for_outsiders() {
        let f = fixture();
        let mut lookup = MockEntitlementLookup::new();
        lookup.expect_subscription_status().returning(|_| Err(StoreError::Backend("billing down".into())));
        lookup.expect_one_time_unlocks().returning(|_| Ok(HashSet::new()));
        let engine = engine(repo_serving(f.review.clone()), lookup, MockNotifier::new());

        let err = engine.can_view(&Principal::user(User::new(Role::Business)), f.review.id).await.unwrap_err();
        assert_eq!(err, PolicyError::Unavailable("billing down".into()));
    }

    #[tokio::test]
    async fn guest_token_is_checked_only_when_presented() {
        let f = fixture();
        let mut lookup = MockEntitlementLookup::new();
        lookup.expect_subscription_status().returning(|_| Ok(false));
        lookup.expect_one_time_unlocks().returning(|_| Ok(HashSet::new()));
        lookup
            .expect_lookup_guest_token()
            .withf(|_, token| token.to_string() == "tok-123")
            .times(1)
            .returning(|_, _| Ok(true));
        let engine = engine(repo_serving(f.review.clone()), lookup, MockNotifier::new());
        let stranger = User::new(Role::Customer);

        let without = engine.can_view(&Principal::user(stranger.clone()), f.review.id).await.unwrap();
        assert!(!without.full_access);

        let with = engine
            .can_view(&Principal::user(stranger).with_guest_token("tok-123"), f.review.id)
            .await
            .unwrap();
        assert_eq!(with.reason, AccessReason::GuestToken);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_fail_append() {
        let f = fixture();
        let author = f.business.id;
        let mut repo = repo_serving(f.review.clone());
        repo.expect_cas_write_thread()
            .withf(move |_, expected, thread, consume| {
                *expected == ThreadPrecondition { review_version: 1, thread_version: 0 }
                    && thread.len() == 1
                    && *consume == Some(author)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(1));
        repo.expect_clear_archive().never();

        let mut notifier = MockNotifier::new();
        notifier
            .expect_dispatch()
            .times(1)
            .returning(|_| Err(StoreError::Backend("smtp refused".into())));

        let engine = engine(repo, no_lookups(), notifier);
        let response = engine
            .append_response(&Principal::user(f.business.clone()), f.review.id, "We are sorry to hear that")
            .await
            .unwrap();
        assert_eq!(response.author_id, f.business.id);
    }

    #[tokio::test]
    async fn lost_race_is_reported_once_without_retry() {
        let f = fixture();
        let mut repo = repo_serving(f.review.clone());
        repo.expect_cas_write_thread()
            .times(1)
            .returning(|_, _, _, _| Err(StoreError::Conflict { expected: 0, found: 1 }));

        let mut notifier = MockNotifier::new();
        notifier.expect_dispatch().never();

        let engine = engine(repo, no_lookups(), notifier);
        let err = engine
            .append_response(&Principal::user(f.business), f.review.id, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn claim_notifies_the_author() {
        let f = fixture();
        let mut repo = repo_serving(f.review.clone());
        repo.expect_cas_write_claim_state()
            .withf(|_, expected, state| *expected == 1 && matches!(state, ClaimState::Claimed { .. }))
            .returning(|_, _, _| Ok(2));

        let author = f.review.author_id;
        let mut notifier = MockNotifier::new();
        notifier
            .expect_dispatch()
            .withf(move |n| matches!(n, Notification::ReviewClaimed { recipient_id, .. } if *recipient_id == author))
            .times(1)
            .returning(|_| Ok(()));

        let engine = engine(repo, no_lookups(), notifier);
        let state = engine
            .claim(&Principal::user(f.customer.clone()), f.review.id, ClaimKind::DirectClaim)
            .await
            .unwrap();
        assert!(state.is_claimed_by(f.customer.id));
    }

    #[tokio::test]
    async fn self_reaction_never_touches_the_ledger() {
        let f = fixture();
        let mut repo = repo_serving(f.review.clone());
        repo.expect_load_reactions().never();
        repo.expect_cas_write_reactions().never();

        let engine = engine(repo, no_lookups(), MockNotifier::new());
        let err = engine
            .toggle_reaction(&Principal::user(f.customer), f.review.id, ReactionKind::Like)
            .await
            .unwrap_err();
        assert_eq!(err, PolicyError::SelfReaction);
    }

    #[tokio::test]
    async fn reaction_write_is_conditioned_on_read_version() {
        let f = fixture();
        let content = f.review.id;
        let mut repo = repo_serving(f.review.clone());
        repo.expect_load_reactions()
            .returning(move |_| Ok(Versioned::new(7, ReactionLedger::empty(content))));
        repo.expect_cas_write_reactions()
            .withf(|_, expected, ledger| *expected == 7 && ledger.entries.len() == 1)
            .returning(|_, _, _| Ok(8));

        let engine = engine(repo, no_lookups(), MockNotifier::new());
        let outcome = engine
            .toggle_reaction(&Principal::user(User::new(Role::Business)), content, ReactionKind::Funny)
            .await
            .unwrap();
        assert!(outcome.present);
    }

    #[tokio::test]
    async fn acknowledge_clears_only_the_archive_it_read() {
        let f = fixture();
        let trigger = ResponseId::new();
        let archive = ArchivedThread {
            content_id: f.review.id,
            responses: Vec::new(),
            archived_at: Utc::now(),
            reset_trigger_response_id: trigger,
        };
        let mut repo = repo_serving(f.review.clone());
        repo.expect_load_archive().returning(move |_, _| Ok(Some(archive.clone())));
        // A newer reset replaced the archive in between.
        repo.expect_clear_archive()
            .withf(move |_, _, t| *t == trigger)
            .times(1)
            .returning(|_, _, _| Ok(false));

        let engine = engine(repo, no_lookups(), MockNotifier::new());
        let cleared = engine.acknowledge_archive(&Principal::user(f.business), f.review.id).await.unwrap();
        assert!(!cleared);
    }

    #[tokio::test]
    async fn non_admin_cannot_reset() {
        let f = fixture();
        let mut repo = repo_serving(f.review.clone());
        repo.expect_cas_reset_thread().never();
        let engine = engine(repo, no_lookups(), MockNotifier::new());

        let err = engine
            .reset_thread(&Principal::user(f.business), f.review.id, ResponseId::new())
            .await
            .unwrap_err();
        assert_eq!(err, PolicyError::AccessDenied);
    }

    #[tokio::test]
    async fn anonymous_mutations_are_unauthenticated() {
        let f = fixture();
        let engine = engine(repo_serving(f.review.clone()), no_lookups(), MockNotifier::new());
        let anon = Principal::anonymous();

        assert_eq!(engine.append_response(&anon, f.review.id, "hi").await.unwrap_err(), PolicyError::Unauthenticated);
        assert_eq!(
            engine.claim(&anon, f.review.id, ClaimKind::DirectClaim).await.unwrap_err(),
            PolicyError::Unauthenticated
        );
        let verdict = engine.can_react(&anon, f.review.id).await.unwrap();
        assert_eq!(verdict, Verdict::deny(PolicyError::Unauthenticated));
    }

    struct StalledLookup;

    #[async_trait]
    impl EntitlementLookup for StalledLookup {
        async fn subscription_status(&self, _user: UserId) -> StoreResult<bool> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        }

        async fn one_time_unlocks(&self, _user: UserId) -> StoreResult<HashSet<ContentId>> {
            Ok(HashSet::new())
        }

        async fn lookup_guest_token(&self, _content: ContentId, _token: &str) -> StoreResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn stalled_collaborator_times_out_as_unavailable() {
        let f = fixture();
        let engine = engine(repo_serving(f.review.clone()), StalledLookup, MockNotifier::new())
            .with_timeout(Duration::from_millis(20));

        let err = engine
            .can_view(&Principal::user(User::new(Role::Business)), f.review.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::Unavailable(msg) if msg.contains("subscription_status")));
    }

    #[test]
    fn verdict_serializes_denial_code() {
        let json = serde_json::to_value(Verdict::deny(PolicyError::NotClaimed)).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["denial"], "not-claimed");

        let json = serde_json::to_value(Verdict::allow()).unwrap();
        assert_eq!(json["denial"], serde_json::Value::Null);
    }
}
