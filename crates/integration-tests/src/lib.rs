//! Shared fixtures for the cross-crate tests: one review by a business about
//! a customer, an outsider with no grants, and an admin, all wired to a
//! `MemoryStore`-backed engine.

use std::sync::Arc;
use welp_core::{
    ClaimKind, ContentId, EngineConfig, PolicyEngine, Principal, Review, ReviewRepo, Role, User,
};
use welp_store_memory::{MemoryStore, OutboxNotifier};

pub struct World {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<OutboxNotifier>,
    pub engine: PolicyEngine,
    /// Author of `review`.
    pub business: User,
    /// Subject of `review`.
    pub customer: User,
    pub outsider: User,
    pub admin: User,
    pub review: Review,
}

impl World {
    pub fn new() -> Self {
        Self::with_repo(|store| store as Arc<dyn ReviewRepo>)
    }

    /// Builds the world with the review repo wrapped by `wrap`, e.g. to inject
    /// delays in front of the memory store.
    pub fn with_repo(wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn ReviewRepo>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(OutboxNotifier::new());

        let business = User::new(Role::Business);
        let customer = User::new(Role::Customer);
        let outsider = User::new(Role::Business);
        let admin = User::new(Role::Admin);
        for user in [&business, &customer, &outsider, &admin] {
            store.insert_user(user.clone());
        }
        let review = Review::new(business.id, customer.id);
        store.insert_review(review.clone());

        let engine = PolicyEngine::new(wrap(store.clone()), store.clone(), notifier.clone(), EngineConfig::default());
        Self { store, notifier, engine, business, customer, outsider, admin, review }
    }

    pub fn content(&self) -> ContentId {
        self.review.id
    }

    pub fn as_user(&self, user: &User) -> Principal {
        Principal::user(user.clone())
    }

    /// A fresh, registered user with no grants.
    pub fn stranger(&self, role: Role) -> User {
        let user = User::new(role);
        self.store.insert_user(user.clone());
        user
    }

    pub async fn subject_claims(&self) {
        self.engine
            .claim(&self.as_user(&self.customer), self.content(), ClaimKind::DirectClaim)
            .await
            .expect("subject claim");
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
