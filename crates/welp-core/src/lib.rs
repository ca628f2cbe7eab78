//! welp/crates/welp-core/src/lib.rs
//!
//! The access and interaction policy engine for Welp reviews, plus the
//! interface definitions its collaborators implement.

pub mod chain;
pub mod claim;
pub mod engine;
pub mod entitlement;
pub mod error;
pub mod models;
pub mod reaction;
pub mod traits;

// Re-exporting for easier access in other crates
pub use engine::*;
pub use entitlement::{AccessDecision, AccessReason, Entitlements};
pub use error::*;
pub use models::*;
pub use reaction::{ReactionCounts, ReactionEntry, ReactionLedger, ToggleOutcome};
pub use traits::*;
