//! # FoodShare Core
//!
//! The donation/claim lifecycle of the **FoodShare** marketplace: owners
//! list surplus food, other users claim it, and both sides follow the claim
//! through to pickup. This crate owns the two state machines and the
//! [`LifecycleManager`] that drives them. It is storage-agnostic.
//!
//! | Phase        | Operation(s)                                          |
//! |--------------|-------------------------------------------------------|
//! | Listing      | [`LifecycleManager::create_donation`], `edit_donation`, `delete_donation` |
//! | Claiming     | [`LifecycleManager::claim`]                           |
//! | Settlement   | `update_claim_status`, `mark_completed`, `cancel_donation` |
//! | Queries      | `get_donation`, `browse`, `dashboard`, `history`      |
//!
//! ## Architecture
//!
//! Persistence is fully delegated to a [`Store`] (see [`store`]), the
//! caller's identity to an [`Identity`] passed into every call. Transition
//! rules live in [`lifecycle`]; this crate never reads a session from
//! global state.

pub mod errors;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod manager;
pub mod memory;
pub mod store;
pub mod types;
pub mod views;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_claims;

pub use errors::{Denied, LifecycleError, StoreError};
pub use events::{EventKind, EventRecord, LifecycleEvent};
pub use identity::{Identity, Session};
pub use manager::{Dashboard, LifecycleManager};
pub use memory::MemoryStore;
pub use store::{ClaimQuery, DonationQuery, EventQuery, Store, StoreResult, Write};
pub use views::ViewLimits;
pub use types::{
    Claim, ClaimId, ClaimStatus, ClaimWithDonation, Donation, DonationDraft, DonationFields,
    DonationId, DonationStatus, UserId,
};
