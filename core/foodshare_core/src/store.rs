//! # Store
//!
//! The persistence contract the Lifecycle Manager depends on.
//!
//! Reads are plain one-shot fetches. Every mutation goes through
//! [`Store::commit`], which applies a batch of [`Write`]s atomically:
//! either every write (and every precondition it carries) succeeds, or
//! nothing changes.
//!
//! | Write                 | Precondition                                |
//! |-----------------------|---------------------------------------------|
//! | `InsertDonation`      | id unused                                   |
//! | `UpdateDonation`      | donation exists and is owned by `owner`     |
//! | `DeleteDonation`      | donation exists, owned by `owner`, with `status` |
//! | `SetDonationStatus`   | donation exists with status `from`          |
//! | `InsertClaim`         | id unused                                   |
//! | `SetClaimStatus`      | claim exists with status `from`             |
//! | `AppendEvent`         | none                                        |
//!
//! Status preconditions turn "read, check, then write" into a single
//! compare-and-set, so two concurrent claims on one donation cannot both
//! win.

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::events::{EventRecord, LifecycleEvent};
use crate::types::{
    Claim, ClaimId, ClaimStatus, Donation, DonationFields, DonationId, DonationStatus, UserId,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One mutation inside a [`Store::commit`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    InsertDonation(Donation),
    UpdateDonation {
        id: DonationId,
        owner: UserId,
        fields: DonationFields,
    },
    DeleteDonation {
        id: DonationId,
        owner: UserId,
        status: DonationStatus,
    },
    SetDonationStatus {
        id: DonationId,
        from: DonationStatus,
        to: DonationStatus,
    },
    InsertClaim(Claim),
    SetClaimStatus {
        id: ClaimId,
        from: ClaimStatus,
        to: ClaimStatus,
    },
    AppendEvent(LifecycleEvent),
}

/// Donation filter. Results are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DonationQuery {
    pub owner: Option<UserId>,
    pub status: Option<DonationStatus>,
    pub ids: Option<Vec<DonationId>>,
}

impl DonationQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn owned_by(owner: UserId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    pub fn ids(ids: Vec<DonationId>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn matches(&self, donation: &Donation) -> bool {
        self.owner.map_or(true, |owner| donation.owner == owner)
            && self.status.map_or(true, |status| donation.status == status)
            && self
                .ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&donation.id))
    }
}

/// Claim filter. Results are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimQuery {
    pub claimant: Option<UserId>,
    pub donation_id: Option<DonationId>,
    pub active_only: bool,
}

impl ClaimQuery {
    pub fn by_claimant(claimant: UserId) -> Self {
        Self {
            claimant: Some(claimant),
            ..Self::default()
        }
    }

    pub fn active_on(donation_id: DonationId) -> Self {
        Self {
            donation_id: Some(donation_id),
            active_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, claim: &Claim) -> bool {
        self.claimant.map_or(true, |c| claim.claimant == c)
            && self.donation_id.map_or(true, |d| claim.donation_id == d)
            && (!self.active_only || claim.is_active())
    }
}

/// Event filter. Results are ordered by sequence number, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    pub donation_id: Option<DonationId>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_donation(&self, id: DonationId) -> StoreResult<Option<Donation>>;

    async fn get_claim(&self, id: ClaimId) -> StoreResult<Option<Claim>>;

    async fn query_donations(&self, query: &DonationQuery) -> StoreResult<Vec<Donation>>;

    async fn query_claims(&self, query: &ClaimQuery) -> StoreResult<Vec<Claim>>;

    async fn query_events(&self, query: &EventQuery) -> StoreResult<Vec<EventRecord>>;

    /// Apply `writes` atomically, in order.
    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()>;
}
