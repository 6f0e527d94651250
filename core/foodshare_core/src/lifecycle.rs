//! Transition tables for donations and claims.
//!
//! Only forward transitions are allowed, with one exception: a claimed
//! donation returns to `available` when its active claim is cancelled.
//!
//! ```text
//! Donation                              Claim
//!   available -> claimed | cancelled      pending  -> approved | cancelled
//!   claimed   -> available | completed    approved -> completed | cancelled
//!              | cancelled                completed -> (none)
//!   completed -> (none)                   cancelled -> (none)
//!   cancelled -> (none)
//! ```
//!
//! `pending -> completed` is rejected: a claim must be approved first.

use crate::errors::LifecycleError;
use crate::types::{ClaimStatus, DonationStatus};

impl DonationStatus {
    pub fn can_transition_to(self, to: DonationStatus) -> bool {
        use DonationStatus::*;
        matches!(
            (self, to),
            (Available, Claimed)
                | (Available, Cancelled)
                | (Claimed, Available)
                | (Claimed, Completed)
                | (Claimed, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DonationStatus::Completed | DonationStatus::Cancelled)
    }

    /// Fail with `InvalidTransition` unless `self -> to` is in the table.
    pub fn check_transition(self, to: DonationStatus) -> Result<(), LifecycleError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                entity: "donation",
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl ClaimStatus {
    /// Statuses reachable from `self` in one step.
    pub fn successors(self) -> &'static [ClaimStatus] {
        use ClaimStatus::*;
        match self {
            Pending => &[Approved, Cancelled],
            Approved => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, to: ClaimStatus) -> bool {
        self.successors().contains(&to)
    }

    /// Pending and approved claims hold their donation.
    pub fn is_active(self) -> bool {
        matches!(self, ClaimStatus::Pending | ClaimStatus::Approved)
    }

    pub fn check_transition(self, to: ClaimStatus) -> Result<(), LifecycleError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                entity: "claim",
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// The donation transition a claim moving into `self` drives, if any.
    pub fn donation_effect(self) -> Option<(DonationStatus, DonationStatus)> {
        match self {
            ClaimStatus::Completed => Some((DonationStatus::Claimed, DonationStatus::Completed)),
            ClaimStatus::Cancelled => Some((DonationStatus::Claimed, DonationStatus::Available)),
            ClaimStatus::Pending | ClaimStatus::Approved => None,
        }
    }
}
