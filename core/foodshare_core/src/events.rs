//! Lifecycle history.
//!
//! Every successful mutation appends one [`LifecycleEvent`] in the same
//! store commit as the mutation itself, so the history never disagrees
//! with the records it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ClaimId, DonationId, UserId};

/// All recognised lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A donation was listed.
    DonationCreated,
    /// The owner changed a donation's attributes.
    DonationEdited,
    /// The owner removed a donation.
    DonationDeleted,
    /// The owner withdrew a donation.
    DonationCancelled,
    /// A claim was placed; the donation is now held.
    DonationClaimed,
    ClaimApproved,
    ClaimCompleted,
    ClaimCancelled,
}

impl EventKind {
    const ALL: [EventKind; 8] = [
        Self::DonationCreated,
        Self::DonationEdited,
        Self::DonationDeleted,
        Self::DonationCancelled,
        Self::DonationClaimed,
        Self::ClaimApproved,
        Self::ClaimCompleted,
        Self::ClaimCancelled,
    ];

    /// Parse a stored identifier back into an [`EventKind`].
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Return a short identifier string suitable for storage in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DonationCreated => "donation_created",
            Self::DonationEdited => "donation_edited",
            Self::DonationDeleted => "donation_deleted",
            Self::DonationCancelled => "donation_cancelled",
            Self::DonationClaimed => "donation_claimed",
            Self::ClaimApproved => "claim_approved",
            Self::ClaimCompleted => "claim_completed",
            Self::ClaimCancelled => "claim_cancelled",
        }
    }
}

/// A lifecycle event, ready to be appended to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub donation_id: DonationId,
    pub claim_id: Option<ClaimId>,
    pub actor: UserId,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind, donation_id: DonationId, actor: UserId) -> Self {
        Self {
            kind,
            donation_id,
            claim_id: None,
            actor,
            from_status: None,
            to_status: None,
            at: crate::types::now_millis(),
        }
    }

    pub fn claim(mut self, claim_id: ClaimId) -> Self {
        self.claim_id = Some(claim_id);
        self
    }

    pub fn status(self, from: impl ToString, to: impl ToString) -> Self {
        self.left(from).entered(to)
    }

    pub fn left(mut self, from: impl ToString) -> Self {
        self.from_status = Some(from.to_string());
        self
    }

    pub fn entered(mut self, to: impl ToString) -> Self {
        self.to_status = Some(to.to_string());
        self
    }
}

/// An event as stored in / read from a store, with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: i64,
    #[serde(flatten)]
    pub event: LifecycleEvent,
}
