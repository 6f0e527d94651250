//! # Types
//!
//! Shared data structures used across all modules of the FoodShare core.
//!
//! ## Design decisions
//!
//! ### One status vocabulary
//!
//! Donations use exactly one status set: `available`, `claimed`,
//! `completed`, `cancelled`. There is no `picked up` state; a pickup is a
//! claim reaching `completed`.
//!
//! ### Status as a Finite-State Machine
//!
//! ```text
//! Donation:  available ──► claimed ──► completed
//!                ▲            │
//!                └────────────┘   (active claim cancelled)
//!            available | claimed ──► cancelled
//!
//! Claim:     pending ──► approved ──► completed
//!               └───────────┴──────► cancelled
//! ```
//!
//! The tables themselves live in [`crate::lifecycle`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::LifecycleError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// An authenticated user, as issued by the external auth provider.
    UserId
);
uuid_id!(
    /// Immutable donation identifier.
    DonationId
);
uuid_id!(
    /// Immutable claim identifier.
    ClaimId
);

/// Lifecycle status of a donation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    /// Listed and open for claims.
    Available,
    /// Held by exactly one active claim.
    Claimed,
    /// The claim was fulfilled.
    Completed,
    /// Withdrawn by the owner.
    Cancelled,
}

/// Lifecycle status of a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Completed,
    Cancelled,
}

impl DonationStatus {
    pub const ALL: [DonationStatus; 4] = [
        Self::Available,
        Self::Claimed,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 4] = [
        Self::Pending,
        Self::Approved,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LifecycleError::Validation(format!("unknown donation status `{s}`")))
    }
}

impl FromStr for ClaimStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LifecycleError::Validation(format!("unknown claim status `{s}`")))
    }
}

/// A listed quantity of food offered for pickup by its owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: DonationId,
    /// Creating user; ownership never transfers.
    pub owner: UserId,
    pub food_type: String,
    pub description: String,
    pub location: String,
    /// Freeform quantity, never negative.
    pub amount: f64,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
}

/// A request by another user to take possession of a donation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub donation_id: DonationId,
    pub claimant: UserId,
    pub status: ClaimStatus,
    pub claimed_at: DateTime<Utc>,
}

impl Claim {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// A claimant's dashboard row: the claim plus the donation it targets.
///
/// `donation` is `None` once the owner has deleted the listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimWithDonation {
    #[serde(flatten)]
    pub claim: Claim,
    pub donation: Option<Donation>,
}

/// Untrusted donation form input. Every field may be missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DonationDraft {
    pub food_type: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub amount: Option<f64>,
}

/// Validated, owner-editable donation attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DonationFields {
    pub food_type: String,
    pub description: String,
    pub location: String,
    pub amount: f64,
}

impl DonationDraft {
    pub fn new(food_type: &str, description: &str, location: &str, amount: f64) -> Self {
        Self {
            food_type: Some(food_type.to_string()),
            description: Some(description.to_string()),
            location: Some(location.to_string()),
            amount: Some(amount),
        }
    }

    /// Check that every required field is present and well formed.
    ///
    /// Text fields are trimmed; a blank string counts as missing.
    pub fn validate(&self) -> Result<DonationFields, LifecycleError> {
        let mut missing = Vec::new();
        let mut text = |name: &'static str, value: &Option<String>| {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let food_type = text("food_type", &self.food_type);
        let description = text("description", &self.description);
        let location = text("location", &self.location);

        if self.amount.is_none() {
            missing.push("amount");
        }
        if !missing.is_empty() {
            return Err(LifecycleError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        let amount = self.amount.unwrap_or_default();
        if !amount.is_finite() || amount < 0.0 {
            return Err(LifecycleError::Validation(format!(
                "amount must be a non-negative number, got {amount}"
            )));
        }

        Ok(DonationFields {
            food_type,
            description,
            location,
            amount,
        })
    }
}

impl Donation {
    /// Replace the owner-editable attributes, leaving id, owner, status
    /// and timestamp untouched.
    pub fn apply(&mut self, fields: &DonationFields) {
        self.food_type = fields.food_type.clone();
        self.description = fields.description.clone();
        self.location = fields.location.clone();
        self.amount = fields.amount;
    }

    /// Case-insensitive match on food type or location.
    pub fn matches_search(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        needle.is_empty()
            || self.food_type.to_lowercase().contains(&needle)
            || self.location.to_lowercase().contains(&needle)
    }
}

/// Current time truncated to whole milliseconds, so timestamps survive a
/// round trip through any backing store unchanged.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
