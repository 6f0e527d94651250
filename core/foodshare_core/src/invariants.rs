//! Cross-entity invariants, checked by the scenario tests after every step.

#![allow(dead_code)]

use crate::store::{ClaimQuery, DonationQuery, Store};
use crate::types::{Claim, Donation, DonationStatus};

/// INV-1: a donation is `claimed` iff exactly one active claim references it,
/// and no donation has more than one active claim.
pub fn assert_claimed_iff_active_claim(donations: &[Donation], claims: &[Claim]) {
    for donation in donations {
        let active = claims
            .iter()
            .filter(|c| c.donation_id == donation.id && c.is_active())
            .count();
        assert!(
            active <= 1,
            "INV-1 violated: donation {} has {active} active claims",
            donation.id
        );
        assert_eq!(
            donation.status == DonationStatus::Claimed,
            active == 1,
            "INV-1 violated: donation {} is {} with {active} active claim(s)",
            donation.id,
            donation.status
        );
    }
}

/// INV-2: claims on a deleted donation are never active.
pub fn assert_orphans_inactive(donations: &[Donation], claims: &[Claim]) {
    for claim in claims {
        if !donations.iter().any(|d| d.id == claim.donation_id) {
            assert!(
                !claim.is_active(),
                "INV-2 violated: claim {} is {} on a deleted donation",
                claim.id,
                claim.status
            );
        }
    }
}

/// INV-3: a completed donation has a completed claim.
pub fn assert_completed_has_completed_claim(donations: &[Donation], claims: &[Claim]) {
    for donation in donations
        .iter()
        .filter(|d| d.status == DonationStatus::Completed)
    {
        assert!(
            claims.iter().any(|c| c.donation_id == donation.id
                && c.status == crate::types::ClaimStatus::Completed),
            "INV-3 violated: donation {} completed without a completed claim",
            donation.id
        );
    }
}

/// INV-4: fields that never change after creation.
pub fn assert_immutable_fields(original: &Donation, current: &Donation) {
    assert_eq!(original.id, current.id, "INV-4 violated: id changed");
    assert_eq!(original.owner, current.owner, "INV-4 violated: owner changed");
    assert_eq!(
        original.created_at, current.created_at,
        "INV-4 violated: created_at changed"
    );
}

/// Run every cross-entity invariant against the store's current contents.
pub async fn assert_all(store: &dyn Store) {
    let donations = store
        .query_donations(&DonationQuery::all())
        .await
        .expect("query donations");
    let claims = store
        .query_claims(&ClaimQuery::default())
        .await
        .expect("query claims");
    assert_claimed_iff_active_claim(&donations, &claims);
    assert_orphans_inactive(&donations, &claims);
    assert_completed_has_completed_claim(&donations, &claims);
}
