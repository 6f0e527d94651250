//! The Lifecycle Manager.
//!
//! Every operation follows the same shape: authenticate the caller, read
//! the current records, check the transition tables and ownership, then
//! hand one atomic batch to [`Store::commit`]. Status writes carry the
//! status they were checked against, so a concurrent change surfaces as
//! `Conflict` instead of silently overwriting. Successful mutations then
//! refresh the list views that depend on the touched records.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{Denied, LifecycleError, Result, StoreError};
use crate::events::{EventKind, EventRecord, LifecycleEvent};
use crate::identity::Identity;
use crate::store::{ClaimQuery, EventQuery, Store, Write};
use crate::types::{
    now_millis, Claim, ClaimId, ClaimStatus, ClaimWithDonation, Donation, DonationDraft,
    DonationId, DonationStatus, UserId,
};
use crate::views::{filter_search, ListView, ListViews, ViewLimits};

const ALREADY_CLAIMED: &str = "this donation has already been claimed";
const NO_LONGER_AVAILABLE: &str = "this donation is no longer available";

/// A user's own listings and claims.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub donations: Vec<Donation>,
    pub claims: Vec<ClaimWithDonation>,
}

impl EventKind {
    /// The event recorded when a claim enters `status`.
    fn for_claim_status(status: ClaimStatus) -> Self {
        match status {
            ClaimStatus::Pending => EventKind::DonationClaimed,
            ClaimStatus::Approved => EventKind::ClaimApproved,
            ClaimStatus::Completed => EventKind::ClaimCompleted,
            ClaimStatus::Cancelled => EventKind::ClaimCancelled,
        }
    }
}

pub struct LifecycleManager {
    store: Arc<dyn Store>,
    views: ListViews,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_view_limits(store, ViewLimits::default())
    }

    pub fn with_view_limits(store: Arc<dyn Store>, limits: ViewLimits) -> Self {
        Self {
            store,
            views: ListViews::with_limits(limits),
        }
    }

    pub fn views(&self) -> &ListViews {
        &self.views
    }

    // ─────────────────────────────────────────────────────────
    // Donations
    // ─────────────────────────────────────────────────────────

    /// List a new donation owned by the caller, initially `available`.
    pub async fn create_donation(
        &self,
        who: &dyn Identity,
        draft: &DonationDraft,
    ) -> Result<Donation> {
        let owner = who.require_user()?;
        let fields = draft.validate()?;

        let donation = Donation {
            id: DonationId::new(),
            owner,
            food_type: fields.food_type,
            description: fields.description,
            location: fields.location,
            amount: fields.amount,
            status: DonationStatus::Available,
            created_at: now_millis(),
        };

        self.store
            .commit(vec![
                Write::InsertDonation(donation.clone()),
                Write::AppendEvent(
                    LifecycleEvent::new(EventKind::DonationCreated, donation.id, owner)
                        .entered(DonationStatus::Available),
                ),
            ])
            .await?;

        info!("Donation {} created by {owner}", donation.id);
        self.refresh(&[ListView::OwnerDonations(owner), ListView::Browse])
            .await;
        Ok(donation)
    }

    /// Replace the owner-editable attributes. Status is never touched.
    pub async fn edit_donation(
        &self,
        who: &dyn Identity,
        id: DonationId,
        draft: &DonationDraft,
    ) -> Result<Donation> {
        let user = who.require_user()?;
        let mut donation = self.owned_donation(user, id).await?;
        let fields = draft.validate()?;

        self.store
            .commit(vec![
                Write::UpdateDonation {
                    id,
                    owner: user,
                    fields: fields.clone(),
                },
                Write::AppendEvent(LifecycleEvent::new(EventKind::DonationEdited, id, user)),
            ])
            .await?;
        donation.apply(&fields);

        info!("Donation {id} edited");
        let mut views = self.claimant_views(id).await;
        views.extend([ListView::OwnerDonations(user), ListView::Browse]);
        self.refresh(&views).await;
        Ok(donation)
    }

    /// Remove a donation at any status. Active claims on it are cancelled
    /// in the same commit and kept as history. The batch is conditional on
    /// the donation status and every claim status read here, so a claim
    /// placed or moved in between turns the delete into a `Conflict`.
    pub async fn delete_donation(&self, who: &dyn Identity, id: DonationId) -> Result<()> {
        let user = who.require_user()?;
        let donation = self.owned_donation(user, id).await?;
        let active = self
            .store
            .query_claims(&ClaimQuery::active_on(id))
            .await?;
        let views = self.claimant_views(id).await;

        let mut writes = Vec::with_capacity(2 * active.len() + 2);
        for claim in &active {
            writes.push(Write::SetClaimStatus {
                id: claim.id,
                from: claim.status,
                to: ClaimStatus::Cancelled,
            });
            writes.push(Write::AppendEvent(
                LifecycleEvent::new(EventKind::ClaimCancelled, id, user)
                    .claim(claim.id)
                    .status(claim.status, ClaimStatus::Cancelled),
            ));
        }
        writes.push(Write::DeleteDonation {
            id,
            owner: user,
            status: donation.status,
        });
        writes.push(Write::AppendEvent(
            LifecycleEvent::new(EventKind::DonationDeleted, id, user).left(donation.status),
        ));
        self.store.commit(writes).await?;

        info!(
            "Donation {id} deleted ({} active claim(s) cancelled)",
            active.len()
        );
        let mut views = views;
        views.extend([ListView::OwnerDonations(user), ListView::Browse]);
        self.refresh(&views).await;
        Ok(())
    }

    /// Owner withdraws an available or claimed donation. A held donation
    /// releases its active claim as `cancelled`.
    pub async fn cancel_donation(&self, who: &dyn Identity, id: DonationId) -> Result<Donation> {
        let user = who.require_user()?;
        let mut donation = self.owned_donation(user, id).await?;
        donation.status.check_transition(DonationStatus::Cancelled)?;

        let active = self
            .store
            .query_claims(&ClaimQuery::active_on(id))
            .await?;
        let mut views = self.claimant_views(id).await;

        let mut writes = vec![Write::SetDonationStatus {
            id,
            from: donation.status,
            to: DonationStatus::Cancelled,
        }];
        for claim in &active {
            writes.push(Write::SetClaimStatus {
                id: claim.id,
                from: claim.status,
                to: ClaimStatus::Cancelled,
            });
            writes.push(Write::AppendEvent(
                LifecycleEvent::new(EventKind::ClaimCancelled, id, user)
                    .claim(claim.id)
                    .status(claim.status, ClaimStatus::Cancelled),
            ));
        }
        writes.push(Write::AppendEvent(
            LifecycleEvent::new(EventKind::DonationCancelled, id, user)
                .status(donation.status, DonationStatus::Cancelled),
        ));
        self.store.commit(writes).await?;

        info!("Donation {id} cancelled (was {})", donation.status);
        donation.status = DonationStatus::Cancelled;
        views.extend([ListView::OwnerDonations(user), ListView::Browse]);
        self.refresh(&views).await;
        Ok(donation)
    }

    /// Owner confirms pickup: completes the donation's active claim, which
    /// in turn completes the donation. The claim must already be approved.
    pub async fn mark_completed(&self, who: &dyn Identity, id: DonationId) -> Result<Claim> {
        let user = who.require_user()?;
        let donation = self.owned_donation(user, id).await?;
        donation.status.check_transition(DonationStatus::Completed)?;

        let claim = self
            .store
            .query_claims(&ClaimQuery::active_on(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LifecycleError::Conflict(format!("donation {id} has no active claim")))?;

        self.update_claim_status(who, claim.id, ClaimStatus::Completed)
            .await
    }

    // ─────────────────────────────────────────────────────────
    // Claims
    // ─────────────────────────────────────────────────────────

    /// Place a `pending` claim on an `available` donation, moving the
    /// donation to `claimed` in the same commit.
    pub async fn claim(&self, who: &dyn Identity, donation_id: DonationId) -> Result<Claim> {
        let claimant = who.require_user()?;
        let donation = self.donation(donation_id).await?;

        match donation.status {
            DonationStatus::Available => {}
            DonationStatus::Claimed | DonationStatus::Completed => {
                warn!("Claim on {donation_id} rejected: status {}", donation.status);
                return Err(LifecycleError::Conflict(ALREADY_CLAIMED.to_string()));
            }
            DonationStatus::Cancelled => {
                warn!("Claim on {donation_id} rejected: donation cancelled");
                return Err(LifecycleError::Conflict(NO_LONGER_AVAILABLE.to_string()));
            }
        }
        if donation.owner == claimant {
            return Err(LifecycleError::Authorization(Denied::SelfClaim));
        }

        let mut views = self.claimant_views(donation_id).await;
        let claim = Claim {
            id: ClaimId::new(),
            donation_id,
            claimant,
            status: ClaimStatus::Pending,
            claimed_at: now_millis(),
        };

        let committed = self
            .store
            .commit(vec![
                Write::SetDonationStatus {
                    id: donation_id,
                    from: DonationStatus::Available,
                    to: DonationStatus::Claimed,
                },
                Write::InsertClaim(claim.clone()),
                Write::AppendEvent(
                    LifecycleEvent::new(EventKind::DonationClaimed, donation_id, claimant)
                        .claim(claim.id)
                        .status(DonationStatus::Available, DonationStatus::Claimed),
                ),
            ])
            .await;

        match committed {
            Ok(()) => {}
            Err(StoreError::Precondition(reason)) => {
                warn!("Claim on {donation_id} lost a race: {reason}");
                return Err(LifecycleError::Conflict(ALREADY_CLAIMED.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        info!("Claim {} placed on {donation_id} by {claimant}", claim.id);
        views.extend([
            ListView::OwnerDonations(donation.owner),
            ListView::ClaimantClaims(claimant),
            ListView::Browse,
        ]);
        self.refresh(&views).await;
        Ok(claim)
    }

    /// Move a claim to `to` if the claim table allows it, applying the
    /// matching donation transition in the same commit.
    ///
    /// Only the donation owner may approve. The owner or the claimant may
    /// complete or cancel.
    pub async fn update_claim_status(
        &self,
        who: &dyn Identity,
        claim_id: ClaimId,
        to: ClaimStatus,
    ) -> Result<Claim> {
        let user = who.require_user()?;
        let mut claim = self
            .store
            .get_claim(claim_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("claim {claim_id}")))?;
        claim.status.check_transition(to)?;

        let donation = self.store.get_donation(claim.donation_id).await?;
        let owner = donation.as_ref().map(|d| d.owner);
        let is_owner = owner == Some(user);
        match to {
            ClaimStatus::Approved if !is_owner => {
                return Err(LifecycleError::Authorization(Denied::NotOwner))
            }
            _ if !is_owner && claim.claimant != user => {
                return Err(LifecycleError::Authorization(Denied::NotParty))
            }
            _ => {}
        }

        let mut views = self.claimant_views(claim.donation_id).await;
        let mut writes = vec![Write::SetClaimStatus {
            id: claim_id,
            from: claim.status,
            to,
        }];
        if let (Some((from, to_donation)), Some(donation)) = (to.donation_effect(), &donation) {
            writes.push(Write::SetDonationStatus {
                id: donation.id,
                from,
                to: to_donation,
            });
        }
        writes.push(Write::AppendEvent(
            LifecycleEvent::new(EventKind::for_claim_status(to), claim.donation_id, user)
                .claim(claim_id)
                .status(claim.status, to),
        ));
        self.store.commit(writes).await?;

        info!("Claim {claim_id}: {} -> {to}", claim.status);
        claim.status = to;

        views.extend([ListView::ClaimantClaims(claim.claimant), ListView::Browse]);
        if let Some(owner) = owner {
            views.push(ListView::OwnerDonations(owner));
        }
        self.refresh(&views).await;
        Ok(claim)
    }

    // ─────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────

    pub async fn get_donation(&self, id: DonationId) -> Result<Donation> {
        self.donation(id).await
    }

    /// The global browse list, optionally narrowed by status and search.
    pub async fn browse(
        &self,
        status: Option<DonationStatus>,
        search: Option<&str>,
    ) -> Result<Vec<Donation>> {
        let rows = self
            .views
            .load(self.store.as_ref(), ListView::Browse)
            .await?
            .into_donations();
        let rows = match status {
            Some(status) => rows.into_iter().filter(|d| d.status == status).collect(),
            None => rows,
        };
        debug!("Browse: {} row(s)", rows.len());
        Ok(filter_search(rows, search))
    }

    /// The caller's own donations (narrowed by `search`) and claims.
    pub async fn dashboard(&self, who: &dyn Identity, search: Option<&str>) -> Result<Dashboard> {
        let user = who.require_user()?;
        let donations = self
            .views
            .load(self.store.as_ref(), ListView::OwnerDonations(user))
            .await?
            .into_donations();
        let claims = self
            .views
            .load(self.store.as_ref(), ListView::ClaimantClaims(user))
            .await?
            .into_claims();
        Ok(Dashboard {
            donations: filter_search(donations, search),
            claims,
        })
    }

    /// Lifecycle history of a donation, oldest first. Still available
    /// after the donation is deleted.
    pub async fn history(&self, id: DonationId) -> Result<Vec<EventRecord>> {
        let events = self
            .store
            .query_events(&EventQuery {
                donation_id: Some(id),
            })
            .await?;
        if events.is_empty() {
            self.donation(id).await?;
        }
        Ok(events)
    }

    // ─────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────

    async fn donation(&self, id: DonationId) -> Result<Donation> {
        self.store
            .get_donation(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("donation {id}")))
    }

    async fn owned_donation(&self, user: UserId, id: DonationId) -> Result<Donation> {
        let donation = self.donation(id).await?;
        if donation.owner != user {
            return Err(LifecycleError::Authorization(Denied::NotOwner));
        }
        Ok(donation)
    }

    /// Claimant views that embed donation `id`, past claimants included.
    async fn claimant_views(&self, id: DonationId) -> Vec<ListView> {
        let query = ClaimQuery {
            donation_id: Some(id),
            ..ClaimQuery::default()
        };
        match self.store.query_claims(&query).await {
            Ok(claims) => claims
                .into_iter()
                .map(|c| ListView::ClaimantClaims(c.claimant))
                .collect(),
            Err(e) => {
                warn!("Could not list claimants of {id}: {e}");
                Vec::new()
            }
        }
    }

    async fn refresh(&self, views: &[ListView]) {
        self.views.refresh(self.store.as_ref(), views).await;
    }
}
