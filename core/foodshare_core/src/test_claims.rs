use std::sync::Arc;

use crate::errors::{Denied, LifecycleError};
use crate::events::EventKind;
use crate::invariants;
use crate::memory::MemoryStore;
use crate::store::{ClaimQuery, Store};
use crate::types::{ClaimId, ClaimStatus, DonationDraft, DonationId, DonationStatus, UserId};
use crate::{LifecycleManager, Session};

struct World {
    store: Arc<MemoryStore>,
    manager: LifecycleManager,
    alice: Session,
    bob: Session,
    carol: Session,
}

fn setup() -> World {
    let store = Arc::new(MemoryStore::new());
    World {
        manager: LifecycleManager::new(store.clone()),
        store,
        alice: Session::user(UserId::new()),
        bob: Session::user(UserId::new()),
        carol: Session::user(UserId::new()),
    }
}

fn bread() -> DonationDraft {
    DonationDraft::new("Bread", "Fresh loaves", "Main St", 5.0)
}

async fn donation_status(w: &World, id: DonationId) -> DonationStatus {
    w.store.get_donation(id).await.unwrap().unwrap().status
}

async fn claim_status(w: &World, id: ClaimId) -> ClaimStatus {
    w.store.get_claim(id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_bread_scenario() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    assert_eq!(d.status, DonationStatus::Available);

    let claim = w.manager.claim(&w.bob, d.id).await.unwrap();
    assert_eq!(claim.status, ClaimStatus::Pending);
    assert_eq!(claim.donation_id, d.id);
    assert_eq!(donation_status(&w, d.id).await, DonationStatus::Claimed);
    invariants::assert_all(w.store.as_ref()).await;

    let err = w.manager.claim(&w.alice, d.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)));
    assert_eq!(err.to_string(), "this donation has already been claimed");
    assert_eq!(donation_status(&w, d.id).await, DonationStatus::Claimed);
    invariants::assert_all(w.store.as_ref()).await;
}

#[tokio::test]
async fn test_second_claim_leaves_everything_unchanged() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    let first = w.manager.claim(&w.bob, d.id).await.unwrap();
    let donation_before = w.store.get_donation(d.id).await.unwrap();

    let err = w.manager.claim(&w.carol, d.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)));

    assert_eq!(w.store.get_donation(d.id).await.unwrap(), donation_before);
    let claims = w
        .store
        .query_claims(&ClaimQuery::default())
        .await
        .unwrap();
    assert_eq!(claims, vec![first]);
}

#[tokio::test]
async fn test_owner_cannot_claim_own_available_donation() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    let err = w.manager.claim(&w.alice, d.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Authorization(Denied::SelfClaim)));
    assert_eq!(donation_status(&w, d.id).await, DonationStatus::Available);
}

#[tokio::test]
async fn test_claim_requires_login_and_existing_donation() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    assert!(matches!(
        w.manager.claim(&Session::anonymous(), d.id).await,
        Err(LifecycleError::Authorization(Denied::Unauthenticated))
    ));
    assert!(matches!(
        w.manager.claim(&w.bob, DonationId::new()).await,
        Err(LifecycleError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_full_lifecycle_to_completion() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    let claim = w.manager.claim(&w.bob, d.id).await.unwrap();

    let approved = w
        .manager
        .update_claim_status(&w.alice, claim.id, ClaimStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.status, ClaimStatus::Approved);
    assert_eq!(donation_status(&w, d.id).await, DonationStatus::Claimed);
    invariants::assert_all(w.store.as_ref()).await;

    let done = w.manager.mark_completed(&w.alice, d.id).await.unwrap();
    assert_eq!(done.id, claim.id);
    assert_eq!(done.status, ClaimStatus::Completed);
    assert_eq!(donation_status(&w, d.id).await, DonationStatus::Completed);
    invariants::assert_all(w.store.as_ref()).await;

    let bobs = w.manager.dashboard(&w.bob, None).await.unwrap().claims;
    assert_eq!(bobs[0].claim.status, ClaimStatus::Completed);
    assert_eq!(
        bobs[0].donation.as_ref().map(|d| d.status),
        Some(DonationStatus::Completed)
    );

    let history = w.manager.history(d.id).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|r| r.event.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::DonationCreated,
            EventKind::DonationClaimed,
            EventKind::ClaimApproved,
            EventKind::ClaimCompleted,
        ]
    );
    assert!(history.windows(2).all(|w| w[0].seq < w[1].seq));
}

#[tokio::test]
async fn test_pending_cannot_jump_to_completed() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    let claim = w.manager.claim(&w.bob, d.id).await.unwrap();

    let err = w
        .manager
        .update_claim_status(&w.alice, claim.id, ClaimStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition { entity: "claim", .. }
    ));
    assert_eq!(claim_status(&w, claim.id).await, ClaimStatus::Pending);

    let err = w.manager.mark_completed(&w.alice, d.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    assert_eq!(donation_status(&w, d.id).await, DonationStatus::Claimed);
}

#[tokio::test]
async fn test_illegal_claim_targets_never_change_status() {
    for from in [ClaimStatus::Pending, ClaimStatus::Approved, ClaimStatus::Completed, ClaimStatus::Cancelled] {
        for to in ClaimStatus::ALL {
            if from.can_transition_to(to) {
                continue;
            }
            let w = setup();
            let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
            let claim = w.manager.claim(&w.bob, d.id).await.unwrap();
            let path: &[ClaimStatus] = match from {
                ClaimStatus::Pending => &[],
                ClaimStatus::Approved => &[ClaimStatus::Approved],
                ClaimStatus::Completed => &[ClaimStatus::Approved, ClaimStatus::Completed],
                ClaimStatus::Cancelled => &[ClaimStatus::Cancelled],
            };
            for step in path {
                w.manager
                    .update_claim_status(&w.alice, claim.id, *step)
                    .await
                    .unwrap();
            }

            let err = w
                .manager
                .update_claim_status(&w.alice, claim.id, to)
                .await
                .unwrap_err();
            assert!(
                matches!(err, LifecycleError::InvalidTransition { .. }),
                "{from} -> {to} gave {err}"
            );
            assert_eq!(claim_status(&w, claim.id).await, from);
        }
    }
}

#[tokio::test]
async fn test_claimant_cancel_releases_donation() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    let claim = w.manager.claim(&w.bob, d.id).await.unwrap();

    w.manager
        .update_claim_status(&w.bob, claim.id, ClaimStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(donation_status(&w, d.id).await, DonationStatus::Available);
    invariants::assert_all(w.store.as_ref()).await;

    let second = w.manager.claim(&w.carol, d.id).await.unwrap();
    assert_eq!(second.status, ClaimStatus::Pending);
    invariants::assert_all(w.store.as_ref()).await;
}

#[tokio::test]
async fn test_only_owner_approves_and_strangers_cannot_touch_claims() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    let claim = w.manager.claim(&w.bob, d.id).await.unwrap();

    assert!(matches!(
        w.manager
            .update_claim_status(&w.bob, claim.id, ClaimStatus::Approved)
            .await,
        Err(LifecycleError::Authorization(Denied::NotOwner))
    ));
    assert!(matches!(
        w.manager
            .update_claim_status(&w.carol, claim.id, ClaimStatus::Cancelled)
            .await,
        Err(LifecycleError::Authorization(Denied::NotParty))
    ));
    assert!(matches!(
        w.manager
            .update_claim_status(&w.alice, ClaimId::new(), ClaimStatus::Approved)
            .await,
        Err(LifecycleError::NotFound(_))
    ));
    assert_eq!(claim_status(&w, claim.id).await, ClaimStatus::Pending);
}

#[tokio::test]
async fn test_mark_completed_on_available_donation_is_invalid() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    let err = w.manager.mark_completed(&w.alice, d.id).await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition { entity: "donation", .. }
    ));
}

#[tokio::test]
async fn test_concurrent_claims_have_exactly_one_winner() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();

    let (a, b) = tokio::join!(w.manager.claim(&w.bob, d.id), w.manager.claim(&w.carol, d.id));
    let outcomes = [a, b];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(outcomes
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, LifecycleError::Conflict(_))));
    invariants::assert_all(w.store.as_ref()).await;
}

async fn dashboard_status(w: &World, who: &Session, id: DonationId) -> Option<DonationStatus> {
    w.manager
        .dashboard(who, None)
        .await
        .unwrap()
        .claims
        .into_iter()
        .find(|row| row.claim.donation_id == id)
        .and_then(|row| row.donation)
        .map(|d| d.status)
}

#[tokio::test]
async fn test_past_claimant_dashboard_follows_donation() {
    let w = setup();
    let d = w.manager.create_donation(&w.alice, &bread()).await.unwrap();
    let first = w.manager.claim(&w.bob, d.id).await.unwrap();
    w.manager
        .update_claim_status(&w.bob, first.id, ClaimStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(
        dashboard_status(&w, &w.bob, d.id).await,
        Some(DonationStatus::Available)
    );

    let second = w.manager.claim(&w.carol, d.id).await.unwrap();
    assert_eq!(
        dashboard_status(&w, &w.bob, d.id).await,
        Some(DonationStatus::Claimed)
    );

    w.manager
        .update_claim_status(&w.alice, second.id, ClaimStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(
        dashboard_status(&w, &w.bob, d.id).await,
        Some(DonationStatus::Available)
    );

    w.manager.claim(&w.carol, d.id).await.unwrap();
    w.manager.cancel_donation(&w.alice, d.id).await.unwrap();
    assert_eq!(
        dashboard_status(&w, &w.bob, d.id).await,
        Some(DonationStatus::Cancelled)
    );
    assert_eq!(
        dashboard_status(&w, &w.carol, d.id).await,
        Some(DonationStatus::Cancelled)
    );
}
