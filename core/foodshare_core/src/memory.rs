//! In-process [`Store`], optionally mirrored to a JSON snapshot on disk.
//!
//! This is the "local mirror" backend: a single-user, per-machine table
//! set that behaves exactly like the SQLite store, including atomic
//! conditional commits. When opened with a path, the whole table set is
//! rewritten after every successful commit and reloaded on the next open.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::StoreError;
use crate::events::EventRecord;
use crate::store::{ClaimQuery, DonationQuery, EventQuery, Store, StoreResult, Write};
use crate::types::{Claim, ClaimId, Donation, DonationId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    /// Insertion order.
    donations: Vec<Donation>,
    /// Insertion order.
    claims: Vec<Claim>,
    events: Vec<EventRecord>,
    next_seq: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    /// A purely in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or start) a store persisted at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::Backend(format!("corrupt snapshot {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => {
                return Err(StoreError::Backend(format!(
                    "cannot read snapshot {}: {e}",
                    path.display()
                )))
            }
        };
        debug!(
            "Opened local store {} ({} donations, {} claims)",
            path.display(),
            tables.donations.len(),
            tables.claims.len()
        );
        Ok(Self {
            tables: RwLock::new(tables),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, tables: &Tables) -> StoreResult<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(tables)
            .map_err(|e| StoreError::Backend(format!("snapshot encode: {e}")))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| StoreError::Backend(format!("cannot write {}: {e}", path.display())))
    }
}

fn donation_mut(tables: &mut Tables, id: DonationId) -> StoreResult<&mut Donation> {
    tables
        .donations
        .iter_mut()
        .find(|d| d.id == id)
        .ok_or_else(|| StoreError::NotFound(format!("donation {id}")))
}

fn claim_mut(tables: &mut Tables, id: ClaimId) -> StoreResult<&mut Claim> {
    tables
        .claims
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| StoreError::NotFound(format!("claim {id}")))
}

fn apply(tables: &mut Tables, write: Write) -> StoreResult<()> {
    match write {
        Write::InsertDonation(donation) => {
            if tables.donations.iter().any(|d| d.id == donation.id) {
                return Err(StoreError::Constraint(format!(
                    "donation {} already exists",
                    donation.id
                )));
            }
            tables.donations.push(donation);
        }
        Write::UpdateDonation { id, owner, fields } => {
            let donation = donation_mut(tables, id)?;
            if donation.owner != owner {
                return Err(StoreError::Precondition(format!(
                    "donation {id} is not owned by {owner}"
                )));
            }
            donation.apply(&fields);
        }
        Write::DeleteDonation { id, owner, status } => {
            let donation = donation_mut(tables, id)?;
            if donation.owner != owner {
                return Err(StoreError::Precondition(format!(
                    "donation {id} is not owned by {owner}"
                )));
            }
            if donation.status != status {
                return Err(StoreError::Precondition(format!(
                    "donation {id} is {}, expected {status}",
                    donation.status
                )));
            }
            tables.donations.retain(|d| d.id != id);
        }
        Write::SetDonationStatus { id, from, to } => {
            let donation = donation_mut(tables, id)?;
            if donation.status != from {
                return Err(StoreError::Precondition(format!(
                    "donation {id} is {}, expected {from}",
                    donation.status
                )));
            }
            donation.status = to;
        }
        Write::InsertClaim(claim) => {
            if tables.claims.iter().any(|c| c.id == claim.id) {
                return Err(StoreError::Constraint(format!(
                    "claim {} already exists",
                    claim.id
                )));
            }
            tables.claims.push(claim);
        }
        Write::SetClaimStatus { id, from, to } => {
            let claim = claim_mut(tables, id)?;
            if claim.status != from {
                return Err(StoreError::Precondition(format!(
                    "claim {id} is {}, expected {from}",
                    claim.status
                )));
            }
            claim.status = to;
        }
        Write::AppendEvent(event) => {
            tables.next_seq += 1;
            tables.events.push(EventRecord {
                seq: tables.next_seq,
                event,
            });
        }
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_donation(&self, id: DonationId) -> StoreResult<Option<Donation>> {
        let tables = self.tables.read().await;
        Ok(tables.donations.iter().find(|d| d.id == id).cloned())
    }

    async fn get_claim(&self, id: ClaimId) -> StoreResult<Option<Claim>> {
        let tables = self.tables.read().await;
        Ok(tables.claims.iter().find(|c| c.id == id).cloned())
    }

    async fn query_donations(&self, query: &DonationQuery) -> StoreResult<Vec<Donation>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Donation> = tables
            .donations
            .iter()
            .rev()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn query_claims(&self, query: &ClaimQuery) -> StoreResult<Vec<Claim>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Claim> = tables
            .claims
            .iter()
            .rev()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.claimed_at.cmp(&a.claimed_at));
        Ok(rows)
    }

    async fn query_events(&self, query: &EventQuery) -> StoreResult<Vec<EventRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|r| {
                query
                    .donation_id
                    .map_or(true, |id| r.event.donation_id == id)
            })
            .cloned()
            .collect())
    }

    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        for write in writes {
            apply(&mut staged, write)?;
        }
        self.persist(&staged).await?;
        *tables = staged;
        Ok(())
    }
}
