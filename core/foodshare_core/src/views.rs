//! Cached list views and their refresh.
//!
//! Each view is the result of one full fetch of its collection. After a
//! mutation the manager names the views it touched; those that are cached
//! are dropped and fetched again from scratch, nothing is patched
//! incrementally.
//!
//! Every refresh bumps a generation counter before it fetches. A fetch only
//! lands in the cache if no refresh started after it, so a slow fetch can
//! never overwrite rows read after a newer commit. Entries idle for longer
//! than [`ViewLimits::idle_ttl`] are dropped, and the least recently used
//! entries go once the cache holds more than [`ViewLimits::max_entries`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::StoreError;
use crate::store::{ClaimQuery, DonationQuery, Store, StoreResult};
use crate::types::{ClaimWithDonation, Donation, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListView {
    /// Donations listed by one owner.
    OwnerDonations(UserId),
    /// Claims placed by one claimant, joined with their donations.
    ClaimantClaims(UserId),
    /// Every donation, newest first.
    Browse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewRows {
    Donations(Vec<Donation>),
    Claims(Vec<ClaimWithDonation>),
}

impl ViewRows {
    pub fn into_donations(self) -> Vec<Donation> {
        match self {
            ViewRows::Donations(rows) => rows,
            ViewRows::Claims(_) => Vec::new(),
        }
    }

    pub fn into_claims(self) -> Vec<ClaimWithDonation> {
        match self {
            ViewRows::Claims(rows) => rows,
            ViewRows::Donations(_) => Vec::new(),
        }
    }
}

/// Bounds on the view cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewLimits {
    pub max_entries: usize,
    pub idle_ttl: Duration,
}

impl Default for ViewLimits {
    fn default() -> Self {
        Self {
            max_entries: 256,
            idle_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct CachedView {
    rows: ViewRows,
    last_access: Instant,
}

#[derive(Debug, Default)]
struct Cache {
    entries: HashMap<ListView, CachedView>,
    generation: u64,
}

impl Cache {
    /// Store `rows` unless a refresh started after `generation` was read.
    fn insert_if_current(
        &mut self,
        generation: u64,
        view: ListView,
        rows: ViewRows,
        limits: &ViewLimits,
    ) -> bool {
        if self.generation != generation {
            return false;
        }
        self.entries.insert(
            view,
            CachedView {
                rows,
                last_access: Instant::now(),
            },
        );
        self.prune(limits);
        true
    }

    fn prune(&mut self, limits: &ViewLimits) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_access) <= limits.idle_ttl);
        if self.entries.len() <= limits.max_entries {
            return;
        }
        let mut by_age: Vec<(ListView, Instant)> = self
            .entries
            .iter()
            .map(|(view, entry)| (*view, entry.last_access))
            .collect();
        by_age.sort_by_key(|(_, last_access)| *last_access);
        let excess = self.entries.len() - limits.max_entries;
        for (view, _) in by_age.into_iter().take(excess) {
            self.entries.remove(&view);
        }
    }
}

#[derive(Debug, Default)]
pub struct ListViews {
    cache: Mutex<Cache>,
    limits: ViewLimits,
}

impl ListViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ViewLimits) -> Self {
        Self {
            cache: Mutex::default(),
            limits,
        }
    }

    /// Serve `view` from cache, fetching it on a miss.
    pub async fn load(&self, store: &dyn Store, view: ListView) -> StoreResult<ViewRows> {
        let generation = {
            let mut cache = self.cache.lock().await;
            let fresh = cache
                .entries
                .get(&view)
                .map(|entry| entry.last_access.elapsed() <= self.limits.idle_ttl);
            match fresh {
                Some(true) => {
                    if let Some(entry) = cache.entries.get_mut(&view) {
                        entry.last_access = Instant::now();
                        return Ok(entry.rows.clone());
                    }
                }
                Some(false) => {
                    cache.entries.remove(&view);
                }
                None => {}
            }
            cache.generation
        };

        let rows = fetch(store, view).await?;
        let mut cache = self.cache.lock().await;
        if !cache.insert_if_current(generation, view, rows.clone(), &self.limits) {
            debug!("Not caching {view:?}: a refresh overtook the fetch");
        }
        Ok(rows)
    }

    /// Re-fetch every cached view in `views`. Views nobody has loaded stay
    /// uncached, and a view that fails to load stays evicted so the next
    /// [`ListViews::load`] retries it.
    pub async fn refresh(&self, store: &dyn Store, views: &[ListView]) {
        let (generation, stale) = {
            let mut cache = self.cache.lock().await;
            cache.generation += 1;
            let stale: Vec<ListView> = views
                .iter()
                .filter(|view| cache.entries.remove(*view).is_some())
                .copied()
                .collect();
            (cache.generation, stale)
        };

        for view in stale {
            match fetch(store, view).await {
                Ok(rows) => {
                    let mut cache = self.cache.lock().await;
                    if cache.insert_if_current(generation, view, rows, &self.limits) {
                        debug!("Refreshed {view:?}");
                    } else {
                        debug!("Dropped refresh of {view:?}: overtaken by a newer one");
                    }
                }
                Err(e) => warn!("Refresh of {view:?} failed, evicting: {e}"),
            }
        }
    }

    pub async fn cached(&self, view: ListView) -> Option<ViewRows> {
        let cache = self.cache.lock().await;
        cache.entries.get(&view).map(|entry| entry.rows.clone())
    }

    /// Number of views currently held.
    pub async fn cached_count(&self) -> usize {
        self.cache.lock().await.entries.len()
    }
}

async fn fetch(store: &dyn Store, view: ListView) -> Result<ViewRows, StoreError> {
    match view {
        ListView::OwnerDonations(owner) => store
            .query_donations(&DonationQuery::owned_by(owner))
            .await
            .map(ViewRows::Donations),
        ListView::Browse => store
            .query_donations(&DonationQuery::all())
            .await
            .map(ViewRows::Donations),
        ListView::ClaimantClaims(claimant) => {
            let claims = store.query_claims(&ClaimQuery::by_claimant(claimant)).await?;
            let ids = claims.iter().map(|c| c.donation_id).collect();
            let donations = store.query_donations(&DonationQuery::ids(ids)).await?;
            Ok(ViewRows::Claims(
                claims
                    .into_iter()
                    .map(|claim| ClaimWithDonation {
                        donation: donations.iter().find(|d| d.id == claim.donation_id).cloned(),
                        claim,
                    })
                    .collect(),
            ))
        }
    }
}

/// Keep only donations matching `search` (food type or location).
pub fn filter_search(rows: Vec<Donation>, search: Option<&str>) -> Vec<Donation> {
    match search {
        Some(q) => rows.into_iter().filter(|d| d.matches_search(q)).collect(),
        None => rows,
    }
}
