//! Database layer: connection pool, migrations and the SQLite [`Store`].

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foodshare_core::{
    Claim, ClaimId, ClaimQuery, Donation, DonationId, DonationQuery, EventKind, EventQuery,
    EventRecord, LifecycleEvent, Store, StoreError, StoreResult, Write,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqliteConnection, SqlitePool,
};
use tracing::{debug, info};

use crate::errors::Result;

/// Establish a SQLite connection pool and run pending migrations.
///
/// In-memory databases are private to a connection, so they get a single
/// connection that is never recycled.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    }
    .connect_with(options)
    .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Row shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct DonationRow {
    id: String,
    owner: String,
    food_type: String,
    description: String,
    location: String,
    amount: f64,
    status: String,
    created_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ClaimRow {
    id: String,
    donation_id: String,
    claimant: String,
    status: String,
    claimed_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    seq: i64,
    kind: String,
    donation_id: String,
    claim_id: Option<String>,
    actor: String,
    from_status: Option<String>,
    to_status: Option<String>,
    at: i64,
}

fn corrupt(what: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt row: {what}"))
}

fn parse<T: FromStr>(column: &str, raw: &str) -> StoreResult<T> {
    raw.parse()
        .map_err(|_| corrupt(format!("{column} = {raw:?}")))
}

fn timestamp(column: &str, millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| corrupt(format!("{column} = {millis}")))
}

impl TryFrom<DonationRow> for Donation {
    type Error = StoreError;

    fn try_from(row: DonationRow) -> StoreResult<Self> {
        Ok(Donation {
            id: parse("id", &row.id)?,
            owner: parse("owner", &row.owner)?,
            food_type: row.food_type,
            description: row.description,
            location: row.location,
            amount: row.amount,
            status: parse("status", &row.status)?,
            created_at: timestamp("created_at", row.created_at)?,
        })
    }
}

impl TryFrom<ClaimRow> for Claim {
    type Error = StoreError;

    fn try_from(row: ClaimRow) -> StoreResult<Self> {
        Ok(Claim {
            id: parse("id", &row.id)?,
            donation_id: parse("donation_id", &row.donation_id)?,
            claimant: parse("claimant", &row.claimant)?,
            status: parse("status", &row.status)?,
            claimed_at: timestamp("claimed_at", row.claimed_at)?,
        })
    }
}

impl TryFrom<EventRow> for EventRecord {
    type Error = StoreError;

    fn try_from(row: EventRow) -> StoreResult<Self> {
        Ok(EventRecord {
            seq: row.seq,
            event: LifecycleEvent {
                kind: EventKind::parse(&row.kind)
                    .ok_or_else(|| corrupt(format!("kind = {:?}", row.kind)))?,
                donation_id: parse("donation_id", &row.donation_id)?,
                claim_id: row
                    .claim_id
                    .as_deref()
                    .map(|raw| parse("claim_id", raw))
                    .transpose()?,
                actor: parse("actor", &row.actor)?,
                from_status: row.from_status,
                to_status: row.to_status,
                at: timestamp("at", row.at)?,
            },
        })
    }
}

fn rows_into<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Classify a driver error for the lifecycle layer.
fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_check_violation() => {
            StoreError::Constraint(db.message().to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

const DONATION_COLUMNS: &str =
    "id, owner, food_type, description, location, amount, status, created_at";
const CLAIM_COLUMNS: &str = "id, donation_id, claimant, status, claimed_at";

// ─────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

/// Turn a zero-row conditional write into `NotFound` or `Precondition`.
async fn explain_miss(
    conn: &mut SqliteConnection,
    table: &'static str,
    id: String,
    precondition: String,
) -> StoreError {
    let found: std::result::Result<i64, _> =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE id = ?1"))
            .bind(&id)
            .fetch_one(conn)
            .await;
    match found {
        Ok(0) => StoreError::NotFound(format!("{} {id}", table.trim_end_matches('s'))),
        Ok(_) => StoreError::Precondition(precondition),
        Err(e) => store_error(e),
    }
}

async fn apply(conn: &mut SqliteConnection, write: Write) -> StoreResult<()> {
    match write {
        Write::InsertDonation(d) => {
            sqlx::query(
                r#"
                INSERT INTO donations
                    (id, owner, food_type, description, location, amount, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(d.id.to_string())
            .bind(d.owner.to_string())
            .bind(&d.food_type)
            .bind(&d.description)
            .bind(&d.location)
            .bind(d.amount)
            .bind(d.status.as_str())
            .bind(d.created_at.timestamp_millis())
            .execute(&mut *conn)
            .await
            .map_err(store_error)?;
        }
        Write::UpdateDonation { id, owner, fields } => {
            let affected = sqlx::query(
                r#"
                UPDATE donations
                SET    food_type = ?3, description = ?4, location = ?5, amount = ?6
                WHERE  id = ?1 AND owner = ?2
                "#,
            )
            .bind(id.to_string())
            .bind(owner.to_string())
            .bind(&fields.food_type)
            .bind(&fields.description)
            .bind(&fields.location)
            .bind(fields.amount)
            .execute(&mut *conn)
            .await
            .map_err(store_error)?
            .rows_affected();
            if affected == 0 {
                let why = format!("donation {id} is not owned by {owner}");
                return Err(explain_miss(conn, "donations", id.to_string(), why).await);
            }
        }
        Write::DeleteDonation { id, owner, status } => {
            let affected = sqlx::query(
                "DELETE FROM donations WHERE id = ?1 AND owner = ?2 AND status = ?3",
            )
            .bind(id.to_string())
            .bind(owner.to_string())
            .bind(status.as_str())
            .execute(&mut *conn)
            .await
            .map_err(store_error)?
            .rows_affected();
            if affected == 0 {
                let why = format!("donation {id} is not owned by {owner} with status {status}");
                return Err(explain_miss(conn, "donations", id.to_string(), why).await);
            }
        }
        Write::SetDonationStatus { id, from, to } => {
            let affected =
                sqlx::query("UPDATE donations SET status = ?3 WHERE id = ?1 AND status = ?2")
                    .bind(id.to_string())
                    .bind(from.as_str())
                    .bind(to.as_str())
                    .execute(&mut *conn)
                    .await
                    .map_err(store_error)?
                    .rows_affected();
            if affected == 0 {
                let why = format!("donation {id} is no longer {from}");
                return Err(explain_miss(conn, "donations", id.to_string(), why).await);
            }
        }
        Write::InsertClaim(c) => {
            sqlx::query(
                r#"
                INSERT INTO claims (id, donation_id, claimant, status, claimed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(c.id.to_string())
            .bind(c.donation_id.to_string())
            .bind(c.claimant.to_string())
            .bind(c.status.as_str())
            .bind(c.claimed_at.timestamp_millis())
            .execute(&mut *conn)
            .await
            .map_err(store_error)?;
        }
        Write::SetClaimStatus { id, from, to } => {
            let affected =
                sqlx::query("UPDATE claims SET status = ?3 WHERE id = ?1 AND status = ?2")
                    .bind(id.to_string())
                    .bind(from.as_str())
                    .bind(to.as_str())
                    .execute(&mut *conn)
                    .await
                    .map_err(store_error)?
                    .rows_affected();
            if affected == 0 {
                let why = format!("claim {id} is no longer {from}");
                return Err(explain_miss(conn, "claims", id.to_string(), why).await);
            }
        }
        Write::AppendEvent(ev) => {
            sqlx::query(
                r#"
                INSERT INTO events
                    (kind, donation_id, claim_id, actor, from_status, to_status, at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(ev.kind.as_str())
            .bind(ev.donation_id.to_string())
            .bind(ev.claim_id.map(|id| id.to_string()))
            .bind(ev.actor.to_string())
            .bind(ev.from_status)
            .bind(ev.to_status)
            .bind(ev.at.timestamp_millis())
            .execute(&mut *conn)
            .await
            .map_err(store_error)?;
        }
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_donation(&self, id: DonationId) -> StoreResult<Option<Donation>> {
        let row = sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {DONATION_COLUMNS} FROM donations WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.map(Donation::try_from).transpose()
    }

    async fn get_claim(&self, id: ClaimId) -> StoreResult<Option<Claim>> {
        let row = sqlx::query_as::<_, ClaimRow>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.map(Claim::try_from).transpose()
    }

    async fn query_donations(&self, query: &DonationQuery) -> StoreResult<Vec<Donation>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {DONATION_COLUMNS} FROM donations WHERE 1 = 1"
        ));
        if let Some(owner) = query.owner {
            qb.push(" AND owner = ").push_bind(owner.to_string());
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(ids) = &query.ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            qb.push(" AND id IN (");
            let mut list = qb.separated(", ");
            for id in ids {
                list.push_bind(id.to_string());
            }
            list.push_unseparated(")");
        }
        qb.push(" ORDER BY created_at DESC, seq DESC");

        let rows = qb
            .build_query_as::<DonationRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        debug!("query_donations {query:?} -> {} row(s)", rows.len());
        rows_into(rows)
    }

    async fn query_claims(&self, query: &ClaimQuery) -> StoreResult<Vec<Claim>> {
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE 1 = 1"));
        if let Some(claimant) = query.claimant {
            qb.push(" AND claimant = ").push_bind(claimant.to_string());
        }
        if let Some(donation_id) = query.donation_id {
            qb.push(" AND donation_id = ").push_bind(donation_id.to_string());
        }
        if query.active_only {
            qb.push(" AND status IN ('pending', 'approved')");
        }
        qb.push(" ORDER BY claimed_at DESC, seq DESC");

        let rows = qb
            .build_query_as::<ClaimRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows_into(rows)
    }

    async fn query_events(&self, query: &EventQuery) -> StoreResult<Vec<EventRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT seq, kind, donation_id, claim_id, actor, from_status, to_status, at
            FROM   events
            WHERE  1 = 1
            "#,
        );
        if let Some(donation_id) = query.donation_id {
            qb.push(" AND donation_id = ").push_bind(donation_id.to_string());
        }
        qb.push(" ORDER BY seq ASC");

        let rows = qb
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows_into(rows)
    }

    /// Runs the whole batch in one transaction; the first failing write
    /// rolls everything back.
    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for write in writes {
            apply(&mut *tx, write).await?;
        }
        tx.commit().await.map_err(store_error)
    }
}
