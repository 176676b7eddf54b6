use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs_core::error::{AppError, Result};
use fs_core::{Claim, ClaimDecision, ClaimRepo, ClaimStatus, Decision, DecisionOutcome};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{claim_from_row, db_error, listing_from_row, to_millis, truncate, uuid_to_blob, SqliteStore};

#[async_trait]
impl ClaimRepo for SqliteStore {
    /// Inserts only while the listing is Available, in the same statement,
    /// so a claim cannot land on a listing that an approval just took. The
    /// UNIQUE (listing_id, receiver_id) constraint arbitrates concurrent
    /// duplicates.
    async fn create_claim(&self, mut claim: Claim) -> Result<Claim> {
        claim.claimed_at = truncate(claim.claimed_at);
        claim.updated_at = truncate(claim.updated_at);
        let listing_id = uuid_to_blob(claim.listing_id);

        let inserted = sqlx::query("INSERT INTO claims (id, listing_id, receiver_id, status, claimed_at, updated_at) SELECT ?, ?, ?, ?, ?, ? WHERE EXISTS (SELECT 1 FROM listings WHERE id = ? AND status = 'Available')")
            .bind(uuid_to_blob(claim.id))
            .bind(&listing_id)
            .bind(uuid_to_blob(claim.receiver_id))
            .bind(claim.status.as_str())
            .bind(to_millis(claim.claimed_at))
            .bind(to_millis(claim.updated_at))
            .bind(&listing_id)
            .execute(&self.pool)
            .await;

        match inserted {
            Ok(done) if done.rows_affected() == 1 => Ok(claim),
            Ok(_) => {
                let status: Option<String> = sqlx::query_scalar("SELECT status FROM listings WHERE id = ?")
                    .bind(&listing_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error)?;
                Err(match status {
                    None => AppError::not_found("Listing", claim.listing_id),
                    Some(status) => AppError::InvalidState(format!(
                        "listing {} is {status}, not Available",
                        claim.listing_id
                    )),
                })
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
                format!("claim already submitted for listing {}", claim.listing_id),
            )),
            Err(e) => Err(db_error(e)),
        }
    }

    async fn find_existing(&self, listing_id: Uuid, receiver_id: Uuid) -> Result<Option<Claim>> {
        let row = sqlx::query("SELECT * FROM claims WHERE listing_id = ? AND receiver_id = ?")
            .bind(uuid_to_blob(listing_id))
            .bind(uuid_to_blob(receiver_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(claim_from_row).transpose()
    }

    async fn find_claim(&self, id: Uuid) -> Result<Option<Claim>> {
        let row = sqlx::query("SELECT * FROM claims WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(claim_from_row).transpose()
    }

    async fn find_by_receiver(&self, receiver_id: Uuid) -> Result<Vec<Claim>> {
        let rows = sqlx::query("SELECT * FROM claims WHERE receiver_id = ? ORDER BY claimed_at DESC, id DESC")
            .bind(uuid_to_blob(receiver_id))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(claim_from_row).collect()
    }

    async fn find_by_listing_ids(&self, listing_ids: &[Uuid]) -> Result<Vec<Claim>> {
        if listing_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM claims WHERE listing_id IN (");
        let mut ids = qb.separated(", ");
        for id in listing_ids {
            ids.push_bind(uuid_to_blob(*id));
        }
        ids.push_unseparated(")");
        qb.push(" ORDER BY claimed_at DESC, id DESC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_error)?;
        rows.iter().map(claim_from_row).collect()
    }

    async fn set_status(&self, id: Uuid, status: ClaimStatus, now: DateTime<Utc>) -> Result<Claim> {
        let updated = sqlx::query("UPDATE claims SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(to_millis(now))
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await
            .map_err(db_error)?
            .rows_affected();
        if updated == 0 {
            return Err(AppError::not_found("Claim", id));
        }

        self.find_claim(id)
            .await?
            .ok_or_else(|| AppError::not_found("Claim", id))
    }

    /// All writes share one transaction, rolled back on any failure.
    async fn commit_decision(&self, decision: ClaimDecision) -> Result<DecisionOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        match apply_decision(&mut tx, &decision).await {
            Ok(outcome) => {
                tx.commit().await.map_err(db_error)?;
                debug!(
                    claim_id = %decision.claim_id,
                    listing_status = %outcome.listing.status,
                    auto_rejected = outcome.auto_rejected.len(),
                    "decision committed"
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback of failed decision failed");
                }
                Err(e)
            }
        }
    }
}

async fn apply_decision(
    tx: &mut Transaction<'_, Sqlite>,
    decision: &ClaimDecision,
) -> Result<DecisionOutcome> {
    let now = to_millis(decision.decided_at);
    let claim_id = uuid_to_blob(decision.claim_id);
    let listing_id = uuid_to_blob(decision.listing_id);
    let status: ClaimStatus = decision.decision.into();

    // 1. Pending -> decision, only if still Pending
    let decided = sqlx::query("UPDATE claims SET status = ?, updated_at = ? WHERE id = ? AND listing_id = ? AND status = 'Pending'")
        .bind(status.as_str())
        .bind(now)
        .bind(&claim_id)
        .bind(&listing_id)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?
        .rows_affected();
    if decided == 0 {
        let current: Option<String> = sqlx::query_scalar("SELECT status FROM claims WHERE id = ? AND listing_id = ?")
            .bind(&claim_id)
            .bind(&listing_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error)?;
        return Err(match current {
            None => AppError::not_found("Claim", decision.claim_id),
            Some(current) => AppError::InvalidState(format!(
                "claim {} was already {current}",
                decision.claim_id
            )),
        });
    }

    let mut auto_rejected = Vec::new();
    if decision.decision == Decision::Approved {
        // 2. Available -> Claimed, only if still Available
        let claimed = sqlx::query("UPDATE listings SET status = 'Claimed', updated_at = ? WHERE id = ? AND status = 'Available'")
            .bind(now)
            .bind(&listing_id)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        if claimed == 0 {
            let current: Option<String> = sqlx::query_scalar("SELECT status FROM listings WHERE id = ?")
                .bind(&listing_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_error)?;
            return Err(match current {
                None => AppError::not_found("Listing", decision.listing_id),
                Some(current) => AppError::InvalidState(format!(
                    "listing {} is {current}, not Available",
                    decision.listing_id
                )),
            });
        }

        // 3. Every other Pending claim on the listing loses
        let rows = sqlx::query("UPDATE claims SET status = 'Rejected', updated_at = ? WHERE listing_id = ? AND id <> ? AND status = 'Pending' RETURNING *")
            .bind(now)
            .bind(&listing_id)
            .bind(&claim_id)
            .fetch_all(&mut **tx)
            .await
            .map_err(db_error)?;
        auto_rejected = rows.iter().map(claim_from_row).collect::<Result<Vec<_>>>()?;
        auto_rejected.sort_by_key(|c| (c.claimed_at, c.id));
    }

    let claim_row = sqlx::query("SELECT * FROM claims WHERE id = ?")
        .bind(&claim_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error)?;
    let listing_row = sqlx::query("SELECT * FROM listings WHERE id = ?")
        .bind(&listing_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error)?;

    Ok(DecisionOutcome {
        claim: claim_from_row(&claim_row)?,
        listing: listing_from_row(&listing_row)?,
        auto_rejected,
    })
}
