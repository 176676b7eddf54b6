use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs_core::error::{AppError, Result};
use fs_core::{Listing, ListingRepo, ListingStatus, NearbyQuery};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;
use uuid::Uuid;

use crate::{db_error, listing_from_row, to_millis, truncate, uuid_to_blob, SqliteStore};

#[async_trait]
impl ListingRepo for SqliteStore {
    async fn create_listing(&self, mut listing: Listing) -> Result<Listing> {
        listing.expires_at = truncate(listing.expires_at);
        listing.created_at = truncate(listing.created_at);
        listing.updated_at = truncate(listing.updated_at);

        sqlx::query(
            "INSERT INTO listings (id, owner, name, description, quantity, image_ref, expires_at, longitude, latitude, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(listing.id))
        .bind(uuid_to_blob(listing.owner))
        .bind(&listing.name)
        .bind(&listing.description)
        .bind(&listing.quantity)
        .bind(&listing.image_ref)
        .bind(to_millis(listing.expires_at))
        .bind(listing.location.longitude)
        .bind(listing.location.latitude)
        .bind(listing.status.as_str())
        .bind(to_millis(listing.created_at))
        .bind(to_millis(listing.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(listing)
    }

    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        let row = sqlx::query("SELECT * FROM listings WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(listing_from_row).transpose()
    }

    /// Bounding-box prefilter on the location index, then the exact
    /// spherical distance check in Rust.
    async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<Listing>> {
        // One meter of slack keeps float rounding from clipping the prefilter
        let bbox = query.center.bounding_box(query.max_distance_m + 1.0);

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM listings WHERE latitude BETWEEN ");
        qb.push_bind(bbox.min_lat)
            .push(" AND ")
            .push_bind(bbox.max_lat);
        if let Some((min_lon, max_lon)) = bbox.longitude {
            qb.push(" AND longitude BETWEEN ")
                .push_bind(min_lon)
                .push(" AND ")
                .push_bind(max_lon);
        }
        qb.push(" AND status IN (");
        let mut statuses = qb.separated(", ");
        for status in query.effective_statuses() {
            statuses.push_bind(status.as_str());
        }
        statuses.push_unseparated(")");
        qb.push(" ORDER BY expires_at ASC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_error)?;
        let scanned = rows.len();

        let mut found = Vec::with_capacity(scanned);
        for row in &rows {
            let listing = listing_from_row(row)?;
            if query.center.distance_m(&listing.location) <= query.max_distance_m {
                found.push(listing);
            }
        }
        debug!(scanned, matched = found.len(), "nearby query");
        Ok(found)
    }

    async fn find_by_owner(&self, owner: Uuid) -> Result<Vec<Listing>> {
        let rows = sqlx::query("SELECT * FROM listings WHERE owner = ? ORDER BY created_at DESC, id DESC")
            .bind(uuid_to_blob(owner))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(listing_from_row).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        owner: Uuid,
        status: ListingStatus,
        now: DateTime<Utc>,
    ) -> Result<Listing> {
        let updated = sqlx::query("UPDATE listings SET status = ?, updated_at = ? WHERE id = ? AND owner = ?")
            .bind(status.as_str())
            .bind(to_millis(now))
            .bind(uuid_to_blob(id))
            .bind(uuid_to_blob(owner))
            .execute(&self.pool)
            .await
            .map_err(db_error)?
            .rows_affected();

        if updated == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM listings WHERE id = ?")
                .bind(uuid_to_blob(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
            return Err(match exists {
                None => AppError::not_found("Listing", id),
                Some(_) => {
                    AppError::Forbidden("only the owning donor can change this listing".into())
                }
            });
        }

        self.find_listing(id)
            .await?
            .ok_or_else(|| AppError::not_found("Listing", id))
    }

    async fn bulk_expire(&self, now: DateTime<Utc>) -> Result<u64> {
        let now = to_millis(now);
        let expired = sqlx::query("UPDATE listings SET status = 'Expired', updated_at = ? WHERE expires_at < ? AND status <> 'Expired'")
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error)?
            .rows_affected();
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{listing_at, store};
    use chrono::Duration;
    use fs_core::GeoPoint;

    #[tokio::test]
    async fn test_create_and_find_listing() {
        let repo = store().await;
        let listing = listing_at(Uuid::now_v7(), GeoPoint::new(2.35, 48.85), Duration::hours(1));

        let created = repo.create_listing(listing).await.unwrap();
        let found = repo.find_listing(created.id).await.unwrap();
        assert_eq!(found, Some(created));
        assert_eq!(repo.find_listing(Uuid::now_v7()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_nearby_respects_radius_and_orders_by_expiry() {
        let repo = store().await;
        let origin = GeoPoint::new(0.0, 0.0);
        let owner = Uuid::now_v7();

        let later = listing_at(owner, origin.offset_east(10.0), Duration::hours(5));
        let sooner = listing_at(owner, origin.offset_east(999.0), Duration::hours(1));
        let just_outside = listing_at(owner, origin.offset_east(1_000.5), Duration::hours(2));
        for listing in [&later, &sooner, &just_outside] {
            repo.create_listing(listing.clone()).await.unwrap();
        }

        let found = repo.find_nearby(&NearbyQuery::new(origin, 1_000.0)).await.unwrap();
        let ids: Vec<Uuid> = found.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![sooner.id, later.id]);
    }

    #[tokio::test]
    async fn test_nearby_filters_status() {
        let repo = store().await;
        let origin = GeoPoint::new(13.4, 52.5);
        let owner = Uuid::now_v7();
        let available = listing_at(owner, origin, Duration::hours(1));
        let completed = listing_at(owner, origin, Duration::hours(2));
        repo.create_listing(available.clone()).await.unwrap();
        repo.create_listing(completed.clone()).await.unwrap();
        repo.update_status(completed.id, owner, ListingStatus::Completed, Utc::now())
            .await
            .unwrap();

        let default = repo.find_nearby(&NearbyQuery::new(origin, 100.0)).await.unwrap();
        assert_eq!(default.len(), 1);
        assert_eq!(default[0].id, available.id);

        let only_completed = NearbyQuery::new(origin, 100.0).with_statuses([ListingStatus::Completed]);
        let found = repo.find_nearby(&only_completed).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, completed.id);
    }

    #[tokio::test]
    async fn test_nearby_across_antimeridian() {
        let repo = store().await;
        let west = GeoPoint::new(-179.9999, 0.0);
        let east = listing_at(Uuid::now_v7(), GeoPoint::new(179.9999, 0.0), Duration::hours(1));
        repo.create_listing(east.clone()).await.unwrap();

        // ~22 m apart across the date line
        let found = repo.find_nearby(&NearbyQuery::new(west, 100.0)).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_update_status_checks_owner() {
        let repo = store().await;
        let owner = Uuid::now_v7();
        let listing = listing_at(owner, GeoPoint::new(0.0, 0.0), Duration::hours(1));
        repo.create_listing(listing.clone()).await.unwrap();

        let stranger = repo
            .update_status(listing.id, Uuid::now_v7(), ListingStatus::Completed, Utc::now())
            .await;
        assert!(matches!(stranger, Err(AppError::Forbidden(_))));

        let missing = repo
            .update_status(Uuid::now_v7(), owner, ListingStatus::Completed, Utc::now())
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(..))));

        let updated = repo
            .update_status(listing.id, owner, ListingStatus::Completed, Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.status, ListingStatus::Completed);
    }

    #[tokio::test]
    async fn test_bulk_expire_is_idempotent() {
        let repo = store().await;
        let owner = Uuid::now_v7();
        let overdue = listing_at(owner, GeoPoint::new(0.0, 0.0), Duration::seconds(-1));
        let fresh = listing_at(owner, GeoPoint::new(0.0, 0.0), Duration::hours(1));
        repo.create_listing(overdue.clone()).await.unwrap();
        repo.create_listing(fresh.clone()).await.unwrap();

        assert_eq!(repo.bulk_expire(Utc::now()).await.unwrap(), 1);
        let expired = repo.find_listing(overdue.id).await.unwrap().unwrap();
        assert_eq!(expired.status, ListingStatus::Expired);

        assert_eq!(repo.bulk_expire(Utc::now()).await.unwrap(), 0);
        let again = repo.find_listing(overdue.id).await.unwrap().unwrap();
        assert_eq!(again.updated_at, expired.updated_at);

        let untouched = repo.find_listing(fresh.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ListingStatus::Available);
    }

    #[tokio::test]
    async fn test_find_by_owner_newest_first() {
        let repo = store().await;
        let owner = Uuid::now_v7();
        let first = listing_at(owner, GeoPoint::new(0.0, 0.0), Duration::hours(1));
        repo.create_listing(first.clone()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = listing_at(owner, GeoPoint::new(0.0, 0.0), Duration::hours(1));
        repo.create_listing(second.clone()).await.unwrap();
        repo.create_listing(listing_at(Uuid::now_v7(), GeoPoint::new(0.0, 0.0), Duration::hours(1)))
            .await
            .unwrap();

        let mine: Vec<Uuid> = repo
            .find_by_owner(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(mine, vec![second.id, first.id]);
    }
}
