//! # Marketplace
//!
//! Inbound capability surface. Every operation takes the caller identity
//! and role already established by the auth layer and enforces the role
//! gate before touching the stores.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::geo::GeoPoint;
use crate::lifecycle::ClaimLifecycle;
use crate::models::{Actor, Claim, Decision, Listing, ListingStatus, NearbyQuery, NewListing, Role};
use crate::traits::{ClaimRepo, ListingRepo, Notifier};

/// Radius applied when discovery callers do not supply one.
pub const DEFAULT_RADIUS_M: f64 = 5_000.0;

pub struct Marketplace {
    listings: Arc<dyn ListingRepo>,
    claims: Arc<dyn ClaimRepo>,
    lifecycle: ClaimLifecycle,
    default_radius_m: f64,
}

impl Marketplace {
    pub fn new(
        listings: Arc<dyn ListingRepo>,
        claims: Arc<dyn ClaimRepo>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let lifecycle = ClaimLifecycle::new(listings.clone(), claims.clone(), notifier);
        Self {
            listings,
            claims,
            lifecycle,
            default_radius_m: DEFAULT_RADIUS_M,
        }
    }

    pub fn with_default_radius(mut self, radius_m: f64) -> Self {
        self.default_radius_m = radius_m;
        self
    }

    #[instrument(skip(self, input), fields(user = %actor.user_id))]
    pub async fn post_listing(&self, actor: Actor, input: NewListing) -> Result<Listing> {
        require(actor, Role::Donor)?;
        let listing = input.into_listing(actor.user_id, Utc::now())?;
        let listing = self.listings.create_listing(listing).await?;
        info!(listing_id = %listing.id, "listing posted");
        Ok(listing)
    }

    #[instrument(skip(self), fields(user = %actor.user_id))]
    pub async fn update_listing_status(
        &self,
        actor: Actor,
        listing_id: Uuid,
        status: ListingStatus,
    ) -> Result<Listing> {
        require(actor, Role::Donor)?;
        let listing = self
            .listings
            .update_status(listing_id, actor.user_id, status, Utc::now())
            .await?;
        info!(%listing_id, %status, "listing status updated");
        Ok(listing)
    }

    /// Proximity discovery. A missing radius falls back to the configured
    /// default; an empty status list falls back to Available and Claimed.
    pub async fn find_nearby(
        &self,
        _actor: Actor,
        center: GeoPoint,
        max_distance_m: Option<f64>,
        statuses: Vec<ListingStatus>,
    ) -> Result<Vec<Listing>> {
        let mut query = NearbyQuery::new(center, max_distance_m.unwrap_or(self.default_radius_m));
        if !statuses.is_empty() {
            query = query.with_statuses(statuses);
        }
        query.validate()?;
        self.listings.find_nearby(&query).await
    }

    pub async fn list_my_listings(&self, actor: Actor) -> Result<Vec<Listing>> {
        require(actor, Role::Donor)?;
        self.listings.find_by_owner(actor.user_id).await
    }

    /// Claims submitted by the caller. Open to any role; a donor simply has none.
    pub async fn list_my_claims(&self, actor: Actor) -> Result<Vec<Claim>> {
        self.claims.find_by_receiver(actor.user_id).await
    }

    pub async fn list_claims_on_my_listings(&self, actor: Actor) -> Result<Vec<Claim>> {
        require(actor, Role::Donor)?;
        let ids: Vec<Uuid> = self
            .listings
            .find_by_owner(actor.user_id)
            .await?
            .into_iter()
            .map(|listing| listing.id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.claims.find_by_listing_ids(&ids).await
    }

    pub async fn submit_claim(&self, actor: Actor, listing_id: Uuid) -> Result<Claim> {
        require(actor, Role::Receiver)?;
        self.lifecycle.submit_claim(listing_id, actor.user_id).await
    }

    pub async fn decide_claim(
        &self,
        actor: Actor,
        claim_id: Uuid,
        decision: Decision,
    ) -> Result<Claim> {
        require(actor, Role::Donor)?;
        self.lifecycle
            .decide_claim(claim_id, actor.user_id, decision)
            .await
    }
}

fn require(actor: Actor, role: Role) -> Result<()> {
    if actor.role == role {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{:?} role required for this action",
            role
        )))
    }
}
