//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Claim, ClaimDecision, ClaimStatus, Decision, DecisionOutcome, Listing, ListingStatus,
    NearbyQuery,
};

/// Persistence contract for food listings, including the proximity index.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ListingRepo: Send + Sync {
    async fn create_listing(&self, listing: Listing) -> Result<Listing>;
    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>>;

    /// Listings within `max_distance_m` of the center whose status is in the
    /// query's filter, ordered by ascending expiry.
    async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<Listing>>;

    /// A donor's listings, newest first.
    async fn find_by_owner(&self, owner: Uuid) -> Result<Vec<Listing>>;

    /// Fails `NotFound` if absent and `Forbidden` if `owner` does not own it.
    async fn update_status(
        &self,
        id: Uuid,
        owner: Uuid,
        status: ListingStatus,
        now: DateTime<Utc>,
    ) -> Result<Listing>;

    /// Marks every listing with `expires_at < now` that is not already
    /// Expired as Expired, in one conditional bulk write. Returns the count.
    async fn bulk_expire(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Persistence contract for claims.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ClaimRepo: Send + Sync {
    /// Atomic conditional insert: fails `InvalidState` unless the listing is
    /// Available at write time, and a second claim for the same
    /// (listing, receiver) pair fails `Conflict`.
    async fn create_claim(&self, claim: Claim) -> Result<Claim>;
    async fn find_existing(&self, listing_id: Uuid, receiver_id: Uuid) -> Result<Option<Claim>>;
    async fn find_claim(&self, id: Uuid) -> Result<Option<Claim>>;

    /// Newest first.
    async fn find_by_receiver(&self, receiver_id: Uuid) -> Result<Vec<Claim>>;

    /// Newest first.
    async fn find_by_listing_ids(&self, listing_ids: &[Uuid]) -> Result<Vec<Claim>>;

    /// Unguarded overwrite of a claim's status.
    async fn set_status(&self, id: Uuid, status: ClaimStatus, now: DateTime<Utc>) -> Result<Claim>;

    /// Applies a donor decision to the claim and, on approval, to its listing
    /// and sibling claims, as one transaction.
    ///
    /// Fails `InvalidState` (with nothing written) if the claim is no longer
    /// Pending, or if approving and the listing is no longer Available.
    async fn commit_decision(&self, decision: ClaimDecision) -> Result<DecisionOutcome>;
}

/// A new claim, as reported to the donor.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimNotice {
    pub listing: Listing,
    pub claim: Claim,
}

/// A decided claim, as reported to its receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionNotice {
    pub listing: Listing,
    pub claim: Claim,
    pub decision: Decision,
    pub donor_id: Uuid,
}

/// Outbound, fire-and-forget notification contract.
///
/// Callers never await delivery on the request path; errors are logged.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_donor_of_claim(&self, notice: ClaimNotice) -> Result<()>;
    async fn notify_receiver_of_decision(&self, notice: DecisionNotice) -> Result<()>;
}

/// Notifier used when delivery is switched off.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_donor_of_claim(&self, _notice: ClaimNotice) -> Result<()> {
        Ok(())
    }

    async fn notify_receiver_of_decision(&self, _notice: DecisionNotice) -> Result<()> {
        Ok(())
    }
}
