//! # Claim Lifecycle
//!
//! The only component allowed to couple listing and claim state changes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Claim, ClaimDecision, ClaimStatus, Decision, Listing, ListingStatus};
use crate::traits::{ClaimNotice, ClaimRepo, DecisionNotice, ListingRepo, Notifier};

pub struct ClaimLifecycle {
    listings: Arc<dyn ListingRepo>,
    claims: Arc<dyn ClaimRepo>,
    notifier: Arc<dyn Notifier>,
}

impl ClaimLifecycle {
    pub fn new(
        listings: Arc<dyn ListingRepo>,
        claims: Arc<dyn ClaimRepo>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            listings,
            claims,
            notifier,
        }
    }

    /// Records a Pending claim by `receiver_id` on an Available listing.
    ///
    /// The listing stays Available, so several receivers may hold Pending
    /// claims on it at the same time.
    #[instrument(skip(self))]
    pub async fn submit_claim(&self, listing_id: Uuid, receiver_id: Uuid) -> Result<Claim> {
        let listing = self.load_listing(listing_id).await?;

        if listing.status != ListingStatus::Available {
            return Err(AppError::InvalidState(format!(
                "listing {listing_id} is {}, not Available",
                listing.status
            )));
        }
        if listing.owner == receiver_id {
            return Err(AppError::Forbidden(
                "a donor cannot claim their own listing".into(),
            ));
        }
        if self
            .claims
            .find_existing(listing_id, receiver_id)
            .await?
            .is_some()
        {
            return Err(duplicate_claim(listing_id));
        }

        // The store re-checks both conditions in the insert itself: a listing
        // taken since the read above fails InvalidState, a concurrent
        // duplicate fails Conflict.
        let claim = self
            .claims
            .create_claim(Claim::pending(listing_id, receiver_id, Utc::now()))
            .await?;

        info!(claim_id = %claim.id, "claim submitted");
        self.notify_donor(ClaimNotice {
            listing,
            claim: claim.clone(),
        });
        Ok(claim)
    }

    /// Applies the listing owner's decision to a Pending claim.
    ///
    /// Approval also marks the listing Claimed and rejects every other
    /// Pending claim on it, all in one transaction.
    #[instrument(skip(self))]
    pub async fn decide_claim(
        &self,
        claim_id: Uuid,
        decider_id: Uuid,
        decision: Decision,
    ) -> Result<Claim> {
        let claim = self
            .claims
            .find_claim(claim_id)
            .await?
            .ok_or_else(|| AppError::not_found("Claim", claim_id))?;
        let listing = self.load_listing(claim.listing_id).await?;

        if listing.owner != decider_id {
            return Err(AppError::Forbidden(
                "only the listing owner can decide its claims".into(),
            ));
        }
        if claim.status != ClaimStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "claim {claim_id} was already {}",
                claim.status
            )));
        }

        let outcome = self
            .claims
            .commit_decision(ClaimDecision {
                claim_id,
                listing_id: listing.id,
                decision,
                decided_at: Utc::now(),
            })
            .await?;

        info!(
            claim_id = %claim_id,
            status = %outcome.claim.status,
            auto_rejected = outcome.auto_rejected.len(),
            "claim decided"
        );

        self.notify_receiver(&outcome.listing, outcome.claim.clone(), decision, decider_id);
        for sibling in &outcome.auto_rejected {
            self.notify_receiver(&outcome.listing, sibling.clone(), Decision::Rejected, decider_id);
        }
        Ok(outcome.claim)
    }

    async fn load_listing(&self, id: Uuid) -> Result<Listing> {
        self.listings
            .find_listing(id)
            .await?
            .ok_or_else(|| AppError::not_found("Listing", id))
    }

    fn notify_donor(&self, notice: ClaimNotice) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let claim_id = notice.claim.id;
            if let Err(e) = notifier.notify_donor_of_claim(notice).await {
                warn!(%claim_id, error = %e, "failed to send claim notification");
            }
        });
    }

    fn notify_receiver(&self, listing: &Listing, claim: Claim, decision: Decision, donor_id: Uuid) {
        let notifier = Arc::clone(&self.notifier);
        let notice = DecisionNotice {
            listing: listing.clone(),
            claim,
            decision,
            donor_id,
        };
        tokio::spawn(async move {
            let claim_id = notice.claim.id;
            if let Err(e) = notifier.notify_receiver_of_decision(notice).await {
                warn!(%claim_id, error = %e, "failed to send decision notification");
            }
        });
    }
}

fn duplicate_claim(listing_id: Uuid) -> AppError {
    AppError::Conflict(format!("claim already submitted for listing {listing_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::models::DecisionOutcome;
    use crate::traits::{MockClaimRepo, MockListingRepo, MockNotifier};
    use chrono::Duration;
    use tokio::sync::mpsc;

    fn listing(owner: Uuid, status: ListingStatus) -> Listing {
        let now = Utc::now();
        Listing {
            id: Uuid::now_v7(),
            owner,
            name: "Bread".into(),
            description: None,
            quantity: "3 loaves".into(),
            image_ref: None,
            expires_at: now + Duration::hours(2),
            location: GeoPoint::new(0.0, 0.0),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn listings_returning(listing: Listing) -> MockListingRepo {
        let mut listings = MockListingRepo::new();
        listings
            .expect_find_listing()
            .returning(move |_| Ok(Some(listing.clone())));
        listings
    }

    fn lifecycle(
        listings: MockListingRepo,
        claims: MockClaimRepo,
        notifier: MockNotifier,
    ) -> ClaimLifecycle {
        ClaimLifecycle::new(Arc::new(listings), Arc::new(claims), Arc::new(notifier))
    }

    #[tokio::test]
    async fn test_submit_rejects_unavailable_listing() {
        for status in [
            ListingStatus::Claimed,
            ListingStatus::Expired,
            ListingStatus::Completed,
        ] {
            let item = listing(Uuid::now_v7(), status);
            let mut claims = MockClaimRepo::new();
            claims.expect_create_claim().never();
            let manager = lifecycle(listings_returning(item.clone()), claims, MockNotifier::new());

            let result = manager.submit_claim(item.id, Uuid::now_v7()).await;
            assert!(matches!(result, Err(AppError::InvalidState(_))), "{status}");
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_own_listing() {
        let donor = Uuid::now_v7();
        let item = listing(donor, ListingStatus::Available);
        let mut claims = MockClaimRepo::new();
        claims.expect_create_claim().never();
        let manager = lifecycle(listings_returning(item.clone()), claims, MockNotifier::new());

        let result = manager.submit_claim(item.id, donor).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_submit_missing_listing() {
        let mut listings = MockListingRepo::new();
        listings.expect_find_listing().returning(|_| Ok(None));
        let manager = lifecycle(listings, MockClaimRepo::new(), MockNotifier::new());

        let result = manager.submit_claim(Uuid::now_v7(), Uuid::now_v7()).await;
        assert!(matches!(result, Err(AppError::NotFound(..))));
    }

    #[tokio::test]
    async fn test_submit_rejects_existing_claim() {
        let item = listing(Uuid::now_v7(), ListingStatus::Available);
        let receiver = Uuid::now_v7();
        let existing = Claim::pending(item.id, receiver, Utc::now());
        let mut claims = MockClaimRepo::new();
        claims
            .expect_find_existing()
            .returning(move |_, _| Ok(Some(existing.clone())));
        claims.expect_create_claim().never();
        let manager = lifecycle(listings_returning(item.clone()), claims, MockNotifier::new());

        let result = manager.submit_claim(item.id, receiver).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_submit_survives_notification_failure() {
        let item = listing(Uuid::now_v7(), ListingStatus::Available);
        let receiver = Uuid::now_v7();
        let mut claims = MockClaimRepo::new();
        claims.expect_find_existing().returning(|_, _| Ok(None));
        claims.expect_create_claim().times(1).returning(Ok);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify_donor_of_claim()
            .times(1)
            .returning(move |notice| {
                let _ = tx.send(notice);
                Err(AppError::Internal("smtp down".into()))
            });
        let manager = lifecycle(listings_returning(item.clone()), claims, notifier);

        let claim = manager.submit_claim(item.id, receiver).await.unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.receiver_id, receiver);

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.claim.id, claim.id);
        assert_eq!(notice.listing.id, item.id);
    }

    #[tokio::test]
    async fn test_decide_requires_listing_owner() {
        let item = listing(Uuid::now_v7(), ListingStatus::Available);
        let claim = Claim::pending(item.id, Uuid::now_v7(), Utc::now());
        let mut claims = MockClaimRepo::new();
        let found = claim.clone();
        claims
            .expect_find_claim()
            .returning(move |_| Ok(Some(found.clone())));
        claims.expect_commit_decision().never();
        let manager = lifecycle(listings_returning(item), claims, MockNotifier::new());

        let result = manager
            .decide_claim(claim.id, Uuid::now_v7(), Decision::Approved)
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_decide_refuses_redecision() {
        let donor = Uuid::now_v7();
        let item = listing(donor, ListingStatus::Claimed);
        let mut claim = Claim::pending(item.id, Uuid::now_v7(), Utc::now());
        claim.status = ClaimStatus::Approved;
        let mut claims = MockClaimRepo::new();
        let found = claim.clone();
        claims
            .expect_find_claim()
            .returning(move |_| Ok(Some(found.clone())));
        claims.expect_commit_decision().never();
        let manager = lifecycle(listings_returning(item), claims, MockNotifier::new());

        let result = manager
            .decide_claim(claim.id, donor, Decision::Rejected)
            .await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_decide_notifies_receiver_and_rejected_siblings() {
        let donor = Uuid::now_v7();
        let item = listing(donor, ListingStatus::Available);
        let claim = Claim::pending(item.id, Uuid::now_v7(), Utc::now());
        let sibling = Claim::pending(item.id, Uuid::now_v7(), Utc::now());

        let mut claims = MockClaimRepo::new();
        let found = claim.clone();
        claims
            .expect_find_claim()
            .returning(move |_| Ok(Some(found.clone())));
        let (approved, rejected, claimed) = {
            let mut approved = claim.clone();
            approved.status = ClaimStatus::Approved;
            let mut rejected = sibling.clone();
            rejected.status = ClaimStatus::Rejected;
            let mut claimed = item.clone();
            claimed.status = ListingStatus::Claimed;
            (approved, rejected, claimed)
        };
        claims
            .expect_commit_decision()
            .times(1)
            .withf(|d| d.decision == Decision::Approved)
            .returning(move |_| {
                Ok(DecisionOutcome {
                    claim: approved.clone(),
                    listing: claimed.clone(),
                    auto_rejected: vec![rejected.clone()],
                })
            });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify_receiver_of_decision()
            .times(2)
            .returning(move |notice| {
                let _ = tx.send((notice.claim.receiver_id, notice.decision));
                Ok(())
            });
        let manager = lifecycle(listings_returning(item), claims, notifier);

        let decided = manager
            .decide_claim(claim.id, donor, Decision::Approved)
            .await
            .unwrap();
        assert_eq!(decided.status, ClaimStatus::Approved);

        let mut sent = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        sent.sort_by_key(|(_, decision)| *decision == Decision::Rejected);
        assert_eq!(sent[0], (claim.receiver_id, Decision::Approved));
        assert_eq!(sent[1], (sibling.receiver_id, Decision::Rejected));
    }
}
