//! # Domain Models
//!
//! These structs represent the core entities of FoodShare.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;

/// Availability of a food listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingStatus {
    Available,
    Claimed,
    Expired,
    Completed,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 4] = [
        ListingStatus::Available,
        ListingStatus::Claimed,
        ListingStatus::Expired,
        ListingStatus::Completed,
    ];

    /// Statuses shown by discovery when the caller does not ask for others.
    pub const DISCOVERABLE: [ListingStatus; 2] =
        [ListingStatus::Available, ListingStatus::Claimed];

    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Available => "Available",
            ListingStatus::Claimed => "Claimed",
            ListingStatus::Expired => "Expired",
            ListingStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ListingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("unknown listing status '{s}'")))
    }
}

/// Progress of a claim. Pending is the only undecided state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "Pending",
            ClaimStatus::Approved => "Approved",
            ClaimStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ClaimStatus::Pending),
            "Approved" => Ok(ClaimStatus::Approved),
            "Rejected" => Ok(ClaimStatus::Rejected),
            other => Err(AppError::Validation(format!("unknown claim status '{other}'"))),
        }
    }
}

/// The outcome a donor can give a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for ClaimStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => ClaimStatus::Approved,
            Decision::Rejected => ClaimStatus::Rejected,
        }
    }
}

/// A donor's posted surplus-food item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    /// Donor who posted the item; never changes after creation
    pub owner: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Free-form amount, e.g. "2 servings"
    pub quantity: String,
    /// Opaque reference handed out by the upload store
    pub image_ref: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub location: GeoPoint,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw input for posting a listing, as received from the outer layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewListing {
    pub name: String,
    pub description: Option<String>,
    pub quantity: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub location: Option<GeoPoint>,
    pub image_ref: Option<String>,
}

impl NewListing {
    /// Validates the input and builds an Available listing owned by `owner`.
    pub fn into_listing(self, owner: Uuid, now: DateTime<Utc>) -> Result<Listing, AppError> {
        let name = self.name.trim();
        let quantity = self.quantity.trim();
        if name.is_empty() || quantity.is_empty() {
            return Err(AppError::Validation(
                "name and quantity are required".into(),
            ));
        }
        let expires_at = self
            .expires_at
            .ok_or_else(|| AppError::Validation("expiry time is required".into()))?;
        let location = self
            .location
            .ok_or_else(|| AppError::Validation("location is required".into()))?;
        location.validate()?;

        Ok(Listing {
            id: Uuid::now_v7(),
            owner,
            name: name.to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            quantity: quantity.to_string(),
            image_ref: self.image_ref,
            expires_at,
            location,
            status: ListingStatus::Available,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Parameters of a proximity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyQuery {
    pub center: GeoPoint,
    pub max_distance_m: f64,
    /// Empty means "use the discoverable defaults"
    pub statuses: Vec<ListingStatus>,
}

impl NearbyQuery {
    pub fn new(center: GeoPoint, max_distance_m: f64) -> Self {
        Self {
            center,
            max_distance_m,
            statuses: ListingStatus::DISCOVERABLE.to_vec(),
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = ListingStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Status set actually applied by the store.
    pub fn effective_statuses(&self) -> Vec<ListingStatus> {
        if self.statuses.is_empty() {
            ListingStatus::DISCOVERABLE.to_vec()
        } else {
            self.statuses.clone()
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.center.validate()?;
        if !self.max_distance_m.is_finite() || self.max_distance_m < 0.0 {
            return Err(AppError::Validation(format!(
                "max distance {} must be a non-negative number of meters",
                self.max_distance_m
            )));
        }
        Ok(())
    }
}

/// A receiver's request to take a specific listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub receiver_id: Uuid,
    pub status: ClaimStatus,
    pub claimed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    pub fn pending(listing_id: Uuid, receiver_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            listing_id,
            receiver_id,
            status: ClaimStatus::Pending,
            claimed_at: now,
            updated_at: now,
        }
    }
}

/// A donor's decision, applied atomically across both stores.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimDecision {
    pub claim_id: Uuid,
    pub listing_id: Uuid,
    pub decision: Decision,
    pub decided_at: DateTime<Utc>,
}

/// Everything a committed decision changed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub claim: Claim,
    pub listing: Listing,
    /// Sibling claims rejected because another claim was approved
    pub auto_rejected: Vec<Claim>,
}

/// Role assigned to an authenticated user by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Donor,
    Receiver,
}

/// The pre-authenticated caller of an inbound operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn donor(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Donor,
        }
    }

    pub fn receiver(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Receiver,
        }
    }
}
