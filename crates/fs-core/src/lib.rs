//! fs-core/src/lib.rs
//!
//! The central domain logic and port definitions for FoodShare: listings,
//! claims, the claim lifecycle, and the expiry sweep.

pub mod error;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod service;
pub mod sweeper;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use geo::GeoPoint;
pub use lifecycle::ClaimLifecycle;
pub use models::*;
pub use service::{Marketplace, DEFAULT_RADIUS_M};
pub use sweeper::{ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
pub use traits::*;
