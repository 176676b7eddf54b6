//! Shared fixtures for the end-to-end suites: a marketplace wired to a real
//! SQLite store and a notifier that records what it was asked to send.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use fs_core::{
    Actor, ClaimNotice, DecisionNotice, GeoPoint, Listing, Marketplace, NewListing, Notifier,
    Result,
};
use fs_db_sqlite::SqliteStore;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug)]
pub enum Sent {
    Claim(ClaimNotice),
    Decision(DecisionNotice),
}

pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Sent>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_donor_of_claim(&self, notice: ClaimNotice) -> Result<()> {
        let _ = self.tx.send(Sent::Claim(notice));
        Ok(())
    }

    async fn notify_receiver_of_decision(&self, notice: DecisionNotice) -> Result<()> {
        let _ = self.tx.send(Sent::Decision(notice));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub market: Arc<Marketplace>,
    pub sent: mpsc::UnboundedReceiver<Sent>,
}

impl Harness {
    pub async fn in_memory() -> Self {
        Self::with_store(SqliteStore::new("sqlite::memory:").await.unwrap())
    }

    pub fn with_store(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        let (tx, sent) = mpsc::unbounded_channel();
        let market = Marketplace::new(
            store.clone(),
            store.clone(),
            Arc::new(RecordingNotifier { tx }),
        );
        Self {
            store,
            market: Arc::new(market),
            sent,
        }
    }

    /// Posts a listing through the marketplace as `donor`.
    pub async fn post(&self, donor: Actor, name: &str, at: GeoPoint, expires_in: Duration) -> Listing {
        self.market
            .post_listing(
                donor,
                NewListing {
                    name: name.into(),
                    description: None,
                    quantity: "2 servings".into(),
                    expires_at: Some(Utc::now() + expires_in),
                    location: Some(at),
                    image_ref: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn next_sent(&mut self) -> Sent {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.sent.recv())
            .await
            .expect("notification not sent in time")
            .expect("notifier channel closed")
    }
}

pub fn donor() -> Actor {
    Actor::donor(Uuid::now_v7())
}

pub fn receiver() -> Actor {
    Actor::receiver(Uuid::now_v7())
}
