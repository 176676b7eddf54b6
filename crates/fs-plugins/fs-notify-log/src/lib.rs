//! # fs-notify-log
//!
//! `Notifier` implementation that renders claim notifications and emits
//! them as structured log events instead of handing them to a mail relay.

use async_trait::async_trait;
use fs_core::error::Result;
use fs_core::{ClaimNotice, Decision, DecisionNotice, Notifier};
use tracing::info;

/// A rendered message, ready for a delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
    pub link: String,
}

pub struct LogNotifier {
    /// Base URL of the web app (e.g., "http://localhost:5173")
    frontend_url: String,
}

impl LogNotifier {
    pub fn new(frontend_url: impl Into<String>) -> Self {
        Self {
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn render_claim(&self, notice: &ClaimNotice) -> Message {
        Message {
            subject: format!("New Claim on Your Food: {}", notice.listing.name),
            body: format!(
                "Someone has claimed your food listing: {}. Please log in to approve or reject this claim.",
                notice.listing.name
            ),
            link: format!("{}/manage-claims", self.frontend_url),
        }
    }

    pub fn render_decision(&self, notice: &DecisionNotice) -> Message {
        let status = match notice.decision {
            Decision::Approved => "Approved",
            Decision::Rejected => "Rejected",
        };
        let body = match notice.decision {
            Decision::Approved => format!(
                "Your claim for {} has been approved. Please coordinate with the donor to arrange pickup.",
                notice.listing.name
            ),
            Decision::Rejected => format!(
                "Your claim for {} has been rejected. There are more food listings available.",
                notice.listing.name
            ),
        };
        Message {
            subject: format!("Your Claim Has Been {status}: {}", notice.listing.name),
            body,
            link: format!("{}/my-claims", self.frontend_url),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_donor_of_claim(&self, notice: ClaimNotice) -> Result<()> {
        let message = self.render_claim(&notice);
        info!(
            to = %notice.listing.owner,
            claim_id = %notice.claim.id,
            subject = %message.subject,
            body = %message.body,
            link = %message.link,
            "claim notification"
        );
        Ok(())
    }

    async fn notify_receiver_of_decision(&self, notice: DecisionNotice) -> Result<()> {
        let message = self.render_decision(&notice);
        info!(
            to = %notice.claim.receiver_id,
            from = %notice.donor_id,
            claim_id = %notice.claim.id,
            subject = %message.subject,
            body = %message.body,
            link = %message.link,
            "decision notification"
        );
        Ok(())
    }
}
