//! The dispatch workflow: one send pass over a mailing's recipients.
//!
//! A pass is strictly sequential — one awaited transport call per
//! recipient, one audit row per recipient, then a single aggregate update
//! on the mailing row. A recipient's failure is recorded and the loop
//! moves on; it never aborts the batch.
//!
//! Known consistency gaps, inherited from the system this reimplements:
//! the aggregate update is not atomic with the per-recipient attempt
//! writes (a crash mid-loop keeps the attempts already written and loses
//! the pass's counter update), and concurrent passes over the same
//! mailing race on the counter read-modify-write.

use chrono::{DateTime, Utc};
use mailcast_common::types::{AttemptStatus, MailingStatus};
use mailcast_storage::{MailStore, SendAttemptRow};
use mailcast_transport::MailTransport;
use serde::Serialize;
use std::sync::Arc;

#[cfg(test)]
mod tests;

/// Server-response text recorded on a successful attempt.
pub const DELIVERED_RESPONSE: &str = "Message delivered successfully.";

/// Errors that abort a dispatch pass before any side effect.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The mailing identifier resolved to nothing.
    #[error("mailing '{0}' not found")]
    MailingNotFound(String),

    /// Scheduled trigger only: the mailing exists but is not running.
    #[error("mailing '{id}' is not running (current status: {status})")]
    NotRunning { id: String, status: MailingStatus },

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Aggregate outcome of one dispatch pass.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PassSummary {
    pub mailing_id: String,
    /// Recipients attempted in this pass.
    pub total_sent: u32,
    pub successful_sends: u32,
    pub failed_sends: u32,
    /// Mailing status after the pass.
    pub status: MailingStatus,
    pub first_sent_at: Option<DateTime<Utc>>,
}

/// Executes dispatch passes against a store and a mail transport.
///
/// The from-address is injected configuration; the workflow reads nothing
/// from the process environment.
pub struct Dispatcher {
    store: Arc<MailStore>,
    transport: Arc<dyn MailTransport>,
    from_address: String,
}

impl Dispatcher {
    pub fn new(
        store: Arc<MailStore>,
        transport: Arc<dyn MailTransport>,
        from_address: String,
    ) -> Self {
        Self {
            store,
            transport,
            from_address,
        }
    }

    /// Runs one send pass over the mailing's recipients (the interactive
    /// entry point: no precondition on the current status).
    ///
    /// `actor_owner` stamps the attempt rows; the scheduled path passes
    /// `None`.
    pub async fn run_pass(
        &self,
        mailing_id: &str,
        actor_owner: Option<&str>,
    ) -> Result<PassSummary, DispatchError> {
        let mailing = self
            .store
            .get_mailing_by_id(mailing_id)
            .await?
            .ok_or_else(|| DispatchError::MailingNotFound(mailing_id.to_string()))?;
        let message = self
            .store
            .get_message_by_id(&mailing.message_id)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("message '{}' missing for mailing '{mailing_id}'", mailing.message_id)
            })?;
        let recipients = self.store.list_mailing_recipients(mailing_id).await?;

        let mut total_sent = 0u32;
        let mut successful_sends = 0u32;
        let mut failed_sends = 0u32;

        for recipient in &recipients {
            let outcome = self
                .transport
                .send(
                    &message.subject,
                    &message.body,
                    &self.from_address,
                    std::slice::from_ref(&recipient.email),
                )
                .await;
            let (status, server_response) = match outcome {
                Ok(()) => {
                    successful_sends += 1;
                    (AttemptStatus::Success, DELIVERED_RESPONSE.to_string())
                }
                Err(e) => {
                    tracing::warn!(
                        mailing_id = %mailing_id,
                        recipient = %recipient.email,
                        error = %e,
                        "Send failed"
                    );
                    failed_sends += 1;
                    (AttemptStatus::Failure, e.to_string())
                }
            };
            total_sent += 1;

            let now = Utc::now();
            self.store
                .insert_send_attempt(&SendAttemptRow {
                    id: mailcast_common::id::next_id(),
                    attempted_at: now,
                    status,
                    server_response,
                    mailing_id: mailing_id.to_string(),
                    recipient_id: Some(recipient.id.clone()),
                    message_id: Some(message.id.clone()),
                    owner_id: actor_owner.map(str::to_string),
                    created_at: now,
                })
                .await?;
        }

        // Single aggregate write after the loop. The counters accumulate
        // onto the values loaded before the loop; the attempt rows above
        // are not rolled back if this write is lost.
        let completed_at = Utc::now();
        let mut status = mailing.status;
        let mut first_sent_at = mailing.first_sent_at;
        if status == MailingStatus::Created {
            status = MailingStatus::Running;
            first_sent_at.get_or_insert(completed_at);
        }
        if let Some(end_at) = mailing.end_at {
            if completed_at > end_at {
                status = MailingStatus::Finished;
            }
        }
        self.store
            .update_mailing_after_pass(
                mailing_id,
                mailing.total_sent + total_sent as i32,
                mailing.successful_sends + successful_sends as i32,
                mailing.failed_sends + failed_sends as i32,
                status,
                first_sent_at,
            )
            .await?;

        tracing::info!(
            mailing_id = %mailing_id,
            total_sent,
            successful_sends,
            failed_sends,
            status = %status,
            "Dispatch pass completed"
        );

        Ok(PassSummary {
            mailing_id: mailing_id.to_string(),
            total_sent,
            successful_sends,
            failed_sends,
            status,
            first_sent_at,
        })
    }

    /// Scheduled/operator entry point: refuses to run unless the mailing
    /// is currently `running`.
    pub async fn run_scheduled_pass(&self, mailing_id: &str) -> Result<PassSummary, DispatchError> {
        let mailing = self
            .store
            .get_mailing_by_id(mailing_id)
            .await?
            .ok_or_else(|| DispatchError::MailingNotFound(mailing_id.to_string()))?;
        if mailing.status != MailingStatus::Running {
            return Err(DispatchError::NotRunning {
                id: mailing_id.to_string(),
                status: mailing.status,
            });
        }
        self.run_pass(mailing_id, None).await
    }
}
