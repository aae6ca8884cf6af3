use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mailcast_common::types::{AttemptStatus, MailingStatus, OwnerScope};
use mailcast_storage::{MailStore, MailingRow, MessageRow, RecipientRow, SendAttemptFilter};
use mailcast_transport::{MailTransport, TransportError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::{DispatchError, Dispatcher, DELIVERED_RESPONSE};

/// Transport double: records every address handed to it and fails the
/// configured ones.
struct MockTransport {
    fail_for: HashSet<String>,
    sent: Mutex<Vec<String>>,
}

impl MockTransport {
    fn new(fail_for: &[&str]) -> Self {
        Self {
            fail_for: fail_for.iter().map(|s| s.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent_addresses(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(
        &self,
        _subject: &str,
        _body: &str,
        _from: &str,
        to: &[String],
    ) -> Result<(), TransportError> {
        let addr = to.first().cloned().unwrap_or_default();
        self.sent.lock().unwrap().push(addr.clone());
        if self.fail_for.contains(&addr) {
            Err(TransportError::Smtp("550 mailbox unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

struct Fixture {
    _dir: TempDir,
    store: Arc<MailStore>,
    dispatcher: Dispatcher,
    transport: Arc<MockTransport>,
    mailing_id: String,
    actor_id: String,
}

async fn setup(
    emails: &[&str],
    fail_for: &[&str],
    end_at: Option<DateTime<Utc>>,
) -> Fixture {
    mailcast_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("dispatch.db").display()
    );
    let store = Arc::new(MailStore::new(&url, dir.path()).await.unwrap());

    let actor = store
        .create_user(
            "sender@example.com",
            "hash",
            mailcast_common::types::UserRole::Member,
            true,
        )
        .await
        .unwrap();

    let now = Utc::now();
    let message = store
        .insert_message(&MessageRow {
            id: mailcast_common::id::next_id(),
            subject: "Weekly digest".to_string(),
            body: "Fresh news inside".to_string(),
            owner_id: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let mut recipient_ids = Vec::new();
    for email in emails {
        let r = store
            .insert_recipient(&RecipientRow {
                id: mailcast_common::id::next_id(),
                email: email.to_string(),
                full_name: "Reader".to_string(),
                comment: String::new(),
                owner_id: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        recipient_ids.push(r.id);
    }

    let mailing = store
        .insert_mailing(
            &MailingRow {
                id: mailcast_common::id::next_id(),
                first_sent_at: None,
                end_at,
                status: MailingStatus::Created,
                message_id: message.id.clone(),
                owner_id: None,
                total_sent: 0,
                successful_sends: 0,
                failed_sends: 0,
                created_at: now,
                updated_at: now,
            },
            &recipient_ids,
        )
        .await
        .unwrap();

    let transport = Arc::new(MockTransport::new(fail_for));
    let dispatcher = Dispatcher::new(
        store.clone(),
        transport.clone(),
        "noreply@mailcast.local".to_string(),
    );

    Fixture {
        _dir: dir,
        store,
        dispatcher,
        transport,
        mailing_id: mailing.id,
        actor_id: actor.id,
    }
}

fn audit_scope() -> OwnerScope {
    OwnerScope {
        user_id: "auditor".to_string(),
        is_manager: true,
    }
}

#[tokio::test]
async fn pass_appends_one_attempt_per_recipient() {
    let fx = setup(&["a@example.com", "b@example.com", "c@example.com"], &[], None).await;

    let summary = fx.dispatcher.run_pass(&fx.mailing_id, None).await.unwrap();
    assert_eq!(summary.total_sent, 3);
    assert_eq!(summary.successful_sends, 3);
    assert_eq!(summary.failed_sends, 0);
    assert_eq!(summary.status, MailingStatus::Running);
    assert!(summary.first_sent_at.is_some());

    let attempts = fx
        .store
        .list_send_attempts(&audit_scope(), &SendAttemptFilter::default(), 100, 0)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 3);
    assert!(attempts
        .iter()
        .all(|a| a.server_response == DELIVERED_RESPONSE));

    let mailing = fx
        .store
        .get_mailing_by_id(&fx.mailing_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mailing.total_sent, 3);
    assert_eq!(mailing.successful_sends, 3);
    assert_eq!(mailing.failed_sends, 0);
}

#[tokio::test]
async fn failed_recipient_is_recorded_and_does_not_abort_the_batch() {
    let fx = setup(
        &["a@example.com", "b@example.com", "c@example.com"],
        &["b@example.com"],
        None,
    )
    .await;

    let summary = fx.dispatcher.run_pass(&fx.mailing_id, None).await.unwrap();
    assert_eq!(summary.total_sent, 3);
    assert_eq!(summary.successful_sends, 2);
    assert_eq!(summary.failed_sends, 1);

    // All three recipients were attempted, in email order.
    assert_eq!(
        fx.transport.sent_addresses(),
        ["a@example.com", "b@example.com", "c@example.com"]
    );

    let attempts = fx
        .store
        .list_send_attempts(&audit_scope(), &SendAttemptFilter::default(), 100, 0)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 3);
    let failures: Vec<_> = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Failure)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].server_response, "SMTP error: 550 mailbox unavailable");

    let mailing = fx
        .store
        .get_mailing_by_id(&fx.mailing_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        mailing.successful_sends + mailing.failed_sends,
        mailing.total_sent
    );
}

#[tokio::test]
async fn repeated_passes_accumulate_counters_and_keep_first_sent_at() {
    let fx = setup(&["a@example.com", "b@example.com"], &[], None).await;

    let first = fx.dispatcher.run_pass(&fx.mailing_id, None).await.unwrap();
    let first_sent_at = first.first_sent_at.unwrap();

    let second = fx.dispatcher.run_pass(&fx.mailing_id, None).await.unwrap();
    assert_eq!(second.status, MailingStatus::Running);
    assert_eq!(second.first_sent_at, Some(first_sent_at));

    let mailing = fx
        .store
        .get_mailing_by_id(&fx.mailing_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mailing.total_sent, 4);
    assert_eq!(mailing.successful_sends, 4);
    assert_eq!(mailing.first_sent_at, Some(first_sent_at));
    assert_eq!(
        mailing.successful_sends + mailing.failed_sends,
        mailing.total_sent
    );
}

#[tokio::test]
async fn pass_completing_after_end_at_finishes_the_mailing() {
    let end_at = Utc::now() - Duration::minutes(5);
    let fx = setup(&["a@example.com"], &[], Some(end_at)).await;

    let summary = fx.dispatcher.run_pass(&fx.mailing_id, None).await.unwrap();
    assert_eq!(summary.status, MailingStatus::Finished);
    assert!(summary.first_sent_at.is_some());

    let mailing = fx
        .store
        .get_mailing_by_id(&fx.mailing_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mailing.status, MailingStatus::Finished);
}

#[tokio::test]
async fn mailing_without_end_at_never_auto_finishes() {
    let fx = setup(&["a@example.com"], &[], None).await;

    fx.dispatcher.run_pass(&fx.mailing_id, None).await.unwrap();
    let summary = fx.dispatcher.run_pass(&fx.mailing_id, None).await.unwrap();
    assert_eq!(summary.status, MailingStatus::Running);
}

#[tokio::test]
async fn unknown_mailing_aborts_with_no_side_effects() {
    let fx = setup(&["a@example.com"], &[], None).await;

    let err = fx.dispatcher.run_pass("does-not-exist", None).await;
    assert!(matches!(err, Err(DispatchError::MailingNotFound(_))));
    assert!(fx.transport.sent_addresses().is_empty());

    let attempts = fx
        .store
        .list_send_attempts(&audit_scope(), &SendAttemptFilter::default(), 100, 0)
        .await
        .unwrap();
    assert!(attempts.is_empty());
}

#[tokio::test]
async fn scheduled_pass_requires_running_status() {
    let fx = setup(&["a@example.com"], &[], None).await;

    // Still `created`: the scheduled trigger refuses, with zero side effects.
    let err = fx.dispatcher.run_scheduled_pass(&fx.mailing_id).await;
    assert!(matches!(
        err,
        Err(DispatchError::NotRunning {
            status: MailingStatus::Created,
            ..
        })
    ));
    assert!(fx.transport.sent_addresses().is_empty());
    let mailing = fx
        .store
        .get_mailing_by_id(&fx.mailing_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mailing.total_sent, 0);
    assert_eq!(mailing.first_sent_at, None);

    // The interactive path has no guard and promotes the mailing; the
    // scheduled trigger then runs.
    fx.dispatcher.run_pass(&fx.mailing_id, None).await.unwrap();
    let summary = fx.dispatcher.run_scheduled_pass(&fx.mailing_id).await.unwrap();
    assert_eq!(summary.total_sent, 1);

    let mailing = fx
        .store
        .get_mailing_by_id(&fx.mailing_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mailing.total_sent, 2);
}

#[tokio::test]
async fn interactive_pass_stamps_the_acting_owner() {
    let fx = setup(&["a@example.com"], &[], None).await;

    fx.dispatcher
        .run_pass(&fx.mailing_id, Some(fx.actor_id.as_str()))
        .await
        .unwrap();
    fx.dispatcher.run_scheduled_pass(&fx.mailing_id).await.unwrap();

    let attempts = fx
        .store
        .list_send_attempts(&audit_scope(), &SendAttemptFilter::default(), 100, 0)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].owner_id.as_deref(), Some(fx.actor_id.as_str()));
    assert_eq!(attempts[1].owner_id, None);
}
