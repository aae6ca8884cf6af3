use anyhow::Result;
use chrono::{DateTime, Utc};
use mailcast_common::types::{AttemptStatus, OwnerScope};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::send_attempt::{self, Column, Entity};
use crate::store::MailStore;

/// One per-recipient delivery attempt. Append-only audit row, written
/// exclusively by the dispatch workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAttemptRow {
    pub id: String,
    pub attempted_at: DateTime<Utc>,
    pub status: AttemptStatus,
    pub server_response: String,
    pub mailing_id: String,
    pub recipient_id: Option<String>,
    pub message_id: Option<String>,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Send-attempt list filter.
#[derive(Debug, Clone, Default)]
pub struct SendAttemptFilter {
    pub mailing_id: Option<String>,
    pub status: Option<AttemptStatus>,
}

fn model_to_attempt(m: send_attempt::Model) -> SendAttemptRow {
    SendAttemptRow {
        id: m.id,
        attempted_at: m.attempted_at.with_timezone(&Utc),
        status: m.status.parse().unwrap_or(AttemptStatus::Failure),
        server_response: m.server_response,
        mailing_id: m.mailing_id,
        recipient_id: m.recipient_id,
        message_id: m.message_id,
        owner_id: m.owner_id,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

type AttemptSelect = sea_orm::Select<Entity>;

fn apply_filter(mut q: AttemptSelect, scope: &OwnerScope, filter: &SendAttemptFilter) -> AttemptSelect {
    if !scope.is_manager {
        q = q.filter(Column::OwnerId.eq(scope.user_id.as_str()));
    }
    if let Some(ref mailing_id) = filter.mailing_id {
        q = q.filter(Column::MailingId.eq(mailing_id.as_str()));
    }
    if let Some(status) = filter.status {
        q = q.filter(Column::Status.eq(status.as_str()));
    }
    q
}

impl MailStore {
    /// Appends one attempt row. `attempted_at` is stamped here, at
    /// creation time; attempt rows are never updated afterwards.
    pub async fn insert_send_attempt(&self, att: &SendAttemptRow) -> Result<SendAttemptRow> {
        let now = Utc::now().fixed_offset();
        let am = send_attempt::ActiveModel {
            id: Set(att.id.clone()),
            attempted_at: Set(now),
            status: Set(att.status.as_str().to_owned()),
            server_response: Set(att.server_response.clone()),
            mailing_id: Set(att.mailing_id.clone()),
            recipient_id: Set(att.recipient_id.clone()),
            message_id: Set(att.message_id.clone()),
            owner_id: Set(att.owner_id.clone()),
            created_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_attempt(model))
    }

    /// Lists visible attempts in insertion order.
    pub async fn list_send_attempts(
        &self,
        scope: &OwnerScope,
        filter: &SendAttemptFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SendAttemptRow>> {
        let rows = apply_filter(Entity::find(), scope, filter)
            .order_by(Column::AttemptedAt, Order::Asc)
            .order_by(Column::Id, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_attempt).collect())
    }

    pub async fn count_send_attempts(
        &self,
        scope: &OwnerScope,
        filter: &SendAttemptFilter,
    ) -> Result<u64> {
        Ok(apply_filter(Entity::find(), scope, filter)
            .count(self.db())
            .await?)
    }

    /// Attempt count for one owner, optionally narrowed to one outcome.
    pub async fn count_attempts_by_owner(
        &self,
        owner_id: &str,
        status: Option<AttemptStatus>,
    ) -> Result<u64> {
        let mut q = Entity::find().filter(Column::OwnerId.eq(owner_id));
        if let Some(status) = status {
            q = q.filter(Column::Status.eq(status.as_str()));
        }
        Ok(q.count(self.db()).await?)
    }
}
