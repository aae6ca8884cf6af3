use anyhow::Result;
use chrono::{DateTime, Utc};
use mailcast_common::types::{MailingStatus, OwnerScope};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::mailing::{self, Column, Entity};
use crate::entities::mailing_recipient::{
    self, Column as JoinCol, Entity as JoinEntity,
};
use crate::store::recipient::model_to_recipient;
use crate::store::{MailStore, RecipientRow};

/// Mailing data row. The recipient set lives in the join table and is
/// queried separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailingRow {
    pub id: String,
    pub first_sent_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: MailingStatus,
    pub message_id: String,
    pub owner_id: Option<String>,
    pub total_sent: i32,
    pub successful_sends: i32,
    pub failed_sends: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mailing update request.
///
/// `end_at` is doubly optional: `None` leaves the field untouched,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct MailingUpdate {
    pub end_at: Option<Option<DateTime<Utc>>>,
    pub message_id: Option<String>,
    pub recipient_ids: Option<Vec<String>>,
}

fn model_to_mailing(m: mailing::Model) -> MailingRow {
    MailingRow {
        id: m.id,
        first_sent_at: m.first_sent_at.map(|t| t.with_timezone(&Utc)),
        end_at: m.end_at.map(|t| t.with_timezone(&Utc)),
        status: m.status.parse().unwrap_or(MailingStatus::Created),
        message_id: m.message_id,
        owner_id: m.owner_id,
        total_sent: m.total_sent,
        successful_sends: m.successful_sends,
        failed_sends: m.failed_sends,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn scoped(q: sea_orm::Select<Entity>, scope: &OwnerScope) -> sea_orm::Select<Entity> {
    if scope.is_manager {
        q
    } else {
        q.filter(Column::OwnerId.eq(scope.user_id.as_str()))
    }
}

impl MailStore {
    pub async fn insert_mailing(
        &self,
        m: &MailingRow,
        recipient_ids: &[String],
    ) -> Result<MailingRow> {
        let now = Utc::now().fixed_offset();
        let am = mailing::ActiveModel {
            id: Set(m.id.clone()),
            first_sent_at: Set(None),
            end_at: Set(m.end_at.map(|t| t.fixed_offset())),
            status: Set(MailingStatus::Created.as_str().to_owned()),
            message_id: Set(m.message_id.clone()),
            owner_id: Set(m.owner_id.clone()),
            total_sent: Set(0),
            successful_sends: Set(0),
            failed_sends: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        for rid in recipient_ids {
            let join = mailing_recipient::ActiveModel {
                mailing_id: Set(m.id.clone()),
                recipient_id: Set(rid.clone()),
            };
            join.insert(self.db()).await?;
        }
        Ok(model_to_mailing(model))
    }

    pub async fn get_mailing_by_id(&self, id: &str) -> Result<Option<MailingRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(model_to_mailing))
    }

    /// Lists visible mailings in insertion order.
    pub async fn list_mailings(
        &self,
        scope: &OwnerScope,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MailingRow>> {
        let rows = scoped(Entity::find(), scope)
            .order_by(Column::CreatedAt, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_mailing).collect())
    }

    pub async fn count_mailings(&self, scope: &OwnerScope) -> Result<u64> {
        Ok(scoped(Entity::find(), scope).count(self.db()).await?)
    }

    pub async fn count_all_mailings(&self) -> Result<u64> {
        Ok(Entity::find().count(self.db()).await?)
    }

    pub async fn count_mailings_with_status(&self, status: MailingStatus) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::Status.eq(status.as_str()))
            .count(self.db())
            .await?)
    }

    pub async fn list_mailing_recipient_ids(&self, mailing_id: &str) -> Result<Vec<String>> {
        let rows = JoinEntity::find()
            .filter(JoinCol::MailingId.eq(mailing_id))
            .order_by(JoinCol::RecipientId, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(|r| r.recipient_id).collect())
    }

    /// A mailing's recipient set, ordered by email — the iteration order
    /// of a dispatch pass.
    pub async fn list_mailing_recipients(&self, mailing_id: &str) -> Result<Vec<RecipientRow>> {
        let ids = self.list_mailing_recipient_ids(mailing_id).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = crate::entities::recipient::Entity::find()
            .filter(
                crate::entities::recipient::Column::Id.is_in(ids.iter().map(String::as_str)),
            )
            .order_by(crate::entities::recipient::Column::Email, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_recipient).collect())
    }

    pub async fn set_mailing_recipients(
        &self,
        mailing_id: &str,
        recipient_ids: &[String],
    ) -> Result<()> {
        JoinEntity::delete_many()
            .filter(JoinCol::MailingId.eq(mailing_id))
            .exec(self.db())
            .await?;
        for rid in recipient_ids {
            let join = mailing_recipient::ActiveModel {
                mailing_id: Set(mailing_id.to_owned()),
                recipient_id: Set(rid.clone()),
            };
            join.insert(self.db()).await?;
        }
        Ok(())
    }

    /// Applies an edit to a mailing. Changing `end_at` to a different
    /// value forces the status back to `running`, even from `finished`;
    /// re-saving the same value leaves the status untouched.
    pub async fn update_mailing(
        &self,
        id: &str,
        upd: &MailingUpdate,
    ) -> Result<Option<MailingRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        let Some(m) = model else {
            return Ok(None);
        };
        let stored_end_at = m.end_at.map(|t| t.with_timezone(&Utc));
        let now = Utc::now().fixed_offset();
        let mut am: mailing::ActiveModel = m.into();
        if let Some(new_end_at) = upd.end_at {
            if new_end_at != stored_end_at {
                am.status = Set(MailingStatus::Running.as_str().to_owned());
            }
            am.end_at = Set(new_end_at.map(|t| t.fixed_offset()));
        }
        if let Some(ref message_id) = upd.message_id {
            am.message_id = Set(message_id.clone());
        }
        am.updated_at = Set(now);
        let updated = am.update(self.db()).await?;
        if let Some(ref ids) = upd.recipient_ids {
            self.set_mailing_recipients(id, ids).await?;
        }
        Ok(Some(model_to_mailing(updated)))
    }

    /// Writes the aggregate outcome of one dispatch pass: absolute counter
    /// values, the resulting status, and `first_sent_at`. The caller
    /// computes the counters from the row it loaded before the pass; this
    /// write is not atomic with the attempt rows inserted during the loop.
    pub async fn update_mailing_after_pass(
        &self,
        id: &str,
        total_sent: i32,
        successful_sends: i32,
        failed_sends: i32,
        status: MailingStatus,
        first_sent_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        let Some(m) = model else {
            anyhow::bail!("mailing '{id}' disappeared during dispatch");
        };
        let now = Utc::now().fixed_offset();
        let mut am: mailing::ActiveModel = m.into();
        am.total_sent = Set(total_sent);
        am.successful_sends = Set(successful_sends);
        am.failed_sends = Set(failed_sends);
        am.status = Set(status.as_str().to_owned());
        am.first_sent_at = Set(first_sent_at.map(|t| t.fixed_offset()));
        am.updated_at = Set(now);
        am.update(self.db()).await?;
        Ok(())
    }

    pub async fn delete_mailing(&self, id: &str) -> Result<bool> {
        let res = Entity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }
}
