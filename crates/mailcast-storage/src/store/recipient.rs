use anyhow::Result;
use chrono::{DateTime, Utc};
use mailcast_common::types::OwnerScope;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::recipient::{self, Column, Entity};
use crate::store::MailStore;

/// Recipient data row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub comment: String,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Recipient update request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipientUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub comment: Option<String>,
}

pub(crate) fn model_to_recipient(m: recipient::Model) -> RecipientRow {
    RecipientRow {
        id: m.id,
        email: m.email,
        full_name: m.full_name,
        comment: m.comment,
        owner_id: m.owner_id,
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
    pub async fn insert_recipient(&self, rec: &RecipientRow) -> Result<RecipientRow> {
        let now = Utc::now().fixed_offset();
        let am = recipient::ActiveModel {
            id: Set(rec.id.clone()),
            email: Set(rec.email.clone()),
            full_name: Set(rec.full_name.clone()),
            comment: Set(rec.comment.clone()),
            owner_id: Set(rec.owner_id.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_recipient(model))
    }

    pub async fn get_recipient_by_id(&self, id: &str) -> Result<Option<RecipientRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(model_to_recipient))
    }

    pub async fn get_recipient_by_email(&self, email: &str) -> Result<Option<RecipientRow>> {
        let model = Entity::find()
            .filter(Column::Email.eq(email))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_recipient))
    }

    /// Lists visible recipients, ordered by email.
    pub async fn list_recipients(
        &self,
        scope: &OwnerScope,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecipientRow>> {
        let rows = scoped(Entity::find(), scope)
            .order_by(Column::Email, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_recipient).collect())
    }

    pub async fn count_recipients(&self, scope: &OwnerScope) -> Result<u64> {
        Ok(scoped(Entity::find(), scope).count(self.db()).await?)
    }

    /// Total recipient count regardless of owner. Emails are unique
    /// store-wide, so this is also the distinct-email count.
    pub async fn count_all_recipients(&self) -> Result<u64> {
        Ok(Entity::find().count(self.db()).await?)
    }

    pub async fn list_recipients_by_ids(&self, ids: &[String]) -> Result<Vec<RecipientRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = Entity::find()
            .filter(Column::Id.is_in(ids.iter().map(String::as_str)))
            .order_by(Column::Email, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_recipient).collect())
    }

    pub async fn update_recipient(
        &self,
        id: &str,
        upd: &RecipientUpdate,
    ) -> Result<Option<RecipientRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let mut am: recipient::ActiveModel = m.into();
            if let Some(ref email) = upd.email {
                am.email = Set(email.clone());
            }
            if let Some(ref full_name) = upd.full_name {
                am.full_name = Set(full_name.clone());
            }
            if let Some(ref comment) = upd.comment {
                am.comment = Set(comment.clone());
            }
            am.updated_at = Set(now);
            let updated = am.update(self.db()).await?;
            Ok(Some(model_to_recipient(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_recipient(&self, id: &str) -> Result<bool> {
        let res = Entity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }
}
