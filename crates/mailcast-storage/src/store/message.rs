use anyhow::Result;
use chrono::{DateTime, Utc};
use mailcast_common::types::OwnerScope;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::message::{self, Column, Entity};
use crate::store::MailStore;

/// Message data row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub subject: String,
    pub body: String,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message update request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageUpdate {
    pub subject: Option<String>,
    pub body: Option<String>,
}

pub(crate) fn model_to_message(m: message::Model) -> MessageRow {
    MessageRow {
        id: m.id,
        subject: m.subject,
        body: m.body,
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
    pub async fn insert_message(&self, msg: &MessageRow) -> Result<MessageRow> {
        let now = Utc::now().fixed_offset();
        let am = message::ActiveModel {
            id: Set(msg.id.clone()),
            subject: Set(msg.subject.clone()),
            body: Set(msg.body.clone()),
            owner_id: Set(msg.owner_id.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_message(model))
    }

    pub async fn get_message_by_id(&self, id: &str) -> Result<Option<MessageRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(model_to_message))
    }

    /// Lists visible messages, ordered by subject.
    pub async fn list_messages(
        &self,
        scope: &OwnerScope,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageRow>> {
        let rows = scoped(Entity::find(), scope)
            .order_by(Column::Subject, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_message).collect())
    }

    pub async fn count_messages(&self, scope: &OwnerScope) -> Result<u64> {
        Ok(scoped(Entity::find(), scope).count(self.db()).await?)
    }

    pub async fn update_message(
        &self,
        id: &str,
        upd: &MessageUpdate,
    ) -> Result<Option<MessageRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let mut am: message::ActiveModel = m.into();
            if let Some(ref subject) = upd.subject {
                am.subject = Set(subject.clone());
            }
            if let Some(ref body) = upd.body {
                am.body = Set(body.clone());
            }
            am.updated_at = Set(now);
            let updated = am.update(self.db()).await?;
            Ok(Some(model_to_message(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_message(&self, id: &str) -> Result<bool> {
        let res = Entity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }
}
