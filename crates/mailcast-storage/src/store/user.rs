use anyhow::Result;
use chrono::{DateTime, Utc};
use mailcast_common::types::UserRole;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::user::{self, Column, Entity};
use crate::store::MailStore;

/// Account data row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub country: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_blocked: bool,
    pub token_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields a user may edit about themselves.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub country: Option<String>,
}

fn model_to_user(m: user::Model) -> UserRow {
    UserRow {
        id: m.id,
        email: m.email,
        password_hash: m.password_hash,
        display_name: m.display_name,
        phone: m.phone,
        avatar: m.avatar,
        country: m.country,
        role: m.role.parse().unwrap_or(UserRole::Member),
        is_active: m.is_active,
        is_blocked: m.is_blocked,
        token_version: m.token_version,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl MailStore {
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: UserRole,
        is_active: bool,
    ) -> Result<UserRow> {
        let id = mailcast_common::id::next_id();
        let now = Utc::now().fixed_offset();
        let am = user::ActiveModel {
            id: Set(id),
            email: Set(email.to_owned()),
            password_hash: Set(password_hash.to_owned()),
            display_name: Set(None),
            phone: Set(None),
            avatar: Set(None),
            country: Set(None),
            role: Set(role.as_str().to_owned()),
            is_active: Set(is_active),
            is_blocked: Set(false),
            token_version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_user(model))
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(model_to_user))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        let model = Entity::find()
            .filter(Column::Email.eq(email))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_user))
    }

    /// Lists non-manager accounts, ordered by email.
    pub async fn list_members(&self, limit: usize, offset: usize) -> Result<Vec<UserRow>> {
        let rows = Entity::find()
            .filter(Column::Role.ne(UserRole::Manager.as_str()))
            .order_by(Column::Email, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_user).collect())
    }

    pub async fn count_members(&self) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::Role.ne(UserRole::Manager.as_str()))
            .count(self.db())
            .await?)
    }

    pub async fn count_users(&self) -> Result<u64> {
        Ok(Entity::find().count(self.db()).await?)
    }

    pub async fn update_user_profile(
        &self,
        id: &str,
        upd: &ProfileUpdate,
    ) -> Result<Option<UserRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let mut am: user::ActiveModel = m.into();
            if let Some(ref name) = upd.display_name {
                am.display_name = Set(Some(name.clone()));
            }
            if let Some(ref phone) = upd.phone {
                am.phone = Set(Some(phone.clone()));
            }
            if let Some(ref avatar) = upd.avatar {
                am.avatar = Set(Some(avatar.clone()));
            }
            if let Some(ref country) = upd.country {
                am.country = Set(Some(country.clone()));
            }
            am.updated_at = Set(now);
            let updated = am.update(self.db()).await?;
            Ok(Some(model_to_user(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn set_user_active(&self, id: &str, active: bool) -> Result<bool> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let mut am: user::ActiveModel = m.into();
            am.is_active = Set(active);
            am.updated_at = Set(now);
            am.update(self.db()).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub async fn set_user_blocked(&self, id: &str, blocked: bool) -> Result<bool> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let mut am: user::ActiveModel = m.into();
            am.is_blocked = Set(blocked);
            am.updated_at = Set(now);
            am.update(self.db()).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Replaces the password hash and bumps `token_version` so previously
    /// issued credentials can be invalidated.
    pub async fn update_user_password_hash(
        &self,
        id: &str,
        password_hash: &str,
    ) -> Result<bool> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let version = m.token_version;
            let mut am: user::ActiveModel = m.into();
            am.password_hash = Set(password_hash.to_owned());
            am.token_version = Set(version + 1);
            am.updated_at = Set(now);
            am.update(self.db()).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
