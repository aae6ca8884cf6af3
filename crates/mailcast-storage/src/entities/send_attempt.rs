use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "send_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub attempted_at: DateTimeWithTimeZone,
    pub status: String,
    pub server_response: String,
    pub mailing_id: String,
    pub recipient_id: Option<String>,
    pub message_id: Option<String>,
    pub owner_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::mailing::Entity",
        from = "Column::MailingId",
        to = "super::mailing::Column::Id"
    )]
    Mailing,
}

impl Related<super::mailing::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mailing.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
