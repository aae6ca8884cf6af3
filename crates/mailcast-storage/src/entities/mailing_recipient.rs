use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "mailing_recipients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub mailing_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub recipient_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::mailing::Entity",
        from = "Column::MailingId",
        to = "super::mailing::Column::Id"
    )]
    Mailing,
    #[sea_orm(
        belongs_to = "super::recipient::Entity",
        from = "Column::RecipientId",
        to = "super::recipient::Column::Id"
    )]
    Recipient,
}

impl Related<super::mailing::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mailing.def()
    }
}

impl Related<super::recipient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
