use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;

/// Sea-ORM Entity for the readings table
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "readings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "Text")]
    pub topic: String,
    #[sea_orm(column_type = "Text")]
    pub value: String,
    pub received_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Reading {
    fn from(model: Model) -> Self {
        let received_at: DateTime<Utc> = model.received_at.into();
        Self::new(model.topic, model.value, received_at)
    }
}

impl From<&crate::models::Reading> for ActiveModel {
    fn from(reading: &crate::models::Reading) -> Self {
        ActiveModel {
            id: NotSet,
            topic: Set(reading.topic().to_string()),
            value: Set(reading.value().to_string()),
            received_at: Set(reading.received_at().into()),
        }
    }
}
