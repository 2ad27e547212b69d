use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One item's quantity on one lot. `cantidad_enviada` is fixed at lot
/// creation; `cantidad_recibida` is set only at receipt confirmation and
/// defaults to the shipped quantity when the receiver does not override it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "lot_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub lot_id: Uuid,
    pub item_id: Uuid,

    pub cantidad_enviada: i32,
    pub cantidad_recibida: Option<i32>,

    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Received quantity with the shipped-quantity default applied.
    pub fn received_or_shipped(&self) -> i32 {
        self.cantidad_recibida.unwrap_or(self.cantidad_enviada)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lot::Entity",
        from = "Column::LotId",
        to = "super::lot::Column::Id"
    )]
    Lot,
    #[sea_orm(
        belongs_to = "super::requisition_item::Entity",
        from = "Column::ItemId",
        to = "super::requisition_item::Column::Id"
    )]
    Item,
}

impl Related<super::lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lot.def()
    }
}

impl Related<super::requisition_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }
        Ok(active_model)
    }
}
