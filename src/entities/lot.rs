use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shipment (lot) status.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    #[sea_orm(string_value = "PENDIENTE")]
    Pendiente,
    #[sea_orm(string_value = "PREPARADO")]
    Preparado,
    #[sea_orm(string_value = "DESPACHADO")]
    Despachado,
    #[sea_orm(string_value = "EN_TRANSITO")]
    EnTransito,
    #[sea_orm(string_value = "PENDIENTE_RECEPCION")]
    PendienteRecepcion,
    #[sea_orm(string_value = "ENTREGADO")]
    Entregado,
    #[sea_orm(string_value = "ANULADO")]
    Anulado,
}

impl LotStatus {
    /// Voided lots are excluded from every reconciliation sum.
    pub fn is_void(self) -> bool {
        self == LotStatus::Anulado
    }

    /// Statuses whose shipped quantities count toward `total_dispatched`.
    /// `PendienteRecepcion` is post-dispatch: the goods left the warehouse.
    pub fn counts_as_dispatched(self) -> bool {
        matches!(
            self,
            LotStatus::Despachado
                | LotStatus::EnTransito
                | LotStatus::PendienteRecepcion
                | LotStatus::Entregado
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "lots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub requisition_id: Uuid,

    /// Sequential per-requisition lot number, starting at 1.
    pub numero_lote: i32,

    pub status: LotStatus,

    pub carrier: Option<String>,
    pub destination: Option<String>,
    pub observations: Option<String>,

    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::requisition::Entity",
        from = "Column::RequisitionId",
        to = "super::requisition::Column::Id"
    )]
    Requisition,
    #[sea_orm(has_many = "super::lot_item::Entity")]
    LotItems,
}

impl Related<super::requisition::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Requisition.def()
    }
}

impl Related<super::lot_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LotItems.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }

        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}
