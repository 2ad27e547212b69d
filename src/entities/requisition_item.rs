use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-item status.
///
/// The classification outcome (in stock / requires purchase) lives in this
/// tagged status, not in duplicated boolean columns; the [`Model::en_stock`]
/// and [`Model::requiere_compra`] accessors exist only for the
/// serialization boundary.
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
pub enum ItemStatus {
    #[sea_orm(string_value = "PENDIENTE_CLASIFICACION")]
    PendienteClasificacion,
    #[sea_orm(string_value = "EN_STOCK")]
    EnStock,
    #[sea_orm(string_value = "REQUIERE_COMPRA")]
    RequiereCompra,
    #[sea_orm(string_value = "PENDIENTE_VALIDACION_ADMIN")]
    PendienteValidacionAdmin,
    #[sea_orm(string_value = "APROBADO_COMPRA")]
    AprobadoCompra,
    #[sea_orm(string_value = "RECHAZADO_COMPRA")]
    RechazadoCompra,
    #[sea_orm(string_value = "LISTO_PARA_DESPACHO")]
    ListoParaDespacho,
    #[sea_orm(string_value = "DESPACHO_PARCIAL")]
    DespachoParcial,
    #[sea_orm(string_value = "DESPACHADO")]
    Despachado,
}

impl ItemStatus {
    /// `RechazadoCompra` is absorbing: no transition out of it is ever
    /// permitted for any role.
    pub fn is_absorbing(self) -> bool {
        self == ItemStatus::RechazadoCompra
    }

    /// Item statuses from which quantities may be placed on a lot.
    pub fn is_dispatchable(self) -> bool {
        matches!(
            self,
            ItemStatus::ListoParaDespacho | ItemStatus::DespachoParcial
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requisition_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub requisition_id: Uuid,

    pub description: String,
    pub unit: String,

    /// Requested quantity; always positive.
    pub cantidad_solicitada: i32,

    /// Approved quantity, set once at classification; never exceeds
    /// `cantidad_solicitada`.
    pub cantidad_aprobada: Option<i32>,

    pub status: ItemStatus,

    /// Warehouse receipt flag for purchased goods.
    pub compra_recibida: bool,

    /// Soft delete. Once set, the item is permanently excluded from all
    /// aggregation and listing.
    pub eliminado: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// The quantity that must be fully dispatched and received:
    /// `cantidad_aprobada` once classified, `cantidad_solicitada` before.
    pub fn required_quantity(&self) -> i32 {
        self.cantidad_aprobada.unwrap_or(self.cantidad_solicitada)
    }

    pub fn en_stock(&self) -> bool {
        matches!(
            self.status,
            ItemStatus::EnStock | ItemStatus::ListoParaDespacho
        )
    }

    pub fn requiere_compra(&self) -> bool {
        matches!(
            self.status,
            ItemStatus::RequiereCompra
                | ItemStatus::PendienteValidacionAdmin
                | ItemStatus::AprobadoCompra
                | ItemStatus::RechazadoCompra
        )
    }
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
    #[sea_orm(has_many = "super::item_modification::Entity")]
    Modifications,
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

impl Related<super::item_modification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Modifications.def()
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
