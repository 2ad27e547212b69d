use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Requisition-level status.
///
/// Linear happy path with two decision points; `Rechazado*`, `Entregado`
/// and `Cancelado` are terminal. `AprobadoSeguridad` and `AprobadoGerencia`
/// are pass-through statuses: they are recorded in history but the
/// requisition never rests in them.
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
pub enum RequisitionStatus {
    #[sea_orm(string_value = "BORRADOR")]
    Borrador,
    #[sea_orm(string_value = "VALIDACION_SEGURIDAD")]
    ValidacionSeguridad,
    #[sea_orm(string_value = "APROBADO_SEGURIDAD")]
    AprobadoSeguridad,
    #[sea_orm(string_value = "RECHAZADO_SEGURIDAD")]
    RechazadoSeguridad,
    #[sea_orm(string_value = "VALIDACION_GERENCIA")]
    ValidacionGerencia,
    #[sea_orm(string_value = "APROBADO_GERENCIA")]
    AprobadoGerencia,
    #[sea_orm(string_value = "RECHAZADO_GERENCIA")]
    RechazadoGerencia,
    #[sea_orm(string_value = "REVISION_LOGISTICA")]
    RevisionLogistica,
    #[sea_orm(string_value = "EN_COMPRA")]
    EnCompra,
    #[sea_orm(string_value = "APROBADO_ADM")]
    AprobadoAdm,
    #[sea_orm(string_value = "RECHAZADO_ADM")]
    RechazadoAdm,
    #[sea_orm(string_value = "LISTO_DESPACHO")]
    ListoDespacho,
    #[sea_orm(string_value = "ENVIADO")]
    Enviado,
    #[sea_orm(string_value = "ENTREGADO_PARCIAL")]
    EntregadoParcial,
    #[sea_orm(string_value = "ENTREGADO")]
    Entregado,
    #[sea_orm(string_value = "CANCELADO")]
    Cancelado,
}

impl RequisitionStatus {
    /// Terminal statuses admit no further transition of any kind.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequisitionStatus::RechazadoSeguridad
                | RequisitionStatus::RechazadoGerencia
                | RequisitionStatus::RechazadoAdm
                | RequisitionStatus::Entregado
                | RequisitionStatus::Cancelado
        )
    }

    /// True once logistics review has begun. From this point on the
    /// requisition status is derived from the item aggregate, never from
    /// direct approval actions alone.
    pub fn has_reached_logistics(self) -> bool {
        matches!(
            self,
            RequisitionStatus::RevisionLogistica
                | RequisitionStatus::EnCompra
                | RequisitionStatus::AprobadoAdm
                | RequisitionStatus::ListoDespacho
                | RequisitionStatus::Enviado
                | RequisitionStatus::EntregadoParcial
        )
    }

    /// The wide status band in which dispatch- and delivery-related
    /// capabilities are granted. The true gate for those actions is the
    /// item's status, not the requisition's, so logistics can keep
    /// dispatching in-stock items while others are still mid-procurement.
    pub fn in_dispatch_band(self) -> bool {
        self.has_reached_logistics()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "requisitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Sequential human-readable number (`REQ-YYYY-NNNN`), immutable once
    /// assigned.
    #[sea_orm(unique)]
    #[validate(length(min = 1, max = 20))]
    pub number: String,

    pub requester_id: Uuid,

    #[validate(length(min = 1, max = 100))]
    pub operating_unit: String,

    #[validate(length(min = 1, max = 100))]
    pub cost_center: String,

    #[validate(length(min = 1, max = 2000))]
    pub reason: String,

    pub status: RequisitionStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::requisition_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::lot::Entity")]
    Lots,
    #[sea_orm(has_many = "super::history_entry::Entity")]
    History,
}

impl Related<super::requisition_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lots.def()
    }
}

impl Related<super::history_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::History.def()
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
