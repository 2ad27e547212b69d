use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Actor;
use crate::db::DbPool;
use crate::entities::{history_entry, requisition, requisition_item};
use crate::entities::{ItemStatus, RequisitionStatus};
use crate::errors::WorkflowError;
use crate::events::{Event, EventSender};
use crate::services::items::NewItemInput;
use crate::services::{
    ensure_capability, load_active_items, load_requisition, numbering, record_history,
    set_requisition_status, Fanout,
};
use crate::workflow::approvals::{
    next_acting_role, next_status_from_approval, rejection_status, validate_rejection_reason,
};
use crate::workflow::permissions::{can_view, capabilities, VISIBLE_STATUSES};

lazy_static! {
    static ref REQUISITION_TRANSITIONS: IntCounter = IntCounter::new(
        "requisition_transitions_total",
        "Total number of requisition status transitions"
    )
    .expect("metric can be created");
    static ref REQUISITION_TRANSITION_FAILURES: IntCounter = IntCounter::new(
        "requisition_transition_failures_total",
        "Total number of denied or failed requisition transitions"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRequisitionInput {
    #[validate(length(min = 1, max = 100, message = "operating unit is required"))]
    pub operating_unit: String,

    #[validate(length(min = 1, max = 100, message = "cost center is required"))]
    pub cost_center: String,

    #[validate(length(min = 1, max = 2000, message = "reason is required"))]
    pub reason: String,

    pub items: Vec<NewItemInput>,
}

/// Service owning the requisition-level status machine.
#[derive(Clone)]
pub struct RequisitionService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    fanout: Fanout,
}

impl RequisitionService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, fanout: Fanout) -> Self {
        Self {
            db,
            event_sender,
            fanout,
        }
    }

    /// Creates a requisition in `Borrador` owned by the actor, with its
    /// initial items, and assigns the sequential number.
    #[instrument(skip(self, input), fields(actor_id = %actor.id))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: CreateRequisitionInput,
    ) -> Result<requisition::Model, WorkflowError> {
        input.validate()?;
        for item in &input.items {
            item.validate()?;
        }

        let txn = self.db.begin().await?;

        let number = numbering::next_requisition_number(&txn).await?;
        let created = requisition::ActiveModel {
            id: Set(Uuid::new_v4()),
            number: Set(number),
            requester_id: Set(actor.id),
            operating_unit: Set(input.operating_unit),
            cost_center: Set(input.cost_center),
            reason: Set(input.reason),
            status: Set(RequisitionStatus::Borrador),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for item in input.items {
            requisition_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                requisition_id: Set(created.id),
                description: Set(item.description),
                unit: Set(item.unit),
                cantidad_solicitada: Set(item.cantidad_solicitada),
                cantidad_aprobada: Set(None),
                status: Set(ItemStatus::PendienteClasificacion),
                compra_recibida: Set(false),
                eliminado: Set(false),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        record_history(
            &txn,
            created.id,
            None,
            RequisitionStatus::Borrador,
            actor.id,
            None,
        )
        .await?;

        txn.commit().await?;

        info!(requisition_id = %created.id, number = %created.number, "requisition created");
        let _ = self
            .event_sender
            .send(Event::RequisitionCreated(created.id))
            .await;

        Ok(created)
    }

    /// Fetches one requisition, enforcing the visibility table.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
    ) -> Result<requisition::Model, WorkflowError> {
        let requisition = load_requisition(&*self.db, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        if !can_view(requisition.status, actor.role, is_owner) {
            return Err(WorkflowError::PermissionDenied(format!(
                "role {} may not view requisitions in status {}",
                actor.role, requisition.status
            )));
        }
        Ok(requisition)
    }

    /// Lists requisitions the actor may see: their own, plus those whose
    /// status is in the role's visibility set.
    #[instrument(skip(self))]
    pub async fn list_for_actor(
        &self,
        actor: &Actor,
    ) -> Result<Vec<requisition::Model>, WorkflowError> {
        let mut query = requisition::Entity::find();

        if !actor.is_admin() {
            let mut cond =
                Condition::any().add(requisition::Column::RequesterId.eq(actor.id));
            if let Some(visible) = VISIBLE_STATUSES.get(&actor.role) {
                if !visible.is_empty() {
                    cond = cond.add(
                        requisition::Column::Status
                            .is_in(visible.iter().copied().collect::<Vec<_>>()),
                    );
                }
            }
            query = query.filter(cond);
        }

        Ok(query
            .order_by_desc(requisition::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// The append-only transition history, oldest first.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
    ) -> Result<Vec<history_entry::Model>, WorkflowError> {
        // Visibility is the same as for the requisition itself.
        self.get(actor, requisition_id).await?;
        Ok(history_entry::Entity::find()
            .filter(history_entry::Column::RequisitionId.eq(requisition_id))
            .order_by_asc(history_entry::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Submits a draft for safety validation. Requires at least one
    /// non-deleted item.
    #[instrument(skip(self))]
    pub async fn submit(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
    ) -> Result<requisition::Model, WorkflowError> {
        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).edit,
            "submit this requisition",
        )?;

        if requisition.status != RequisitionStatus::Borrador {
            REQUISITION_TRANSITION_FAILURES.inc();
            return Err(WorkflowError::transition_denied(
                requisition.status,
                RequisitionStatus::ValidacionSeguridad,
                "only drafts can be submitted",
            ));
        }
        if load_active_items(&txn, requisition_id).await?.is_empty() {
            return Err(WorkflowError::validation(
                "items",
                "at least one item is required before submission",
            ));
        }

        let updated = set_requisition_status(
            &txn,
            requisition,
            RequisitionStatus::ValidacionSeguridad,
            actor,
            None,
        )
        .await?;
        txn.commit().await?;

        REQUISITION_TRANSITIONS.inc();
        info!(requisition_id = %updated.id, "requisition submitted for safety validation");
        let _ = self
            .event_sender
            .send(Event::RequisitionSubmitted(updated.id))
            .await;
        self.fanout
            .notify_role(
                crate::auth::Role::Seguridad,
                "Requisition awaiting safety validation",
                &format!("Requisition {} is ready for safety review", updated.number),
                updated.id,
            )
            .await;

        Ok(updated)
    }

    /// Single-step stage approval per the simplified transition table. The
    /// pass-through approved status is recorded in history; the requisition
    /// rests in the next review stage.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        comment: Option<String>,
    ) -> Result<requisition::Model, WorkflowError> {
        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).approve,
            "approve this requisition",
        )?;

        let Some((pass_through, next)) = next_status_from_approval(requisition.status) else {
            REQUISITION_TRANSITION_FAILURES.inc();
            return Err(WorkflowError::transition_denied(
                requisition.status,
                requisition.status,
                "no approval transition is defined for this status",
            ));
        };

        let old = requisition.status;
        record_history(
            &txn,
            requisition.id,
            Some(old),
            pass_through,
            actor.id,
            comment,
        )
        .await?;

        let mut active: requisition::ActiveModel = requisition.into();
        active.status = Set(next);
        let updated = active.update(&txn).await?;
        record_history(&txn, updated.id, Some(pass_through), next, actor.id, None).await?;

        txn.commit().await?;

        REQUISITION_TRANSITIONS.inc();
        info!(
            requisition_id = %updated.id,
            old_status = %old,
            new_status = %next,
            "requisition approved"
        );
        let _ = self
            .event_sender
            .send(Event::RequisitionStatusChanged {
                requisition_id: updated.id,
                old_status: old.to_string(),
                new_status: next.to_string(),
            })
            .await;

        if let Some(role) = next_acting_role(next) {
            self.fanout
                .notify_role(
                    role,
                    "Requisition awaiting your review",
                    &format!("Requisition {} moved to {}", updated.number, next),
                    updated.id,
                )
                .await;
        }

        Ok(updated)
    }

    /// Stage rejection: terminal, requires a comment of at least ten
    /// characters, and notifies the requester.
    #[instrument(skip(self, reason))]
    pub async fn reject(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        reason: String,
    ) -> Result<requisition::Model, WorkflowError> {
        validate_rejection_reason("reason", &reason)?;

        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).reject,
            "reject this requisition",
        )?;

        let Some(target) = rejection_status(requisition.status) else {
            REQUISITION_TRANSITION_FAILURES.inc();
            return Err(WorkflowError::transition_denied(
                requisition.status,
                requisition.status,
                "no rejection transition is defined for this status",
            ));
        };

        let old = requisition.status;
        let updated =
            set_requisition_status(&txn, requisition, target, actor, Some(reason)).await?;
        txn.commit().await?;

        REQUISITION_TRANSITIONS.inc();
        info!(requisition_id = %updated.id, stage = %old, "requisition rejected");
        let _ = self
            .event_sender
            .send(Event::RequisitionRejected {
                requisition_id: updated.id,
                stage: old.to_string(),
            })
            .await;
        self.fanout
            .notify_user(
                updated.requester_id,
                "Requisition rejected",
                &format!("Requisition {} was rejected at {}", updated.number, old),
                updated.id,
            )
            .await;

        Ok(updated)
    }

    /// Cancels a draft. Only drafts can be cancelled; everything past
    /// submission must flow through the review stages.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        comment: Option<String>,
    ) -> Result<requisition::Model, WorkflowError> {
        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).delete,
            "cancel this requisition",
        )?;

        if requisition.status != RequisitionStatus::Borrador {
            REQUISITION_TRANSITION_FAILURES.inc();
            return Err(WorkflowError::transition_denied(
                requisition.status,
                RequisitionStatus::Cancelado,
                "only drafts can be cancelled",
            ));
        }

        let old = requisition.status;
        let updated =
            set_requisition_status(&txn, requisition, RequisitionStatus::Cancelado, actor, comment)
                .await?;
        txn.commit().await?;

        REQUISITION_TRANSITIONS.inc();
        let _ = self
            .event_sender
            .send(Event::RequisitionStatusChanged {
                requisition_id: updated.id,
                old_status: old.to_string(),
                new_status: RequisitionStatus::Cancelado.to_string(),
            })
            .await;

        Ok(updated)
    }
}
