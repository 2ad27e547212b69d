use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{Actor, Role};
use crate::db::DbPool;
use crate::entities::{item_modification, requisition_item};
use crate::entities::{ItemStatus, RequisitionStatus};
use crate::errors::{FieldError, WorkflowError};
use crate::events::{Event, EventSender};
use crate::services::{
    ensure_capability, load_active_items, load_requisition, record_item_modification,
    recompute_requisition_status, Fanout,
};
use crate::workflow::approvals::validate_rejection_reason;
use crate::workflow::item_transitions::check_transition;
use crate::workflow::permissions::capabilities;

lazy_static! {
    static ref ITEM_TRANSITIONS_TOTAL: IntCounter = IntCounter::new(
        "item_transitions_total",
        "Total number of item status transitions"
    )
    .expect("metric can be created");
    static ref ITEMS_CLASSIFIED_TOTAL: IntCounter = IntCounter::new(
        "items_classified_total",
        "Total number of items classified by logistics"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewItemInput {
    #[validate(length(min = 1, max = 500, message = "description is required"))]
    pub description: String,

    #[validate(length(min = 1, max = 50, message = "unit is required"))]
    pub unit: String,

    #[validate(range(min = 1, message = "requested quantity must be positive"))]
    pub cantidad_solicitada: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateItemInput {
    pub description: Option<String>,
    pub unit: Option<String>,
    pub cantidad_solicitada: Option<i32>,
}

/// Classification outcome chosen by logistics for one pending item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationDecision {
    EnStock,
    RequiereCompra,
}

impl ClassificationDecision {
    fn target(self) -> ItemStatus {
        match self {
            ClassificationDecision::EnStock => ItemStatus::EnStock,
            ClassificationDecision::RequiereCompra => ItemStatus::RequiereCompra,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationInput {
    pub item_id: Uuid,
    pub decision: ClassificationDecision,
    /// Approved quantity; defaults to the requested quantity when absent.
    pub cantidad_aprobada: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseDecisionInput {
    pub item_id: Uuid,
    pub approve: bool,
    /// Required when `approve` is false.
    pub reason: Option<String>,
}

/// Service owning the per-item status machine and the draft item CRUD.
#[derive(Clone)]
pub struct ItemService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    fanout: Fanout,
}

impl ItemService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, fanout: Fanout) -> Self {
        Self {
            db,
            event_sender,
            fanout,
        }
    }

    /// Non-deleted items of a requisition the actor may view.
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
    ) -> Result<Vec<requisition_item::Model>, WorkflowError> {
        let requisition = load_requisition(&*self.db, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).view,
            "view this requisition",
        )?;
        load_active_items(&*self.db, requisition_id).await
    }

    /// Adds an item to a draft.
    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        input: NewItemInput,
    ) -> Result<requisition_item::Model, WorkflowError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        self.ensure_draft_item_access(&requisition, actor)?;

        let created = requisition_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            requisition_id: Set(requisition_id),
            description: Set(input.description),
            unit: Set(input.unit),
            cantidad_solicitada: Set(input.cantidad_solicitada),
            cantidad_aprobada: Set(None),
            status: Set(ItemStatus::PendienteClasificacion),
            compra_recibida: Set(false),
            eliminado: Set(false),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        Ok(created)
    }

    /// Edits a draft item, recording one modification row per changed field.
    #[instrument(skip(self, input))]
    pub async fn update_item(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        item_id: Uuid,
        input: UpdateItemInput,
    ) -> Result<requisition_item::Model, WorkflowError> {
        if let Some(qty) = input.cantidad_solicitada {
            if qty < 1 {
                return Err(WorkflowError::validation(
                    "cantidad_solicitada",
                    "requested quantity must be positive",
                ));
            }
        }

        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        self.ensure_draft_item_access(&requisition, actor)?;
        let item = load_item(&txn, requisition_id, item_id).await?;

        let mut active: requisition_item::ActiveModel = item.clone().into();
        if let Some(description) = input.description {
            if description != item.description {
                record_item_modification(
                    &txn,
                    item.id,
                    "description",
                    Some(item.description.clone()),
                    Some(description.clone()),
                    actor.id,
                    None,
                )
                .await?;
                active.description = Set(description);
            }
        }
        if let Some(unit) = input.unit {
            if unit != item.unit {
                record_item_modification(
                    &txn,
                    item.id,
                    "unit",
                    Some(item.unit.clone()),
                    Some(unit.clone()),
                    actor.id,
                    None,
                )
                .await?;
                active.unit = Set(unit);
            }
        }
        if let Some(qty) = input.cantidad_solicitada {
            if qty != item.cantidad_solicitada {
                record_item_modification(
                    &txn,
                    item.id,
                    "cantidad_solicitada",
                    Some(item.cantidad_solicitada.to_string()),
                    Some(qty.to_string()),
                    actor.id,
                    None,
                )
                .await?;
                active.cantidad_solicitada = Set(qty);
            }
        }

        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Soft-deletes a draft item. The row stays for audit but disappears
    /// from every listing and aggregation.
    #[instrument(skip(self))]
    pub async fn delete_item(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        item_id: Uuid,
    ) -> Result<(), WorkflowError> {
        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        self.ensure_draft_item_access(&requisition, actor)?;
        let item = load_item(&txn, requisition_id, item_id).await?;

        record_item_modification(
            &txn,
            item.id,
            "eliminado",
            Some("false".to_string()),
            Some("true".to_string()),
            actor.id,
            None,
        )
        .await?;
        let mut active: requisition_item::ActiveModel = item.into();
        active.eliminado = Set(true);
        active.update(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Classifies a batch of pending items in one transaction. In-stock
    /// items are promoted straight to the dispatch queue; purchase items
    /// move on to administration validation. Quantity errors across the
    /// batch are accumulated and reported together, and any single failure
    /// rolls the whole batch back.
    #[instrument(skip(self, decisions), fields(count = decisions.len()))]
    pub async fn classify(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        decisions: Vec<ClassificationInput>,
    ) -> Result<Vec<requisition_item::Model>, WorkflowError> {
        if decisions.is_empty() {
            return Err(WorkflowError::validation(
                "items",
                "at least one classification decision is required",
            ));
        }

        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).mark_stock,
            "classify items",
        )?;

        let mut field_errors: Vec<FieldError> = Vec::new();
        let mut loaded = Vec::with_capacity(decisions.len());
        for decision in &decisions {
            let item = load_item(&txn, requisition_id, decision.item_id).await?;
            if let Some(approved) = decision.cantidad_aprobada {
                if approved < 1 || approved > item.cantidad_solicitada {
                    field_errors.push(FieldError::new(
                        format!("items.{}.cantidad_aprobada", item.id),
                        format!(
                            "approved quantity must be between 1 and {}",
                            item.cantidad_solicitada
                        ),
                    ));
                }
            }
            loaded.push(item);
        }
        if !field_errors.is_empty() {
            return Err(WorkflowError::ValidationFailed(field_errors));
        }

        let mut updated = Vec::with_capacity(decisions.len());
        let mut purchases = 0usize;
        for (decision, item) in decisions.iter().zip(loaded) {
            let classified = decision.decision.target();
            check_transition(item.status, classified, actor.role)?;

            // Each classified item moves straight to the next actionable
            // status, so the aggregate never rests on the intermediate one.
            let promoted = match classified {
                ItemStatus::EnStock => ItemStatus::ListoParaDespacho,
                _ => ItemStatus::PendienteValidacionAdmin,
            };
            check_transition(classified, promoted, actor.role)?;
            if promoted == ItemStatus::PendienteValidacionAdmin {
                purchases += 1;
            }

            record_item_modification(
                &txn,
                item.id,
                "status",
                Some(item.status.to_string()),
                Some(promoted.to_string()),
                actor.id,
                None,
            )
            .await?;

            // The approved quantity is fixed here, defaulting to the
            // requested quantity when logistics does not trim it.
            let approved = decision
                .cantidad_aprobada
                .unwrap_or(item.cantidad_solicitada);
            let mut active: requisition_item::ActiveModel = item.into();
            active.status = Set(promoted);
            active.cantidad_aprobada = Set(Some(approved));
            updated.push(active.update(&txn).await?);
            ITEM_TRANSITIONS_TOTAL.inc();
        }

        let (requisition, change) =
            recompute_requisition_status(&txn, requisition, actor).await?;
        txn.commit().await?;

        ITEMS_CLASSIFIED_TOTAL.inc_by(updated.len() as u64);
        info!(
            requisition_id = %requisition.id,
            classified = updated.len(),
            purchases,
            "items classified"
        );
        let _ = self
            .event_sender
            .send(Event::ItemsClassified {
                requisition_id: requisition.id,
                count: updated.len(),
            })
            .await;
        self.emit_status_change(requisition.id, change).await;

        if purchases > 0 {
            self.fanout
                .notify_role(
                    Role::Administracion,
                    "Purchases awaiting validation",
                    &format!(
                        "Requisition {} has {} item(s) pending purchase validation",
                        requisition.number, purchases
                    ),
                    requisition.id,
                )
                .await;
        }

        Ok(updated)
    }

    /// Administration's batch decision over purchase-pending items. Each
    /// rejection requires its own reason; the batch is all-or-nothing.
    #[instrument(skip(self, decisions), fields(count = decisions.len()))]
    pub async fn validate_purchases(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        decisions: Vec<PurchaseDecisionInput>,
    ) -> Result<Vec<requisition_item::Model>, WorkflowError> {
        if decisions.is_empty() {
            return Err(WorkflowError::validation(
                "items",
                "at least one purchase decision is required",
            ));
        }

        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).validate_purchase,
            "validate purchases",
        )?;

        let mut field_errors: Vec<FieldError> = Vec::new();
        for decision in &decisions {
            if !decision.approve {
                let reason = decision.reason.as_deref().unwrap_or("");
                if let Err(WorkflowError::ValidationFailed(mut errs)) = validate_rejection_reason(
                    &format!("items.{}.reason", decision.item_id),
                    reason,
                ) {
                    field_errors.append(&mut errs);
                }
            }
        }
        if !field_errors.is_empty() {
            return Err(WorkflowError::ValidationFailed(field_errors));
        }

        let mut updated = Vec::with_capacity(decisions.len());
        let mut approved = 0usize;
        let mut rejected = 0usize;
        for decision in &decisions {
            let item = load_item(&txn, requisition_id, decision.item_id).await?;
            let target = if decision.approve {
                approved += 1;
                ItemStatus::AprobadoCompra
            } else {
                rejected += 1;
                ItemStatus::RechazadoCompra
            };
            check_transition(item.status, target, actor.role)?;

            record_item_modification(
                &txn,
                item.id,
                "status",
                Some(item.status.to_string()),
                Some(target.to_string()),
                actor.id,
                decision.reason.clone(),
            )
            .await?;

            let mut active: requisition_item::ActiveModel = item.into();
            active.status = Set(target);
            updated.push(active.update(&txn).await?);
            ITEM_TRANSITIONS_TOTAL.inc();
        }

        let (requisition, change) =
            recompute_requisition_status(&txn, requisition, actor).await?;
        txn.commit().await?;

        info!(
            requisition_id = %requisition.id,
            approved,
            rejected,
            "purchase decisions applied"
        );
        let _ = self
            .event_sender
            .send(Event::PurchasesValidated {
                requisition_id: requisition.id,
                approved,
                rejected,
            })
            .await;
        self.emit_status_change(requisition.id, change).await;

        self.fanout
            .notify_role(
                Role::Logistica,
                "Purchase validation completed",
                &format!(
                    "Requisition {}: {} approved, {} rejected",
                    requisition.number, approved, rejected
                ),
                requisition.id,
            )
            .await;
        if rejected > 0 {
            self.fanout
                .notify_user(
                    requisition.requester_id,
                    "Purchase items rejected",
                    &format!(
                        "{} item(s) of requisition {} were rejected for purchase",
                        rejected, requisition.number
                    ),
                    requisition.id,
                )
                .await;
        }

        Ok(updated)
    }

    /// Marks a purchased item as received at the warehouse, which puts it
    /// straight in the dispatch queue.
    #[instrument(skip(self))]
    pub async fn confirm_purchase_received(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        item_id: Uuid,
    ) -> Result<requisition_item::Model, WorkflowError> {
        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).confirm_purchase_received,
            "confirm purchase receipt",
        )?;

        let item = load_item(&txn, requisition_id, item_id).await?;
        check_transition(item.status, ItemStatus::EnStock, actor.role)?;
        check_transition(ItemStatus::EnStock, ItemStatus::ListoParaDespacho, actor.role)?;

        record_item_modification(
            &txn,
            item.id,
            "status",
            Some(item.status.to_string()),
            Some(ItemStatus::ListoParaDespacho.to_string()),
            actor.id,
            None,
        )
        .await?;

        let mut active: requisition_item::ActiveModel = item.into();
        active.status = Set(ItemStatus::ListoParaDespacho);
        active.compra_recibida = Set(true);
        let updated = active.update(&txn).await?;

        let (requisition, change) =
            recompute_requisition_status(&txn, requisition, actor).await?;
        txn.commit().await?;

        ITEM_TRANSITIONS_TOTAL.inc();
        info!(requisition_id = %requisition.id, item_id = %updated.id, "purchase received");
        let _ = self
            .event_sender
            .send(Event::PurchaseReceived {
                requisition_id: requisition.id,
                item_id: updated.id,
            })
            .await;
        self.emit_status_change(requisition.id, change).await;

        Ok(updated)
    }

    /// The modification audit trail of one item, oldest first.
    #[instrument(skip(self))]
    pub async fn modifications(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        item_id: Uuid,
    ) -> Result<Vec<item_modification::Model>, WorkflowError> {
        let requisition = load_requisition(&*self.db, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).view,
            "view this requisition",
        )?;
        // Belonging check; the trail of foreign items is never exposed.
        load_item(&*self.db, requisition_id, item_id).await?;

        Ok(item_modification::Entity::find()
            .filter(item_modification::Column::ItemId.eq(item_id))
            .order_by_asc(item_modification::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    fn ensure_draft_item_access(
        &self,
        requisition: &crate::entities::requisition::Model,
        actor: &Actor,
    ) -> Result<(), WorkflowError> {
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).manage_items,
            "manage items",
        )?;
        if requisition.status != RequisitionStatus::Borrador {
            return Err(WorkflowError::ConflictStale(
                "item structure is frozen once the requisition leaves draft".to_string(),
            ));
        }
        Ok(())
    }

    async fn emit_status_change(
        &self,
        requisition_id: Uuid,
        change: Option<(RequisitionStatus, RequisitionStatus)>,
    ) {
        if let Some((old, new)) = change {
            let _ = self
                .event_sender
                .send(Event::RequisitionStatusChanged {
                    requisition_id,
                    old_status: old.to_string(),
                    new_status: new.to_string(),
                })
                .await;
        }
    }
}

/// Loads one non-deleted item and verifies it belongs to the requisition.
/// An item of another requisition is `NotFound`; a soft-deleted item is a
/// conflict because the caller is acting on a stale view.
async fn load_item<C: ConnectionTrait>(
    conn: &C,
    requisition_id: Uuid,
    item_id: Uuid,
) -> Result<requisition_item::Model, WorkflowError> {
    let item = requisition_item::Entity::find_by_id(item_id)
        .one(conn)
        .await?
        .filter(|i| i.requisition_id == requisition_id)
        .ok_or_else(|| WorkflowError::NotFound(format!("Item {item_id} not found")))?;
    if item.eliminado {
        return Err(WorkflowError::ConflictStale(format!(
            "item {item_id} has been removed"
        )));
    }
    Ok(item)
}
