use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::db::DbPool;
use crate::entities::{lot, lot_item, requisition_item};
use crate::entities::{LotStatus, RequisitionStatus};
use crate::errors::{FieldError, WorkflowError};
use crate::events::{Event, EventSender};
use crate::services::{
    ensure_capability, load_active_items, load_requisition, lot_records_by_item, receipt_totals,
    record_item_modification, set_requisition_status, Fanout,
};
use crate::workflow::lot_transitions;
use crate::workflow::permissions::capabilities;
use crate::workflow::reconciliation::{
    delivery_status, item_status_after_dispatch, total_committed, total_dispatched,
};

lazy_static! {
    static ref LOTS_CREATED_TOTAL: IntCounter =
        IntCounter::new("lots_created_total", "Total number of lots created")
            .expect("metric can be created");
    static ref LOTS_DISPATCHED_TOTAL: IntCounter =
        IntCounter::new("lots_dispatched_total", "Total number of lots dispatched")
            .expect("metric can be created");
    static ref LOTS_DELIVERED_TOTAL: IntCounter =
        IntCounter::new("lots_delivered_total", "Total number of lots delivered")
            .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotLineInput {
    pub item_id: Uuid,
    pub cantidad_enviada: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLotInput {
    pub carrier: Option<String>,
    pub destination: Option<String>,
    pub observations: Option<String>,
    pub items: Vec<LotLineInput>,
}

/// Receiver's per-line override at receipt confirmation. Lines without an
/// override default to the shipped quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptLineInput {
    pub item_id: Uuid,
    pub cantidad_recibida: i32,
}

/// Service owning the lot lifecycle and the dispatch/receipt
/// reconciliation.
#[derive(Clone)]
pub struct LotService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    fanout: Fanout,
}

impl LotService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, fanout: Fanout) -> Self {
        Self {
            db,
            event_sender,
            fanout,
        }
    }

    /// Lots of a requisition the actor may view, in creation order.
    #[instrument(skip(self))]
    pub async fn list_lots(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
    ) -> Result<Vec<lot::Model>, WorkflowError> {
        let requisition = load_requisition(&*self.db, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).view,
            "view this requisition",
        )?;
        Ok(lot::Entity::find()
            .filter(lot::Column::RequisitionId.eq(requisition_id))
            .order_by_asc(lot::Column::NumeroLote)
            .all(&*self.db)
            .await?)
    }

    /// Lines of one lot.
    #[instrument(skip(self))]
    pub async fn lot_lines(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        lot_id: Uuid,
    ) -> Result<Vec<lot_item::Model>, WorkflowError> {
        let requisition = load_requisition(&*self.db, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).view,
            "view this requisition",
        )?;
        load_lot(&*self.db, requisition_id, lot_id).await?;
        Ok(lot_item::Entity::find()
            .filter(lot_item::Column::LotId.eq(lot_id))
            .all(&*self.db)
            .await?)
    }

    /// Creates a pending lot over dispatchable items. Each line is checked
    /// against the quantity already committed on other non-void lots, so no
    /// item can ever be over-dispatched even across concurrent partial
    /// shipments. Quantity errors across the batch are reported together.
    #[instrument(skip(self, input), fields(lines = input.items.len()))]
    pub async fn create_lot(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        input: CreateLotInput,
    ) -> Result<lot::Model, WorkflowError> {
        if input.items.is_empty() {
            return Err(WorkflowError::validation(
                "items",
                "a lot requires at least one line",
            ));
        }

        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).create_lot,
            "create a lot",
        )?;

        let records = lot_records_by_item(&txn, requisition_id).await?;
        let mut field_errors: Vec<FieldError> = Vec::new();
        let mut lines = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let item = load_item(&txn, requisition_id, line.item_id).await?;
            if !item.status.is_dispatchable() {
                return Err(WorkflowError::ConflictStale(format!(
                    "item {} is {} and cannot be placed on a lot",
                    item.id, item.status
                )));
            }
            if line.cantidad_enviada < 1 {
                field_errors.push(FieldError::new(
                    format!("items.{}.cantidad_enviada", item.id),
                    "shipped quantity must be positive",
                ));
                continue;
            }
            let committed = records
                .get(&item.id)
                .map(|rows| total_committed(rows))
                .unwrap_or(0);
            let remaining = i64::from(item.required_quantity()) - committed;
            if i64::from(line.cantidad_enviada) > remaining {
                field_errors.push(FieldError::new(
                    format!("items.{}.cantidad_enviada", item.id),
                    format!("only {remaining} unit(s) remain undispatched"),
                ));
            }
            lines.push((item, line.cantidad_enviada));
        }
        if !field_errors.is_empty() {
            return Err(WorkflowError::ValidationFailed(field_errors));
        }

        let numero_lote = next_lot_number(&txn, requisition_id).await?;
        let created = lot::ActiveModel {
            id: Set(Uuid::new_v4()),
            requisition_id: Set(requisition_id),
            numero_lote: Set(numero_lote),
            status: Set(LotStatus::Pendiente),
            carrier: Set(input.carrier),
            destination: Set(input.destination),
            observations: Set(input.observations),
            dispatched_at: Set(None),
            delivered_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (item, cantidad_enviada) in lines {
            lot_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                lot_id: Set(created.id),
                item_id: Set(item.id),
                cantidad_enviada: Set(cantidad_enviada),
                cantidad_recibida: Set(None),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        LOTS_CREATED_TOTAL.inc();
        info!(requisition_id = %requisition_id, lot_id = %created.id, numero_lote, "lot created");
        let _ = self
            .event_sender
            .send(Event::LotCreated {
                requisition_id,
                lot_id: created.id,
                numero_lote,
            })
            .await;

        Ok(created)
    }

    /// `Pendiente` to `Preparado`.
    #[instrument(skip(self))]
    pub async fn prepare_lot(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        lot_id: Uuid,
    ) -> Result<lot::Model, WorkflowError> {
        self.simple_lot_transition(actor, requisition_id, lot_id, LotStatus::Preparado)
            .await
    }

    /// Dispatches a prepared lot. The lot moves to `Despachado` and every
    /// item on it is re-derived from its cumulative dispatched quantity,
    /// all inside one transaction; the requisition aggregate follows.
    #[instrument(skip(self))]
    pub async fn dispatch_lot(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        lot_id: Uuid,
    ) -> Result<lot::Model, WorkflowError> {
        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).dispatch,
            "dispatch a lot",
        )?;

        let current = load_lot(&txn, requisition_id, lot_id).await?;
        lot_transitions::check_transition(current.status, LotStatus::Despachado, actor.role)?;

        let mut active: lot::ActiveModel = current.into();
        active.status = Set(LotStatus::Despachado);
        active.dispatched_at = Set(Some(Utc::now()));
        let dispatched = active.update(&txn).await?;

        // Item totals now include this lot's quantities.
        let records = lot_records_by_item(&txn, requisition_id).await?;
        let lines = lot_item::Entity::find()
            .filter(lot_item::Column::LotId.eq(lot_id))
            .all(&txn)
            .await?;
        for line in &lines {
            let item = load_item(&txn, requisition_id, line.item_id).await?;
            let dispatched_qty = records
                .get(&item.id)
                .map(|rows| total_dispatched(rows))
                .unwrap_or(0);
            let derived =
                item_status_after_dispatch(item.status, dispatched_qty, item.required_quantity());
            if derived != item.status {
                crate::workflow::item_transitions::check_transition(
                    item.status,
                    derived,
                    actor.role,
                )?;
                record_item_modification(
                    &txn,
                    item.id,
                    "status",
                    Some(item.status.to_string()),
                    Some(derived.to_string()),
                    actor.id,
                    None,
                )
                .await?;
                let mut item_active: requisition_item::ActiveModel = item.into();
                item_active.status = Set(derived);
                item_active.update(&txn).await?;
            }
        }

        let (requisition, change) =
            super::recompute_requisition_status(&txn, requisition, actor).await?;
        txn.commit().await?;

        LOTS_DISPATCHED_TOTAL.inc();
        info!(requisition_id = %requisition.id, lot_id = %dispatched.id, "lot dispatched");
        let _ = self
            .event_sender
            .send(Event::LotDispatched {
                requisition_id: requisition.id,
                lot_id: dispatched.id,
            })
            .await;
        self.emit_status_change(requisition.id, change).await;
        self.fanout
            .notify_role(
                Role::Receptor,
                "Lot dispatched",
                &format!(
                    "Lot {} of requisition {} is on its way",
                    dispatched.numero_lote, requisition.number
                ),
                requisition.id,
            )
            .await;

        Ok(dispatched)
    }

    /// `Despachado` to `EnTransito`.
    #[instrument(skip(self))]
    pub async fn mark_in_transit(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        lot_id: Uuid,
    ) -> Result<lot::Model, WorkflowError> {
        self.simple_lot_transition(actor, requisition_id, lot_id, LotStatus::EnTransito)
            .await
    }

    /// `EnTransito` to `PendienteRecepcion`: arrived at destination,
    /// awaiting the receiver's confirmation.
    #[instrument(skip(self))]
    pub async fn mark_arrived(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        lot_id: Uuid,
    ) -> Result<lot::Model, WorkflowError> {
        self.simple_lot_transition(actor, requisition_id, lot_id, LotStatus::PendienteRecepcion)
            .await
    }

    /// Voids a lot that never left the warehouse, releasing its committed
    /// quantities back to the dispatchable pool.
    #[instrument(skip(self))]
    pub async fn void_lot(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        lot_id: Uuid,
    ) -> Result<lot::Model, WorkflowError> {
        let voided = self
            .simple_lot_transition(actor, requisition_id, lot_id, LotStatus::Anulado)
            .await?;
        let _ = self
            .event_sender
            .send(Event::LotVoided {
                requisition_id,
                lot_id: voided.id,
            })
            .await;
        Ok(voided)
    }

    /// Confirms receipt of a dispatched lot. Unlisted lines default their
    /// received quantity to the shipped quantity; overrides must stay
    /// within `0..=cantidad_enviada`. The requisition's delivery status is
    /// recomputed from the receipt totals of every non-deleted item.
    #[instrument(skip(self, overrides))]
    pub async fn confirm_receipt(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        lot_id: Uuid,
        overrides: Vec<ReceiptLineInput>,
    ) -> Result<lot::Model, WorkflowError> {
        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        ensure_capability(
            capabilities(requisition.status, actor.role, is_owner).confirm_delivery,
            "confirm delivery",
        )?;

        let current = load_lot(&txn, requisition_id, lot_id).await?;
        lot_transitions::check_transition(current.status, LotStatus::Entregado, actor.role)?;

        let lines = lot_item::Entity::find()
            .filter(lot_item::Column::LotId.eq(lot_id))
            .all(&txn)
            .await?;
        let by_item: HashMap<Uuid, i32> = overrides
            .iter()
            .map(|o| (o.item_id, o.cantidad_recibida))
            .collect();

        let mut field_errors: Vec<FieldError> = Vec::new();
        for override_line in &overrides {
            if !lines.iter().any(|l| l.item_id == override_line.item_id) {
                return Err(WorkflowError::NotFound(format!(
                    "Item {} is not on lot {}",
                    override_line.item_id, lot_id
                )));
            }
        }
        for line in &lines {
            if let Some(&received) = by_item.get(&line.item_id) {
                if received < 0 || received > line.cantidad_enviada {
                    field_errors.push(FieldError::new(
                        format!("items.{}.cantidad_recibida", line.item_id),
                        format!(
                            "received quantity must be between 0 and {}",
                            line.cantidad_enviada
                        ),
                    ));
                }
            }
        }
        if !field_errors.is_empty() {
            return Err(WorkflowError::ValidationFailed(field_errors));
        }

        for line in &lines {
            let received = by_item
                .get(&line.item_id)
                .copied()
                .unwrap_or(line.cantidad_enviada);
            let mut line_active: lot_item::ActiveModel = line.clone().into();
            line_active.cantidad_recibida = Set(Some(received));
            line_active.update(&txn).await?;
        }

        let mut active: lot::ActiveModel = current.into();
        active.status = Set(LotStatus::Entregado);
        active.delivered_at = Set(Some(Utc::now()));
        let delivered = active.update(&txn).await?;

        // Delivery status is derived from receipt totals, independently of
        // the item-status priority order.
        let records = lot_records_by_item(&txn, requisition_id).await?;
        let items = load_active_items(&txn, requisition_id).await?;
        let totals = receipt_totals(&items, &records);

        let mut change = None;
        let mut requisition = requisition;
        if let Some(target) = delivery_status(&totals) {
            if requisition.status.has_reached_logistics() && target != requisition.status {
                let old = requisition.status;
                requisition =
                    set_requisition_status(&txn, requisition, target, actor, None).await?;
                change = Some((old, target));
            }
        }
        txn.commit().await?;

        LOTS_DELIVERED_TOTAL.inc();
        info!(requisition_id = %requisition.id, lot_id = %delivered.id, "lot delivered");
        let _ = self
            .event_sender
            .send(Event::LotDelivered {
                requisition_id: requisition.id,
                lot_id: delivered.id,
            })
            .await;
        self.emit_status_change(requisition.id, change).await;
        if requisition.status == RequisitionStatus::Entregado {
            let _ = self
                .event_sender
                .send(Event::RequisitionDelivered(requisition.id))
                .await;
            self.fanout
                .notify_user(
                    requisition.requester_id,
                    "Requisition delivered",
                    &format!("Requisition {} was fully delivered", requisition.number),
                    requisition.id,
                )
                .await;
        }

        Ok(delivered)
    }

    async fn simple_lot_transition(
        &self,
        actor: &Actor,
        requisition_id: Uuid,
        lot_id: Uuid,
        target: LotStatus,
    ) -> Result<lot::Model, WorkflowError> {
        let txn = self.db.begin().await?;
        let requisition = load_requisition(&txn, requisition_id).await?;
        let is_owner = requisition.requester_id == actor.id;
        let caps = capabilities(requisition.status, actor.role, is_owner);
        let granted = match target {
            LotStatus::PendienteRecepcion => caps.dispatch || caps.confirm_delivery,
            _ => caps.dispatch,
        };
        ensure_capability(granted, "update this lot")?;

        let current = load_lot(&txn, requisition_id, lot_id).await?;
        lot_transitions::check_transition(current.status, target, actor.role)?;

        let mut active: lot::ActiveModel = current.into();
        active.status = Set(target);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(requisition_id = %requisition_id, lot_id = %updated.id, status = %target, "lot updated");
        Ok(updated)
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

async fn load_lot<C: ConnectionTrait>(
    conn: &C,
    requisition_id: Uuid,
    lot_id: Uuid,
) -> Result<lot::Model, WorkflowError> {
    lot::Entity::find_by_id(lot_id)
        .one(conn)
        .await?
        .filter(|l| l.requisition_id == requisition_id)
        .ok_or_else(|| WorkflowError::NotFound(format!("Lot {lot_id} not found")))
}

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

async fn next_lot_number<C: ConnectionTrait>(
    conn: &C,
    requisition_id: Uuid,
) -> Result<i32, WorkflowError> {
    let highest = lot::Entity::find()
        .filter(lot::Column::RequisitionId.eq(requisition_id))
        .order_by_desc(lot::Column::NumeroLote)
        .one(conn)
        .await?;
    Ok(highest.map(|l| l.numero_lote).unwrap_or(0) + 1)
}

