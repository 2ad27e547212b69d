//! Workflow services: request-scoped read-modify-write sequences composing
//! the pure engine in [`crate::workflow`] against persistent state. Every
//! multi-item batch operation executes inside a single transaction; the
//! aggregate-status recomputation always reads item state inside that same
//! transaction, after all intended mutations.

pub mod items;
pub mod lots;
pub mod numbering;
pub mod requisitions;

pub use items::ItemService;
pub use lots::LotService;
pub use requisitions::RequisitionService;

use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::auth::{Actor, Role, UserDirectory};
use crate::db::DbPool;
use crate::entities::{
    history_entry, item_modification, lot, lot_item, requisition, requisition_item,
};
use crate::entities::{LotStatus, RequisitionStatus};
use crate::errors::WorkflowError;
use crate::events::EventSender;
use crate::notifications::NotificationService;
use crate::workflow::reconciliation::{self, ItemReceiptTotals, LotItemRecord};

/// All workflow services, wired over one pool and one event channel.
#[derive(Clone)]
pub struct AppServices {
    pub requisitions: Arc<RequisitionService>,
    pub items: Arc<ItemService>,
    pub lots: Arc<LotService>,
}

pub fn build_services(
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    notifier: Arc<dyn NotificationService>,
    directory: Arc<dyn UserDirectory>,
) -> AppServices {
    let fanout = Fanout::new(notifier, directory);
    AppServices {
        requisitions: Arc::new(RequisitionService::new(
            db.clone(),
            event_sender.clone(),
            fanout.clone(),
        )),
        items: Arc::new(ItemService::new(
            db.clone(),
            event_sender.clone(),
            fanout.clone(),
        )),
        lots: Arc::new(LotService::new(db, event_sender, fanout)),
    }
}

/// Notification fan-out: resolves recipients by role through the user
/// directory and delivers fire-and-forget. Failures are logged, never
/// propagated into the business operation.
#[derive(Clone)]
pub(crate) struct Fanout {
    notifier: Arc<dyn NotificationService>,
    directory: Arc<dyn UserDirectory>,
}

impl Fanout {
    pub(crate) fn new(
        notifier: Arc<dyn NotificationService>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self { notifier, directory }
    }

    pub(crate) async fn notify_role(
        &self,
        role: Role,
        title: &str,
        message: &str,
        requisition_id: Uuid,
    ) {
        let users = self.directory.active_users_with_role(role).await;
        if users.is_empty() {
            return;
        }
        if let Err(e) = self
            .notifier
            .notify(&users, title, message, requisition_id)
            .await
        {
            warn!(%requisition_id, %role, error = %e, "notification fan-out failed");
        }
    }

    pub(crate) async fn notify_user(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        requisition_id: Uuid,
    ) {
        if let Err(e) = self
            .notifier
            .notify(&[user_id], title, message, requisition_id)
            .await
        {
            warn!(%requisition_id, %user_id, error = %e, "notification failed");
        }
    }
}

pub(crate) fn ensure_capability(granted: bool, action: &str) -> Result<(), WorkflowError> {
    if granted {
        Ok(())
    } else {
        Err(WorkflowError::PermissionDenied(format!(
            "actor may not {action} in the requisition's current status"
        )))
    }
}

pub(crate) async fn load_requisition<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<requisition::Model, WorkflowError> {
    requisition::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("Requisition {id} not found")))
}

/// Non-deleted items of a requisition. Soft-deleted items are invisible to
/// every aggregation.
pub(crate) async fn load_active_items<C: ConnectionTrait>(
    conn: &C,
    requisition_id: Uuid,
) -> Result<Vec<requisition_item::Model>, WorkflowError> {
    Ok(requisition_item::Entity::find()
        .filter(requisition_item::Column::RequisitionId.eq(requisition_id))
        .filter(requisition_item::Column::Eliminado.eq(false))
        .all(conn)
        .await?)
}

pub(crate) async fn record_history<C: ConnectionTrait>(
    conn: &C,
    requisition_id: Uuid,
    previous_status: Option<RequisitionStatus>,
    new_status: RequisitionStatus,
    actor_id: Uuid,
    comment: Option<String>,
) -> Result<(), WorkflowError> {
    history_entry::ActiveModel {
        id: Set(Uuid::new_v4()),
        requisition_id: Set(requisition_id),
        previous_status: Set(previous_status),
        new_status: Set(new_status),
        actor_id: Set(actor_id),
        comment: Set(comment),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(())
}

pub(crate) async fn record_item_modification<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    field: &str,
    old_value: Option<String>,
    new_value: Option<String>,
    actor_id: Uuid,
    reason: Option<String>,
) -> Result<(), WorkflowError> {
    item_modification::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(item_id),
        field: Set(field.to_string()),
        old_value: Set(old_value),
        new_value: Set(new_value),
        actor_id: Set(actor_id),
        reason: Set(reason),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Applies a requisition status change and appends the history entry.
pub(crate) async fn set_requisition_status<C: ConnectionTrait>(
    conn: &C,
    requisition: requisition::Model,
    new_status: RequisitionStatus,
    actor: &Actor,
    comment: Option<String>,
) -> Result<requisition::Model, WorkflowError> {
    let previous = requisition.status;
    let mut active: requisition::ActiveModel = requisition.into();
    active.status = Set(new_status);
    let updated = active.update(conn).await?;
    record_history(conn, updated.id, Some(previous), new_status, actor.id, comment).await?;
    Ok(updated)
}

/// Recomputes the requisition status from its current item aggregate and
/// applies it when it differs. Only effective once logistics review has
/// begun; before that, direct approval actions own the status. Reads item
/// state from the enclosing transaction, never from a stale snapshot.
///
/// Full dispatch alone never yields `Entregado`: that requires the receipt
/// totals to cover every item, so a fully dispatched but unconfirmed
/// requisition rests at `Enviado` where receivers can still act.
pub(crate) async fn recompute_requisition_status<C: ConnectionTrait>(
    conn: &C,
    requisition: requisition::Model,
    actor: &Actor,
) -> Result<(requisition::Model, Option<(RequisitionStatus, RequisitionStatus)>), WorkflowError> {
    if !requisition.status.has_reached_logistics() {
        return Ok((requisition, None));
    }
    let items = load_active_items(conn, requisition.id).await?;
    let statuses: Vec<_> = items.iter().map(|i| i.status).collect();
    let mut derived = reconciliation::requisition_status_from_items(&statuses);

    if derived == Some(RequisitionStatus::Entregado) {
        let records = lot_records_by_item(conn, requisition.id).await?;
        let totals = receipt_totals(&items, &records);
        derived = Some(
            reconciliation::delivery_status(&totals).unwrap_or(RequisitionStatus::Enviado),
        );
    }

    match derived {
        Some(new_status) if new_status != requisition.status => {
            let old = requisition.status;
            let updated = set_requisition_status(conn, requisition, new_status, actor, None).await?;
            Ok((updated, Some((old, new_status))))
        }
        _ => Ok((requisition, None)),
    }
}

/// All lot lines of a requisition grouped per item, projected for the
/// reconciliation engine.
pub(crate) async fn lot_records_by_item<C: ConnectionTrait>(
    conn: &C,
    requisition_id: Uuid,
) -> Result<HashMap<Uuid, Vec<LotItemRecord>>, WorkflowError> {
    let lots = lot::Entity::find()
        .filter(lot::Column::RequisitionId.eq(requisition_id))
        .all(conn)
        .await?;
    if lots.is_empty() {
        return Ok(HashMap::new());
    }
    let status_by_lot: HashMap<Uuid, LotStatus> = lots.iter().map(|l| (l.id, l.status)).collect();
    let lines = lot_item::Entity::find()
        .filter(lot_item::Column::LotId.is_in(lots.iter().map(|l| l.id).collect::<Vec<_>>()))
        .all(conn)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<LotItemRecord>> = HashMap::new();
    for line in lines {
        let lot_status = status_by_lot[&line.lot_id];
        grouped.entry(line.item_id).or_default().push(LotItemRecord {
            lot_status,
            cantidad_enviada: line.cantidad_enviada,
            cantidad_recibida: line.cantidad_recibida,
        });
    }
    Ok(grouped)
}

pub(crate) fn receipt_totals(
    items: &[requisition_item::Model],
    records: &HashMap<Uuid, Vec<LotItemRecord>>,
) -> Vec<ItemReceiptTotals> {
    items
        .iter()
        .map(|item| ItemReceiptTotals {
            required_quantity: item.required_quantity(),
            total_received: records
                .get(&item.id)
                .map(|rows| reconciliation::total_received(rows))
                .unwrap_or(0),
        })
        .collect()
}
