//! Quantity reconciliation engine.
//!
//! Pure functions that aggregate partial dispatch/receipt events across
//! lots back into item and requisition status. All of them are
//! order-independent over their inputs and idempotent.

use crate::entities::{ItemStatus, LotStatus, RequisitionStatus};

/// Projection of one lot-item row together with its lot's status, which is
/// all the engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotItemRecord {
    pub lot_status: LotStatus,
    pub cantidad_enviada: i32,
    pub cantidad_recibida: Option<i32>,
}

/// Σ shipped quantity over lots whose status counts as dispatched.
/// Void lots never contribute.
pub fn total_dispatched(rows: &[LotItemRecord]) -> i64 {
    rows.iter()
        .filter(|r| r.lot_status.counts_as_dispatched())
        .map(|r| i64::from(r.cantidad_enviada))
        .sum()
}

/// Σ received quantity (defaulting to shipped) over delivered lots.
pub fn total_received(rows: &[LotItemRecord]) -> i64 {
    rows.iter()
        .filter(|r| r.lot_status == LotStatus::Entregado)
        .map(|r| i64::from(r.cantidad_recibida.unwrap_or(r.cantidad_enviada)))
        .sum()
}

/// Σ shipped quantity over every non-void lot, regardless of lot status.
/// Quantities on pending lots are already committed, so this is the figure
/// the over-dispatch guard compares against the approved quantity.
pub fn total_committed(rows: &[LotItemRecord]) -> i64 {
    rows.iter()
        .filter(|r| !r.lot_status.is_void())
        .map(|r| i64::from(r.cantidad_enviada))
        .sum()
}

/// Derives the item status implied by its cumulative dispatched quantity.
/// Returns the current status unchanged when nothing has been dispatched.
pub fn item_status_after_dispatch(
    current: ItemStatus,
    total_dispatched: i64,
    required_quantity: i32,
) -> ItemStatus {
    if total_dispatched >= i64::from(required_quantity) {
        ItemStatus::Despachado
    } else if total_dispatched > 0 {
        ItemStatus::DespachoParcial
    } else {
        current
    }
}

/// Derives the requisition status from the multiset of its non-deleted
/// item statuses, applying the fixed priority order (highest first).
/// Dispatch in progress dominates procurement and classification signals so
/// receivers and logistics can keep acting. Returns `None` for an empty
/// item set.
pub fn requisition_status_from_items(statuses: &[ItemStatus]) -> Option<RequisitionStatus> {
    if statuses.is_empty() {
        return None;
    }

    let all = |pred: fn(&ItemStatus) -> bool| statuses.iter().all(pred);
    let any = |pred: fn(&ItemStatus) -> bool| statuses.iter().any(pred);

    if all(|s| *s == ItemStatus::Despachado) {
        return Some(RequisitionStatus::Entregado);
    }
    if any(|s| matches!(s, ItemStatus::Despachado | ItemStatus::DespachoParcial)) {
        return Some(RequisitionStatus::Enviado);
    }
    if any(|s| *s == ItemStatus::PendienteValidacionAdmin) {
        return Some(RequisitionStatus::EnCompra);
    }
    if any(|s| matches!(s, ItemStatus::AprobadoCompra | ItemStatus::ListoParaDespacho)) {
        return Some(RequisitionStatus::ListoDespacho);
    }
    if any(|s| {
        matches!(
            s,
            ItemStatus::EnStock | ItemStatus::RequiereCompra | ItemStatus::PendienteClasificacion
        )
    }) {
        return Some(RequisitionStatus::RevisionLogistica);
    }
    if all(|s| *s == ItemStatus::RechazadoCompra) {
        return Some(RequisitionStatus::RechazadoAdm);
    }

    None
}

/// Per-item receipt totals for the delivery recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemReceiptTotals {
    pub required_quantity: i32,
    pub total_received: i64,
}

/// Recomputes the requisition delivery status after a receipt confirmation.
/// Evaluated independently from the item-status priority order, because
/// receipt can complete after dispatch status has already been set.
/// Returns `None` when nothing has been received yet.
pub fn delivery_status(items: &[ItemReceiptTotals]) -> Option<RequisitionStatus> {
    if items.is_empty() {
        return None;
    }
    let fully_received = items
        .iter()
        .all(|i| i.total_received >= i64::from(i.required_quantity));
    if fully_received {
        return Some(RequisitionStatus::Entregado);
    }
    if items.iter().any(|i| i.total_received > 0) {
        return Some(RequisitionStatus::EntregadoParcial);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ItemStatus::*;

    fn row(lot_status: LotStatus, enviada: i32, recibida: Option<i32>) -> LotItemRecord {
        LotItemRecord {
            lot_status,
            cantidad_enviada: enviada,
            cantidad_recibida: recibida,
        }
    }

    #[test]
    fn void_lots_never_count() {
        let rows = [
            row(LotStatus::Anulado, 6, None),
            row(LotStatus::Despachado, 4, None),
        ];
        assert_eq!(total_dispatched(&rows), 4);
        assert_eq!(total_committed(&rows), 4);
        assert_eq!(total_received(&rows), 0);
    }

    #[test]
    fn pending_lots_commit_quantity_without_dispatching_it() {
        let rows = [row(LotStatus::Pendiente, 6, None)];
        assert_eq!(total_dispatched(&rows), 0);
        assert_eq!(total_committed(&rows), 6);
    }

    #[test]
    fn received_defaults_to_shipped() {
        let rows = [
            row(LotStatus::Entregado, 6, None),
            row(LotStatus::Entregado, 4, Some(3)),
        ];
        assert_eq!(total_received(&rows), 9);
    }

    #[test]
    fn item_status_thresholds() {
        assert_eq!(item_status_after_dispatch(ListoParaDespacho, 0, 10), ListoParaDespacho);
        assert_eq!(item_status_after_dispatch(ListoParaDespacho, 6, 10), DespachoParcial);
        assert_eq!(item_status_after_dispatch(DespachoParcial, 10, 10), Despachado);
        assert_eq!(item_status_after_dispatch(DespachoParcial, 14, 10), Despachado);
    }

    #[test]
    fn priority_all_dispatched_wins() {
        assert_eq!(
            requisition_status_from_items(&[Despachado, Despachado]),
            Some(RequisitionStatus::Entregado)
        );
    }

    #[test]
    fn priority_dispatch_in_progress_dominates_everything_below() {
        // One item dispatched, the other not even classified: dispatch wins.
        assert_eq!(
            requisition_status_from_items(&[Despachado, PendienteClasificacion]),
            Some(RequisitionStatus::Enviado)
        );
        assert_eq!(
            requisition_status_from_items(&[DespachoParcial, PendienteValidacionAdmin]),
            Some(RequisitionStatus::Enviado)
        );
    }

    #[test]
    fn priority_purchase_validation_dominates_ready_and_review() {
        assert_eq!(
            requisition_status_from_items(&[PendienteValidacionAdmin, ListoParaDespacho]),
            Some(RequisitionStatus::EnCompra)
        );
    }

    #[test]
    fn priority_ready_dominates_review() {
        assert_eq!(
            requisition_status_from_items(&[ListoParaDespacho, RechazadoCompra]),
            Some(RequisitionStatus::ListoDespacho)
        );
        assert_eq!(
            requisition_status_from_items(&[AprobadoCompra]),
            Some(RequisitionStatus::ListoDespacho)
        );
    }

    #[test]
    fn priority_review_when_anything_unclassified() {
        assert_eq!(
            requisition_status_from_items(&[PendienteClasificacion, RechazadoCompra]),
            Some(RequisitionStatus::RevisionLogistica)
        );
        assert_eq!(
            requisition_status_from_items(&[EnStock, RequiereCompra]),
            Some(RequisitionStatus::RevisionLogistica)
        );
    }

    #[test]
    fn priority_all_rejected_rejects_the_requisition() {
        assert_eq!(
            requisition_status_from_items(&[RechazadoCompra, RechazadoCompra]),
            Some(RequisitionStatus::RechazadoAdm)
        );
    }

    #[test]
    fn empty_item_set_yields_nothing() {
        assert_eq!(requisition_status_from_items(&[]), None);
    }

    #[test]
    fn delivery_requires_every_item_complete() {
        let partial = [
            ItemReceiptTotals { required_quantity: 10, total_received: 10 },
            ItemReceiptTotals { required_quantity: 5, total_received: 2 },
        ];
        assert_eq!(delivery_status(&partial), Some(RequisitionStatus::EntregadoParcial));

        let complete = [
            ItemReceiptTotals { required_quantity: 10, total_received: 10 },
            ItemReceiptTotals { required_quantity: 5, total_received: 5 },
        ];
        assert_eq!(delivery_status(&complete), Some(RequisitionStatus::Entregado));

        let untouched = [ItemReceiptTotals { required_quantity: 10, total_received: 0 }];
        assert_eq!(delivery_status(&untouched), None);
    }
}
