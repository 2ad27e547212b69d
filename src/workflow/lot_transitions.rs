//! Lot (shipment) lifecycle: a small explicit status machine of its own.
//! Dispatch and receipt steps drive the reconciliation engine.

use crate::auth::Role;
use crate::entities::LotStatus;
use crate::errors::WorkflowError;

use LotStatus::*;
use Role::*;

pub const LOT_TRANSITIONS: &[(LotStatus, LotStatus, &[Role])] = &[
    (Pendiente, Preparado, &[Logistica, Administrador]),
    (Preparado, Despachado, &[Logistica, Administrador]),
    (Despachado, EnTransito, &[Logistica, Administrador]),
    (
        EnTransito,
        PendienteRecepcion,
        &[Logistica, Receptor, Administrador],
    ),
    // Receipt may be confirmed from any post-dispatch status.
    (Despachado, Entregado, &[Receptor, Administrador]),
    (EnTransito, Entregado, &[Receptor, Administrador]),
    (PendienteRecepcion, Entregado, &[Receptor, Administrador]),
    // Only lots that never left the warehouse can be voided.
    (Pendiente, Anulado, &[Logistica, Administrador]),
    (Preparado, Anulado, &[Logistica, Administrador]),
];

pub fn can_transition(from: LotStatus, to: LotStatus, role: Role) -> bool {
    LOT_TRANSITIONS
        .iter()
        .any(|(f, t, roles)| *f == from && *t == to && roles.contains(&role))
}

pub fn check_transition(from: LotStatus, to: LotStatus, role: Role) -> Result<(), WorkflowError> {
    let defined = LOT_TRANSITIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == to);
    match defined {
        None => Err(WorkflowError::transition_denied(
            from,
            to,
            "transition is not defined for lots",
        )),
        Some((_, _, roles)) if !roles.contains(&role) => Err(WorkflowError::transition_denied(
            from,
            to,
            format!("role {role} is not permitted to perform this transition"),
        )),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn delivered_and_void_lots_are_final() {
        for to in LotStatus::iter() {
            for role in Role::iter() {
                assert!(!can_transition(Entregado, to, role));
                assert!(!can_transition(Anulado, to, role));
            }
        }
    }

    #[test]
    fn dispatched_lot_cannot_be_voided() {
        for role in Role::iter() {
            assert!(!can_transition(Despachado, Anulado, role));
            assert!(!can_transition(EnTransito, Anulado, role));
            assert!(!can_transition(PendienteRecepcion, Anulado, role));
        }
    }

    #[test]
    fn receiver_confirms_from_any_post_dispatch_status() {
        assert!(can_transition(Despachado, Entregado, Receptor));
        assert!(can_transition(EnTransito, Entregado, Receptor));
        assert!(can_transition(PendienteRecepcion, Entregado, Receptor));
        assert!(!can_transition(Preparado, Entregado, Receptor));
    }
}
