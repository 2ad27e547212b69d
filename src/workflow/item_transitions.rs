//! Per-item status machine.
//!
//! Every legal transition is an explicit `(from, to, allowed roles)` triple.
//! A pair absent from the table, or present but attempted by a disallowed
//! role, fails with `TransitionDenied`; `RechazadoCompra` is absorbing and
//! reports `ConflictStale` instead, because the record is terminally
//! settled rather than merely mis-routed.

use crate::auth::Role;
use crate::entities::ItemStatus;
use crate::errors::WorkflowError;

use ItemStatus::*;
use Role::*;

/// The item transition table. Single source of truth; `can_transition` and
/// `check_transition` are lookups over it.
pub const ITEM_TRANSITIONS: &[(ItemStatus, ItemStatus, &[Role])] = &[
    // Classification.
    (PendienteClasificacion, EnStock, &[Logistica, Administrador]),
    (PendienteClasificacion, RequiereCompra, &[Logistica, Administrador]),
    // In-stock items move straight on to the dispatch queue.
    (
        EnStock,
        ListoParaDespacho,
        &[Logistica, Administracion, Receptor, Administrador],
    ),
    // Purchase sub-path.
    (RequiereCompra, PendienteValidacionAdmin, &[Logistica, Administrador]),
    (
        PendienteValidacionAdmin,
        AprobadoCompra,
        &[Administracion, Administrador],
    ),
    (
        PendienteValidacionAdmin,
        RechazadoCompra,
        &[Administracion, Administrador],
    ),
    // Warehouse receipt of purchased goods rejoins the stock path.
    (
        AprobadoCompra,
        EnStock,
        &[Administracion, Receptor, Administrador],
    ),
    // Dispatch.
    (ListoParaDespacho, DespachoParcial, &[Logistica, Administrador]),
    (ListoParaDespacho, Despachado, &[Logistica, Administrador]),
    (DespachoParcial, Despachado, &[Logistica, Administrador]),
];

/// True when `(from, to)` is in the table and `role` is allowed to drive it.
pub fn can_transition(from: ItemStatus, to: ItemStatus, role: Role) -> bool {
    ITEM_TRANSITIONS
        .iter()
        .any(|(f, t, roles)| *f == from && *t == to && roles.contains(&role))
}

/// Table lookup returning the precise failure when the transition is not
/// permitted. Attempting to leave `RechazadoCompra` is an error, never a
/// silent no-op.
pub fn check_transition(from: ItemStatus, to: ItemStatus, role: Role) -> Result<(), WorkflowError> {
    if from.is_absorbing() {
        return Err(WorkflowError::ConflictStale(format!(
            "item is {from} and cannot leave that status"
        )));
    }
    let defined = ITEM_TRANSITIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == to);
    match defined {
        None => Err(WorkflowError::transition_denied(
            from,
            to,
            "transition is not defined for items",
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
    use assert_matches::assert_matches;
    use strum::IntoEnumIterator;

    #[test]
    fn undefined_pairs_are_denied_for_every_role() {
        for from in ItemStatus::iter() {
            for to in ItemStatus::iter() {
                for role in Role::iter() {
                    let in_table = ITEM_TRANSITIONS
                        .iter()
                        .any(|(f, t, roles)| *f == from && *t == to && roles.contains(&role));
                    assert_eq!(can_transition(from, to, role), in_table);
                    if !in_table {
                        assert!(check_transition(from, to, role).is_err());
                    }
                }
            }
        }
    }

    #[test]
    fn rejected_purchase_is_absorbing_for_every_role_and_target() {
        for to in ItemStatus::iter() {
            for role in Role::iter() {
                assert!(!can_transition(RechazadoCompra, to, role));
                assert_matches!(
                    check_transition(RechazadoCompra, to, role),
                    Err(WorkflowError::ConflictStale(_))
                );
            }
        }
    }

    #[test]
    fn disallowed_role_gets_a_named_denial() {
        // Classification is logistics work; safety cannot do it.
        let err = check_transition(PendienteClasificacion, EnStock, Seguridad).unwrap_err();
        assert_matches!(err, WorkflowError::TransitionDenied { .. });
        assert!(err.to_string().contains("SEGURIDAD"));
    }

    #[test]
    fn purchase_path_round_trip() {
        assert!(can_transition(PendienteClasificacion, RequiereCompra, Logistica));
        assert!(can_transition(RequiereCompra, PendienteValidacionAdmin, Logistica));
        assert!(can_transition(PendienteValidacionAdmin, AprobadoCompra, Administracion));
        assert!(can_transition(AprobadoCompra, EnStock, Receptor));
        assert!(can_transition(EnStock, ListoParaDespacho, Receptor));
        assert!(can_transition(ListoParaDespacho, Despachado, Logistica));
    }
}
