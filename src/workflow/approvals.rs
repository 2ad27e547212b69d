//! Requisition-level approval table.
//!
//! `next_status_from_approval` and the item-aggregate derivation in
//! [`super::reconciliation`] are kept as two independent pure functions;
//! the requisition service composes them, preferring the item-aggregate
//! result once the requisition has reached logistics review.

use crate::auth::Role;
use crate::entities::RequisitionStatus;
use crate::errors::WorkflowError;

/// Minimum length for any rejection comment or purchase-rejection reason.
pub const MIN_REJECTION_REASON_LEN: usize = 10;

/// The simplified approval table: each approvable status maps to exactly
/// one `(pass-through, next)` pair. The pass-through status is recorded in
/// history; the requisition never rests in it.
pub fn next_status_from_approval(
    current: RequisitionStatus,
) -> Option<(RequisitionStatus, RequisitionStatus)> {
    match current {
        RequisitionStatus::ValidacionSeguridad => Some((
            RequisitionStatus::AprobadoSeguridad,
            RequisitionStatus::ValidacionGerencia,
        )),
        RequisitionStatus::ValidacionGerencia => Some((
            RequisitionStatus::AprobadoGerencia,
            RequisitionStatus::RevisionLogistica,
        )),
        RequisitionStatus::EnCompra => Some((
            RequisitionStatus::AprobadoAdm,
            RequisitionStatus::ListoDespacho,
        )),
        _ => None,
    }
}

/// Stage-specific terminal rejection status. Rejection is final; there is
/// no re-submission path back to the same stage.
pub fn rejection_status(current: RequisitionStatus) -> Option<RequisitionStatus> {
    match current {
        RequisitionStatus::ValidacionSeguridad => Some(RequisitionStatus::RechazadoSeguridad),
        RequisitionStatus::ValidacionGerencia => Some(RequisitionStatus::RechazadoGerencia),
        RequisitionStatus::EnCompra => Some(RequisitionStatus::RechazadoAdm),
        _ => None,
    }
}

/// The role-group that must act while the requisition sits in `status`.
/// Used for notification fan-out on entering the status.
pub fn next_acting_role(status: RequisitionStatus) -> Option<Role> {
    match status {
        RequisitionStatus::ValidacionSeguridad => Some(Role::Seguridad),
        RequisitionStatus::ValidacionGerencia => Some(Role::Gerencia),
        RequisitionStatus::RevisionLogistica => Some(Role::Logistica),
        RequisitionStatus::EnCompra => Some(Role::Administracion),
        _ => None,
    }
}

/// Validates a rejection comment (requisition-level rejection or purchase
/// rejection). Whitespace does not count toward the minimum.
pub fn validate_rejection_reason(field: &str, reason: &str) -> Result<(), WorkflowError> {
    if reason.trim().chars().count() < MIN_REJECTION_REASON_LEN {
        return Err(WorkflowError::validation(
            field,
            format!("rejection reason must be at least {MIN_REJECTION_REASON_LEN} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn approval_table_covers_exactly_the_three_review_stages() {
        for status in RequisitionStatus::iter() {
            let approvable = matches!(
                status,
                RequisitionStatus::ValidacionSeguridad
                    | RequisitionStatus::ValidacionGerencia
                    | RequisitionStatus::EnCompra
            );
            assert_eq!(next_status_from_approval(status).is_some(), approvable);
            assert_eq!(rejection_status(status).is_some(), approvable);
        }
    }

    #[test]
    fn rejection_targets_are_terminal() {
        for status in RequisitionStatus::iter() {
            if let Some(target) = rejection_status(status) {
                assert!(target.is_terminal(), "{target} must be terminal");
                assert!(next_status_from_approval(target).is_none());
            }
        }
    }

    #[test]
    fn reason_length_counts_characters_not_bytes() {
        assert!(validate_rejection_reason("reason", "no disponible").is_ok());
        assert!(validate_rejection_reason("reason", "corto").is_err());
        // 10 non-ascii characters pass.
        assert!(validate_rejection_reason("reason", "ññññññññññ").is_ok());
        // Padding with whitespace does not help.
        assert!(validate_rejection_reason("reason", "corto     ").is_err());
    }
}
