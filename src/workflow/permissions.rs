//! Role capability engine.
//!
//! A pure mapping `(requisition status, role, ownership) -> CapabilitySet`.
//! No state, no I/O: the engine never inspects items; callers must also
//! check item-level eligibility before invoking a mutation. The tables here
//! are the single source of truth for both mutation gating and listing
//! visibility.

use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use strum::IntoEnumIterator;

use crate::auth::Role;
use crate::entities::RequisitionStatus;

/// Everything an actor may do against a requisition in a given status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    pub view: bool,
    pub edit: bool,
    pub delete: bool,
    pub approve: bool,
    pub reject: bool,
    pub manage_items: bool,
    pub mark_stock: bool,
    pub validate_purchase: bool,
    pub create_lot: bool,
    pub dispatch: bool,
    pub confirm_delivery: bool,
    pub confirm_purchase_received: bool,
}

impl CapabilitySet {
    pub const fn none() -> Self {
        Self {
            view: false,
            edit: false,
            delete: false,
            approve: false,
            reject: false,
            manage_items: false,
            mark_stock: false,
            validate_purchase: false,
            create_lot: false,
            dispatch: false,
            confirm_delivery: false,
            confirm_purchase_received: false,
        }
    }

    pub const fn all() -> Self {
        Self {
            view: true,
            edit: true,
            delete: true,
            approve: true,
            reject: true,
            manage_items: true,
            mark_stock: true,
            validate_purchase: true,
            create_lot: true,
            dispatch: true,
            confirm_delivery: true,
            confirm_purchase_received: true,
        }
    }

    /// True when any capability besides plain viewing is granted.
    pub fn grants_any_mutation(&self) -> bool {
        self.edit
            || self.delete
            || self.approve
            || self.reject
            || self.manage_items
            || self.mark_stock
            || self.validate_purchase
            || self.create_lot
            || self.dispatch
            || self.confirm_delivery
            || self.confirm_purchase_received
    }
}

lazy_static! {
    /// Statuses visible to each role when listing. Owners always see their
    /// own requisitions regardless of this table; the admin sees all.
    /// Must stay in sync with [`capabilities`]: any status in which a role
    /// holds a mutation capability appears in its visibility set.
    pub static ref VISIBLE_STATUSES: HashMap<Role, HashSet<RequisitionStatus>> = {
        use RequisitionStatus::*;

        let mut table: HashMap<Role, HashSet<RequisitionStatus>> = HashMap::new();

        // Requesters rely on ownership, not status.
        table.insert(Role::Solicitante, HashSet::new());

        // Safety sees everything from its review stage onward.
        table.insert(
            Role::Seguridad,
            RequisitionStatus::iter()
                .filter(|s| !matches!(s, Borrador | Cancelado))
                .collect(),
        );

        table.insert(
            Role::Gerencia,
            [
                ValidacionGerencia,
                AprobadoGerencia,
                RechazadoGerencia,
                RevisionLogistica,
                EnCompra,
                AprobadoAdm,
                RechazadoAdm,
                ListoDespacho,
                Enviado,
                EntregadoParcial,
                Entregado,
            ]
            .into_iter()
            .collect(),
        );

        let fulfillment: HashSet<RequisitionStatus> = [
            RevisionLogistica,
            EnCompra,
            AprobadoAdm,
            RechazadoAdm,
            ListoDespacho,
            Enviado,
            EntregadoParcial,
            Entregado,
        ]
        .into_iter()
        .collect();

        table.insert(Role::Logistica, fulfillment.clone());
        table.insert(Role::Administracion, fulfillment.clone());
        table.insert(Role::Receptor, fulfillment);

        table.insert(Role::Administrador, RequisitionStatus::iter().collect());

        table
    };
}

/// Listing/visibility check. Kept alongside [`capabilities`] so the two
/// tables can be audited in one place.
pub fn can_view(status: RequisitionStatus, role: Role, is_owner: bool) -> bool {
    if role == Role::Administrador || is_owner {
        return true;
    }
    VISIBLE_STATUSES
        .get(&role)
        .map(|set| set.contains(&status))
        .unwrap_or(false)
}

/// The capability engine. Hand-enumerated per role; dispatch- and
/// delivery-related capabilities span the whole dispatch band
/// (`RevisionLogistica` through `EntregadoParcial`) because the true gate
/// for those actions is the item's status, not the requisition's.
pub fn capabilities(status: RequisitionStatus, role: Role, is_owner: bool) -> CapabilitySet {
    let mut caps = CapabilitySet {
        view: can_view(status, role, is_owner),
        ..CapabilitySet::none()
    };

    match role {
        Role::Administrador => return CapabilitySet::all(),

        Role::Solicitante => {
            if is_owner && status == RequisitionStatus::Borrador {
                caps.edit = true;
                caps.delete = true;
                caps.manage_items = true;
            }
        }

        Role::Seguridad => {
            if status == RequisitionStatus::ValidacionSeguridad {
                caps.approve = true;
                caps.reject = true;
            }
        }

        Role::Gerencia => {
            if status == RequisitionStatus::ValidacionGerencia {
                caps.approve = true;
                caps.reject = true;
            }
        }

        Role::Logistica => {
            if status.in_dispatch_band() {
                caps.mark_stock = true;
                caps.create_lot = true;
                caps.dispatch = true;
            }
        }

        Role::Administracion => {
            if status.in_dispatch_band() {
                caps.validate_purchase = true;
                caps.confirm_purchase_received = true;
            }
            if status == RequisitionStatus::EnCompra {
                caps.approve = true;
                caps.reject = true;
            }
        }

        Role::Receptor => {
            if status.in_dispatch_band() {
                caps.confirm_delivery = true;
                caps.confirm_purchase_received = true;
            }
        }
    }

    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_holds_every_capability_in_every_status() {
        for status in RequisitionStatus::iter() {
            assert_eq!(
                capabilities(status, Role::Administrador, false),
                CapabilitySet::all()
            );
        }
    }

    #[test]
    fn owner_item_crud_only_in_draft() {
        for status in RequisitionStatus::iter() {
            let caps = capabilities(status, Role::Solicitante, true);
            let expected = status == RequisitionStatus::Borrador;
            assert_eq!(caps.manage_items, expected, "status {status}");
            assert_eq!(caps.edit, expected, "status {status}");
            assert_eq!(caps.delete, expected, "status {status}");
            assert!(caps.view, "owner always views their own, status {status}");
        }
    }

    #[test]
    fn non_owner_requester_sees_nothing() {
        for status in RequisitionStatus::iter() {
            let caps = capabilities(status, Role::Solicitante, false);
            assert_eq!(caps, CapabilitySet::none(), "status {status}");
        }
    }

    #[test]
    fn safety_approves_only_at_its_own_stage() {
        for status in RequisitionStatus::iter() {
            let caps = capabilities(status, Role::Seguridad, false);
            let at_stage = status == RequisitionStatus::ValidacionSeguridad;
            assert_eq!(caps.approve, at_stage, "status {status}");
            assert_eq!(caps.reject, at_stage, "status {status}");
            assert!(!caps.dispatch);
            assert!(!caps.mark_stock);
        }
    }

    #[test]
    fn dispatch_capabilities_span_the_whole_band() {
        use RequisitionStatus::*;
        for status in [RevisionLogistica, EnCompra, AprobadoAdm, ListoDespacho, Enviado, EntregadoParcial] {
            assert!(capabilities(status, Role::Logistica, false).dispatch);
            assert!(capabilities(status, Role::Logistica, false).create_lot);
            assert!(capabilities(status, Role::Receptor, false).confirm_delivery);
            assert!(capabilities(status, Role::Administracion, false).validate_purchase);
        }
        for status in [Borrador, ValidacionSeguridad, ValidacionGerencia, Entregado, Cancelado] {
            assert!(!capabilities(status, Role::Logistica, false).dispatch, "status {status}");
            assert!(!capabilities(status, Role::Receptor, false).confirm_delivery, "status {status}");
        }
    }

    #[test]
    fn mutation_capability_implies_visibility() {
        for role in Role::iter() {
            for status in RequisitionStatus::iter() {
                let caps = capabilities(status, role, false);
                if caps.grants_any_mutation() {
                    assert!(
                        can_view(status, role, false),
                        "{role} can mutate but not view in {status}"
                    );
                }
            }
        }
    }
}
