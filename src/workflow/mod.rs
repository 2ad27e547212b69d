//! The dual-level workflow engine: pure, I/O-free policy.
//!
//! - [`permissions`]: role capability tables gating every mutation.
//! - [`item_transitions`] / [`lot_transitions`]: explicit status machines.
//! - [`approvals`]: the requisition-level approval/rejection table.
//! - [`reconciliation`]: quantity aggregation across lots and the
//!   fixed-priority derivation of requisition status from item statuses.
//!
//! Services in [`crate::services`] compose these against persistent state.

pub mod approvals;
pub mod item_transitions;
pub mod lot_transitions;
pub mod permissions;
pub mod reconciliation;

pub use permissions::{capabilities, can_view, CapabilitySet};
