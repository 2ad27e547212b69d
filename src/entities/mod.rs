//! sea-orm entities for the requisition workflow.
//!
//! A requisition exclusively owns its items, lots and history; no item
//! outlives its requisition, and deletion is soft-only once any history
//! exists.

pub mod history_entry;
pub mod item_modification;
pub mod lot;
pub mod lot_item;
pub mod requisition;
pub mod requisition_item;

pub use lot::LotStatus;
pub use requisition::RequisitionStatus;
pub use requisition_item::ItemStatus;
