//! Warehouse requisition workflow engine.
//!
//! Requisitions move through a role-gated approval pipeline into
//! fulfillment, where per-item classification, purchasing and partial
//! lot dispatch are reconciled back into a single aggregate status.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod notifications;
pub mod services;
pub mod workflow;

use std::sync::Arc;

use crate::auth::UserDirectory;
use crate::notifications::NotificationService;

/// Shared application state wiring the pool, the event channel and the
/// workflow services together.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: services::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
        notifier: Arc<dyn NotificationService>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let services =
            services::build_services(db.clone(), event_sender.clone(), notifier, directory);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}
