//! Shared test harness: an in-memory SQLite database with the full schema,
//! wired services, a drained event channel and one actor per role.

use std::sync::Arc;

use sea_orm::{ConnectionTrait, Database, DbBackend, Schema};
use uuid::Uuid;

use almacen_api::auth::{Actor, Role, StaticUserDirectory};
use almacen_api::entities::{
    history_entry, item_modification, lot, lot_item, requisition, requisition_item,
};
use almacen_api::events;
use almacen_api::notifications::RecordingNotificationService;
use almacen_api::services::items::NewItemInput;
use almacen_api::services::requisitions::CreateRequisitionInput;
use almacen_api::services::{build_services, AppServices};

pub struct TestApp {
    pub services: AppServices,
    pub notifier: Arc<RecordingNotificationService>,
    pub requester: Actor,
    pub safety: Actor,
    pub manager: Actor,
    pub logistics: Actor,
    pub administration: Actor,
    pub receiver: Actor,
    pub admin: Actor,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");

        let schema = Schema::new(DbBackend::Sqlite);
        let backend = db.get_database_backend();
        db.execute(backend.build(&schema.create_table_from_entity(requisition::Entity)))
            .await
            .expect("create requisitions");
        db.execute(backend.build(&schema.create_table_from_entity(requisition_item::Entity)))
            .await
            .expect("create requisition_items");
        db.execute(backend.build(&schema.create_table_from_entity(lot::Entity)))
            .await
            .expect("create lots");
        db.execute(backend.build(&schema.create_table_from_entity(lot_item::Entity)))
            .await
            .expect("create lot_items");
        db.execute(backend.build(&schema.create_table_from_entity(history_entry::Entity)))
            .await
            .expect("create requisition_history");
        db.execute(backend.build(&schema.create_table_from_entity(item_modification::Entity)))
            .await
            .expect("create item_modifications");

        let (event_sender, receiver_chan) = events::channel(64);
        tokio::spawn(events::process_events(receiver_chan));

        let requester = Actor::new(Uuid::new_v4(), Role::Solicitante);
        let safety = Actor::new(Uuid::new_v4(), Role::Seguridad);
        let manager = Actor::new(Uuid::new_v4(), Role::Gerencia);
        let logistics = Actor::new(Uuid::new_v4(), Role::Logistica);
        let administration = Actor::new(Uuid::new_v4(), Role::Administracion);
        let receiver = Actor::new(Uuid::new_v4(), Role::Receptor);
        let admin = Actor::new(Uuid::new_v4(), Role::Administrador);

        let directory = StaticUserDirectory::new()
            .with_user(Role::Solicitante, requester.id)
            .with_user(Role::Seguridad, safety.id)
            .with_user(Role::Gerencia, manager.id)
            .with_user(Role::Logistica, logistics.id)
            .with_user(Role::Administracion, administration.id)
            .with_user(Role::Receptor, receiver.id)
            .with_user(Role::Administrador, admin.id);

        let notifier = Arc::new(RecordingNotificationService::new());
        let services = build_services(
            Arc::new(db),
            Arc::new(event_sender),
            notifier.clone(),
            Arc::new(directory),
        );

        Self {
            services,
            notifier,
            requester,
            safety,
            manager,
            logistics,
            administration,
            receiver,
            admin,
        }
    }

    /// A draft with the given `(description, quantity)` items.
    pub async fn create_draft(&self, items: &[(&str, i32)]) -> requisition::Model {
        let input = CreateRequisitionInput {
            operating_unit: "Planta Norte".to_string(),
            cost_center: "CC-100".to_string(),
            reason: "Mantenimiento preventivo".to_string(),
            items: items
                .iter()
                .map(|(description, qty)| NewItemInput {
                    description: description.to_string(),
                    unit: "unidad".to_string(),
                    cantidad_solicitada: *qty,
                })
                .collect(),
        };
        self.services
            .requisitions
            .create(&self.requester, input)
            .await
            .expect("create draft")
    }

    /// Drives a draft through submission and both approval stages, leaving
    /// it in logistics review.
    pub async fn advance_to_logistics(&self, requisition_id: Uuid) -> requisition::Model {
        self.services
            .requisitions
            .submit(&self.requester, requisition_id)
            .await
            .expect("submit");
        self.services
            .requisitions
            .approve(&self.safety, requisition_id, None)
            .await
            .expect("safety approval");
        self.services
            .requisitions
            .approve(&self.manager, requisition_id, None)
            .await
            .expect("management approval")
    }

    pub async fn items_of(&self, requisition_id: Uuid) -> Vec<requisition_item::Model> {
        self.services
            .items
            .list_items(&self.admin, requisition_id)
            .await
            .expect("list items")
    }
}
