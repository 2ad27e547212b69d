//! Identity collaborator seam.
//!
//! The core never authenticates. The surrounding system resolves whoever is
//! acting into an [`Actor`] (`{ id, role }`) and passes it into every
//! operation; authorization against that tuple happens in
//! [`crate::workflow::permissions`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The seven domain roles. There is no inheritance or composition; each
/// role maps to a hand-enumerated capability table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Requester: owns the requisitions they create.
    Solicitante,
    /// Safety reviewer, first approval stage.
    Seguridad,
    /// Management reviewer, second approval stage.
    Gerencia,
    /// Logistics: classification, lots, dispatch.
    Logistica,
    /// Procurement / administration: purchase validation.
    Administracion,
    /// Warehouse receiver: receipt confirmation.
    Receptor,
    /// System administrator: union of all capabilities.
    Administrador,
}

/// The acting user as resolved by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrador
    }
}

/// Resolves the active users holding a given role, for notification fan-out.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn active_users_with_role(&self, role: Role) -> Vec<Uuid>;
}

/// Fixed in-memory directory. Production deployments wire a real directory
/// behind the trait; tests and tools use this one.
#[derive(Debug, Default, Clone)]
pub struct StaticUserDirectory {
    users: HashMap<Role, Vec<Uuid>>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, role: Role, user_id: Uuid) -> Self {
        self.users.entry(role).or_default().push(user_id);
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn active_users_with_role(&self, role: Role) -> Vec<Uuid> {
        self.users.get(&role).cloned().unwrap_or_default()
    }
}
