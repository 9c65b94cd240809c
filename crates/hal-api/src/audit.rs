//! Best-effort audit trail for admin mutations.
//!
//! Called after a mutation has succeeded. A failed write is logged and
//! swallowed so it can never change the response.

use hal_core::{
  audit::{AuditAction, EntityKind, NewAuditEntry},
  store::DirectoryStore,
  user::Principal,
};
use serde_json::Value;
use tracing::warn;

/// What an admin did to which record.
#[derive(Debug, Clone)]
pub struct AuditEvent {
  pub action:    AuditAction,
  pub entity:    EntityKind,
  pub entity_id: Option<i64>,
  pub details:   Option<Value>,
}

impl AuditEvent {
  pub fn new(action: AuditAction, entity: EntityKind, entity_id: Option<i64>) -> Self {
    Self { action, entity, entity_id, details: None }
  }

  pub fn with_details(mut self, details: Value) -> Self {
    self.details = Some(details);
    self
  }
}

pub async fn record<S>(store: &S, actor: &Principal, ip_address: Option<&str>, event: AuditEvent)
where
  S: DirectoryStore,
{
  let AuditEvent { action, entity, entity_id, details } = event;
  let entry = NewAuditEntry {
    actor_id: actor.id,
    action,
    entity,
    entity_id,
    details,
    ip_address: ip_address.map(str::to_owned),
  };

  if let Err(e) = store.append_audit(entry).await {
    warn!(
      error = %e,
      actor_id = actor.id,
      action = %action,
      entity = entity.as_str(),
      ?entity_id,
      "failed to write audit entry"
    );
  }
}
