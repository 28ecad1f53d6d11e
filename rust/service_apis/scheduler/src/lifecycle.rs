//! Managed service lifecycle (§4.5): long-lived components (the worker
//! pool itself, ingestion, any resource-backed collaborator) implement this
//! five-state machine. Transitions drive resource advertisement in §4.4.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use vault_db::node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ServiceStateChanged {
    pub service_id: String,
    pub old_state: ServiceState,
    pub new_state: ServiceState,
}

/// A minimal valid transition table for the five states (§4.5). `Failed` is
/// reachable from any active state; `Stopped` is only reached via
/// `Stopping`.
fn is_valid_transition(from: ServiceState, to: ServiceState) -> bool {
    use ServiceState::*;
    matches!(
        (from, to),
        (Stopped, Starting)
            | (Starting, Running)
            | (Starting, Failed)
            | (Running, Stopping)
            | (Running, Failed)
            | (Stopping, Stopped)
            | (Stopping, Failed)
    )
}

/// Tracks every declared service's state and its ordered dependencies, and
/// cascades a dependency's FAILED transition to dependents (§4.5). Also the
/// single place resource advertisement is driven from (§4.4): a service
/// reaching RUNNING advertises its resource name; leaving it (STOPPED or
/// FAILED) retracts it.
pub struct ServiceLifecycle {
    pool: sqlx::PgPool,
    node_id: String,
    states: RwLock<HashMap<String, ServiceState>>,
    dependents: RwLock<HashMap<String, Vec<String>>>,
    events_tx: broadcast::Sender<ServiceStateChanged>,
}

impl ServiceLifecycle {
    pub fn new(pool: sqlx::PgPool, node_id: impl Into<String>) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            pool,
            node_id: node_id.into(),
            states: RwLock::new(HashMap::new()),
            dependents: RwLock::new(HashMap::new()),
            events_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceStateChanged> {
        self.events_tx.subscribe()
    }

    /// Declare `service_id` depends on `depends_on` — when `depends_on`
    /// transitions to FAILED, `service_id` cascades to FAILED too.
    pub async fn declare_dependency(&self, service_id: &str, depends_on: &str) {
        let mut dependents = self.dependents.write().await;
        dependents
            .entry(depends_on.to_string())
            .or_default()
            .push(service_id.to_string());
    }

    pub async fn state_of(&self, service_id: &str) -> ServiceState {
        self.states
            .read()
            .await
            .get(service_id)
            .copied()
            .unwrap_or(ServiceState::Stopped)
    }

    pub async fn transition(
        &self,
        service_id: &str,
        resource_name: Option<&str>,
        new_state: ServiceState,
    ) {
        let old_state = self.state_of(service_id).await;
        if !is_valid_transition(old_state, new_state) {
            log::warn!(
                "rejected invalid service transition {service_id}: {old_state:?} -> {new_state:?}"
            );
            return;
        }

        self.states
            .write()
            .await
            .insert(service_id.to_string(), new_state);

        if let Some(resource_name) = resource_name {
            match new_state {
                ServiceState::Running => {
                    if let Err(e) = node::advertise_resource(&self.pool, resource_name, &self.node_id).await {
                        log::error!("failed to advertise resource {resource_name}: {e}");
                    }
                }
                ServiceState::Stopped | ServiceState::Failed => {
                    if let Err(e) = node::retract_resource(&self.pool, resource_name).await {
                        log::error!("failed to retract resource {resource_name}: {e}");
                    }
                }
                _ => {}
            }
        }

        let _ = self.events_tx.send(ServiceStateChanged {
            service_id: service_id.to_string(),
            old_state,
            new_state,
        });

        if new_state == ServiceState::Failed {
            self.cascade_failure(service_id).await;
        }
    }

    async fn cascade_failure(&self, service_id: &str) {
        let dependents = self
            .dependents
            .read()
            .await
            .get(service_id)
            .cloned()
            .unwrap_or_default();
        for dependent in dependents {
            log::warn!("cascading failure from {service_id} to dependent {dependent}");
            Box::pin(self.transition(&dependent, None, ServiceState::Failed)).await;
        }
    }
}
