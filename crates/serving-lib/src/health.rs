//! Liveness and readiness probes for the prediction server
//!
//! Components report their state into a shared registry; the probe
//! endpoints fold the component states into a single process-level answer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    /// A degraded component still serves traffic; an unhealthy one does not.
    pub fn is_operational(&self) -> bool {
        !matches!(self, ComponentStatus::Unhealthy)
    }
}

/// Latest reported state of one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checked_at: i64,
}

impl ComponentHealth {
    fn report(status: ComponentStatus, detail: Option<String>) -> Self {
        Self {
            status,
            detail,
            checked_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::report(ComponentStatus::Healthy, None)
    }

    pub fn degraded(detail: impl Into<String>) -> Self {
        Self::report(ComponentStatus::Degraded, Some(detail.into()))
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self::report(ComponentStatus::Unhealthy, Some(detail.into()))
    }
}

/// Payload of the liveness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Payload of the readiness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names tracked by the serving process.
pub mod components {
    pub const REGISTRY: &str = "registry";
    pub const CACHE: &str = "cache";
    pub const PREDICTOR: &str = "predictor";
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared registry of component health, backing `/healthz` and `/readyz`.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a component's latest state, inserting it on first report.
    pub async fn report(&self, name: &str, health: ComponentHealth) {
        let mut state = self.state.write().await;
        state.components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.report(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, detail: impl Into<String>) {
        self.report(name, ComponentHealth::degraded(detail)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, detail: impl Into<String>) {
        self.report(name, ComponentHealth::unhealthy(detail)).await;
    }

    /// Flip readiness once startup wiring is complete (or lost again).
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: overall_status(&state.components),
            components: state.components.clone(),
        }
    }

    /// Ready only after startup completed and while every component is at
    /// least operational.
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("Serving core still starting".to_string()),
            };
        }
        match state
            .components
            .iter()
            .find(|(_, health)| !health.status.is_operational())
        {
            Some((name, _)) => ReadinessResponse {
                ready: false,
                reason: Some(format!("Component '{}' is unhealthy", name)),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

/// Worst component state wins; an empty registry counts as healthy.
fn overall_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
    let mut status = ComponentStatus::Healthy;
    for health in components.values() {
        match health.status {
            ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
            ComponentStatus::Degraded => status = ComponentStatus::Degraded,
            ComponentStatus::Healthy => {}
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_reported_component_appears_in_health() {
        let registry = HealthRegistry::new();
        registry.set_healthy(components::REGISTRY).await;

        let health = registry.health().await;
        assert_eq!(
            health.components[components::REGISTRY].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_degraded_component_degrades_overall_status() {
        let registry = HealthRegistry::new();
        registry.set_healthy(components::PREDICTOR).await;
        registry
            .set_degraded(components::CACHE, "Eviction churn above threshold")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_unhealthy_component_wins_over_degraded() {
        let registry = HealthRegistry::new();
        registry.set_degraded(components::CACHE, "Eviction churn").await;
        registry
            .set_unhealthy(components::REGISTRY, "Artifact store unreachable")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(health.components[components::REGISTRY]
            .detail
            .as_deref()
            .unwrap()
            .contains("unreachable"));
    }

    #[tokio::test]
    async fn test_not_ready_before_startup_completes() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("starting"));
    }

    #[tokio::test]
    async fn test_ready_after_startup() {
        let registry = HealthRegistry::new();
        registry.set_healthy(components::PREDICTOR).await;
        registry.set_ready(true).await;

        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
    }

    #[tokio::test]
    async fn test_degraded_component_stays_ready() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry.set_degraded(components::CACHE, "Eviction churn").await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_component_revokes_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry
            .set_unhealthy(components::REGISTRY, "Artifact store unreachable")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("registry"));
    }

    #[tokio::test]
    async fn test_recovered_component_restores_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry.set_unhealthy(components::PREDICTOR, "Scaler failed").await;
        assert!(!registry.readiness().await.ready);

        registry.set_healthy(components::PREDICTOR).await;
        assert!(registry.readiness().await.ready);
    }
}
