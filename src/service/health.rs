//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the duet signaling
//! service, including readiness and liveness probes.

use crate::service::app::ServiceHandle;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub live_connections: usize,
    /// Connections waiting for a partner
    pub waiting: usize,
    pub open_proposals: usize,
    /// Connections with a confirmed partner
    pub matched_connections: usize,
    /// Matches confirmed since service start
    pub matches_confirmed: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(handle: &ServiceHandle) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(handle).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let engine_check = Self::check_matchmaking(handle).await;
        if engine_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if engine_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(engine_check);

        let stats = Self::gather_service_stats(handle).await;

        Ok(HealthCheck {
            status: overall_status,
            service: handle.service_name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(handle: &ServiceHandle) -> Result<HealthStatus> {
        if handle.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(handle: &ServiceHandle) -> Result<HealthStatus> {
        if !handle.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_matchmaking(handle).await.status)
    }

    async fn check_service_running(handle: &ServiceHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if handle.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The engine is degraded when its internal invariants no longer hold
    async fn check_matchmaking(handle: &ServiceHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match handle.engine().verify_invariants().await {
            Ok(()) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Matchmaking invariant check failed: {}", e);
                (HealthStatus::Degraded, Some(e.to_string()))
            }
        };

        ComponentCheck {
            name: "matchmaking".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn gather_service_stats(handle: &ServiceHandle) -> ServiceStats {
        let stats = handle.engine().get_stats().await;

        ServiceStats {
            live_connections: stats.live_connections,
            waiting: stats.waiting,
            open_proposals: stats.open_proposals,
            matched_connections: stats.matched_connections,
            matches_confirmed: stats.matches_confirmed,
            uptime_seconds: handle.uptime().as_secs(),
        }
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::MatchmakingEngine;
    use crate::registry::InMemoryConnectionRegistry;
    use std::sync::Arc;

    fn create_handle() -> ServiceHandle {
        let registry = Arc::new(InMemoryConnectionRegistry::new());
        ServiceHandle::new("duet-test", MatchmakingEngine::new(registry))
    }

    #[tokio::test]
    async fn test_stopped_service_is_unhealthy() {
        let handle = create_handle();

        assert_eq!(
            HealthCheck::liveness_check(&handle).await.unwrap(),
            HealthStatus::Unhealthy
        );
        let health = HealthCheck::check(&handle).await.unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_running_service_reports_stats() {
        let handle = create_handle();
        handle.set_running(true).await;

        let health = HealthCheck::check(&handle).await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.service, "duet-test");
        assert_eq!(health.checks.len(), 2);
        assert_eq!(health.stats.waiting, 0);
        assert_eq!(
            HealthCheck::readiness_check(&handle).await.unwrap(),
            HealthStatus::Healthy
        );
        assert!(health.to_json().unwrap().contains("\"healthy\""));
    }
}
