//! Health check module
//! Provides health status for the application and its dependencies

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::error;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone)]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    db_pool: sqlx::PgPool,
}

impl HealthChecker {
    pub fn new(db_pool: sqlx::PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut overall_healthy = true;

        match timeout(Duration::from_secs(5), check_database_health(&self.db_pool)).await {
            Ok(Ok(response_time)) => {
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth::up(Some(response_time)),
                );
            }
            Ok(Err(e)) => {
                overall_healthy = false;
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth::down(Some(e.to_string())),
                );
                error!("Database health check failed: {}", e);
            }
            Err(_) => {
                overall_healthy = false;
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth::down(Some("Timeout".to_string())),
                );
                error!("Database health check timed out");
            }
        }

        health_status.status = if overall_healthy {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };

        health_status
    }
}

pub async fn check_database_health(pool: &sqlx::PgPool) -> Result<u128, sqlx::Error> {
    let start = Instant::now();
    sqlx::query("SELECT 1").fetch_one(pool).await?;
    Ok(start.elapsed().as_millis())
}

/// State for the health endpoint
#[derive(Clone)]
pub struct HealthApiState {
    pub checker: HealthChecker,
}

/// GET /health
pub async fn health(State(state): State<HealthApiState>) -> impl IntoResponse {
    let status = state.checker.check_health().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_creation() {
        let health_status = HealthStatus::new();
        assert!(matches!(health_status.status, HealthState::Healthy));
        assert!(health_status.checks.is_empty());
        assert!(health_status.timestamp <= chrono::Utc::now());
    }

    #[test]
    fn test_component_health_states() {
        let up_health = ComponentHealth::up(Some(100));
        assert!(matches!(up_health.status, ComponentState::Up));
        assert_eq!(up_health.response_time_ms, Some(100));

        let down_health = ComponentHealth::down(Some("Test error".to_string()));
        assert!(matches!(down_health.status, ComponentState::Down));
        assert_eq!(down_health.details, Some("Test error".to_string()));
    }
}
