use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use leadsweep_crm::TokenManager;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    tokens: Arc<TokenManager>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub crm_tokens: HealthCheck,
    pub checked_at: String,
}

pub fn router(tokens: Arc<TokenManager>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { tokens })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    tokens: Arc<TokenManager>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(tokens)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let crm_tokens = token_check(&state.tokens).await;
    let ready = crm_tokens.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "leadsweep-server runtime initialized".to_string(),
        },
        crm_tokens,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn token_check(tokens: &TokenManager) -> HealthCheck {
    let expires_at = tokens.expires_at().await;
    if expires_at > Utc::now() {
        HealthCheck {
            status: "ready",
            detail: format!("access token valid until {}", expires_at.to_rfc3339()),
        }
    } else {
        HealthCheck {
            status: "degraded",
            detail: format!("access token expired at {}", expires_at.to_rfc3339()),
        }
    }
}
