//! OAuth callback endpoint.
//!
//! The CRM redirects the operator's browser here after they approve
//! the integration. The authorization code is exchanged for a token
//! pair; the caller only ever sees a plain-text success or a generic
//! failure, error detail stays in the server log.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{error, info};

use leadsweep_core::domain::TokenSet;
use leadsweep_core::workflow::GatewayError;
use leadsweep_crm::TokenManager;

const SUCCESS_BODY: &str = "Authorization completed successfully";
const FAILURE_BODY: &str = "Failed to process the authorization code";

/// Seam over the token manager so the 200/500 contract is testable
/// without a live token endpoint.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<TokenSet, GatewayError>;
}

#[async_trait]
impl CodeExchanger for TokenManager {
    async fn exchange(&self, code: &str) -> Result<TokenSet, GatewayError> {
        self.exchange_code(code).await
    }
}

#[derive(Clone)]
struct AuthState {
    exchanger: Arc<dyn CodeExchanger>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
}

pub fn router(exchanger: Arc<dyn CodeExchanger>) -> Router {
    Router::new().route("/auth/callback", get(auth_callback)).with_state(AuthState { exchanger })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    exchanger: Arc<dyn CodeExchanger>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.auth.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "oauth callback endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(exchanger)).await {
            error!(
                event_name = "system.auth.error",
                correlation_id = "bootstrap",
                error = %error,
                "oauth callback server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

async fn auth_callback(
    State(state): State<AuthState>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, &'static str) {
    let Some(code) = query.code.filter(|code| !code.trim().is_empty()) else {
        error!(
            event_name = "ingress.auth.callback_rejected",
            "authorization callback arrived without a code"
        );
        return (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_BODY);
    };

    match state.exchanger.exchange(&code).await {
        Ok(tokens) => {
            info!(
                event_name = "ingress.auth.tokens_received",
                expires_in = tokens.expires_in,
                "authorization code exchanged; tokens installed"
            );
            (StatusCode::OK, SUCCESS_BODY)
        }
        Err(exchange_error) => {
            error!(
                event_name = "ingress.auth.exchange_failed",
                error = %exchange_error,
                "authorization code exchange failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_BODY)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        extract::{Query, State},
        http::StatusCode,
    };

    use leadsweep_core::domain::TokenSet;
    use leadsweep_core::workflow::GatewayError;

    use super::{auth_callback, AuthState, CallbackQuery, CodeExchanger, FAILURE_BODY, SUCCESS_BODY};

    struct FakeExchanger {
        accept: &'static str,
    }

    #[async_trait]
    impl CodeExchanger for FakeExchanger {
        async fn exchange(&self, code: &str) -> Result<TokenSet, GatewayError> {
            if code == self.accept {
                Ok(TokenSet {
                    access_token: "new-access".to_string().into(),
                    refresh_token: "new-refresh".to_string().into(),
                    expires_in: 86_400,
                })
            } else {
                Err(GatewayError::Auth("token endpoint returned 400 Bad Request".to_owned()))
            }
        }
    }

    fn state() -> AuthState {
        AuthState { exchanger: Arc::new(FakeExchanger { accept: "good-code" }) }
    }

    #[tokio::test]
    async fn accepted_code_returns_200_with_success_body() {
        let (status, body) = auth_callback(
            State(state()),
            Query(CallbackQuery { code: Some("good-code".to_owned()) }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, SUCCESS_BODY);
    }

    #[tokio::test]
    async fn rejected_code_returns_500_with_generic_body() {
        let (status, body) = auth_callback(
            State(state()),
            Query(CallbackQuery { code: Some("bad-code".to_owned()) }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, FAILURE_BODY);
    }

    #[tokio::test]
    async fn missing_code_returns_500_with_generic_body() {
        let (status, body) =
            auth_callback(State(state()), Query(CallbackQuery { code: None })).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, FAILURE_BODY);
    }
}
