//! OAuth token management for the CRM API.
//!
//! Tokens live in process memory only. The manager is seeded from the
//! environment-sourced configuration, hands out bearer tokens to the
//! client, refreshes the pair before it expires and accepts a fresh
//! pair from the `/auth/callback` authorization-code exchange.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{error, info};

use leadsweep_core::config::CrmConfig;
use leadsweep_core::domain::TokenSet;
use leadsweep_core::workflow::GatewayError;

/// Refresh this long before the recorded expiry instant.
const REFRESH_MARGIN_SECS: i64 = 300;

struct TokenState {
    access_token: SecretString,
    refresh_token: SecretString,
    expires_at: DateTime<Utc>,
}

pub struct TokenManager {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    state: RwLock<TokenState>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, config: &CrmConfig) -> Self {
        let state = TokenState {
            access_token: config.access_token.clone(),
            refresh_token: config.refresh_token.clone(),
            expires_at: Utc::now() + Duration::seconds(config.token_expiry_secs),
        };

        Self {
            http,
            token_url: format!("https://{}/oauth2/access_token", config.domain),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            state: RwLock::new(state),
        }
    }

    /// Current access token, refreshed first when it expires within
    /// [`REFRESH_MARGIN_SECS`].
    pub async fn bearer(&self) -> Result<String, GatewayError> {
        {
            let state = self.state.read().await;
            if !expiring(state.expires_at) {
                return Ok(state.access_token.expose_secret().to_owned());
            }
        }

        let mut state = self.state.write().await;
        // Another caller may have refreshed while we waited for the
        // write lock.
        if expiring(state.expires_at) {
            let refresh_token = state.refresh_token.expose_secret().to_owned();
            let token = self
                .request_tokens(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                ])
                .await?;
            info!(
                event_name = "oauth.tokens.refreshed",
                expires_in = token.expires_in,
                "access token refreshed before expiry"
            );
            apply(&mut state, token);
        }

        Ok(state.access_token.expose_secret().to_owned())
    }

    /// Exchanges an authorization code and replaces the held pair, so
    /// a manual re-authorization re-arms the running client.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, GatewayError> {
        let token = self
            .request_tokens(&[("grant_type", "authorization_code"), ("code", code)])
            .await?;
        info!(
            event_name = "oauth.tokens.exchanged",
            expires_in = token.expires_in,
            "authorization code exchanged for tokens"
        );

        let mut state = self.state.write().await;
        let set = TokenSet {
            access_token: token.access_token.clone().into(),
            refresh_token: token.refresh_token.clone().into(),
            expires_in: token.expires_in,
        };
        apply(&mut state, token);
        Ok(set)
    }

    /// Instant the current access token stops being usable.
    pub async fn expires_at(&self) -> DateTime<Utc> {
        self.state.read().await.expires_at
    }

    async fn request_tokens(&self, grant: &[(&str, &str)]) -> Result<TokenResponse, GatewayError> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        form.extend_from_slice(grant);

        let response =
            self.http.post(&self.token_url).form(&form).send().await.map_err(|err| {
                error!(error = %err, "token endpoint request failed");
                GatewayError::Transport(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Auth(format!("token endpoint returned {status}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        if token.access_token.is_empty() {
            return Err(GatewayError::Auth("token endpoint returned empty access token".into()));
        }
        Ok(token)
    }
}

fn expiring(expires_at: DateTime<Utc>) -> bool {
    Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS) >= expires_at
}

fn apply(state: &mut TokenState, token: TokenResponse) {
    state.access_token = token.access_token.into();
    state.refresh_token = token.refresh_token.into();
    state.expires_at = Utc::now() + Duration::seconds(token.expires_in);
}
