//! CRM v4 REST client.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use leadsweep_core::config::CrmConfig;
use leadsweep_core::domain::{Contact, ContactId, Lead, LeadFilter, LeadId, Pipeline, PipelineId, StatusId};
use leadsweep_core::workflow::{CrmGateway, GatewayError};

use crate::oauth::TokenManager;
use crate::types::{
    ContactMergeRequest, ContactPayload, LeadListResponse, LeadMergeRequest, LeadPayload,
    LeadUpdateEntry, PipelineListResponse,
};

pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenManager>,
}

impl CrmClient {
    pub fn new(http: reqwest::Client, config: &CrmConfig, tokens: Arc<TokenManager>) -> Self {
        Self { http, base_url: format!("https://{}", config.domain), tokens }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let bearer = self.tokens.bearer().await?;
        let response = request
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GatewayError::Auth(format!("crm rejected credentials with {status}")));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = %status, "crm request failed");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        Ok(response)
    }

    async fn decode<T: serde::de::DeserializeOwned + Default>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        // List endpoints answer 204 when nothing matches.
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(T::default());
        }
        response.json::<T>().await.map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

/// Query pairs for the lead-list filter: one `pipeline_id`/`status_id`
/// pair per status reference, plus the phone-type contact query when
/// searching for duplicates.
fn lead_query_pairs(filter: &LeadFilter) -> Vec<(String, String)> {
    let mut pairs = vec![("with".to_string(), "contacts".to_string())];
    for (index, status) in filter.statuses.iter().enumerate() {
        pairs.push((
            format!("filter[statuses][{index}][pipeline_id]"),
            status.pipeline_id.to_string(),
        ));
        pairs.push((
            format!("filter[statuses][{index}][status_id]"),
            status.status_id.to_string(),
        ));
    }
    if let Some(phone) = &filter.contact_phone {
        pairs.push(("filter[contacts][query]".to_string(), phone.clone()));
        pairs.push(("filter[contacts][type]".to_string(), "phone".to_string()));
    }
    pairs
}

fn truncate(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        message.to_string()
    } else {
        message.chars().take(limit).collect()
    }
}

#[async_trait]
impl CrmGateway for CrmClient {
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, GatewayError> {
        let request = self
            .http
            .get(self.endpoint("/api/v4/leads"))
            .query(&lead_query_pairs(filter));
        let response = self.send(request).await?;
        let leads = Self::decode::<LeadListResponse>(response).await?.into_leads();
        debug!(count = leads.len(), "lead list fetched");
        Ok(leads)
    }

    async fn update_lead_status(
        &self,
        lead_id: LeadId,
        pipeline_id: PipelineId,
        status_id: StatusId,
    ) -> Result<(), GatewayError> {
        let body = vec![LeadUpdateEntry {
            id: lead_id.0,
            status_id: status_id.0,
            pipeline_id: pipeline_id.0,
        }];
        let request = self.http.patch(self.endpoint("/api/v4/leads")).json(&body);
        self.send(request).await?;
        Ok(())
    }

    async fn merge_leads(&self, primary: LeadId, duplicate: LeadId) -> Result<Lead, GatewayError> {
        let request = self
            .http
            .post(self.endpoint(&format!("/api/v4/leads/{primary}/merge")))
            .json(&LeadMergeRequest { source_id: duplicate.0 });
        let response = self.send(request).await?;
        let payload = response
            .json::<LeadPayload>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        Ok(payload.into_domain())
    }

    async fn merge_contacts(
        &self,
        sources: Vec<ContactId>,
        target: ContactId,
    ) -> Result<Contact, GatewayError> {
        let request = self
            .http
            .post(self.endpoint(&format!("/api/v4/contacts/{target}/merge")))
            .json(&ContactMergeRequest { source_ids: sources.iter().map(|id| id.0).collect() });
        let response = self.send(request).await?;
        let payload = response
            .json::<ContactPayload>()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        Ok(payload.into_domain())
    }

    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, GatewayError> {
        let request = self.http.get(self.endpoint("/api/v4/pipelines"));
        let response = self.send(request).await?;
        Ok(Self::decode::<PipelineListResponse>(response).await?.into_pipelines())
    }
}
