//! Serde payloads for the CRM v4 REST API.
//!
//! List endpoints wrap their collections in an `_embedded` envelope
//! and answer `204 No Content` instead of an empty collection; the
//! conversions here flatten both into plain domain values.

use serde::{Deserialize, Serialize};

use leadsweep_core::domain::{Contact, ContactId, Lead, LeadId, Pipeline, PipelineId, StatusId};

#[derive(Debug, Default, Deserialize)]
pub struct LeadListResponse {
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedLeads>,
}

impl LeadListResponse {
    pub fn into_leads(self) -> Vec<Lead> {
        self.embedded
            .map(|embedded| embedded.leads.into_iter().map(LeadPayload::into_domain).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbeddedLeads {
    #[serde(default)]
    pub leads: Vec<LeadPayload>,
}

#[derive(Debug, Deserialize)]
pub struct LeadPayload {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub pipeline_id: i64,
    pub status_id: i64,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedContacts>,
}

impl LeadPayload {
    pub fn into_domain(self) -> Lead {
        Lead {
            id: LeadId(self.id),
            name: self.name,
            pipeline_id: PipelineId(self.pipeline_id),
            status_id: StatusId(self.status_id),
            contacts: self
                .embedded
                .map(|embedded| {
                    embedded.contacts.into_iter().map(ContactPayload::into_domain).collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbeddedContacts {
    #[serde(default)]
    pub contacts: Vec<ContactPayload>,
}

#[derive(Debug, Deserialize)]
pub struct ContactPayload {
    pub id: i64,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ContactPayload {
    pub fn into_domain(self) -> Contact {
        Contact { id: ContactId(self.id), phone: self.phone }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PipelineListResponse {
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedPipelines>,
}

impl PipelineListResponse {
    pub fn into_pipelines(self) -> Vec<Pipeline> {
        self.embedded
            .map(|embedded| {
                embedded.pipelines.into_iter().map(PipelinePayload::into_domain).collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbeddedPipelines {
    #[serde(default)]
    pub pipelines: Vec<PipelinePayload>,
}

#[derive(Debug, Deserialize)]
pub struct PipelinePayload {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedStatuses>,
}

impl PipelinePayload {
    pub fn into_domain(self) -> Pipeline {
        Pipeline {
            id: PipelineId(self.id),
            name: self.name,
            statuses: self
                .embedded
                .map(|embedded| {
                    embedded.statuses.into_iter().map(|status| StatusId(status.id)).collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EmbeddedStatuses {
    #[serde(default)]
    pub statuses: Vec<StatusPayload>,
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub id: i64,
}

/// One entry of the bulk status-update request body.
#[derive(Debug, Serialize)]
pub struct LeadUpdateEntry {
    pub id: i64,
    pub status_id: i64,
    pub pipeline_id: i64,
}

#[derive(Debug, Serialize)]
pub struct LeadMergeRequest {
    pub source_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ContactMergeRequest {
    pub source_ids: Vec<i64>,
}
