use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(pub i64);

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for StatusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contact record as the CRM returns it embedded in a lead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub phone: Option<String>,
}

/// A sales lead. Contacts keep the CRM's order; the first one is the
/// primary contact and carries the phone used for duplicate matching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    pub pipeline_id: PipelineId,
    pub status_id: StatusId,
    pub contacts: Vec<Contact>,
}

impl Lead {
    pub fn primary_contact(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    pub fn contact_ids(&self) -> Vec<ContactId> {
        self.contacts.iter().map(|contact| contact.id).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    pub statuses: Vec<StatusId>,
}

/// One (pipeline, status) pair in a lead-list filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRef {
    pub pipeline_id: PipelineId,
    pub status_id: StatusId,
}

/// Filter for the CRM lead-list call: a set of status references and
/// an optional phone-type contact query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeadFilter {
    pub statuses: Vec<StatusRef>,
    pub contact_phone: Option<String>,
}

impl LeadFilter {
    /// All leads currently sitting in one stage of one pipeline.
    pub fn stage(pipeline_id: PipelineId, status_id: StatusId) -> Self {
        Self { statuses: vec![StatusRef { pipeline_id, status_id }], contact_phone: None }
    }

    /// Leads anywhere in `pipeline` whose contact matches `phone_pattern`.
    pub fn duplicates_in(pipeline: &Pipeline, phone_pattern: &str) -> Self {
        Self {
            statuses: pipeline
                .statuses
                .iter()
                .map(|&status_id| StatusRef { pipeline_id: pipeline.id, status_id })
                .collect(),
            contact_phone: Some(phone_pattern.to_owned()),
        }
    }
}

/// An OAuth token pair. Held in process memory only; nothing here is
/// ever written to disk.
#[derive(Clone)]
pub struct TokenSet {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_in: i64,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
