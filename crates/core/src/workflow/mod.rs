//! Lead deduplication workflow.
//!
//! One cycle fetches every lead sitting in the configured source stage,
//! looks for other leads sharing the primary contact's phone number
//! across all pipelines, merges the matches (or advances the lead when
//! there are none) and notifies the operator chat. Errors are scoped to
//! the smallest unit they occur in: a failed merge attempt never blocks
//! the next duplicate, and a failed lead never blocks the rest of the
//! batch. Only an empty or failed fetch aborts a cycle.
//!
//! The CRM and the chat are reached through the [`CrmGateway`] and
//! [`Notifier`] traits so the whole state machine is testable against
//! in-memory fakes.

pub mod report;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Contact, ContactId, Lead, LeadFilter, LeadId, Pipeline, PipelineId, StatusId};
use crate::phone::normalize_phone;

pub use report::{CycleReport, Disposition, FailureStage, LeadOutcome, MergeAttempt, Trigger};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("crm transport failed: {0}")]
    Transport(String),
    #[error("crm returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("crm response could not be decoded: {0}")]
    Decode(String),
    #[error("crm authorization failed: {0}")]
    Auth(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification send failed: {0}")]
    Send(String),
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("no leads to process")]
    NoLeads,
    #[error("a processing cycle is already running")]
    Overlapping,
    #[error("lead fetch failed: {0}")]
    Fetch(#[source] GatewayError),
}

#[derive(Debug, Error)]
enum MergeError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("duplicate lead {0} has no primary contact to merge into")]
    MissingTargetContact(LeadId),
}

/// Read/write operations this workflow needs from the CRM.
#[async_trait]
pub trait CrmGateway: Send + Sync {
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, GatewayError>;

    async fn update_lead_status(
        &self,
        lead_id: LeadId,
        pipeline_id: PipelineId,
        status_id: StatusId,
    ) -> Result<(), GatewayError>;

    /// Merges `duplicate` into `primary` and returns the surviving lead.
    async fn merge_leads(&self, primary: LeadId, duplicate: LeadId) -> Result<Lead, GatewayError>;

    /// Merges `sources` into `target` and returns the surviving contact.
    async fn merge_contacts(
        &self,
        sources: Vec<ContactId>,
        target: ContactId,
    ) -> Result<Contact, GatewayError>;

    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, GatewayError>;
}

/// Outbound operator notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _text: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WorkflowSettings {
    pub pipeline_id: PipelineId,
    pub source_status_id: StatusId,
    pub target_status_id: StatusId,
    pub search_concurrency: usize,
}

pub struct LeadProcessor {
    crm: Arc<dyn CrmGateway>,
    notifier: Arc<dyn Notifier>,
    settings: WorkflowSettings,
    // Guards against overlapping cycles from the timer and the chat
    // command racing each other over the same CRM records.
    run_guard: Mutex<()>,
}

impl LeadProcessor {
    pub fn new(
        crm: Arc<dyn CrmGateway>,
        notifier: Arc<dyn Notifier>,
        settings: WorkflowSettings,
    ) -> Self {
        Self { crm, notifier, settings, run_guard: Mutex::new(()) }
    }

    /// Runs one full processing cycle and returns the per-lead report.
    ///
    /// A second invocation while a cycle is in flight returns
    /// [`CycleError::Overlapping`] without touching the CRM.
    pub async fn run_cycle(&self, trigger: Trigger) -> Result<CycleReport, CycleError> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            return Err(CycleError::Overlapping);
        };

        let cycle_id = Uuid::new_v4().simple().to_string();
        let started_at = Utc::now();
        info!(
            event_name = "workflow.cycle.started",
            cycle_id = %cycle_id,
            trigger = %trigger,
            "processing cycle started"
        );

        let filter =
            LeadFilter::stage(self.settings.pipeline_id, self.settings.source_status_id);
        let leads = self.crm.list_leads(&filter).await.map_err(CycleError::Fetch)?;
        if leads.is_empty() {
            return Err(CycleError::NoLeads);
        }

        let mut outcomes = Vec::with_capacity(leads.len());
        for lead in leads {
            let outcome = self.process_lead(&cycle_id, lead).await;
            outcomes.push(outcome);
        }

        let report = CycleReport {
            cycle_id: cycle_id.clone(),
            trigger,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        info!(
            event_name = "workflow.cycle.finished",
            cycle_id = %cycle_id,
            summary = %report.summary(),
            "processing cycle finished"
        );
        Ok(report)
    }

    async fn process_lead(&self, cycle_id: &str, lead: Lead) -> LeadOutcome {
        let Some(primary) = lead.primary_contact() else {
            warn!(
                event_name = "workflow.lead.skipped",
                cycle_id = %cycle_id,
                lead_id = %lead.id,
                "lead has no contacts; skipping"
            );
            return LeadOutcome::skipped(&lead, "lead has no contacts");
        };

        let pattern = normalize_phone(primary.phone.as_deref().unwrap_or(""));
        if pattern.is_empty() {
            warn!(
                event_name = "workflow.lead.skipped",
                cycle_id = %cycle_id,
                lead_id = %lead.id,
                "primary contact has no phone; skipping"
            );
            return LeadOutcome::skipped(&lead, "primary contact has no phone");
        }

        let duplicates = match self.find_duplicates(lead.id, &pattern).await {
            Ok(duplicates) => duplicates,
            Err(error) => {
                warn!(
                    event_name = "workflow.lead.search_failed",
                    cycle_id = %cycle_id,
                    lead_id = %lead.id,
                    error = %error,
                    "duplicate search failed"
                );
                return LeadOutcome::failed(&lead, FailureStage::DuplicateSearch, &error);
            }
        };

        if duplicates.is_empty() {
            return self.advance_lead(cycle_id, lead).await;
        }

        let mut attempts = Vec::with_capacity(duplicates.len());
        for duplicate in duplicates {
            match self.merge_pair(&lead, &duplicate).await {
                Ok(()) => {
                    info!(
                        event_name = "workflow.lead.merged",
                        cycle_id = %cycle_id,
                        lead_id = %lead.id,
                        duplicate_id = %duplicate.id,
                        "leads merged"
                    );
                    let notified = self.notify_processed(cycle_id, &lead).await;
                    attempts.push(MergeAttempt::succeeded(duplicate.id, notified));
                }
                Err(error) => {
                    warn!(
                        event_name = "workflow.lead.merge_failed",
                        cycle_id = %cycle_id,
                        lead_id = %lead.id,
                        duplicate_id = %duplicate.id,
                        error = %error,
                        "merge attempt failed; continuing with remaining duplicates"
                    );
                    attempts.push(MergeAttempt::failed(duplicate.id, &error));
                }
            }
        }

        LeadOutcome::merged(&lead, attempts)
    }

    /// Searches every pipeline for a lead sharing the phone pattern.
    ///
    /// One list query per pipeline, at most `search_concurrency` in
    /// flight at a time, results kept in pipeline order. Per pipeline
    /// the first match that is not the lead under processing wins; the
    /// lead itself sits in a searched status and would otherwise match
    /// its own phone.
    async fn find_duplicates(
        &self,
        lead_id: LeadId,
        pattern: &str,
    ) -> Result<Vec<Lead>, GatewayError> {
        let pipelines = self.crm.list_pipelines().await?;
        let semaphore = Arc::new(Semaphore::new(self.settings.search_concurrency.max(1)));

        let mut handles = Vec::with_capacity(pipelines.len());
        for pipeline in &pipelines {
            let crm = Arc::clone(&self.crm);
            let semaphore = Arc::clone(&semaphore);
            let filter = LeadFilter::duplicates_in(pipeline, pattern);
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(GatewayError::Transport("semaphore closed".to_string())),
                };
                crm.list_leads(&filter).await
            }));
        }

        let mut matches = Vec::new();
        for (pipeline, handle) in pipelines.iter().zip(handles) {
            let leads = handle
                .await
                .map_err(|error| GatewayError::Transport(error.to_string()))??;
            if let Some(hit) = leads.into_iter().find(|candidate| candidate.id != lead_id) {
                debug!(
                    lead_id = %lead_id,
                    pipeline_id = %pipeline.id,
                    duplicate_id = %hit.id,
                    "duplicate found"
                );
                matches.push(hit);
            }
        }

        Ok(matches)
    }

    async fn advance_lead(&self, cycle_id: &str, lead: Lead) -> LeadOutcome {
        match self.advance(lead.id).await {
            Ok(()) => {
                info!(
                    event_name = "workflow.lead.advanced",
                    cycle_id = %cycle_id,
                    lead_id = %lead.id,
                    "lead moved to the new-requests status"
                );
                let notified = self.notify_processed(cycle_id, &lead).await;
                LeadOutcome::advanced(&lead, notified)
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.lead.advance_failed",
                    cycle_id = %cycle_id,
                    lead_id = %lead.id,
                    error = %error,
                    "status advance failed; continuing with remaining leads"
                );
                LeadOutcome::failed(&lead, FailureStage::Advance, &error)
            }
        }
    }

    /// One merge attempt: lead merge, contact merge, then advance of
    /// the surviving lead. Three separate CRM calls with no transaction
    /// across them; the first failure surfaces for this pair only.
    async fn merge_pair(&self, lead: &Lead, duplicate: &Lead) -> Result<(), MergeError> {
        let target_contact = duplicate
            .primary_contact()
            .ok_or(MergeError::MissingTargetContact(duplicate.id))?
            .id;

        let merged = self.crm.merge_leads(lead.id, duplicate.id).await?;
        self.crm.merge_contacts(lead.contact_ids(), target_contact).await?;
        self.advance(merged.id).await?;
        Ok(())
    }

    async fn advance(&self, lead_id: LeadId) -> Result<(), GatewayError> {
        self.crm
            .update_lead_status(
                lead_id,
                self.settings.pipeline_id,
                self.settings.target_status_id,
            )
            .await
    }

    /// Sends the operator notification. Failures are logged and fold
    /// into the outcome as `notified: false`; they never fail the lead.
    async fn notify_processed(&self, cycle_id: &str, lead: &Lead) -> bool {
        let message = format!(
            "Lead \"{}\" has been processed and moved to the \"new requests\" status",
            lead.name
        );
        match self.notifier.notify(&message).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    event_name = "workflow.notify.failed",
                    cycle_id = %cycle_id,
                    lead_id = %lead.id,
                    error = %error,
                    "operator notification failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests;
