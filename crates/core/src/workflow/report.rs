use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Lead, LeadId};

/// What started a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Timer,
    Command,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timer => write!(f, "timer"),
            Self::Command => write!(f, "command"),
        }
    }
}

/// Where a lead-scoped failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    DuplicateSearch,
    Advance,
}

/// One merge attempt against one duplicate. Attempts are independent:
/// a failed attempt is recorded here and the loop moves on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeAttempt {
    pub duplicate_id: LeadId,
    pub merged: bool,
    pub notified: bool,
    pub error: Option<String>,
}

impl MergeAttempt {
    pub fn succeeded(duplicate_id: LeadId, notified: bool) -> Self {
        Self { duplicate_id, merged: true, notified, error: None }
    }

    pub fn failed(duplicate_id: LeadId, error: &impl std::fmt::Display) -> Self {
        Self { duplicate_id, merged: false, notified: false, error: Some(error.to_string()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Disposition {
    /// Duplicates were found; one attempt recorded per duplicate.
    Merged { attempts: Vec<MergeAttempt> },
    /// No duplicates; the lead was moved to the target status.
    Advanced { notified: bool },
    /// Nothing to match on; the lead was left untouched.
    Skipped { reason: String },
    /// A lead-scoped step failed; the lead was left for the next cycle.
    Failed { stage: FailureStage, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeadOutcome {
    pub lead_id: LeadId,
    pub lead_name: String,
    pub disposition: Disposition,
}

impl LeadOutcome {
    pub fn merged(lead: &Lead, attempts: Vec<MergeAttempt>) -> Self {
        Self::with(lead, Disposition::Merged { attempts })
    }

    pub fn advanced(lead: &Lead, notified: bool) -> Self {
        Self::with(lead, Disposition::Advanced { notified })
    }

    pub fn skipped(lead: &Lead, reason: &str) -> Self {
        Self::with(lead, Disposition::Skipped { reason: reason.to_owned() })
    }

    pub fn failed(lead: &Lead, stage: FailureStage, error: &impl std::fmt::Display) -> Self {
        Self::with(lead, Disposition::Failed { stage, reason: error.to_string() })
    }

    fn with(lead: &Lead, disposition: Disposition) -> Self {
        Self { lead_id: lead.id, lead_name: lead.name.clone(), disposition }
    }
}

/// Structured result of one processing cycle, returned to the caller
/// instead of living only in log lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<LeadOutcome>,
}

impl CycleReport {
    pub fn merged_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| {
                matches!(
                    &outcome.disposition,
                    Disposition::Merged { attempts } if attempts.iter().any(|a| a.merged)
                )
            })
            .count()
    }

    pub fn advanced_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.disposition, Disposition::Advanced { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.disposition, Disposition::Skipped { .. }))
            .count()
    }

    /// Leads where nothing succeeded: a lead-scoped failure, or merges
    /// attempted with every attempt failing.
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| match &outcome.disposition {
                Disposition::Failed { .. } => true,
                Disposition::Merged { attempts } => attempts.iter().all(|a| !a.merged),
                _ => false,
            })
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} leads processed: {} merged, {} advanced, {} skipped, {} failed",
            self.outcomes.len(),
            self.merged_count(),
            self.advanced_count(),
            self.skipped_count(),
            self.failed_count()
        )
    }
}
