pub mod config;
pub mod domain;
pub mod phone;
pub mod workflow;

pub use domain::{
    Contact, ContactId, Lead, LeadFilter, LeadId, Pipeline, PipelineId, StatusId, StatusRef,
    TokenSet,
};
pub use phone::normalize_phone;
pub use workflow::{
    CrmGateway, CycleError, CycleReport, Disposition, FailureStage, GatewayError, LeadOutcome,
    LeadProcessor, MergeAttempt, Notifier, NotifyError, Trigger, WorkflowSettings,
};
