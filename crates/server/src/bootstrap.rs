use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadsweep_bot::runner::{BotRunner, MergeCommandService, ReconnectPolicy};
use leadsweep_bot::{ChatNotifier, TelegramTransport};
use leadsweep_core::config::AppConfig;
use leadsweep_core::workflow::{CycleError, LeadProcessor, Trigger, WorkflowSettings};
use leadsweep_crm::{CrmClient, TokenManager};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub processor: Arc<LeadProcessor>,
    pub tokens: Arc<TokenManager>,
    pub bot_runner: BotRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(BootstrapError::HttpClient)?;
    // The bot long-polls; its client must outlive the poll window.
    let bot_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.telegram.poll_timeout_secs + 30))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let tokens = Arc::new(TokenManager::new(http.clone(), &config.crm));
    let crm = Arc::new(CrmClient::new(http, &config.crm, Arc::clone(&tokens)));
    info!(
        event_name = "system.bootstrap.crm_client_ready",
        correlation_id = "bootstrap",
        crm_domain = %config.crm.domain,
        "crm client constructed"
    );

    let transport = Arc::new(TelegramTransport::new(bot_http, &config.telegram));
    let notifier = Arc::new(ChatNotifier::new(transport.clone(), config.telegram.chat_id.clone()));

    let settings = WorkflowSettings {
        pipeline_id: config.workflow.pipeline_id,
        source_status_id: config.workflow.source_status_id,
        target_status_id: config.workflow.target_status_id,
        search_concurrency: config.workflow.search_concurrency,
    };
    let processor = Arc::new(LeadProcessor::new(crm, notifier, settings));

    let merge_service = Arc::new(ProcessorMergeService { processor: Arc::clone(&processor) });
    let bot_runner = BotRunner::new(transport, merge_service, ReconnectPolicy::default());

    Ok(Application { config, processor, tokens, bot_runner })
}

/// Bridges the bot's `/merge` command onto the workflow.
struct ProcessorMergeService {
    processor: Arc<LeadProcessor>,
}

#[async_trait]
impl MergeCommandService for ProcessorMergeService {
    async fn run_merge(
        &self,
    ) -> Result<String, leadsweep_bot::runner::CommandServiceError> {
        match self.processor.run_cycle(Trigger::Command).await {
            Ok(report) => Ok(report.summary()),
            Err(error @ CycleError::NoLeads) => Ok(error.to_string()),
            Err(error @ CycleError::Overlapping) => Ok(error.to_string()),
            Err(error) => {
                Err(leadsweep_bot::runner::CommandServiceError::Merge(error.to_string()))
            }
        }
    }
}
