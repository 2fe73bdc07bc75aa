use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PipelineId, StatusId};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub crm: CrmConfig,
    pub workflow: WorkflowConfig,
    pub telegram: TelegramConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub domain: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub token_expiry_secs: i64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub pipeline_id: PipelineId,
    pub source_status_id: StatusId,
    pub target_status_id: StatusId,
    pub search_concurrency: usize,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub chat_id: String,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub crm_domain: Option<String>,
    pub crm_client_id: Option<String>,
    pub crm_client_secret: Option<String>,
    pub crm_access_token: Option<String>,
    pub crm_refresh_token: Option<String>,
    pub pipeline_id: Option<i64>,
    pub source_status_id: Option<i64>,
    pub target_status_id: Option<i64>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            crm: CrmConfig {
                domain: String::new(),
                client_id: String::new(),
                client_secret: String::new().into(),
                redirect_uri: String::new(),
                access_token: String::new().into(),
                refresh_token: String::new().into(),
                token_expiry_secs: 86_400,
            },
            workflow: WorkflowConfig {
                pipeline_id: PipelineId(0),
                source_status_id: StatusId(0),
                target_status_id: StatusId(0),
                search_concurrency: 4,
            },
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                chat_id: String::new(),
                poll_timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                health_check_port: 8080,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadsweep.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(crm) = patch.crm {
            if let Some(domain) = crm.domain {
                self.crm.domain = domain;
            }
            if let Some(client_id) = crm.client_id {
                self.crm.client_id = client_id;
            }
            if let Some(client_secret_value) = crm.client_secret {
                self.crm.client_secret = secret_value(client_secret_value);
            }
            if let Some(redirect_uri) = crm.redirect_uri {
                self.crm.redirect_uri = redirect_uri;
            }
            if let Some(access_token_value) = crm.access_token {
                self.crm.access_token = secret_value(access_token_value);
            }
            if let Some(refresh_token_value) = crm.refresh_token {
                self.crm.refresh_token = secret_value(refresh_token_value);
            }
            if let Some(token_expiry_secs) = crm.token_expiry_secs {
                self.crm.token_expiry_secs = token_expiry_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(pipeline_id) = workflow.pipeline_id {
                self.workflow.pipeline_id = PipelineId(pipeline_id);
            }
            if let Some(source_status_id) = workflow.source_status_id {
                self.workflow.source_status_id = StatusId(source_status_id);
            }
            if let Some(target_status_id) = workflow.target_status_id {
                self.workflow.target_status_id = StatusId(target_status_id);
            }
            if let Some(search_concurrency) = workflow.search_concurrency {
                self.workflow.search_concurrency = search_concurrency;
            }
        }

        if let Some(telegram) = patch.telegram {
            if let Some(bot_token_value) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token_value);
            }
            if let Some(chat_id) = telegram.chat_id {
                self.telegram.chat_id = chat_id;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEADSWEEP_CRM_DOMAIN") {
            self.crm.domain = value;
        }
        if let Some(value) = read_env("LEADSWEEP_CRM_CLIENT_ID") {
            self.crm.client_id = value;
        }
        if let Some(value) = read_env("LEADSWEEP_CRM_CLIENT_SECRET") {
            self.crm.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("LEADSWEEP_CRM_REDIRECT_URI") {
            self.crm.redirect_uri = value;
        }
        if let Some(value) = read_env("LEADSWEEP_CRM_ACCESS_TOKEN") {
            self.crm.access_token = secret_value(value);
        }
        if let Some(value) = read_env("LEADSWEEP_CRM_REFRESH_TOKEN") {
            self.crm.refresh_token = secret_value(value);
        }
        if let Some(value) = read_env("LEADSWEEP_CRM_TOKEN_EXPIRY_SECS") {
            self.crm.token_expiry_secs = parse_i64("LEADSWEEP_CRM_TOKEN_EXPIRY_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADSWEEP_WORKFLOW_PIPELINE_ID") {
            self.workflow.pipeline_id =
                PipelineId(parse_i64("LEADSWEEP_WORKFLOW_PIPELINE_ID", &value)?);
        }
        if let Some(value) = read_env("LEADSWEEP_WORKFLOW_SOURCE_STATUS_ID") {
            self.workflow.source_status_id =
                StatusId(parse_i64("LEADSWEEP_WORKFLOW_SOURCE_STATUS_ID", &value)?);
        }
        if let Some(value) = read_env("LEADSWEEP_WORKFLOW_TARGET_STATUS_ID") {
            self.workflow.target_status_id =
                StatusId(parse_i64("LEADSWEEP_WORKFLOW_TARGET_STATUS_ID", &value)?);
        }
        if let Some(value) = read_env("LEADSWEEP_WORKFLOW_SEARCH_CONCURRENCY") {
            self.workflow.search_concurrency =
                parse_usize("LEADSWEEP_WORKFLOW_SEARCH_CONCURRENCY", &value)?;
        }

        if let Some(value) = read_env("LEADSWEEP_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("LEADSWEEP_TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = value;
        }
        if let Some(value) = read_env("LEADSWEEP_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("LEADSWEEP_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADSWEEP_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEADSWEEP_SERVER_PORT") {
            self.server.port = parse_u16("LEADSWEEP_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADSWEEP_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("LEADSWEEP_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level =
            read_env("LEADSWEEP_LOGGING_LEVEL").or_else(|| read_env("LEADSWEEP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADSWEEP_LOGGING_FORMAT").or_else(|| read_env("LEADSWEEP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(crm_domain) = overrides.crm_domain {
            self.crm.domain = crm_domain;
        }
        if let Some(crm_client_id) = overrides.crm_client_id {
            self.crm.client_id = crm_client_id;
        }
        if let Some(crm_client_secret) = overrides.crm_client_secret {
            self.crm.client_secret = secret_value(crm_client_secret);
        }
        if let Some(crm_access_token) = overrides.crm_access_token {
            self.crm.access_token = secret_value(crm_access_token);
        }
        if let Some(crm_refresh_token) = overrides.crm_refresh_token {
            self.crm.refresh_token = secret_value(crm_refresh_token);
        }
        if let Some(pipeline_id) = overrides.pipeline_id {
            self.workflow.pipeline_id = PipelineId(pipeline_id);
        }
        if let Some(source_status_id) = overrides.source_status_id {
            self.workflow.source_status_id = StatusId(source_status_id);
        }
        if let Some(target_status_id) = overrides.target_status_id {
            self.workflow.target_status_id = StatusId(target_status_id);
        }
        if let Some(telegram_bot_token) = overrides.telegram_bot_token {
            self.telegram.bot_token = secret_value(telegram_bot_token);
        }
        if let Some(telegram_chat_id) = overrides.telegram_chat_id {
            self.telegram.chat_id = telegram_chat_id;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_crm(&self.crm)?;
        validate_workflow(&self.workflow)?;
        validate_telegram(&self.telegram)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadsweep.toml"), PathBuf::from("config/leadsweep.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.domain.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.domain is required (the account domain, e.g. `example.amocrm.com`)".to_string(),
        ));
    }
    if crm.domain.contains("://") {
        return Err(ConfigError::Validation(
            "crm.domain must be a bare host name without a scheme".to_string(),
        ));
    }
    if crm.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.client_id is required. Get it from the CRM integration settings".to_string(),
        ));
    }
    if crm.client_secret.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "crm.client_secret is required. Get it from the CRM integration settings".to_string(),
        ));
    }
    if !crm.redirect_uri.starts_with("http://") && !crm.redirect_uri.starts_with("https://") {
        return Err(ConfigError::Validation(
            "crm.redirect_uri must start with http:// or https://".to_string(),
        ));
    }
    if crm.access_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "crm.access_token is required to seed the client until /auth/callback runs".to_string(),
        ));
    }
    if crm.refresh_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation("crm.refresh_token is required".to_string()));
    }
    if crm.token_expiry_secs <= 0 {
        return Err(ConfigError::Validation(
            "crm.token_expiry_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.pipeline_id.0 <= 0 {
        return Err(ConfigError::Validation(
            "workflow.pipeline_id must be a positive CRM pipeline id".to_string(),
        ));
    }
    if workflow.source_status_id.0 <= 0 {
        return Err(ConfigError::Validation(
            "workflow.source_status_id must be a positive CRM status id".to_string(),
        ));
    }
    if workflow.target_status_id.0 <= 0 {
        return Err(ConfigError::Validation(
            "workflow.target_status_id must be a positive CRM status id".to_string(),
        ));
    }
    if workflow.source_status_id == workflow.target_status_id {
        return Err(ConfigError::Validation(
            "workflow.source_status_id and workflow.target_status_id must differ".to_string(),
        ));
    }
    if workflow.search_concurrency == 0 || workflow.search_concurrency > 32 {
        return Err(ConfigError::Validation(
            "workflow.search_concurrency must be in range 1..=32".to_string(),
        ));
    }

    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    if telegram.bot_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Get it from @BotFather".to_string(),
        ));
    }
    if telegram.chat_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.chat_id is required (the chat that receives notifications)".to_string(),
        ));
    }
    if telegram.poll_timeout_secs == 0 || telegram.poll_timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 1..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }
    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    crm: Option<CrmPatch>,
    workflow: Option<WorkflowPatch>,
    telegram: Option<TelegramPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    domain: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expiry_secs: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    pipeline_id: Option<i64>,
    source_status_id: Option<i64>,
    target_status_id: Option<i64>,
    search_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    chat_id: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
