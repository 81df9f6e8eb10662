use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::flows::completion::{CompletionSettings, DEFAULT_CONTACT_EMAIL};
use crate::flows::definition::FlowType;
use crate::flows::engine::EngineSettings;
use crate::submission::coordinator::{CoordinatorSettings, DEFAULT_PAGE_CONTEXT};
use crate::submission::rate_limit::RateLimitConfig;
use crate::validation::ValidationLimits;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub relay: RelayConfig,
    pub submission: SubmissionConfig,
    pub validation: ValidationLimits,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub database_url: String,
    pub max_connections: u32,
    pub rest_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub storage_bucket: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub default_endpoint: Option<String>,
    pub endpoints: BTreeMap<FlowType, String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SubmissionConfig {
    pub max_attempts: u32,
    pub window_secs: u64,
    pub timeout_secs: u64,
    pub max_dependent_properties: usize,
    pub page_context: String,
    pub contact_email: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Widget sessions untouched for this long are abandoned and dropped.
    pub session_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Sqlite,
    Rest,
    Memory,
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
    pub backend_kind: Option<BackendKind>,
    pub database_url: Option<String>,
    pub rest_url: Option<String>,
    pub api_key: Option<String>,
    pub relay_default_endpoint: Option<String>,
    pub server_port: Option<u16>,
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
            backend: BackendConfig {
                kind: BackendKind::Sqlite,
                database_url: "sqlite://leadflow.db".to_string(),
                max_connections: 5,
                rest_url: None,
                api_key: None,
                storage_bucket: "resumes".to_string(),
                timeout_secs: 10,
            },
            relay: RelayConfig { default_endpoint: None, endpoints: BTreeMap::new(), timeout_secs: 10 },
            submission: SubmissionConfig {
                max_attempts: 3,
                window_secs: 300,
                timeout_secs: 10,
                max_dependent_properties: 10,
                page_context: DEFAULT_PAGE_CONTEXT.to_string(),
                contact_email: DEFAULT_CONTACT_EMAIL.to_string(),
            },
            validation: ValidationLimits::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                session_idle_secs: 1800,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "rest" => Ok(Self::Rest),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Validation(format!(
                "unsupported backend kind `{other}` (expected sqlite|rest|memory)"
            ))),
        }
    }
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

impl SubmissionConfig {
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_attempts: self.max_attempts,
            window: Duration::from_secs(self.window_secs),
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            max_dependent_properties: self.max_dependent_properties,
            page_context: self.page_context.clone(),
        }
    }
}

impl RelayConfig {
    /// Endpoint for `flow_type`, falling back to the default endpoint.
    pub fn endpoint_for(&self, flow_type: FlowType) -> Option<&str> {
        self.endpoints.get(&flow_type).or(self.default_endpoint.as_ref()).map(String::as_str)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            limits: self.validation.clone(),
            completion: CompletionSettings {
                max_dependent_properties: self.submission.max_dependent_properties,
                contact_email: self.submission.contact_email.clone(),
            },
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(backend) = patch.backend {
            if let Some(kind) = backend.kind {
                self.backend.kind = kind;
            }
            if let Some(database_url) = backend.database_url {
                self.backend.database_url = database_url;
            }
            if let Some(max_connections) = backend.max_connections {
                self.backend.max_connections = max_connections;
            }
            if let Some(rest_url) = backend.rest_url {
                self.backend.rest_url = Some(rest_url);
            }
            if let Some(api_key_value) = backend.api_key {
                self.backend.api_key = Some(secret_value(api_key_value));
            }
            if let Some(storage_bucket) = backend.storage_bucket {
                self.backend.storage_bucket = storage_bucket;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(relay) = patch.relay {
            if let Some(default_endpoint) = relay.default_endpoint {
                self.relay.default_endpoint = Some(default_endpoint);
            }
            for (flow_type, endpoint) in relay.endpoints.unwrap_or_default() {
                let flow_type = flow_type.parse::<FlowType>().map_err(|_| {
                    ConfigError::Validation(format!(
                        "relay.endpoints has unknown flow type `{flow_type}`"
                    ))
                })?;
                self.relay.endpoints.insert(flow_type, endpoint);
            }
            if let Some(timeout_secs) = relay.timeout_secs {
                self.relay.timeout_secs = timeout_secs;
            }
        }

        if let Some(submission) = patch.submission {
            if let Some(max_attempts) = submission.max_attempts {
                self.submission.max_attempts = max_attempts;
            }
            if let Some(window_secs) = submission.window_secs {
                self.submission.window_secs = window_secs;
            }
            if let Some(timeout_secs) = submission.timeout_secs {
                self.submission.timeout_secs = timeout_secs;
            }
            if let Some(max_dependent_properties) = submission.max_dependent_properties {
                self.submission.max_dependent_properties = max_dependent_properties;
            }
            if let Some(page_context) = submission.page_context {
                self.submission.page_context = page_context;
            }
            if let Some(contact_email) = submission.contact_email {
                self.submission.contact_email = contact_email;
            }
        }

        if let Some(validation) = patch.validation {
            if let Some(max_text_len) = validation.max_text_len {
                self.validation.max_text_len = max_text_len;
            }
            if let Some(max_name_len) = validation.max_name_len {
                self.validation.max_name_len = max_name_len;
            }
            if let Some(max_file_bytes) = validation.max_file_bytes {
                self.validation.max_file_bytes = max_file_bytes;
            }
            if let Some(allowed_file_extensions) = validation.allowed_file_extensions {
                self.validation.allowed_file_extensions = allowed_file_extensions
                    .into_iter()
                    .map(|extension| extension.trim_start_matches('.').to_ascii_lowercase())
                    .collect();
            }
            if let Some(max_filename_len) = validation.max_filename_len {
                self.validation.max_filename_len = max_filename_len;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(session_idle_secs) = server.session_idle_secs {
                self.server.session_idle_secs = session_idle_secs;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEADFLOW_BACKEND_KIND") {
            self.backend.kind = value.parse()?;
        }
        if let Some(value) = read_env("LEADFLOW_BACKEND_DATABASE_URL") {
            self.backend.database_url = value;
        }
        if let Some(value) = read_env("LEADFLOW_BACKEND_MAX_CONNECTIONS") {
            self.backend.max_connections = parse_u32("LEADFLOW_BACKEND_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_BACKEND_REST_URL") {
            self.backend.rest_url = Some(value);
        }
        if let Some(value) = read_env("LEADFLOW_BACKEND_API_KEY") {
            self.backend.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADFLOW_BACKEND_STORAGE_BUCKET") {
            self.backend.storage_bucket = value;
        }
        if let Some(value) = read_env("LEADFLOW_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("LEADFLOW_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADFLOW_RELAY_DEFAULT_ENDPOINT") {
            self.relay.default_endpoint = Some(value);
        }
        if let Some(value) = read_env("LEADFLOW_RELAY_TIMEOUT_SECS") {
            self.relay.timeout_secs = parse_u64("LEADFLOW_RELAY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADFLOW_SUBMISSION_MAX_ATTEMPTS") {
            self.submission.max_attempts = parse_u32("LEADFLOW_SUBMISSION_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_SUBMISSION_WINDOW_SECS") {
            self.submission.window_secs = parse_u64("LEADFLOW_SUBMISSION_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_SUBMISSION_TIMEOUT_SECS") {
            self.submission.timeout_secs = parse_u64("LEADFLOW_SUBMISSION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_SUBMISSION_MAX_DEPENDENT_PROPERTIES") {
            self.submission.max_dependent_properties =
                parse_u32("LEADFLOW_SUBMISSION_MAX_DEPENDENT_PROPERTIES", &value)? as usize;
        }
        if let Some(value) = read_env("LEADFLOW_SUBMISSION_CONTACT_EMAIL") {
            self.submission.contact_email = value;
        }

        if let Some(value) = read_env("LEADFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEADFLOW_SERVER_PORT") {
            self.server.port = parse_u16("LEADFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LEADFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_SERVER_SESSION_IDLE_SECS") {
            self.server.session_idle_secs = parse_u64("LEADFLOW_SERVER_SESSION_IDLE_SECS", &value)?;
        }

        let log_level =
            read_env("LEADFLOW_LOGGING_LEVEL").or_else(|| read_env("LEADFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADFLOW_LOGGING_FORMAT").or_else(|| read_env("LEADFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(backend_kind) = overrides.backend_kind {
            self.backend.kind = backend_kind;
        }
        if let Some(database_url) = overrides.database_url {
            self.backend.database_url = database_url;
        }
        if let Some(rest_url) = overrides.rest_url {
            self.backend.rest_url = Some(rest_url);
        }
        if let Some(api_key) = overrides.api_key {
            self.backend.api_key = Some(secret_value(api_key));
        }
        if let Some(relay_default_endpoint) = overrides.relay_default_endpoint {
            self.relay.default_endpoint = Some(relay_default_endpoint);
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend(&self.backend)?;
        validate_relay(&self.relay)?;
        validate_submission(&self.submission)?;
        validate_limits(&self.validation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadflow.toml"), PathBuf::from("config/leadflow.toml")]
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

fn is_http_url(value: &str) -> bool {
    Url::parse(value.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    if backend.timeout_secs == 0 || backend.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match backend.kind {
        BackendKind::Sqlite => {
            let url = backend.database_url.trim();
            let sqlite_url =
                url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
            if !sqlite_url {
                return Err(ConfigError::Validation(
                    "backend.database_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                        .to_string(),
                ));
            }
            if backend.max_connections == 0 {
                return Err(ConfigError::Validation(
                    "backend.max_connections must be greater than zero".to_string(),
                ));
            }
        }
        BackendKind::Rest => {
            let rest_url = backend.rest_url.as_deref().unwrap_or_default();
            if !is_http_url(rest_url) {
                return Err(ConfigError::Validation(
                    "backend.rest_url must be an http(s) URL when backend.kind is `rest`"
                        .to_string(),
                ));
            }
            let missing_key = backend
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing_key {
                return Err(ConfigError::Validation(
                    "backend.api_key is required when backend.kind is `rest` (set LEADFLOW_BACKEND_API_KEY)"
                        .to_string(),
                ));
            }
            if backend.storage_bucket.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "backend.storage_bucket must not be empty".to_string(),
                ));
            }
        }
        BackendKind::Memory => {}
    }

    Ok(())
}

fn validate_relay(relay: &RelayConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &relay.default_endpoint {
        if !is_http_url(endpoint) {
            return Err(ConfigError::Validation(
                "relay.default_endpoint must start with http:// or https://".to_string(),
            ));
        }
    }
    for (flow_type, endpoint) in &relay.endpoints {
        if !is_http_url(endpoint) {
            return Err(ConfigError::Validation(format!(
                "relay.endpoints.{flow_type} must start with http:// or https://"
            )));
        }
    }
    if relay.timeout_secs == 0 || relay.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "relay.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    Ok(())
}

fn validate_submission(submission: &SubmissionConfig) -> Result<(), ConfigError> {
    if submission.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "submission.max_attempts must be greater than zero".to_string(),
        ));
    }
    if submission.window_secs == 0 {
        return Err(ConfigError::Validation(
            "submission.window_secs must be greater than zero".to_string(),
        ));
    }
    if submission.timeout_secs == 0 || submission.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "submission.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if !(1..=50).contains(&submission.max_dependent_properties) {
        return Err(ConfigError::Validation(
            "submission.max_dependent_properties must be in range 1..=50".to_string(),
        ));
    }
    if submission.page_context.trim().is_empty() {
        return Err(ConfigError::Validation(
            "submission.page_context must not be empty".to_string(),
        ));
    }
    if !submission.contact_email.contains('@') {
        return Err(ConfigError::Validation(
            "submission.contact_email must be an email address".to_string(),
        ));
    }
    Ok(())
}

fn validate_limits(limits: &ValidationLimits) -> Result<(), ConfigError> {
    if limits.max_text_len == 0 || limits.max_name_len == 0 || limits.max_filename_len == 0 {
        return Err(ConfigError::Validation(
            "validation length limits must be greater than zero".to_string(),
        ));
    }
    if limits.max_file_bytes == 0 {
        return Err(ConfigError::Validation(
            "validation.max_file_bytes must be greater than zero".to_string(),
        ));
    }
    if limits.allowed_file_extensions.is_empty() {
        return Err(ConfigError::Validation(
            "validation.allowed_file_extensions must list at least one extension".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.session_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "server.session_idle_secs must be greater than zero".to_string(),
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

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    relay: Option<RelayPatch>,
    submission: Option<SubmissionPatch>,
    validation: Option<ValidationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    kind: Option<BackendKind>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    rest_url: Option<String>,
    api_key: Option<String>,
    storage_bucket: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayPatch {
    default_endpoint: Option<String>,
    endpoints: Option<BTreeMap<String, String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmissionPatch {
    max_attempts: Option<u32>,
    window_secs: Option<u64>,
    timeout_secs: Option<u64>,
    max_dependent_properties: Option<usize>,
    page_context: Option<String>,
    contact_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationPatch {
    max_text_len: Option<usize>,
    max_name_len: Option<usize>,
    max_file_bytes: Option<u64>,
    allowed_file_extensions: Option<Vec<String>>,
    max_filename_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use crate::flows::definition::FlowType;

    use super::{AppConfig, BackendKind, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn missing_file() -> LoadOptions {
        LoadOptions {
            config_path: Some("does-not-exist/leadflow.toml".into()),
            ..LoadOptions::default()
        }
    }

    #[test]
    fn defaults_match_documented_submission_policy() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let config =
            AppConfig::load(missing_file()).map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.submission.max_attempts == 3, "three attempts per window")?;
        ensure(config.submission.window_secs == 300, "five minute window")?;
        ensure(config.submission.timeout_secs == 10, "ten second call timeout")?;
        ensure(config.submission.max_dependent_properties == 10, "ten dependent properties")?;
        ensure(config.backend.kind == BackendKind::Sqlite, "sqlite is the default backend")?;
        ensure(
            config.validation.allowed_file_extensions == ["pdf", "doc", "docx"],
            "resume extensions",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_LEADFLOW_API_KEY", "anon-key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadflow.toml");
            fs::write(
                &path,
                r#"
[backend]
kind = "rest"
rest_url = "https://project.backend.example"
api_key = "${TEST_LEADFLOW_API_KEY}"

[relay]
default_endpoint = "https://forms.example/f/default"

[relay.endpoints]
careers-application = "https://forms.example/f/careers"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let api_key =
                config.backend.api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(
                api_key.as_deref() == Some("anon-key-from-env"),
                "api key should be loaded from environment",
            )?;
            ensure(
                config.relay.endpoint_for(FlowType::CareersApplication)
                    == Some("https://forms.example/f/careers"),
                "per-flow relay endpoint should win",
            )?;
            ensure(
                config.relay.endpoint_for(FlowType::Connect)
                    == Some("https://forms.example/f/default"),
                "other flows use the default relay endpoint",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_LEADFLOW_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADFLOW_LOG_LEVEL", "warn");
        env::set_var("LEADFLOW_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(missing_file())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["LEADFLOW_LOG_LEVEL", "LEADFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADFLOW_BACKEND_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("LEADFLOW_SUBMISSION_MAX_ATTEMPTS", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadflow.toml");
            fs::write(
                &path,
                r#"
[backend]
database_url = "sqlite://from-file.db"

[submission]
max_attempts = 4
window_secs = 60

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.backend.database_url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.submission.max_attempts == 5, "env max attempts should win over file")?;
            ensure(config.submission.window_secs == 60, "file window should win over default")?;
            Ok(())
        })();

        clear_vars(&["LEADFLOW_BACKEND_DATABASE_URL", "LEADFLOW_SUBMISSION_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn session_idle_timeout_is_configurable_and_validated() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let defaults =
            AppConfig::load(missing_file()).map_err(|err| format!("config load failed: {err}"))?;
        ensure(defaults.server.session_idle_secs == 1800, "thirty minute idle default")?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("leadflow.toml");
        fs::write(&path, "[server]\nsession_idle_secs = 120\n").map_err(|err| err.to_string())?;
        let config = AppConfig::load(LoadOptions {
            config_path: Some(path.clone()),
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.server.session_idle_secs == 120, "file idle timeout should apply")?;

        fs::write(&path, "[server]\nsession_idle_secs = 0\n").map_err(|err| err.to_string())?;
        let rejected =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(
                rejected,
                Err(ConfigError::Validation(ref message)) if message.contains("session_idle_secs")
            ),
            "zero idle timeout should be rejected",
        )
    }

    #[test]
    fn unparseable_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADFLOW_SERVER_PORT", "eighty");

        let result = match AppConfig::load(missing_file()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "LEADFLOW_SERVER_PORT", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid override error".to_string()),
        };

        clear_vars(&["LEADFLOW_SERVER_PORT"]);
        result
    }

    #[test]
    fn rest_backend_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                backend_kind: Some(BackendKind::Rest),
                rest_url: Some("https://project.backend.example".to_string()),
                ..ConfigOverrides::default()
            },
            ..missing_file()
        });

        let has_message = matches!(
            result,
            Err(ConfigError::Validation(ref message)) if message.contains("backend.api_key")
        );
        ensure(has_message, "validation failure should mention backend.api_key")
    }

    #[test]
    fn relay_endpoints_must_be_http() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                relay_default_endpoint: Some("ftp://forms.example".to_string()),
                ..ConfigOverrides::default()
            },
            ..missing_file()
        });

        let has_message = matches!(
            result,
            Err(ConfigError::Validation(ref message)) if message.contains("relay.default_endpoint")
        );
        ensure(has_message, "validation failure should mention relay.default_endpoint")
    }

    #[test]
    fn missing_required_file_is_an_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions { require_file: true, ..missing_file() });
        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "absent required file should fail",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                backend_kind: Some(BackendKind::Rest),
                rest_url: Some("https://project.backend.example".to_string()),
                api_key: Some("super-secret-anon-key".to_string()),
                ..ConfigOverrides::default()
            },
            ..missing_file()
        })
        .map_err(|err| format!("config load failed: {err}"))?;
        let debug = format!("{config:?}");

        ensure(!debug.contains("super-secret-anon-key"), "debug output should not contain api key")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }
}
