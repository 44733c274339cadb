use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{Classify, ErrorKind};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub chatwoot: ChatwootConfig,
    pub bridge: BridgeConfig,
    pub sessions: SessionsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ChatwootConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub account_id: i64,
    pub inbox_id: i64,
    pub api_token: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub settle_delay_ms: u64,
    pub bot_source_prefix: String,
}

#[derive(Clone, Debug)]
pub struct SessionsConfig {
    pub qr_on_create: bool,
    pub qr_ttl_secs: u64,
    pub disconnect_timeout_secs: u64,
    pub delete_settle_ms: u64,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub chatwoot_enabled: Option<bool>,
    pub chatwoot_base_url: Option<String>,
    pub chatwoot_api_token: Option<String>,
    pub settle_delay_ms: Option<u64>,
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

impl Classify for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://zapwoot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            chatwoot: ChatwootConfig {
                enabled: false,
                base_url: None,
                account_id: 0,
                inbox_id: 0,
                api_token: None,
                webhook_secret: None,
            },
            bridge: BridgeConfig {
                settle_delay_ms: 500,
                bot_source_prefix: "WAID:".to_string(),
            },
            sessions: SessionsConfig {
                qr_on_create: false,
                qr_ttl_secs: 120,
                disconnect_timeout_secs: 10,
                delete_settle_ms: 500,
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("zapwoot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
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
        }

        if let Some(chatwoot) = patch.chatwoot {
            if let Some(enabled) = chatwoot.enabled {
                self.chatwoot.enabled = enabled;
            }
            if let Some(base_url) = chatwoot.base_url {
                self.chatwoot.base_url = Some(base_url);
            }
            if let Some(account_id) = chatwoot.account_id {
                self.chatwoot.account_id = account_id;
            }
            if let Some(inbox_id) = chatwoot.inbox_id {
                self.chatwoot.inbox_id = inbox_id;
            }
            if let Some(api_token) = chatwoot.api_token {
                self.chatwoot.api_token = Some(secret_value(api_token));
            }
            if let Some(webhook_secret) = chatwoot.webhook_secret {
                self.chatwoot.webhook_secret = Some(secret_value(webhook_secret));
            }
        }

        if let Some(bridge) = patch.bridge {
            if let Some(settle_delay_ms) = bridge.settle_delay_ms {
                self.bridge.settle_delay_ms = settle_delay_ms;
            }
            if let Some(bot_source_prefix) = bridge.bot_source_prefix {
                self.bridge.bot_source_prefix = bot_source_prefix;
            }
        }

        if let Some(sessions) = patch.sessions {
            if let Some(qr_on_create) = sessions.qr_on_create {
                self.sessions.qr_on_create = qr_on_create;
            }
            if let Some(qr_ttl_secs) = sessions.qr_ttl_secs {
                self.sessions.qr_ttl_secs = qr_ttl_secs;
            }
            if let Some(disconnect_timeout_secs) = sessions.disconnect_timeout_secs {
                self.sessions.disconnect_timeout_secs = disconnect_timeout_secs;
            }
            if let Some(delete_settle_ms) = sessions.delete_settle_ms {
                self.sessions.delete_settle_ms = delete_settle_ms;
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
        if let Some(value) = read_env("ZAPWOOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ZAPWOOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ZAPWOOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ZAPWOOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ZAPWOOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ZAPWOOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ZAPWOOT_SERVER_PORT") {
            self.server.port = parse_u16("ZAPWOOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ZAPWOOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ZAPWOOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("ZAPWOOT_CHATWOOT_ENABLED") {
            self.chatwoot.enabled = parse_bool("ZAPWOOT_CHATWOOT_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ZAPWOOT_CHATWOOT_BASE_URL") {
            self.chatwoot.base_url = Some(value);
        }
        if let Some(value) = read_env("ZAPWOOT_CHATWOOT_ACCOUNT_ID") {
            self.chatwoot.account_id = parse_i64("ZAPWOOT_CHATWOOT_ACCOUNT_ID", &value)?;
        }
        if let Some(value) = read_env("ZAPWOOT_CHATWOOT_INBOX_ID") {
            self.chatwoot.inbox_id = parse_i64("ZAPWOOT_CHATWOOT_INBOX_ID", &value)?;
        }
        if let Some(value) = read_env("ZAPWOOT_CHATWOOT_API_TOKEN") {
            self.chatwoot.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("ZAPWOOT_CHATWOOT_WEBHOOK_SECRET") {
            self.chatwoot.webhook_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("ZAPWOOT_BRIDGE_SETTLE_DELAY_MS") {
            self.bridge.settle_delay_ms = parse_u64("ZAPWOOT_BRIDGE_SETTLE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("ZAPWOOT_BRIDGE_BOT_SOURCE_PREFIX") {
            self.bridge.bot_source_prefix = value;
        }

        if let Some(value) = read_env("ZAPWOOT_SESSIONS_QR_ON_CREATE") {
            self.sessions.qr_on_create = parse_bool("ZAPWOOT_SESSIONS_QR_ON_CREATE", &value)?;
        }
        if let Some(value) = read_env("ZAPWOOT_SESSIONS_QR_TTL_SECS") {
            self.sessions.qr_ttl_secs = parse_u64("ZAPWOOT_SESSIONS_QR_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("ZAPWOOT_SESSIONS_DISCONNECT_TIMEOUT_SECS") {
            self.sessions.disconnect_timeout_secs =
                parse_u64("ZAPWOOT_SESSIONS_DISCONNECT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ZAPWOOT_SESSIONS_DELETE_SETTLE_MS") {
            self.sessions.delete_settle_ms =
                parse_u64("ZAPWOOT_SESSIONS_DELETE_SETTLE_MS", &value)?;
        }

        let log_level =
            read_env("ZAPWOOT_LOGGING_LEVEL").or_else(|| read_env("ZAPWOOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ZAPWOOT_LOGGING_FORMAT").or_else(|| read_env("ZAPWOOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(enabled) = overrides.chatwoot_enabled {
            self.chatwoot.enabled = enabled;
        }
        if let Some(base_url) = overrides.chatwoot_base_url {
            self.chatwoot.base_url = Some(base_url);
        }
        if let Some(api_token) = overrides.chatwoot_api_token {
            self.chatwoot.api_token = Some(secret_value(api_token));
        }
        if let Some(settle_delay_ms) = overrides.settle_delay_ms {
            self.bridge.settle_delay_ms = settle_delay_ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_chatwoot(&self.chatwoot)?;
        validate_bridge(&self.bridge)?;
        validate_sessions(&self.sessions)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("zapwoot.toml"), PathBuf::from("config/zapwoot.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
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

    Ok(())
}

fn validate_chatwoot(chatwoot: &ChatwootConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &chatwoot.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "chatwoot.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if !chatwoot.enabled {
        return Ok(());
    }

    if chatwoot.base_url.as_deref().map(str::trim).unwrap_or_default().is_empty() {
        return Err(ConfigError::Validation(
            "chatwoot.enabled is true but chatwoot.base_url is missing".to_string(),
        ));
    }

    let token_missing = chatwoot
        .api_token
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if token_missing {
        return Err(ConfigError::Validation(
            "chatwoot.api_token is required when chatwoot.enabled is true. Create an access token under Chatwoot > Profile Settings".to_string(),
        ));
    }

    if chatwoot.account_id <= 0 || chatwoot.inbox_id <= 0 {
        return Err(ConfigError::Validation(
            "chatwoot.account_id and chatwoot.inbox_id must be positive when chatwoot.enabled is true"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_bridge(bridge: &BridgeConfig) -> Result<(), ConfigError> {
    if bridge.settle_delay_ms > 60_000 {
        return Err(ConfigError::Validation(
            "bridge.settle_delay_ms must be in range 0..=60000".to_string(),
        ));
    }

    if bridge.bot_source_prefix.trim().is_empty() {
        return Err(ConfigError::Validation(
            "bridge.bot_source_prefix must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_sessions(sessions: &SessionsConfig) -> Result<(), ConfigError> {
    if sessions.qr_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "sessions.qr_ttl_secs must be greater than zero".to_string(),
        ));
    }

    if sessions.disconnect_timeout_secs == 0 || sessions.disconnect_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "sessions.disconnect_timeout_secs must be in range 1..=300".to_string(),
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

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    chatwoot: Option<ChatwootPatch>,
    bridge: Option<BridgePatch>,
    sessions: Option<SessionsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatwootPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    account_id: Option<i64>,
    inbox_id: Option<i64>,
    api_token: Option<String>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BridgePatch {
    settle_delay_ms: Option<u64>,
    bot_source_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionsPatch {
    qr_on_create: Option<bool>,
    qr_ttl_secs: Option<u64>,
    disconnect_timeout_secs: Option<u64>,
    delete_settle_ms: Option<u64>,
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

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

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

    #[test]
    fn defaults_match_documented_timings() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.bridge.settle_delay_ms == 500, "settle delay should default to 500ms")?;
        ensure(config.bridge.bot_source_prefix == "WAID:", "bot prefix should default to WAID:")?;
        ensure(config.sessions.qr_ttl_secs == 120, "qr ttl should default to 120s")?;
        ensure(
            config.sessions.disconnect_timeout_secs == 10,
            "disconnect timeout should default to 10s",
        )?;
        ensure(config.sessions.delete_settle_ms == 500, "delete settle should default to 500ms")?;
        ensure(!config.chatwoot.enabled, "chatwoot should be disabled by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CHATWOOT_TOKEN", "cw-token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("zapwoot.toml");
            fs::write(
                &path,
                r#"
[chatwoot]
enabled = true
base_url = "https://chat.example.com"
account_id = 1
inbox_id = 4
api_token = "${TEST_CHATWOOT_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .chatwoot
                    .api_token
                    .as_ref()
                    .map(|token| token.expose_secret() == "cw-token-from-env")
                    .unwrap_or(false),
                "api token should be loaded from environment",
            )?;
            ensure(config.chatwoot.inbox_id == 4, "inbox id should come from the file")?;
            Ok(())
        })();

        clear_vars(&["TEST_CHATWOOT_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ZAPWOOT_LOG_LEVEL", "warn");
        env::set_var("ZAPWOOT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["ZAPWOOT_LOG_LEVEL", "ZAPWOOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ZAPWOOT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("ZAPWOOT_BRIDGE_SETTLE_DELAY_MS", "250");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("zapwoot.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[bridge]
settle_delay_ms = 900
bot_source_prefix = "BOT:"

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
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.bridge.settle_delay_ms == 250, "env settle delay should win over file")?;
            ensure(config.bridge.bot_source_prefix == "BOT:", "file prefix should win over default")?;
            Ok(())
        })();

        clear_vars(&["ZAPWOOT_DATABASE_URL", "ZAPWOOT_BRIDGE_SETTLE_DELAY_MS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ZAPWOOT_CHATWOOT_ENABLED", "true");
        env::set_var("ZAPWOOT_CHATWOOT_BASE_URL", "https://chat.example.com");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("chatwoot.api_token")
            );
            ensure(has_message, "validation failure should mention chatwoot.api_token")
        })();

        clear_vars(&["ZAPWOOT_CHATWOOT_ENABLED", "ZAPWOOT_CHATWOOT_BASE_URL"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ZAPWOOT_SERVER_PORT", "not-a-port");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "ZAPWOOT_SERVER_PORT", "error should name the offending variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid override failure".to_string()),
        };

        clear_vars(&["ZAPWOOT_SERVER_PORT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ZAPWOOT_CHATWOOT_API_TOKEN", "cw-secret-value");
        env::set_var("ZAPWOOT_CHATWOOT_WEBHOOK_SECRET", "hook-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("cw-secret-value"), "debug output should not contain api token")?;
            ensure(
                !debug.contains("hook-secret-value"),
                "debug output should not contain webhook secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["ZAPWOOT_CHATWOOT_API_TOKEN", "ZAPWOOT_CHATWOOT_WEBHOOK_SECRET"]);
        result
    }
}
