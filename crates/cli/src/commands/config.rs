use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use toml::Value;
use zapwoot_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value) in effective_values(&config) {
        let source = field_source(
            key_path,
            &env_key(key_path),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("chatwoot.enabled", config.chatwoot.enabled.to_string()),
        (
            "chatwoot.base_url",
            config.chatwoot.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("chatwoot.account_id", config.chatwoot.account_id.to_string()),
        ("chatwoot.inbox_id", config.chatwoot.inbox_id.to_string()),
        ("chatwoot.api_token", redact(config.chatwoot.api_token.as_ref())),
        ("chatwoot.webhook_secret", redact(config.chatwoot.webhook_secret.as_ref())),
        ("bridge.settle_delay_ms", config.bridge.settle_delay_ms.to_string()),
        ("bridge.bot_source_prefix", config.bridge.bot_source_prefix.clone()),
        ("sessions.qr_on_create", config.sessions.qr_on_create.to_string()),
        ("sessions.qr_ttl_secs", config.sessions.qr_ttl_secs.to_string()),
        ("sessions.disconnect_timeout_secs", config.sessions.disconnect_timeout_secs.to_string()),
        ("sessions.delete_settle_ms", config.sessions.delete_settle_ms.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ]
}

/// `chatwoot.api_token` is read from `ZAPWOOT_CHATWOOT_API_TOKEN`.
fn env_key(key_path: &str) -> String {
    format!("ZAPWOOT_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("zapwoot.toml"), PathBuf::from("config/zapwoot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact(secret: Option<&SecretString>) -> String {
    match secret {
        Some(_) => "<redacted>".to_string(),
        None => "<unset>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, env_key};

    #[test]
    fn env_keys_follow_the_section_prefix() {
        assert_eq!(env_key("chatwoot.api_token"), "ZAPWOOT_CHATWOOT_API_TOKEN");
        assert_eq!(env_key("sessions.qr_ttl_secs"), "ZAPWOOT_SESSIONS_QR_TTL_SECS");
    }

    #[test]
    fn nested_keys_are_found_in_file_documents() {
        let doc: Value = "[chatwoot]\ninbox_id = 7\n".parse().expect("toml");

        assert!(contains_path(&doc, "chatwoot.inbox_id"));
        assert!(!contains_path(&doc, "chatwoot.account_id"));
        assert!(!contains_path(&doc, "bridge.settle_delay_ms"));
    }
}
