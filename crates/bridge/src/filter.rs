use serde::Serialize;

use zapwoot_core::domain::webhook::{MessageKind, NormalizedMessage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Private,
    Incoming,
    EmptyContent,
    BotOrigin,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Incoming => "incoming",
            Self::EmptyContent => "empty_content",
            Self::BotOrigin => "bot_origin",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterDecision {
    Forward,
    Skip(SkipReason),
}

/// Decides whether a CRM message should reach WhatsApp.
///
/// Private notes, contact-originated messages and blank messages never leave the CRM. Messages
/// whose `source_id` carries the bot-origin prefix were relayed from WhatsApp in the first place
/// and are dropped to avoid echo loops.
#[derive(Clone, Debug)]
pub struct MessageFilter {
    bot_source_prefix: String,
}

impl MessageFilter {
    pub fn new(bot_source_prefix: impl Into<String>) -> Self {
        Self { bot_source_prefix: bot_source_prefix.into() }
    }

    pub fn bot_source_prefix(&self) -> &str {
        &self.bot_source_prefix
    }

    pub fn evaluate(&self, message: &NormalizedMessage) -> FilterDecision {
        if message.is_private {
            return FilterDecision::Skip(SkipReason::Private);
        }
        if message.message_type == MessageKind::Incoming {
            return FilterDecision::Skip(SkipReason::Incoming);
        }
        if message.content.trim().is_empty() {
            return FilterDecision::Skip(SkipReason::EmptyContent);
        }
        if self.is_bot_origin(message.source_id.as_deref()) {
            return FilterDecision::Skip(SkipReason::BotOrigin);
        }
        FilterDecision::Forward
    }

    // TODO: tag relayed messages through content_attributes once the inbox client sets them, so
    // agent-typed source ids that happen to share the prefix are not dropped.
    fn is_bot_origin(&self, source_id: Option<&str>) -> bool {
        source_id.map(|source_id| source_id.starts_with(&self.bot_source_prefix)).unwrap_or(false)
    }
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::new("WAID:")
    }
}
