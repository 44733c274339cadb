//! Session orchestration and the Chatwoot to WhatsApp message bridge.

pub mod error;
pub mod events;
pub mod filter;
pub mod resolver;
pub mod session;
pub mod webhook;

#[cfg(test)]
mod test_support;

pub use error::{BridgeError, SessionError};
pub use events::run_event_loop;
pub use filter::{FilterDecision, MessageFilter, SkipReason};
pub use resolver::{IdentityResolver, Recipient, RecipientSource, ResolutionFailure};
pub use session::{
    EventDisposition, NewSession, QrCodeImage, SessionService, SessionSettings,
};
pub use webhook::{BridgeService, BridgeSettings, RelayOutcome, WebhookOutcome};
