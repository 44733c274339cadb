pub mod config;
pub mod crm;
pub mod domain;
pub mod errors;
pub mod qr;
pub mod transport;

pub use crm::{CrmConversation, CrmContact, CrmDirectory, CrmError, CrmInbox, CrmMessageRef};
pub use domain::mapping::{MessageDirection, MessageMapping, NewMessageMapping};
pub use domain::session::{ConnectionState, ProxyConfig, Session, SessionEvent, SessionId};
pub use domain::webhook::{MessageKind, NormalizedMessage, WebhookEvent};
pub use errors::{Classify, DomainError, ErrorKind, InterfaceError};
pub use transport::{
    DeviceInfo, IncomingMessage, OutboundMessage, SentMessage, TransportError, TransportEvent,
    TransportEventKind, TransportManager,
};
