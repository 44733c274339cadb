use std::sync::Arc;

use tracing::{debug, info, warn};

use zapwoot_core::transport::{TransportEventKind, TransportEventReceiver};

use crate::session::{EventDisposition, SessionService};
use crate::webhook::{BridgeService, RelayOutcome};

/// Consumes transport events until every sender is dropped.
///
/// Session bookkeeping always runs first; incoming messages for known sessions are then handed
/// to the bridge when one is attached. Failures are logged and the loop keeps going.
pub async fn run_event_loop(
    mut events: TransportEventReceiver,
    sessions: Arc<SessionService>,
    bridge: Option<Arc<BridgeService>>,
) {
    while let Some(event) = events.recv().await {
        let session_id = event.session_id.clone();
        let incoming = match &event.kind {
            TransportEventKind::IncomingMessage(message) => Some(message.clone()),
            _ => None,
        };

        let disposition = match sessions.handle_event(event).await {
            Ok(disposition) => disposition,
            Err(error) => {
                warn!(
                    event_name = "session.event.failed",
                    session_id = %session_id,
                    error = %error,
                    "transport event could not be applied"
                );
                continue;
            }
        };

        let (Some(message), Some(bridge), EventDisposition::Applied) =
            (incoming, bridge.as_ref(), disposition)
        else {
            continue;
        };

        match bridge.relay_incoming(&session_id, message).await {
            Ok(RelayOutcome::Relayed(_)) | Ok(RelayOutcome::AlreadyRelayed) => {}
            Ok(outcome) => debug!(
                event_name = "bridge.relay.skipped",
                session_id = %session_id,
                outcome = ?outcome,
                "incoming message not relayed"
            ),
            Err(error) => warn!(
                event_name = "bridge.relay.failed",
                session_id = %session_id,
                error = %error,
                "incoming message could not be relayed"
            ),
        }
    }

    info!(event_name = "session.event_loop.closed", "transport event channel closed");
}
