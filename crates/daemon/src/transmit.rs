// Outbound notifications to editor endpoints.

use draftsync_common::protocol::jsonrpc::Request;
use draftsync_common::protocol::rpc_methods;
use draftsync_common::types::{EndpointId, ServerError};
use tokio::sync::mpsc;
use tracing::warn;

/// A JSON-RPC notification addressed to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundNotification {
    pub endpoint_id: EndpointId,
    pub notification: Request,
}

/// Delivers notifications to the client session identified by an endpoint id.
pub trait Transmitter: Send + Sync {
    fn transmit(&self, endpoint_id: &str, notification: Request);

    /// Send a `track:editor-working-copy-error` notification.
    fn transmit_error(&self, endpoint_id: &str, error: &ServerError) {
        match serde_json::to_value(error) {
            Ok(params) => self.transmit(
                endpoint_id,
                Request::notification(rpc_methods::WORKING_COPY_ERROR, Some(params)),
            ),
            Err(err) => warn!(endpoint_id, error = %err, "failed to encode error notification"),
        }
    }
}

/// Forwards notifications into a bounded channel drained by the transport.
///
/// Never blocks: when the channel is full or closed the notification is
/// dropped with a warning.
#[derive(Debug, Clone)]
pub struct ChannelTransmitter {
    tx: mpsc::Sender<OutboundNotification>,
}

impl ChannelTransmitter {
    pub fn new(tx: mpsc::Sender<OutboundNotification>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundNotification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl Transmitter for ChannelTransmitter {
    fn transmit(&self, endpoint_id: &str, notification: Request) {
        let method = notification.method.clone();
        let outbound = OutboundNotification { endpoint_id: endpoint_id.to_string(), notification };
        if let Err(error) = self.tx.try_send(outbound) {
            warn!(endpoint_id, method = %method, error = %error, "dropping outbound notification");
        }
    }
}
