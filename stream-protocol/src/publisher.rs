//! Encode-and-send sink used by every bridge in production.

use std::net::SocketAddr;

use telemetry_schema::{AircraftIdentity, PositionSnapshot, TelemetrySink};
use tracing::{debug, info};

use crate::client::{SendOutcome, StreamClient, StreamStats};
use crate::{encode_aircraft, encode_position};

/// [`TelemetrySink`] that writes each record to the consumer stream.
///
/// Delivery is best effort: the outcome of each send is only logged.
pub struct StreamPublisher {
    client: StreamClient,
}

impl StreamPublisher {
    pub fn new(target: SocketAddr) -> Self {
        StreamPublisher { client: StreamClient::new(target) }
    }

    pub fn client(&self) -> &StreamClient {
        &self.client
    }

    pub fn stats(&self) -> StreamStats {
        self.client.stats()
    }

    /// Close the stream. Further publishes reconnect lazily.
    pub fn shutdown(&mut self) {
        info!(addr = %self.client.target(), "closing consumer stream");
        self.client.close();
    }

    fn send(&mut self, message: &str) -> SendOutcome {
        let outcome = self.client.send(message);
        if outcome == SendOutcome::Dropped {
            debug!(len = message.len(), "consumer not ready, message dropped");
        }
        outcome
    }
}

impl TelemetrySink for StreamPublisher {
    fn publish_position(&mut self, snapshot: &PositionSnapshot) {
        let message = encode_position(snapshot);
        self.send(&message);
    }

    fn publish_aircraft(&mut self, identity: &AircraftIdentity) {
        let message = encode_aircraft(identity);
        if let SendOutcome::Sent(_) = self.send(&message) {
            info!(
                icao = %identity.icao_type,
                registration = %identity.registration,
                "aircraft identity sent",
            );
        }
    }
}
