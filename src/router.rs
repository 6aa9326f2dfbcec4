//! Routing decisions for both traffic sources.
//!
//! The router is the only place that reads and writes the registry. It
//! never touches a socket: each handler returns the messages to emit as
//! [`Action`] values and the serving loops perform the sends after the
//! registry lock has long been released.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::protocol::{ClientCommand, ClientReply, DroneEvent, DroneMessage};
use crate::registry::{DroneRegistry, Registration};

/// Per-session state of the dispatcher connection. The only transition is
/// `AwaitingHello -> Active`, on the first `CLIENT-HELLO`; the session then
/// stays active until the stream closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHello,
    Active { remote_label: String },
}

impl SessionState {
    pub fn remote_label(&self) -> Option<&str> {
        match self {
            Self::AwaitingHello => None,
            Self::Active { remote_label } => Some(remote_label),
        }
    }
}

/// An outbound message decided by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ToClient(ClientReply),
    ToDrone(SocketAddr, DroneMessage),
}

pub struct Router {
    registry: Arc<DroneRegistry>,
}

impl Router {
    pub fn new(registry: Arc<DroneRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DroneRegistry {
        &self.registry
    }

    pub async fn handle_client_command(
        &self,
        session: &mut SessionState,
        command: ClientCommand,
    ) -> Vec<Action> {
        match command {
            ClientCommand::Hello { remote_label } => {
                info!("Client with IP {remote_label} connected!");
                *session = SessionState::Active { remote_label };
                Vec::new()
            }
            ClientCommand::AvailableDronesRequest => {
                debug!("Client requested the list of available drones");
                let snapshot = self.registry.snapshot().await;
                vec![Action::ToClient(ClientReply::AvailableDrones(snapshot))]
            }
            ClientCommand::ShipmentRequest { target, address } => {
                self.dispatch_shipment(session, target, address).await
            }
        }
    }

    /// Resolves the target, claims the drone and produces the forwarded
    /// instruction. Dispatch is fire-and-forget: nothing waits for the
    /// drone here, completion arrives later as a `DRONE-DELIVERED` event.
    async fn dispatch_shipment(
        &self,
        session: &SessionState,
        target: String,
        address: String,
    ) -> Vec<Action> {
        let client = session.remote_label().unwrap_or("unknown");
        let Some(addr) = self.registry.resolve(&target).await else {
            warn!("Drone {target} is not available");
            return vec![Action::ToClient(ClientReply::DroneNotAvailable { target })];
        };
        info!("Client ({client}) requested a delivery to {address} using drone {addr}");
        match self.registry.claim(&addr).await {
            Some(endpoint) => {
                info!("Shipment request sent to {addr}");
                vec![Action::ToDrone(
                    endpoint,
                    DroneMessage::ShipmentRequest { addr, address },
                )]
            }
            None => {
                warn!("Drone {target} is not available");
                vec![Action::ToClient(ClientReply::DroneNotAvailable { target })]
            }
        }
    }

    pub async fn handle_drone_event(&self, event: DroneEvent, from: SocketAddr) -> Vec<Action> {
        match event {
            DroneEvent::Ready { addr, label } => {
                match self
                    .registry
                    .register(addr.clone(), label.clone(), from)
                    .await
                {
                    Registration::Accepted => {
                        info!("Drone {label} ({addr}) is ready");
                        vec![Action::ToDrone(from, DroneMessage::Confirmed)]
                    }
                    Registration::AlreadyActive => {
                        warn!(
                            "Rejecting new drone since drone with IP {addr} is already connected"
                        );
                        vec![Action::ToDrone(from, DroneMessage::AlreadyConnected)]
                    }
                }
            }
            DroneEvent::Delivered { addr } => {
                if !self.registry.mark_available(&addr).await {
                    warn!("Delivery report from {addr}, which is not registered here");
                }
                info!("Drone {addr} delivered the package. Notifying client...");
                vec![Action::ToClient(ClientReply::ShipmentDelivered { addr })]
            }
            DroneEvent::ConnectionClosed { addr } => {
                info!("Drone {addr} disconnected");
                self.registry.mark_disconnected(&addr).await;
                Vec::new()
            }
        }
    }
}
