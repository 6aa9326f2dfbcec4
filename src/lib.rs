//! Gateway for a drone delivery fleet.
//!
//! A single dispatcher connects over TCP and requests deliveries; drones
//! report in over UDP, one self-contained datagram per event. The gateway
//! keeps the authoritative registry of drones and decides which one serves
//! each request. Dispatch is fire-and-forget: the gateway forwards the
//! shipment instruction to the drone's last known endpoint and learns about
//! completion later, from an independent `DRONE-DELIVERED` event.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod router;

pub use config::GatewayConfig;
pub use errors::GatewayError;
pub use gateway::Gateway;
pub use protocol::{ClientCommand, ClientReply, DroneEvent, DroneMessage, Frame};
pub use registry::{DroneAddr, DroneRegistry, DroneStatus, Registration};
pub use router::{Action, Router, SessionState};

/// Largest datagram a drone is expected to send.
pub const MAX_DATAGRAM_SIZE: usize = 1024;
