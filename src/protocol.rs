//! Line protocol shared by the dispatcher and the drones.
//!
//! Every message is a single text line: a case-sensitive verb, then
//! space-separated positional arguments. The final argument of shipment
//! messages is free text and may itself contain spaces, so it is rejoined
//! from the remaining tokens rather than truncated at the first one.

use std::collections::HashMap;
use std::fmt;

use crate::errors::GatewayError;
use crate::registry::{DroneAddr, DroneStatus};

pub const CLIENT_HELLO: &str = "CLIENT-HELLO";
pub const AVAILABLE_DRONES_REQUEST: &str = "AVAILABLE-DRONES-REQUEST";
pub const AVAILABLE_DRONES_RESPONSE: &str = "AVAILABLE-DRONES-RESPONSE";
pub const SHIPMENT_REQUEST: &str = "SHIPMENT-REQUEST";
pub const DRONE_NOT_AVAILABLE: &str = "DRONE-NOT-AVAILABLE";
pub const DRONE_SHIPMENT_DELIVERED: &str = "DRONE-SHIPMENT-DELIVERED";
pub const DRONE_READY: &str = "DRONE-READY";
pub const DRONE_CONFIRMED: &str = "DRONE-CONFIRMED";
pub const DRONE_ALREADY_CONNECTED: &str = "DRONE-ALREADY-CONNECTED";
pub const DRONE_DELIVERED: &str = "DRONE-DELIVERED";
pub const DRONE_CONNECTION_CLOSED: &str = "DRONE-CONNECTION-CLOSED";

/// A raw decoded line: verb plus positional arguments. Unknown verbs
/// survive here as opaque strings; mapping to the command enums below
/// happens once, at the receiving loop's boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub verb: String,
    pub args: Vec<String>,
}

impl Frame {
    pub fn decode(line: &str) -> Result<Self, GatewayError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split(' ');
        let verb = parts
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatewayError::Protocol("empty line".to_string()))?;

        Ok(Self {
            verb: verb.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    pub fn encode(&self) -> String {
        let mut line = self.verb.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Commands the dispatcher may send over its stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Hello { remote_label: String },
    AvailableDronesRequest,
    ShipmentRequest { target: String, address: String },
}

impl ClientCommand {
    pub fn parse(line: &str) -> Result<Self, GatewayError> {
        let frame = Frame::decode(line)?;
        match frame.verb.as_str() {
            CLIENT_HELLO => {
                let remote_label = required_arg(&frame, 0)?;
                Ok(Self::Hello { remote_label })
            }
            AVAILABLE_DRONES_REQUEST => Ok(Self::AvailableDronesRequest),
            SHIPMENT_REQUEST => {
                let target = required_arg(&frame, 0)?;
                // Delivery addresses contain spaces; rejoin everything
                // after the target.
                let address = frame.args[1..].join(" ");
                if address.is_empty() {
                    return Err(GatewayError::Protocol(format!(
                        "{SHIPMENT_REQUEST} is missing the delivery address"
                    )));
                }
                Ok(Self::ShipmentRequest { target, address })
            }
            verb => Err(GatewayError::Protocol(format!(
                "unknown client verb: {verb}"
            ))),
        }
    }
}

/// Events drones report over the datagram channel, one per packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DroneEvent {
    Ready { addr: DroneAddr, label: String },
    Delivered { addr: DroneAddr },
    ConnectionClosed { addr: DroneAddr },
}

impl DroneEvent {
    pub fn parse(line: &str) -> Result<Self, GatewayError> {
        let frame = Frame::decode(line)?;
        let addr: DroneAddr = required_arg(&frame, 0)?.parse()?;
        match frame.verb.as_str() {
            DRONE_READY => {
                let label = required_arg(&frame, 1)?;
                Ok(Self::Ready { addr, label })
            }
            DRONE_DELIVERED => Ok(Self::Delivered { addr }),
            DRONE_CONNECTION_CLOSED => Ok(Self::ConnectionClosed { addr }),
            verb => Err(GatewayError::Protocol(format!(
                "unknown drone verb: {verb}"
            ))),
        }
    }
}

/// Replies and notifications pushed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientReply {
    AvailableDrones(HashMap<String, DroneStatus>),
    DroneNotAvailable { target: String },
    ShipmentDelivered { addr: DroneAddr },
}

impl fmt::Display for ClientReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AvailableDrones(status) => {
                let json =
                    serde_json::to_string(status).unwrap_or_else(|_| "{}".to_string());
                write!(f, "{AVAILABLE_DRONES_RESPONSE} {json}")
            }
            Self::DroneNotAvailable { target } => {
                write!(f, "{DRONE_NOT_AVAILABLE} {target}")
            }
            Self::ShipmentDelivered { addr } => {
                write!(f, "{DRONE_SHIPMENT_DELIVERED} {addr}")
            }
        }
    }
}

impl ClientReply {
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

/// Messages sent to a drone's endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DroneMessage {
    Confirmed,
    AlreadyConnected,
    ShipmentRequest { addr: DroneAddr, address: String },
}

impl fmt::Display for DroneMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => write!(f, "{DRONE_CONFIRMED}"),
            Self::AlreadyConnected => write!(f, "{DRONE_ALREADY_CONNECTED}"),
            Self::ShipmentRequest { addr, address } => {
                write!(f, "{SHIPMENT_REQUEST} {addr} {address}")
            }
        }
    }
}

impl DroneMessage {
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

fn required_arg(frame: &Frame, index: usize) -> Result<String, GatewayError> {
    frame.args.get(index).cloned().ok_or_else(|| {
        GatewayError::Protocol(format!(
            "{} expects at least {} argument(s)",
            frame.verb,
            index + 1
        ))
    })
}
