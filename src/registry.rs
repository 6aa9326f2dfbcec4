//! Authoritative registry of drones, shared by the client and drone loops.
//!
//! Every operation takes the lock once and performs its check and mutation
//! under it, so the two loops can never interleave into an inconsistent
//! state. The lock is never held across a network send.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::GatewayError;

/// Validated drone address: `192.168.1.X` with X in 2..=254, the fleet's
/// reserved range. This is the drone's stable identity, not a routable
/// endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DroneAddr(String);

impl FromStr for DroneAddr {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GatewayError::Protocol(format!("invalid drone address: {s}"));
        let last = s.strip_prefix("192.168.1.").ok_or_else(invalid)?;
        let octet: u8 = last.parse().map_err(|_| invalid())?;
        // Reject leading zeros and other non-canonical spellings.
        if octet.to_string() != last || !(2..=254).contains(&octet) {
            return Err(invalid());
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for DroneAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct DroneEntry {
    pub label: String,
    pub available: bool,
    /// Transient return address on the datagram channel; cleared on
    /// disconnect, refreshed on every successful registration.
    pub endpoint: Option<SocketAddr>,
}

/// Point-in-time view of one drone, as serialized in the
/// `AVAILABLE-DRONES-RESPONSE` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroneStatus {
    pub id: String,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Accepted,
    AlreadyActive,
}

#[derive(Debug, Default)]
pub struct DroneRegistry {
    drones: RwLock<HashMap<DroneAddr, DroneEntry>>,
}

impl DroneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a drone under `addr`. Rejected only while an active entry
    /// holds the address; a disconnected or busy-and-gone entry is
    /// overwritten, which is how a drone reclaims its address after a
    /// restart.
    pub async fn register(
        &self,
        addr: DroneAddr,
        label: String,
        endpoint: SocketAddr,
    ) -> Registration {
        let mut drones = self.drones.write().await;
        if drones.get(&addr).is_some_and(|d| d.available) {
            return Registration::AlreadyActive;
        }
        drones.insert(
            addr,
            DroneEntry {
                label,
                available: true,
                endpoint: Some(endpoint),
            },
        );
        Registration::Accepted
    }

    /// Atomically claims an available drone for a delivery: checks
    /// availability, marks it busy and returns its endpoint in one step.
    /// Returns `None` when the drone is unknown, busy or disconnected.
    pub async fn claim(&self, addr: &DroneAddr) -> Option<SocketAddr> {
        let mut drones = self.drones.write().await;
        let drone = drones.get_mut(addr)?;
        if !drone.available {
            return None;
        }
        let endpoint = drone.endpoint?;
        drone.available = false;
        Some(endpoint)
    }

    /// Marks a drone available again after a completed delivery. A drone
    /// that disconnected while busy stays unavailable until it
    /// re-registers; returns whether the flag flipped.
    pub async fn mark_available(&self, addr: &DroneAddr) -> bool {
        let mut drones = self.drones.write().await;
        match drones.get_mut(addr) {
            Some(drone) if drone.endpoint.is_some() => {
                drone.available = true;
                true
            }
            _ => false,
        }
    }

    /// Records a graceful disconnect. Idempotent; unknown addresses are
    /// ignored. The entry is kept so the address can be reclaimed later.
    pub async fn mark_disconnected(&self, addr: &DroneAddr) {
        let mut drones = self.drones.write().await;
        if let Some(drone) = drones.get_mut(addr) {
            drone.available = false;
            drone.endpoint = None;
        }
    }

    /// Resolves a dispatcher-supplied identifier to a drone address.
    /// Address-shaped input resolves to itself without an existence check;
    /// anything else is looked up as a label, first match wins.
    pub async fn resolve(&self, identifier: &str) -> Option<DroneAddr> {
        if let Ok(addr) = identifier.parse::<DroneAddr>() {
            return Some(addr);
        }
        let drones = self.drones.read().await;
        drones
            .iter()
            .find(|(_, drone)| drone.label == identifier)
            .map(|(addr, _)| addr.clone())
    }

    /// Deep copy of the registry for reporting; mutating the result does
    /// not touch live state.
    pub async fn snapshot(&self) -> HashMap<String, DroneStatus> {
        let drones = self.drones.read().await;
        drones
            .iter()
            .map(|(addr, drone)| {
                (
                    addr.to_string(),
                    DroneStatus {
                        id: drone.label.clone(),
                        available: drone.available,
                    },
                )
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.drones.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.drones.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> DroneAddr {
        s.parse().unwrap()
    }

    fn endpoint(port: u16) -> SocketAddr {
        ([127, 0, 0, 1], port).into()
    }

    #[test]
    fn drone_addr_accepts_the_reserved_range() {
        assert!("192.168.1.2".parse::<DroneAddr>().is_ok());
        assert!("192.168.1.100".parse::<DroneAddr>().is_ok());
        assert!("192.168.1.254".parse::<DroneAddr>().is_ok());
    }

    #[test]
    fn drone_addr_rejects_out_of_range_and_malformed_input() {
        for bad in [
            "192.168.1.1",
            "192.168.1.255",
            "192.168.1.0",
            "192.168.1.300",
            "192.168.2.5",
            "10.0.0.5",
            "192.168.1.05",
            "192.168.1.",
            "192.168.1.5x",
            "D1",
            "",
        ] {
            assert!(bad.parse::<DroneAddr>().is_err(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn second_registration_is_rejected_while_first_is_active() {
        let registry = DroneRegistry::new();
        let first = registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4000))
            .await;
        assert_eq!(first, Registration::Accepted);

        let second = registry
            .register(addr("192.168.1.5"), "D2".to_string(), endpoint(4001))
            .await;
        assert_eq!(second, Registration::AlreadyActive);

        // The original registration is untouched.
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot["192.168.1.5"].id, "D1");
    }

    #[tokio::test]
    async fn disconnect_frees_the_address_for_reregistration() {
        let registry = DroneRegistry::new();
        registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4000))
            .await;
        registry.mark_disconnected(&addr("192.168.1.5")).await;

        let again = registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4002))
            .await;
        assert_eq!(again, Registration::Accepted);
        assert_eq!(registry.claim(&addr("192.168.1.5")).await, Some(endpoint(4002)));
    }

    #[tokio::test]
    async fn claim_flips_availability_and_returns_the_endpoint() {
        let registry = DroneRegistry::new();
        registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4000))
            .await;

        assert_eq!(registry.claim(&addr("192.168.1.5")).await, Some(endpoint(4000)));
        assert!(!registry.snapshot().await["192.168.1.5"].available);

        // A busy drone cannot be claimed twice.
        assert_eq!(registry.claim(&addr("192.168.1.5")).await, None);
    }

    #[tokio::test]
    async fn claim_of_unknown_or_disconnected_drone_fails_without_mutation() {
        let registry = DroneRegistry::new();
        assert_eq!(registry.claim(&addr("192.168.1.9")).await, None);
        assert!(registry.is_empty().await);

        registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4000))
            .await;
        registry.mark_disconnected(&addr("192.168.1.5")).await;
        assert_eq!(registry.claim(&addr("192.168.1.5")).await, None);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn delivery_completion_restores_availability() {
        let registry = DroneRegistry::new();
        registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4000))
            .await;
        registry.claim(&addr("192.168.1.5")).await;

        assert!(registry.mark_available(&addr("192.168.1.5")).await);
        assert!(registry.snapshot().await["192.168.1.5"].available);
    }

    #[tokio::test]
    async fn delivery_completion_after_disconnect_does_not_resurrect() {
        let registry = DroneRegistry::new();
        registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4000))
            .await;
        registry.claim(&addr("192.168.1.5")).await;
        registry.mark_disconnected(&addr("192.168.1.5")).await;

        assert!(!registry.mark_available(&addr("192.168.1.5")).await);
        assert!(!registry.snapshot().await["192.168.1.5"].available);
    }

    #[tokio::test]
    async fn mark_disconnected_is_idempotent_and_ignores_unknowns() {
        let registry = DroneRegistry::new();
        registry.mark_disconnected(&addr("192.168.1.9")).await;
        assert!(registry.is_empty().await);

        registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4000))
            .await;
        registry.mark_disconnected(&addr("192.168.1.5")).await;
        registry.mark_disconnected(&addr("192.168.1.5")).await;
        assert!(!registry.snapshot().await["192.168.1.5"].available);
    }

    #[tokio::test]
    async fn resolve_by_label_and_by_address_agree() {
        let registry = DroneRegistry::new();
        registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4000))
            .await;

        let by_label = registry.resolve("D1").await;
        let by_addr = registry.resolve("192.168.1.5").await;
        assert_eq!(by_label, Some(addr("192.168.1.5")));
        assert_eq!(by_label, by_addr);
    }

    #[tokio::test]
    async fn resolve_of_address_shaped_input_skips_the_existence_check() {
        let registry = DroneRegistry::new();
        assert_eq!(
            registry.resolve("192.168.1.77").await,
            Some(addr("192.168.1.77"))
        );
        assert_eq!(registry.resolve("D404").await, None);
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_live_state() {
        let registry = DroneRegistry::new();
        registry
            .register(addr("192.168.1.5"), "D1".to_string(), endpoint(4000))
            .await;

        let mut snapshot = registry.snapshot().await;
        snapshot.get_mut("192.168.1.5").unwrap().available = false;
        snapshot.insert(
            "192.168.1.6".to_string(),
            DroneStatus {
                id: "ghost".to_string(),
                available: true,
            },
        );

        assert!(registry.snapshot().await["192.168.1.5"].available);
        assert_eq!(registry.len().await, 1);
    }
}
