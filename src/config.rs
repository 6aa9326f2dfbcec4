use std::env;
use std::net::SocketAddr;

/// Environment variable overriding the dispatcher (TCP) listen address.
pub const CLIENT_ADDR_ENV: &str = "DRONENET_CLIENT_ADDR";

/// Environment variable overriding the drone (UDP) listen address.
pub const DRONE_ADDR_ENV: &str = "DRONENET_DRONE_ADDR";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the dispatcher connects to over TCP.
    pub client_addr: SocketAddr,

    /// Address drones send their datagrams to.
    pub drone_addr: SocketAddr,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            client_addr: ([127, 0, 0, 1], 8810).into(),
            drone_addr: ([127, 0, 0, 1], 8811).into(),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = addr;
        self
    }

    pub fn with_drone_addr(mut self, addr: SocketAddr) -> Self {
        self.drone_addr = addr;
        self
    }

    /// Returns the default configuration with any [`CLIENT_ADDR_ENV`] /
    /// [`DRONE_ADDR_ENV`] overrides applied. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(addr) = addr_from_env(CLIENT_ADDR_ENV) {
            config.client_addr = addr;
        }
        if let Some(addr) = addr_from_env(DRONE_ADDR_ENV) {
            config.drone_addr = addr;
        }
        config
    }
}

/// Parses an environment variable as a socket address.
pub fn addr_from_env(key: &str) -> Option<SocketAddr> {
    let raw = env::var(key).ok()?;
    parse_addr(&raw)
}

fn parse_addr(raw: &str) -> Option<SocketAddr> {
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_addr_rejects_invalid_values() {
        assert_eq!(parse_addr(""), None);
        assert_eq!(parse_addr("localhost"), None);
        assert_eq!(parse_addr("127.0.0.1"), None);
    }

    #[test]
    fn parse_addr_accepts_host_port_pairs() {
        assert_eq!(parse_addr("127.0.0.1:8810"), Some(([127, 0, 0, 1], 8810).into()));
        assert_eq!(parse_addr(" 0.0.0.0:9000 "), Some(([0, 0, 0, 0], 9000).into()));
    }

    #[test]
    fn default_ports_match_the_deployed_gateway() {
        let config = GatewayConfig::default();
        assert_eq!(config.client_addr.port(), 8810);
        assert_eq!(config.drone_addr.port(), 8811);
    }
}
