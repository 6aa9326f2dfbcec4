//! The two serving loops and the sockets they own.
//!
//! One task blocks on the drone UDP socket, one on the dispatcher TCP
//! listener. Both funnel every decoded message through the [`Router`];
//! per-message errors are logged and dropped, only bind failures are fatal.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::errors::GatewayError;
use crate::protocol::{ClientCommand, ClientReply, DroneEvent, DroneMessage};
use crate::registry::DroneRegistry;
use crate::router::{Action, Router, SessionState};
use crate::MAX_DATAGRAM_SIZE;

/// Write side of the dispatcher connection, shared with the drone loop so
/// delivery notifications can be pushed as they arrive. When no dispatcher
/// is connected the notification is dropped; nothing is queued.
#[derive(Clone, Default)]
pub struct ClientSink {
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
}

impl ClientSink {
    fn new() -> Self {
        Self::default()
    }

    async fn attach(&self, writer: OwnedWriteHalf) {
        *self.writer.lock().await = Some(writer);
    }

    async fn detach(&self) {
        *self.writer.lock().await = None;
    }

    async fn send(&self, reply: &ClientReply) {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => {
                let line = format!("{reply}\n");
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    warn!("Failed to write to client: {e}");
                }
            }
            None => debug!("No client connected, dropping {reply:?}"),
        }
    }
}

pub struct Gateway {
    client_listener: TcpListener,
    drone_socket: Arc<UdpSocket>,
    router: Arc<Router>,
    sink: ClientSink,
}

impl Gateway {
    /// Binds both listening sockets. A bind failure here is the only fatal
    /// error in the system; the process should exit before serving traffic.
    pub async fn bind(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client_listener =
            TcpListener::bind(config.client_addr)
                .await
                .map_err(|source| GatewayError::Bind {
                    addr: config.client_addr,
                    source,
                })?;
        let drone_socket =
            UdpSocket::bind(config.drone_addr)
                .await
                .map_err(|source| GatewayError::Bind {
                    addr: config.drone_addr,
                    source,
                })?;

        Ok(Self {
            client_listener,
            drone_socket: Arc::new(drone_socket),
            router: Arc::new(Router::new(Arc::new(DroneRegistry::new()))),
            sink: ClientSink::new(),
        })
    }

    /// Actual dispatcher listen address, useful when bound to port 0.
    pub fn client_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.client_listener.local_addr()?)
    }

    /// Actual drone listen address.
    pub fn drone_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.drone_socket.local_addr()?)
    }

    /// Serves until the process is stopped: spawns the drone loop and runs
    /// the dispatcher accept/serve loop on the current task.
    pub async fn run(self) -> Result<(), GatewayError> {
        info!("Waiting client and drones...");
        let drone_task = tokio::spawn(drone_loop(
            self.drone_socket.clone(),
            self.router.clone(),
            self.sink.clone(),
        ));

        let result = self.serve_clients().await;
        drone_task.abort();
        result
    }

    /// Accepts and serves one dispatcher connection at a time. A closed or
    /// reset stream tears the session down and goes back to accepting; the
    /// registry is untouched across that transition.
    async fn serve_clients(&self) -> Result<(), GatewayError> {
        loop {
            let (stream, peer) = self.client_listener.accept().await?;
            info!("Client connected!");
            debug!("Client stream from {peer}");

            let (read_half, write_half) = stream.into_split();
            self.sink.attach(write_half).await;
            self.serve_session(read_half).await;
            self.sink.detach().await;
            info!("Client disconnected. Waiting for a new one");
        }
    }

    async fn serve_session(&self, read_half: tokio::net::tcp::OwnedReadHalf) {
        let mut session = SessionState::AwaitingHello;
        let mut lines = BufReader::new(read_half).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                // EOF or a reset both end the session the same way.
                Ok(None) => return,
                Err(e) => {
                    debug!("Client stream error: {e}");
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let command = match ClientCommand::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    warn!("Dropping client line: {e}");
                    continue;
                }
            };
            let actions = self
                .router
                .handle_client_command(&mut session, command)
                .await;
            for action in actions {
                self.perform(action).await;
            }
        }
    }

    async fn perform(&self, action: Action) {
        match action {
            Action::ToClient(reply) => self.sink.send(&reply).await,
            Action::ToDrone(endpoint, message) => {
                send_to_drone(&self.drone_socket, endpoint, &message).await;
            }
        }
    }
}

/// Receives one datagram per drone event, decodes it and executes the
/// router's decisions. Malformed packets are logged and dropped; the loop
/// never dies on a bad peer.
async fn drone_loop(socket: Arc<UdpSocket>, router: Arc<Router>, sink: ClientSink) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("UDP receive error: {e}");
                continue;
            }
        };
        let text = match std::str::from_utf8(&buf[..len]) {
            Ok(text) => text,
            Err(_) => {
                warn!("Dropping non-UTF-8 datagram from {from}");
                continue;
            }
        };
        let event = match DroneEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping datagram from {from}: {e}");
                continue;
            }
        };
        for action in router.handle_drone_event(event, from).await {
            match action {
                Action::ToClient(reply) => sink.send(&reply).await,
                Action::ToDrone(endpoint, message) => {
                    send_to_drone(&socket, endpoint, &message).await;
                }
            }
        }
    }
}

async fn send_to_drone(socket: &UdpSocket, endpoint: SocketAddr, message: &DroneMessage) {
    if let Err(e) = socket.send_to(message.encode().as_bytes(), endpoint).await {
        warn!("Failed to send {message:?} to {endpoint}: {e}");
    }
}
