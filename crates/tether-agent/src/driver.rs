//! The host driver.
//!
//! Owns everything the process needs — config, client state, object
//! registry, controller channel, UDP socket, connection table — and runs the
//! select loop over the socket, controller lines, the step ticker and
//! ctrl-c. Signals resolve inside the loop instead of mutating globals.
//!
//! The CoAP exchanges themselves (registration, bootstrap, observation
//! bookkeeping) belong to the external protocol stack; the driver models
//! the externally visible state progression and emits the
//! `/stateChanged:` and `/observe:` lines the controller relies on.
//!
//! ```text
//! Initial ──> RegisterRequired ──> Registering ──> Ready
//!    │                                 ^
//!    └─> BootstrapRequired ──> Bootstrapping (restore on stall)
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tether_client::{
    InboundLine, Lwm2mObject, MESSAGE_ID, ObjectProxy, Registry, StdioChannel, Status, Uri,
    channel::decode_reply,
    objects::{
        ACCESS_CONTROL_OBJECT_ID, CONNECTIVITY_MONITORING_OBJECT_ID,
        CONNECTIVITY_STATISTICS_OBJECT_ID, DeviceObject, FIRMWARE_OBJECT_ID, LOCATION_OBJECT_ID,
        SECURITY_OBJECT_ID, SERVER_OBJECT_ID, SecurityInstance, SecurityObject, ServerInstance,
        ServerObject,
    },
};
use tether_proto::Reply;
use tokio::io::AsyncWrite;
use tokio::net::UdpSocket;

use crate::connections::ConnectionTable;

/// Interval between state machine steps.
pub const STEP_INTERVAL: Duration = Duration::from_secs(5);

/// Largest datagram the socket loop accepts.
const MAX_PACKET_SIZE: usize = 1024;

/// Steps a bootstrap may stall before the saved objects are restored.
const BOOTSTRAP_STEP_LIMIT: u8 = 4;

/// Connections with no traffic for this long are closed.
const CONNECTION_IDLE: Duration = Duration::from_secs(120);

/// Short server id shared by the security and server entries.
const SHORT_SERVER_ID: u16 = 123;

/// Everything the binary needs to know, parsed from the command line.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Endpoint name the client registers under.
    pub endpoint_name: String,
    /// Local UDP port.
    pub local_port: u16,
    /// Server host; defaults to the loopback of the chosen family.
    pub server_host: Option<String>,
    /// Server port.
    pub server_port: u16,
    /// Registration lifetime in seconds.
    pub lifetime: i64,
    /// Start with a bootstrap exchange.
    pub bootstrap: bool,
    /// Use IPv4 instead of IPv6.
    pub ipv4: bool,
    /// DTLS PSK identity.
    pub psk_identity: Option<String>,
    /// DTLS PSK secret.
    pub psk_key: Option<Vec<u8>>,
}

impl DriverConfig {
    fn server_host(&self) -> &str {
        self.server_host.as_deref().unwrap_or(if self.ipv4 { "127.0.0.1" } else { "[::1]" })
    }

    /// `host:port`, bracketing bare IPv6 literals.
    fn server_authority(&self) -> String {
        let host = self.server_host();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.server_port)
        } else {
            format!("{host}:{}", self.server_port)
        }
    }

    /// The URI stored in the security object; `coaps://` once a PSK is set.
    fn server_uri(&self) -> String {
        let scheme = if self.psk_key.is_some() { "coaps" } else { "coap" };
        format!("{scheme}://{}", self.server_authority())
    }
}

/// Externally visible client states, in controller spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing has happened yet.
    Initial,
    /// A bootstrap exchange is needed before registration.
    BootstrapRequired,
    /// Bootstrap in progress.
    Bootstrapping,
    /// Ready to register with the server.
    RegisterRequired,
    /// Registration in flight.
    Registering,
    /// Registered and serving.
    Ready,
}

impl ClientState {
    /// The state name sent in `/stateChanged:` notifications.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initial => "STATE_INITIAL",
            Self::BootstrapRequired => "STATE_BOOTSTRAP_REQUIRED",
            Self::Bootstrapping => "STATE_BOOTSTRAPPING",
            Self::RegisterRequired => "STATE_REGISTER_REQUIRED",
            Self::Registering => "STATE_REGISTERING",
            Self::Ready => "STATE_READY",
        }
    }
}

/// Startup failures. All of these are fatal to the process.
#[derive(Error, Debug)]
pub enum SetupError {
    /// The local UDP port could not be bound.
    #[error("failed to bind local UDP port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying bind error.
        source: std::io::Error,
    },

    /// The server address did not resolve.
    #[error("cannot resolve server address {authority}: {source}")]
    Resolve {
        /// `host:port` that was looked up.
        authority: String,
        /// Underlying resolver error.
        source: std::io::Error,
    },

    /// The lookup returned no usable address.
    #[error("no usable address for {0}")]
    NoAddress(String),
}

/// The owned driver context.
pub struct Driver<W> {
    config: DriverConfig,
    state: ClientState,
    registry: Registry,
    link: StdioChannel<W>,
    socket: UdpSocket,
    server_addr: SocketAddr,
    connections: ConnectionTable,
    backup: Vec<Box<dyn Lwm2mObject>>,
    bootstrap_steps: u8,
}

impl Driver<tokio::io::Stdout> {
    /// Driver over the process's real stdio.
    ///
    /// # Errors
    ///
    /// `SetupError` if the socket cannot bind or the server does not
    /// resolve.
    pub async fn new(config: DriverConfig) -> Result<Self, SetupError> {
        Self::with_link(config, StdioChannel::stdio()).await
    }
}

impl<W: AsyncWrite + Unpin> Driver<W> {
    /// Driver over an explicit controller channel.
    ///
    /// # Errors
    ///
    /// `SetupError` if the socket cannot bind or the server does not
    /// resolve.
    pub async fn with_link(
        config: DriverConfig,
        link: StdioChannel<W>,
    ) -> Result<Self, SetupError> {
        let bind_addr = if config.ipv4 {
            format!("0.0.0.0:{}", config.local_port)
        } else {
            format!("[::]:{}", config.local_port)
        };
        let socket = UdpSocket::bind(&bind_addr)
            .await
            .map_err(|source| SetupError::Bind { port: config.local_port, source })?;

        let authority = config.server_authority();
        let addrs = tokio::net::lookup_host(&authority)
            .await
            .map_err(|source| SetupError::Resolve { authority: authority.clone(), source })?;
        let mut fallback = None;
        let mut matching = None;
        for addr in addrs {
            if addr.is_ipv4() == config.ipv4 {
                matching = Some(addr);
                break;
            }
            fallback.get_or_insert(addr);
        }
        let server_addr =
            matching.or(fallback).ok_or_else(|| SetupError::NoAddress(authority))?;

        let registry = build_registry(&config);

        Ok(Self {
            config,
            state: ClientState::Initial,
            registry,
            link,
            socket,
            server_addr,
            connections: ConnectionTable::new(),
            backup: Vec::new(),
            bootstrap_steps: 0,
        })
    }

    /// Current client state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Run until ctrl-c or the controller closes stdin.
    pub async fn run(&mut self) {
        tracing::info!(
            endpoint = %self.config.endpoint_name,
            server = %self.server_addr,
            port = self.config.local_port,
            "client started"
        );

        let mut ticker = tokio::time::interval(STEP_INTERVAL);
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, shutting down");
                    break;
                },
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => self.handle_datagram(len, peer).await,
                    Err(e) => tracing::warn!(error = %e, "socket receive failed"),
                },
                line = self.link.next_line() => match line {
                    Some(line) => self.handle_line(line).await,
                    None => {
                        tracing::info!("controller closed stdin, shutting down");
                        break;
                    },
                },
                _ = ticker.tick() => self.step().await,
            }
        }
    }

    /// Advance the state machine one step.
    async fn step(&mut self) {
        let closed = self.connections.prune_idle(CONNECTION_IDLE);
        if closed > 0 {
            tracing::debug!(closed, "idle connections closed");
        }

        match self.state {
            ClientState::Initial => {
                let next = if self.config.bootstrap {
                    ClientState::BootstrapRequired
                } else {
                    ClientState::RegisterRequired
                };
                self.transition(next).await;
            },
            ClientState::BootstrapRequired => {
                self.bootstrap_steps = 0;
                self.transition(ClientState::Bootstrapping).await;
            },
            ClientState::Bootstrapping => {
                self.bootstrap_steps += 1;
                if self.bootstrap_steps > BOOTSTRAP_STEP_LIMIT {
                    tracing::warn!("bootstrap stalled, restoring security and server objects");
                    let saved = std::mem::take(&mut self.backup);
                    self.registry.restore(saved);
                    self.transition(ClientState::Initial).await;
                }
            },
            ClientState::RegisterRequired => {
                // The registration exchange itself is the protocol stack's
                // business; the object paths are what this client contributes.
                tracing::info!(
                    endpoint = %self.config.endpoint_name,
                    server = %self.server_addr,
                    paths = %self.registry.registration_paths(),
                    "registering"
                );
                self.transition(ClientState::Registering).await;
            },
            ClientState::Registering => {},
            ClientState::Ready => {
                if let Err(e) = self.link.poll_observed().await {
                    tracing::warn!(error = %e, "observe poll failed");
                }
            },
        }
    }

    /// Move to `next`, notifying the controller on every change.
    async fn transition(&mut self, next: ClientState) {
        if next == self.state {
            return;
        }
        tracing::info!(from = self.state.name(), to = next.name(), "state changed");
        self.state = next;

        if next == ClientState::Bootstrapping {
            self.backup = self.registry.backup(&[SECURITY_OBJECT_ID, SERVER_OBJECT_ID]);
            tracing::info!(objects = self.backup.len(), "objects backed up for bootstrap");
        }

        if let Err(e) = self.link.notify_state(next.name()).await {
            tracing::warn!(error = %e, "state change notification failed");
        }
    }

    /// A datagram arrived on the UDP socket.
    async fn handle_datagram(&mut self, len: usize, peer: SocketAddr) {
        let handle = self.connections.touch(peer);
        tracing::debug!(%peer, len, ?handle, "datagram received");

        // Packet contents are the stack's concern; what the driver models is
        // the exchange completing.
        match self.state {
            ClientState::Registering => {
                tracing::info!(%peer, "registration acknowledged");
                self.transition(ClientState::Ready).await;
            },
            ClientState::Bootstrapping => {
                tracing::info!(%peer, "bootstrap finished");
                self.transition(ClientState::RegisterRequired).await;
            },
            _ => {},
        }
    }

    /// A controller line arrived outside of an exchange.
    async fn handle_line(&mut self, line: InboundLine) {
        let line = match line {
            InboundLine::Line(line) => line,
            InboundLine::Oversize(len) => {
                tracing::warn!(len, "oversize controller line dropped");
                return;
            },
        };

        if line.starts_with("/resp:observe:") {
            match decode_reply(&line, "observe") {
                Ok(frame) => self.handle_observe_reply(&frame).await,
                Err(e) => tracing::warn!(error = %e, "observe reply rejected"),
            }
        } else {
            tracing::debug!(%line, "unhandled controller line");
        }
    }

    /// Route the values of an observe reply to their objects.
    async fn handle_observe_reply(&mut self, frame: &[u8]) {
        let reply = match Reply::parse(frame, MESSAGE_ID) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "observe reply frame rejected");
                return;
            },
        };
        if !reply.status().is_success() {
            tracing::warn!(status = %reply.status(), "observe poll answered with an error");
            return;
        }
        let values = match reply.values() {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(error = %e, "observe reply body rejected");
                return;
            },
        };

        let object_id = reply.object_id();
        let instance_id = reply.instance_id();
        for resource in values {
            let uri = Uri { object_id, instance_id, resource_id: resource.id };
            let text = resource.value.to_string();
            let status = self.registry.value_changed(&mut self.link, &uri, &text).await;
            if status == Status::CHANGED {
                // Observer notification from here on is the stack's job.
                tracing::debug!(%uri, "observed value updated");
            }
        }
    }
}

/// The object set every client starts with.
fn build_registry(config: &DriverConfig) -> Registry {
    let mut registry = Registry::new();

    registry.insert(Box::new(SecurityObject::new(SecurityInstance {
        instance_id: 0,
        server_uri: config.server_uri(),
        bootstrap_server: config.bootstrap,
        psk_identity: config.psk_identity.clone(),
        psk_key: config.psk_key.clone(),
        short_server_id: SHORT_SERVER_ID,
    })));
    registry.insert(Box::new(ServerObject::new(ServerInstance {
        instance_id: 0,
        short_server_id: SHORT_SERVER_ID,
        lifetime: config.lifetime,
        storing: false,
        binding: "U".to_owned(),
    })));
    registry.insert(Box::new(DeviceObject::new()));

    for object_id in [
        ACCESS_CONTROL_OBJECT_ID,
        CONNECTIVITY_MONITORING_OBJECT_ID,
        FIRMWARE_OBJECT_ID,
        LOCATION_OBJECT_ID,
        CONNECTIVITY_STATISTICS_OBJECT_ID,
    ] {
        registry.insert(Box::new(ObjectProxy::new(object_id)));
    }

    registry
}
