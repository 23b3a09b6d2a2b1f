use bytes::BytesMut;
use shared::error::{Error, Result};
use shared::{TaggedBytesMut, TransportContext, TransportMessage};
use std::collections::hash_map::Entry::Vacant;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::config::HandshakeConfig;
use crate::conn::DTLSConn;
use crate::state::State;

pub enum EndpointEvent {
    HandshakeComplete,
    ApplicationData(BytesMut),
}

/// The entry point to the DTLS layer.
///
/// This object performs no I/O whatsoever. Instead, it generates a stream of
/// datagrams to send via `poll_transmit`, and consumes incoming datagrams via
/// `read`. Connections are keyed by remote address.
pub struct Endpoint {
    transmits: VecDeque<TaggedBytesMut>,
    connections: HashMap<SocketAddr, DTLSConn>,
    server_config: Option<Arc<HandshakeConfig>>,
}

impl Endpoint {
    /// Creates a new endpoint. `server_config` is used for connections
    /// initiated by remote peers.
    pub fn new(server_config: Option<Arc<HandshakeConfig>>) -> Self {
        Self {
            transmits: VecDeque::new(),
            connections: HashMap::new(),
            server_config,
        }
    }

    /// Replaces the server configuration, affecting new incoming connections
    /// only.
    pub fn set_server_config(&mut self, server_config: Option<Arc<HandshakeConfig>>) {
        self.server_config = server_config;
    }

    /// Gets the next datagram to transmit.
    #[must_use]
    pub fn poll_transmit(&mut self) -> Option<TaggedBytesMut> {
        self.transmits.pop_front()
    }

    /// Gets the negotiated state of the connection with `remote`.
    pub fn get_connection_state(&self, remote: SocketAddr) -> Option<&State> {
        self.connections.get(&remote).map(|c| c.connection_state())
    }

    pub fn is_handshake_completed(&self, remote: SocketAddr) -> bool {
        self.connections
            .get(&remote)
            .map(|c| c.is_handshake_completed())
            .unwrap_or(false)
    }

    /// Initiates a handshake as client towards `remote`.
    pub fn connect(
        &mut self,
        local: SocketAddr,
        remote: SocketAddr,
        client_config: Arc<HandshakeConfig>,
    ) -> Result<()> {
        if remote.port() == 0 {
            return Err(Error::InvalidRemoteAddress(remote));
        }

        if let Vacant(e) = self.connections.entry(remote) {
            let mut conn = DTLSConn::new(client_config, true, remote);
            conn.handshake()?;

            while let Some(payload) = conn.outgoing_raw_packet() {
                self.transmits.push_back(TransportMessage {
                    now: Instant::now(),
                    transport: TransportContext {
                        local_addr: local,
                        peer_addr: remote,
                        ecn: None,
                        transport_protocol: Default::default(),
                    },
                    message: payload,
                });
            }

            e.insert(conn);
        }

        Ok(())
    }

    /// Closes the connection with `remote`, flushing its close_notify.
    pub fn close(&mut self, local: SocketAddr, remote: SocketAddr) -> Option<DTLSConn> {
        if let Some(conn) = self.connections.get_mut(&remote) {
            conn.close();
            while let Some(payload) = conn.outgoing_raw_packet() {
                self.transmits.push_back(TransportMessage {
                    now: Instant::now(),
                    transport: TransportContext {
                        local_addr: local,
                        peer_addr: remote,
                        ecn: None,
                        transport_protocol: Default::default(),
                    },
                    message: payload,
                });
            }
        }
        self.connections.remove(&remote)
    }

    /// Processes an incoming datagram classified as DTLS.
    pub fn read(&mut self, msg: TaggedBytesMut) -> Result<Vec<EndpointEvent>> {
        let remote = msg.transport.peer_addr;

        if let Vacant(e) = self.connections.entry(remote) {
            if let Some(server_config) = &self.server_config {
                let conn = DTLSConn::new(server_config.clone(), false, remote);
                e.insert(conn);
            } else {
                return Err(Error::NoServerConfig);
            }
        }

        let mut events = vec![];
        if let Some(conn) = self.connections.get_mut(&remote) {
            let was_completed = conn.is_handshake_completed();
            conn.read(&msg.message)?;
            if !was_completed && conn.is_handshake_completed() {
                events.push(EndpointEvent::HandshakeComplete);
            }
            while let Some(data) = conn.incoming_application_data() {
                events.push(EndpointEvent::ApplicationData(data));
            }
            while let Some(payload) = conn.outgoing_raw_packet() {
                self.transmits.push_back(TransportMessage {
                    now: msg.now,
                    transport: TransportContext {
                        local_addr: msg.transport.local_addr,
                        peer_addr: remote,
                        ecn: msg.transport.ecn,
                        transport_protocol: msg.transport.transport_protocol,
                    },
                    message: payload,
                });
            }
        }

        Ok(events)
    }

    /// Sends application data over the established connection with `remote`.
    pub fn write(&mut self, local: SocketAddr, remote: SocketAddr, data: &[u8]) -> Result<()> {
        if let Some(conn) = self.connections.get_mut(&remote) {
            conn.write(data)?;
            while let Some(payload) = conn.outgoing_raw_packet() {
                self.transmits.push_back(TransportMessage {
                    now: Instant::now(),
                    transport: TransportContext {
                        local_addr: local,
                        peer_addr: remote,
                        ecn: None,
                        transport_protocol: Default::default(),
                    },
                    message: payload,
                });
            }
            Ok(())
        } else {
            Err(Error::InvalidRemoteAddress(remote))
        }
    }

    /// Drives retransmission timers for the connection with `remote`.
    pub fn handle_timeout(&mut self, local: SocketAddr, remote: SocketAddr, now: Instant) -> Result<()> {
        if let Some(conn) = self.connections.get_mut(&remote) {
            if let Some(retransmit_at) = conn.current_retransmit_timer {
                if now >= retransmit_at && !conn.is_handshake_completed() {
                    conn.handshake_timeout(now)?;
                    while let Some(payload) = conn.outgoing_raw_packet() {
                        self.transmits.push_back(TransportMessage {
                            now,
                            transport: TransportContext {
                                local_addr: local,
                                peer_addr: remote,
                                ecn: None,
                                transport_protocol: Default::default(),
                            },
                            message: payload,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// The earliest deadline among all connections' retransmission timers.
    pub fn poll_timeout(&self, remote: SocketAddr) -> Option<Instant> {
        self.connections
            .get(&remote)
            .and_then(|conn| conn.current_retransmit_timer)
    }
}
