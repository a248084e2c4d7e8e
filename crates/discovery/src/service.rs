// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery service: broadcast timer plus datagram handling for one role.

use crate::datagram::{decode_datagram, encode_datagram, Datagram};
use convoy_core::{Clock, Destination, SystemClock};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// How often each role re-announces itself.
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(3);

/// Errors from the discovery subsystem.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Events raised toward the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A destination announced itself (orchestrator role only). The record
    /// has its `ip_address` normalized from the datagram sender and an id
    /// derived when the announce carried none.
    DestinationDiscovered(Destination),
    /// An orchestrator probe was seen (either role).
    OrchestratorDiscovered { address: IpAddr, port: u16 },
}

enum Role {
    Orchestrator { orchestrator_port: u16 },
    Destination { info: Destination },
}

/// UDP discovery endpoint bound with address reuse and broadcast enabled.
pub struct DiscoveryService {
    socket: UdpSocket,
    port: u16,
    role: Role,
    clock: SystemClock,
    events: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl DiscoveryService {
    /// Bind the orchestrator role: probe broadcasts + announce handling.
    pub fn orchestrator(
        port: u16,
        orchestrator_port: u16,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DiscoveryEvent>), DiscoveryError> {
        Self::bind(port, Role::Orchestrator { orchestrator_port })
    }

    /// Bind the destination role: announce broadcasts + probe replies.
    pub fn destination(
        port: u16,
        info: Destination,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DiscoveryEvent>), DiscoveryError> {
        Self::bind(port, Role::Destination { info })
    }

    fn bind(
        port: u16,
        role: Role,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DiscoveryEvent>), DiscoveryError> {
        let socket = bind_broadcast_socket(port)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self { socket, port, role, clock: SystemClock, events: tx };
        Ok((service, rx))
    }

    /// Port actually bound (useful when constructed with port 0).
    pub fn local_port(&self) -> u16 {
        self.socket.local_addr().map(|a| a.port()).unwrap_or(self.port)
    }

    /// Run until the event receiver is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(BROADCAST_INTERVAL);
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.broadcast().await;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        if self.handle_datagram(&buf[..len], from).await.is_err() {
                            // Runtime went away; stop listening.
                            return;
                        }
                    }
                    Err(error) => {
                        tracing::debug!(%error, "discovery recv error");
                    }
                },
            }
        }
    }

    /// Send this role's periodic datagram to the broadcast address.
    async fn broadcast(&self) {
        if !has_broadcast_interface() {
            tracing::warn!(port = self.port, "discovery broadcast skipped: no broadcast interfaces");
            return;
        }

        let datagram = match &self.role {
            Role::Orchestrator { orchestrator_port } => Datagram::OrchDiscovery {
                timestamp: self.clock.epoch_secs(),
                orchestrator_port: *orchestrator_port,
            },
            Role::Destination { info } => Datagram::DestinationAnnounce {
                timestamp: self.clock.epoch_secs(),
                destination_info: info.clone(),
            },
        };
        self.send_to(&datagram, (Ipv4Addr::BROADCAST, self.port).into()).await;
    }

    async fn send_to(&self, datagram: &Datagram, target: SocketAddr) {
        let bytes = match encode_datagram(datagram) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(%error, "failed to encode discovery datagram");
                return;
            }
        };
        if let Err(error) = self.socket.send_to(&bytes, target).await {
            tracing::debug!(%error, %target, "discovery send failed");
        }
    }

    /// Dispatch one received datagram. `Err` means the runtime dropped the
    /// event receiver.
    async fn handle_datagram(&self, bytes: &[u8], from: SocketAddr) -> Result<(), ()> {
        match decode_datagram(bytes) {
            Some(Datagram::OrchDiscovery { orchestrator_port, .. }) => {
                self.events
                    .send(DiscoveryEvent::OrchestratorDiscovered {
                        address: from.ip(),
                        port: orchestrator_port,
                    })
                    .map_err(|_| ())?;

                if let Role::Destination { info } = &self.role {
                    let reply = Datagram::DestinationAnnounce {
                        timestamp: self.clock.epoch_secs(),
                        destination_info: info.clone(),
                    };
                    self.send_to(&reply, from).await;
                }
                Ok(())
            }
            Some(Datagram::DestinationAnnounce { destination_info, .. }) => {
                if matches!(self.role, Role::Orchestrator { .. }) {
                    let destination = destination_from_announce(
                        destination_info,
                        from.ip(),
                        self.clock.epoch_secs(),
                    );
                    self.events
                        .send(DiscoveryEvent::DestinationDiscovered(destination))
                        .map_err(|_| ())?;
                }
                Ok(())
            }
            // Foreign or malformed datagrams are dropped silently.
            Some(Datagram::Unknown) | None => Ok(()),
        }
    }
}

/// Normalize an announced record: the sender address is authoritative for
/// `ip_address`, liveness is stamped, and a missing id is derived.
pub(crate) fn destination_from_announce(
    mut info: Destination,
    sender: IpAddr,
    epoch_secs: i64,
) -> Destination {
    info.ip_address = sender.to_string();
    info.last_seen = epoch_secs;
    info.ensure_id();
    info
}

/// Whether any non-loopback IPv4 interface is present.
fn has_broadcast_interface() -> bool {
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces
            .iter()
            .any(|(_, ip)| matches!(ip, IpAddr::V4(v4) if !v4.is_loopback())),
        Err(error) => {
            tracing::debug!(%error, "interface enumeration failed");
            false
        }
    }
}

fn bind_broadcast_socket(port: u16) -> Result<UdpSocket, DiscoveryError> {
    let bind_error = |source| DiscoveryError::Bind { port, source };

    let socket =
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    socket.set_broadcast(true).map_err(bind_error)?;
    socket.set_nonblocking(true).map_err(bind_error)?;

    let address: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&address.into()).map_err(bind_error)?;

    UdpSocket::from_std(socket.into()).map_err(bind_error)
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
