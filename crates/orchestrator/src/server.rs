// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration server: accepts destination control streams.
//!
//! Each connection gets its own read task and writer task. Registered
//! destinations are tracked in a shared table keyed by destination id;
//! outbound sends look the stream up there and drop silently when the
//! destination is gone. Stream close removes the registration before the
//! stale-prune timer would.

use convoy_core::{DeploymentAssignment, Destination};
use convoy_wire::{read_messages, ControlAction, Message, ProtocolError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::ServerLink;

/// Errors from server startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Events raised toward the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    DestinationRegistered(Destination),
    HealthUpdated { destination_id: String, health: convoy_core::DestinationHealth },
    Progress(convoy_core::DeploymentProgress),
    Completed(convoy_core::DeploymentCompletion),
    /// A registered destination's stream closed.
    Disconnected { destination_id: String },
    Status(String),
}

#[derive(Default)]
struct Connections {
    by_destination: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
}

/// Outbound handle: cheap to clone, safe to hold anywhere.
#[derive(Clone)]
pub struct ServerSender {
    connections: Arc<Connections>,
}

impl ServerSender {
    fn send(&self, destination_id: &str, message: Message) {
        let table = self.connections.by_destination.lock();
        let Some(sender) = table.get(destination_id) else {
            debug!(destination_id, "dropping message for unconnected destination");
            return;
        };
        if sender.send(message).is_err() {
            debug!(destination_id, "dropping message for closing destination stream");
        }
    }
}

impl ServerLink for ServerSender {
    fn send_health_check(&self, destination_id: &str) {
        self.send(
            destination_id,
            Message::HealthCheckRequest { destination_id: destination_id.to_string() },
        );
    }

    fn send_deployment_assign(&self, destination_id: &str, assignment: &DeploymentAssignment) {
        self.send(
            destination_id,
            Message::DeploymentAssign {
                destination_id: destination_id.to_string(),
                assignment: assignment.clone(),
            },
        );
    }

    fn send_assignment_control(
        &self,
        destination_id: &str,
        deployment_id: &str,
        job_id: &str,
        action: ControlAction,
    ) {
        self.send(
            destination_id,
            Message::AssignmentControl {
                destination_id: destination_id.to_string(),
                deployment_id: deployment_id.to_string(),
                job_id: job_id.to_string(),
                action,
            },
        );
    }
}

/// Accept loop plus per-connection stream handling.
pub struct OrchestrationServer {
    listener: TcpListener,
    connections: Arc<Connections>,
    events: mpsc::UnboundedSender<ServerEvent>,
    shutdown: CancellationToken,
}

impl OrchestrationServer {
    /// Bind the control port (`0.0.0.0`).
    pub async fn bind(
        port: u16,
    ) -> Result<(Self, ServerSender, mpsc::UnboundedReceiver<ServerEvent>), ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;

        let connections = Arc::new(Connections::default());
        let (events, event_rx) = mpsc::unbounded_channel();
        let server = Self {
            listener,
            connections: Arc::clone(&connections),
            events,
            shutdown: CancellationToken::new(),
        };
        let sender = ServerSender { connections };
        Ok((server, sender, event_rx))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Token that stops the accept loop and every connection task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the accept loop until shutdown, spawning a task per connection.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "orchestration server listening");
        }
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "destination connected");
                        let connections = Arc::clone(&self.connections);
                        let events = self.events.clone();
                        let shutdown = self.shutdown.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, connections, events, shutdown).await;
                        });
                    }
                    Err(error) => warn!(%error, "accept error"),
                },
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    connections: Arc<Connections>,
    events: mpsc::UnboundedSender<ServerEvent>,
    shutdown: CancellationToken,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if let Err(error) = convoy_wire::write_message(&mut write_half, &message).await {
                debug!(%error, "write failed, closing stream");
                break;
            }
        }
    });

    let mut registered_id: Option<String> = None;
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; 8192];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            read = read_half.read(&mut chunk) => match read {
                Ok(0) => break,
                Ok(n) => match read_messages(&mut buffer, &chunk[..n]) {
                    Ok(messages) => {
                        for message in messages {
                            handle_message(
                                message,
                                peer,
                                &out_tx,
                                &connections,
                                &events,
                                &mut registered_id,
                            );
                        }
                    }
                    Err(ProtocolError::FrameTooLarge(len)) => {
                        warn!(%peer, len, "oversize frame, closing stream");
                        break;
                    }
                    Err(error) => {
                        warn!(%peer, %error, "protocol error, closing stream");
                        break;
                    }
                },
                Err(error) => {
                    debug!(%peer, %error, "read error, closing stream");
                    break;
                }
            },
        }
    }

    writer.abort();

    if let Some(destination_id) = registered_id {
        let mut table = connections.by_destination.lock();
        // A reconnect may have replaced this entry already.
        if table.get(&destination_id).map(|s| s.same_channel(&out_tx)).unwrap_or(false) {
            table.remove(&destination_id);
        }
        drop(table);
        let _ = events.send(ServerEvent::Disconnected { destination_id: destination_id.clone() });
        let _ = events
            .send(ServerEvent::Status(format!("Destination disconnected: {destination_id}")));
    }
}

fn handle_message(
    message: Message,
    peer: SocketAddr,
    out_tx: &mpsc::UnboundedSender<Message>,
    connections: &Connections,
    events: &mpsc::UnboundedSender<ServerEvent>,
    registered_id: &mut Option<String>,
) {
    match message {
        Message::DestinationRegister { mut destination_info } => {
            // The peer address is authoritative for the record's ip.
            destination_info.ip_address = peer.ip().to_string();
            destination_info.ensure_id();

            let destination_id = destination_info.destination_id.clone();
            connections
                .by_destination
                .lock()
                .insert(destination_id.clone(), out_tx.clone());
            *registered_id = Some(destination_id);

            let hostname = destination_info.hostname.clone();
            let _ = events.send(ServerEvent::DestinationRegistered(destination_info));
            let _ = events.send(ServerEvent::Status(format!("Destination registered: {hostname}")));
        }

        Message::HealthCheckResponse { destination_id, health_metrics } => {
            let resolved = if destination_id.is_empty() {
                registered_id.clone().unwrap_or_default()
            } else {
                destination_id
            };
            if !resolved.is_empty() {
                let _ = events.send(ServerEvent::HealthUpdated {
                    destination_id: resolved,
                    health: health_metrics,
                });
            }
        }

        Message::ProgressUpdate { mut progress } => {
            if progress.destination_id.is_empty() {
                if let Some(id) = registered_id {
                    progress.destination_id = id.clone();
                }
            }
            let _ = events.send(ServerEvent::Progress(progress));
        }

        Message::DeploymentComplete { mut completion } => {
            if completion.destination_id.is_empty() {
                if let Some(id) = registered_id {
                    completion.destination_id = id.clone();
                }
            }
            let _ = events.send(ServerEvent::Completed(completion));
        }

        Message::Error { message } => {
            let _ = events.send(ServerEvent::Status(format!("Peer error from {peer}: {message}")));
        }

        // Heartbeats keep the stream warm; orchestrator-bound messages
        // echoed back and unknown types are ignored.
        Message::Heartbeat
        | Message::HealthCheckRequest { .. }
        | Message::DeploymentAssign { .. }
        | Message::AssignmentControl { .. }
        | Message::Unknown => {}
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
