// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration client: one control stream with auto-reconnect.
//!
//! On connect the agent registers itself, then serves health checks and
//! receives assignments/control messages until the stream drops. With
//! auto-reconnect enabled the last known address is retried on a timer
//! until an explicit disconnect.

use convoy_core::{
    derived_destination_id, DeploymentCompletion, DeploymentProgress, Destination,
    DestinationHealth,
};
use convoy_wire::{read_messages, write_message, ControlAction, Message};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Events surfaced to the agent loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected { addr: SocketAddr },
    /// Registration message went out; includes the effective id.
    Registered { destination_id: String },
    Disconnected,
    AssignmentReceived(convoy_core::DeploymentAssignment),
    AssignmentPaused { deployment_id: String, job_id: String },
    AssignmentResumed { deployment_id: String, job_id: String },
    AssignmentCanceled { deployment_id: String, job_id: String },
    Status(String),
}

/// Connection behavior knobs.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub auto_reconnect: bool,
    pub reconnect_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self { auto_reconnect: true, reconnect_interval: Duration::from_secs(5) }
    }
}

/// Handle for the caller: outbound reports, health refresh, disconnect.
#[derive(Clone)]
pub struct ClientHandle {
    outbound: mpsc::UnboundedSender<Message>,
    health: Arc<Mutex<DestinationHealth>>,
    shutdown: CancellationToken,
}

impl ClientHandle {
    pub fn send_progress(&self, progress: DeploymentProgress) {
        let _ = self.outbound.send(Message::ProgressUpdate { progress });
    }

    pub fn send_completion(&self, completion: DeploymentCompletion) {
        let _ = self.outbound.send(Message::DeploymentComplete { completion });
    }

    /// Refresh the snapshot served to health checks.
    pub fn set_health(&self, health: DestinationHealth) {
        *self.health.lock() = health;
    }

    /// Stop the connection loop; no further reconnects.
    pub fn disconnect(&self) {
        self.shutdown.cancel();
    }
}

/// Start the connection loop against `addr`.
pub fn connect(
    addr: SocketAddr,
    destination: Destination,
    options: ClientOptions,
) -> (ClientHandle, mpsc::UnboundedReceiver<ClientEvent>) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let health = Arc::new(Mutex::new(destination.health.clone()));
    let shutdown = CancellationToken::new();

    let handle = ClientHandle {
        outbound: out_tx,
        health: Arc::clone(&health),
        shutdown: shutdown.clone(),
    };

    tokio::spawn(connection_loop(
        addr,
        destination,
        options,
        health,
        out_rx,
        event_tx,
        shutdown,
    ));

    (handle, event_rx)
}

async fn connection_loop(
    addr: SocketAddr,
    mut destination: Destination,
    options: ClientOptions,
    health: Arc<Mutex<DestinationHealth>>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<ClientEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            _ = shutdown.cancelled() => return,
            connected = TcpStream::connect(addr) => connected,
        };

        match connected {
            Ok(stream) => {
                let _ = events.send(ClientEvent::Connected { addr });
                session(
                    stream,
                    &mut destination,
                    &health,
                    &mut outbound,
                    &events,
                    &shutdown,
                )
                .await;
                let _ = events.send(ClientEvent::Disconnected);
            }
            Err(error) => {
                let _ = events.send(ClientEvent::Status(format!(
                    "connect to {addr} failed: {error}"
                )));
            }
        }

        if !options.auto_reconnect || shutdown.is_cancelled() {
            return;
        }
        info!(%addr, interval = ?options.reconnect_interval, "reconnecting to orchestrator");
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(options.reconnect_interval.max(Duration::from_millis(100))) => {}
        }
    }
}

/// One connected session: register, then serve messages until close.
async fn session(
    mut stream: TcpStream,
    destination: &mut Destination,
    health: &Arc<Mutex<DestinationHealth>>,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    events: &mpsc::UnboundedSender<ClientEvent>,
    shutdown: &CancellationToken,
) {
    if destination.destination_id.is_empty() {
        let local_ip = stream
            .local_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_default();
        destination.destination_id = derived_destination_id(&destination.hostname, &local_ip);
    }
    destination.health = health.lock().clone();

    let register = Message::DestinationRegister { destination_info: destination.clone() };
    if let Err(error) = write_message(&mut stream, &register).await {
        warn!(%error, "failed to register with orchestrator");
        return;
    }
    let _ = events.send(ClientEvent::Registered {
        destination_id: destination.destination_id.clone(),
    });

    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; 8192];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            Some(message) = outbound.recv() => {
                if let Err(error) = write_message(&mut stream, &message).await {
                    debug!(%error, "write failed");
                    return;
                }
            }
            read = stream.read(&mut chunk) => match read {
                Ok(0) => return,
                Ok(n) => {
                    let messages = match read_messages(&mut buffer, &chunk[..n]) {
                        Ok(messages) => messages,
                        Err(error) => {
                            warn!(%error, "protocol error, closing stream");
                            return;
                        }
                    };
                    for message in messages {
                        if handle_message(message, destination, health, &mut stream, events)
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                Err(error) => {
                    debug!(%error, "read error");
                    return;
                }
            },
        }
    }
}

async fn handle_message(
    message: Message,
    destination: &Destination,
    health: &Arc<Mutex<DestinationHealth>>,
    stream: &mut TcpStream,
    events: &mpsc::UnboundedSender<ClientEvent>,
) -> Result<(), ()> {
    match message {
        Message::HealthCheckRequest { .. } => {
            let response = Message::HealthCheckResponse {
                destination_id: destination.destination_id.clone(),
                health_metrics: health.lock().clone(),
            };
            write_message(stream, &response).await.map_err(|error| {
                debug!(%error, "health response write failed");
            })
        }
        Message::DeploymentAssign { assignment, .. } => {
            events
                .send(ClientEvent::AssignmentReceived(assignment))
                .map_err(|_| ())
        }
        Message::AssignmentControl { deployment_id, job_id, action, .. } => {
            let event = match action {
                ControlAction::Pause => ClientEvent::AssignmentPaused { deployment_id, job_id },
                ControlAction::Resume => {
                    ClientEvent::AssignmentResumed { deployment_id, job_id }
                }
                ControlAction::Cancel => {
                    ClientEvent::AssignmentCanceled { deployment_id, job_id }
                }
            };
            events.send(event).map_err(|_| ())
        }
        // Destination-bound traffic only; everything else is ignored.
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
