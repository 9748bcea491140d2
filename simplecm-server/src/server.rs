//! Service task and TCP listener.
//!
//! One task owns the [`Service`]. Client sessions send it parsed commands
//! over an mpsc channel and get their reply line back on a oneshot. After
//! every command the task drains the connection's events and fans them
//! out to all sessions on a broadcast channel.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use simplecm::Service;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{Seed, ServerConfig, Settings};
use crate::control::{self, Command};
use crate::session;

/// Queued commands before senders wait.
const REQUEST_QUEUE: usize = 256;
/// Events buffered per session before it starts lagging.
const EVENT_BUFFER: usize = 1024;

/// A command from a session and where to put its reply.
#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub reply: oneshot::Sender<String>,
}

/// What a session needs to talk to the service task.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    pub requests: mpsc::Sender<Request>,
    pub events: broadcast::Sender<String>,
}

impl ServiceHandle {
    /// Run `command` and wait for its reply line.
    pub async fn call(&self, command: Command) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .context("service task is gone")?;
        rx.await.context("service task dropped the request")
    }
}

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Build and start the service from the merged settings.
    fn build_service(&self) -> Result<(Service, Seed)> {
        let Settings {
            manager_name,
            protocol_name,
            self_id,
            auto_connect,
            seed,
        } = self.config.settings()?;

        let mut service = Service::new();
        service.set_manager_name(&manager_name);
        service.set_protocol_name(&protocol_name);
        service.set_self_contact_identifier(&self_id);
        service
            .start()
            .map_err(|e| anyhow::anyhow!("Failed to start service: {e}"))?;

        if auto_connect {
            let reply = control::execute(&mut service, &seed, Command::Connect);
            tracing::info!("Auto-connect: {reply}");
            let dropped = service.drain_events().len();
            tracing::debug!(dropped, "Startup events not delivered");
        }
        Ok((service, seed))
    }

    /// Spawn the service task and return its handle.
    fn spawn_service(&self) -> Result<ServiceHandle> {
        let (service, seed) = self.build_service()?;
        let (requests, rx) = mpsc::channel(REQUEST_QUEUE);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        tokio::spawn(service_loop(service, seed, rx, events.clone()));
        Ok(ServiceHandle { requests, events })
    }

    /// Run the server, blocking forever.
    pub async fn run(self) -> Result<()> {
        let (_addr, handle) = self.start().await?;
        handle.await?
    }

    /// Start the server and return the bound address + task handle (for testing).
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {addr}");

        let service = self.spawn_service()?;

        let handle = tokio::spawn(async move {
            loop {
                let (stream, _addr) = listener.accept().await?;
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(e) = session::handle(stream, service).await {
                        tracing::error!("Session error: {e}");
                    }
                });
            }
        });

        Ok((addr, handle))
    }
}

async fn service_loop(
    mut service: Service,
    seed: Seed,
    mut requests: mpsc::Receiver<Request>,
    events: broadcast::Sender<String>,
) {
    while let Some(Request { command, reply }) = requests.recv().await {
        let line = control::execute(&mut service, &seed, command);
        if reply.send(line).is_err() {
            tracing::debug!("Session left before its reply");
        }
        for envelope in service.drain_events() {
            match serde_json::to_string(&envelope) {
                // No subscribers is fine: nobody is listening.
                Ok(line) => {
                    let _ = events.send(line);
                }
                Err(e) => tracing::warn!(seq = envelope.seq, "Failed to serialize event: {e}"),
            }
        }
    }
    tracing::info!("Service task stopped");
}
