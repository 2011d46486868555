//! TCP front end: accept connections, read newline-delimited JSON
//! requests, dispatch, write one JSON response line per request.
//!
//! Each connection gets its own task, so a session blocked on a physical
//! motion does not stall accepts or other sessions. Within one session
//! commands run strictly in arrival order.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::core::structs::{Request, Response};
use crate::net::dispatcher::CommandDispatcher;

static LOG_TARGET: &'static str = "command_server";

pub struct CommandServer {
    listener: TcpListener,
    dispatcher: Arc<CommandDispatcher>,
    shutdown: CancellationToken,
}

impl CommandServer {
    pub async fn bind(
        address: &str,
        dispatcher: Arc<CommandDispatcher>,
    ) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(address).await?;
        Ok(CommandServer {
            listener,
            dispatcher,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Clone of the shutdown token; cancelling it stops the accept loop
    /// promptly. In-flight sessions finish their current command.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept loop. Returns after the shutdown token is cancelled.
    pub async fn run(self) -> Result<(), std::io::Error> {
        log::info!(target: LOG_TARGET, "Command server started on {}", self.local_addr()?);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    log::info!(target: LOG_TARGET, "Command server stopped.");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            log::info!(target: LOG_TARGET, "Client connected from {}", peer);
                            let dispatcher = self.dispatcher.clone();
                            tokio::spawn(async move {
                                session_loop(stream, peer, dispatcher).await;
                            });
                        }
                        Err(e) => {
                            log::error!(target: LOG_TARGET, "Accept failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// One session: read a line, decode, dispatch, answer. A decode failure
/// is answered with an error response and the connection stays open; the
/// peer closing its end (or a framing error) ends the session.
async fn session_loop(stream: TcpStream, peer: SocketAddr, dispatcher: Arc<CommandDispatcher>) {
    let mut lines = Framed::new(stream, LinesCodec::new());

    while let Some(next) = lines.next().await {
        let line = match next {
            Ok(line) => line,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Read error from {}: {}", peer, e);
                break;
            }
        };

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                log::info!(target: LOG_TARGET, "Received command from {}: '{}'",
                    peer, request.command);
                dispatcher.dispatch(&request).await
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Bad request from {}: {}", peer, e);
                Response::error(&format!("Invalid JSON: {e}"))
            }
        };

        if let Err(e) = lines.send(response.to_json()).await {
            log::warn!(target: LOG_TARGET, "Write to {} failed: {}", peer, e);
            break;
        }
    }

    log::info!(target: LOG_TARGET, "Client disconnected: {}", peer);
}
