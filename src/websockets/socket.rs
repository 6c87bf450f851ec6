use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::event::TrackEvent;

/// Simple WebSocket abstraction - all we care about is send/receive
#[async_trait]
pub trait SocketWrapper: Send {
    /// Send a text message to the client
    async fn send_message(&mut self, message: String) -> Result<(), SocketError>;

    /// Receive the next message from the client (None if connection closed)
    async fn receive_message(&mut self) -> Result<Option<String>, SocketError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), SocketError>;
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Failed to send message: {0}")]
    SendFailed(String),

    #[error("Failed to receive message: {0}")]
    ReceiveFailed(String),

    #[error("Failed to encode event: {0}")]
    Encode(String),
}

/// Direct implementation on axum's WebSocket
#[async_trait]
impl SocketWrapper for WebSocket {
    async fn send_message(&mut self, message: String) -> Result<(), SocketError> {
        self.send(Message::Text(message))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive_message(&mut self) -> Result<Option<String>, SocketError> {
        loop {
            match self.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // Ignore binary/ping/pong
                Some(Err(e)) => return Err(SocketError::ReceiveFailed(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.send(Message::Close(None))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }
}

/// One subscriber following a track's events
///
/// The feed is read-only: anything the client sends is logged and dropped.
pub struct Connection {
    pub track_id: i64,
    socket: Box<dyn SocketWrapper>,
    events: broadcast::Receiver<TrackEvent>,
}

impl Connection {
    pub fn new(
        track_id: i64,
        socket: Box<dyn SocketWrapper>,
        events: broadcast::Receiver<TrackEvent>,
    ) -> Self {
        Self {
            track_id,
            socket,
            events,
        }
    }

    /// Forwards events until the client leaves or the track is closed
    pub async fn run(mut self) -> Result<(), SocketError> {
        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Ok(event) => {
                            let message = serde_json::to_string(&event)
                                .map_err(|e| SocketError::Encode(e.to_string()))?;
                            self.socket.send_message(message).await?;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(track_id = self.track_id, skipped, "Subscriber lagged, events dropped");
                        }
                        Err(RecvError::Closed) => break, // Track closed
                    }
                }

                msg = self.socket.receive_message() => {
                    match msg {
                        Ok(Some(message)) => {
                            debug!(track_id = self.track_id, message = %message, "Ignoring client message");
                        }
                        Ok(None) => break, // Client disconnected
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        // Clean disconnect
        let _ = self.socket.close().await;
        Ok(())
    }
}
