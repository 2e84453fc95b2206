/**
 * HUB WEBSOCKET - Fan-out du live view vers les navigateurs
 *
 * FONCTIONNEMENT :
 * - Un `broadcast::Sender<String>` partagé ; chaque session websocket est un receiver
 * - Nombre de viewers = nombre de receivers vivants
 * - Une session s'arrête quand le client ferme ou quand l'envoi échoue
 */

use crate::transport::{LiveSink, TransportError};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Clone)]
pub struct LiveHub {
    tx: broadcast::Sender<String>,
    next_session: Arc<AtomicU64>,
}

impl LiveHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, next_session: Arc::new(AtomicU64::new(1)) }
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl LiveSink for LiveHub {
    fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn broadcast(&self, payload: String) -> Result<(), TransportError> {
        self.tx.send(payload).map(|_| ()).map_err(|_| TransportError::Closed)
    }
}

/// Accepte l'upgrade et rattache la session au hub
pub fn upgrade(ws: WebSocketUpgrade, hub: LiveHub) -> Response {
    ws.on_upgrade(move |socket| session(socket, hub))
}

async fn session(mut socket: WebSocket, hub: LiveHub) {
    let id = hub.next_session.fetch_add(1, Ordering::Relaxed);
    let mut frames = hub.subscribe();
    info!("[live] websocket [{}] connect ({} viewers)", id, hub.viewer_count());

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let text = match frame {
                    Ok(text) => text,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("[live] websocket [{}] lagged, {} frames dropped", id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // le live view est en lecture seule
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    drop(frames);
    info!("[live] websocket [{}] disconnect ({} viewers)", id, hub.viewer_count());
}
