//! WebSocket connection handler
//!
//! Each accepted socket gets a reader loop (this task) and a writer task.
//! The writer drains the client's bounded outbound queue, so broadcasts only
//! ever enqueue. A write that exceeds the timeout ends the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::socket_server::protocol::{
    decode_client_frame, ClientFrame, ErrorCode, Message, RequestFrame,
};
use crate::socket_server::registry::ClientRegistry;
use crate::socket_server::server::RequestHandler;

/// Shared state handed to every connection task
pub(crate) struct ConnectionContext {
    pub registry: Arc<ClientRegistry>,
    pub handler: Arc<dyn RequestHandler>,
    pub cancel: CancellationToken,
    pub buffer_size: usize,
    pub write_timeout: Duration,
    pub channels: Vec<String>,
}

/// Handle a single WebSocket connection until it closes or the server stops
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<ConnectionContext>,
) {
    // Accept WebSocket handshake
    let handshake = tokio::time::timeout(ctx.write_timeout, accept_async(stream));
    let ws = tokio::select! {
        _ = ctx.cancel.cancelled() => return,
        result = handshake => match result {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                tracing::warn!("WebSocket handshake with {} failed: {}", addr, e);
                return;
            }
            Err(_) => {
                tracing::warn!("WebSocket handshake with {} timed out", addr);
                return;
            }
        }
    };

    let (tx, rx) = mpsc::channel::<String>(ctx.buffer_size);
    let client_id = ctx.registry.register(tx.clone(), Some(addr));
    tracing::info!("Client {} connected from {}", client_id, addr);

    let channels: Vec<&str> = ctx.channels.iter().map(String::as_str).collect();
    let welcome = Message::connection(&client_id, &channels);
    if tx.try_send(welcome.to_json()).is_err() {
        tracing::warn!("Could not queue welcome frame for {}", client_id);
    }

    let (sink, mut incoming) = ws.split();
    let writer_done = CancellationToken::new();
    let writer = tokio::spawn(write_loop(
        sink,
        rx,
        ctx.write_timeout,
        client_id.clone(),
        ctx.cancel.clone(),
        writer_done.clone(),
    ));

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                tracing::debug!("Closing {} for server shutdown", client_id);
                break;
            }
            _ = writer_done.cancelled() => break,
            msg = incoming.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = handle_frame(&ctx, &client_id, &text).await;
                        if tx.send(reply.to_json()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        tracing::debug!("Client {} requested close", client_id);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error from {}: {}", client_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Removal happens here and only here, so it runs exactly once per client
    ctx.registry.remove(&client_id);
    drop(tx);
    if let Err(e) = writer.await {
        tracing::error!("Writer task for {} failed: {}", client_id, e);
    }
    tracing::info!("Client {} disconnected", client_id);
}

/// Decode one text frame and produce the reply
async fn handle_frame(ctx: &ConnectionContext, client_id: &str, text: &str) -> Message {
    match decode_client_frame(text) {
        Err(e) => {
            tracing::debug!("Rejected frame from {}: {}", client_id, e.message);
            e.into_message()
        }
        Ok(ClientFrame::Subscribe { channel }) => {
            ctx.registry.subscribe(client_id, &channel);
            tracing::debug!("Client {} subscribed to {}", client_id, channel);
            Message::subscribed(&channel)
        }
        Ok(ClientFrame::Unsubscribe { channel }) => {
            ctx.registry.unsubscribe(client_id, &channel);
            Message::unsubscribed(&channel)
        }
        Ok(ClientFrame::Ping) => Message::pong(),
        Ok(ClientFrame::Request(request)) => run_request(ctx, client_id, request).await,
    }
}

/// Run the request handler on the blocking pool; handlers may touch the disk
async fn run_request(ctx: &ConnectionContext, client_id: &str, request: RequestFrame) -> Message {
    let handler = Arc::clone(&ctx.handler);
    let owner = client_id.to_string();
    let request_type = request.request_type.clone();
    let id = request.id.clone();

    let joined =
        tokio::task::spawn_blocking(move || handler.handle_request(&owner, &request)).await;
    match joined {
        Ok(reply) => reply,
        Err(e) => {
            let reason = if e.is_panic() {
                let panic = e.into_panic();
                panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string())
            } else {
                e.to_string()
            };
            tracing::error!(
                "Request handler failed on {} from {}: {}",
                request_type,
                client_id,
                reason
            );
            Message::error(
                ErrorCode::RequestFailed,
                &format!("Request {} failed: {}", request_type, reason),
                id,
            )
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
    mut rx: mpsc::Receiver<String>,
    write_timeout: Duration,
    client_id: String,
    shutdown: CancellationToken,
    done: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        match tokio::time::timeout(write_timeout, sink.send(WsMessage::Text(frame))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!("Write to {} failed: {}", client_id, e);
                break;
            }
            Err(_) => {
                tracing::warn!(
                    "Write to {} timed out after {:?}, disconnecting",
                    client_id,
                    write_timeout
                );
                break;
            }
        }
    }
    done.cancel();
    rx.close();
    let _ = tokio::time::timeout(write_timeout, sink.close()).await;
}
