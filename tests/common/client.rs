//! Minimal dashboard protocol client

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub struct WsClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Id assigned in the welcome frame
    pub client_id: String,
    /// The welcome frame itself
    pub welcome: Value,
}

impl WsClient {
    /// Connect and consume the `connection` frame
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = connect_async(format!("ws://{}", addr))
            .await
            .expect("Failed to connect");
        let mut client = Self {
            ws,
            client_id: String::new(),
            welcome: Value::Null,
        };
        let welcome = client
            .recv(Duration::from_secs(5))
            .await
            .expect("No welcome frame");
        assert_eq!(welcome["type"], "connection", "Unexpected first frame: {}", welcome);
        client.client_id = welcome["data"]["clientId"]
            .as_str()
            .expect("Welcome frame without clientId")
            .to_string();
        client.welcome = welcome;
        client
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(WsMessage::Text(text.to_string()))
            .await
            .expect("Failed to send frame");
    }

    /// Next JSON frame, or `None` on timeout or close
    pub async fn recv(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match tokio::time::timeout(remaining, self.ws.next()).await {
                Ok(Some(Ok(WsMessage::Text(text)))) => {
                    return Some(serde_json::from_str(&text).expect("Server sent invalid JSON"));
                }
                Ok(Some(Ok(WsMessage::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => return None,
                Ok(Some(Ok(_))) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Skip frames until one of type `kind` arrives
    pub async fn recv_type(&mut self, kind: &str, timeout: Duration) -> Option<Value> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let frame = self.recv(remaining).await?;
            if frame["type"] == kind {
                return Some(frame);
            }
        }
    }

    /// Collect every frame that arrives within `window`
    pub async fn drain(&mut self, window: Duration) -> Vec<Value> {
        let deadline = Instant::now() + window;
        let mut frames = Vec::new();
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match self.recv(remaining).await {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        frames
    }

    pub async fn subscribe(&mut self, channel: &str) {
        self.send_json(json!({ "type": "subscribe", "data": { "channel": channel } }))
            .await;
        let ack = self
            .recv_type("subscribed", Duration::from_secs(5))
            .await
            .expect("No subscribed ack");
        assert_eq!(ack["data"]["channel"], channel);
    }

    /// Send a request and wait for the frame correlated to it
    pub async fn request(&mut self, id: &str, request_type: &str, params: Value) -> Value {
        self.send_json(json!({
            "id": id,
            "type": "request",
            "data": { "requestType": request_type, "params": params },
        }))
        .await;
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .expect("Timed out waiting for response");
            let frame = self.recv(remaining).await.expect("Connection closed");
            if frame["correlationId"] == id {
                return frame;
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
