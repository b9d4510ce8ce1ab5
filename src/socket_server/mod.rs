//! opswatch Socket Server
//!
//! Multi-client WebSocket server with channel subscriptions and a
//! request/response side channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SOCKET SERVER                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  TcpListener ──► accept loop ──► connection task per client            │
//! │                                    - reader: decode frames, reply       │
//! │                                    - writer: drain bounded queue        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                ClientRegistry (RwLock<HashMap>)                  │   │
//! │  │  client-1 ──► { queue tx, subscriptions, connectedAt }           │   │
//! │  │  client-2 ──► { ... }                                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! All messages are JSON envelopes over WebSocket text frames:
//!
//! ```json
//! // Client -> Server
//! {"id": "1", "type": "subscribe", "data": {"channel": "logs"}}
//! {"id": "2", "type": "ping"}
//! {"id": "3", "type": "request", "data": {"requestType": "getStats", "params": {}}}
//!
//! // Server -> Client
//! {"id": "...", "type": "connection", "timestamp": 1760000000000, "data": {"clientId": "client-1", ...}}
//! {"id": "...", "type": "subscribed", "timestamp": ..., "data": {"channel": "logs"}}
//! {"id": "...", "type": "response", "timestamp": ..., "correlationId": "3", "data": {"success": true, ...}}
//! ```

mod connection;
pub mod protocol;
pub mod registry;
pub mod server;

pub use protocol::{
    decode_client_frame, ClientFrame, DecodeError, ErrorCode, Message, MessageType, Priority,
    RequestFrame,
};
pub use registry::{ClientId, ClientInfo, ClientRegistry, FanOut};
pub use server::{RequestHandler, SocketServer, SocketServerConfig};
