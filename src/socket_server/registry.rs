//! Client registry
//!
//! Tracks every live connection, its channel subscriptions, and the bounded
//! outbound queue its writer task drains. Sending never waits on a socket:
//! frames are pushed onto the client's queue with `try_send`, so one slow
//! client cannot hold up delivery to the rest.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

/// Unique client identifier (`client-<n>`)
pub type ClientId = String;

/// Registry entry for one connection
struct ClientEntry {
    tx: mpsc::Sender<String>,
    subscriptions: BTreeSet<String>,
    connected_at: DateTime<Utc>,
    address: Option<SocketAddr>,
}

/// Public view of a connected client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: ClientId,
    pub subscriptions: Vec<String>,
    pub connected_at: String,
    pub address: Option<String>,
}

/// Result of a fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Clients the frame was queued for
    pub sent: usize,
    /// Clients considered (after channel filtering)
    pub targeted: usize,
    /// Clients in the registry at send time
    pub total: usize,
}

/// Registry of live clients
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientEntry>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a process-unique id and insert the client
    pub fn register(&self, tx: mpsc::Sender<String>, address: Option<SocketAddr>) -> ClientId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("client-{}", n);
        self.clients.write().insert(
            id.clone(),
            ClientEntry {
                tx,
                subscriptions: BTreeSet::new(),
                connected_at: Utc::now(),
                address,
            },
        );
        id
    }

    /// Remove a client. Returns false if it was already gone.
    pub fn remove(&self, id: &str) -> bool {
        self.clients.write().remove(id).is_some()
    }

    /// Drop every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut clients = self.clients.write();
        let n = clients.len();
        clients.clear();
        n
    }

    pub fn subscribe(&self, id: &str, channel: &str) -> bool {
        match self.clients.write().get_mut(id) {
            Some(entry) => {
                entry.subscriptions.insert(channel.to_string());
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, id: &str, channel: &str) -> bool {
        match self.clients.write().get_mut(id) {
            Some(entry) => entry.subscriptions.remove(channel),
            None => false,
        }
    }

    pub fn is_subscribed(&self, id: &str, channel: &str) -> bool {
        self.clients
            .read()
            .get(id)
            .map(|e| e.subscriptions.contains(channel))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.read().contains_key(id)
    }

    /// Queue a frame for one client
    pub fn send_to(&self, id: &str, frame: &str) -> bool {
        match self.clients.read().get(id) {
            Some(entry) => Self::push(id, entry, frame),
            None => false,
        }
    }

    /// Queue a frame for every client, or only those subscribed to `channel`
    pub fn broadcast(&self, frame: &str, channel: Option<&str>) -> FanOut {
        let clients = self.clients.read();
        let mut out = FanOut {
            total: clients.len(),
            ..Default::default()
        };
        for (id, entry) in clients.iter() {
            if let Some(channel) = channel {
                if !entry.subscriptions.contains(channel) {
                    continue;
                }
            }
            out.targeted += 1;
            if Self::push(id, entry, frame) {
                out.sent += 1;
            }
        }
        out
    }

    /// Queue a frame for the named clients, ignoring subscriptions
    pub fn send_to_many(&self, ids: &[ClientId], frame: &str) -> FanOut {
        let clients = self.clients.read();
        let mut out = FanOut {
            total: clients.len(),
            targeted: ids.len(),
            ..Default::default()
        };
        for id in ids {
            if let Some(entry) = clients.get(id) {
                if Self::push(id, entry, frame) {
                    out.sent += 1;
                }
            }
        }
        out
    }

    fn push(id: &str, entry: &ClientEntry, frame: &str) -> bool {
        match entry.tx.try_send(frame.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Outbound buffer full for {}, dropping frame", id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Client {} is closing, frame not queued", id);
                false
            }
        }
    }

    /// Snapshot of connected clients, ordered by id
    pub fn clients(&self) -> Vec<ClientInfo> {
        let mut infos: Vec<ClientInfo> = self
            .clients
            .read()
            .iter()
            .map(|(id, entry)| ClientInfo {
                id: id.clone(),
                subscriptions: entry.subscriptions.iter().cloned().collect(),
                connected_at: entry.connected_at.to_rfc3339(),
                address: entry.address.map(|a| a.to_string()),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }
}
