//! Dashboard server: the orchestrator
//!
//! Owns one [`WatchManager`] and one [`SocketServer`]. Domain events from the
//! watcher are translated into protocol messages and broadcast on the
//! matching channel through a fixed-window rate limiter. HIGH priority
//! messages bypass the limiter; everything else is sent, queued, or dropped.
//!
//! # Locking Order
//!
//! 1. `Core::lifecycle` (async mutex, start/stop only)
//! 2. `Core::limiter`
//! 3. `Core::stats`
//!
//! Never take `limiter` while holding `stats`. Readers that need both
//! snapshot them in separate statements.
//!
//! Fan-out only enqueues onto per-client buffers, so holding the limiter
//! lock across a send never waits on a socket. Holding it is what keeps
//! broadcast order identical to call order.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DashboardConfig;
use crate::error::Result;
use crate::socket_server::protocol::now_millis;
use crate::socket_server::{
    ClientId, ClientInfo, ErrorCode, Message, Priority, RequestFrame, RequestHandler,
    SocketServer, SocketServerConfig,
};
use crate::watch::{DomainEvent, EventFilter, EventPayload, HandlerId, WatchManager, WatchStats};

use super::rate_limiter::{RateLimiter, RateLimiterSnapshot};
use super::stats::BroadcastStats;

pub const CONFIG_CHANNEL: &str = "config";
pub const LOGS_CHANNEL: &str = "logs";
pub const CUSTOM_CHANNEL: &str = "custom";
pub const STATUS_CHANNEL: &str = "status";

/// Channels the dashboard publishes on
pub const CHANNELS: [&str; 4] = [CONFIG_CHANNEL, LOGS_CHANNEL, CUSTOM_CHANNEL, STATUS_CHANNEL];

/// Outcome of a channel broadcast
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastResult {
    /// Fanned out immediately
    Sent {
        sent_count: usize,
        total_clients: usize,
        broadcast_time: Duration,
    },
    /// Waiting for window capacity
    Queued { queue_len: usize },
}

impl BroadcastResult {
    pub fn is_queued(&self) -> bool {
        matches!(self, BroadcastResult::Queued { .. })
    }

    pub fn sent_count(&self) -> usize {
        match self {
            BroadcastResult::Sent { sent_count, .. } => *sent_count,
            BroadcastResult::Queued { .. } => 0,
        }
    }
}

/// Outcome of [`DashboardServer::broadcast_to_clients`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetedResult {
    pub target_clients: usize,
    pub sent_count: usize,
}

/// Aggregated statistics returned by `getStats`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub is_active: bool,
    pub connected_clients: usize,
    pub address: Option<String>,
    pub started_at: Option<i64>,
    pub uptime_ms: u64,
    pub broadcasts: BroadcastStats,
    pub rate_limiter: RateLimiterSnapshot,
    pub watcher: WatchStats,
}

#[derive(Default)]
struct Lifecycle {
    listener: Option<HandlerId>,
    drain: Option<(CancellationToken, JoinHandle<()>)>,
}

/// Shared state behind [`DashboardServer`]
pub(crate) struct Core {
    pub(crate) config: DashboardConfig,
    pub(crate) watcher: WatchManager,
    pub(crate) socket: SocketServer,
    limiter: Mutex<RateLimiter>,
    stats: Mutex<BroadcastStats>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    started: Mutex<Option<(Instant, i64)>>,
    active: AtomicBool,
}

/// Real-time dashboard backend
pub struct DashboardServer {
    core: Arc<Core>,
}

impl DashboardServer {
    /// Build a server from a validated configuration
    pub fn new(config: DashboardConfig) -> Result<Self> {
        config.validate()?;
        let watcher = WatchManager::new(&config.watch);
        let mut socket_config = SocketServerConfig::from(&config);
        socket_config.channels = CHANNELS.iter().map(|c| c.to_string()).collect();
        let socket = SocketServer::new(socket_config);
        let limiter = RateLimiter::new(&config.rate_limit, Instant::now());

        Ok(Self {
            core: Arc::new(Core {
                config,
                watcher,
                socket,
                limiter: Mutex::new(limiter),
                stats: Mutex::new(BroadcastStats::default()),
                lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
                started: Mutex::new(None),
                active: AtomicBool::new(false),
            }),
        })
    }

    /// Start watching, then start accepting clients.
    ///
    /// The event listener is wired before the socket binds, so no client can
    /// connect ahead of it. A bind failure rolls the watcher back and is
    /// returned to the caller.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut lifecycle = self.core.lifecycle.lock().await;
        if self.core.active.load(Ordering::SeqCst) {
            if let Some(addr) = self.core.socket.local_addr() {
                return Ok(addr);
            }
        }

        let weak: Weak<Core> = Arc::downgrade(&self.core);
        let listener = self.core.watcher.on(EventFilter::All, move |event| {
            if let Some(core) = weak.upgrade() {
                core.forward_event(event);
            }
        });
        self.core.watcher.start();

        let handler: Arc<dyn RequestHandler> = self.core.clone();
        let addr = match self.core.socket.start(handler).await {
            Ok(addr) => addr,
            Err(e) => {
                self.core.watcher.stop();
                self.core.watcher.off(listener);
                tracing::error!("Dashboard failed to start: {}", e);
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let drain = tokio::spawn(drain_loop(Arc::downgrade(&self.core), cancel.clone()));

        let started = (Instant::now(), now_millis());
        lifecycle.listener = Some(listener);
        lifecycle.drain = Some((cancel, drain));
        *self.core.started.lock() = Some(started);
        self.core.active.store(true, Ordering::SeqCst);

        tracing::info!("Dashboard server started on ws://{}", addr);
        Ok(addr)
    }

    /// Stop the drain timer, the socket server, then the watcher.
    ///
    /// Once this returns no further events are dispatched and no further
    /// messages are sent. Messages still queued are discarded.
    pub async fn stop(&self) {
        let mut lifecycle = self.core.lifecycle.lock().await;
        if !self.core.active.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some((cancel, drain)) = lifecycle.drain.take() {
            cancel.cancel();
            if let Err(e) = drain.await {
                tracing::error!("Queue drain task failed: {}", e);
            }
        }
        self.core.socket.stop().await;
        self.core.watcher.stop();
        if let Some(listener) = lifecycle.listener.take() {
            self.core.watcher.off(listener);
        }
        *self.core.started.lock() = None;

        let discarded = self.core.limiter.lock().clear();
        if discarded > 0 {
            self.core.stats.lock().dropped_broadcasts += discarded as u64;
            tracing::warn!("Discarded {} queued broadcast(s) on shutdown", discarded);
        }
        tracing::info!("Dashboard server stopped");
    }

    pub fn is_active(&self) -> bool {
        self.core.active.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.core.socket.local_addr()
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.core.config
    }

    pub fn watch_manager(&self) -> &WatchManager {
        &self.core.watcher
    }

    pub fn socket_server(&self) -> &SocketServer {
        &self.core.socket
    }

    /// Broadcast through the rate limiter on `channel` (`None` = every client)
    pub fn broadcast(&self, message: Message, channel: Option<&str>) -> BroadcastResult {
        self.core.broadcast(message, channel)
    }

    /// Broadcast at the given priority; HIGH always sends immediately
    pub fn broadcast_with_priority(
        &self,
        message: Message,
        priority: Priority,
        channel: Option<&str>,
    ) -> BroadcastResult {
        self.core.broadcast(message.with_priority(priority), channel)
    }

    /// Send to the named clients only, ignoring subscriptions and the limiter
    pub fn broadcast_to_clients(&self, client_ids: &[ClientId], message: &Message) -> TargetedResult {
        self.core.broadcast_to_clients(client_ids, message)
    }

    /// Publish a `status-update` on the `status` channel
    pub fn broadcast_status(&self, status: &str, details: Value) -> BroadcastResult {
        self.broadcast(Message::status_update(status, details), Some(STATUS_CHANNEL))
    }

    /// Publish an `error` envelope to every client, bypassing the limiter
    pub fn broadcast_error(&self, code: ErrorCode, message: &str) -> BroadcastResult {
        self.broadcast(Message::error(code, message, None), None)
    }

    pub fn add_custom_watch(&self, name: &str, path: impl Into<std::path::PathBuf>) -> Result<()> {
        self.core.watcher.add_custom_watch(name, path)
    }

    pub fn remove_custom_watch(&self, name: &str) -> Result<()> {
        self.core.watcher.remove_custom_watch(name)
    }

    pub fn connected_clients(&self) -> Vec<ClientInfo> {
        self.core.socket.clients()
    }

    pub fn get_stats(&self) -> DashboardStats {
        self.core.stats()
    }

    pub fn reset_stats(&self) {
        self.core.reset_stats();
    }

    /// Answer a request as if it came from `client_id`
    pub fn handle_request(&self, client_id: &str, request: &RequestFrame) -> Message {
        self.core.handle_request(client_id, request)
    }
}

impl Core {
    /// Translate a domain event and broadcast it on its channel
    fn forward_event(&self, event: &DomainEvent) {
        let (message, channel) = message_for_event(event);
        let result = self.broadcast(message, Some(channel));
        tracing::debug!(
            "Forwarded {} on '{}' (queued: {})",
            event.type_name(),
            channel,
            result.is_queued()
        );
    }

    fn broadcast(&self, message: Message, channel: Option<&str>) -> BroadcastResult {
        if message.is_high_priority() {
            return self.send_now(&message, channel, true);
        }

        let now = Instant::now();
        let mut limiter = self.limiter.lock();
        self.flush_ready(&mut limiter, now);
        if limiter.try_acquire(now) {
            return self.send_now(&message, channel, false);
        }

        let kind = message.kind.clone();
        let enqueued = limiter.enqueue(message, channel.map(str::to_string), now);
        drop(limiter);

        let mut stats = self.stats.lock();
        stats.queued_broadcasts += 1;
        if let Some(dropped) = enqueued.dropped {
            stats.dropped_broadcasts += 1;
            tracing::warn!(
                "Broadcast queue full, dropped oldest {} message",
                dropped.message.kind
            );
        }
        tracing::debug!("Rate limit reached, queued {} ({} waiting)", kind, enqueued.queue_len);
        BroadcastResult::Queued {
            queue_len: enqueued.queue_len,
        }
    }

    /// Send whatever the current window allows from the queue
    fn flush_ready(&self, limiter: &mut RateLimiter, now: Instant) -> usize {
        let ready = limiter.drain_ready(now);
        let n = ready.len();
        if n == 0 {
            return 0;
        }
        self.stats.lock().drained_broadcasts += n as u64;
        for entry in ready {
            self.send_now(&entry.message, entry.channel.as_deref(), false);
        }
        tracing::debug!("Drained {} queued broadcast(s)", n);
        n
    }

    fn drain_queue(&self) -> usize {
        let mut limiter = self.limiter.lock();
        self.flush_ready(&mut limiter, Instant::now())
    }

    /// Next moment the limiter opens a new window
    fn next_window_at(&self) -> Instant {
        let limiter = self.limiter.lock();
        limiter.window_start() + limiter.window()
    }

    fn send_now(&self, message: &Message, channel: Option<&str>, priority: bool) -> BroadcastResult {
        let started = Instant::now();
        let out = self.socket.broadcast(message, channel);
        let broadcast_time = started.elapsed();

        let mut stats = self.stats.lock();
        stats.record_sent(out.sent, now_millis());
        if priority {
            stats.priority_broadcasts += 1;
        }
        BroadcastResult::Sent {
            sent_count: out.sent,
            total_clients: out.total,
            broadcast_time,
        }
    }

    fn broadcast_to_clients(&self, client_ids: &[ClientId], message: &Message) -> TargetedResult {
        let out = self.socket.send_to_many(client_ids, message);
        let mut stats = self.stats.lock();
        stats.targeted_broadcasts += 1;
        stats.target_clients += client_ids.len() as u64;
        stats.targeted_sent += out.sent as u64;
        stats.last_broadcast = Some(now_millis());
        TargetedResult {
            target_clients: client_ids.len(),
            sent_count: out.sent,
        }
    }

    pub(crate) fn stats(&self) -> DashboardStats {
        let started = *self.started.lock();
        // Each guard drops at the end of its statement
        let broadcasts = self.stats.lock().clone();
        let rate_limiter = self.limiter.lock().snapshot(Instant::now());
        DashboardStats {
            is_active: self.active.load(Ordering::SeqCst),
            connected_clients: self.socket.client_count(),
            address: self.socket.local_addr().map(|a| a.to_string()),
            started_at: started.map(|(_, at)| at),
            uptime_ms: started
                .map(|(instant, _)| instant.elapsed().as_millis() as u64)
                .unwrap_or(0),
            broadcasts,
            rate_limiter,
            watcher: self.watcher.stats(),
        }
    }

    pub(crate) fn reset_stats(&self) {
        *self.stats.lock() = BroadcastStats::default();
        self.limiter.lock().reset_counters();
        self.watcher.reset_stats();
        tracing::info!("Statistics reset");
    }
}

/// Build the protocol message and channel for a domain event
pub fn message_for_event(event: &DomainEvent) -> (Message, &'static str) {
    let data = event.data();
    match &event.payload {
        EventPayload::ConfigChange { .. } => (Message::config_change(data), CONFIG_CHANNEL),
        EventPayload::ProjectConfigChange { .. } => {
            (Message::project_config_change(data), CONFIG_CHANNEL)
        }
        EventPayload::LogAdded { .. } => (Message::log_added(data), LOGS_CHANNEL),
        EventPayload::LogChange { .. } => (Message::log_change(data), LOGS_CHANNEL),
        EventPayload::LogRemoved { .. } => (Message::log_removed(data), LOGS_CHANNEL),
        EventPayload::Custom { .. } => (Message::custom(event.type_name(), data), CUSTOM_CHANNEL),
    }
}

/// Wake at each window boundary and send what the new window admits
async fn drain_loop(core: Weak<Core>, cancel: CancellationToken) {
    loop {
        let deadline = match core.upgrade() {
            Some(core) => core.next_window_at(),
            None => break,
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline.into()) => {
                match core.upgrade() {
                    Some(core) => {
                        core.drain_queue();
                    }
                    None => break,
                }
            }
        }
    }
    tracing::debug!("Queue drain loop exited");
}

impl Drop for DashboardServer {
    fn drop(&mut self) {
        if !self.core.active.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::warn!("Dashboard server dropped while running, cancelling background tasks");
        if let Ok(mut lifecycle) = self.core.lifecycle.try_lock() {
            if let Some((cancel, _)) = lifecycle.drain.take() {
                cancel.cancel();
            }
        }
        self.core.socket.cancel();
        self.core.watcher.stop();
    }
}

impl std::fmt::Debug for DashboardServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardServer")
            .field("active", &self.is_active())
            .field("address", &self.local_addr())
            .finish()
    }
}

/// Stats as a JSON value for the request surface
pub(crate) fn stats_value(stats: &DashboardStats) -> Value {
    serde_json::to_value(stats).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}
