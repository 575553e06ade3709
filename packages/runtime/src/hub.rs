// ABOUTME: Per-sandbox observation fan-out hub bridging agent pushes to socket subscribers
// ABOUTME: One worker task per sandbox owns the subscriber set; all queues are bounded

use crate::registry::SandboxRegistry;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Sandbox not found: {0}")]
    UnknownSandbox(String),
}

/// Narrow existence capability the hub needs from the registry. Passing this
/// in keeps the hub free of any liveness belief of its own.
#[async_trait]
pub trait SandboxChecker: Send + Sync {
    async fn sandbox_exists(&self, sandbox_id: &str) -> bool;
}

#[async_trait]
impl SandboxChecker for SandboxRegistry {
    async fn sandbox_exists(&self, sandbox_id: &str) -> bool {
        self.exists(sandbox_id).await
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames queued per sandbox before the publisher starts dropping.
    pub ingress_depth: usize,
    /// Frames queued per subscriber before the subscriber is dropped.
    pub subscriber_depth: usize,
    pub ping_interval: Duration,
    pub pong_deadline: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            ingress_depth: 256,
            subscriber_depth: 64,
            ping_interval: Duration::from_secs(30),
            pong_deadline: Duration::from_secs(60),
        }
    }
}

/// What a subscriber's socket writer receives. `Ping` must be answered via
/// `Subscription::pong` before the pong deadline or the hub drops the
/// subscriber.
#[derive(Debug, Clone)]
pub enum SubscriberEvent {
    Frame(Bytes),
    Ping,
}

enum HubCommand {
    Frame(Bytes),
    Subscribe(Subscriber),
    Pong(u64),
    Unsubscribe(u64),
    Shutdown,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<SubscriberEvent>,
}

/// Handle held by one connected subscriber. The event channel closes when the
/// sandbox is removed or the hub drops the subscriber; dropping the handle
/// unregisters it.
pub struct Subscription {
    id: u64,
    events: mpsc::Receiver<SubscriberEvent>,
    feedback: mpsc::Sender<HubCommand>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<SubscriberEvent> {
        self.events.recv().await
    }

    /// Report a pong from the socket, refreshing this subscriber's liveness.
    pub fn pong(&self) {
        let _ = self.feedback.try_send(HubCommand::Pong(self.id));
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.feedback.try_send(HubCommand::Unsubscribe(self.id));
    }
}

/// Pub/sub of opaque observation frames, one fan-out worker per sandbox.
///
/// `publish` never blocks past the bounded ingress queue; a full queue drops
/// the frame. A slow subscriber is disconnected rather than allowed to stall
/// delivery to the others.
pub struct ObservationHub {
    checker: Arc<dyn SandboxChecker>,
    config: HubConfig,
    channels: RwLock<HashMap<String, mpsc::Sender<HubCommand>>>,
    next_subscriber_id: AtomicU64,
}

impl ObservationHub {
    pub fn new(checker: Arc<dyn SandboxChecker>, config: HubConfig) -> Self {
        Self {
            checker,
            config,
            channels: RwLock::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Deliver `frame` to every current subscriber of `sandbox_id`.
    /// Frames for unknown sandboxes are silently dropped.
    pub async fn publish(&self, sandbox_id: &str, frame: Bytes) {
        let Some(channel) = self.channel_for(sandbox_id).await else {
            debug!(%sandbox_id, "dropping frame for unknown sandbox");
            return;
        };

        match channel.try_send(HubCommand::Frame(frame)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%sandbox_id, "ingress queue full, dropping observation frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.channels.write().await.remove(sandbox_id);
            }
        }
    }

    /// Register a socket subscriber for `sandbox_id`. Fails when the sandbox
    /// does not exist.
    pub async fn subscribe(&self, sandbox_id: &str) -> Result<Subscription, HubError> {
        let channel = self
            .channel_for(sandbox_id)
            .await
            .ok_or_else(|| HubError::UnknownSandbox(sandbox_id.to_string()))?;

        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.subscriber_depth);

        channel
            .send(HubCommand::Subscribe(Subscriber { id, tx }))
            .await
            .map_err(|_| HubError::UnknownSandbox(sandbox_id.to_string()))?;

        debug!(%sandbox_id, subscriber = id, "subscriber registered");
        Ok(Subscription {
            id,
            events: rx,
            feedback: channel,
        })
    }

    /// Tear down the fan-out for a removed sandbox, closing every subscriber.
    pub async fn close_sandbox(&self, sandbox_id: &str) {
        let channel = self.channels.write().await.remove(sandbox_id);
        if let Some(channel) = channel {
            let _ = channel.send(HubCommand::Shutdown).await;
        }
    }

    /// Existing worker channel, or a fresh one if the sandbox is live.
    async fn channel_for(&self, sandbox_id: &str) -> Option<mpsc::Sender<HubCommand>> {
        {
            let channels = self.channels.read().await;
            if let Some(channel) = channels.get(sandbox_id) {
                if !channel.is_closed() {
                    return Some(channel.clone());
                }
            }
        }

        // The registry is the only authority on existence; never spin up a
        // worker for a sandbox it does not know.
        if !self.checker.sandbox_exists(sandbox_id).await {
            return None;
        }

        let mut channels = self.channels.write().await;
        if let Some(channel) = channels.get(sandbox_id) {
            if !channel.is_closed() {
                return Some(channel.clone());
            }
        }

        let (tx, rx) = mpsc::channel(self.config.ingress_depth);
        tokio::spawn(run_worker(
            sandbox_id.to_string(),
            rx,
            self.config.clone(),
        ));
        channels.insert(sandbox_id.to_string(), tx.clone());
        Some(tx)
    }
}

/// Single consumer of a sandbox's ingress queue. Exclusively owns the
/// subscriber set, so fan-out needs no locks and per-sandbox frame order is
/// exactly arrival order.
async fn run_worker(sandbox_id: String, mut rx: mpsc::Receiver<HubCommand>, config: HubConfig) {
    let mut subscribers: Vec<Subscriber> = Vec::new();
    let mut last_pong: HashMap<u64, Instant> = HashMap::new();

    let mut ping = tokio::time::interval(config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // An interval's first tick completes immediately; consume it so the first
    // real ping happens one full interval in.
    ping.tick().await;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                None | Some(HubCommand::Shutdown) => break,
                Some(HubCommand::Frame(frame)) => {
                    deliver(&sandbox_id, &mut subscribers, &mut last_pong, frame);
                }
                Some(HubCommand::Subscribe(subscriber)) => {
                    last_pong.insert(subscriber.id, Instant::now());
                    subscribers.push(subscriber);
                }
                Some(HubCommand::Pong(id)) => {
                    if let Some(seen) = last_pong.get_mut(&id) {
                        *seen = Instant::now();
                    }
                }
                Some(HubCommand::Unsubscribe(id)) => {
                    subscribers.retain(|s| s.id != id);
                    last_pong.remove(&id);
                }
            },
            _ = ping.tick() => {
                let now = Instant::now();
                subscribers.retain(|subscriber| {
                    let stale = last_pong
                        .get(&subscriber.id)
                        .map(|seen| now.duration_since(*seen) > config.pong_deadline)
                        .unwrap_or(false);
                    if stale {
                        warn!(%sandbox_id, subscriber = subscriber.id, "dropping subscriber: pong deadline missed");
                        last_pong.remove(&subscriber.id);
                        return false;
                    }
                    match subscriber.tx.try_send(SubscriberEvent::Ping) {
                        Ok(()) => true,
                        Err(_) => {
                            last_pong.remove(&subscriber.id);
                            false
                        }
                    }
                });
            }
        }
    }

    debug!(%sandbox_id, "hub worker stopped");
    // Dropping the subscriber set closes every event channel; socket writers
    // observe the close and shut the connection.
}

fn deliver(
    sandbox_id: &str,
    subscribers: &mut Vec<Subscriber>,
    last_pong: &mut HashMap<u64, Instant>,
    frame: Bytes,
) {
    subscribers.retain(|subscriber| match subscriber.tx.try_send(SubscriberEvent::Frame(frame.clone())) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(%sandbox_id, subscriber = subscriber.id, "dropping slow subscriber: outbound queue full");
            last_pong.remove(&subscriber.id);
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            last_pong.remove(&subscriber.id);
            false
        }
    });
}
