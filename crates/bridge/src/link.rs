use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use chrono::Utc;
use shared::protocol::{DeviceEvent, DeviceStatus, Notification};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::{channel::SkillChannel, model::DeviceModel};

const EVENT_BUFFER: usize = 256;

/// Per-device context shared by the bridge listener, the channel reader and
/// the method dispatcher.
pub struct DeviceLink {
    name: String,
    model: Arc<dyn DeviceModel>,
    channel: RwLock<Option<Arc<SkillChannel>>>,
    events: broadcast::Sender<DeviceEvent>,
    next_event_id: AtomicU64,
}

impl DeviceLink {
    pub fn new(name: impl Into<String>, model: Arc<dyn DeviceModel>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            name: name.into(),
            model,
            channel: RwLock::new(None),
            events,
            next_event_id: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> Arc<dyn DeviceModel> {
        Arc::clone(&self.model)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Publishes a notification to every current subscriber.
    pub fn emit(&self, notification: Notification) -> DeviceEvent {
        let event = DeviceEvent {
            device: self.name.clone(),
            event_id: self.next_event_id.fetch_add(1, Ordering::Relaxed),
            emitted_at: Utc::now(),
            message: notification.to_string(),
        };
        if self.events.send(event.clone()).is_err() {
            debug!(device = %self.name, message = %event.message, "no event subscribers");
        }
        event
    }

    /// Makes `channel` the device's bridge and returns the one it replaced.
    pub async fn attach(&self, channel: Arc<SkillChannel>) -> Option<Arc<SkillChannel>> {
        let previous = self.channel.write().await.replace(channel);
        info!(device = %self.name, "skill bridge ready");
        self.emit(Notification::ServerMessage("Skillbridge connected".into()));
        previous
    }

    /// Marks the device not ready, unless `channel` was already replaced.
    pub async fn detach(&self, channel: &Arc<SkillChannel>) -> bool {
        let mut current = self.channel.write().await;
        let is_current = current
            .as_ref()
            .is_some_and(|attached| Arc::ptr_eq(attached, channel));
        if !is_current {
            return false;
        }
        *current = None;
        drop(current);
        info!(device = %self.name, peer = %channel.peer(), "skill bridge not ready");
        self.emit(Notification::ServerMessage("Skillbridge disconnected".into()));
        true
    }

    pub async fn channel(&self) -> Option<Arc<SkillChannel>> {
        self.channel.read().await.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.channel.read().await.is_some()
    }

    pub async fn status(&self) -> DeviceStatus {
        DeviceStatus {
            device: self.name.clone(),
            bridge_ready: self.is_ready().await,
            skills: self.model.summaries(),
        }
    }
}
