use gradegate::config::StorageConfig;
use gradegate::workflows::results::{
    Actor, MemoryStore, Notification, NotificationError, NotificationSender, Role, StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Hands notifications to the log until a real delivery channel is wired in.
/// Payload values are never logged because they may carry verification codes.
#[derive(Default, Clone)]
pub(crate) struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        let fields: Vec<&str> = notification.payload.keys().map(String::as_str).collect();
        info!(
            recipient = %notification.recipient,
            template = %notification.template,
            ?fields,
            "notification queued"
        );
        Ok(())
    }
}

/// Keeps every notification in memory so the demo can read codes back.
#[derive(Default, Clone)]
pub(crate) struct InMemoryOutbox {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationSender for InMemoryOutbox {
    fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        let mut guard = self
            .sent
            .lock()
            .map_err(|_| NotificationError::Transport("outbox mutex poisoned".to_string()))?;
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryOutbox {
    pub(crate) fn latest(&self, recipient: &str, template: &str) -> Option<Notification> {
        let guard = self.sent.lock().ok()?;
        guard
            .iter()
            .rev()
            .find(|notification| {
                notification.recipient == recipient && notification.template == template
            })
            .cloned()
    }
}

pub(crate) fn open_store(storage: &StorageConfig) -> Result<MemoryStore, StoreError> {
    match &storage.data_path {
        Some(path) => MemoryStore::open(path),
        None => Ok(MemoryStore::new()),
    }
}

/// Institution-wide reader used by the command-line audit dump.
pub(crate) fn cli_auditor() -> Actor {
    Actor::new("cli-auditor", Role::Admin)
}
