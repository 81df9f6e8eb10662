//! Open widget sessions keyed by session id, with idle eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use leadflow_core::widget::ChatWidget;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

struct SessionEntry {
    widget: Arc<ChatWidget>,
    listener: JoinHandle<()>,
    last_touched: Instant,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    /// Registers the widget and starts following its visibility flag.
    pub async fn insert(&self, widget: Arc<ChatWidget>) -> String {
        let session_id = widget.session_id().0;
        let listener = widget.spawn_visibility_listener();
        let entry = SessionEntry { widget, listener, last_touched: Instant::now() };
        if let Some(previous) = self.entries.write().await.insert(session_id.clone(), entry) {
            previous.listener.abort();
        }
        session_id
    }

    /// Looks the session up and marks it active.
    pub async fn touch(&self, id: &str) -> Option<Arc<ChatWidget>> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(id)?;
        entry.last_touched = Instant::now();
        Some(Arc::clone(&entry.widget))
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<ChatWidget>> {
        let entry = self.entries.write().await.remove(id)?;
        entry.listener.abort();
        Some(entry.widget)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Abandons and drops every session untouched for at least `idle`.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let evicted: Vec<SessionEntry> = {
            let mut entries = self.entries.write().await;
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_touched) >= idle)
                .map(|(id, _)| id.clone())
                .collect();
            expired.iter().filter_map(|id| entries.remove(id)).collect()
        };

        for entry in &evicted {
            entry.listener.abort();
            entry.widget.close();
            info!(
                event_name = "widget.session_evicted",
                correlation_id = %entry.widget.correlation_id(),
                session_id = %entry.widget.session_id(),
                idle_secs = idle.as_secs(),
                "idle widget session evicted"
            );
        }
        evicted.len()
    }

    /// Runs [`SessionRegistry::evict_idle`] periodically until aborted.
    pub fn spawn_sweeper(&self, idle: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let period = sweep_period(idle);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = registry.evict_idle(idle).await;
                if evicted > 0 {
                    debug!(
                        event_name = "widget.session_sweep",
                        correlation_id = "session-sweeper",
                        evicted,
                        "idle session sweep finished"
                    );
                }
            }
        })
    }
}

fn sweep_period(idle: Duration) -> Duration {
    (idle / 4).clamp(MIN_SWEEP_PERIOD, MAX_SWEEP_PERIOD)
}
