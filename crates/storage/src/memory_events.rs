//! In-memory usage-event store.

use aceflow_core::{EventQuery, UsageEvent};
use async_trait::async_trait;

use crate::trait_::{EventStore, Result};

/// Keeps events in a `Vec`, oldest first.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    events: Vec<UsageEvent>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save_event(&mut self, event: &UsageEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }

    async fn get_events(&self, query: &EventQuery) -> Result<Vec<UsageEvent>> {
        let mut events: Vec<UsageEvent> = self.events.iter().filter(|e| query.matches(e)).cloned().collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn get_event_count(&self) -> Result<usize> {
        Ok(self.events.len())
    }

    async fn cleanup_old_events(&mut self, days: i64) -> Result<usize> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        let before = self.events.len();
        self.events.retain(|e| e.timestamp >= cutoff);
        Ok(before - self.events.len())
    }
}
