use async_trait::async_trait;
use uuid::Uuid;
use crate::runtime::state::ProcessState;
use anyhow::{Result, Context as AnyhowContext};
use dashmap::DashMap;

// --- Interfaces ---

/// Where suspended instances are kept between `suspend` and `resume`.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, instance_id: Uuid, state: &ProcessState) -> Result<()>;
    async fn load(&self, instance_id: Uuid) -> Result<Option<ProcessState>>;
    async fn remove(&self, instance_id: Uuid) -> Result<()>;
}

// --- In-Memory Implementations ---

/// Keeps the serialized JSON, so a save/load pair goes through the same
/// encoding a remote store would.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: DashMap<Uuid, String>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, instance_id: Uuid, state: &ProcessState) -> Result<()> {
        let json = serde_json::to_string(state).context("Failed to serialize process state")?;
        self.states.insert(instance_id, json);
        Ok(())
    }

    async fn load(&self, instance_id: Uuid) -> Result<Option<ProcessState>> {
        // Clone out of the map before parsing so no shard lock is held
        let Some(json) = self.states.get(&instance_id).map(|v| v.value().clone()) else {
            return Ok(None);
        };
        let state = serde_json::from_str(&json)
            .with_context(|| format!("Corrupt state for instance {}", instance_id))?;
        Ok(Some(state))
    }

    async fn remove(&self, instance_id: Uuid) -> Result<()> {
        self.states.remove(&instance_id);
        Ok(())
    }
}
