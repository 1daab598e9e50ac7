use std::collections::HashMap;
use std::sync::Arc;
use anyhow::{Result, anyhow, Context as AnyhowContext};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;
use crate::actions::{HandlerRegistry, TaskHandler};
use crate::compiler::core::Compiler;
use crate::dsl::ProcessDefinition;
use crate::runtime::listener::Listener;
use crate::runtime::process::ProcessInstance;
use crate::runtime::state::ProcessState;
use crate::runtime::storage::{InMemoryStateStore, StateStore};

/// Hosts many independent process instances.
///
/// Instances share no mutable state; each sits behind its own lock and is
/// driven synchronously while the lock is held. Suspending an instance
/// moves its captured state into the `StateStore` and drops the live
/// graph; resuming compiles a fresh graph and restores it.
pub struct Engine {
    definitions: DashMap<String, Arc<ProcessDefinition>>,
    instances: DashMap<Uuid, Arc<Mutex<ProcessInstance>>>,
    handlers: HandlerRegistry,
    listeners: Vec<Arc<dyn Listener>>,
    compiler: Compiler,
    store: Arc<dyn StateStore>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::new_with_storage(Arc::new(InMemoryStateStore::new()))
    }

    pub fn new_with_storage(store: Arc<dyn StateStore>) -> Self {
        Self {
            definitions: DashMap::new(),
            instances: DashMap::new(),
            handlers: HandlerRegistry::with_builtins(),
            listeners: Vec::new(),
            compiler: Compiler::new(),
            store,
        }
    }

    pub fn register_definition(&self, definition: ProcessDefinition) {
        self.definitions.insert(definition.id.clone(), Arc::new(definition));
    }

    pub fn register_handler(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.register(handler);
    }

    /// Listener attached to every instance started or resumed afterwards.
    pub fn subscribe(&mut self, listener: Arc<dyn Listener>) {
        self.listeners.push(listener);
    }

    fn definition(&self, id: &str) -> Result<Arc<ProcessDefinition>> {
        self.definitions
            .get(id)
            .map(|d| d.value().clone())
            .ok_or_else(|| anyhow!("Process definition not found: {}", id))
    }

    fn build_instance(&self, definition: &ProcessDefinition, variables: HashMap<String, Value>) -> Result<ProcessInstance> {
        let mut instance = self
            .compiler
            .instantiate(definition, Arc::new(self.handlers.clone()), variables)?;
        for listener in &self.listeners {
            instance.subscribe(listener.clone());
        }
        Ok(instance)
    }

    fn live(&self, instance_id: Uuid) -> Result<Arc<Mutex<ProcessInstance>>> {
        self.instances
            .get(&instance_id)
            .map(|i| i.value().clone())
            .ok_or_else(|| anyhow!("Instance not running: {}", instance_id))
    }

    pub async fn start_process(&self, definition_id: &str, variables: HashMap<String, Value>) -> Result<Uuid> {
        let definition = self.definition(definition_id)?;
        let instance = self.build_instance(&definition, variables)?;

        let instance_id = Uuid::new_v4();
        let handle = Arc::new(Mutex::new(instance));
        self.instances.insert(instance_id, handle.clone());
        info!(instance_id = %instance_id, process = definition_id, "Starting process");

        let mut process = handle.lock().await;
        process
            .run()
            .with_context(|| format!("Instance {} failed while running", instance_id))?;
        Ok(instance_id)
    }

    pub async fn signal(&self, instance_id: Uuid, activity_id: &str) -> Result<()> {
        let handle = self.live(instance_id)?;
        let mut process = handle.lock().await;
        process
            .signal(activity_id)
            .with_context(|| format!("Instance {} failed to handle signal for {}", instance_id, activity_id))
    }

    pub async fn waiting_activities(&self, instance_id: Uuid) -> Result<Vec<String>> {
        let handle = self.live(instance_id)?;
        let process = handle.lock().await;
        Ok(process.waiting_activities())
    }

    pub async fn variable(&self, instance_id: Uuid, key: &str) -> Option<Value> {
        let handle = self.live(instance_id).ok()?;
        let process = handle.lock().await;
        process.variable(key).cloned()
    }

    pub fn is_running(&self, instance_id: Uuid) -> bool {
        self.instances.contains_key(&instance_id)
    }

    /// State of a live instance, or the stored state of a suspended one.
    pub async fn instance_state(&self, instance_id: Uuid) -> Result<ProcessState> {
        if let Ok(handle) = self.live(instance_id) {
            return Ok(handle.lock().await.get_state());
        }
        self.store
            .load(instance_id)
            .await?
            .ok_or_else(|| anyhow!("Unknown instance: {}", instance_id))
    }

    /// Persist the instance, then drop it from memory. If the store fails
    /// the instance stays live.
    pub async fn suspend(&self, instance_id: Uuid) -> Result<()> {
        let handle = self.live(instance_id)?;
        // Held until removal so no signal slips in after the capture
        let process = handle.lock().await;
        let state = process.get_state();
        self.store
            .save(instance_id, &state)
            .await
            .with_context(|| format!("Instance {} could not be suspended", instance_id))?;
        self.instances.remove(&instance_id);
        drop(process);
        info!(instance_id = %instance_id, "Instance suspended");
        Ok(())
    }

    pub async fn resume(&self, instance_id: Uuid) -> Result<()> {
        if self.is_running(instance_id) {
            warn!(instance_id = %instance_id, "Instance is already running");
            return Ok(());
        }
        let state = self
            .store
            .load(instance_id)
            .await?
            .ok_or_else(|| anyhow!("No stored state for instance {}", instance_id))?;
        let definition = self.definition(&state.id)?;

        let mut instance = self.build_instance(&definition, HashMap::new())?;
        instance
            .resume(&state)
            .with_context(|| format!("Instance {} could not be reconstructed", instance_id))?;

        self.instances.insert(instance_id, Arc::new(Mutex::new(instance)));
        self.store.remove(instance_id).await?;
        info!(instance_id = %instance_id, process = %state.id, "Instance resumed");
        Ok(())
    }
}
