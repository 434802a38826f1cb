//! Agents that act on classified intents
//!
//! Each agent claims one intent type. The registry maps type names to agents
//! and is open for extension: registering a new agent needs no change to the
//! dispatcher.
//!
//! # Example
//!
//! ```rust,ignore
//! use loki_voice::agents::{AgentRegistry, CalculationAgent};
//!
//! let mut registry = AgentRegistry::new();
//! registry.register(Box::new(CalculationAgent::new()));
//!
//! let response = registry.dispatch(&intent).await;
//! ```

mod calculation;
mod general;
mod system_control;

use async_trait::async_trait;
use indexmap::IndexMap;

pub use calculation::{CalculationAgent, evaluate};
pub use general::GeneralAgent;
pub use system_control::{HostBackend, SystemBackend, SystemControlAgent, VolumeDirection};

use crate::intent::Intent;

/// Handler for one intent type
///
/// Agents never fail outward: internal errors become a spoken-style reply.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Intent type this agent handles
    fn name(&self) -> &str;

    /// Perform the intent and return a reply for the user
    async fn execute(&self, intent: &Intent) -> String;
}

/// Agents keyed by intent type, in registration order
#[derive(Default)]
pub struct AgentRegistry {
    agents: IndexMap<String, Box<dyn Agent>>,
}

impl AgentRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any agent with the same name
    pub fn register(&mut self, agent: Box<dyn Agent>) {
        let name = agent.name().to_string();
        tracing::info!(agent = %name, "registering agent");

        if self.agents.insert(name.clone(), agent).is_some() {
            tracing::debug!(agent = %name, "replaced existing agent");
        }
    }

    /// Run the agent registered for the intent's type
    ///
    /// Returns `None` if no agent claims the type.
    pub async fn dispatch(&self, intent: &Intent) -> Option<String> {
        let agent = self.agents.get(&intent.kind)?;

        tracing::info!(
            agent = %intent.kind,
            action = %intent.action,
            "dispatching intent"
        );

        Some(agent.execute(intent).await)
    }

    /// Registered agent names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    /// Number of registered agents
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agents are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
