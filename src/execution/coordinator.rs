//! Tracks in-flight runs per change and applies the supersede policy

use crate::core::config::SupersedePolicy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug)]
struct InFlight {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct Registry {
    next_generation: u64,
    runs: HashMap<String, Vec<InFlight>>,
}

/// Hands out one cancellation token per run, keyed by change id
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    policy: SupersedePolicy,
    registry: Arc<Mutex<Registry>>,
}

/// Registration of one in-flight run; deregisters on drop
#[derive(Debug)]
pub struct RunTicket {
    change_id: String,
    generation: u64,
    token: CancellationToken,
    registry: Arc<Mutex<Registry>>,
}

impl RunCoordinator {
    pub fn new(policy: SupersedePolicy) -> Self {
        Self {
            policy,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn policy(&self) -> SupersedePolicy {
        self.policy
    }

    /// Register a new run for `change_id`
    ///
    /// Under [`SupersedePolicy::Cancel`] every earlier run for the same
    /// change is cancelled first.
    pub fn begin(&self, change_id: &str) -> RunTicket {
        let mut registry = lock(&self.registry);
        registry.next_generation += 1;
        let generation = registry.next_generation;

        let runs = registry.runs.entry(change_id.to_string()).or_default();
        if self.policy == SupersedePolicy::Cancel {
            for previous in runs.iter() {
                info!(
                    "Cancelling superseded run for change {} (generation {})",
                    change_id, previous.generation
                );
                previous.token.cancel();
            }
        }

        let token = CancellationToken::new();
        runs.push(InFlight {
            generation,
            token: token.clone(),
        });

        RunTicket {
            change_id: change_id.to_string(),
            generation,
            token,
            registry: self.registry.clone(),
        }
    }

    /// Cancel every in-flight run for `change_id`, returning how many
    pub fn cancel(&self, change_id: &str) -> usize {
        let registry = lock(&self.registry);
        registry.runs.get(change_id).map_or(0, |runs| {
            runs.iter().for_each(|r| r.token.cancel());
            runs.len()
        })
    }

    pub fn in_flight(&self, change_id: &str) -> usize {
        lock(&self.registry).runs.get(change_id).map_or(0, Vec::len)
    }
}

impl Default for RunCoordinator {
    fn default() -> Self {
        Self::new(SupersedePolicy::default())
    }
}

impl RunTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn change_id(&self) -> &str {
        &self.change_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        if let Some(runs) = registry.runs.get_mut(&self.change_id) {
            runs.retain(|r| r.generation != self.generation);
            if runs.is_empty() {
                registry.runs.remove(&self.change_id);
            }
        }
    }
}

// A panic while holding the lock leaves the map consistent, so keep going
fn lock(registry: &Mutex<Registry>) -> std::sync::MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
