//! The package-mutator collaborator — out of core scope (spec §1, §9
//! "Open question — apply semantics"). The core only records the
//! *decision* a sync pipeline reaches; applying it to a real host is
//! delegated to this trait. [`SimulatedMutator`] stands in for the real,
//! out-of-process collaborator (a client shelling out to `pacman`) so the
//! coordinator's pipelines are fully exercisable without one.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct MutationIntent {
    pub endpoint_id: crate::id::Id,
    pub install: Vec<String>,
    pub remove: Vec<String>,
    pub upgrade: Vec<(String, String)>,
}

#[async_trait]
pub trait Mutator: Send + Sync {
    async fn apply(&self, intent: &MutationIntent) -> Result<(), String>;
}

pub struct SimulatedMutator;

#[async_trait]
impl Mutator for SimulatedMutator {
    async fn apply(&self, intent: &MutationIntent) -> Result<(), String> {
        tracing::debug!(
            endpoint_id = %intent.endpoint_id,
            installs = intent.install.len(),
            removes = intent.remove.len(),
            upgrades = intent.upgrade.len(),
            "simulating mutator apply"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(())
    }
}
