pub mod challenges;
pub mod cluster;
pub mod config;
pub mod crds;
pub mod error;
pub mod instance;
pub mod reaper;
pub mod resources;
pub mod telemetry;
pub mod utils;

#[cfg(test)]
mod testing;

use challenges::{ChallengeRepository, ConfigWatcher};
use cluster::{ClusterClient, KubeClusterClient};
use config::ControllerConfig;
use instance::InstanceOrchestrator;
use reaper::Reaper;
use std::sync::Arc;
use telemetry::Metrics;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running engine: the challenge watch loop plus the orchestrator the
/// request layer calls into.
pub struct Klodd {
    orchestrator: InstanceOrchestrator,
    challenges: ChallengeRepository,
    metrics: Arc<Metrics>,
    watcher: JoinHandle<()>,
}

impl Klodd {
    pub async fn start(config: ControllerConfig, client: kube::Client) -> Self {
        Self::with_cluster(config, Arc::new(KubeClusterClient::new(client))).await
    }

    pub async fn with_cluster(config: ControllerConfig, cluster: Arc<dyn ClusterClient>) -> Self {
        let config = Arc::new(config);
        let metrics = Arc::new(Metrics::default());
        let challenges = ChallengeRepository::default();
        let reaper = Reaper::new(cluster.clone(), metrics.clone());

        let watcher = ConfigWatcher::new(
            cluster.clone(),
            challenges.clone(),
            config.watch.clone(),
            metrics.clone(),
        );
        let watcher = tokio::spawn(watcher.run());

        // timers do not survive a restart
        if let Err(e) = reaper.reconcile().await {
            warn!(error = %e, "Failed to re-arm deletion timers");
        }

        let orchestrator = InstanceOrchestrator::new(
            cluster,
            challenges.clone(),
            reaper,
            config,
            metrics.clone(),
        );
        info!("Engine started");

        Self {
            orchestrator,
            challenges,
            metrics,
            watcher,
        }
    }

    pub fn orchestrator(&self) -> &InstanceOrchestrator {
        &self.orchestrator
    }

    pub fn challenges(&self) -> &ChallengeRepository {
        &self.challenges
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Stop following challenge definitions. Armed deletion timers keep running.
    pub fn shutdown(self) {
        self.watcher.abort();
    }
}
