//! Challenge definitions mirrored from the cluster.
//!
//! [`ConfigWatcher`] lists every `Challenge` resource, then follows the watch
//! stream from the listing's resource version. Any change to a definition
//! stops all running instances of that challenge so no instance keeps running
//! against a stale definition.

use crate::{
    cluster::{ChallengeEvent, ClusterClient},
    config::WatchConfig,
    crds::{Challenge, ChallengeSpec},
    error::Result,
    resources::labels,
    telemetry::Metrics,
};
use dashmap::DashMap;
use futures::{future, TryStreamExt};
use kube::ResourceExt;
use rand::Rng;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Shared cache of challenge definitions keyed by challenge id.
///
/// Entries are replaced or removed whole, so readers see either the old or
/// the new definition.
#[derive(Clone, Default)]
pub struct ChallengeRepository {
    definitions: Arc<DashMap<String, Arc<ChallengeSpec>>>,
}

impl ChallengeRepository {
    pub fn get(&self, challenge_id: &str) -> Option<Arc<ChallengeSpec>> {
        self.definitions
            .get(challenge_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn has(&self, challenge_id: &str) -> bool {
        self.definitions.contains_key(challenge_id)
    }

    pub fn upsert(&self, challenge_id: &str, spec: ChallengeSpec) {
        self.definitions
            .insert(challenge_id.to_string(), Arc::new(spec));
    }

    pub fn remove(&self, challenge_id: &str) -> Option<Arc<ChallengeSpec>> {
        self.definitions
            .remove(challenge_id)
            .map(|(_, spec)| spec)
    }

    pub fn ids(&self) -> Vec<String> {
        self.definitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Exponential reconnect delay with a ceiling and up to 25% jitter
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay before the next attempt; grows the delay for the attempt after
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        let jitter_ms = (delay.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

pub struct ConfigWatcher {
    cluster: Arc<dyn ClusterClient>,
    challenges: ChallengeRepository,
    config: WatchConfig,
    metrics: Arc<Metrics>,
}

impl ConfigWatcher {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        challenges: ChallengeRepository,
        config: WatchConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cluster,
            challenges,
            config,
            metrics,
        }
    }

    /// Subscribe forever. Every disconnect, clean or not, is followed by a
    /// delay and a fresh listing.
    pub async fn run(self) {
        let mut backoff = ReconnectBackoff::new(
            self.config.reconnect_delay(),
            self.config.max_reconnect_delay(),
        );

        loop {
            match self.subscribe(&mut backoff).await {
                Ok(()) => info!("Watch connection closed normally, reconnecting"),
                Err(e) => warn!(error = %e, "Watch connection error, attempting to reconnect"),
            }
            self.metrics.record_watch_reconnect();

            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnecting");
            tokio::time::sleep(delay).await;
            info!("Reconnecting to cluster watch");
        }
    }

    /// One list + watch cycle; returns when the stream ends
    pub async fn subscribe(&self, backoff: &mut ReconnectBackoff) -> Result<()> {
        let (items, resource_version) = self.cluster.list_challenges().await?;
        backoff.reset();

        let stale = self.replace_all(items);
        info!(
            challenges = self.challenges.len(),
            %resource_version,
            "Loaded challenges, starting watch"
        );
        // definitions deleted or modified while we were disconnected
        for challenge_id in stale {
            info!(challenge = %challenge_id, "Challenge changed while disconnected");
            self.stop_all(&challenge_id).await;
        }

        let mut stream = self.cluster.watch_challenges(&resource_version).await?;
        while let Some(event) = stream.try_next().await? {
            self.handle_event(event).await;
        }
        Ok(())
    }

    /// Load a fresh listing, returning ids that are no longer defined or
    /// whose definition differs from the cached one
    fn replace_all(&self, items: Vec<Challenge>) -> Vec<String> {
        let listed: HashSet<String> = items.iter().map(|c| c.name_any()).collect();
        let mut stale: Vec<String> = self
            .challenges
            .ids()
            .into_iter()
            .filter(|id| !listed.contains(id))
            .collect();

        for challenge_id in &stale {
            self.challenges.remove(challenge_id);
        }
        for challenge in items {
            let challenge_id = challenge.name_any();
            let changed = self
                .challenges
                .get(&challenge_id)
                .is_some_and(|cached| *cached != challenge.spec);
            if changed {
                stale.push(challenge_id);
            }
            self.save(challenge);
        }
        stale
    }

    fn save(&self, challenge: Challenge) {
        let challenge_id = challenge.name_any();
        debug!(challenge = %challenge_id, spec = ?challenge.spec, "Saved challenge");
        info!(challenge = %challenge_id, "Saved challenge");
        self.challenges.upsert(&challenge_id, challenge.spec);
    }

    pub async fn handle_event(&self, event: ChallengeEvent) {
        let challenge_id = event.challenge().name_any();
        match event {
            ChallengeEvent::Added(challenge) | ChallengeEvent::Modified(challenge) => {
                self.save(challenge)
            }
            ChallengeEvent::Deleted(_) => {
                self.challenges.remove(&challenge_id);
                info!(challenge = %challenge_id, "Deleted challenge");
            }
        }
        // a modified definition invalidates running instances just like a deletion
        self.stop_all(&challenge_id).await;
    }

    /// Delete every namespace labelled with the challenge. Failures are
    /// logged; they never end the subscription.
    pub async fn stop_all(&self, challenge_id: &str) {
        self.metrics.record_sweep();
        match self.sweep(challenge_id).await {
            Ok(stopped) => info!(challenge = %challenge_id, stopped, "Stopped instances"),
            Err(e) => warn!(challenge = %challenge_id, error = %e, "Failed to stop instances"),
        }
    }

    async fn sweep(&self, challenge_id: &str) -> Result<usize> {
        let namespaces = self
            .cluster
            .list_namespaces(&labels::challenge_selector(challenge_id))
            .await?;

        let deletions = namespaces.iter().map(|ns| {
            let name = ns.name_any();
            let uid = ns.metadata.uid.clone();
            async move { self.cluster.delete_namespace(&name, uid.as_deref()).await }
        });
        let results = future::join_all(deletions).await;

        let mut stopped = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(_) => stopped += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(stopped),
        }
    }
}
