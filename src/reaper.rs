use crate::{
    cluster::ClusterClient,
    error::Result,
    resources::{labels, namespace},
    telemetry::Metrics,
};
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Time left before an instance created at `creation` expires, never negative
pub fn remaining_time(creation: DateTime<Utc>, ttl: Duration) -> Duration {
    remaining_time_at(creation, ttl, Utc::now())
}

pub fn remaining_time_at(creation: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> Duration {
    let expiry = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| creation.checked_add_signed(ttl));
    match expiry {
        Some(expiry) => (expiry - now).to_std().unwrap_or(Duration::ZERO),
        None => Duration::MAX,
    }
}

/// In-memory, one-shot deletion timers keyed by namespace and uid. Timers do
/// not survive a restart; [`Reaper::reconcile`] re-arms them from the cluster.
#[derive(Clone)]
pub struct Reaper {
    cluster: Arc<dyn ClusterClient>,
    metrics: Arc<Metrics>,
}

impl Reaper {
    pub fn new(cluster: Arc<dyn ClusterClient>, metrics: Arc<Metrics>) -> Self {
        Self { cluster, metrics }
    }

    /// Delete `namespace` once `ttl` has elapsed. Fire and forget: callers may
    /// drop the handle. With a `uid`, only that incarnation of the namespace
    /// is deleted; one recreated under the same name keeps its own timer.
    pub fn schedule_deletion(
        &self,
        namespace: &str,
        uid: Option<String>,
        ttl: Duration,
    ) -> JoinHandle<()> {
        let cluster = self.cluster.clone();
        let metrics = self.metrics.clone();
        let namespace = namespace.to_string();
        debug!(%namespace, ?uid, ttl_ms = ttl.as_millis() as u64, "Scheduled deletion");

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            match cluster.delete_namespace(&namespace, uid.as_deref()).await {
                Ok(true) => {
                    metrics.record_timeout();
                    info!(%namespace, "Instance expired, deleted namespace");
                }
                Ok(false) => debug!(%namespace, "Namespace already deleted or replaced"),
                Err(e) => warn!(%namespace, error = %e, "Failed to delete expired namespace"),
            }
        })
    }

    /// Re-arm timers for every live instance namespace. Run once at startup.
    pub async fn reconcile(&self) -> Result<usize> {
        let namespaces = self
            .cluster
            .list_namespaces(&labels::managed_selector())
            .await?;

        let mut armed = 0;
        for ns in namespaces {
            let name = ns.name_any();
            if namespace::is_terminating(&ns) {
                continue;
            }
            let (Some(ttl), Some(created)) = (
                namespace::ttl(&ns),
                ns.metadata.creation_timestamp.as_ref(),
            ) else {
                warn!(namespace = %name, "Instance namespace lacks TTL annotation or creation time");
                continue;
            };
            self.schedule_deletion(
                &name,
                ns.metadata.uid.clone(),
                remaining_time(created.0, ttl),
            );
            armed += 1;
        }

        info!(armed, "Re-armed deletion timers");
        Ok(armed)
    }
}
