//! Instance lifecycle as seen by the request layer.
//!
//! Nothing about an instance is stored here: status, servers and the time
//! window are derived from the live namespace and deployment on every query.

use crate::{
    cluster::ClusterClient,
    challenges::ChallengeRepository,
    config::ControllerConfig,
    crds::ChallengeSpec,
    error::{CreationStage, Error, Result},
    reaper::{self, Reaper},
    resources::{self, labels, namespace, InstanceIdentity, InstanceManifests, Server},
    telemetry::Metrics,
    utils,
};
use futures::future;
use k8s_openapi::api::{apps::v1::Deployment, core::v1::Namespace};
use kube::ResourceExt;
use serde::Serialize;
use std::{future::Future, sync::Arc};
use tracing::{debug, error, info, instrument};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceStatus {
    Stopped,
    Stopping,
    Unknown,
    Running,
    Starting,
}

/// Instance lifetime in epoch milliseconds
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub stop: i64,
    pub remaining: i64,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    pub status: InstanceStatus,
    /// TTL in milliseconds
    pub timeout: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeWindow>,
}

impl Instance {
    fn new(challenge: &ChallengeSpec, status: InstanceStatus) -> Self {
        Self {
            name: challenge.name.clone(),
            status,
            timeout: challenge.timeout,
            servers: Vec::new(),
            time: None,
        }
    }
}

/// Status decision table. `deployment` is the primary exposed workload and is
/// only consulted once the namespace is known to be live.
pub fn derive_status(
    namespace: Option<&Namespace>,
    deployment: Option<&Deployment>,
) -> InstanceStatus {
    let Some(ns) = namespace else {
        return InstanceStatus::Stopped;
    };
    if namespace::is_terminating(ns) {
        return InstanceStatus::Stopping;
    }
    let Some(deployment) = deployment else {
        return InstanceStatus::Unknown;
    };
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    if available > 0 {
        InstanceStatus::Running
    } else {
        InstanceStatus::Starting
    }
}

#[derive(Clone)]
pub struct InstanceOrchestrator {
    cluster: Arc<dyn ClusterClient>,
    challenges: ChallengeRepository,
    reaper: Reaper,
    config: Arc<ControllerConfig>,
    metrics: Arc<Metrics>,
}

impl InstanceOrchestrator {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        challenges: ChallengeRepository,
        reaper: Reaper,
        config: Arc<ControllerConfig>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cluster,
            challenges,
            reaper,
            config,
            metrics,
        }
    }

    fn challenge(&self, challenge_id: &str) -> Result<Arc<ChallengeSpec>> {
        self.challenges
            .get(challenge_id)
            .ok_or_else(|| Error::ChallengeNotFound(challenge_id.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_instance(&self, challenge_id: &str, team_id: &str) -> Result<Instance> {
        let challenge = self.challenge(challenge_id)?;
        let ns_name = utils::generate_namespace_name(challenge_id, team_id);

        let ns = self.cluster.get_namespace(&ns_name).await?;
        let deployment = match &ns {
            Some(ns) if !namespace::is_terminating(ns) => {
                self.cluster
                    .get_deployment(&ns_name, &challenge.expose.pod)
                    .await?
            }
            _ => None,
        };

        let status = derive_status(ns.as_ref(), deployment.as_ref());
        let mut instance = Instance::new(&challenge, status);

        let Some(ns) = ns else {
            return Ok(instance);
        };
        if matches!(status, InstanceStatus::Stopped | InstanceStatus::Stopping) {
            return Ok(instance);
        }

        if let Some(instance_id) = ns.labels().get(labels::LABEL_INSTANCE) {
            instance.servers =
                resources::servers(challenge_id, instance_id, &challenge, &self.config);
        }
        if let Some(created) = ns.metadata.creation_timestamp.as_ref() {
            let start = created.0.timestamp_millis();
            let remaining = reaper::remaining_time(created.0, challenge.ttl());
            let timeout = i64::try_from(challenge.timeout).unwrap_or(i64::MAX);
            instance.time = Some(TimeWindow {
                start,
                stop: start.saturating_add(timeout),
                remaining: i64::try_from(remaining.as_millis()).unwrap_or(i64::MAX),
            });
        }
        Ok(instance)
    }

    #[instrument(skip(self))]
    pub async fn create_instance(&self, challenge_id: &str, team_id: &str) -> Result<Instance> {
        let challenge = self.challenge(challenge_id)?;
        let identity = InstanceIdentity::generate(challenge_id, team_id);
        let manifests = InstanceManifests::build(&identity, &challenge, &self.config)?;
        let ns_name = identity.namespace();

        let created = match self.cluster.create_namespace(&manifests.namespace).await {
            Ok(created) => created,
            Err(Error::AlreadyExists { .. }) => {
                debug!(namespace = %ns_name, "Instance is already running");
                return Err(Error::InstanceExists { namespace: ns_name });
            }
            Err(e) => return Err(e),
        };
        debug!(namespace = %ns_name, "created Namespace");
        // expiry holds from here on, whatever happens to the remaining phases
        self.reaper
            .schedule_deletion(&ns_name, created.metadata.uid, challenge.ttl());

        if let Err(e) = self.provision(&ns_name, &manifests).await {
            self.metrics.record_creation_failure();
            error!(namespace = %ns_name, error = ?e, "Instance creation failed");
            return Err(e);
        }

        self.metrics.record_created();
        info!(namespace = %ns_name, instance = %identity.instance_id, "instance created");

        let mut instance = Instance::new(&challenge, InstanceStatus::Starting);
        instance.servers =
            resources::servers(challenge_id, &identity.instance_id, &challenge, &self.config);
        Ok(instance)
    }

    /// Submit everything below the namespace, phase by phase
    async fn provision(&self, ns: &str, manifests: &InstanceManifests) -> Result<()> {
        let cluster = &self.cluster;

        run_phase(
            CreationStage::NetworkPolicies,
            manifests
                .network_policies
                .iter()
                .map(|policy| cluster.create_network_policy(ns, policy)),
        )
        .await?;

        run_phase(
            CreationStage::Deployments,
            manifests
                .deployments
                .iter()
                .map(|deployment| cluster.create_deployment(ns, deployment)),
        )
        .await?;

        run_phase(
            CreationStage::Services,
            manifests
                .services
                .iter()
                .map(|service| cluster.create_service(ns, service)),
        )
        .await?;

        if !manifests.middlewares.is_empty() {
            run_phase(
                CreationStage::Middlewares,
                manifests
                    .middlewares
                    .iter()
                    .map(|middleware| cluster.create_middleware(ns, middleware)),
            )
            .await?;
        }

        // primary route first, then the extra exposures together
        run_phase(
            CreationStage::IngressRoutes,
            std::iter::once(cluster.create_ingress_route(ns, &manifests.primary_route)),
        )
        .await?;
        run_phase(
            CreationStage::IngressRoutes,
            manifests
                .extra_routes
                .iter()
                .map(|route| cluster.create_ingress_route(ns, route)),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_instance(&self, challenge_id: &str, team_id: &str) -> Result<Instance> {
        let challenge = self.challenge(challenge_id)?;
        let ns_name = utils::generate_namespace_name(challenge_id, team_id);

        if self.cluster.delete_namespace(&ns_name, None).await? {
            self.metrics.record_deleted();
            debug!(namespace = %ns_name, "deleted Namespace");
        } else {
            debug!(namespace = %ns_name, "Namespace already gone");
        }
        info!(namespace = %ns_name, "instance deleted");

        Ok(Instance::new(&challenge, InstanceStatus::Stopping))
    }
}

/// Issue every call of a phase concurrently, wait for all of them to settle,
/// then report the first failure
async fn run_phase<I, F>(stage: CreationStage, calls: I) -> Result<()>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<()>>,
{
    future::join_all(calls)
        .await
        .into_iter()
        .find_map(|result| result.err())
        .map_or(Ok(()), |source| {
            Err(Error::InstanceCreation {
                stage,
                source: Box::new(source),
            })
        })
}
