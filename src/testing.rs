//! In-memory cluster used by unit tests.

use crate::{
    cluster::{ChallengeEvent, ChallengeStream, ClusterClient},
    crds::Challenge,
    error::{Error, Result},
    resources::{
        ingress_route::IngressRouteManifest, labels, middleware::MiddlewareManifest,
        namespace::build as build_namespace,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    stream, StreamExt,
};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentStatus},
        core::v1::{Namespace, NamespaceStatus, Service},
        networking::v1::NetworkPolicy,
    },
    apimachinery::pkg::apis::meta::v1::Time,
};
use kube::ResourceExt;
use std::{
    collections::{BTreeMap, HashSet},
    sync::Mutex,
    time::Duration,
};

/// Creation calls that can be made to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    NetworkPolicy,
    Deployment,
    Service,
    Middleware,
    IngressRoute,
}

impl Phase {
    fn kind(self) -> &'static str {
        match self {
            Phase::NetworkPolicy => "NetworkPolicy",
            Phase::Deployment => "Deployment",
            Phase::Service => "Service",
            Phase::Middleware => "Middleware",
            Phase::IngressRoute => "IngressRoute",
        }
    }
}

#[derive(Default)]
struct State {
    challenges: Vec<Challenge>,
    namespaces: BTreeMap<String, Namespace>,
    deployments: BTreeMap<(String, String), Deployment>,
    /// names of created resources per (namespace, kind)
    created: BTreeMap<(String, &'static str), Vec<String>>,
    watch: Option<UnboundedReceiver<Result<ChallengeEvent>>>,
    fail_listing: bool,
    failing: HashSet<Phase>,
    next_uid: u64,
}

impl State {
    fn uid(&mut self) -> String {
        self.next_uid += 1;
        format!("uid-{}", self.next_uid)
    }
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_challenge(&self, challenge: Challenge) {
        self.state().challenges.push(challenge);
    }

    /// Live instance namespace with a ten minute TTL created just now
    pub fn add_instance_namespace(&self, name: &str, challenge_id: &str) {
        let common = labels::common_labels(challenge_id, "team", "0000000000000000");
        let mut ns = build_namespace(name, &common, Duration::from_millis(600_000));
        ns.metadata.creation_timestamp = Some(Time(Utc::now()));
        ns.status = Some(NamespaceStatus {
            phase: Some("Active".to_string()),
            ..Default::default()
        });
        let mut state = self.state();
        ns.metadata.uid = Some(state.uid());
        state.namespaces.insert(name.to_string(), ns);
    }

    pub fn set_creation(&self, name: &str, time: Time) {
        if let Some(ns) = self.state().namespaces.get_mut(name) {
            ns.metadata.creation_timestamp = Some(time);
        }
    }

    pub fn set_terminating(&self, name: &str) {
        if let Some(ns) = self.state().namespaces.get_mut(name) {
            ns.status = Some(NamespaceStatus {
                phase: Some("Terminating".to_string()),
                ..Default::default()
            });
        }
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.state().namespaces.contains_key(name)
    }

    pub fn namespace_uid(&self, name: &str) -> Option<String> {
        self.state().namespaces.get(name)?.metadata.uid.clone()
    }

    pub fn instance_id(&self, namespace: &str) -> Option<String> {
        self.state()
            .namespaces
            .get(namespace)?
            .labels()
            .get(labels::LABEL_INSTANCE)
            .cloned()
    }

    /// The next watch call consumes events sent on the returned channel
    pub fn watch_sender(&self) -> UnboundedSender<Result<ChallengeEvent>> {
        let (tx, rx) = mpsc::unbounded();
        self.state().watch = Some(rx);
        tx
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    pub fn fail_phase(&self, phase: Phase) {
        self.state().failing.insert(phase);
    }

    pub fn set_available_replicas(&self, namespace: &str, name: &str, replicas: i32) {
        let key = (namespace.to_string(), name.to_string());
        if let Some(deployment) = self.state().deployments.get_mut(&key) {
            deployment.status = Some(DeploymentStatus {
                available_replicas: Some(replicas),
                ..Default::default()
            });
        }
    }

    pub fn remove_deployment(&self, namespace: &str, name: &str) {
        self.state()
            .deployments
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Number of resources of `kind` created in `namespace`. Both Traefik
    /// flavours count under their http kind.
    pub fn count(&self, namespace: &str, kind: &str) -> usize {
        self.state()
            .created
            .iter()
            .filter(|((ns, k), _)| ns == namespace && *k == kind)
            .map(|(_, names)| names.len())
            .sum()
    }

    pub fn resource_count(&self, namespace: &str) -> usize {
        self.state()
            .created
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, names)| names.len())
            .sum()
    }

    fn record(&self, namespace: &str, phase: Phase, name: String) -> Result<()> {
        let mut state = self.state();
        if state.failing.contains(&phase) {
            return Err(Error::WatchError(format!("injected {} failure", phase.kind())));
        }
        if !state.namespaces.contains_key(namespace) {
            return Err(Error::NotFound {
                kind: "Namespace",
                name: namespace.to_string(),
            });
        }
        state
            .created
            .entry((namespace.to_string(), phase.kind()))
            .or_default()
            .push(name);
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_challenges(&self) -> Result<(Vec<Challenge>, String)> {
        let state = self.state();
        if state.fail_listing {
            return Err(Error::WatchError("listing unavailable".to_string()));
        }
        Ok((state.challenges.clone(), "1".to_string()))
    }

    async fn watch_challenges(&self, _resource_version: &str) -> Result<ChallengeStream> {
        Ok(match self.state().watch.take() {
            Some(rx) => rx.boxed(),
            None => stream::empty::<Result<ChallengeEvent>>().boxed(),
        })
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        Ok(self.state().namespaces.get(name).cloned())
    }

    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<Namespace>> {
        let (key, value) = label_selector
            .split_once('=')
            .unwrap_or((label_selector, ""));
        Ok(self
            .state()
            .namespaces
            .values()
            .filter(|ns| ns.labels().get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let name = namespace.name_any();
        let mut state = self.state();
        if state.namespaces.contains_key(&name) {
            return Err(Error::AlreadyExists {
                kind: "Namespace",
                name,
            });
        }
        let mut created = namespace.clone();
        created.metadata.uid = Some(state.uid());
        created.metadata.creation_timestamp = Some(Time(Utc::now()));
        created.status = Some(NamespaceStatus {
            phase: Some("Active".to_string()),
            ..Default::default()
        });
        state.namespaces.insert(name, created.clone());
        Ok(created)
    }

    async fn delete_namespace(&self, name: &str, uid: Option<&str>) -> Result<bool> {
        let mut state = self.state();
        let Some(existing) = state.namespaces.get(name) else {
            return Ok(false);
        };
        if uid.is_some() && existing.metadata.uid.as_deref() != uid {
            return Ok(false);
        }
        state.namespaces.remove(name);
        state.deployments.retain(|(ns, _), _| ns != name);
        state.created.retain(|(ns, _), _| ns != name);
        Ok(true)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        Ok(self
            .state()
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_network_policy(&self, namespace: &str, policy: &NetworkPolicy) -> Result<()> {
        self.record(namespace, Phase::NetworkPolicy, policy.name_any())
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        let name = deployment.name_any();
        self.record(namespace, Phase::Deployment, name.clone())?;
        self.state()
            .deployments
            .insert((namespace.to_string(), name), deployment.clone());
        Ok(())
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        self.record(namespace, Phase::Service, service.name_any())
    }

    async fn create_middleware(
        &self,
        namespace: &str,
        middleware: &MiddlewareManifest,
    ) -> Result<()> {
        let name = middleware.name().unwrap_or_default().to_string();
        self.record(namespace, Phase::Middleware, name)
    }

    async fn create_ingress_route(
        &self,
        namespace: &str,
        route: &IngressRouteManifest,
    ) -> Result<()> {
        let name = route.name().unwrap_or_default().to_string();
        self.record(namespace, Phase::IngressRoute, name)
    }
}
