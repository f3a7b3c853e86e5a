//! Access to the orchestration platform.
//!
//! Everything the engine does against the cluster goes through
//! [`ClusterClient`], so the orchestrator, watcher and reaper can run against
//! an in-memory cluster in tests and against kube-rs in production.

use crate::{
    crds::Challenge,
    error::{Error, Result},
    resources::{ingress_route::IngressRouteManifest, middleware::MiddlewareManifest},
};
use async_trait::async_trait;
use futures::{future, stream::BoxStream, StreamExt};
use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{Namespace, Service},
        networking::v1::NetworkPolicy,
    },
    NamespaceResourceScope,
};
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams, Preconditions, WatchEvent, WatchParams},
    Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::debug;

/// Change to a challenge definition observed on the watch stream
#[derive(Clone, Debug)]
pub enum ChallengeEvent {
    Added(Challenge),
    Modified(Challenge),
    Deleted(Challenge),
}

impl ChallengeEvent {
    pub fn challenge(&self) -> &Challenge {
        match self {
            ChallengeEvent::Added(c) | ChallengeEvent::Modified(c) | ChallengeEvent::Deleted(c) => c,
        }
    }
}

pub type ChallengeStream = BoxStream<'static, Result<ChallengeEvent>>;

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Full listing of challenge definitions and the list's resource version
    async fn list_challenges(&self) -> Result<(Vec<Challenge>, String)>;

    /// Watch challenge definitions starting after `resource_version`
    async fn watch_challenges(&self, resource_version: &str) -> Result<ChallengeStream>;

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<Namespace>>;

    /// Fails with [`Error::AlreadyExists`] when the name is taken
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace>;

    /// Returns false if the namespace was already gone. With `uid` set, a
    /// namespace recreated under the same name is left alone and also
    /// reports false.
    async fn delete_namespace(&self, name: &str, uid: Option<&str>) -> Result<bool>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    async fn create_network_policy(&self, namespace: &str, policy: &NetworkPolicy) -> Result<()>;

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()>;

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()>;

    async fn create_middleware(&self, namespace: &str, middleware: &MiddlewareManifest)
        -> Result<()>;

    async fn create_ingress_route(&self, namespace: &str, route: &IngressRouteManifest)
        -> Result<()>;
}

#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn create_in<K>(&self, namespace: &str, resource: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let created = api
            .create(&PostParams::default(), resource)
            .await
            .map_err(|e| creation_error(e, namespace))?;
        debug!(
            namespace,
            kind = %K::kind(&()),
            name = %created.name_any(),
            "created resource"
        );
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_challenges(&self) -> Result<(Vec<Challenge>, String)> {
        let api: Api<Challenge> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        let version = list.metadata.resource_version.unwrap_or_default();
        Ok((list.items, version))
    }

    async fn watch_challenges(&self, resource_version: &str) -> Result<ChallengeStream> {
        let api: Api<Challenge> = Api::all(self.client.clone());
        let stream = api.watch(&WatchParams::default(), resource_version).await?;

        Ok(stream
            .filter_map(|event| {
                future::ready(match event {
                    Ok(WatchEvent::Added(c)) => Some(Ok(ChallengeEvent::Added(c))),
                    Ok(WatchEvent::Modified(c)) => Some(Ok(ChallengeEvent::Modified(c))),
                    Ok(WatchEvent::Deleted(c)) => Some(Ok(ChallengeEvent::Deleted(c))),
                    Ok(WatchEvent::Bookmark(_)) => None,
                    // typically 410 Gone once the resource version is too old
                    Ok(WatchEvent::Error(e)) => Some(Err(Error::WatchError(format!(
                        "{} ({})",
                        e.message, e.code
                    )))),
                    Err(e) => Some(Err(Error::from(e))),
                })
            })
            .boxed())
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn list_namespaces(&self, label_selector: &str) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default().labels(label_selector)).await?;
        Ok(list.items)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.create(&PostParams::default(), namespace).await {
            Ok(created) => {
                debug!(name = %created.name_any(), "created namespace");
                Ok(created)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(Error::AlreadyExists {
                kind: "Namespace",
                name: namespace.name_any(),
            }),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn delete_namespace(&self, name: &str, uid: Option<&str>) -> Result<bool> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let params = DeleteParams {
            preconditions: uid.map(|uid| Preconditions {
                uid: Some(uid.to_string()),
                resource_version: None,
            }),
            ..DeleteParams::default()
        };
        match api.delete(name, &params).await {
            Ok(_) => Ok(true),
            Err(e) => deletion_result(e),
        }
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_network_policy(&self, namespace: &str, policy: &NetworkPolicy) -> Result<()> {
        self.create_in(namespace, policy).await
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        self.create_in(namespace, deployment).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        self.create_in(namespace, service).await
    }

    async fn create_middleware(
        &self,
        namespace: &str,
        middleware: &MiddlewareManifest,
    ) -> Result<()> {
        match middleware {
            MiddlewareManifest::Http(m) => self.create_in(namespace, m).await,
            MiddlewareManifest::Tcp(m) => self.create_in(namespace, m).await,
        }
    }

    async fn create_ingress_route(
        &self,
        namespace: &str,
        route: &IngressRouteManifest,
    ) -> Result<()> {
        match route {
            IngressRouteManifest::Http(r) => self.create_in(namespace, r).await,
            IngressRouteManifest::Tcp(r) => self.create_in(namespace, r).await,
        }
    }
}

/// Creating inside a namespace that is gone yields 404
fn creation_error(err: kube::Error, namespace: &str) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound {
            kind: "Namespace",
            name: namespace.to_string(),
        },
        e => Error::from(e),
    }
}

/// 404 means already deleted, 409 means the uid precondition failed
fn deletion_result(err: kube::Error) -> Result<bool> {
    match err {
        kube::Error::Api(ae) if ae.code == 404 || ae.code == 409 => Ok(false),
        e => Err(Error::from(e)),
    }
}
