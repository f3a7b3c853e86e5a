//! Pure translation of a challenge definition into the desired state of one
//! instance. Nothing here performs I/O.

pub mod deployment;
pub mod ingress_route;
pub mod labels;
pub mod middleware;
pub mod namespace;
pub mod network_policy;
pub mod service;

use crate::{
    config::ControllerConfig,
    crds::{ChallengeSpec, ExposeKind},
    error::Result,
    utils,
};
use ingress_route::{Backend, IngressRouteManifest};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Namespace, Service},
    networking::v1::NetworkPolicy,
};
use middleware::MiddlewareManifest;
use serde::Serialize;
use std::collections::BTreeMap;

/// Identity of one instance: the (challenge, team) scope plus the fresh id
#[derive(Clone, Debug)]
pub struct InstanceIdentity {
    pub challenge_id: String,
    pub team_id: String,
    pub instance_id: String,
}

impl InstanceIdentity {
    pub fn generate(challenge_id: &str, team_id: &str) -> Self {
        Self {
            challenge_id: challenge_id.to_string(),
            team_id: team_id.to_string(),
            instance_id: utils::generate_instance_id(),
        }
    }

    pub fn namespace(&self) -> String {
        utils::generate_namespace_name(&self.challenge_id, &self.team_id)
    }

    pub fn host(&self, suffix: Option<&str>, domain: &str) -> String {
        utils::generate_host(&self.challenge_id, &self.instance_id, suffix, domain)
    }

    pub fn common_labels(&self) -> BTreeMap<String, String> {
        labels::common_labels(&self.challenge_id, &self.team_id, &self.instance_id)
    }
}

/// Externally reachable endpoint of an instance
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Server {
    pub kind: ExposeKind,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Server {
    pub fn new(kind: ExposeKind, host: String, tcp_port: u16) -> Self {
        let port = match kind {
            ExposeKind::Tcp => Some(tcp_port),
            ExposeKind::Http => None,
        };
        Self { kind, host, port }
    }
}

/// Primary server first, then one per extra exposure
pub fn servers(
    challenge_id: &str,
    instance_id: &str,
    challenge: &ChallengeSpec,
    config: &ControllerConfig,
) -> Vec<Server> {
    let domain = &config.challenge_domain;
    let tcp_port = config.traefik.tcp_port;

    let primary = Server::new(
        challenge.expose.kind,
        utils::generate_host(challenge_id, instance_id, None, domain),
        tcp_port,
    );
    std::iter::once(primary)
        .chain(challenge.extra_expose.iter().map(|extra| {
            Server::new(
                extra.kind,
                utils::generate_host(challenge_id, instance_id, Some(&extra.hostname), domain),
                tcp_port,
            )
        }))
        .collect()
}

/// Every resource of one instance, in submission order
#[derive(Clone, Debug)]
pub struct InstanceManifests {
    pub namespace: Namespace,
    pub network_policies: Vec<NetworkPolicy>,
    pub deployments: Vec<Deployment>,
    pub services: Vec<Service>,
    pub middlewares: Vec<MiddlewareManifest>,
    pub primary_route: IngressRouteManifest,
    pub extra_routes: Vec<IngressRouteManifest>,
}

impl InstanceManifests {
    pub fn build(
        identity: &InstanceIdentity,
        challenge: &ChallengeSpec,
        config: &ControllerConfig,
    ) -> Result<Self> {
        let common = identity.common_labels();
        let host = identity.host(None, &config.challenge_domain);
        let expose_kind = challenge.expose.kind;

        let namespace = namespace::build(&identity.namespace(), &common, challenge.ttl());
        let network_policies =
            network_policy::build(&common, &challenge.expose.pod, &config.ingress)?;

        let deployments = challenge
            .pods
            .iter()
            .map(|pod| deployment::build(&common, &host, pod))
            .collect();
        let services = challenge
            .pods
            .iter()
            .map(|pod| service::build(&common, pod))
            .collect();

        let middlewares = challenge
            .middlewares
            .iter()
            .enumerate()
            .map(|(idx, spec)| middleware::build(expose_kind, idx, spec, &common))
            .collect::<Result<Vec<_>>>()?;

        let primary_route = ingress_route::build(
            expose_kind,
            &Backend {
                host: &host,
                service: &challenge.expose.pod,
                port: challenge.expose.port,
                middlewares: middlewares.len(),
            },
            &config.traefik,
            &common,
        );

        // extra exposures never receive middlewares
        let extra_routes = challenge
            .extra_expose
            .iter()
            .map(|extra| {
                let extra_host = identity.host(Some(&extra.hostname), &config.challenge_domain);
                ingress_route::build(
                    extra.kind,
                    &Backend {
                        host: &extra_host,
                        service: &extra.pod,
                        port: extra.port,
                        middlewares: 0,
                    },
                    &config.traefik,
                    &common,
                )
            })
            .collect();

        Ok(Self {
            namespace,
            network_policies,
            deployments,
            services,
            middlewares,
            primary_route,
            extra_routes,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> InstanceIdentity {
        InstanceIdentity {
            challenge_id: "web".to_string(),
            team_id: "team".to_string(),
            instance_id: "0123456789abcdef".to_string(),
        }
    }

    #[test]
    fn test_servers_primary_first() {
        let servers = servers(
            "web",
            "0123456789abcdef",
            &fixtures::challenge(),
            &fixtures::config(),
        );
        assert_eq!(
            servers,
            vec![
                Server {
                    kind: ExposeKind::Http,
                    host: "web-0123456789abcdef.chall.example.com".to_string(),
                    port: None,
                },
                Server {
                    kind: ExposeKind::Tcp,
                    host: "web-0123456789abcdef-db.chall.example.com".to_string(),
                    port: Some(1337),
                },
            ]
        );
        assert_eq!(
            serde_json::to_value(&servers[0]).unwrap(),
            json!({ "kind": "http", "host": "web-0123456789abcdef.chall.example.com" })
        );
    }

    #[test]
    fn test_manifest_counts() {
        let mut challenge = fixtures::challenge();
        challenge.middlewares = vec![json!({ "rateLimit": { "average": 5 } })];
        let manifests =
            InstanceManifests::build(&identity(), &challenge, &fixtures::config()).unwrap();

        assert_eq!(
            manifests.namespace.metadata.name.as_deref(),
            Some("klodd-web-team")
        );
        assert_eq!(manifests.network_policies.len(), 3);
        assert_eq!(manifests.deployments.len(), 2);
        assert_eq!(manifests.services.len(), 2);
        assert_eq!(manifests.middlewares.len(), 1);
        assert_eq!(manifests.extra_routes.len(), 1);
    }

    #[test]
    fn test_only_primary_route_gets_middlewares() {
        let mut challenge = fixtures::challenge();
        challenge.extra_expose[0].kind = ExposeKind::Http;
        challenge.middlewares = vec![json!({ "a": {} }), json!({ "b": {} })];
        let manifests =
            InstanceManifests::build(&identity(), &challenge, &fixtures::config()).unwrap();

        let IngressRouteManifest::Http(primary) = &manifests.primary_route else {
            panic!("expected http primary route");
        };
        assert_eq!(primary.spec.routes[0].middlewares.len(), 2);

        let IngressRouteManifest::Http(extra) = &manifests.extra_routes[0] else {
            panic!("expected http extra route");
        };
        assert!(extra.spec.routes[0].middlewares.is_empty());
        assert_eq!(
            extra.spec.routes[0].r#match,
            "Host(`web-0123456789abcdef-db.chall.example.com`)"
        );
    }

    #[test]
    fn test_deterministic_for_fixed_identity() {
        let config = fixtures::config();
        let challenge = fixtures::challenge();
        let a = InstanceManifests::build(&identity(), &challenge, &config).unwrap();
        let b = InstanceManifests::build(&identity(), &challenge, &config).unwrap();
        assert_eq!(a.namespace, b.namespace);
        assert_eq!(a.deployments, b.deployments);
        assert_eq!(a.services, b.services);
        assert_eq!(a.network_policies, b.network_policies);
    }
}
