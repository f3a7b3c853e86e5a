use crate::{
    config::TraefikConfig,
    crds::{
        traefik::rules, ExposeKind, IngressRoute, IngressRouteSpec, IngressRouteTCP,
        IngressRouteTCPSpec, MiddlewareRef, Route, RouteService, RouteTls,
    },
    resources::middleware,
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub enum IngressRouteManifest {
    Http(IngressRoute),
    Tcp(IngressRouteTCP),
}

impl IngressRouteManifest {
    pub fn name(&self) -> Option<&str> {
        match self {
            IngressRouteManifest::Http(r) => r.metadata.name.as_deref(),
            IngressRouteManifest::Tcp(r) => r.metadata.name.as_deref(),
        }
    }
}

/// Route target inside the instance namespace
pub struct Backend<'a> {
    pub host: &'a str,
    pub service: &'a str,
    pub port: u16,
    pub middlewares: usize,
}

/// Unique per instance since every host carries its own first label
pub fn name(host: &str) -> String {
    let label = host.split('.').next().unwrap_or(host);
    format!("ingress-{}", label)
}

pub fn build(
    kind: ExposeKind,
    backend: &Backend<'_>,
    traefik: &TraefikConfig,
    labels: &BTreeMap<String, String>,
) -> IngressRouteManifest {
    let metadata = ObjectMeta {
        name: Some(name(backend.host)),
        labels: Some(labels.clone()),
        ..Default::default()
    };
    let middlewares = (0..backend.middlewares)
        .map(|idx| MiddlewareRef {
            name: middleware::name(idx),
        })
        .collect();

    match kind {
        ExposeKind::Http => IngressRouteManifest::Http(IngressRoute {
            metadata,
            spec: IngressRouteSpec {
                entry_points: vec![traefik.http_entrypoint.clone()],
                routes: vec![Route {
                    kind: Some(rules::RULE.to_string()),
                    r#match: format!("Host(`{}`)", backend.host),
                    middlewares,
                    services: vec![RouteService {
                        kind: Some(rules::SERVICE.to_string()),
                        name: backend.service.to_string(),
                        port: backend.port,
                    }],
                }],
                tls: Some(RouteTls::default()),
            },
        }),
        ExposeKind::Tcp => IngressRouteManifest::Tcp(IngressRouteTCP {
            metadata,
            spec: IngressRouteTCPSpec {
                entry_points: vec![traefik.tcp_entrypoint.clone()],
                routes: vec![Route {
                    kind: None,
                    r#match: format!("HostSNI(`{}`)", backend.host),
                    middlewares,
                    services: vec![RouteService {
                        kind: None,
                        name: backend.service.to_string(),
                        port: backend.port,
                    }],
                }],
                tls: Some(RouteTls::default()),
            },
        }),
    }
}
