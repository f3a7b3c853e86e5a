use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// IngressRoute CRD (Traefik v3)
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "traefik.io",
    version = "v1alpha1",
    kind = "IngressRoute",
    plural = "ingressroutes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteSpec {
    pub entry_points: Vec<String>,
    pub routes: Vec<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouteTls>,
}

/// IngressRouteTCP CRD (Traefik v3), routed by SNI
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "traefik.io",
    version = "v1alpha1",
    kind = "IngressRouteTCP",
    plural = "ingressroutetcps",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteTCPSpec {
    pub entry_points: Vec<String>,
    pub routes: Vec<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouteTls>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Only http routes carry a kind ("Rule")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub r#match: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<MiddlewareRef>,
    pub services: Vec<RouteService>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct MiddlewareRef {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct RouteService {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    pub port: u16,
}

/// Empty block enables TLS using the entrypoint's certificate resolver
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// Middleware CRD, spec is passed through from the challenge definition
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "traefik.io",
    version = "v1alpha1",
    kind = "Middleware",
    plural = "middlewares",
    namespaced
)]
pub struct MiddlewareSpec {
    #[serde(flatten)]
    pub config: BTreeMap<String, Value>,
}

/// MiddlewareTCP CRD
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "traefik.io",
    version = "v1alpha1",
    kind = "MiddlewareTCP",
    plural = "middlewaretcps",
    namespaced
)]
pub struct MiddlewareTCPSpec {
    #[serde(flatten)]
    pub config: BTreeMap<String, Value>,
}

/// Values of `Route::kind` and `RouteService::kind` for http routes
pub mod rules {
    pub const RULE: &str = "Rule";
    pub const SERVICE: &str = "Service";
}
