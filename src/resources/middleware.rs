use crate::{
    crds::{ExposeKind, Middleware, MiddlewareSpec, MiddlewareTCP, MiddlewareTCPSpec},
    error::Result,
};
use kube::api::ObjectMeta;
use serde_json::Value;
use std::collections::BTreeMap;

/// Middleware flavour follows the primary exposure kind
#[derive(Clone, Debug)]
pub enum MiddlewareManifest {
    Http(Middleware),
    Tcp(MiddlewareTCP),
}

impl MiddlewareManifest {
    pub fn name(&self) -> Option<&str> {
        match self {
            MiddlewareManifest::Http(m) => m.metadata.name.as_deref(),
            MiddlewareManifest::Tcp(m) => m.metadata.name.as_deref(),
        }
    }
}

/// Name the ingress route uses to reference the middleware at `index`
pub fn name(index: usize) -> String {
    format!("middleware-{}", index)
}

pub fn build(
    kind: ExposeKind,
    index: usize,
    spec: &Value,
    labels: &BTreeMap<String, String>,
) -> Result<MiddlewareManifest> {
    let config: BTreeMap<String, Value> = serde_json::from_value(spec.clone())?;
    let metadata = ObjectMeta {
        name: Some(name(index)),
        labels: Some(labels.clone()),
        ..Default::default()
    };

    Ok(match kind {
        ExposeKind::Http => MiddlewareManifest::Http(Middleware {
            metadata,
            spec: MiddlewareSpec { config },
        }),
        ExposeKind::Tcp => MiddlewareManifest::Tcp(MiddlewareTCP {
            metadata,
            spec: MiddlewareTCPSpec { config },
        }),
    })
}
