use crate::resources::labels::ANNOTATION_TTL;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use std::{collections::BTreeMap, time::Duration};

/// Namespace holding every resource of one instance. The TTL annotation is
/// informational; expiry is enforced by the reaper.
pub fn build(name: &str, labels: &BTreeMap<String, String>, ttl: Duration) -> Namespace {
    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_TTL.to_string(), ttl.as_millis().to_string());

    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.clone()),
            annotations: Some(annotations),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Read back the TTL annotation written by [`build`]
pub fn ttl(namespace: &Namespace) -> Option<Duration> {
    namespace
        .metadata
        .annotations
        .as_ref()?
        .get(ANNOTATION_TTL)?
        .parse::<u64>()
        .ok()
        .map(Duration::from_millis)
}

pub fn is_terminating(namespace: &Namespace) -> bool {
    namespace
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        == Some("Terminating")
}
