use crate::{crds::PodDefinition, resources::labels};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// ClusterIP service named after the workload, exposing its declared ports
pub fn build(common_labels: &BTreeMap<String, String>, pod: &PodDefinition) -> Service {
    let labels = labels::pod_labels(common_labels, &pod.name);

    let ports = pod
        .ports
        .iter()
        .map(|port| ServicePort {
            name: Some(format!("port-{}", port.port)),
            port: i32::from(port.port),
            protocol: Some(port.protocol.clone().unwrap_or_else(|| "TCP".to_string())),
            ..Default::default()
        })
        .collect();

    Service {
        metadata: ObjectMeta {
            name: Some(pod.name.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}
