use crate::{crds::PodDefinition, resources::labels};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{EnvVar, PodTemplateSpec},
    },
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// Variable through which challenge code learns its public hostname
pub const EXTERNAL_HOSTNAME: &str = "EXTERNAL_HOSTNAME";

pub fn build(common_labels: &BTreeMap<String, String>, host: &str, pod: &PodDefinition) -> Deployment {
    let labels = labels::pod_labels(common_labels, &pod.name);

    let mut template_labels = labels.clone();
    template_labels.insert(labels::LABEL_EGRESS.to_string(), pod.egress.to_string());

    // the definition is shared with every other instance, mutate a copy
    let mut pod_spec = pod.spec.clone();
    for container in pod_spec.containers.iter_mut() {
        inject_env(container.env.get_or_insert_with(Vec::new), EXTERNAL_HOSTNAME, host);
    }

    Deployment {
        metadata: ObjectMeta {
            name: Some(pod.name.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(template_labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Set `name` to `value`, overwriting an existing entry
fn inject_env(env: &mut Vec<EnvVar>, name: &str, value: &str) {
    match env.iter_mut().find(|var| var.name == name) {
        Some(var) => {
            var.value = Some(value.to_string());
            var.value_from = None;
        }
        None => env.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }),
    }
}
