use crate::{config::IngressConfig, error::Result, resources::labels};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use serde_json::json;
use std::collections::BTreeMap;

pub const ISOLATE_NETWORK: &str = "isolate-network";
pub const ALLOW_INGRESS: &str = "allow-ingress";
pub const ALLOW_EGRESS: &str = "allow-egress";

/// Address space egress-enabled workloads may never reach
pub const PRIVATE_RANGES: [&str; 3] = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

/// Build the three policies every instance namespace carries:
/// 1. default isolation: only same-instance traffic and DNS to kube-system
/// 2. ingress to the exposed workload from the ingress controller only
/// 3. egress to public address space for workloads labelled for egress
pub fn build(
    common_labels: &BTreeMap<String, String>,
    exposed_pod: &str,
    ingress: &IngressConfig,
) -> Result<Vec<NetworkPolicy>> {
    let same_instance = json!({ "namespaceSelector": { "matchLabels": common_labels } });

    let isolate = json!({
        "metadata": { "name": ISOLATE_NETWORK, "labels": common_labels },
        "spec": {
            "podSelector": {},
            "policyTypes": ["Ingress", "Egress"],
            "ingress": [{ "from": [same_instance] }],
            "egress": [
                { "to": [same_instance] },
                {
                    "to": [{
                        "namespaceSelector": {
                            "matchLabels": { "kubernetes.io/metadata.name": "kube-system" }
                        }
                    }],
                    "ports": [{ "protocol": "UDP", "port": 53 }]
                }
            ]
        }
    });

    let allow_ingress = json!({
        "metadata": { "name": ALLOW_INGRESS, "labels": common_labels },
        "spec": {
            "podSelector": { "matchLabels": { (labels::LABEL_POD): exposed_pod } },
            "policyTypes": ["Ingress"],
            "ingress": [{
                "from": [{
                    "namespaceSelector": {
                        "matchLabels": { "kubernetes.io/metadata.name": ingress.namespace }
                    },
                    "podSelector": {
                        "matchLabels": { "app.kubernetes.io/name": ingress.app_name }
                    }
                }]
            }]
        }
    });

    let allow_egress = json!({
        "metadata": { "name": ALLOW_EGRESS, "labels": common_labels },
        "spec": {
            "podSelector": { "matchLabels": { (labels::LABEL_EGRESS): "true" } },
            "policyTypes": ["Egress"],
            "egress": [{
                "to": [{ "ipBlock": { "cidr": "0.0.0.0/0", "except": PRIVATE_RANGES } }]
            }]
        }
    });

    [isolate, allow_ingress, allow_egress]
        .into_iter()
        .map(|policy| Ok(serde_json::from_value(policy)?))
        .collect()
}
