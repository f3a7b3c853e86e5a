use k8s_openapi::api::core::v1::PodSpec;
use kube::CustomResource;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Schema for embedded Kubernetes pod specs
fn pod_spec_schema(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "description": "Kubernetes PodSpec used as the workload template",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Schema for opaque Traefik middleware specs
fn middleware_schema(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "array",
        "nullable": true,
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}

/// Challenge definition, read-only from the controller's perspective.
/// The challenge id is the resource name.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "klodd.tjcsec.club",
    version = "v1",
    kind = "Challenge",
    plural = "challenges",
    singular = "challenge",
    printcolumn = r#"{"name":"Name", "type":"string", "jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Timeout", "type":"integer", "jsonPath":".spec.timeout"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSpec {
    /// Display name
    pub name: String,

    /// Instance time-to-live in milliseconds
    pub timeout: u64,

    #[schemars(length(min = 1))]
    pub pods: Vec<PodDefinition>,

    /// Primary exposure
    pub expose: Exposure,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_expose: Vec<ExtraExposure>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "middleware_schema")]
    pub middlewares: Vec<serde_json::Value>,
}

impl ChallengeSpec {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodDefinition {
    pub name: String,

    #[serde(default)]
    pub ports: Vec<PodPort>,

    /// Opt in to egress towards public address space
    #[serde(default)]
    pub egress: bool,

    #[schemars(schema_with = "pod_spec_schema")]
    pub spec: PodSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct PodPort {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExposeKind {
    Http,
    Tcp,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Exposure {
    pub kind: ExposeKind,
    /// Workload (and service) name receiving the traffic
    pub pod: String,
    pub port: u16,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ExtraExposure {
    pub kind: ExposeKind,
    pub pod: String,
    pub port: u16,
    /// Suffix appended to the instance hostname
    #[schemars(length(min = 1))]
    pub hostname: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    const FIXTURE: &str = r#"
apiVersion: klodd.tjcsec.club/v1
kind: Challenge
metadata:
  name: web
spec:
  name: Web Challenge
  timeout: 600000
  pods:
    - name: app
      ports:
        - port: 8080
      egress: true
      spec:
        containers:
          - name: main
            image: ghcr.io/example/web:latest
    - name: db
      ports:
        - port: 5432
          protocol: TCP
      spec:
        containers:
          - name: main
            image: postgres:16
  expose:
    kind: http
    pod: app
    port: 8080
  extraExpose:
    - kind: tcp
      pod: db
      port: 5432
      hostname: db
  middlewares:
    - rateLimit:
        average: 10
"#;

    #[test]
    fn test_parse_challenge() {
        let challenge: Challenge = serde_yaml::from_str(FIXTURE).unwrap();
        let spec = &challenge.spec;
        assert_eq!(spec.name, "Web Challenge");
        assert_eq!(spec.ttl(), Duration::from_secs(600));
        assert_eq!(spec.pods.len(), 2);
        assert!(spec.pods[0].egress);
        assert!(!spec.pods[1].egress);
        assert_eq!(spec.pods[1].ports[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(spec.pods[0].spec.containers[0].name, "main");
        assert_eq!(spec.expose.kind, ExposeKind::Http);
        assert_eq!(spec.extra_expose[0].kind, ExposeKind::Tcp);
        assert_eq!(spec.extra_expose[0].hostname, "db");
        assert_eq!(spec.middlewares.len(), 1);
    }

    #[test]
    fn test_optional_lists_default_empty() {
        let challenge: Challenge = serde_yaml::from_str(
            r#"
apiVersion: klodd.tjcsec.club/v1
kind: Challenge
metadata:
  name: pwn
spec:
  name: Pwn
  timeout: 1000
  pods:
    - name: box
      spec:
        containers: []
  expose:
    kind: tcp
    pod: box
    port: 1337
"#,
        )
        .unwrap();
        assert!(challenge.spec.extra_expose.is_empty());
        assert!(challenge.spec.middlewares.is_empty());
        assert!(challenge.spec.pods[0].ports.is_empty());
    }

    #[test]
    fn test_crd_is_cluster_scoped() {
        let crd = Challenge::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.group, "klodd.tjcsec.club");
    }

    #[test]
    fn test_extra_hostname_must_not_be_empty() {
        let crd = serde_json::to_value(Challenge::crd()).unwrap();
        let hostname = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]
            ["spec"]["properties"]["extraExpose"]["items"]["properties"]["hostname"];
        assert_eq!(hostname["minLength"], 1);
    }
}
