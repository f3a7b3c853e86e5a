use std::collections::BTreeMap;

pub const LABEL_CHALLENGE: &str = "klodd.tjcsec.club/challenge";
pub const LABEL_TEAM: &str = "klodd.tjcsec.club/team";
pub const LABEL_INSTANCE: &str = "klodd.tjcsec.club/instance";
pub const LABEL_POD: &str = "klodd.tjcsec.club/pod";
pub const LABEL_EGRESS: &str = "klodd.tjcsec.club/egress";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_MANAGED_BY_VALUE: &str = "klodd";

pub const ANNOTATION_TTL: &str = "klodd.tjcsec.club/ttl";

/// Identity labels carried by every resource of an instance
pub fn common_labels(
    challenge_id: &str,
    team_id: &str,
    instance_id: &str,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_CHALLENGE.to_string(), challenge_id.to_string());
    labels.insert(LABEL_TEAM.to_string(), team_id.to_string());
    labels.insert(LABEL_INSTANCE.to_string(), instance_id.to_string());
    labels.insert(
        LABEL_MANAGED_BY.to_string(),
        LABEL_MANAGED_BY_VALUE.to_string(),
    );
    labels
}

/// Common labels plus the per-workload label
pub fn pod_labels(common: &BTreeMap<String, String>, pod: &str) -> BTreeMap<String, String> {
    let mut labels = common.clone();
    labels.insert(LABEL_POD.to_string(), pod.to_string());
    labels
}

pub fn managed_selector() -> String {
    format!("{}={}", LABEL_MANAGED_BY, LABEL_MANAGED_BY_VALUE)
}

pub fn challenge_selector(challenge_id: &str) -> String {
    format!("{}={}", LABEL_CHALLENGE, challenge_id)
}
