//! Naming helpers shared by the manifest builders and the orchestrator
use rand::Rng;

/// Generate a namespace name for a (challenge, team) pair
pub fn generate_namespace_name(challenge_id: &str, team_id: &str) -> String {
    format!("klodd-{}-{}", challenge_id, team_id)
}

/// Generate a fresh instance id: 8 random bytes as lowercase hex
pub fn generate_instance_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Externally reachable hostname of an instance, optionally for an extra
/// exposure. An empty suffix counts as none.
pub fn generate_host(
    challenge_id: &str,
    instance_id: &str,
    suffix: Option<&str>,
    domain: &str,
) -> String {
    match suffix.filter(|suffix| !suffix.is_empty()) {
        Some(suffix) => format!("{}-{}-{}.{}", challenge_id, instance_id, suffix, domain),
        None => format!("{}-{}.{}", challenge_id, instance_id, domain),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_name_generation() {
        assert_eq!(generate_namespace_name("web", "team-42"), "klodd-web-team-42");
        assert_eq!(
            generate_namespace_name("web", "team-42"),
            generate_namespace_name("web", "team-42")
        );
    }

    #[test]
    fn test_instance_id() {
        let id = generate_instance_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, generate_instance_id());
    }

    #[test]
    fn test_host_generation() {
        assert_eq!(
            generate_host("web", "0123abcd", None, "chall.example.com"),
            "web-0123abcd.chall.example.com"
        );
        assert_eq!(
            generate_host("web", "0123abcd", Some("db"), "chall.example.com"),
            "web-0123abcd-db.chall.example.com"
        );
    }

    #[test]
    fn test_empty_suffix_is_ignored() {
        assert_eq!(
            generate_host("web", "abc", Some(""), "chall.example.com"),
            generate_host("web", "abc", None, "chall.example.com")
        );
    }
}
