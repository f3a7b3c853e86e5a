use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("Instance is already running")]
    InstanceExists { namespace: String },

    #[error("{stage}")]
    InstanceCreation {
        stage: CreationStage,
        #[source]
        source: Box<Error>,
    },

    #[error("Watch stream error: {0}")]
    WatchError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] ::config::ConfigError),
}

impl Error {
    /// Conditions the caller should report as a conflict rather than an
    /// internal failure
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::InstanceExists { .. } | Error::InstanceCreation { .. }
        )
    }
}

/// Provisioning phases after the namespace exists
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreationStage {
    NetworkPolicies,
    Deployments,
    Services,
    Middlewares,
    IngressRoutes,
}

impl fmt::Display for CreationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            CreationStage::NetworkPolicies => "network policies",
            CreationStage::Deployments => "deployments",
            CreationStage::Services => "services",
            CreationStage::Middlewares => "middlewares",
            CreationStage::IngressRoutes => "ingress routes",
        };
        write!(f, "Could not create {}", what)
    }
}
