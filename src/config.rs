use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct ControllerConfig {
    /// Domain every instance hostname is placed under
    pub challenge_domain: String,

    #[serde(default)]
    pub traefik: TraefikConfig,

    /// Ingress controller pods allowed to reach exposed workloads
    #[serde(default)]
    pub ingress: IngressConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TraefikConfig {
    #[serde(default = "default_http_entrypoint")]
    pub http_entrypoint: String,

    #[serde(default = "default_tcp_entrypoint")]
    pub tcp_entrypoint: String,

    /// Port players connect to for tcp exposures
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IngressConfig {
    /// Namespace the ingress controller runs in
    #[serde(default = "default_ingress")]
    pub namespace: String,

    /// `app.kubernetes.io/name` of the ingress controller pods
    #[serde(default = "default_ingress")]
    pub app_name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,
}

impl ControllerConfig {
    /// Load from an optional `klodd.{yaml,toml,json}` file overlaid with
    /// `KLODD__`-prefixed environment variables
    pub fn load() -> Result<Self> {
        let source = ::config::Config::builder()
            .add_source(::config::File::with_name("klodd").required(false))
            .add_source(
                ::config::Environment::with_prefix("KLODD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_source(source)
    }

    pub fn from_source(source: ::config::Config) -> Result<Self> {
        Ok(source.try_deserialize()?)
    }
}

impl WatchConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_delay_secs.max(self.reconnect_delay_secs))
    }
}

impl Default for TraefikConfig {
    fn default() -> Self {
        Self {
            http_entrypoint: default_http_entrypoint(),
            tcp_entrypoint: default_tcp_entrypoint(),
            tcp_port: default_tcp_port(),
        }
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            namespace: default_ingress(),
            app_name: default_ingress(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_delay_secs: default_max_reconnect_delay(),
        }
    }
}

fn default_http_entrypoint() -> String {
    "websecure".to_string()
}

fn default_tcp_entrypoint() -> String {
    "tcp".to_string()
}

fn default_tcp_port() -> u16 {
    1337
}

fn default_ingress() -> String {
    "traefik".to_string()
}

fn default_reconnect_delay() -> u64 {
    3
}

fn default_max_reconnect_delay() -> u64 {
    60
}
