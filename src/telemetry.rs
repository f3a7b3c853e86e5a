use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub instances_created: AtomicU64,
    pub creation_failures: AtomicU64,
    pub instances_deleted: AtomicU64,
    pub timeouts: AtomicU64,
    pub watch_reconnects: AtomicU64,
    pub challenge_sweeps: AtomicU64,
}

impl Metrics {
    pub fn record_created(&self) {
        self.instances_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_creation_failure(&self) {
        self.creation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deleted(&self) {
        self.instances_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watch_reconnect(&self) {
        self.watch_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sweep(&self) {
        self.challenge_sweeps.fetch_add(1, Ordering::Relaxed);
    }
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("klodd=info,kube=info"))
}

#[cfg(not(debug_assertions))]
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .init();
}

#[cfg(debug_assertions)]
pub fn init() {
    tracing_subscriber::fmt()
        .pretty()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(env_filter())
        .init();
}
