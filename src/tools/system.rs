//! Host environment snapshot for `getSystemStatus`

use serde::Serialize;

/// Facts about the machine the client runs on
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    /// Host name, or `unknown`
    pub hostname: String,
    /// Operating system family
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// Logical CPU count
    pub cpu_count: usize,
    /// Local wall-clock time, RFC 3339
    pub local_time: String,
}

impl SystemSnapshot {
    /// Capture the current environment
    #[must_use]
    pub fn capture() -> Self {
        Self {
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: std::thread::available_parallelism().map_or(1, std::num::NonZero::get),
            local_time: chrono::Local::now().to_rfc3339(),
        }
    }
}
