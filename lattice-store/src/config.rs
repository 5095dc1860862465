//! Engine Configuration
//!
//! Configuration is per thread, like the runtime it configures. Install a
//! configuration with [`configure`] before creating drafts; changing it
//! later affects subsequent operations only.
//!
//! ```rust,ignore
//! use lattice_store::{configure, EngineConfig, FlushMode};
//!
//! configure(EngineConfig {
//!     flush_mode: FlushMode::Sync,
//!     ..EngineConfig::default()
//! });
//! ```

use serde::Deserialize;

use crate::reactive::Runtime;

/// Upper bound for the per-depth tracking bit.
pub const MAX_MARKER_BITS: u32 = 30;

/// When queued `watch` notifications are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Deliver on [`flush`](crate::flush) or when the outermost
    /// [`batch`](crate::batch) returns.
    #[default]
    Manual,
    /// Deliver at the end of every top-level mutation.
    Sync,
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Emit development warnings (undraftable input, skipped recursion).
    pub dev_warnings: bool,

    /// Effect nesting depth up to which dependencies are reconciled with
    /// bit markers. Deeper runs fall back to dropping and re-collecting
    /// every dependency. Clamped to `1..=30`.
    pub max_marker_bits: u32,

    /// Notification delivery mode.
    pub flush_mode: FlushMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dev_warnings: cfg!(debug_assertions),
            max_marker_bits: MAX_MARKER_BITS,
            flush_mode: FlushMode::Manual,
        }
    }
}

impl EngineConfig {
    pub(crate) fn marker_bits(&self) -> u32 {
        self.max_marker_bits.clamp(1, MAX_MARKER_BITS)
    }
}

/// Install `config` for the current thread.
pub fn configure(config: EngineConfig) {
    tracing::debug!(?config, "engine configured");
    Runtime::with(|rt| rt.config = config);
}

/// The current thread's configuration.
pub fn config() -> EngineConfig {
    Runtime::with(|rt| rt.config.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_config() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"flush_mode": "sync", "max_marker_bits": 64}"#).unwrap();
        assert_eq!(config.flush_mode, FlushMode::Sync);
        assert_eq!(config.marker_bits(), MAX_MARKER_BITS);
        assert_eq!(config.dev_warnings, cfg!(debug_assertions));
    }

    #[test]
    fn configure_replaces_thread_config() {
        let original = config();
        configure(EngineConfig {
            dev_warnings: false,
            max_marker_bits: 4,
            flush_mode: FlushMode::Sync,
        });
        assert_eq!(config().marker_bits(), 4);
        configure(original);
    }
}
