//! RPC runtime configuration
//!
//! Deserializes from TOML with every field defaulted:
//!
//! ```toml
//! wait_timeout_ms = 5000
//! max_pipeline_depth = 32
//! call_channel_warning_depth = 1024
//! ```

use crate::error::{RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Bound on a single `wait` before it reports a timeout
    pub wait_timeout_ms: u64,

    /// Promises a call may be forwarded through before it is failed
    pub max_pipeline_depth: u32,

    /// Mailbox depth above which dispatch logs a warning
    pub call_channel_warning_depth: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 5_000,
            max_pipeline_depth: 32,
            call_channel_warning_depth: 1024,
        }
    }
}

impl RpcConfig {
    pub fn from_toml_str(raw: &str) -> RpcResult<Self> {
        toml::from_str(raw).map_err(|e| RpcError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> RpcResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RpcError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_max_pipeline_depth(mut self, depth: u32) -> Self {
        self.max_pipeline_depth = depth;
        self
    }
}
